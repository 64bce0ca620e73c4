//! Customer success MCP server.
//!
//! Connects the customer store, configures every vendor integration with
//! credentials in the environment, starts the autonomous risk workers and
//! serves MCP over stdio until stdin closes.

use anyhow::{Context, Result};
use cs_agents::{AgentConfig, AlertBus, AutonomousScheduler, MemoryAlertBus, StoreAlertHandler};
use cs_customers::CustomerStore;
use cs_integrations::IntegrationRegistry;
use cs_mcp::{build_server, serve_stdio, HealthChecker, ServerConfig, ToolDeps};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the protocol.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = ServerConfig::from_env();
    let agent_config = AgentConfig::from_env();
    info!(server = %config.server_name, "Starting customer success MCP server");

    let store = Arc::new(
        CustomerStore::connect(&config.database_url)
            .await
            .with_context(|| format!("failed to open database {}", config.database_url))?,
    );

    let registry = Arc::new(IntegrationRegistry::from_env());

    let bus = Arc::new(MemoryAlertBus::new());
    bus.register_handler(Arc::new(StoreAlertHandler::new(store.clone())))
        .await
        .context("failed to register alert persistence")?;

    let scheduler = AutonomousScheduler::new(store.clone(), bus, agent_config);
    let health = HealthChecker::new(store.clone(), registry.clone(), config.health.clone());

    let deps = ToolDeps {
        store,
        registry,
        scheduler: scheduler.clone(),
        health,
    };
    let server = build_server(&config, &deps).await;

    let cancel = CancellationToken::new();
    let scheduler_task = config
        .scheduler_enabled
        .then(|| scheduler.spawn(cancel.clone()));

    let served = serve_stdio(&server).await;

    cancel.cancel();
    if let Some(task) = scheduler_task {
        task.await.context("scheduler task panicked")?;
    }
    deps.store.pool().close().await;

    served.context("transport failed")?;
    info!("Server stopped");
    Ok(())
}
