//! Customer success MCP tools
//!
//! Tools are grouped by category, each category guarded by its own
//! permissions:
//! - Customers: record CRUD (`customers:read`, `customers:write`)
//! - Alerts: listing and acknowledgement (`alerts:read`, `alerts:write`)
//! - Integrations: status and vendor calls (`integrations:read`, `integrations:call`)
//! - Agents: worker status and on-demand runs (`agents:read`, `agents:run`)
//! - System: health checks (`system:read`)

pub mod agents;
pub mod alerts;
pub mod customers;
pub mod integrations;
pub mod system;

pub use agents::*;
pub use alerts::*;
pub use customers::*;
pub use integrations::*;
pub use system::*;

use crate::health::HealthChecker;
use crate::server::Tool;
use crate::types::ToolResult;
use cs_agents::AutonomousScheduler;
use cs_customers::CustomerStore;
use cs_integrations::IntegrationRegistry;
use std::fmt::Display;
use std::sync::Arc;
use tracing::warn;

/// Everything the tools operate on.
#[derive(Debug, Clone)]
pub struct ToolDeps {
    /// Customer and alert store
    pub store: Arc<CustomerStore>,
    /// Configured vendor clients
    pub registry: Arc<IntegrationRegistry>,
    /// Worker scheduler
    pub scheduler: AutonomousScheduler,
    /// Dependency health checks
    pub health: HealthChecker,
}

/// Get all available MCP tools.
pub fn all_tools(deps: &ToolDeps) -> Vec<Arc<dyn Tool>> {
    let mut tools = Vec::new();

    // Customers (5)
    tools.extend(customer_tools(deps.store.clone()));

    // Alerts (2)
    tools.extend(alert_tools(deps.store.clone()));

    // Integrations (2)
    tools.extend(integration_tools(deps.registry.clone()));

    // Agents (2)
    tools.extend(agent_tools(deps.scheduler.clone()));

    // System (1)
    tools.extend(system_tools(deps.health.clone()));

    tools
}

/// Report a failed operation as an error result.
pub(crate) fn failure(action: &str, error: impl Display) -> ToolResult {
    warn!(action, error = %error, "Tool operation failed");
    ToolResult::error(format!("Failed to {}: {}", action, error))
}

/// Schema for tools that take a single `id`.
pub(crate) fn id_schema(description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "id": { "type": "string", "format": "uuid", "description": description }
        },
        "required": ["id"]
    })
}
