//! # CS MCP
//!
//! A Model Context Protocol server that gives an AI assistant access to
//! customer records, risk alerts, vendor integrations and the autonomous
//! risk workers.
//!
//! ## MCP Protocol
//!
//! Supported methods:
//! - `initialize`: Initialize the MCP session
//! - `ping`: Liveness
//! - `tools/list`: List available tools
//! - `tools/call`: Execute a tool
//! - `resources/list`: List available resources
//! - `resources/read`: Read a resource
//!
//! Messages are newline-delimited JSON-RPC 2.0 over stdio ([`transport`]).
//!
//! ## Available Tools
//!
//! ### Customers
//! - `create_customer`, `get_customer`, `list_customers`,
//!   `update_customer`, `delete_customer`
//!
//! ### Alerts
//! - `list_alerts`, `acknowledge_alert`
//!
//! ### Integrations
//! - `list_integrations`: configured vendors with circuit and rate-limit state
//! - `call_integration`: one request, or every page, through a vendor client
//!
//! ### Agents
//! - `list_workers`, `run_worker`
//!
//! ### System
//! - `health_check`
//!
//! ## Resources
//! - `cs://customers/at-risk`
//! - `cs://integrations/status`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cs_mcp::{McpRequest, McpServer, Tool, ToolContext, ToolDefinition, ToolResult};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Tool for Echo {
//!     fn definition(&self) -> ToolDefinition {
//!         ToolDefinition::new("echo", "Echo the arguments back")
//!     }
//!
//!     async fn execute(
//!         &self,
//!         args: serde_json::Value,
//!         _context: &ToolContext,
//!     ) -> Result<ToolResult, cs_mcp::McpServerError> {
//!         Ok(ToolResult::json(args))
//!     }
//! }
//!
//! async fn setup() {
//!     let server = McpServer::new("example", "0.1.0");
//!     server.register_tool(Arc::new(Echo)).await;
//!
//!     let response = server.handle_request(McpRequest::new(1i64, "tools/list")).await;
//!     println!("{:?}", response);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod health;
pub mod resources;
pub mod server;
pub mod tools;
pub mod transport;
pub mod types;

pub use config::ServerConfig;
pub use health::{
    HealthCheckConfig, HealthChecker, HealthReport, HealthStatus, LivenessResult,
    ReadinessResult, ServiceHealth, ServiceStatus,
};
pub use resources::{all_resources, AT_RISK_URI, INTEGRATION_STATUS_URI};
pub use server::{
    parse_args, McpServer, McpServerError, McpServerResult, Resource, Tool, ToolContext,
};
pub use tools::{all_tools, ToolDeps};
pub use transport::{serve, serve_stdio};
pub use types::{
    ContentBlock, InitializeResult, McpError, McpRequest, McpResponse, ReadResourceParams,
    RequestId, ResourceCapabilities, ResourceContents, ResourceDefinition, ServerCapabilities,
    ServerInfo, ToolCall, ToolCapabilities, ToolDefinition, ToolResult, PROTOCOL_VERSION,
};

/// A server with every tool and resource registered, using the
/// configured name and permissions.
pub async fn build_server(config: &ServerConfig, deps: &ToolDeps) -> McpServer {
    let server = McpServer::new(config.server_name.clone(), env!("CARGO_PKG_VERSION"))
        .with_context(config.tool_context());

    server.register_tools(all_tools(deps)).await;
    for resource in all_resources(
        deps.store.clone(),
        deps.registry.clone(),
        deps.scheduler.config().health_threshold,
    ) {
        server.register_resource(resource).await;
    }

    server
}
