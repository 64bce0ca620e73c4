//! Autonomous worker tools

use super::failure;
use crate::server::{parse_args, McpServerResult, Tool, ToolContext};
use crate::types::{ToolDefinition, ToolResult};
use async_trait::async_trait;
use cs_agents::AutonomousScheduler;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};

/// Show every worker's interval, run count and last outcome.
pub struct ListWorkersTool {
    scheduler: AutonomousScheduler,
}

impl ListWorkersTool {
    /// Create the tool.
    pub fn new(scheduler: AutonomousScheduler) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Tool for ListWorkersTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("list_workers", "List the autonomous risk workers and their state")
            .with_category("agents")
            .with_permissions(vec!["agents:read".to_string()])
    }

    async fn execute(
        &self,
        _args: serde_json::Value,
        _context: &ToolContext,
    ) -> McpServerResult<ToolResult> {
        let workers = self.scheduler.statuses();
        Ok(ToolResult::json(json!({
            "tick_secs": self.scheduler.config().tick.as_secs(),
            "workers": workers
        })))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunWorkerParams {
    name: String,
}

/// Run one worker immediately and report what it published.
pub struct RunWorkerTool {
    scheduler: AutonomousScheduler,
}

impl RunWorkerTool {
    /// Create the tool.
    pub fn new(scheduler: AutonomousScheduler) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Tool for RunWorkerTool {
    fn definition(&self) -> ToolDefinition {
        let names = self.scheduler.worker_names();
        ToolDefinition::new(
            "run_worker",
            "Run a risk worker now; alerts still respect the cooldown",
        )
        .with_category("agents")
        .with_schema(json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "enum": names }
            },
            "required": ["name"]
        }))
        .with_permissions(vec!["agents:run".to_string()])
    }

    #[instrument(skip_all, fields(tool = "run_worker"))]
    async fn execute(
        &self,
        args: serde_json::Value,
        _context: &ToolContext,
    ) -> McpServerResult<ToolResult> {
        let params: RunWorkerParams = parse_args(args)?;

        match self.scheduler.run_worker_now(&params.name).await {
            Ok(report) => {
                info!(
                    worker = %report.worker,
                    published = report.alerts_published,
                    "Worker run on demand"
                );
                Ok(ToolResult::json(json!(report)))
            }
            Err(e) => Ok(failure("run worker", e)),
        }
    }
}

/// The worker tools.
pub fn agent_tools(scheduler: AutonomousScheduler) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ListWorkersTool::new(scheduler.clone())),
        Arc::new(RunWorkerTool::new(scheduler)),
    ]
}
