//! Server health tool

use crate::health::HealthChecker;
use crate::server::{parse_args, McpServerResult, Tool, ToolContext};
use crate::types::{ToolDefinition, ToolResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Scope {
    Liveness,
    Readiness,
    #[default]
    Full,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct HealthParams {
    #[serde(default)]
    scope: Scope,
}

/// Report liveness, readiness or a full dependency check.
pub struct HealthCheckTool {
    checker: HealthChecker,
}

impl HealthCheckTool {
    /// Create the tool.
    pub fn new(checker: HealthChecker) -> Self {
        Self { checker }
    }
}

#[async_trait]
impl Tool for HealthCheckTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "health_check",
            "Check the database and vendor integrations",
        )
        .with_category("system")
        .with_schema(json!({
            "type": "object",
            "properties": {
                "scope": {
                    "type": "string",
                    "enum": ["liveness", "readiness", "full"],
                    "default": "full"
                }
            },
            "required": []
        }))
        .with_permissions(vec!["system:read".to_string()])
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        _context: &ToolContext,
    ) -> McpServerResult<ToolResult> {
        let params: HealthParams = parse_args(args)?;

        let body = match params.scope {
            Scope::Liveness => json!(self.checker.check_liveness()),
            Scope::Readiness => json!(self.checker.check_readiness().await),
            Scope::Full => json!(self.checker.check_all().await),
        };
        Ok(ToolResult::json(body))
    }
}

/// The system tools.
pub fn system_tools(checker: HealthChecker) -> Vec<Arc<dyn Tool>> {
    vec![Arc::new(HealthCheckTool::new(checker))]
}
