//! Alert tools

use super::{failure, id_schema};
use crate::server::{parse_args, McpServerResult, Tool, ToolContext};
use crate::types::{ToolDefinition, ToolResult};
use async_trait::async_trait;
use cs_customers::{AlertQuery, CustomerStore};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// List alerts raised by the workers, newest first.
pub struct ListAlertsTool {
    store: Arc<CustomerStore>,
}

impl ListAlertsTool {
    /// Create the tool.
    pub fn new(store: Arc<CustomerStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListAlertsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("list_alerts", "List customer risk alerts, newest first")
            .with_category("alerts")
            .with_schema(json!({
                "type": "object",
                "properties": {
                    "customer_id": { "type": "string", "format": "uuid" },
                    "kind": {
                        "type": "string",
                        "enum": [
                            "low_health", "churn_risk", "renewal_risk", "disengaged",
                            "support_escalation", "stalled_onboarding", "low_usage"
                        ]
                    },
                    "min_severity": {
                        "type": "string",
                        "enum": ["low", "medium", "high", "critical"]
                    },
                    "unacknowledged_only": { "type": "boolean", "default": false },
                    "limit": { "type": "integer", "minimum": 1, "maximum": 500, "default": 50 }
                },
                "required": []
            }))
            .with_permissions(vec!["alerts:read".to_string()])
    }

    #[instrument(skip_all, fields(tool = "list_alerts"))]
    async fn execute(
        &self,
        args: serde_json::Value,
        _context: &ToolContext,
    ) -> McpServerResult<ToolResult> {
        let query: AlertQuery = parse_args(args)?;

        match self.store.list_alerts(&query).await {
            Ok(alerts) => Ok(ToolResult::json(json!({
                "alerts": alerts,
                "count": alerts.len()
            }))),
            Err(e) => Ok(failure("list alerts", e)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AcknowledgeParams {
    id: Uuid,
}

/// Mark an alert as handled.
pub struct AcknowledgeAlertTool {
    store: Arc<CustomerStore>,
}

impl AcknowledgeAlertTool {
    /// Create the tool.
    pub fn new(store: Arc<CustomerStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for AcknowledgeAlertTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "acknowledge_alert",
            "Acknowledge an alert; acknowledging twice keeps the first time",
        )
        .with_category("alerts")
        .with_schema(id_schema("Alert id"))
        .with_permissions(vec!["alerts:write".to_string()])
    }

    #[instrument(skip_all, fields(tool = "acknowledge_alert"))]
    async fn execute(
        &self,
        args: serde_json::Value,
        _context: &ToolContext,
    ) -> McpServerResult<ToolResult> {
        let params: AcknowledgeParams = parse_args(args)?;

        match self.store.acknowledge_alert(params.id).await {
            Ok(alert) => {
                info!(alert_id = %alert.id, "Alert acknowledged");
                Ok(ToolResult::json(json!(alert)))
            }
            Err(e) => Ok(failure("acknowledge alert", e)),
        }
    }
}

/// The alert tools.
pub fn alert_tools(store: Arc<CustomerStore>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ListAlertsTool::new(store.clone())),
        Arc::new(AcknowledgeAlertTool::new(store)),
    ]
}
