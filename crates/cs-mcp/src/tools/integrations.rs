//! Vendor integration tools
//!
//! `list_integrations` reports what is configured and how each client is
//! doing. `call_integration` sends one request (or walks every page) through
//! a configured client, so it inherits the circuit breaker, rate limiter and
//! retry policy of that client.

use super::failure;
use crate::server::{parse_args, McpServerError, McpServerResult, Tool, ToolContext};
use crate::types::{ToolDefinition, ToolResult};
use async_trait::async_trait;
use cs_integrations::{IntegrationRegistry, Method, Vendor};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, instrument};

/// List configured integrations with circuit, rate-limit and request stats.
pub struct ListIntegrationsTool {
    registry: Arc<IntegrationRegistry>,
}

impl ListIntegrationsTool {
    /// Create the tool.
    pub fn new(registry: Arc<IntegrationRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for ListIntegrationsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "list_integrations",
            "List configured vendor integrations and their status",
        )
        .with_category("integrations")
        .with_schema(json!({
            "type": "object",
            "properties": {
                "include_available": {
                    "type": "boolean",
                    "description": "Also list supported vendors that are not configured",
                    "default": false
                }
            },
            "required": []
        }))
        .with_permissions(vec!["integrations:read".to_string()])
    }

    #[instrument(skip_all, fields(tool = "list_integrations"))]
    async fn execute(
        &self,
        args: Value,
        _context: &ToolContext,
    ) -> McpServerResult<ToolResult> {
        let params: ListParams = parse_args(args)?;

        let integrations: Vec<Value> = self
            .registry
            .names()
            .iter()
            .filter_map(|name| self.registry.entry(name))
            .map(|entry| {
                let profile = entry.vendor.map(|v| v.profile());
                json!({
                    "name": entry.client.name(),
                    "display_name": profile.map(|p| p.display_name),
                    "category": profile.map(|p| p.category),
                    "status": entry.client.status()
                })
            })
            .collect();

        let mut body = json!({
            "count": integrations.len(),
            "integrations": integrations
        });

        if params.include_available {
            let available: Vec<&str> = Vendor::ALL
                .iter()
                .map(|v| v.as_str())
                .filter(|name| self.registry.entry(name).is_none())
                .collect();
            body["available"] = json!(available);
        }

        Ok(ToolResult::json(body))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListParams {
    #[serde(default)]
    include_available: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CallParams {
    integration: String,
    #[serde(default = "default_method")]
    method: String,
    path: String,
    #[serde(default)]
    query: Map<String, Value>,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default)]
    paginate: bool,
    #[serde(default)]
    max_pages: Option<u32>,
    #[serde(default)]
    items_pointer: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl CallParams {
    fn method(&self) -> McpServerResult<Method> {
        match self.method.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::GET),
            "POST" => Ok(Method::POST),
            "PUT" => Ok(Method::PUT),
            "PATCH" => Ok(Method::PATCH),
            "DELETE" => Ok(Method::DELETE),
            other => Err(McpServerError::InvalidParams(format!(
                "unsupported method: {}",
                other
            ))),
        }
    }

    fn checked_path(&self) -> McpServerResult<&str> {
        let path = self.path.trim();
        if path.is_empty() || path.contains("://") || path.starts_with("//") {
            return Err(McpServerError::InvalidParams(
                "path must be relative to the integration base URL".to_string(),
            ));
        }
        Ok(path)
    }

    fn query_pairs(&self) -> McpServerResult<Vec<(String, String)>> {
        self.query
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => {
                        return Err(McpServerError::InvalidParams(format!(
                            "query parameter {} must be a string, number or boolean",
                            key
                        )))
                    }
                };
                Ok((key.clone(), value))
            })
            .collect()
    }
}

/// Send a request through a configured integration.
pub struct CallIntegrationTool {
    registry: Arc<IntegrationRegistry>,
}

impl CallIntegrationTool {
    /// Create the tool.
    pub fn new(registry: Arc<IntegrationRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for CallIntegrationTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "call_integration",
            "Call a configured vendor API; GET requests can walk every page",
        )
        .with_category("integrations")
        .with_schema(json!({
            "type": "object",
            "properties": {
                "integration": { "type": "string", "description": "Integration name, e.g. stripe" },
                "method": {
                    "type": "string",
                    "enum": ["GET", "POST", "PUT", "PATCH", "DELETE"],
                    "default": "GET"
                },
                "path": { "type": "string", "description": "Path relative to the vendor base URL" },
                "query": { "type": "object", "description": "Query string parameters" },
                "body": { "description": "JSON request body" },
                "paginate": { "type": "boolean", "default": false },
                "max_pages": { "type": "integer", "minimum": 1 },
                "items_pointer": {
                    "type": "string",
                    "description": "JSON pointer to the item array, overriding the vendor default"
                }
            },
            "required": ["integration", "path"]
        }))
        .with_permissions(vec!["integrations:call".to_string()])
    }

    #[instrument(skip_all, fields(tool = "call_integration"))]
    async fn execute(
        &self,
        args: Value,
        _context: &ToolContext,
    ) -> McpServerResult<ToolResult> {
        let params: CallParams = parse_args(args)?;
        let method = params.method()?;
        let path = params.checked_path()?;
        let query = params.query_pairs()?;

        let entry = match self.registry.entry(&params.integration) {
            Some(entry) => entry,
            None => {
                return Ok(ToolResult::error(format!(
                    "Integration not configured: {} (configured: {})",
                    params.integration,
                    self.registry.names().join(", ")
                )))
            }
        };

        debug!(
            integration = %params.integration,
            method = %method,
            path,
            paginate = params.paginate,
            "Calling integration"
        );

        if params.paginate {
            if method != Method::GET {
                return Err(McpServerError::InvalidParams(
                    "paginate is only supported for GET".to_string(),
                ));
            }

            let mut paginator = entry.paginator.clone();
            if let Some(max_pages) = params.max_pages {
                paginator = paginator.with_max_pages(max_pages);
            }
            if let Some(ref pointer) = params.items_pointer {
                paginator = paginator.with_items_pointer(pointer.clone());
            }

            return match paginator.fetch_all(entry.client.as_ref(), path, &query).await {
                Ok(fetched) => Ok(ToolResult::json(json!(fetched))),
                Err(e) => Ok(failure("call integration", e)),
            };
        }

        match entry
            .client
            .request(method, path, &query, params.body.as_ref())
            .await
        {
            Ok(response) => Ok(ToolResult::json(response)),
            Err(e) => Ok(failure("call integration", e)),
        }
    }
}

/// The integration tools.
pub fn integration_tools(registry: Arc<IntegrationRegistry>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ListIntegrationsTool::new(registry.clone())),
        Arc::new(CallIntegrationTool::new(registry)),
    ]
}
