//! Readable MCP resources

use crate::server::{McpServerResult, Resource, ToolContext};
use crate::types::ResourceDefinition;
use async_trait::async_trait;
use cs_customers::CustomerStore;
use cs_integrations::IntegrationRegistry;
use serde_json::{json, Value};
use std::sync::Arc;

/// URI of the at-risk customer list.
pub const AT_RISK_URI: &str = "cs://customers/at-risk";

/// URI of the integration status snapshot.
pub const INTEGRATION_STATUS_URI: &str = "cs://integrations/status";

/// Active customers whose health score is under the alert threshold.
pub struct AtRiskCustomersResource {
    store: Arc<CustomerStore>,
    health_threshold: u8,
}

impl AtRiskCustomersResource {
    /// Create the resource.
    pub fn new(store: Arc<CustomerStore>, health_threshold: u8) -> Self {
        Self {
            store,
            health_threshold,
        }
    }
}

#[async_trait]
impl Resource for AtRiskCustomersResource {
    fn definition(&self) -> ResourceDefinition {
        ResourceDefinition::json(
            AT_RISK_URI,
            "At-risk customers",
            format!(
                "Active customers with a health score below {}, lowest first",
                self.health_threshold
            ),
        )
    }

    fn required_permissions(&self) -> Vec<String> {
        vec!["customers:read".to_string()]
    }

    async fn read(&self, _context: &ToolContext) -> McpServerResult<Value> {
        let customers = self.store.below_health(self.health_threshold).await?;
        Ok(json!({
            "health_threshold": self.health_threshold,
            "count": customers.len(),
            "customers": customers
        }))
    }
}

/// Circuit, rate-limit and request stats for every integration.
pub struct IntegrationStatusResource {
    registry: Arc<IntegrationRegistry>,
}

impl IntegrationStatusResource {
    /// Create the resource.
    pub fn new(registry: Arc<IntegrationRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Resource for IntegrationStatusResource {
    fn definition(&self) -> ResourceDefinition {
        ResourceDefinition::json(
            INTEGRATION_STATUS_URI,
            "Integration status",
            "Circuit breaker, rate limit and request statistics per integration",
        )
    }

    fn required_permissions(&self) -> Vec<String> {
        vec!["integrations:read".to_string()]
    }

    async fn read(&self, _context: &ToolContext) -> McpServerResult<Value> {
        Ok(json!({ "integrations": self.registry.statuses() }))
    }
}

/// Both resources.
pub fn all_resources(
    store: Arc<CustomerStore>,
    registry: Arc<IntegrationRegistry>,
    health_threshold: u8,
) -> Vec<Arc<dyn Resource>> {
    vec![
        Arc::new(AtRiskCustomersResource::new(store, health_threshold)),
        Arc::new(IntegrationStatusResource::new(registry)),
    ]
}
