//! Customer record tools
//!
//! CRUD over the customer store. Validation lives in the store; these
//! tools decode arguments and shape the JSON that goes back to the client.

use super::{failure, id_schema};
use crate::server::{parse_args, McpServerResult, Tool, ToolContext};
use crate::types::{ToolDefinition, ToolResult};
use async_trait::async_trait;
use cs_customers::{CustomerQuery, CustomerStore, CustomerUpdate, NewCustomer};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

const READ: &str = "customers:read";
const WRITE: &str = "customers:write";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct IdParams {
    id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateParams {
    id: Uuid,
    changes: CustomerUpdate,
}

fn customer_fields() -> serde_json::Value {
    json!({
        "name": { "type": "string", "description": "Account name" },
        "domain": { "type": ["string", "null"], "description": "Primary web domain" },
        "contact_email": { "type": ["string", "null"], "description": "Main point of contact" },
        "tier": {
            "type": "string",
            "enum": ["starter", "growth", "business", "enterprise"]
        },
        "stage": {
            "type": "string",
            "enum": ["onboarding", "adoption", "expansion", "renewal", "at_risk", "churned"]
        },
        "health_score": { "type": "integer", "minimum": 0, "maximum": 100 },
        "arr": { "type": "number", "minimum": 0 },
        "renewal_date": { "type": ["string", "null"], "format": "date" },
        "last_engagement_at": { "type": ["string", "null"], "format": "date-time" },
        "nps_score": { "type": ["integer", "null"], "minimum": -100, "maximum": 100 },
        "open_tickets": { "type": "integer", "minimum": 0 },
        "usage_score": { "type": "integer", "minimum": 0, "maximum": 100 },
        "onboarding_progress": { "type": "integer", "minimum": 0, "maximum": 100 },
        "metadata": { "type": "object" }
    })
}

/// Create a customer record.
pub struct CreateCustomerTool {
    store: Arc<CustomerStore>,
}

impl CreateCustomerTool {
    /// Create the tool.
    pub fn new(store: Arc<CustomerStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CreateCustomerTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("create_customer", "Create a customer record")
            .with_category("customers")
            .with_schema(json!({
                "type": "object",
                "properties": customer_fields(),
                "required": ["name"],
                "additionalProperties": false
            }))
            .with_permissions(vec![WRITE.to_string()])
    }

    #[instrument(skip_all, fields(tool = "create_customer"))]
    async fn execute(
        &self,
        args: serde_json::Value,
        _context: &ToolContext,
    ) -> McpServerResult<ToolResult> {
        let input: NewCustomer = parse_args(args)?;

        match self.store.create(input).await {
            Ok(customer) => {
                info!(customer_id = %customer.id, "Customer created");
                Ok(ToolResult::json(json!(customer)))
            }
            Err(e) => Ok(failure("create customer", e)),
        }
    }
}

/// Fetch one customer by id.
pub struct GetCustomerTool {
    store: Arc<CustomerStore>,
}

impl GetCustomerTool {
    /// Create the tool.
    pub fn new(store: Arc<CustomerStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetCustomerTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("get_customer", "Fetch a customer by id")
            .with_category("customers")
            .with_schema(id_schema("Customer id"))
            .with_permissions(vec![READ.to_string()])
    }

    #[instrument(skip_all, fields(tool = "get_customer"))]
    async fn execute(
        &self,
        args: serde_json::Value,
        _context: &ToolContext,
    ) -> McpServerResult<ToolResult> {
        let params: IdParams = parse_args(args)?;

        match self.store.require(params.id).await {
            Ok(customer) => Ok(ToolResult::json(json!(customer))),
            Err(e) => Ok(failure("get customer", e)),
        }
    }
}

/// List customers with filters and paging.
pub struct ListCustomersTool {
    store: Arc<CustomerStore>,
}

impl ListCustomersTool {
    /// Create the tool.
    pub fn new(store: Arc<CustomerStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListCustomersTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "list_customers",
            "List customers, filtered by tier, stage, health range or name",
        )
        .with_category("customers")
        .with_schema(json!({
            "type": "object",
            "properties": {
                "tier": {
                    "type": "string",
                    "enum": ["starter", "growth", "business", "enterprise"]
                },
                "stage": {
                    "type": "string",
                    "enum": ["onboarding", "adoption", "expansion", "renewal", "at_risk", "churned"]
                },
                "min_health": { "type": "integer", "minimum": 0, "maximum": 100 },
                "max_health": { "type": "integer", "minimum": 0, "maximum": 100 },
                "search": { "type": "string", "description": "Case-insensitive name substring" },
                "limit": { "type": "integer", "minimum": 1, "maximum": 500, "default": 50 },
                "offset": { "type": "integer", "minimum": 0, "default": 0 }
            },
            "required": []
        }))
        .with_permissions(vec![READ.to_string()])
    }

    #[instrument(skip_all, fields(tool = "list_customers"))]
    async fn execute(
        &self,
        args: serde_json::Value,
        _context: &ToolContext,
    ) -> McpServerResult<ToolResult> {
        let query: CustomerQuery = parse_args(args)?;
        debug!(?query, "Listing customers");

        let customers = match self.store.list(&query).await {
            Ok(customers) => customers,
            Err(e) => return Ok(failure("list customers", e)),
        };
        let total = match self.store.count(&query).await {
            Ok(total) => total,
            Err(e) => return Ok(failure("count customers", e)),
        };

        Ok(ToolResult::json(json!({
            "customers": customers,
            "total": total,
            "limit": query.effective_limit(),
            "offset": query.offset.unwrap_or(0)
        })))
    }
}

/// Apply a partial update to a customer.
pub struct UpdateCustomerTool {
    store: Arc<CustomerStore>,
}

impl UpdateCustomerTool {
    /// Create the tool.
    pub fn new(store: Arc<CustomerStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for UpdateCustomerTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "update_customer",
            "Update fields of a customer; null clears an optional field",
        )
        .with_category("customers")
        .with_schema(json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "format": "uuid", "description": "Customer id" },
                "changes": {
                    "type": "object",
                    "properties": customer_fields(),
                    "additionalProperties": false
                }
            },
            "required": ["id", "changes"]
        }))
        .with_permissions(vec![WRITE.to_string()])
    }

    #[instrument(skip_all, fields(tool = "update_customer"))]
    async fn execute(
        &self,
        args: serde_json::Value,
        _context: &ToolContext,
    ) -> McpServerResult<ToolResult> {
        let params: UpdateParams = parse_args(args)?;

        match self.store.update(params.id, params.changes).await {
            Ok(customer) => {
                info!(customer_id = %customer.id, "Customer updated");
                Ok(ToolResult::json(json!(customer)))
            }
            Err(e) => Ok(failure("update customer", e)),
        }
    }
}

/// Delete a customer and its alerts.
pub struct DeleteCustomerTool {
    store: Arc<CustomerStore>,
}

impl DeleteCustomerTool {
    /// Create the tool.
    pub fn new(store: Arc<CustomerStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for DeleteCustomerTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("delete_customer", "Delete a customer and its alerts")
            .with_category("customers")
            .with_schema(id_schema("Customer id"))
            .with_permissions(vec![WRITE.to_string()])
    }

    #[instrument(skip_all, fields(tool = "delete_customer"))]
    async fn execute(
        &self,
        args: serde_json::Value,
        _context: &ToolContext,
    ) -> McpServerResult<ToolResult> {
        let params: IdParams = parse_args(args)?;

        match self.store.delete(params.id).await {
            Ok(()) => {
                info!(customer_id = %params.id, "Customer deleted");
                Ok(ToolResult::json(json!({ "id": params.id, "deleted": true })))
            }
            Err(e) => Ok(failure("delete customer", e)),
        }
    }
}

/// The customer CRUD tools.
pub fn customer_tools(store: Arc<CustomerStore>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(CreateCustomerTool::new(store.clone())),
        Arc::new(GetCustomerTool::new(store.clone())),
        Arc::new(ListCustomersTool::new(store.clone())),
        Arc::new(UpdateCustomerTool::new(store.clone())),
        Arc::new(DeleteCustomerTool::new(store)),
    ]
}
