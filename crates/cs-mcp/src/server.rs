//! MCP server implementation
//!
//! Holds the registered tools and resources and answers the MCP methods:
//! `initialize`, `ping`, `tools/list`, `tools/call`, `resources/list` and
//! `resources/read`.

use crate::types::*;
use async_trait::async_trait;
use cs_customers::StoreError;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// MCP server error types.
#[derive(Debug, Error)]
pub enum McpServerError {
    /// Tool not found
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Tool execution failed
    #[error("Tool execution failed: {0}")]
    ExecutionError(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Invalid parameters
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Customer store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Transport I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl McpServerError {
    /// JSON-RPC error for protocol-level failures.
    pub fn to_rpc_error(&self) -> McpError {
        match self {
            McpServerError::ToolNotFound(_)
            | McpServerError::ResourceNotFound(_)
            | McpServerError::InvalidParams(_) => McpError::invalid_params(self.to_string()),
            McpServerError::PermissionDenied(_) => McpError::permission_denied(self.to_string()),
            _ => McpError::internal_error(self.to_string()),
        }
    }

    /// Whether the failure is reported to the caller as a JSON-RPC error
    /// rather than as an error tool result.
    fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            McpServerError::ToolNotFound(_)
                | McpServerError::ResourceNotFound(_)
                | McpServerError::InvalidParams(_)
                | McpServerError::PermissionDenied(_)
        )
    }
}

/// Result type for MCP server operations.
pub type McpServerResult<T> = Result<T, McpServerError>;

/// Trait for tool implementations.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool definition.
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with given arguments.
    async fn execute(
        &self,
        args: serde_json::Value,
        context: &ToolContext,
    ) -> McpServerResult<ToolResult>;
}

/// Trait for readable resources.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Get the resource definition.
    fn definition(&self) -> ResourceDefinition;

    /// Permissions a caller needs to read the resource.
    fn required_permissions(&self) -> Vec<String> {
        Vec::new()
    }

    /// Produce the current contents as JSON.
    async fn read(&self, context: &ToolContext) -> McpServerResult<serde_json::Value>;
}

/// Context for tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Granted permissions (`*` grants everything, `customers:*` a whole domain)
    pub permissions: Vec<String>,

    /// Request correlation ID
    pub correlation_id: Option<String>,
}

impl ToolContext {
    /// Create an empty context.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Context holding the given permissions.
    pub fn with_permissions(permissions: Vec<String>) -> Self {
        Self {
            permissions,
            correlation_id: None,
        }
    }

    /// Check if the context grants a specific permission.
    pub fn has_permission(&self, permission: &str) -> bool {
        let domain = permission.split(':').next().unwrap_or(permission);
        self.permissions.iter().any(|granted| {
            granted == "*"
                || granted == permission
                || granted
                    .strip_suffix(":*")
                    .is_some_and(|granted_domain| granted_domain == domain)
        })
    }
}

/// MCP server.
pub struct McpServer {
    /// Server info
    info: ServerInfo,

    /// Server capabilities
    capabilities: ServerCapabilities,

    /// Context applied to protocol calls
    context: ToolContext,

    /// Registered tools
    tools: RwLock<BTreeMap<String, Arc<dyn Tool>>>,

    /// Registered resources
    resources: RwLock<BTreeMap<String, Arc<dyn Resource>>>,
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("info", &self.info)
            .field("context", &self.context)
            .finish()
    }
}

impl McpServer {
    /// Create a new MCP server with full permissions.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            info: ServerInfo {
                name: name.into(),
                version: version.into(),
            },
            capabilities: ServerCapabilities::default(),
            context: ToolContext::with_permissions(vec!["*".to_string()]),
            tools: RwLock::new(BTreeMap::new()),
            resources: RwLock::new(BTreeMap::new()),
        }
    }

    /// Replace the context used for protocol calls.
    pub fn with_context(mut self, context: ToolContext) -> Self {
        self.context = context;
        self
    }

    /// Register a tool. A tool with the same name is replaced.
    pub async fn register_tool(&self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name;
        let mut tools = self.tools.write().await;
        if tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "Tool replaced");
        }
    }

    /// Register multiple tools.
    pub async fn register_tools(&self, tools: Vec<Arc<dyn Tool>>) {
        for tool in tools {
            self.register_tool(tool).await;
        }
    }

    /// Register a resource.
    pub async fn register_resource(&self, resource: Arc<dyn Resource>) {
        let uri = resource.definition().uri;
        self.resources.write().await.insert(uri, resource);
    }

    /// Get all tool definitions, sorted by name.
    pub async fn list_tools(&self) -> Vec<ToolDefinition> {
        let tools = self.tools.read().await;
        tools.values().map(|t| t.definition()).collect()
    }

    /// Get all resource definitions.
    pub async fn list_resources(&self) -> Vec<ResourceDefinition> {
        let resources = self.resources.read().await;
        resources.values().map(|r| r.definition()).collect()
    }

    /// Execute a tool.
    #[instrument(skip(self, arguments, context))]
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> McpServerResult<ToolResult> {
        let tool = {
            let tools = self.tools.read().await;
            tools
                .get(name)
                .cloned()
                .ok_or_else(|| McpServerError::ToolNotFound(name.to_string()))?
        };

        check_permissions(&tool.definition().required_permissions, context)?;
        tool.execute(arguments, context).await
    }

    /// Read a resource.
    pub async fn read_resource(
        &self,
        uri: &str,
        context: &ToolContext,
    ) -> McpServerResult<ResourceContents> {
        let resource = {
            let resources = self.resources.read().await;
            resources
                .get(uri)
                .cloned()
                .ok_or_else(|| McpServerError::ResourceNotFound(uri.to_string()))?
        };

        check_permissions(&resource.required_permissions(), context)?;
        let value = resource.read(context).await?;
        Ok(ResourceContents {
            uri: uri.to_string(),
            mime_type: resource.definition().mime_type,
            text: serde_json::to_string_pretty(&value)
                .map_err(|e| McpServerError::Internal(e.to_string()))?,
        })
    }

    /// Handle an MCP request. Notifications get no response.
    pub async fn handle_request(&self, request: McpRequest) -> Option<McpResponse> {
        if request.is_notification() {
            debug!(method = %request.method, "Notification received");
            return None;
        }

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.id),
            "ping" => McpResponse::success(request.id, serde_json::json!({})),
            "tools/list" => self.handle_tools_list(request.id).await,
            "tools/call" => self.handle_tools_call(request.id, request.params).await,
            "resources/list" => self.handle_resources_list(request.id).await,
            "resources/read" => self.handle_resources_read(request.id, request.params).await,
            _ => McpResponse::error(request.id, McpError::method_not_found(&request.method)),
        };
        Some(response)
    }

    fn handle_initialize(&self, id: RequestId) -> McpResponse {
        info!(server = %self.info.name, "Session initialized");
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: self.capabilities.clone(),
            server_info: self.info.clone(),
        };
        match serde_json::to_value(result) {
            Ok(value) => McpResponse::success(id, value),
            Err(e) => McpResponse::error(id, McpError::internal_error(e.to_string())),
        }
    }

    async fn handle_tools_list(&self, id: RequestId) -> McpResponse {
        let tools = self.list_tools().await;
        McpResponse::success(id, serde_json::json!({ "tools": tools }))
    }

    async fn handle_tools_call(
        &self,
        id: RequestId,
        params: Option<serde_json::Value>,
    ) -> McpResponse {
        let params = match params {
            Some(p) => p,
            None => return McpResponse::error(id, McpError::invalid_params("Missing params")),
        };

        let call: ToolCall = match serde_json::from_value(params) {
            Ok(c) => c,
            Err(e) => return McpResponse::error(id, McpError::invalid_params(e.to_string())),
        };

        let result = match self.call_tool(&call.name, call.arguments, &self.context).await {
            Ok(result) => result,
            Err(e) if e.is_protocol_error() => return McpResponse::error(id, e.to_rpc_error()),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool call failed");
                ToolResult::error(e.to_string())
            }
        };

        match serde_json::to_value(result) {
            Ok(value) => McpResponse::success(id, value),
            Err(e) => McpResponse::error(id, McpError::internal_error(e.to_string())),
        }
    }

    async fn handle_resources_list(&self, id: RequestId) -> McpResponse {
        let resources = self.list_resources().await;
        McpResponse::success(id, serde_json::json!({ "resources": resources }))
    }

    async fn handle_resources_read(
        &self,
        id: RequestId,
        params: Option<serde_json::Value>,
    ) -> McpResponse {
        let params: ReadResourceParams = match params.map(serde_json::from_value) {
            Some(Ok(p)) => p,
            Some(Err(e)) => return McpResponse::error(id, McpError::invalid_params(e.to_string())),
            None => return McpResponse::error(id, McpError::invalid_params("Missing params")),
        };

        match self.read_resource(&params.uri, &self.context).await {
            Ok(contents) => McpResponse::success(id, serde_json::json!({ "contents": [contents] })),
            Err(e) => McpResponse::error(id, e.to_rpc_error()),
        }
    }

    /// Get server info.
    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    /// Get server capabilities.
    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }
}

fn check_permissions(required: &[String], context: &ToolContext) -> McpServerResult<()> {
    match required.iter().find(|p| !context.has_permission(p)) {
        Some(missing) => Err(McpServerError::PermissionDenied(format!(
            "Missing permission: {}",
            missing
        ))),
        None => Ok(()),
    }
}

/// Parse tool arguments into a typed struct.
pub fn parse_args<T: serde::de::DeserializeOwned>(args: serde_json::Value) -> McpServerResult<T> {
    serde_json::from_value(args).map_err(|e| McpServerError::InvalidParams(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct TestTool;

    #[async_trait]
    impl Tool for TestTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("test_tool", "A test tool")
                .with_category("test")
                .with_permissions(vec!["customers:read".to_string()])
        }

        async fn execute(
            &self,
            args: serde_json::Value,
            _context: &ToolContext,
        ) -> McpServerResult<ToolResult> {
            if args.get("fail").is_some() {
                return Err(McpServerError::ExecutionError("boom".to_string()));
            }
            Ok(ToolResult::text("Test result"))
        }
    }

    struct TestResource;

    #[async_trait]
    impl Resource for TestResource {
        fn definition(&self) -> ResourceDefinition {
            ResourceDefinition::json("cs://test", "Test", "A test resource")
        }

        fn required_permissions(&self) -> Vec<String> {
            vec!["customers:read".to_string()]
        }

        async fn read(&self, _context: &ToolContext) -> McpServerResult<serde_json::Value> {
            Ok(json!({"ok": true}))
        }
    }

    async fn server() -> McpServer {
        let server = McpServer::new("test-server", "0.0.1");
        server.register_tool(Arc::new(TestTool)).await;
        server.register_resource(Arc::new(TestResource)).await;
        server
    }

    async fn call(server: &McpServer, method: &str, params: serde_json::Value) -> McpResponse {
        server
            .handle_request(McpRequest::new(RequestId::Number(1), method).with_params(params))
            .await
            .unwrap()
    }

    #[test]
    fn test_permission_matching() {
        let ctx = ToolContext::with_permissions(vec!["customers:*".to_string(), "alerts:read".to_string()]);
        assert!(ctx.has_permission("customers:write"));
        assert!(ctx.has_permission("alerts:read"));
        assert!(!ctx.has_permission("alerts:write"));
        assert!(!ctx.has_permission("integrations:call"));

        assert!(ToolContext::with_permissions(vec!["*".to_string()]).has_permission("agents:run"));
        assert!(!ToolContext::empty().has_permission("customers:read"));
    }

    #[tokio::test]
    async fn test_initialize_and_ping() {
        let server = server().await;

        let resp = call(&server, "initialize", json!({})).await;
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "test-server");

        let resp = call(&server, "ping", json!({})).await;
        assert_eq!(resp.result.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let server = server().await;
        let resp = server
            .handle_request(McpRequest::new(RequestId::Null, "notifications/initialized"))
            .await;
        assert!(resp.is_none());
    }

    #[tokio::test]
    async fn test_tools_call() {
        let server = server().await;

        let resp = call(&server, "tools/call", json!({"name": "test_tool", "arguments": {}})).await;
        let result = resp.result.unwrap();
        assert_eq!(result["isError"], false);
        assert_eq!(result["content"][0]["text"], "Test result");

        let resp = call(&server, "tools/call", json!({"name": "test_tool", "arguments": {"fail": 1}})).await;
        assert_eq!(resp.result.unwrap()["isError"], true);

        let resp = call(&server, "tools/call", json!({"name": "missing"})).await;
        assert_eq!(resp.error.unwrap().code, McpError::INVALID_PARAMS);

        let resp = server.handle_request(McpRequest::new(RequestId::Number(2), "tools/call")).await.unwrap();
        assert_eq!(resp.error.unwrap().code, McpError::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_permission_denied() {
        let server = McpServer::new("test-server", "0.0.1")
            .with_context(ToolContext::with_permissions(vec!["alerts:*".to_string()]));
        server.register_tool(Arc::new(TestTool)).await;

        let resp = call(&server, "tools/call", json!({"name": "test_tool"})).await;
        let error = resp.error.unwrap();
        assert_eq!(error.code, McpError::PERMISSION_DENIED);
        assert!(error.message.contains("customers:read"));
    }

    #[tokio::test]
    async fn test_resource_permission_denied() {
        let server = McpServer::new("test-server", "0.0.1")
            .with_context(ToolContext::with_permissions(vec!["integrations:read".to_string()]));
        server.register_resource(Arc::new(TestResource)).await;

        let resp = call(&server, "resources/read", json!({"uri": "cs://test"})).await;
        let error = resp.error.unwrap();
        assert_eq!(error.code, McpError::PERMISSION_DENIED);
        assert!(error.message.contains("customers:read"));
        assert!(resp.result.is_none());
    }

    #[tokio::test]
    async fn test_resources() {
        let server = server().await;

        let resp = call(&server, "resources/list", json!({})).await;
        assert_eq!(resp.result.unwrap()["resources"][0]["uri"], "cs://test");

        let resp = call(&server, "resources/read", json!({"uri": "cs://test"})).await;
        let contents = &resp.result.unwrap()["contents"][0];
        assert_eq!(contents["mimeType"], "application/json");
        let body: serde_json::Value = serde_json::from_str(contents["text"].as_str().unwrap()).unwrap();
        assert_eq!(body, json!({"ok": true}));

        let resp = call(&server, "resources/read", json!({"uri": "cs://nope"})).await;
        assert_eq!(resp.error.unwrap().code, McpError::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let server = server().await;
        let resp = call(&server, "prompts/list", json!({})).await;
        assert_eq!(resp.error.unwrap().code, McpError::METHOD_NOT_FOUND);
    }
}
