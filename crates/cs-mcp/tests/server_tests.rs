//! End-to-end tool and resource calls through the JSON-RPC surface.

use cs_agents::{AgentConfig, AlertBus, AutonomousScheduler, MemoryAlertBus, StoreAlertHandler};
use cs_customers::CustomerStore;
use cs_integrations::{
    BaseIntegration, Credentials, IntegrationConfig, IntegrationRegistry, Pagination, Paginator,
    RetryConfig,
};
use cs_mcp::{
    build_server, HealthCheckConfig, HealthChecker, McpError, McpRequest, McpResponse, McpServer,
    RequestId, ServerConfig, ToolDeps, AT_RISK_URI, INTEGRATION_STATUS_URI,
};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    server: McpServer,
    next_id: std::sync::atomic::AtomicI64,
}

async fn harness_with(vendor: Option<&MockServer>, permissions: &[&str]) -> Harness {
    let store = Arc::new(CustomerStore::in_memory().await.unwrap());

    let mut registry = IntegrationRegistry::new();
    if let Some(mock) = vendor {
        let client = BaseIntegration::new(
            IntegrationConfig::new("mockdesk", mock.uri())
                .with_credentials(Credentials::Bearer {
                    token: "secret".into(),
                })
                .with_retry(RetryConfig::no_retry()),
        )
        .unwrap();
        registry.register(
            Arc::new(client),
            None,
            Paginator::new(
                Pagination::PageNumber {
                    page_param: "page",
                    size_param: Some("per_page"),
                    page_size: 2,
                    first_page: 1,
                },
                "/data",
            ),
        );
    }
    let registry = Arc::new(registry);

    let bus = Arc::new(MemoryAlertBus::new());
    bus.register_handler(Arc::new(StoreAlertHandler::new(store.clone())))
        .await
        .unwrap();
    let scheduler = AutonomousScheduler::new(store.clone(), bus, AgentConfig::default());
    let health = HealthChecker::new(store.clone(), registry.clone(), HealthCheckConfig::default());

    let config = ServerConfig {
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
        ..ServerConfig::default()
    };
    let deps = ToolDeps {
        store,
        registry,
        scheduler,
        health,
    };

    Harness {
        server: build_server(&config, &deps).await,
        next_id: std::sync::atomic::AtomicI64::new(1),
    }
}

async fn harness() -> Harness {
    harness_with(None, &["*"]).await
}

impl Harness {
    async fn rpc(&self, method: &str, params: Value) -> McpResponse {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let response = self
            .server
            .handle_request(McpRequest::new(RequestId::Number(id), method).with_params(params))
            .await
            .unwrap();
        assert_eq!(response.id, RequestId::Number(id));
        response
    }

    /// Call a tool; returns (is_error, decoded body or raw text).
    async fn tool(&self, name: &str, arguments: Value) -> (bool, Value) {
        let response = self
            .rpc("tools/call", json!({"name": name, "arguments": arguments}))
            .await;
        let result = response
            .result
            .unwrap_or_else(|| panic!("{} returned {:?}", name, response.error));
        let text = result["content"][0]["text"].as_str().unwrap().to_string();
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        (result["isError"].as_bool().unwrap(), body)
    }

    async fn ok(&self, name: &str, arguments: Value) -> Value {
        let (is_error, body) = self.tool(name, arguments).await;
        assert!(!is_error, "{} failed: {}", name, body);
        body
    }

    async fn rpc_error(&self, name: &str, arguments: Value) -> McpError {
        self.rpc("tools/call", json!({"name": name, "arguments": arguments}))
            .await
            .error
            .unwrap()
    }
}

#[tokio::test]
async fn test_tools_and_resources_listed() {
    let h = harness().await;

    let tools = h.rpc("tools/list", json!({})).await.result.unwrap();
    let names: Vec<&str> = tools["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            "acknowledge_alert",
            "call_integration",
            "create_customer",
            "delete_customer",
            "get_customer",
            "health_check",
            "list_alerts",
            "list_customers",
            "list_integrations",
            "list_workers",
            "run_worker",
            "update_customer",
        ]
    );

    let resources = h.rpc("resources/list", json!({})).await.result.unwrap();
    let uris: Vec<&str> = resources["resources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["uri"].as_str().unwrap())
        .collect();
    assert!(uris.contains(&AT_RISK_URI));
    assert!(uris.contains(&INTEGRATION_STATUS_URI));
}

#[tokio::test]
async fn test_customer_crud() {
    let h = harness().await;

    let created = h
        .ok(
            "create_customer",
            json!({
                "name": "Acme Corp",
                "domain": "acme.com",
                "tier": "enterprise",
                "arr": 120000.0
            }),
        )
        .await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["health_score"], 70);
    assert_eq!(created["stage"], "onboarding");

    let fetched = h.ok("get_customer", json!({ "id": id })).await;
    assert_eq!(fetched["name"], "Acme Corp");

    h.ok("create_customer", json!({"name": "Globex", "tier": "starter"}))
        .await;
    let listed = h
        .ok("list_customers", json!({"tier": "enterprise", "limit": 10}))
        .await;
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["limit"], 10);
    assert_eq!(listed["customers"][0]["id"], id.as_str());

    let updated = h
        .ok(
            "update_customer",
            json!({"id": id, "changes": {"domain": null, "health_score": 55}}),
        )
        .await;
    assert_eq!(updated["domain"], Value::Null);
    assert_eq!(updated["health_score"], 55);
    assert_eq!(updated["tier"], "enterprise");

    let deleted = h.ok("delete_customer", json!({ "id": id })).await;
    assert_eq!(deleted["deleted"], true);

    let (is_error, body) = h.tool("get_customer", json!({ "id": id })).await;
    assert!(is_error);
    assert!(body.as_str().unwrap().contains("not found"));

    let (is_error, _) = h.tool("delete_customer", json!({ "id": id })).await;
    assert!(is_error);
}

#[tokio::test]
async fn test_bad_arguments_and_validation() {
    let h = harness().await;

    // Decoding failures are protocol errors
    let error = h.rpc_error("create_customer", json!({"name": "X", "colour": "red"})).await;
    assert_eq!(error.code, McpError::INVALID_PARAMS);

    let error = h.rpc_error("get_customer", json!({"id": "not-a-uuid"})).await;
    assert_eq!(error.code, McpError::INVALID_PARAMS);

    let error = h.rpc_error("no_such_tool", json!({})).await;
    assert_eq!(error.code, McpError::INVALID_PARAMS);

    // Domain failures are tool errors
    let (is_error, body) = h
        .tool("create_customer", json!({"name": "  ", "contact_email": "nope"}))
        .await;
    assert!(is_error);
    let message = body.as_str().unwrap();
    assert!(message.contains("name must not be empty"));
    assert!(message.contains("not a valid email"));

    let created = h.ok("create_customer", json!({"name": "Initech"})).await;
    let (is_error, body) = h
        .tool("update_customer", json!({"id": created["id"], "changes": {}}))
        .await;
    assert!(is_error);
    assert!(body.as_str().unwrap().contains("no fields"));
}

#[tokio::test]
async fn test_permissions_enforced() {
    let h = harness_with(None, &["customers:read", "alerts:*"]).await;

    h.ok("list_customers", json!({})).await;
    h.ok("list_alerts", json!({})).await;

    let error = h.rpc_error("create_customer", json!({"name": "Acme"})).await;
    assert_eq!(error.code, McpError::PERMISSION_DENIED);
    assert!(error.message.contains("customers:write"));

    let error = h.rpc_error("run_worker", json!({"name": "health_score_monitor"})).await;
    assert_eq!(error.code, McpError::PERMISSION_DENIED);
}

#[tokio::test]
async fn test_worker_run_alerts_and_cooldown() {
    let h = harness().await;

    let customer = h
        .ok("create_customer", json!({"name": "Umbrella", "health_score": 10}))
        .await;
    h.ok("create_customer", json!({"name": "Healthy Co", "health_score": 90}))
        .await;

    let report = h
        .ok("run_worker", json!({"name": "health_score_monitor"}))
        .await;
    assert_eq!(report["alerts_found"], 1);
    assert_eq!(report["alerts_published"], 1);

    let alerts = h.ok("list_alerts", json!({"unacknowledged_only": true})).await;
    assert_eq!(alerts["count"], 1);
    let alert = &alerts["alerts"][0];
    assert_eq!(alert["customer_id"], customer["id"]);
    assert_eq!(alert["kind"], "low_health");
    assert_eq!(alert["severity"], "critical");

    // Same customer, same kind: suppressed by the cooldown
    let report = h
        .ok("run_worker", json!({"name": "health_score_monitor"}))
        .await;
    assert_eq!(report["alerts_suppressed"], 1);
    assert_eq!(report["alerts_published"], 0);

    let acknowledged = h
        .ok("acknowledge_alert", json!({"id": alert["id"]}))
        .await;
    assert!(acknowledged["acknowledged_at"].is_string());
    let alerts = h.ok("list_alerts", json!({"unacknowledged_only": true})).await;
    assert_eq!(alerts["count"], 0);

    let workers = h.ok("list_workers", json!({})).await;
    let health = workers["workers"]
        .as_array()
        .unwrap()
        .iter()
        .find(|w| w["name"] == "health_score_monitor")
        .unwrap();
    assert_eq!(health["runs"], 2);
    assert_eq!(health["running"], false);

    let (is_error, body) = h.tool("run_worker", json!({"name": "nope"})).await;
    assert!(is_error);
    assert!(body.as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn test_at_risk_resource() {
    let h = harness().await;

    h.ok("create_customer", json!({"name": "Low", "health_score": 15}))
        .await;
    h.ok("create_customer", json!({"name": "Gone", "health_score": 5, "stage": "churned"}))
        .await;
    h.ok("create_customer", json!({"name": "Fine", "health_score": 80}))
        .await;

    let response = h.rpc("resources/read", json!({"uri": AT_RISK_URI})).await;
    let contents = &response.result.unwrap()["contents"][0];
    let body: Value = serde_json::from_str(contents["text"].as_str().unwrap()).unwrap();
    assert_eq!(body["count"], 1);
    assert_eq!(body["customers"][0]["name"], "Low");
}

#[tokio::test]
async fn test_resources_require_permissions() {
    let h = harness_with(None, &["integrations:read"]).await;

    let response = h.rpc("resources/read", json!({"uri": AT_RISK_URI})).await;
    assert!(response.result.is_none());
    let error = response.error.unwrap();
    assert_eq!(error.code, McpError::PERMISSION_DENIED);
    assert!(error.message.contains("customers:read"));

    let response = h
        .rpc("resources/read", json!({"uri": INTEGRATION_STATUS_URI}))
        .await;
    assert!(response.result.is_some());
}

#[tokio::test]
async fn test_call_integration() {
    let vendor = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/accounts"))
        .and(query_param("status", "active"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [{"id": "a1"}]})))
        .mount(&vendor)
        .await;

    Mock::given(method("POST"))
        .and(path("/notes"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "n1"})))
        .expect(1)
        .mount(&vendor)
        .await;

    let h = harness_with(Some(&vendor), &["*"]).await;

    let body = h
        .ok(
            "call_integration",
            json!({"integration": "mockdesk", "path": "/accounts", "query": {"status": "active"}}),
        )
        .await;
    assert_eq!(body["data"][0]["id"], "a1");

    let body = h
        .ok(
            "call_integration",
            json!({
                "integration": "mockdesk",
                "method": "POST",
                "path": "/notes",
                "body": {"text": "renewal call booked"}
            }),
        )
        .await;
    assert_eq!(body["id"], "n1");

    let error = h
        .rpc_error(
            "call_integration",
            json!({"integration": "mockdesk", "path": "https://attacker.example/steal"}),
        )
        .await;
    assert_eq!(error.code, McpError::INVALID_PARAMS);

    let (is_error, body) = h
        .tool("call_integration", json!({"integration": "zendesk", "path": "/tickets"}))
        .await;
    assert!(is_error);
    assert!(body.as_str().unwrap().contains("mockdesk"));

    let (is_error, body) = h
        .tool("call_integration", json!({"integration": "mockdesk", "path": "/missing"}))
        .await;
    assert!(is_error);
    assert!(body.as_str().unwrap().contains("Failed to call integration"));
}

#[tokio::test]
async fn test_call_integration_paginated() {
    let vendor = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": [{"id": 1}, {"id": 2}]})),
        )
        .mount(&vendor)
        .await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [{"id": 3}]})))
        .mount(&vendor)
        .await;

    let h = harness_with(Some(&vendor), &["*"]).await;

    let fetched = h
        .ok(
            "call_integration",
            json!({"integration": "mockdesk", "path": "/users", "paginate": true}),
        )
        .await;
    assert_eq!(fetched["items"].as_array().unwrap().len(), 3);
    assert_eq!(fetched["pages"], 2);
    assert_eq!(fetched["truncated"], false);

    let fetched = h
        .ok(
            "call_integration",
            json!({"integration": "mockdesk", "path": "/users", "paginate": true, "max_pages": 1}),
        )
        .await;
    assert_eq!(fetched["items"].as_array().unwrap().len(), 2);
    assert_eq!(fetched["truncated"], true);

    let error = h
        .rpc_error(
            "call_integration",
            json!({"integration": "mockdesk", "method": "POST", "path": "/users", "paginate": true}),
        )
        .await;
    assert_eq!(error.code, McpError::INVALID_PARAMS);
}

#[tokio::test]
async fn test_integration_status_and_health() {
    let vendor = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&vendor)
        .await;

    let h = harness_with(Some(&vendor), &["*"]).await;

    let listed = h
        .ok("list_integrations", json!({"include_available": true}))
        .await;
    assert_eq!(listed["count"], 1);
    assert_eq!(listed["integrations"][0]["name"], "mockdesk");
    assert_eq!(listed["integrations"][0]["status"]["circuit"]["state"], "closed");
    assert!(listed["available"].as_array().unwrap().iter().any(|v| v == "stripe"));

    let report = h.ok("health_check", json!({})).await;
    assert_eq!(report["status"], "healthy");
    let names: Vec<&str> = report["services"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["database", "mockdesk"]);

    let readiness = h.ok("health_check", json!({"scope": "readiness"})).await;
    assert_eq!(readiness["ready"], true);

    let response = h.rpc("resources/read", json!({"uri": INTEGRATION_STATUS_URI})).await;
    let contents = &response.result.unwrap()["contents"][0];
    let body: Value = serde_json::from_str(contents["text"].as_str().unwrap()).unwrap();
    assert_eq!(body["integrations"][0]["name"], "mockdesk");
}

#[tokio::test]
async fn test_unhealthy_integration_degrades_report() {
    let vendor = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&vendor)
        .await;

    let h = harness_with(Some(&vendor), &["*"]).await;

    let report = h.ok("health_check", json!({"scope": "full"})).await;
    assert_eq!(report["status"], "degraded");
    assert_eq!(report["services"][1]["status"], "down");
    assert!(report["services"][1]["error"].is_string());
}
