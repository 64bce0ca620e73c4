//! Token lifecycle tests for the OAuth2 client against a mock vendor.

use cs_integrations::{
    AccessToken, CircuitBreakerConfig, CircuitState, Integration, IntegrationConfig,
    IntegrationError, OAuth2Integration, OAuth2Settings, RetryConfig,
};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{bearer_token, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn token_body(token: &str, expires_in: i64) -> serde_json::Value {
    json!({
        "access_token": token,
        "token_type": "Bearer",
        "expires_in": expires_in
    })
}

fn integration(server: &MockServer, settings: OAuth2Settings) -> OAuth2Integration {
    OAuth2Integration::new(
        IntegrationConfig::new("hubspot", server.uri())
            .with_oauth2(settings)
            .with_retry(RetryConfig::no_retry())
            .with_health_path("/account-info/v3/details"),
    )
    .unwrap()
}

fn client_credentials(server: &MockServer) -> OAuth2Settings {
    OAuth2Settings::new("client-id", "client-secret", format!("{}/oauth/token", server.uri()))
}

#[tokio::test]
async fn test_token_is_fetched_once_and_reused() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=client-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok-1", 3600)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/crm/v3/objects/companies"))
        .and(bearer_token("tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(2)
        .mount(&server)
        .await;

    let hubspot = integration(&server, client_credentials(&server));
    hubspot.get("/crm/v3/objects/companies", &[]).await.unwrap();
    hubspot.get("/crm/v3/objects/companies", &[]).await.unwrap();

    assert_eq!(hubspot.refresh_count(), 1);
    assert_eq!(hubspot.status().token_valid, Some(true));
}

#[tokio::test]
async fn test_token_inside_buffer_is_refreshed() {
    let server = MockServer::start().await;

    // Expires in 30s, inside the default 60s buffer
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("short-lived", 30)))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(bearer_token("short-lived"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(2)
        .mount(&server)
        .await;

    let hubspot = integration(&server, client_credentials(&server));
    hubspot.get("/a", &[]).await.unwrap();
    hubspot.get("/b", &[]).await.unwrap();

    assert_eq!(hubspot.refresh_count(), 2);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body("shared", 3600))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(bearer_token("shared"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(3)
        .mount(&server)
        .await;

    let hubspot = integration(&server, client_credentials(&server));
    let (a, b, c) = tokio::join!(
        hubspot.get("/one", &[]),
        hubspot.get("/two", &[]),
        hubspot.get("/three", &[]),
    );

    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(hubspot.refresh_count(), 1);
}

#[tokio::test]
async fn test_unauthorized_triggers_single_refresh_and_retry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("stale", 3600)))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("fresh", 3600)))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(bearer_token("stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(bearer_token("fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"portalId": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let hubspot = integration(&server, client_credentials(&server));
    let body = hubspot.get("/account-info/v3/details", &[]).await.unwrap();

    assert_eq!(body["portalId"], 1);
    assert_eq!(hubspot.refresh_count(), 2);
}

#[tokio::test]
async fn test_second_unauthorized_is_returned() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok", 3600)))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let hubspot = integration(&server, client_credentials(&server));
    let err = hubspot.get("/anything", &[]).await.unwrap_err();

    assert!(matches!(err, IntegrationError::Unauthorized(_)));
}

#[tokio::test]
async fn test_refresh_grant_rotates_refresh_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok",
            "expires_in": 1800,
            "refresh_token": "rt-2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(bearer_token("tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let hubspot = integration(&server, client_credentials(&server).with_refresh_token("rt-1"));
    hubspot.get("/owners", &[]).await.unwrap();

    assert_eq!(hubspot.refresh_token().await.as_deref(), Some("rt-2"));
}

#[tokio::test]
async fn test_rejected_refresh_is_token_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .expect(1)
        .mount(&server)
        .await;

    let hubspot = integration(&server, client_credentials(&server).with_refresh_token("revoked"));
    let err = hubspot.get("/owners", &[]).await.unwrap_err();

    match err {
        IntegrationError::TokenRefresh(message) => assert!(message.contains("invalid_grant")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_seeded_token_skips_token_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/account-info/v3/details"))
        .and(bearer_token("seeded"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let hubspot = integration(&server, client_credentials(&server))
        .with_access_token(AccessToken::bearer("seeded", None))
        .await;

    hubspot.test_connection().await.unwrap();
    assert_eq!(hubspot.refresh_count(), 0);
}

#[tokio::test]
async fn test_issued_token_type_is_used() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "abc",
            "token_type": "Token",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/owners"))
        .and(header("authorization", "Token abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let hubspot = integration(&server, client_credentials(&server));
    hubspot.get("/owners", &[]).await.unwrap();
}

#[tokio::test]
async fn test_token_endpoint_outage_trips_breaker() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let hubspot = OAuth2Integration::new(
        IntegrationConfig::new("hubspot", server.uri())
            .with_oauth2(client_credentials(&server))
            .with_retry(RetryConfig::no_retry())
            .with_circuit_breaker(CircuitBreakerConfig {
                failure_threshold: 1,
                reset_timeout: Duration::from_secs(60),
                success_threshold: 1,
            }),
    )
    .unwrap();

    assert!(hubspot.get("/owners", &[]).await.is_err());
    assert_eq!(hubspot.status().circuit.state, CircuitState::Open);

    // Later calls fail fast without touching the token endpoint
    let err = hubspot.get("/owners", &[]).await.unwrap_err();
    assert!(matches!(err, IntegrationError::CircuitOpen { .. }));
}
