#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for hive-tools over a real HTTP transport.
//!
//! A wiremock server plays the remote capability host; the router, invoker,
//! and `HttpTransport` run unmodified against it.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hive_core::{AgentAction, AgentRunId, ErrorKind, ToolOutcome};
use hive_tools::{
    CapabilityDescriptor, CapabilityRegistry, CapabilityRouter, HttpTransport,
    HttpTransportConfig, InvokerConfig, OperationClass, RetryPolicy, ToolInvoker, Transport,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn transport_for(server: &MockServer, token: Option<&str>) -> Arc<HttpTransport> {
    Arc::new(HttpTransport::new(HttpTransportConfig {
        base_url: server.uri(),
        bearer_token: token.map(str::to_string),
    }))
}

fn router_for(transport: Arc<HttpTransport>, max_retries: u32) -> CapabilityRouter {
    let registry = CapabilityRegistry::from_descriptors([
        CapabilityDescriptor::new("table_query", "Query records from a table")
            .with_class(OperationClass::Query),
        CapabilityDescriptor::new("record_create", "Create a record").with_endpoint("records/create"),
    ]);
    let invoker = ToolInvoker::new(
        transport,
        InvokerConfig {
            retry: RetryPolicy::immediate(max_retries),
            ..InvokerConfig::default()
        },
    );
    CapabilityRouter::new(registry, invoker)
}

// ---------------------------------------------------------------------------
// 1. Transient failures then success
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transient_errors_are_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/table_query"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/table_query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"rows": [1, 2]})))
        .mount(&server)
        .await;

    let router = router_for(transport_for(&server, None), 2);
    let call = router
        .invoke(AgentRunId::new(), &AgentAction::new("query", "table_query"), None)
        .await;

    assert_eq!(call.attempts, 3);
    assert_eq!(call.outcome, ToolOutcome::success(json!({"rows": [1, 2]})));
}

// ---------------------------------------------------------------------------
// 2. Permanent failures return after one attempt
// ---------------------------------------------------------------------------

#[tokio::test]
async fn auth_failure_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/records/create"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
        .expect(1)
        .mount(&server)
        .await;

    let router = router_for(transport_for(&server, None), 2);
    let call = router
        .invoke(AgentRunId::new(), &AgentAction::new("create", "record_create"), None)
        .await;

    assert_eq!(call.attempts, 1);
    assert_eq!(call.outcome.error_kind(), Some(ErrorKind::PermanentRemoteError));
}

// ---------------------------------------------------------------------------
// 3. Unknown capability never reaches the server
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_capability_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let router = router_for(transport_for(&server, None), 2);
    let call = router
        .invoke(AgentRunId::new(), &AgentAction::new("teleport", "spaceship"), None)
        .await;

    assert_eq!(call.attempts, 0);
    assert_eq!(call.outcome.error_kind(), Some(ErrorKind::CapabilityNotFound));
}

// ---------------------------------------------------------------------------
// 4. Slow endpoint hits the per-attempt deadline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn slow_endpoint_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/table_query"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let router = router_for(transport_for(&server, None), 1);
    let call = router
        .invoke(
            AgentRunId::new(),
            &AgentAction::new("query", "table_query"),
            Some(Duration::from_millis(100)),
        )
        .await;

    assert_eq!(call.attempts, 2);
    assert_eq!(call.outcome, ToolOutcome::Timeout);
}

// ---------------------------------------------------------------------------
// 5. Bearer token and payload reach the endpoint
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bearer_token_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/records/create"))
        .and(header("Authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"sys_id": "42"})))
        .expect(1)
        .mount(&server)
        .await;

    let router = router_for(transport_for(&server, Some("s3cret")), 0);
    let call = router
        .invoke(
            AgentRunId::new(),
            &AgentAction::new("create", "record_create").with_parameters(json!({"short": "x"})),
            None,
        )
        .await;

    assert!(call.outcome.is_success());
    assert_eq!(call.outcome.payload().unwrap()["sys_id"], "42");
}

// ---------------------------------------------------------------------------
// 6. Probe against a dead host
// ---------------------------------------------------------------------------

#[tokio::test]
async fn probe_fails_for_unreachable_host() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let transport = HttpTransport::new(HttpTransportConfig {
        base_url: format!("http://127.0.0.1:{port}"),
        bearer_token: None,
    });
    assert!(transport
        .probe("table_query", Duration::from_millis(500))
        .await
        .is_err());
}

#[tokio::test]
async fn probe_accepts_any_http_response() {
    let server = MockServer::start().await;
    let transport = transport_for(&server, None);
    // No mocks mounted: the server answers 404, which still proves reachability.
    assert!(transport
        .probe("table_query", Duration::from_millis(500))
        .await
        .is_ok());
}
