//! End-to-end flow: event dispatch → subscriber reply → action execution.
//!
//! Wires the real dispatcher to the real interpreter over a wiremock
//! endpoint and the recording mock backend, covering the whole
//! deliver-render-execute loop including signature verification on the
//! receiving side.

use std::sync::Arc;

use hermod_actions::{Interpreter, InterpreterOptions};
use hermod_core::{
    models::{EndpointConfig, EventEnvelope, SessionId, SessionInfo, SharedClock},
    time::RealClock,
};
use hermod_delivery::{
    circuit::{CircuitConfig, HealthRegistry},
    endpoint::{InMemoryEndpointStore, SessionEndpointStore},
    signer::{composite_key, sign, DigestAlgorithm},
    Dispatcher, DispatcherConfig, RetryPolicy,
};
use hermod_testing::{BackendCall, MockBackend};
use serde_json::json;
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

struct Flow {
    dispatcher: Dispatcher,
    backend: Arc<MockBackend>,
    store: Arc<InMemoryEndpointStore>,
}

fn flow() -> Flow {
    hermod_testing::install_test_tracing();
    let clock: SharedClock = Arc::new(RealClock);
    let backend = MockBackend::new();
    let interpreter = Interpreter::new(
        backend.clone(),
        InterpreterOptions {
            default_action_delay: std::time::Duration::ZERO,
            action_budget: Some(std::time::Duration::from_secs(30)),
        },
        clock.clone(),
    );
    let health = Arc::new(HealthRegistry::new(CircuitConfig::default(), clock.clone()));
    let store = Arc::new(InMemoryEndpointStore::new());
    let config = DispatcherConfig {
        retry: RetryPolicy {
            base_backoff: std::time::Duration::from_millis(10),
            jitter: std::time::Duration::ZERO,
            ..RetryPolicy::default()
        },
        ..DispatcherConfig::default()
    };
    let dispatcher = Dispatcher::new(config, health, store.clone(), Arc::new(interpreter), clock)
        .expect("dispatcher should build");

    Flow { dispatcher, backend, store }
}

fn envelope() -> EventEnvelope {
    let mut session = SessionInfo::bare("main");
    session.subscriber_name = Some("ops".to_string());
    EventEnvelope::with_timestamp(
        "message.received",
        json!({"message": {"text": "ping", "from": "628123"}}),
        session,
        1_700_000_000_000,
    )
}

#[tokio::test]
async fn subscriber_actions_run_against_the_backend() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/hook"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "actions": [
                {"type": "text", "to": "{{message.from}}", "text": "pong: {{message.text}}"},
                {"type": "react", "emoji": "✅",
                 "key": {"id": "m1", "remoteJid": "{{message.from}}"}}
            ],
            "delayMs": 0
        })))
        .expect(1)
        .mount(&server)
        .await;

    let flow = flow();
    let target = format!("{}/hook", server.uri());
    let outcomes = flow
        .dispatcher
        .dispatch(&envelope(), &EndpointConfig::single(&target, "topsecret"))
        .await;

    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].ok);

    let calls = flow.backend.calls().await;
    assert_eq!(
        calls,
        vec![
            BackendCall::Text {
                to: "628123".to_string(),
                text: "pong: ping".to_string(),
                mentions: Vec::new(),
            },
            BackendCall::React { to: "628123".to_string(), emoji: "✅".to_string() },
        ]
    );
    server.verify().await;
}

#[tokio::test]
async fn signature_verifies_against_the_delivered_body() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let flow = flow();
    let envelope = envelope();
    flow.dispatcher
        .dispatch(&envelope, &EndpointConfig::single(server.uri(), "topsecret"))
        .await;

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    // Recompute the digest the way a receiver would: HMAC over the exact
    // body with secret + subscriber name.
    let key = composite_key("topsecret", "ops");
    let expected = sign(&request.body, &key, DigestAlgorithm::Sha256).unwrap();
    let header = request
        .headers
        .get("X-Hermod-Signature")
        .expect("signature header present")
        .to_str()
        .unwrap();
    assert_eq!(header, format!("HMAC-SHA256={expected}"));

    let alg = request.headers.get("X-Hermod-Signature-Alg").unwrap().to_str().unwrap();
    assert_eq!(alg, "HMAC-SHA256");

    // Body is the serialized envelope itself.
    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body["event"], "message.received");
    assert_eq!(body["session"]["subscriberName"], "ops");
}

#[tokio::test]
async fn failed_action_does_not_fail_the_dispatch() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "actions": [
                {"type": "text", "to": "1", "text": "doomed"},
                {"type": "text", "to": "1", "text": "fine"}
            ],
            "delayMs": 0
        })))
        .mount(&server)
        .await;

    let flow = flow();
    flow.backend.fail_next_sends(1);

    let outcomes = flow
        .dispatcher
        .dispatch(&envelope(), &EndpointConfig::single(server.uri(), "topsecret"))
        .await;

    // Delivery outcome is unaffected by the action failure, and the second
    // action still ran.
    assert!(outcomes[0].ok);
    assert_eq!(flow.backend.call_count().await, 2);
}

#[tokio::test]
async fn retry_then_success_still_hands_actions_off() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::header("X-Hermod-Delivery-Attempt", "1"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(matchers::method("POST"))
        .and(matchers::header("X-Hermod-Delivery-Attempt", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "actions": [{"type": "text", "to": "1", "text": "after retry"}],
            "delayMs": 0
        })))
        .expect(1)
        .mount(&server)
        .await;

    let flow = flow();
    let config = EndpointConfig::single(server.uri(), "topsecret");
    let outcomes = flow.dispatcher.dispatch(&envelope(), &config).await;

    assert!(outcomes[0].ok);
    let calls = flow.backend.calls().await;
    assert!(matches!(&calls[..], [BackendCall::Text { text, .. }] if text == "after retry"));
    server.verify().await;
}

#[tokio::test]
async fn gone_endpoint_round_trip_clears_registration() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let flow = flow();
    let session = SessionId::new("main");
    flow.store.set(session.clone(), server.uri(), "topsecret").await;

    let outcomes = flow
        .dispatcher
        .dispatch(&envelope(), &EndpointConfig::single(server.uri(), "topsecret"))
        .await;

    assert!(!outcomes[0].ok);
    assert_eq!(flow.store.configured_url(&session).await, None);
    let secret = flow.store.secret(&session).await.unwrap();
    assert!(!secret.is_empty());
    assert!(flow.backend.calls().await.is_empty());
}
