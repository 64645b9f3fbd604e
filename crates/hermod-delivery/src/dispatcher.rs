//! Delivery dispatcher: signing, fan-out, retries, and action handoff.
//!
//! One dispatch call delivers one signed envelope to every registered
//! endpoint, tracking per-endpoint health and pacing retries with
//! exponential backoff. Successful responses may carry an action list, which
//! is handed to the configured [`ActionSink`] after fan-out completes.
//! Dispatch never fails from the caller's perspective: every per-endpoint
//! result is folded into the returned outcome list.
//!
//! ```text
//! event ──▶ sign once ──▶ fan out ──▶ per-target retry loop ──▶ outcomes
//!                              │               │
//!                              │               ├─ circuit open? skip
//!                              │               ├─ 401/403 → security lockout
//!                              │               ├─ 404/410 → invalidate endpoint
//!                              │               └─ 429/5xx → backoff, retry
//!                              └──▶ 2xx replies with actions ──▶ ActionSink
//! ```

use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::join_all;
use hermod_core::{
    models::{
        DeliveryOutcome, EndpointConfig, EventEnvelope, PreflightOutcome, SessionId, SessionInfo,
        SharedClock,
    },
    sink::ActionSink,
};
use serde_json::json;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    circuit::HealthRegistry,
    client::{envelope_headers, ClientConfig, EndpointClient, SubscriberReply},
    endpoint::{invalidate_endpoint, SessionEndpointStore, MIN_SECRET_LEN},
    error::{DeliveryError, Result},
    retry::RetryPolicy,
    signer::{composite_key, sign, DigestAlgorithm},
};

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// HTTP client settings.
    pub client: ClientConfig,
    /// Retry pacing per endpoint.
    pub retry: RetryPolicy,
    /// Digest strength for envelope signatures.
    pub algorithm: DigestAlgorithm,
    /// Whether multi-endpoint fan-out runs targets concurrently.
    pub parallel_targets: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            retry: RetryPolicy::default(),
            algorithm: DigestAlgorithm::default(),
            parallel_targets: true,
        }
    }
}

/// Result of one endpoint's delivery round, before handoff.
struct TargetDelivery {
    outcome: DeliveryOutcome,
    reply: Option<SubscriberReply>,
}

/// Orchestrates signed envelope delivery for emitted events.
#[derive(Debug)]
pub struct Dispatcher {
    client: EndpointClient,
    config: DispatcherConfig,
    health: Arc<HealthRegistry>,
    store: Arc<dyn SessionEndpointStore>,
    sink: Arc<dyn ActionSink>,
    clock: SharedClock,
}

impl Dispatcher {
    /// Creates a dispatcher.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the HTTP client cannot be
    /// built from the given settings.
    pub fn new(
        config: DispatcherConfig,
        health: Arc<HealthRegistry>,
        store: Arc<dyn SessionEndpointStore>,
        sink: Arc<dyn ActionSink>,
        clock: SharedClock,
    ) -> Result<Self> {
        let client = EndpointClient::new(config.client.clone())?;
        Ok(Self { client, config, health, store, sink, clock })
    }

    /// Delivers one envelope to every configured endpoint.
    ///
    /// Returns one outcome per target URL. Action lists returned by
    /// accepted deliveries are executed via the sink before this call
    /// returns; their failures never surface here.
    pub async fn dispatch(
        &self,
        envelope: &EventEnvelope,
        endpoint: &EndpointConfig,
    ) -> Vec<DeliveryOutcome> {
        if endpoint.urls.is_empty() {
            return Vec::new();
        }

        let Some(secret) =
            endpoint.primary_secret().filter(|s| s.trim().len() >= MIN_SECRET_LEN)
        else {
            warn!(
                session = %envelope.session.id,
                event = %envelope.event,
                "delivery skipped: weak or missing signing secret"
            );
            return Vec::new();
        };

        let body = match serde_json::to_vec(envelope) {
            Ok(bytes) => Bytes::from(bytes),
            Err(error) => {
                warn!(event = %envelope.event, %error, "envelope serialization failed");
                return Vec::new();
            },
        };

        let key = composite_key(secret, envelope.session.subscriber_or_empty());
        let digest = match sign(&body, &key, self.config.algorithm) {
            Ok(digest) => digest,
            Err(error) => {
                warn!(event = %envelope.event, %error, "envelope signing failed");
                return Vec::new();
            },
        };
        let headers = envelope_headers(envelope, self.config.algorithm, &digest, false);

        let span = info_span!(
            "event_dispatch",
            delivery = %Uuid::new_v4(),
            event = %envelope.event,
            session = %envelope.session.id,
            targets = endpoint.urls.len()
        );

        async move {
            let deliveries = if self.config.parallel_targets {
                join_all(endpoint.urls.iter().map(|target| {
                    self.deliver_to_target(target, &body, &headers, &envelope.session.id)
                }))
                .await
            } else {
                let mut deliveries = Vec::with_capacity(endpoint.urls.len());
                for target in &endpoint.urls {
                    deliveries
                        .push(self.deliver_to_target(target, &body, &headers, &envelope.session.id).await);
                }
                deliveries
            };

            let mut outcomes = Vec::with_capacity(deliveries.len());
            for delivery in deliveries {
                if let Some(reply) = delivery.reply {
                    if !reply.actions.is_empty() {
                        debug!(
                            target = %delivery.outcome.target,
                            actions = reply.actions.len(),
                            "running subscriber actions"
                        );
                        self.sink.run_actions(envelope, reply.actions, reply.delay_ms).await;
                    }
                }
                outcomes.push(delivery.outcome);
            }
            outcomes
        }
        .instrument(span)
        .await
    }

    /// Probes endpoints with a minimal synthetic payload.
    ///
    /// Exactly one attempt per target with the short preflight timeout;
    /// circuit state is left untouched so a probe cannot poison a healthy
    /// endpoint's record. Used to validate a URL before persisting it.
    pub async fn preflight(
        &self,
        endpoint: &EndpointConfig,
        session: &SessionInfo,
    ) -> Vec<PreflightOutcome> {
        if endpoint.urls.is_empty() {
            return Vec::new();
        }

        let envelope = EventEnvelope::new(
            "preflight",
            json!({"ping": true}),
            session.clone(),
            self.clock.as_ref(),
        );
        let body = match serde_json::to_vec(&envelope) {
            Ok(bytes) => Bytes::from(bytes),
            Err(_) => Bytes::from_static(b"{}"),
        };

        let key = composite_key(
            endpoint.primary_secret().unwrap_or(""),
            session.subscriber_or_empty(),
        );
        let digest = match sign(&body, &key, self.config.algorithm) {
            Ok(digest) => digest,
            Err(error) => {
                warn!(%error, "preflight signing failed");
                return Vec::new();
            },
        };
        let headers = envelope_headers(&envelope, self.config.algorithm, &digest, true);

        join_all(endpoint.urls.iter().map(|target| {
            let body = body.clone();
            let headers = &headers;
            async move {
                let started = self.clock.now();
                let result = self.client.post_preflight(target, body, headers).await;
                let round_trip_ms =
                    self.clock.now().duration_since(started).as_millis() as u64;

                match result {
                    Ok(response) => PreflightOutcome {
                        target: target.clone(),
                        ok: true,
                        status: Some(response.status),
                        round_trip_ms,
                        error: None,
                    },
                    Err(error) => PreflightOutcome {
                        target: target.clone(),
                        ok: false,
                        status: error.status(),
                        round_trip_ms,
                        error: Some(error.to_string()),
                    },
                }
            }
        }))
        .await
    }

    /// Runs the retry loop for a single target URL.
    async fn deliver_to_target(
        &self,
        target: &str,
        body: &Bytes,
        headers: &[(&'static str, String)],
        session: &SessionId,
    ) -> TargetDelivery {
        if self.health.is_open(target).await {
            warn!(target, "circuit open, delivery skipped");
            return TargetDelivery { outcome: DeliveryOutcome::skipped(target), reply: None };
        }

        let max_attempts = self.config.retry.max_attempts();
        let mut attempt = 0;
        let mut last_error = DeliveryError::retries_exhausted(max_attempts);

        while attempt < max_attempts {
            attempt += 1;
            match self.client.post_envelope(target, body.clone(), headers, attempt).await {
                Ok(response) => {
                    self.health.record_success(target).await;
                    info!(target, status = response.status, attempt, "envelope delivered");
                    return TargetDelivery {
                        outcome: DeliveryOutcome::success(target, response.status),
                        reply: Some(response.reply),
                    };
                },
                Err(error) if error.is_security() => {
                    self.health.record_security_failure(target).await;
                    warn!(
                        target,
                        attempt,
                        status = error.status(),
                        "delivery blocked: endpoint rejected signature"
                    );
                    return Self::failed(target, &error);
                },
                Err(error) if error.is_endpoint_gone() => {
                    self.health.record_failure(target).await;
                    warn!(target, attempt, status = error.status(), "endpoint gone");
                    invalidate_endpoint(self.store.as_ref(), session, target).await;
                    return Self::failed(target, &error);
                },
                Err(error) => {
                    self.health.record_failure(target).await;
                    warn!(target, attempt, %error, "envelope delivery failed");
                    if !error.is_retryable() {
                        return Self::failed(target, &error);
                    }
                    last_error = error;
                    if attempt < max_attempts {
                        self.clock.sleep(self.config.retry.backoff_delay(attempt)).await;
                    }
                },
            }
        }

        warn!(target, attempts = max_attempts, "delivery permanently failed");
        invalidate_endpoint(self.store.as_ref(), session, target).await;
        Self::failed(target, &last_error)
    }

    fn failed(target: &str, error: &DeliveryError) -> TargetDelivery {
        TargetDelivery {
            outcome: DeliveryOutcome::failed(target, error.status(), error.to_string()),
            reply: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use hermod_core::time::TestClock;
    use hermod_core::Clock;
    use serde_json::Value;
    use tokio::sync::Mutex;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::{circuit::CircuitConfig, endpoint::InMemoryEndpointStore};

    #[derive(Debug, Default)]
    struct RecordingSink {
        runs: Mutex<Vec<(Vec<Value>, Option<u64>)>>,
    }

    #[async_trait::async_trait]
    impl ActionSink for RecordingSink {
        async fn run_actions(
            &self,
            _envelope: &EventEnvelope,
            actions: Vec<Value>,
            delay_override: Option<u64>,
        ) {
            self.runs.lock().await.push((actions, delay_override));
        }
    }

    struct Harness {
        dispatcher: Dispatcher,
        health: Arc<HealthRegistry>,
        store: Arc<InMemoryEndpointStore>,
        sink: Arc<RecordingSink>,
        clock: TestClock,
    }

    fn harness(config: DispatcherConfig) -> Harness {
        let clock = TestClock::at_millis(1_700_000_000_000);
        let shared: SharedClock = Arc::new(clock.clone());
        let health = Arc::new(HealthRegistry::new(CircuitConfig::default(), shared.clone()));
        let store = Arc::new(InMemoryEndpointStore::new());
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = Dispatcher::new(
            config,
            health.clone(),
            store.clone(),
            sink.clone(),
            shared,
        )
        .expect("dispatcher should build");
        Harness { dispatcher, health, store, sink, clock }
    }

    fn envelope() -> EventEnvelope {
        let mut session = SessionInfo::bare("main");
        session.subscriber_name = Some("ops".to_string());
        EventEnvelope::with_timestamp(
            "message.received",
            json!({"message": {"text": "hi"}}),
            session,
            1_700_000_000_000,
        )
    }

    fn config() -> DispatcherConfig {
        DispatcherConfig::default()
    }

    #[tokio::test]
    async fn successful_dispatch_returns_ok_outcome_and_runs_actions() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/hook"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "actions": [{"type": "text", "to": "123", "text": "pong"}],
                "delayMs": 250
            })))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(config());
        let target = format!("{}/hook", server.uri());
        let outcomes = h
            .dispatcher
            .dispatch(&envelope(), &EndpointConfig::single(&target, "topsecret"))
            .await;

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].ok);
        assert_eq!(outcomes[0].status, Some(200));

        let runs = h.sink.runs.lock().await;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].0.len(), 1);
        assert_eq!(runs[0].1, Some(250));
    }

    #[tokio::test]
    async fn weak_secret_skips_delivery_entirely() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let h = harness(config());
        let outcomes = h
            .dispatcher
            .dispatch(&envelope(), &EndpointConfig::single(server.uri(), "abc"))
            .await;

        assert!(outcomes.is_empty());
        server.verify().await;
    }

    #[tokio::test]
    async fn server_errors_are_retried_until_success() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::header("X-Hermod-Delivery-Attempt", "1"))
            .respond_with(ResponseTemplate::new(502))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(matchers::method("POST"))
            .and(matchers::header("X-Hermod-Delivery-Attempt", "2"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(config());
        let outcomes = h
            .dispatcher
            .dispatch(&envelope(), &EndpointConfig::single(server.uri(), "topsecret"))
            .await;

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].ok);
        server.verify().await;
    }

    #[tokio::test]
    async fn security_rejection_locks_endpoint_without_retrying() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(config());
        let outcomes = h
            .dispatcher
            .dispatch(&envelope(), &EndpointConfig::single(server.uri(), "topsecret"))
            .await;

        assert!(!outcomes[0].ok);
        assert_eq!(outcomes[0].status, Some(403));

        let health = h.health.health(&server.uri()).await.unwrap();
        assert!(health.security_locked);
        assert!(h.health.is_open(&server.uri()).await);
        server.verify().await;
    }

    #[tokio::test]
    async fn gone_endpoint_clears_configured_url_and_keeps_secret() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(410))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(config());
        let session = SessionId::new("main");
        h.store.set(session.clone(), server.uri(), "topsecret").await;

        let outcomes = h
            .dispatcher
            .dispatch(&envelope(), &EndpointConfig::single(server.uri(), "topsecret"))
            .await;

        assert!(!outcomes[0].ok);
        assert_eq!(outcomes[0].status, Some(410));
        assert_eq!(h.store.configured_url(&session).await, None);
        assert_eq!(h.store.secret(&session).await.as_deref(), Some("topsecret"));
        server.verify().await;
    }

    #[tokio::test]
    async fn exhausted_retries_invalidate_matching_endpoint() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(4) // retries(3) + 1
            .mount(&server)
            .await;

        let h = harness(config());
        let session = SessionId::new("main");
        h.store.set(session.clone(), server.uri(), "topsecret").await;

        let outcomes = h
            .dispatcher
            .dispatch(&envelope(), &EndpointConfig::single(server.uri(), "topsecret"))
            .await;

        assert!(!outcomes[0].ok);
        assert!(!outcomes[0].skipped);
        assert_eq!(h.store.configured_url(&session).await, None);
        let secret = h.store.secret(&session).await.unwrap();
        assert!(!secret.is_empty());
        // Backoff slept on the virtual clock, not in real time.
        assert!(h.clock.now_millis() > 1_700_000_000_000);
        server.verify().await;
    }

    #[tokio::test]
    async fn open_circuit_skips_delivery_without_request() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let h = harness(config());
        for _ in 0..5 {
            h.health.record_failure(&server.uri()).await;
        }

        let outcomes = h
            .dispatcher
            .dispatch(&envelope(), &EndpointConfig::single(server.uri(), "topsecret"))
            .await;

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].skipped);
        assert!(!outcomes[0].ok);
        server.verify().await;
    }

    #[tokio::test]
    async fn other_client_errors_fail_without_retry_or_invalidation() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(422))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(config());
        let session = SessionId::new("main");
        h.store.set(session.clone(), server.uri(), "topsecret").await;

        let outcomes = h
            .dispatcher
            .dispatch(&envelope(), &EndpointConfig::single(server.uri(), "topsecret"))
            .await;

        assert!(!outcomes[0].ok);
        assert_eq!(outcomes[0].status, Some(422));
        // 422 is not a terminal endpoint failure; the registration stays.
        assert_eq!(h.store.configured_url(&session).await.as_deref(), Some(server.uri()).as_deref());
        server.verify().await;
    }

    #[tokio::test]
    async fn fan_out_returns_one_outcome_per_target() {
        let ok_server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&ok_server)
            .await;
        let bad_server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&bad_server)
            .await;

        let h = harness(config());
        let endpoint = EndpointConfig {
            urls: vec![ok_server.uri(), bad_server.uri()],
            secrets: vec!["topsecret".to_string()],
        };
        let outcomes = h.dispatcher.dispatch(&envelope(), &endpoint).await;

        assert_eq!(outcomes.len(), 2);
        let ok = outcomes.iter().find(|o| o.target == ok_server.uri()).unwrap();
        let bad = outcomes.iter().find(|o| o.target == bad_server.uri()).unwrap();
        assert!(ok.ok);
        assert!(!bad.ok);
        assert_eq!(bad.status, Some(400));
    }

    #[tokio::test]
    async fn sequential_fan_out_still_covers_every_target() {
        let first = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&first)
            .await;
        let second = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&second)
            .await;

        let h = harness(DispatcherConfig { parallel_targets: false, ..config() });
        let endpoint = EndpointConfig {
            urls: vec![first.uri(), second.uri()],
            secrets: vec!["topsecret".to_string()],
        };
        let outcomes = h.dispatcher.dispatch(&envelope(), &endpoint).await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.ok));
        first.verify().await;
        second.verify().await;
    }

    #[tokio::test]
    async fn preflight_reports_outcome_without_touching_circuit() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::header("X-Hermod-Preflight", "1"))
            .and(matchers::header("X-Hermod-Event", "preflight"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(config());
        let outcomes = h
            .dispatcher
            .preflight(
                &EndpointConfig::single(server.uri(), "topsecret"),
                &envelope().session,
            )
            .await;

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].ok);
        assert_eq!(outcomes[0].status, Some(200));
        assert!(h.health.health(&server.uri()).await.is_none());
        server.verify().await;
    }

    #[tokio::test]
    async fn preflight_failure_reports_error_and_round_trip() {
        let h = harness(config());
        let outcomes = h
            .dispatcher
            .preflight(
                &EndpointConfig::single("http://127.0.0.1:9/hook", "topsecret"),
                &envelope().session,
            )
            .await;

        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].ok);
        assert!(outcomes[0].error.is_some());
    }
}
