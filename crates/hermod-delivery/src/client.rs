//! HTTP client for envelope delivery.
//!
//! Builds the signed delivery request, categorizes transport and status
//! failures for the dispatcher's retry logic, and leniently parses the
//! subscriber's reply: a 2xx body may carry a follow-up action list, but an
//! empty or malformed body is still a successful delivery.

use std::time::Duration;

use bytes::Bytes;
use hermod_core::{models::EventEnvelope, SCHEMA_VERSION};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info_span, Instrument};

use crate::{
    error::{DeliveryError, Result},
    signer::{signature_header, DigestAlgorithm},
};

/// Configuration for the delivery client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Timeout for ordinary delivery requests.
    pub timeout: Duration,
    /// Timeout for preflight probes.
    pub preflight_timeout: Duration,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            preflight_timeout: Duration::from_secs(5),
            user_agent: "Hermod/1 (webhook)".to_string(),
        }
    }
}

/// Optional action program in a subscriber's 2xx response body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubscriberReply {
    /// Actions to execute against the originating session.
    pub actions: Vec<Value>,
    /// Suggested inter-action delay in milliseconds.
    pub delay_ms: Option<u64>,
}

/// Response from one accepted delivery attempt.
#[derive(Debug, Clone)]
pub struct EndpointResponse {
    /// HTTP status code (always 2xx here).
    pub status: u16,
    /// Parsed reply body; empty when the body was absent or malformed.
    pub reply: SubscriberReply,
}

/// HTTP client for posting signed envelopes to subscriber endpoints.
///
/// Wraps a pooled `reqwest` client; per-request timeouts let preflight
/// probes run shorter than ordinary deliveries on the same connection pool.
#[derive(Debug, Clone)]
pub struct EndpointClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl EndpointClient {
    /// Creates a client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the underlying HTTP client
    /// cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| DeliveryError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Creates a client with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Posts a signed envelope with the ordinary delivery timeout.
    pub async fn post_envelope(
        &self,
        target: &str,
        body: Bytes,
        headers: &[(&'static str, String)],
        attempt: u32,
    ) -> Result<EndpointResponse> {
        self.post_with_timeout(target, body, headers, attempt, self.config.timeout).await
    }

    /// Posts a signed envelope with the short preflight timeout.
    pub async fn post_preflight(
        &self,
        target: &str,
        body: Bytes,
        headers: &[(&'static str, String)],
    ) -> Result<EndpointResponse> {
        self.post_with_timeout(target, body, headers, 1, self.config.preflight_timeout).await
    }

    async fn post_with_timeout(
        &self,
        target: &str,
        body: Bytes,
        headers: &[(&'static str, String)],
        attempt: u32,
        timeout: Duration,
    ) -> Result<EndpointResponse> {
        let span = info_span!("envelope_delivery", target, attempt);

        async move {
            let mut request = self
                .client
                .post(target)
                .timeout(timeout)
                .header("Content-Type", "application/json")
                .header("X-Hermod-Delivery-Attempt", attempt.to_string())
                .body(body);

            for (name, value) in headers {
                request = request.header(*name, value.as_str());
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!(error = %e, "request failed before response");
                    if e.is_timeout() {
                        return Err(DeliveryError::timeout(timeout.as_millis() as u64));
                    }
                    if e.is_connect() {
                        return Err(DeliveryError::network(format!("connection failed: {e}")));
                    }
                    return Err(DeliveryError::network(e.to_string()));
                },
            };

            let status = response.status().as_u16();
            if !response.status().is_success() {
                return Err(DeliveryError::from_status(status));
            }

            let reply = match response.bytes().await {
                Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
                Err(e) => {
                    tracing::debug!(error = %e, "failed to read response body, ignoring");
                    SubscriberReply::default()
                },
            };

            tracing::debug!(status, actions = reply.actions.len(), "envelope accepted");
            Ok(EndpointResponse { status, reply })
        }
        .instrument(span)
        .await
    }
}

/// Builds the fixed header set for one signed envelope.
///
/// These headers are identical across targets and attempts; the per-attempt
/// number is added by the client. Optional identity headers are omitted
/// rather than sent empty.
pub fn envelope_headers(
    envelope: &EventEnvelope,
    algorithm: DigestAlgorithm,
    digest_hex: &str,
    preflight: bool,
) -> Vec<(&'static str, String)> {
    let session = &envelope.session;
    let mut headers = vec![
        ("X-Hermod-Signature", signature_header(algorithm, digest_hex)),
        ("X-Hermod-Signature-Alg", algorithm.header_token().to_string()),
        ("X-Hermod-Timestamp", envelope.ts.to_string()),
        ("X-Hermod-Event", envelope.event.clone()),
        ("X-Hermod-Session", session.id.to_string()),
        ("X-Hermod-Version", SCHEMA_VERSION.to_string()),
    ];

    if let Some(event_id) = envelope.event_id() {
        headers.push(("X-Hermod-Event-Id", event_id));
    }
    if let Some(owner) = &session.owner_ref {
        headers.push(("X-Hermod-Owner", owner.clone()));
    }
    if let Some(label) = &session.label {
        headers.push(("X-Hermod-Label", label.clone()));
    }
    if let Some(subscriber) = &session.subscriber_name {
        headers.push(("X-Hermod-Subscriber", subscriber.clone()));
    }
    if preflight {
        headers.push(("X-Hermod-Preflight", "1".to_string()));
    }

    headers
}
