//! Domain models for event emission and delivery outcomes.
//!
//! Defines the signed event envelope, session identity, endpoint
//! configuration, and per-endpoint delivery results. Envelopes are immutable
//! once constructed; one envelope is built per emitted event and shared by
//! every delivery target.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::time::Clock;

/// Strongly-typed session identifier.
///
/// Identifies one logical messaging connection. Sessions are named by the
/// registration layer, so the identifier is an opaque string rather than a
/// generated UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Creates a session ID from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Identity of the session on whose behalf an event is emitted.
///
/// Carried inside every envelope and echoed in delivery headers. The
/// `subscriber_name` also participates in signing key derivation, binding a
/// signature to both the shared secret and the logical subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Session identifier.
    pub id: SessionId,
    /// Human-readable session label, if configured.
    pub label: Option<String>,
    /// Reference to the owning account or registry entry.
    pub owner_ref: Option<String>,
    /// Resolved subscriber name, if known.
    pub subscriber_name: Option<String>,
}

impl SessionInfo {
    /// Creates a session identity with only the ID populated.
    pub fn bare(id: impl Into<String>) -> Self {
        Self { id: SessionId::new(id), label: None, owner_ref: None, subscriber_name: None }
    }

    /// Returns the subscriber name or an empty string when unknown.
    ///
    /// This is the exact value concatenated onto the signing secret, so
    /// absence must normalize to empty rather than a sentinel.
    pub fn subscriber_or_empty(&self) -> &str {
        self.subscriber_name.as_deref().unwrap_or("")
    }
}

/// One emitted event, serialized and signed as a unit.
///
/// Immutable once constructed. The same envelope instance (and therefore the
/// same signature) is delivered to every registered endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Event name, e.g. `message.received`.
    pub event: String,
    /// Event payload. Always a JSON object in practice; kept as a `Value`
    /// because payload shapes vary per event kind.
    pub data: Value,
    /// Emission timestamp in epoch milliseconds.
    pub ts: i64,
    /// Session that produced the event.
    pub session: SessionInfo,
}

impl EventEnvelope {
    /// Builds an envelope, stamping the timestamp from the injected clock.
    pub fn new(event: impl Into<String>, data: Value, session: SessionInfo, clock: &dyn Clock) -> Self {
        Self { event: event.into(), data, ts: clock.now_millis(), session }
    }

    /// Builds an envelope with an explicit timestamp.
    pub fn with_timestamp(
        event: impl Into<String>,
        data: Value,
        session: SessionInfo,
        ts: i64,
    ) -> Self {
        Self { event: event.into(), data, ts, session }
    }

    /// Extracts the optional event ID from the payload (`eventId` or `id`).
    pub fn event_id(&self) -> Option<String> {
        for key in ["eventId", "id"] {
            match self.data.get(key) {
                Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
                Some(Value::Number(n)) => return Some(n.to_string()),
                _ => {},
            }
        }
        None
    }

    /// Returns the template lookup root for this envelope.
    ///
    /// The context is the envelope's own fields with the payload's keys
    /// merged on top, so `{{event}}` and `{{session.label}}` resolve next to
    /// payload paths like `{{message.text}}`. Payload keys win on collision.
    pub fn render_context(&self) -> Value {
        let mut ctx = serde_json::to_value(self).unwrap_or(Value::Null);
        if let (Value::Object(root), Value::Object(data)) = (&mut ctx, &self.data) {
            for (key, value) in data {
                root.insert(key.clone(), value.clone());
            }
        }
        ctx
    }
}

/// Endpoint registration for one session: target URLs and signing secrets.
///
/// Secrets support rotation; the first entry is authoritative for signing.
/// Owned by session configuration and read-only inside this subsystem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Target URLs, delivered to in fan-out.
    pub urls: Vec<String>,
    /// Signing secrets, newest first.
    pub secrets: Vec<String>,
}

impl EndpointConfig {
    /// Creates a single-URL, single-secret configuration.
    pub fn single(url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self { urls: vec![url.into()], secrets: vec![secret.into()] }
    }

    /// Returns the authoritative signing secret, if any.
    pub fn primary_secret(&self) -> Option<&str> {
        self.secrets.first().map(String::as_str)
    }
}

/// Result of delivering one envelope to one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryOutcome {
    /// Endpoint URL this outcome describes.
    pub target: String,
    /// Final HTTP status, when a response was received.
    pub status: Option<u16>,
    /// Whether the envelope was accepted (2xx).
    pub ok: bool,
    /// Whether the attempt was skipped because the circuit was open.
    pub skipped: bool,
    /// Failure description, when delivery did not succeed.
    pub error: Option<String>,
}

impl DeliveryOutcome {
    /// Outcome for an accepted delivery.
    pub fn success(target: impl Into<String>, status: u16) -> Self {
        Self { target: target.into(), status: Some(status), ok: true, skipped: false, error: None }
    }

    /// Outcome for a delivery skipped by an open circuit.
    pub fn skipped(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            status: None,
            ok: false,
            skipped: true,
            error: Some("circuit open".to_string()),
        }
    }

    /// Outcome for a failed delivery.
    pub fn failed(target: impl Into<String>, status: Option<u16>, error: impl Into<String>) -> Self {
        Self { target: target.into(), status, ok: false, skipped: false, error: Some(error.into()) }
    }
}

/// Result of one preflight probe against one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightOutcome {
    /// Endpoint URL that was probed.
    pub target: String,
    /// Whether the probe was accepted (2xx).
    pub ok: bool,
    /// HTTP status, when a response was received.
    pub status: Option<u16>,
    /// Round-trip time of the probe in milliseconds.
    pub round_trip_ms: u64,
    /// Failure description, when the probe did not succeed.
    pub error: Option<String>,
}

/// Shared clock handle used across the delivery and action subsystems.
pub type SharedClock = Arc<dyn Clock>;
