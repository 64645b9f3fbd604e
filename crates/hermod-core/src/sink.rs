//! Handoff seam between delivery and action execution.
//!
//! The dispatcher hands a successful response's action list to an
//! [`ActionSink`] without knowing anything about interpretation, the same way
//! the delivery side of the system stays decoupled from its downstream
//! consumers elsewhere. The interpreter crate provides the real
//! implementation; [`NoOpActionSink`] serves embeddings that only want
//! delivery.

use serde_json::Value;

use crate::models::EventEnvelope;

/// Consumer of subscriber-returned action lists.
///
/// Implementations receive the raw (unrendered) actions exactly as parsed
/// from the response body, together with the envelope that produced them.
/// Execution is best-effort: implementations must not panic and should
/// swallow their own failures, since delivery outcomes have already been
/// determined by the time actions run.
#[async_trait::async_trait]
pub trait ActionSink: Send + Sync + std::fmt::Debug {
    /// Runs one response's action list for the envelope's session.
    ///
    /// `delay_override` is the subscriber's suggested inter-action delay in
    /// milliseconds, when present in the response body.
    async fn run_actions(
        &self,
        envelope: &EventEnvelope,
        actions: Vec<Value>,
        delay_override: Option<u64>,
    );
}

/// Sink that drops all actions.
///
/// Useful for delivery-only embeddings and as a test default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpActionSink;

#[async_trait::async_trait]
impl ActionSink for NoOpActionSink {
    async fn run_actions(
        &self,
        envelope: &EventEnvelope,
        actions: Vec<Value>,
        _delay_override: Option<u64>,
    ) {
        tracing::debug!(
            session = %envelope.session.id,
            dropped = actions.len(),
            "no-op sink discarding actions"
        );
    }
}
