//! Per-endpoint health tracking with security lockout.
//!
//! Tracks consecutive delivery failures per endpoint URL and opens a
//! time-boxed circuit once a threshold is reached, so a dead endpoint is not
//! hammered on every event. A distinct, longer security lockout is entered
//! when an endpoint actively rejects the signature (401/403): that is a
//! configuration problem, not transient unavailability, and retrying it
//! faster helps nobody.
//!
//! # State machine
//!
//! ```text
//!            5 consecutive failures              cool-down elapses
//!  ┌────────┐ ───────────────────────▶ ┌──────┐ ─────────────────▶ closed
//!  │ closed │                          │ open │
//!  └────────┘ ◀─────────────────────── └──────┘
//!       │          recorded success        ▲
//!       │ 401/403                          │ 401/403 (overrides window)
//!       ▼                                  │
//!  ┌─────────────────┐ ────────────────────┘
//!  │ security-locked │   open for 15 min; cleared only by success or expiry
//!  └─────────────────┘
//! ```
//!
//! State lives in an injected registry keyed by endpoint URL, created lazily
//! on first failure and never persisted: a process restart starts every
//! endpoint closed.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use hermod_core::models::SharedClock;
use tokio::sync::Mutex;

/// Circuit thresholds and windows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// How long an ordinary failure circuit stays open.
    pub open_window: Duration,
    /// How long a security lockout lasts.
    pub security_window: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_window: Duration::from_secs(60),
            security_window: Duration::from_secs(15 * 60),
        }
    }
}

/// Health state of a single endpoint URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointHealth {
    /// Consecutive failures since the last success.
    pub consecutive_failures: u32,
    /// Deadline until which delivery is skipped, when open.
    pub open_until: Option<Instant>,
    /// Whether the current window is a security lockout.
    pub security_locked: bool,
}

impl EndpointHealth {
    fn new() -> Self {
        Self { consecutive_failures: 0, open_until: None, security_locked: false }
    }
}

/// Shared, injected store of endpoint health, keyed by URL.
///
/// All mutations take one lock so concurrent deliveries to the same endpoint
/// observe failure counts and windows atomically.
#[derive(Debug)]
pub struct HealthRegistry {
    config: CircuitConfig,
    clock: SharedClock,
    circuits: Mutex<HashMap<String, EndpointHealth>>,
}

impl HealthRegistry {
    /// Creates a registry with the given thresholds.
    pub fn new(config: CircuitConfig, clock: SharedClock) -> Self {
        Self { config, clock, circuits: Mutex::new(HashMap::new()) }
    }

    /// True while the endpoint's circuit window has not elapsed.
    pub async fn is_open(&self, target: &str) -> bool {
        let circuits = self.circuits.lock().await;
        match circuits.get(target).and_then(|health| health.open_until) {
            Some(until) => self.clock.now() < until,
            None => false,
        }
    }

    /// Records an ordinary delivery failure.
    ///
    /// Opens the circuit for the configured cool-down once the consecutive
    /// failure threshold is reached, unless a security lockout is already in
    /// force (its longer window must not be shortened).
    pub async fn record_failure(&self, target: &str) {
        let mut circuits = self.circuits.lock().await;
        let health = circuits.entry(target.to_string()).or_insert_with(EndpointHealth::new);

        health.consecutive_failures += 1;
        if health.consecutive_failures >= self.config.failure_threshold && !health.security_locked {
            let until = self.clock.now() + self.config.open_window;
            if health.open_until.is_none() {
                tracing::warn!(
                    target,
                    failures = health.consecutive_failures,
                    window_secs = self.config.open_window.as_secs(),
                    "circuit opening"
                );
            }
            health.open_until = Some(until);
        }
    }

    /// Records a signature rejection (401/403).
    ///
    /// Enters the security lockout immediately, overriding any ordinary open
    /// window already in place.
    pub async fn record_security_failure(&self, target: &str) {
        let mut circuits = self.circuits.lock().await;
        let health = circuits.entry(target.to_string()).or_insert_with(EndpointHealth::new);

        health.security_locked = true;
        health.open_until = Some(self.clock.now() + self.config.security_window);
        tracing::warn!(
            target,
            window_secs = self.config.security_window.as_secs(),
            "endpoint security-locked after signature rejection"
        );
    }

    /// Records a successful delivery, closing the circuit.
    pub async fn record_success(&self, target: &str) {
        let mut circuits = self.circuits.lock().await;
        let health = circuits.entry(target.to_string()).or_insert_with(EndpointHealth::new);

        health.consecutive_failures = 0;
        health.open_until = None;
        health.security_locked = false;
    }

    /// Returns a snapshot of one endpoint's health, if tracked.
    pub async fn health(&self, target: &str) -> Option<EndpointHealth> {
        self.circuits.lock().await.get(target).cloned()
    }
}
