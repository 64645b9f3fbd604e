//! Endpoint lifecycle management.
//!
//! When an endpoint turns out to be gone (404/410) or a delivery round
//! exhausts every retry, the URL configured for the originating session is
//! cleared so future events stop hammering a dead subscriber. The signing
//! secret is preserved — or generated if somehow absent — so a later
//! re-registration never silently operates unsigned.

use std::collections::HashMap;

use hermod_core::models::SessionId;
use rand::Rng;
use tokio::sync::Mutex;

/// Shortest secret accepted for signing.
pub const MIN_SECRET_LEN: usize = 6;

const SECRET_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Read/write surface over the session registration store.
///
/// Registrations themselves are persisted elsewhere; this subsystem only
/// reads the configured endpoint and clears it on terminal failure.
#[async_trait::async_trait]
pub trait SessionEndpointStore: Send + Sync + std::fmt::Debug {
    /// URL currently configured for the session, if any.
    async fn configured_url(&self, session: &SessionId) -> Option<String>;

    /// Signing secret currently stored for the session, if any.
    async fn secret(&self, session: &SessionId) -> Option<String>;

    /// Clears the configured URL (sets it empty).
    async fn clear_url(&self, session: &SessionId);

    /// Stores a signing secret for the session.
    async fn store_secret(&self, session: &SessionId, secret: String);
}

/// Generates a random alphanumeric signing secret, 10–18 characters.
pub fn generate_secret() -> String {
    let mut rng = rand::rng();
    let len = rng.random_range(10..=18);
    (0..len).map(|_| SECRET_ALPHABET[rng.random_range(0..SECRET_ALPHABET.len())] as char).collect()
}

/// Invalidates the session's endpoint if `failing_url` is the one configured.
///
/// Ensures a usable secret exists before clearing the URL, preferring safe
/// degradation (stop delivering) over silent loss of the signing key.
pub async fn invalidate_endpoint(
    store: &dyn SessionEndpointStore,
    session: &SessionId,
    failing_url: &str,
) {
    let Some(configured) = store.configured_url(session).await else {
        return;
    };
    if configured.trim() != failing_url.trim() || configured.trim().is_empty() {
        return;
    }

    let secret_ok = store
        .secret(session)
        .await
        .map(|s| s.trim().len() >= MIN_SECRET_LEN)
        .unwrap_or(false);
    if !secret_ok {
        store.store_secret(session, generate_secret()).await;
    }

    store.clear_url(session).await;
    tracing::warn!(
        %session,
        target = failing_url,
        "endpoint URL cleared after terminal failure; secret preserved"
    );
}

/// In-memory endpoint store for tests and single-process embeddings.
#[derive(Debug, Default)]
pub struct InMemoryEndpointStore {
    records: Mutex<HashMap<SessionId, EndpointRecord>>,
}

#[derive(Debug, Clone, Default)]
struct EndpointRecord {
    url: String,
    secret: String,
}

impl InMemoryEndpointStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an endpoint for a session.
    pub async fn set(&self, session: SessionId, url: impl Into<String>, secret: impl Into<String>) {
        let mut records = self.records.lock().await;
        records.insert(session, EndpointRecord { url: url.into(), secret: secret.into() });
    }
}

#[async_trait::async_trait]
impl SessionEndpointStore for InMemoryEndpointStore {
    async fn configured_url(&self, session: &SessionId) -> Option<String> {
        let records = self.records.lock().await;
        records.get(session).map(|r| r.url.clone()).filter(|url| !url.is_empty())
    }

    async fn secret(&self, session: &SessionId) -> Option<String> {
        let records = self.records.lock().await;
        records.get(session).map(|r| r.secret.clone()).filter(|s| !s.is_empty())
    }

    async fn clear_url(&self, session: &SessionId) {
        let mut records = self.records.lock().await;
        records.entry(session.clone()).or_default().url = String::new();
    }

    async fn store_secret(&self, session: &SessionId, secret: String) {
        let mut records = self.records.lock().await;
        records.entry(session.clone()).or_default().secret = secret;
    }
}
