//! Test support for the Hermod workspace.
//!
//! Provides [`MockBackend`], a recording messaging backend with scriptable
//! failures and optional per-call latency, used by the interpreter and
//! dispatcher test suites.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use hermod_actions::{
    action::{
        ButtonsMessage, ContactCard, DocumentMessage, ListMessage, LocationMessage, MediaMessage,
        MessageKey, PollMessage, PresenceState, StickerSource, TextMessage,
    },
    backend::{BackendError, MessagingBackend},
};
use hermod_core::models::SessionId;
use serde_json::Value;
use tokio::sync::Mutex;

/// Installs a compact tracing subscriber for test output.
///
/// Safe to call from every test; only the first call wins.
pub fn install_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    /// `send_text`.
    Text {
        /// Destination chat.
        to: String,
        /// Message body.
        text: String,
        /// Mentioned destinations.
        mentions: Vec<String>,
    },
    /// `send_media`.
    Media {
        /// Destination chat.
        to: String,
        /// Source URL.
        url: String,
    },
    /// `send_document`.
    Document {
        /// Destination chat.
        to: String,
        /// Source URL.
        url: String,
    },
    /// `send_location`.
    Location {
        /// Destination chat.
        to: String,
        /// Latitude.
        lat: f64,
        /// Longitude.
        lng: f64,
    },
    /// `send_sticker`.
    Sticker {
        /// Destination chat.
        to: String,
    },
    /// `send_contact`.
    Contact {
        /// Destination chat.
        to: String,
        /// Rendered vCard block.
        vcard: String,
    },
    /// `send_buttons`.
    Buttons {
        /// Destination chat.
        to: String,
        /// Number of buttons.
        count: usize,
    },
    /// `send_list`.
    List {
        /// Destination chat.
        to: String,
        /// List-open button label.
        button_text: String,
    },
    /// `send_poll`.
    Poll {
        /// Destination chat.
        to: String,
        /// Poll question.
        name: String,
    },
    /// `send_raw`.
    Raw {
        /// Destination chat.
        to: String,
        /// Raw message body.
        message: Value,
    },
    /// `presence_subscribe`.
    PresenceSubscribe {
        /// Chat subscribed to.
        to: String,
    },
    /// `presence_update`.
    PresenceUpdate {
        /// State that was set.
        state: &'static str,
        /// Chat scope, when given.
        to: Option<String>,
    },
    /// `react`.
    React {
        /// Destination chat.
        to: String,
        /// Reaction emoji.
        emoji: String,
    },
    /// `star`.
    Star {
        /// Destination chat.
        to: String,
        /// Star on/off.
        on: bool,
    },
    /// `delete_for_me`.
    Delete {
        /// Destination chat.
        to: String,
        /// Whether media was dropped too.
        delete_media: bool,
    },
    /// `revoke`.
    Revoke {
        /// Destination chat.
        to: String,
        /// Revoked message ID.
        id: String,
    },
    /// `edit`.
    Edit {
        /// Destination chat.
        to: String,
        /// Replacement text.
        text: String,
    },
    /// `mark_read`.
    Read {
        /// Number of keys marked.
        count: usize,
    },
}

/// Recording messaging backend with scriptable send failures.
///
/// Every call is recorded (even failing ones, so attempt counts are
/// observable). The first `fail_next_sends(n)` send-family calls return an
/// error after recording; presence and read calls never fail.
#[derive(Debug, Default)]
pub struct MockBackend {
    calls: Mutex<Vec<BackendCall>>,
    failures_left: AtomicUsize,
    latency: Option<Duration>,
}

impl MockBackend {
    /// Creates a well-behaved mock.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates a mock whose every call sleeps for `latency` first.
    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self { latency: Some(latency), ..Self::default() })
    }

    /// Makes the next `n` send-family calls fail.
    pub fn fail_next_sends(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Snapshot of recorded calls, in backend arrival order.
    pub async fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().await.clone()
    }

    /// Number of recorded calls.
    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    async fn record(&self, call: BackendCall) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.calls.lock().await.push(call);
    }

    fn take_failure(&self) -> Result<(), BackendError> {
        let remaining = self.failures_left.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |n| n.checked_sub(1),
        );
        match remaining {
            Ok(_) => Err(BackendError::send("scripted failure")),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl MessagingBackend for MockBackend {
    async fn send_text(
        &self,
        _session: &SessionId,
        to: &str,
        message: TextMessage,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::Text {
            to: to.to_string(),
            text: message.text,
            mentions: message.mentions,
        })
        .await;
        self.take_failure()
    }

    async fn send_media(
        &self,
        _session: &SessionId,
        to: &str,
        message: MediaMessage,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::Media { to: to.to_string(), url: message.url }).await;
        self.take_failure()
    }

    async fn send_document(
        &self,
        _session: &SessionId,
        to: &str,
        message: DocumentMessage,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::Document { to: to.to_string(), url: message.url }).await;
        self.take_failure()
    }

    async fn send_location(
        &self,
        _session: &SessionId,
        to: &str,
        message: LocationMessage,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::Location {
            to: to.to_string(),
            lat: message.lat,
            lng: message.lng,
        })
        .await;
        self.take_failure()
    }

    async fn send_sticker(
        &self,
        _session: &SessionId,
        to: &str,
        _source: StickerSource,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::Sticker { to: to.to_string() }).await;
        self.take_failure()
    }

    async fn send_contact(
        &self,
        _session: &SessionId,
        to: &str,
        contact: ContactCard,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::Contact { to: to.to_string(), vcard: contact.to_vcard() }).await;
        self.take_failure()
    }

    async fn send_buttons(
        &self,
        _session: &SessionId,
        to: &str,
        message: ButtonsMessage,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::Buttons { to: to.to_string(), count: message.buttons.len() })
            .await;
        self.take_failure()
    }

    async fn send_list(
        &self,
        _session: &SessionId,
        to: &str,
        message: ListMessage,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::List { to: to.to_string(), button_text: message.button_text })
            .await;
        self.take_failure()
    }

    async fn send_poll(
        &self,
        _session: &SessionId,
        to: &str,
        message: PollMessage,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::Poll { to: to.to_string(), name: message.name }).await;
        self.take_failure()
    }

    async fn send_raw(
        &self,
        _session: &SessionId,
        to: &str,
        message: Value,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::Raw { to: to.to_string(), message }).await;
        self.take_failure()
    }

    async fn presence_subscribe(
        &self,
        _session: &SessionId,
        to: &str,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::PresenceSubscribe { to: to.to_string() }).await;
        Ok(())
    }

    async fn presence_update(
        &self,
        _session: &SessionId,
        state: PresenceState,
        to: Option<&str>,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::PresenceUpdate {
            state: state.as_str(),
            to: to.map(str::to_string),
        })
        .await;
        Ok(())
    }

    async fn react(
        &self,
        _session: &SessionId,
        to: &str,
        _key: MessageKey,
        emoji: String,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::React { to: to.to_string(), emoji }).await;
        self.take_failure()
    }

    async fn star(
        &self,
        _session: &SessionId,
        to: &str,
        _key: MessageKey,
        starred: bool,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::Star { to: to.to_string(), on: starred }).await;
        self.take_failure()
    }

    async fn delete_for_me(
        &self,
        _session: &SessionId,
        to: &str,
        _key: MessageKey,
        delete_media: bool,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::Delete { to: to.to_string(), delete_media }).await;
        self.take_failure()
    }

    async fn revoke(
        &self,
        _session: &SessionId,
        to: &str,
        key: MessageKey,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::Revoke { to: to.to_string(), id: key.id }).await;
        self.take_failure()
    }

    async fn edit(
        &self,
        _session: &SessionId,
        to: &str,
        _key: MessageKey,
        text: String,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::Edit { to: to.to_string(), text }).await;
        self.take_failure()
    }

    async fn mark_read(
        &self,
        _session: &SessionId,
        keys: Vec<MessageKey>,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::Read { count: keys.len() }).await;
        Ok(())
    }
}
