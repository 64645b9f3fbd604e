//! Messaging backend collaborator surface.
//!
//! The interpreter never talks to the messaging protocol directly; it
//! translates each action leaf into exactly one call on this trait. The
//! protocol/session layer implements it, and `hermod-testing` provides a
//! recording mock for tests.
//!
//! Media parameters carry source URLs and backend-defined transform blocks:
//! fetching, image transforms, and transcoding happen inside the backend so
//! a leaf stays a single call whatever post-processing was requested.

use hermod_core::models::SessionId;
use serde_json::Value;
use thiserror::Error;

use crate::action::{
    ButtonsMessage, ContactCard, DocumentMessage, ListMessage, LocationMessage, MediaMessage,
    MessageKey, PollMessage, PresenceState, StickerSource, TextMessage,
};

/// Errors surfaced by the messaging backend.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The session has no live connection.
    #[error("session {session} not connected")]
    SessionUnavailable {
        /// Session that was addressed.
        session: String,
    },

    /// The send itself failed.
    #[error("send failed: {message}")]
    Send {
        /// Backend failure description.
        message: String,
    },

    /// Media could not be fetched or processed.
    #[error("media unavailable: {message}")]
    Media {
        /// What went wrong with the media source.
        message: String,
    },
}

impl BackendError {
    /// Creates a session-unavailable error.
    pub fn session_unavailable(session: &SessionId) -> Self {
        Self::SessionUnavailable { session: session.to_string() }
    }

    /// Creates a send failure.
    pub fn send(message: impl Into<String>) -> Self {
        Self::Send { message: message.into() }
    }

    /// Creates a media failure.
    pub fn media(message: impl Into<String>) -> Self {
        Self::Media { message: message.into() }
    }
}

/// Typed send and control primitives of the messaging protocol layer.
///
/// Calls must be cheap to clone around (`Arc<dyn MessagingBackend>`); the
/// interpreter serializes them per session through its send queue, so
/// implementations do not need their own ordering guarantees.
#[async_trait::async_trait]
pub trait MessagingBackend: Send + Sync + std::fmt::Debug {
    /// Sends plain text.
    async fn send_text(
        &self,
        session: &SessionId,
        to: &str,
        message: TextMessage,
    ) -> Result<(), BackendError>;

    /// Sends image/video/gif/audio media fetched from a URL.
    async fn send_media(
        &self,
        session: &SessionId,
        to: &str,
        message: MediaMessage,
    ) -> Result<(), BackendError>;

    /// Sends a document.
    async fn send_document(
        &self,
        session: &SessionId,
        to: &str,
        message: DocumentMessage,
    ) -> Result<(), BackendError>;

    /// Sends a location pin.
    async fn send_location(
        &self,
        session: &SessionId,
        to: &str,
        message: LocationMessage,
    ) -> Result<(), BackendError>;

    /// Sends a sticker.
    async fn send_sticker(
        &self,
        session: &SessionId,
        to: &str,
        source: StickerSource,
    ) -> Result<(), BackendError>;

    /// Sends a contact card.
    async fn send_contact(
        &self,
        session: &SessionId,
        to: &str,
        contact: ContactCard,
    ) -> Result<(), BackendError>;

    /// Sends an interactive button message.
    async fn send_buttons(
        &self,
        session: &SessionId,
        to: &str,
        message: ButtonsMessage,
    ) -> Result<(), BackendError>;

    /// Sends an interactive list message.
    async fn send_list(
        &self,
        session: &SessionId,
        to: &str,
        message: ListMessage,
    ) -> Result<(), BackendError>;

    /// Sends a poll.
    async fn send_poll(
        &self,
        session: &SessionId,
        to: &str,
        message: PollMessage,
    ) -> Result<(), BackendError>;

    /// Sends a raw protocol message (forward/raw passthrough).
    async fn send_raw(
        &self,
        session: &SessionId,
        to: &str,
        message: Value,
    ) -> Result<(), BackendError>;

    /// Subscribes to a chat's presence updates.
    async fn presence_subscribe(&self, session: &SessionId, to: &str) -> Result<(), BackendError>;

    /// Sets the session's presence, optionally scoped to a chat.
    async fn presence_update(
        &self,
        session: &SessionId,
        state: PresenceState,
        to: Option<&str>,
    ) -> Result<(), BackendError>;

    /// Reacts to a message with an emoji.
    async fn react(
        &self,
        session: &SessionId,
        to: &str,
        key: MessageKey,
        emoji: String,
    ) -> Result<(), BackendError>;

    /// Stars or unstars a message.
    async fn star(
        &self,
        session: &SessionId,
        to: &str,
        key: MessageKey,
        starred: bool,
    ) -> Result<(), BackendError>;

    /// Deletes a message for this session only.
    async fn delete_for_me(
        &self,
        session: &SessionId,
        to: &str,
        key: MessageKey,
        delete_media: bool,
    ) -> Result<(), BackendError>;

    /// Revokes a message for everyone.
    async fn revoke(
        &self,
        session: &SessionId,
        to: &str,
        key: MessageKey,
    ) -> Result<(), BackendError>;

    /// Edits a previously sent message.
    async fn edit(
        &self,
        session: &SessionId,
        to: &str,
        key: MessageKey,
        text: String,
    ) -> Result<(), BackendError>;

    /// Marks messages as read.
    async fn mark_read(
        &self,
        session: &SessionId,
        keys: Vec<MessageKey>,
    ) -> Result<(), BackendError>;
}
