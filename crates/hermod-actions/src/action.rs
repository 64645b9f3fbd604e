//! Subscriber action tree: model and defensive parser.
//!
//! A subscriber's 2xx response may carry a list of actions — a small
//! tree-structured program with sequencing, parallelism, conditionals, and
//! bounded retries around leaf sends. Responses are untrusted input, so the
//! tree is parsed defensively into a closed tagged union: unknown kinds and
//! nodes missing their minimum fields become [`ActionNode::Noop`] with a
//! logged warning instead of failing the whole list.
//!
//! Field aliases accepted here (`to`/`chat`/`jid`, `delayMs`/`backoffMs`,
//! `then`/`do`/`items`, ...) match what subscribers already send; renaming
//! them would silently break existing receivers.

use serde_json::Value;
use tracing::warn;

/// Identifier of a previously sent or received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageKey {
    /// Backend message ID.
    pub id: String,
    /// Whether the message was sent by this session.
    pub from_me: bool,
    /// Chat the message belongs to, when the key carries it.
    pub remote: Option<String>,
}

impl MessageKey {
    /// Parses a key object; requires a non-empty `id`.
    pub fn parse(value: &Value) -> Option<Self> {
        let id = value.get("id")?.as_str()?.trim();
        if id.is_empty() {
            return None;
        }
        Some(Self {
            id: id.to_string(),
            from_me: value.get("fromMe").and_then(Value::as_bool).unwrap_or(false),
            remote: value
                .get("remoteJid")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// Presence states understood by the messaging backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    /// Online.
    Available,
    /// Offline.
    Unavailable,
    /// Typing indicator.
    Composing,
    /// Voice-note recording indicator.
    Recording,
    /// Indicator cleared.
    Paused,
}

impl PresenceState {
    /// Parses a state name, defaulting to `Available`.
    pub fn parse(input: &str) -> Self {
        match input.trim().to_ascii_lowercase().as_str() {
            "unavailable" => Self::Unavailable,
            "composing" => Self::Composing,
            "recording" => Self::Recording,
            "paused" => Self::Paused,
            _ => Self::Available,
        }
    }

    /// Wire name of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Unavailable => "unavailable",
            Self::Composing => "composing",
            Self::Recording => "recording",
            Self::Paused => "paused",
        }
    }

    /// Whether this state drives a visible activity indicator.
    pub fn is_indicator(self) -> bool {
        matches!(self, Self::Composing | Self::Recording)
    }
}

/// Text send payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextMessage {
    /// Message body.
    pub text: String,
    /// Destinations to mention inside the body.
    pub mentions: Vec<String>,
}

/// Media category of a media send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Still image.
    Image,
    /// Video clip.
    Video,
    /// Video sent with GIF playback.
    Gif,
    /// Voice note / audio.
    Audio,
}

impl MediaKind {
    fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "gif" => Some(Self::Gif),
            "audio" => Some(Self::Audio),
            _ => None,
        }
    }
}

/// Media send payload.
///
/// `transform` and `transcode` are backend-defined option blocks (resize,
/// format, bitrate, ...) passed through verbatim so the backend can apply
/// them while fetching and sending in one step.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaMessage {
    /// Media category.
    pub kind: MediaKind,
    /// Source URL to fetch the media from.
    pub url: String,
    /// Optional caption.
    pub caption: Option<String>,
    /// Image transform options, if requested.
    pub transform: Option<Value>,
    /// Audio/video transcode options, if requested.
    pub transcode: Option<Value>,
}

/// Document send payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMessage {
    /// Source URL to fetch the document from.
    pub url: String,
    /// File name presented to the recipient.
    pub filename: Option<String>,
    /// Optional caption.
    pub caption: Option<String>,
}

/// Location send payload.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationMessage {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Optional place name.
    pub name: Option<String>,
    /// Optional street address.
    pub address: Option<String>,
}

/// Source of a sticker send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StickerSource {
    /// Ready-made webp sticker.
    Webp {
        /// Source URL.
        url: String,
    },
    /// Image to be converted into a sticker by the backend.
    Image {
        /// Source URL.
        url: String,
    },
}

/// Contact card payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContactCard {
    /// Display name.
    pub full_name: Option<String>,
    /// Organization.
    pub org: Option<String>,
    /// Phone number; non-digits are stripped for the card.
    pub phone: Option<String>,
    /// Email address.
    pub email: Option<String>,
}

impl ContactCard {
    /// Renders the card as a vCard 3.0 block.
    pub fn to_vcard(&self) -> String {
        let digits: String = self
            .phone
            .as_deref()
            .unwrap_or("")
            .chars()
            .filter(char::is_ascii_digit)
            .collect();

        let mut lines = vec![
            "BEGIN:VCARD".to_string(),
            "VERSION:3.0".to_string(),
            format!("FN:{}", self.full_name.as_deref().unwrap_or("")),
        ];
        if let Some(org) = &self.org {
            lines.push(format!("ORG:{org}"));
        }
        if !digits.is_empty() {
            lines.push(format!("TEL;type=CELL;type=VOICE;waid={digits}:{digits}"));
        }
        if let Some(email) = &self.email {
            lines.push(format!("EMAIL:{email}"));
        }
        lines.push("END:VCARD".to_string());
        lines.join("\n")
    }
}

/// Interactive buttons payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ButtonsMessage {
    /// Body text.
    pub text: String,
    /// Optional footer line.
    pub footer: Option<String>,
    /// Optional header image URL.
    pub image: Option<String>,
    /// Backend-defined button descriptors.
    pub buttons: Vec<Value>,
    /// Message to quote, backend-defined.
    pub quoted: Option<Value>,
}

/// Interactive list payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ListMessage {
    /// Body text.
    pub text: String,
    /// Optional footer line.
    pub footer: Option<String>,
    /// Label of the list-open button.
    pub button_text: String,
    /// Backend-defined list sections.
    pub sections: Vec<Value>,
    /// Optional header image URL.
    pub image: Option<String>,
    /// Message to quote, backend-defined.
    pub quoted: Option<Value>,
}

/// Poll payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollMessage {
    /// Poll question.
    pub name: String,
    /// Answer options.
    pub options: Vec<String>,
    /// How many options a voter may select.
    pub selectable_count: u32,
}

/// One node of the subscriber-supplied action tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionNode {
    /// Pause, optionally simulating a typing/recording indicator.
    Delay {
        /// Pause length; configured default when absent.
        ms: Option<u64>,
        /// Indicator to show during the pause.
        state: Option<PresenceState>,
        /// Chat to show the indicator in.
        to: Option<String>,
    },
    /// Typing indicator around a pause.
    Typing {
        /// Chat to show the indicator in.
        to: String,
        /// Pause length; configured default when absent.
        ms: Option<u64>,
    },
    /// Set a literal presence state.
    Presence {
        /// Chat scope, when present.
        to: Option<String>,
        /// State to set.
        state: PresenceState,
    },
    /// React to a message with an emoji.
    React {
        /// Chat containing the message.
        to: String,
        /// Message to react to.
        key: MessageKey,
        /// Reaction emoji.
        emoji: String,
    },
    /// Star or unstar a message.
    Star {
        /// Chat containing the message.
        to: String,
        /// Message to toggle.
        key: MessageKey,
        /// True to star, false to unstar.
        on: bool,
    },
    /// Delete a message for this session only.
    DeleteForMe {
        /// Chat containing the message.
        to: String,
        /// Message to delete.
        key: MessageKey,
        /// Whether to also drop downloaded media.
        delete_media: bool,
    },
    /// Revoke a message for everyone.
    Revoke {
        /// Chat containing the message.
        to: String,
        /// Message to revoke.
        key: MessageKey,
        /// Whether to also delete the local copy.
        also_for_me: bool,
    },
    /// Edit a previously sent message.
    Edit {
        /// Chat containing the message.
        to: String,
        /// Message to edit.
        key: MessageKey,
        /// Replacement text.
        text: String,
    },
    /// Mark messages as read.
    Read {
        /// Messages to mark.
        keys: Vec<MessageKey>,
    },
    /// Strictly sequential block.
    Queue {
        /// Items executed in order.
        items: Vec<ActionNode>,
        /// Delay between items (not after the last).
        inter_delay_ms: Option<u64>,
    },
    /// Concurrent block; branch failures do not cancel siblings.
    Parallel {
        /// Items launched together.
        items: Vec<ActionNode>,
    },
    /// Conditional block.
    When {
        /// Rendered condition value.
        condition: Value,
        /// Items run when the condition is truthy.
        then_branch: Vec<ActionNode>,
        /// Items run when the condition is falsy.
        else_branch: Vec<ActionNode>,
    },
    /// Bounded retry around one item.
    Retry {
        /// Maximum attempts (at least 1).
        attempts: u32,
        /// Fixed delay between attempts.
        backoff_ms: u64,
        /// Item to attempt.
        item: Box<ActionNode>,
        /// Items run once attempts are exhausted.
        on_fail: Vec<ActionNode>,
    },
    /// Plain text send.
    Text {
        /// Destination chat.
        to: String,
        /// Payload.
        message: TextMessage,
    },
    /// Media send.
    Media {
        /// Destination chat.
        to: String,
        /// Payload.
        message: MediaMessage,
    },
    /// Document send.
    Document {
        /// Destination chat.
        to: String,
        /// Payload.
        message: DocumentMessage,
    },
    /// Location send.
    Location {
        /// Destination chat.
        to: String,
        /// Payload.
        message: LocationMessage,
    },
    /// Sticker send.
    Sticker {
        /// Destination chat.
        to: String,
        /// Payload.
        source: StickerSource,
    },
    /// Contact card send.
    Vcard {
        /// Destination chat.
        to: String,
        /// Payload.
        contact: ContactCard,
    },
    /// Interactive buttons send.
    Buttons {
        /// Destination chat.
        to: String,
        /// Payload.
        message: ButtonsMessage,
    },
    /// Interactive list send.
    List {
        /// Destination chat.
        to: String,
        /// Payload.
        message: ListMessage,
    },
    /// Poll send.
    Poll {
        /// Destination chat.
        to: String,
        /// Payload.
        message: PollMessage,
    },
    /// Forwarded message, backend-defined body.
    Forward {
        /// Destination chat.
        to: String,
        /// Raw message body.
        message: Value,
    },
    /// Raw passthrough message.
    Raw {
        /// Destination chat.
        to: String,
        /// Raw message body.
        message: Value,
    },
    /// Unknown or malformed action; executing it does nothing.
    Noop,
}

impl ActionNode {
    /// Parses one rendered action object.
    ///
    /// Total: anything unrecognized degrades to `Noop` with a warning.
    pub fn parse(entry: &Value) -> Self {
        if !entry.is_object() {
            warn!("action entry is not an object, ignoring");
            return Self::Noop;
        }

        let Some(kind) = kind_of(entry) else {
            warn!("action entry has no act/action/type, ignoring");
            return Self::Noop;
        };

        match kind.as_str() {
            "delay" => Self::Delay {
                ms: delay_ms(entry),
                state: str_field(entry, &["state"]).as_deref().map(PresenceState::parse),
                to: destination(entry),
            },
            "typing" => match destination(entry) {
                Some(to) => Self::Typing { to, ms: millis_field(entry, &["ms"]) },
                None => {
                    warn!("typing action requires a destination, ignoring");
                    Self::Noop
                },
            },
            "presence" => Self::Presence {
                to: destination(entry),
                state: str_field(entry, &["state", "status"])
                    .as_deref()
                    .map(PresenceState::parse)
                    .unwrap_or(PresenceState::Available),
            },
            "react" => {
                let emoji = str_field(entry, &["text", "emoji", "reaction"]);
                match (destination(entry), keyed(entry), emoji) {
                    (Some(to), Some(key), Some(emoji)) => Self::React { to, key, emoji },
                    _ => skip(&kind, "destination, key, and emoji"),
                }
            },
            "star" | "unstar" => match (destination(entry), keyed(entry)) {
                (Some(to), Some(key)) => Self::Star { to, key, on: kind == "star" },
                _ => skip(&kind, "destination and key"),
            },
            "delete" => match (destination(entry), keyed(entry)) {
                (Some(to), Some(key)) => Self::DeleteForMe {
                    to,
                    key,
                    delete_media: bool_field(entry, &["deleteMedia", "withMedia"]).unwrap_or(true),
                },
                _ => skip(&kind, "destination and key"),
            },
            "revoke" => match (destination(entry), keyed(entry)) {
                (Some(to), Some(key)) => Self::Revoke {
                    to,
                    key,
                    also_for_me: bool_field(entry, &["deleteForMe"]).unwrap_or(false),
                },
                _ => skip(&kind, "destination and key"),
            },
            "edit" => {
                let text = str_field(entry, &["message", "text"]);
                match (destination(entry), keyed(entry), text) {
                    (Some(to), Some(key), Some(text)) => Self::Edit { to, key, text },
                    _ => skip(&kind, "destination, key, and text"),
                }
            },
            "read" => {
                let keys = read_keys(entry);
                if keys.is_empty() {
                    skip(&kind, "at least one key")
                } else {
                    Self::Read { keys }
                }
            },
            "queue" => Self::Queue {
                items: items_of(entry, &["items"]),
                inter_delay_ms: millis_field(entry, &["delayMs"]),
            },
            "parallel" => Self::Parallel { items: items_of(entry, &["items"]) },
            "when" => Self::When {
                condition: entry
                    .get("cond")
                    .or_else(|| entry.get("condition"))
                    .cloned()
                    .unwrap_or(Value::Null),
                then_branch: items_of(entry, &["then", "do", "items"]),
                else_branch: items_of(entry, &["else", "otherwise"]),
            },
            "retry" => {
                let inner = entry
                    .get("item")
                    .or_else(|| entry.get("items").and_then(|items| items.get(0)));
                match inner {
                    Some(inner) => Self::Retry {
                        attempts: number_field(entry, &["attempts", "times"])
                            .map(|n| n as u32)
                            .unwrap_or(3)
                            .max(1),
                        backoff_ms: millis_field(entry, &["delayMs", "backoffMs"]).unwrap_or(500),
                        item: Box::new(Self::parse(inner)),
                        on_fail: items_of(entry, &["onFail"]),
                    },
                    None => skip(&kind, "an item"),
                }
            },
            "text" => match destination(entry) {
                Some(to) => Self::Text {
                    to,
                    message: TextMessage {
                        text: str_field(entry, &["text"]).unwrap_or_default(),
                        mentions: string_array(entry, "mentions"),
                    },
                },
                None => skip(&kind, "a destination"),
            },
            "media" => {
                let kind_str = str_field(entry, &["mediaType"]).unwrap_or_default();
                let media_kind = MediaKind::parse(&kind_str);
                match (destination(entry), media_kind, str_field(entry, &["url"])) {
                    (Some(to), Some(media_kind), Some(url)) => Self::Media {
                        to,
                        message: MediaMessage {
                            kind: media_kind,
                            url,
                            caption: str_field(entry, &["caption"]),
                            transform: entry.get("transform").cloned(),
                            transcode: entry.get("transcode").cloned(),
                        },
                    },
                    _ => skip(&kind, "destination, supported mediaType, and url"),
                }
            },
            "document" => match (destination(entry), str_field(entry, &["url"])) {
                (Some(to), Some(url)) => Self::Document {
                    to,
                    message: DocumentMessage {
                        url,
                        filename: str_field(entry, &["filename"]),
                        caption: str_field(entry, &["caption"]),
                    },
                },
                _ => skip(&kind, "destination and url"),
            },
            "location" => {
                let lat = number_field(entry, &["lat"]);
                let lng = number_field(entry, &["lng"]);
                match (destination(entry), lat, lng) {
                    (Some(to), Some(lat), Some(lng)) => Self::Location {
                        to,
                        message: LocationMessage {
                            lat,
                            lng,
                            name: str_field(entry, &["name"]),
                            address: str_field(entry, &["address"]),
                        },
                    },
                    _ => skip(&kind, "destination, lat, and lng"),
                }
            },
            "sticker" => {
                let source = str_field(entry, &["webpUrl"])
                    .map(|url| StickerSource::Webp { url })
                    .or_else(|| str_field(entry, &["imageUrl"]).map(|url| StickerSource::Image { url }));
                match (destination(entry), source) {
                    (Some(to), Some(source)) => Self::Sticker { to, source },
                    _ => skip(&kind, "destination and webpUrl/imageUrl"),
                }
            },
            "vcard" => match destination(entry) {
                Some(to) => {
                    let contact = entry.get("contact").cloned().unwrap_or(Value::Null);
                    Self::Vcard {
                        to,
                        contact: ContactCard {
                            full_name: str_field(&contact, &["fullName"]),
                            org: str_field(&contact, &["org"]),
                            phone: str_field(&contact, &["phone"]),
                            email: str_field(&contact, &["email"]),
                        },
                    }
                },
                None => skip(&kind, "a destination"),
            },
            "button" | "buttons" => match destination(entry) {
                Some(to) => {
                    if let Some(message) = entry.get("message") {
                        Self::Raw { to, message: message.clone() }
                    } else if let Some(Value::Array(buttons)) = entry.get("buttons") {
                        Self::Buttons {
                            to,
                            message: ButtonsMessage {
                                text: str_field(entry, &["text"]).unwrap_or_else(|| " ".to_string()),
                                footer: str_field(entry, &["footer"]),
                                image: str_field(entry, &["image"]),
                                buttons: buttons.clone(),
                                quoted: entry.get("quoted").cloned(),
                            },
                        }
                    } else {
                        skip(&kind, "a message or buttons array")
                    }
                },
                None => skip(&kind, "a destination"),
            },
            "list" => match destination(entry) {
                Some(to) => {
                    if let Some(message) = entry.get("message") {
                        Self::Raw { to, message: message.clone() }
                    } else if let Some(sections) = list_sections(entry) {
                        Self::List {
                            to,
                            message: ListMessage {
                                text: str_field(entry, &["text"]).unwrap_or_else(|| " ".to_string()),
                                footer: str_field(entry, &["footer"]),
                                button_text: str_field(entry, &["buttonText"])
                                    .or_else(|| {
                                        str_field(
                                            entry.get("list").unwrap_or(&Value::Null),
                                            &["buttonText"],
                                        )
                                    })
                                    .unwrap_or_else(|| "Open".to_string()),
                                sections,
                                image: str_field(entry, &["image"]),
                                quoted: entry.get("quoted").cloned(),
                            },
                        }
                    } else {
                        skip(&kind, "a message or list/sections")
                    }
                },
                None => skip(&kind, "a destination"),
            },
            "poll" => match destination(entry) {
                Some(to) => {
                    if let Some(poll) = entry.get("poll").filter(|p| p.is_object()) {
                        Self::Poll {
                            to,
                            message: PollMessage {
                                name: str_field(poll, &["name"]).unwrap_or_default(),
                                options: string_array(poll, "options")
                                    .into_iter()
                                    .chain(string_array(poll, "values"))
                                    .collect(),
                                selectable_count: number_field(poll, &["selectableCount"])
                                    .map(|n| n as u32)
                                    .unwrap_or(1),
                            },
                        }
                    } else if let Some(message) = entry.get("message") {
                        Self::Raw { to, message: message.clone() }
                    } else {
                        skip(&kind, "a poll object or message")
                    }
                },
                None => skip(&kind, "a destination"),
            },
            "forward" => match (destination(entry), entry.get("message")) {
                (Some(to), Some(message)) => Self::Forward { to, message: message.clone() },
                _ => skip(&kind, "destination and message"),
            },
            "raw" => match (destination(entry), entry.get("message")) {
                (Some(to), Some(message)) => Self::Raw { to, message: message.clone() },
                _ => skip(&kind, "destination and message"),
            },
            "noop" => Self::Noop,
            other => {
                warn!(kind = other, "unknown action kind, ignoring");
                Self::Noop
            },
        }
    }

    /// Whether this node is a control node (no inter-action delay applies).
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            Self::Delay { .. }
                | Self::Typing { .. }
                | Self::Presence { .. }
                | Self::React { .. }
                | Self::Star { .. }
                | Self::DeleteForMe { .. }
                | Self::Revoke { .. }
                | Self::Edit { .. }
                | Self::Read { .. }
                | Self::Queue { .. }
                | Self::Parallel { .. }
                | Self::When { .. }
                | Self::Retry { .. }
                | Self::Noop
        )
    }
}

/// Falsy semantics for `when` conditions.
///
/// False: boolean false, numeric zero, null, and the trimmed lowercase
/// strings `""`, `"0"`, `"false"`, `"null"`, `"undefined"`, `"no"`.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::Null => false,
        Value::String(s) => !matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "" | "0" | "false" | "null" | "undefined" | "no"
        ),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn skip(kind: &str, needs: &str) -> ActionNode {
    warn!(kind, "action missing {needs}, ignoring");
    ActionNode::Noop
}

fn kind_of(entry: &Value) -> Option<String> {
    for key in ["act", "action", "type"] {
        if let Some(Value::String(s)) = entry.get(key) {
            let s = s.trim().to_ascii_lowercase();
            if !s.is_empty() {
                return Some(s);
            }
        }
    }
    None
}

fn str_field(entry: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(Value::String(s)) = entry.get(key) {
            if !s.trim().is_empty() {
                return Some(s.clone());
            }
        }
    }
    None
}

fn number_field(entry: &Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        match entry.get(key) {
            Some(Value::Number(n)) => return n.as_f64(),
            Some(Value::String(s)) => {
                if let Ok(parsed) = s.trim().parse::<f64>() {
                    return Some(parsed);
                }
            },
            _ => {},
        }
    }
    None
}

fn millis_field(entry: &Value, keys: &[&str]) -> Option<u64> {
    number_field(entry, keys).filter(|n| n.is_finite() && *n >= 0.0).map(|n| n as u64)
}

fn bool_field(entry: &Value, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|key| entry.get(*key).and_then(Value::as_bool))
}

/// Pause length: `ms`/`delayMs`, or `seconds`/`sec` scaled to millis.
fn delay_ms(entry: &Value) -> Option<u64> {
    millis_field(entry, &["ms", "delayMs"])
        .or_else(|| number_field(entry, &["seconds", "sec"]).map(|s| (s * 1000.0).max(0.0) as u64))
}

/// Destination chat: `to`/`chat`/`jid`, falling back to the key's chat.
fn destination(entry: &Value) -> Option<String> {
    str_field(entry, &["to", "chat", "jid"]).or_else(|| {
        entry
            .get("key")
            .and_then(|key| key.get("remoteJid"))
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    })
}

fn keyed(entry: &Value) -> Option<MessageKey> {
    entry.get("key").and_then(MessageKey::parse)
}

fn read_keys(entry: &Value) -> Vec<MessageKey> {
    match entry.get("keys") {
        Some(Value::Array(keys)) => keys.iter().filter_map(MessageKey::parse).collect(),
        _ => keyed(entry).into_iter().collect(),
    }
}

fn items_of(entry: &Value, keys: &[&str]) -> Vec<ActionNode> {
    for key in keys {
        if let Some(Value::Array(items)) = entry.get(key) {
            return items.iter().map(ActionNode::parse).collect();
        }
    }
    Vec::new()
}

fn string_array(entry: &Value, key: &str) -> Vec<String> {
    match entry.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn list_sections(entry: &Value) -> Option<Vec<Value>> {
    if let Some(Value::Array(sections)) = entry.get("sections") {
        return Some(sections.clone());
    }
    if let Some(Value::Array(sections)) = entry.get("list").and_then(|list| list.get("sections")) {
        return Some(sections.clone());
    }
    None
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_text_send_with_mentions() {
        let node = ActionNode::parse(&json!({
            "type": "text", "to": "12345", "text": "hi", "mentions": ["678"]
        }));
        match node {
            ActionNode::Text { to, message } => {
                assert_eq!(to, "12345");
                assert_eq!(message.text, "hi");
                assert_eq!(message.mentions, vec!["678"]);
            },
            other => panic!("expected text node, got {other:?}"),
        }
    }

    #[test]
    fn kind_aliases_are_accepted() {
        assert!(matches!(
            ActionNode::parse(&json!({"act": "delay", "ms": 100})),
            ActionNode::Delay { ms: Some(100), .. }
        ));
        assert!(matches!(
            ActionNode::parse(&json!({"action": "delay", "seconds": 2})),
            ActionNode::Delay { ms: Some(2000), .. }
        ));
        assert!(matches!(
            ActionNode::parse(&json!({"type": "Delay", "delayMs": 50})),
            ActionNode::Delay { ms: Some(50), .. }
        ));
    }

    #[test]
    fn unknown_kind_degrades_to_noop() {
        assert_eq!(ActionNode::parse(&json!({"type": "teleport", "to": "1"})), ActionNode::Noop);
        assert_eq!(ActionNode::parse(&json!("not an object")), ActionNode::Noop);
        assert_eq!(ActionNode::parse(&json!({})), ActionNode::Noop);
    }

    #[test]
    fn react_requires_destination_key_and_emoji() {
        let complete = ActionNode::parse(&json!({
            "type": "react", "to": "123", "emoji": "👍",
            "key": {"id": "m1", "fromMe": false}
        }));
        assert!(matches!(complete, ActionNode::React { .. }));

        let missing_key = ActionNode::parse(&json!({"type": "react", "to": "123", "emoji": "x"}));
        assert_eq!(missing_key, ActionNode::Noop);
    }

    #[test]
    fn destination_falls_back_to_key_remote() {
        let node = ActionNode::parse(&json!({
            "type": "star",
            "key": {"id": "m1", "fromMe": true, "remoteJid": "123@chat"}
        }));
        match node {
            ActionNode::Star { to, key, on } => {
                assert_eq!(to, "123@chat");
                assert!(key.from_me);
                assert!(on);
            },
            other => panic!("expected star node, got {other:?}"),
        }
    }

    #[test]
    fn delete_media_defaults_on() {
        let node = ActionNode::parse(&json!({
            "type": "delete", "to": "1", "key": {"id": "m"}
        }));
        assert!(matches!(node, ActionNode::DeleteForMe { delete_media: true, .. }));

        let off = ActionNode::parse(&json!({
            "type": "delete", "to": "1", "key": {"id": "m"}, "withMedia": false
        }));
        assert!(matches!(off, ActionNode::DeleteForMe { delete_media: false, .. }));
    }

    #[test]
    fn retry_aliases_and_bounds() {
        let node = ActionNode::parse(&json!({
            "type": "retry", "times": 0, "backoffMs": 50,
            "item": {"type": "text", "to": "1", "text": "x"},
            "onFail": [{"type": "text", "to": "1", "text": "fallback"}]
        }));
        match node {
            ActionNode::Retry { attempts, backoff_ms, item, on_fail } => {
                assert_eq!(attempts, 1); // clamped to minimum
                assert_eq!(backoff_ms, 50);
                assert!(matches!(*item, ActionNode::Text { .. }));
                assert_eq!(on_fail.len(), 1);
            },
            other => panic!("expected retry node, got {other:?}"),
        }

        assert_eq!(ActionNode::parse(&json!({"type": "retry"})), ActionNode::Noop);
    }

    #[test]
    fn when_reads_branch_aliases() {
        let node = ActionNode::parse(&json!({
            "type": "when", "cond": "yes",
            "do": [{"type": "text", "to": "1", "text": "a"}],
            "otherwise": [{"type": "text", "to": "1", "text": "b"}]
        }));
        match node {
            ActionNode::When { condition, then_branch, else_branch } => {
                assert_eq!(condition, json!("yes"));
                assert_eq!(then_branch.len(), 1);
                assert_eq!(else_branch.len(), 1);
            },
            other => panic!("expected when node, got {other:?}"),
        }
    }

    #[test]
    fn queue_parses_nested_items_recursively() {
        let node = ActionNode::parse(&json!({
            "type": "queue", "delayMs": 10,
            "items": [
                {"type": "text", "to": "1", "text": "a"},
                {"type": "parallel", "items": [{"type": "text", "to": "1", "text": "b"}]}
            ]
        }));
        match node {
            ActionNode::Queue { items, inter_delay_ms } => {
                assert_eq!(inter_delay_ms, Some(10));
                assert_eq!(items.len(), 2);
                assert!(matches!(items[1], ActionNode::Parallel { .. }));
            },
            other => panic!("expected queue node, got {other:?}"),
        }
    }

    #[test]
    fn media_requires_supported_kind() {
        let node = ActionNode::parse(&json!({
            "type": "media", "to": "1", "mediaType": "image",
            "url": "https://cdn.example/pic.png", "caption": "look"
        }));
        assert!(matches!(
            node,
            ActionNode::Media { message: MediaMessage { kind: MediaKind::Image, .. }, .. }
        ));

        let bad = ActionNode::parse(&json!({
            "type": "media", "to": "1", "mediaType": "hologram", "url": "https://x"
        }));
        assert_eq!(bad, ActionNode::Noop);
    }

    #[test]
    fn button_message_passthrough_becomes_raw() {
        let node = ActionNode::parse(&json!({
            "type": "button", "to": "1", "message": {"custom": true}
        }));
        assert!(matches!(node, ActionNode::Raw { .. }));

        let composed = ActionNode::parse(&json!({
            "type": "button", "to": "1", "buttons": [{"id": "b1", "text": "Go"}]
        }));
        assert!(matches!(composed, ActionNode::Buttons { .. }));
    }

    #[test]
    fn list_reads_flat_and_nested_sections() {
        let nested = ActionNode::parse(&json!({
            "type": "list", "to": "1",
            "list": {"buttonText": "Pick", "sections": [{"title": "s"}]}
        }));
        match nested {
            ActionNode::List { message, .. } => {
                assert_eq!(message.button_text, "Pick");
                assert_eq!(message.sections.len(), 1);
            },
            other => panic!("expected list node, got {other:?}"),
        }

        let flat = ActionNode::parse(&json!({
            "type": "list", "to": "1", "sections": [{"title": "s"}]
        }));
        assert!(matches!(flat, ActionNode::List { .. }));
    }

    #[test]
    fn poll_parses_typed_form() {
        let node = ActionNode::parse(&json!({
            "type": "poll", "to": "1",
            "poll": {"name": "Lunch?", "options": ["yes", "no"], "selectableCount": 1}
        }));
        match node {
            ActionNode::Poll { message, .. } => {
                assert_eq!(message.name, "Lunch?");
                assert_eq!(message.options, vec!["yes", "no"]);
                assert_eq!(message.selectable_count, 1);
            },
            other => panic!("expected poll node, got {other:?}"),
        }
    }

    #[test]
    fn read_accepts_single_key_or_array() {
        let single = ActionNode::parse(&json!({"type": "read", "key": {"id": "m1"}}));
        assert!(matches!(single, ActionNode::Read { ref keys } if keys.len() == 1));

        let many = ActionNode::parse(&json!({
            "type": "read", "keys": [{"id": "m1"}, {"id": "m2"}, {"bad": true}]
        }));
        assert!(matches!(many, ActionNode::Read { ref keys } if keys.len() == 2));

        assert_eq!(ActionNode::parse(&json!({"type": "read"})), ActionNode::Noop);
    }

    #[test]
    fn truthiness_table() {
        for falsy in [
            json!(""),
            json!("0"),
            json!("false"),
            json!("null"),
            json!("undefined"),
            json!("no"),
            json!(" NO "),
            json!(0),
            json!(0.0),
            json!(false),
            json!(null),
        ] {
            assert!(!truthy(&falsy), "expected falsy: {falsy}");
        }
        for t in [json!("yes"), json!("1"), json!(1), json!(true), json!([]), json!({})] {
            assert!(truthy(&t), "expected truthy: {t}");
        }
    }

    #[test]
    fn vcard_renders_waid_line() {
        let card = ContactCard {
            full_name: Some("Ada Lovelace".to_string()),
            org: Some("Analytical Engines".to_string()),
            phone: Some("+62 812-3456".to_string()),
            email: Some("ada@example.com".to_string()),
        };
        let vcard = card.to_vcard();
        assert!(vcard.starts_with("BEGIN:VCARD\nVERSION:3.0\nFN:Ada Lovelace"));
        assert!(vcard.contains("TEL;type=CELL;type=VOICE;waid=628123456:628123456"));
        assert!(vcard.contains("ORG:Analytical Engines"));
        assert!(vcard.ends_with("END:VCARD"));

        let empty = ContactCard::default().to_vcard();
        assert!(!empty.contains("TEL;"));
        assert!(!empty.contains("ORG:"));
    }

    #[test]
    fn control_classification() {
        assert!(ActionNode::parse(&json!({"type": "delay"})).is_control());
        assert!(ActionNode::Noop.is_control());
        assert!(!ActionNode::parse(&json!({"type": "text", "to": "1", "text": "x"})).is_control());
    }
}
