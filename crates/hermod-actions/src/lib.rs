//! Subscriber action execution for the Hermod notification engine.
//!
//! A subscriber's response to a delivered envelope may carry a declarative
//! action program: a tree of control nodes (sequencing, parallelism,
//! conditionals, bounded retries, delays, presence simulation) over leaf
//! sends (text, media, interactive messages, ...). This crate parses that
//! tree defensively, renders `{{dotted.path}}` templates against the event,
//! and executes it against the messaging backend — routing every backend
//! call through a per-session serialized send queue so concurrent branches
//! can never race at the protocol layer.

pub mod action;
pub mod backend;
pub mod error;
pub mod interpreter;
pub mod queue;

pub use action::{ActionNode, MessageKey, PresenceState};
pub use backend::{BackendError, MessagingBackend};
pub use error::{ActionError, Result};
pub use interpreter::{Interpreter, InterpreterOptions};
pub use queue::{SessionQueue, SessionQueues};
