//! Core domain models for the Hermod notification engine.
//!
//! Provides the event envelope and session types shared by the delivery
//! dispatcher and the action interpreter, the deep template renderer used to
//! substitute event data into subscriber-supplied actions, and the clock
//! abstraction that keeps circuit windows and backoff timing testable.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod models;
pub mod sink;
pub mod template;
pub mod time;

pub use models::{
    DeliveryOutcome, EndpointConfig, EventEnvelope, PreflightOutcome, SessionId, SessionInfo,
};
pub use sink::{ActionSink, NoOpActionSink};
pub use time::{Clock, RealClock, TestClock};

/// Wire schema version carried in every envelope delivery header.
pub const SCHEMA_VERSION: &str = "1";
