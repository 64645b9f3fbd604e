//! Signed envelope delivery with reliability guarantees.
//!
//! This crate delivers event envelopes to subscriber HTTP endpoints with
//! per-endpoint retry, exponential backoff, circuit breaking, and a distinct
//! security lockout for signature rejections. Terminal failures feed the
//! endpoint lifecycle manager, which clears dead registrations while
//! preserving their signing secrets.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────────┐   ┌────────────────┐
//! │ Dispatcher │──▶│ EndpointClient │──▶│  Subscribers   │
//! └────────────┘   └────────────────┘   └────────────────┘
//!       │                                       │
//!       ▼                                       ▼ 2xx reply
//! ┌────────────────┐  ┌───────────────┐  ┌────────────┐
//! │ HealthRegistry │  │ EndpointStore │  │ ActionSink │
//! │ (circuits)     │  │ (lifecycle)   │  │ (actions)  │
//! └────────────────┘  └───────────────┘  └────────────┘
//! ```
//!
//! Delivery is best-effort and at-least-once: outcomes are reported per
//! endpoint, and no failure propagates out of the dispatch call.

pub mod circuit;
pub mod client;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod retry;
pub mod signer;

pub use circuit::{CircuitConfig, EndpointHealth, HealthRegistry};
pub use client::{ClientConfig, EndpointClient, SubscriberReply};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use endpoint::{InMemoryEndpointStore, SessionEndpointStore};
pub use error::{DeliveryError, Result};
pub use retry::RetryPolicy;
pub use signer::DigestAlgorithm;
