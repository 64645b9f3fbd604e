//! Error types for envelope delivery.
//!
//! Categorizes every way a delivery attempt can fail so the dispatcher can
//! decide between retrying, locking the endpoint out, or invalidating it.
//! The taxonomy distinguishes security rejections (signature refused) from
//! ordinary unavailability, and terminal endpoint failures (gone) from
//! transient ones.

use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Failure modes of a single delivery attempt.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Network-level connectivity failure.
    #[error("network connection failed: {message}")]
    Network {
        /// Description of the transport failure.
        message: String,
    },

    /// HTTP request timeout exceeded.
    #[error("request timeout after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout that elapsed.
        timeout_ms: u64,
    },

    /// Endpoint rejected the signature (401/403).
    #[error("endpoint rejected signature: HTTP {status}")]
    SecurityRejected {
        /// The rejecting status code.
        status: u16,
    },

    /// Endpoint no longer exists (404/410).
    #[error("endpoint gone: HTTP {status}")]
    EndpointGone {
        /// The terminal status code.
        status: u16,
    },

    /// Rate limit response (429).
    #[error("rate limited by endpoint")]
    RateLimited,

    /// Other client error (4xx), not retryable.
    #[error("client error: HTTP {status}")]
    ClientError {
        /// The 4xx status code.
        status: u16,
    },

    /// Server error (5xx), retryable.
    #[error("server error: HTTP {status}")]
    ServerError {
        /// The 5xx status code.
        status: u16,
    },

    /// Circuit breaker is open, delivery skipped.
    #[error("circuit open for endpoint {target}")]
    CircuitOpen {
        /// URL of the endpoint with an open circuit.
        target: String,
    },

    /// All attempts for this delivery round exhausted.
    #[error("delivery failed after {attempts} attempts")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
    },

    /// Invalid dispatcher or client configuration.
    #[error("invalid delivery configuration: {message}")]
    Configuration {
        /// Configuration error description.
        message: String,
    },
}

impl DeliveryError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout { timeout_ms }
    }

    /// Creates a circuit open error.
    pub fn circuit_open(target: impl Into<String>) -> Self {
        Self::CircuitOpen { target: target.into() }
    }

    /// Creates a retries exhausted error.
    pub fn retries_exhausted(attempts: u32) -> Self {
        Self::RetriesExhausted { attempts }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Classifies a non-2xx response status.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::SecurityRejected { status },
            404 | 410 => Self::EndpointGone { status },
            429 => Self::RateLimited,
            500.. => Self::ServerError { status },
            _ => Self::ClientError { status },
        }
    }

    /// Whether another attempt this round could succeed.
    ///
    /// True for transport failures, 5xx, and rate limits. Security
    /// rejections and terminal endpoint responses are never retried within
    /// one delivery round.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Timeout { .. } | Self::ServerError { .. } | Self::RateLimited
        )
    }

    /// Whether this failure means the signature was actively rejected.
    pub fn is_security(&self) -> bool {
        matches!(self, Self::SecurityRejected { .. })
    }

    /// Whether this failure marks the endpoint as permanently gone.
    pub fn is_endpoint_gone(&self) -> bool {
        matches!(self, Self::EndpointGone { .. })
    }

    /// HTTP status carried by this error, when the endpoint responded.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::SecurityRejected { status }
            | Self::EndpointGone { status }
            | Self::ClientError { status }
            | Self::ServerError { status } => Some(*status),
            Self::RateLimited => Some(429),
            _ => None,
        }
    }
}
