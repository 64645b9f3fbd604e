//! Envelope signing with selectable digest strength.
//!
//! Produces a keyed MAC over the serialized envelope. The signing key is the
//! concatenation of the primary endpoint secret and the resolved subscriber
//! name (empty when unknown), which binds each signature to both the shared
//! secret and the logical subscriber — a leaked secret alone is not enough
//! to forge envelopes for a different subscriber.

use hmac::{Hmac, Mac};
use sha2::{Sha224, Sha256, Sha384, Sha512};

use crate::error::{DeliveryError, Result};

/// HMAC digest strength, selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    /// HMAC-SHA224.
    Sha224,
    /// HMAC-SHA256 (default).
    #[default]
    Sha256,
    /// HMAC-SHA384.
    Sha384,
    /// HMAC-SHA512.
    Sha512,
}

impl DigestAlgorithm {
    /// Parses a configured algorithm from a numeric bit width or a name.
    ///
    /// Accepts `"256"`, `"sha256"`, `"SHA-256"` and the equivalents for the
    /// other widths. Returns `None` for anything else.
    pub fn parse(input: &str) -> Option<Self> {
        let raw = input.trim().to_ascii_lowercase();
        let bits = raw.strip_prefix("sha").map(|rest| rest.trim_start_matches('-')).unwrap_or(&raw);
        match bits {
            "224" => Some(Self::Sha224),
            "256" => Some(Self::Sha256),
            "384" => Some(Self::Sha384),
            "512" => Some(Self::Sha512),
            _ => None,
        }
    }

    /// Parses a configured algorithm, falling back to SHA-256.
    pub fn parse_or_default(input: &str) -> Self {
        Self::parse(input).unwrap_or_default()
    }

    /// Digest width in bits.
    pub fn bits(self) -> u32 {
        match self {
            Self::Sha224 => 224,
            Self::Sha256 => 256,
            Self::Sha384 => 384,
            Self::Sha512 => 512,
        }
    }

    /// Length of the hex digest this algorithm produces.
    pub fn hex_len(self) -> usize {
        self.bits() as usize / 4
    }

    /// Signature header token, e.g. `HMAC-SHA256`.
    pub fn header_token(self) -> &'static str {
        match self {
            Self::Sha224 => "HMAC-SHA224",
            Self::Sha256 => "HMAC-SHA256",
            Self::Sha384 => "HMAC-SHA384",
            Self::Sha512 => "HMAC-SHA512",
        }
    }
}

/// Builds the composite signing key from secret and subscriber name.
pub fn composite_key(secret: &str, subscriber_name: &str) -> String {
    format!("{secret}{subscriber_name}")
}

/// Signs a serialized envelope, returning the lowercase hex digest.
///
/// Pure function: identical payload, key, and algorithm always yield the
/// identical digest.
///
/// # Errors
///
/// Returns `DeliveryError::Configuration` if the MAC cannot be keyed, which
/// does not happen for HMAC with any key length.
pub fn sign(payload: &[u8], key: &str, algorithm: DigestAlgorithm) -> Result<String> {
    fn mac_hex<D>(payload: &[u8], key: &[u8]) -> Result<String>
    where
        D: Mac + hmac::digest::KeyInit,
    {
        let mut mac = <D as hmac::digest::KeyInit>::new_from_slice(key)
            .map_err(|_| DeliveryError::configuration("invalid signing key"))?;
        mac.update(payload);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    let key = key.as_bytes();
    match algorithm {
        DigestAlgorithm::Sha224 => mac_hex::<Hmac<Sha224>>(payload, key),
        DigestAlgorithm::Sha256 => mac_hex::<Hmac<Sha256>>(payload, key),
        DigestAlgorithm::Sha384 => mac_hex::<Hmac<Sha384>>(payload, key),
        DigestAlgorithm::Sha512 => mac_hex::<Hmac<Sha512>>(payload, key),
    }
}

/// Formats the signature header value, `<TOKEN>=<hex>`.
pub fn signature_header(algorithm: DigestAlgorithm, digest_hex: &str) -> String {
    format!("{}={digest_hex}", algorithm.header_token())
}
