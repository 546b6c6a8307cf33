//! Error types for envelope encoding, sealing and opening.

use core::fmt;

/// Every failure the envelope layer can report.
///
/// Each variant is a distinct signal. Callers (and tests) match on the
/// variant to tell tampering, staleness and misuse apart, so two checks
/// never share a variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// A length prefix claims more bytes than the buffer holds.
    Truncated { needed: usize, available: usize },
    /// A length prefix (or a value being encoded) exceeds the LV ceiling.
    TooLarge(usize),
    /// Input could not be turned into LV bytes.
    UnsupportedType(String),
    /// Transport string is not valid hex.
    InvalidHex,
    /// Envelope does not contain the ciphertext and signature elements.
    InvalidData,
    /// Decrypted block does not hold all five fields.
    MalformedDataBlock { fields: usize },
    InvalidSignature,
    /// Symmetric decryption failed (bad padding, wrong key, short input).
    Decryption(String),
    InvalidDataHash,
    InvalidPrekey,
    InvalidTimestamp,
    /// Block is older than the freshness window.
    TimeExpired { age_secs: i64 },
    /// Key material has the wrong length or is not a valid point.
    InvalidKey(String),
    Encryption(String),
    /// The OS random source failed.
    Random,
}

impl EnvelopeError {
    /// Stable upper-snake code for logs and wire-level error replies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Truncated { .. } => "TRUNCATED_DATA",
            Self::TooLarge(_) => "ARRAY_SIZE_TOO_LARGE",
            Self::UnsupportedType(_) => "UNSUPPORTED_DATA_TYPE",
            Self::InvalidHex => "INVALID_HEX",
            Self::InvalidData => "INVALID_DATA",
            Self::MalformedDataBlock { .. } => "MALFORMED_DATA_BLOCK",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::Decryption(_) => "DECRYPTION_FAILED",
            Self::InvalidDataHash => "INVALID_DATA_HASH",
            Self::InvalidPrekey => "INVALID_PREKEY",
            Self::InvalidTimestamp => "INVALID_TIMESTAMP_DATA",
            Self::TimeExpired { .. } => "TIME_EXPIRED",
            Self::InvalidKey(_) => "INVALID_KEY",
            Self::Encryption(_) => "ENCRYPTION_FAILED",
            Self::Random => "RANDOM_SOURCE_FAILED",
        }
    }
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { needed, available } => {
                write!(f, "truncated data: need {} bytes, have {}", needed, available)
            }
            Self::TooLarge(len) => write!(f, "LV value too large: {} bytes", len),
            Self::UnsupportedType(msg) => write!(f, "unsupported data type: {}", msg),
            Self::InvalidHex => write!(f, "invalid hex string"),
            Self::InvalidData => write!(f, "invalid envelope data"),
            Self::MalformedDataBlock { fields } => {
                write!(f, "malformed data block: expected 5 fields, found {}", fields)
            }
            Self::InvalidSignature => write!(f, "invalid signature"),
            Self::Decryption(msg) => write!(f, "decryption failed: {}", msg),
            Self::InvalidDataHash => write!(f, "data hash mismatch"),
            Self::InvalidPrekey => write!(f, "prekey mismatch"),
            Self::InvalidTimestamp => write!(f, "invalid block timestamp"),
            Self::TimeExpired { age_secs } => write!(f, "block expired ({}s old)", age_secs),
            Self::InvalidKey(msg) => write!(f, "invalid key: {}", msg),
            Self::Encryption(msg) => write!(f, "encryption failed: {}", msg),
            Self::Random => write!(f, "random source unavailable"),
        }
    }
}

impl std::error::Error for EnvelopeError {}

impl From<hex::FromHexError> for EnvelopeError {
    fn from(_: hex::FromHexError) -> Self {
        EnvelopeError::InvalidHex
    }
}
