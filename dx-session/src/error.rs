//! Error types for the session layer.

use std::fmt;

use dx_envelope::EnvelopeError;

#[derive(Debug)]
pub enum SessionError {
    /// Envelope sealing or opening failed.
    Envelope(EnvelopeError),
    /// The HTTP round trip itself failed (connect, timeout, body read).
    Transport(String),
    Json(String),
    Base64(String),
    /// A reply or request lacked a field the protocol requires.
    MissingField(&'static str),
    /// Peer-side: the prekey index is unknown, expired or already used.
    PrekeyNotFound,
    /// Login reply carried an empty session key.
    EmptySessionKey,
    /// The OS random source failed.
    Random,
}

impl SessionError {
    /// Stable upper-snake code, suitable for error replies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Envelope(e) => e.kind(),
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Json(_) => "INVALID_JSON",
            Self::Base64(_) => "DATA_CORRUPT",
            Self::MissingField(_) => "INVALID_REQUEST_FORMAT",
            Self::PrekeyNotFound => "REFRESH_PREKEY",
            Self::EmptySessionKey => "INVALID_SESSION_KEY",
            Self::Random => "RANDOM_SOURCE_FAILED",
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Envelope(e) => write!(f, "envelope error: {}", e),
            Self::Transport(msg) => write!(f, "transport error: {}", msg),
            Self::Json(msg) => write!(f, "json error: {}", msg),
            Self::Base64(msg) => write!(f, "base64 error: {}", msg),
            Self::MissingField(name) => write!(f, "missing field: {}", name),
            Self::PrekeyNotFound => write!(f, "prekey not found or already used"),
            Self::EmptySessionKey => write!(f, "login returned an empty session key"),
            Self::Random => write!(f, "random source unavailable"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Envelope(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EnvelopeError> for SessionError {
    fn from(e: EnvelopeError) -> Self {
        Self::Envelope(e)
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

impl From<base64::DecodeError> for SessionError {
    fn from(e: base64::DecodeError) -> Self {
        Self::Base64(e.to_string())
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
