//! # dx-envelope
//!
//! Signed, encrypted request/response envelopes bootstrapped by a prekey
//! handshake.
//!
//! ## Quick Start
//!
//! ```rust
//! use dx_envelope::{Lv, PrekeyBundle};
//!
//! // Client generates fresh keys and sends `request()` to the peer.
//! let client = PrekeyBundle::generate();
//! let request = client.request();
//!
//! // Peer answers with its own fresh keys under a prekey index.
//! let (response, peer) = PrekeyBundle::generate().respond("idx-42", &request).unwrap();
//! let session = client.complete(&response).unwrap();
//!
//! let envelope = session.pack(&[Lv::from_utf8("header"), Lv::from_utf8("body")]).unwrap();
//! let payload = peer.unpack(&envelope).unwrap();
//!
//! assert_eq!(payload[1].value_as_string(), "body");
//! ```
//!
//! ## Layers
//!
//! - **LV**: `u32` big-endian length prefix + value, nestable via `combine`
//! - **DataBlock**: time, nonce, prekey, data, SHA-512(data)
//! - **Envelope**: AES-CBC(DataBlock) signed with Ed25519, hex on the wire
//! - **Handshake**: Ed25519 + 2x X25519 per side, one secret per direction
//!
//! ## What's NOT Provided
//!
//! - HTTP transport (see `dx-session`)
//! - Replay protection beyond the 5-minute freshness window
//! - Long-term key storage

#![deny(unsafe_code)]

pub mod cipher;
pub mod datablock;
pub mod envelope;
mod error;
pub mod keys;
mod lv;
pub mod prekey;
pub mod session;

pub use datablock::DataBlock;
pub use envelope::{pack, unpack, unpack_with, UnpackOptions, UNPACK_TTL_SECS};
pub use error::EnvelopeError;
pub use keys::{EcdhKeyPair, SharedSecret, SigningKeyPair};
pub use lv::{Lv, LENGTH_PREFIX_BYTES, MAX_VALUE_BYTES};
pub use prekey::{PrekeyBundle, PrekeyRequest, PrekeyResponse};
pub use session::{Role, Session};

/// Re-exported so callers can hold peer keys without a direct dependency.
pub use ed25519_dalek::VerifyingKey;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
