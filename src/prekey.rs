//! Prekey handshake messages and key math.
//!
//! Client -> peer:  {"a0": ed25519_pk, "a1": x25519_pk, "a2": x25519_pk}
//! Peer -> client:  {"i": index, "b0": ed25519_pk, "b1": x25519_pk, "b2": x25519_pk}
//!
//!   shared_secret_1 = ECDH(a1, b1)   client -> peer traffic
//!   shared_secret_2 = ECDH(a2, b2)   peer -> client traffic
//!
//! All keys are hex on the wire. Every handshake generates fresh keys on
//! both sides; nothing here is meant to be reused across sessions.

use serde::{Deserialize, Serialize};

use crate::error::EnvelopeError;
use crate::keys::{self, EcdhKeyPair, SigningKeyPair, X25519_KEY_BYTES};
use crate::session::Session;

/// Body the client POSTs to the prekey endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrekeyRequest {
    pub a0: String,
    pub a1: String,
    pub a2: String,
}

/// Peer reply to a successful prekey request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrekeyResponse {
    pub i: String,
    pub b0: String,
    pub b1: String,
    pub b2: String,
}

/// One side's fresh key material for a single handshake: an Ed25519 pair
/// and two X25519 pairs.
pub struct PrekeyBundle {
    signing: SigningKeyPair,
    ecdh_1: EcdhKeyPair,
    ecdh_2: EcdhKeyPair,
}

impl PrekeyBundle {
    pub fn generate() -> Self {
        Self {
            signing: SigningKeyPair::generate(),
            ecdh_1: EcdhKeyPair::generate(),
            ecdh_2: EcdhKeyPair::generate(),
        }
    }

    /// Build a bundle from existing keys (fixtures and tests).
    pub fn from_parts(signing: SigningKeyPair, ecdh_1: EcdhKeyPair, ecdh_2: EcdhKeyPair) -> Self {
        Self {
            signing,
            ecdh_1,
            ecdh_2,
        }
    }

    pub fn signing(&self) -> &SigningKeyPair {
        &self.signing
    }

    /// The client's `{a0, a1, a2}` request body.
    pub fn request(&self) -> PrekeyRequest {
        PrekeyRequest {
            a0: self.signing.public_hex(),
            a1: self.ecdh_1.public_hex(),
            a2: self.ecdh_2.public_hex(),
        }
    }

    /// Client side: consume the bundle and derive the session from the
    /// peer's reply.
    pub fn complete(self, response: &PrekeyResponse) -> Result<Session, EnvelopeError> {
        let peer_signing = keys::verifying_key_from_hex(&response.b0)?;
        let shared_1 = self.ecdh_1.diffie_hellman(&decode_x25519(&response.b1)?)?;
        let shared_2 = self.ecdh_2.diffie_hellman(&decode_x25519(&response.b2)?)?;
        Ok(Session::initiator(
            response.i.clone(),
            self.signing,
            peer_signing,
            shared_1,
            shared_2,
        ))
    }

    /// Peer side: answer a client's request under `index`, returning the
    /// reply body and the mirrored session.
    pub fn respond(
        self,
        index: impl Into<String>,
        request: &PrekeyRequest,
    ) -> Result<(PrekeyResponse, Session), EnvelopeError> {
        let index = index.into();
        let peer_signing = keys::verifying_key_from_hex(&request.a0)?;
        let shared_1 = self.ecdh_1.diffie_hellman(&decode_x25519(&request.a1)?)?;
        let shared_2 = self.ecdh_2.diffie_hellman(&decode_x25519(&request.a2)?)?;

        let response = PrekeyResponse {
            i: index.clone(),
            b0: self.signing.public_hex(),
            b1: self.ecdh_1.public_hex(),
            b2: self.ecdh_2.public_hex(),
        };
        let session = Session::responder(index, self.signing, peer_signing, shared_1, shared_2);
        Ok((response, session))
    }
}

fn decode_x25519(text: &str) -> Result<[u8; X25519_KEY_BYTES], EnvelopeError> {
    let bytes = hex::decode(text.trim())?;
    bytes.as_slice().try_into().map_err(|_| {
        EnvelopeError::InvalidKey(format!(
            "x25519 public key must be 32 bytes, got {}",
            bytes.len()
        ))
    })
}
