//! Per-handshake session state.
//!
//! A `Session` owns the key material produced by one prekey handshake and
//! picks the right key for each direction:
//!
//!   Initiator: encrypt with shared_secret_1, decrypt with shared_secret_2
//!   Responder: encrypt with shared_secret_2, decrypt with shared_secret_1
//!
//! Sessions are plain owned values. Concurrent exchanges each hold their
//! own; nothing is shared.

use ed25519_dalek::VerifyingKey;

use crate::envelope::{self, UnpackOptions};
use crate::error::EnvelopeError;
use crate::keys::{SharedSecret, SigningKeyPair};
use crate::lv::Lv;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Started the handshake (sent `a0/a1/a2`).
    Initiator,
    /// Answered it (sent `i/b0/b1/b2`).
    Responder,
}

pub struct Session {
    role: Role,
    prekey_index: String,
    signing: SigningKeyPair,
    peer_signing: VerifyingKey,
    shared_1: SharedSecret,
    shared_2: SharedSecret,
}

impl Session {
    pub fn initiator(
        prekey_index: String,
        signing: SigningKeyPair,
        peer_signing: VerifyingKey,
        shared_1: SharedSecret,
        shared_2: SharedSecret,
    ) -> Self {
        Self {
            role: Role::Initiator,
            prekey_index,
            signing,
            peer_signing,
            shared_1,
            shared_2,
        }
    }

    pub fn responder(
        prekey_index: String,
        signing: SigningKeyPair,
        peer_signing: VerifyingKey,
        shared_1: SharedSecret,
        shared_2: SharedSecret,
    ) -> Self {
        Self {
            role: Role::Responder,
            prekey_index,
            signing,
            peer_signing,
            shared_1,
            shared_2,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn prekey_index(&self) -> &str {
        &self.prekey_index
    }

    pub fn signing_key(&self) -> &SigningKeyPair {
        &self.signing
    }

    pub fn peer_signing_key(&self) -> &VerifyingKey {
        &self.peer_signing
    }

    pub fn shared_secret_1(&self) -> &SharedSecret {
        &self.shared_1
    }

    pub fn shared_secret_2(&self) -> &SharedSecret {
        &self.shared_2
    }

    fn encrypt_key(&self) -> &[u8] {
        match self.role {
            Role::Initiator => self.shared_1.as_bytes(),
            Role::Responder => self.shared_2.as_bytes(),
        }
    }

    fn decrypt_key(&self) -> &[u8] {
        match self.role {
            Role::Initiator => self.shared_2.as_bytes(),
            Role::Responder => self.shared_1.as_bytes(),
        }
    }

    /// Seal `payload` for the other side.
    pub fn pack(&self, payload: &[Lv]) -> Result<String, EnvelopeError> {
        envelope::pack(&self.prekey_index, &self.signing, self.encrypt_key(), payload)
    }

    /// Open an envelope sealed by the other side.
    pub fn unpack(&self, envelope_hex: &str) -> Result<Vec<Lv>, EnvelopeError> {
        self.unpack_with(envelope_hex, UnpackOptions::default())
    }

    pub fn unpack_with(
        &self,
        envelope_hex: &str,
        opts: UnpackOptions,
    ) -> Result<Vec<Lv>, EnvelopeError> {
        envelope::unpack_with(
            &self.prekey_index,
            &self.peer_signing,
            self.decrypt_key(),
            envelope_hex,
            opts,
        )
    }
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.role)
            .field("prekey_index", &self.prekey_index)
            .finish_non_exhaustive()
    }
}
