//! Key types: Ed25519 signing pairs, X25519 ECDH pairs, shared secrets.
//!
//! Serialization (hex on the wire):
//!   signing public key  = ed25519_pk[32]
//!   signature           = ed25519_sig[64]
//!   ecdh public key     = x25519_pk[32]
//!   shared secret       = x25519_dh[32]

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::OsRng;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::EnvelopeError;

pub const SIGNING_SEED_BYTES: usize = 32;
/// NaCl-style secret key: seed[32] || public[32]
pub const SIGNING_KEYPAIR_BYTES: usize = 64;
pub const SIGNING_PUBLIC_KEY_BYTES: usize = 32;
pub const SIGNATURE_BYTES: usize = 64;
pub const X25519_KEY_BYTES: usize = 32;
pub const SHARED_SECRET_BYTES: usize = 32;

// ---------------------------------------------------------------------------
// Ed25519
// ---------------------------------------------------------------------------

/// Ed25519 signing key pair.
pub struct SigningKeyPair {
    inner: SigningKey,
}

impl SigningKeyPair {
    pub fn generate() -> Self {
        Self {
            inner: SigningKey::generate(&mut OsRng),
        }
    }

    /// Accepts either a 32-byte seed or a 64-byte `seed || public` key.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let inner = match bytes.len() {
            SIGNING_SEED_BYTES => {
                let mut seed = Zeroizing::new([0u8; SIGNING_SEED_BYTES]);
                seed.copy_from_slice(bytes);
                SigningKey::from_bytes(&seed)
            }
            SIGNING_KEYPAIR_BYTES => {
                let mut pair = Zeroizing::new([0u8; SIGNING_KEYPAIR_BYTES]);
                pair.copy_from_slice(bytes);
                SigningKey::from_keypair_bytes(&pair)
                    .map_err(|_| EnvelopeError::InvalidKey("ed25519 public half does not match seed".into()))?
            }
            n => {
                return Err(EnvelopeError::InvalidKey(format!(
                    "ed25519 secret key must be 32 or 64 bytes, got {}",
                    n
                )))
            }
        };
        Ok(Self { inner })
    }

    /// The 32-byte seed.
    pub fn to_bytes(&self) -> Zeroizing<[u8; SIGNING_SEED_BYTES]> {
        Zeroizing::new(self.inner.to_bytes())
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.inner.verifying_key()
    }

    pub fn public_bytes(&self) -> [u8; SIGNING_PUBLIC_KEY_BYTES] {
        self.inner.verifying_key().to_bytes()
    }

    pub fn public_hex(&self) -> String {
        hex::encode(self.public_bytes())
    }

    pub fn sign(&self, msg: &[u8]) -> [u8; SIGNATURE_BYTES] {
        self.inner.sign(msg).to_bytes()
    }
}

pub fn verifying_key_from_bytes(bytes: &[u8]) -> Result<VerifyingKey, EnvelopeError> {
    let bytes: [u8; SIGNING_PUBLIC_KEY_BYTES] = bytes.try_into().map_err(|_| {
        EnvelopeError::InvalidKey(format!(
            "ed25519 public key must be 32 bytes, got {}",
            bytes.len()
        ))
    })?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|_| EnvelopeError::InvalidKey("ed25519 public key is not a valid point".into()))
}

pub fn verifying_key_from_hex(text: &str) -> Result<VerifyingKey, EnvelopeError> {
    verifying_key_from_bytes(&hex::decode(text.trim())?)
}

/// Detached signature check. Malformed signatures simply fail.
pub fn verify(msg: &[u8], signature: &[u8], key: &VerifyingKey) -> bool {
    match Signature::from_slice(signature) {
        Ok(sig) => key.verify(msg, &sig).is_ok(),
        Err(_) => false,
    }
}

// ---------------------------------------------------------------------------
// X25519
// ---------------------------------------------------------------------------

/// X25519 key pair used for one direction of the handshake.
pub struct EcdhKeyPair {
    secret: StaticSecret,
    public: X25519PublicKey,
}

impl EcdhKeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn from_secret_bytes(bytes: [u8; X25519_KEY_BYTES]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Raw secret scalar, for handing keys to another process.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; X25519_KEY_BYTES]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    pub fn public_bytes(&self) -> [u8; X25519_KEY_BYTES] {
        self.public.to_bytes()
    }

    pub fn public_hex(&self) -> String {
        hex::encode(self.public_bytes())
    }

    /// `ECDH(self.secret, peer_public)`. Low-order peer points are refused.
    pub fn diffie_hellman(&self, peer_public: &[u8]) -> Result<SharedSecret, EnvelopeError> {
        let peer: [u8; X25519_KEY_BYTES] = peer_public.try_into().map_err(|_| {
            EnvelopeError::InvalidKey(format!(
                "x25519 public key must be 32 bytes, got {}",
                peer_public.len()
            ))
        })?;
        let shared = self.secret.diffie_hellman(&X25519PublicKey::from(peer));
        if !shared.was_contributory() {
            return Err(EnvelopeError::InvalidKey("x25519 public key has low order".into()));
        }
        Ok(SharedSecret(shared.to_bytes()))
    }
}

/// Raw ECDH output, used directly as an AES-256 key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; SHARED_SECRET_BYTES]);

impl SharedSecret {
    pub fn from_bytes(bytes: [u8; SHARED_SECRET_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_BYTES] {
        &self.0
    }
}

impl core::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}
