//! Envelope pack / unpack.
//!
//! Transport form:
//!   hex( LV( LV(ciphertext) || LV(signature) ) )
//!
//! where `ciphertext = aes_cbc(key, DataBlock::to_bytes())` and `signature`
//! is Ed25519 over the ciphertext bytes. The signature is the only check
//! made before decryption. After decryption the block is checked in this
//! order: timestamp parse, freshness, prekey binding, data hash.

use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::VerifyingKey;
use tracing::{debug, warn};

use crate::cipher;
use crate::datablock::DataBlock;
use crate::error::EnvelopeError;
use crate::keys::{self, SigningKeyPair};
use crate::lv::Lv;

/// Freshness window for an unpacked block.
pub const UNPACK_TTL_SECS: i64 = 300;

/// Knobs for `unpack_with`.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnpackOptions {
    /// Skip the Ed25519 check. Only for inspecting envelopes whose sender
    /// key is unknown; a skipped check authenticates nothing.
    pub skip_verify: bool,
    /// Clock used for the freshness check. `None` means `Utc::now()`.
    pub now: Option<DateTime<Utc>>,
}

/// Seal `payload` for the peer and return the hex transport string.
pub fn pack(
    prekey_id: &str,
    signing: &SigningKeyPair,
    encrypt_key: &[u8],
    payload: &[Lv],
) -> Result<String, EnvelopeError> {
    let combined = Lv::combine(payload)?.marshal()?;
    let mut block = DataBlock::new(combined)?;
    block.set_prekey(prekey_id);

    let envelope = seal_block(&block, signing, encrypt_key)?;
    debug!(
        prekey = prekey_id,
        payload_lvs = payload.len(),
        envelope_bytes = envelope.len(),
        "packed envelope"
    );
    Ok(hex::encode(envelope))
}

/// Encrypt and sign an already-built block. Returns the marshaled outer LV
/// (not yet hex encoded).
pub fn seal_block(
    block: &DataBlock,
    signing: &SigningKeyPair,
    encrypt_key: &[u8],
) -> Result<Vec<u8>, EnvelopeError> {
    let ciphertext = cipher::encrypt(encrypt_key, &block.to_bytes()?)?;
    let signature = signing.sign(&ciphertext);
    Lv::combine(&[Lv::from_raw_bytes(ciphertext), Lv::from_raw_bytes(signature)])?.marshal()
}

/// Open a hex envelope and return the payload LVs in their original order.
pub fn unpack(
    expected_prekey_id: &str,
    peer_signing_key: &VerifyingKey,
    decrypt_key: &[u8],
    envelope_hex: &str,
) -> Result<Vec<Lv>, EnvelopeError> {
    unpack_with(
        expected_prekey_id,
        peer_signing_key,
        decrypt_key,
        envelope_hex,
        UnpackOptions::default(),
    )
}

pub fn unpack_with(
    expected_prekey_id: &str,
    peer_signing_key: &VerifyingKey,
    decrypt_key: &[u8],
    envelope_hex: &str,
    opts: UnpackOptions,
) -> Result<Vec<Lv>, EnvelopeError> {
    let result = open(expected_prekey_id, peer_signing_key, decrypt_key, envelope_hex, opts);
    match &result {
        Ok(payload) => debug!(
            prekey = expected_prekey_id,
            payload_lvs = payload.len(),
            "unpacked envelope"
        ),
        Err(e) => warn!(prekey = expected_prekey_id, kind = e.kind(), "rejected envelope"),
    }
    result
}

fn open(
    expected_prekey_id: &str,
    peer_signing_key: &VerifyingKey,
    decrypt_key: &[u8],
    envelope_hex: &str,
    opts: UnpackOptions,
) -> Result<Vec<Lv>, EnvelopeError> {
    let bytes = hex::decode(envelope_hex.trim())?;
    let elements = Lv::unmarshal(&bytes)?.expand()?;
    if elements.len() < 2 {
        return Err(EnvelopeError::InvalidData);
    }
    let (ciphertext, signature) = (&elements[0], &elements[1]);

    if !opts.skip_verify && !keys::verify(ciphertext.value(), signature.value(), peer_signing_key) {
        return Err(EnvelopeError::InvalidSignature);
    }

    let block_bytes = cipher::decrypt(decrypt_key, ciphertext.value())?;
    let block = DataBlock::from_bytes(&block_bytes)?;

    let stamped = block.timestamp()?;
    let now = opts.now.unwrap_or_else(Utc::now);
    let age = now - stamped;
    // Future-dated blocks are not rejected; only staleness is bounded.
    if age > Duration::seconds(UNPACK_TTL_SECS) {
        return Err(EnvelopeError::TimeExpired {
            age_secs: age.num_seconds(),
        });
    }

    if block.prekey.value() != expected_prekey_id.as_bytes() {
        return Err(EnvelopeError::InvalidPrekey);
    }

    if !block.verify_hash() {
        return Err(EnvelopeError::InvalidDataHash);
    }

    Lv::unmarshal(block.data.value())?.expand()
}
