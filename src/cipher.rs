//! Symmetric cipher: AES-CBC with PKCS#7 padding
//!
//! Output layout:
//!   iv[16] || ciphertext[16n]
//!
//! Key size picks the AES variant (16, 24 or 32 bytes). Shared secrets from
//! the handshake are 32 bytes, so envelopes use AES-256.

use aes::{Aes128, Aes192, Aes256};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use getrandom::getrandom;

use crate::error::EnvelopeError;

pub const IV_BYTES: usize = 16;
pub const BLOCK_BYTES: usize = 16;

/// Generate a fresh random IV. Called once per `encrypt`.
pub fn iv() -> Result<[u8; IV_BYTES], EnvelopeError> {
    let mut iv = [0u8; IV_BYTES];
    getrandom(&mut iv).map_err(|_| EnvelopeError::Random)?;
    Ok(iv)
}

/// Encrypt under a new random IV and return `iv || ciphertext`.
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    let iv = iv()?;
    let ciphertext = match key.len() {
        16 => seal::<cbc::Encryptor<Aes128>>(key, &iv, plaintext)?,
        24 => seal::<cbc::Encryptor<Aes192>>(key, &iv, plaintext)?,
        32 => seal::<cbc::Encryptor<Aes256>>(key, &iv, plaintext)?,
        n => return Err(bad_key_length(n)),
    };

    let mut out = Vec::with_capacity(IV_BYTES + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Split off the leading IV and decrypt the rest.
pub fn decrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    if data.len() < IV_BYTES + BLOCK_BYTES {
        return Err(EnvelopeError::Decryption("ciphertext too short".into()));
    }
    let (iv, ciphertext) = data.split_at(IV_BYTES);
    if ciphertext.len() % BLOCK_BYTES != 0 {
        return Err(EnvelopeError::Decryption(
            "ciphertext is not a whole number of blocks".into(),
        ));
    }

    match key.len() {
        16 => open::<cbc::Decryptor<Aes128>>(key, iv, ciphertext),
        24 => open::<cbc::Decryptor<Aes192>>(key, iv, ciphertext),
        32 => open::<cbc::Decryptor<Aes256>>(key, iv, ciphertext),
        n => Err(bad_key_length(n)),
    }
}

fn seal<C>(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, EnvelopeError>
where
    C: KeyIvInit + BlockEncryptMut,
{
    let cipher = C::new_from_slices(key, iv).map_err(|e| EnvelopeError::Encryption(e.to_string()))?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

fn open<C>(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, EnvelopeError>
where
    C: KeyIvInit + BlockDecryptMut,
{
    let cipher = C::new_from_slices(key, iv).map_err(|e| EnvelopeError::Decryption(e.to_string()))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| EnvelopeError::Decryption("invalid padding".into()))
}

fn bad_key_length(n: usize) -> EnvelopeError {
    EnvelopeError::InvalidKey(format!("AES key must be 16, 24 or 32 bytes, got {}", n))
}
