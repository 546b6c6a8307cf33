//! DataBlock: the five-field record that gets encrypted and signed.
//!
//! Layout (combined LV):
//!   LV(time) || LV(nonce[32]) || LV(prekey) || LV(data) || LV(sha512(data)[64])
//!
//! `time` is RFC 3339 UTC text with millisecond precision, e.g.
//! `2024-05-01T12:00:00.000Z`.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use getrandom::getrandom;
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;

use crate::error::EnvelopeError;
use crate::lv::Lv;

pub const NONCE_BYTES: usize = 32;
pub const DATA_HASH_BYTES: usize = 64;
pub const FIELD_COUNT: usize = 5;

/// Authenticated envelope record. Built fresh per message, never reused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataBlock {
    pub time: Lv,
    pub nonce: Lv,
    pub prekey: Lv,
    pub data: Lv,
    pub data_hash: Lv,
}

/// SHA-512 of `data`.
pub fn hash(data: &[u8]) -> [u8; DATA_HASH_BYTES] {
    let digest = Sha512::digest(data);
    let mut out = [0u8; DATA_HASH_BYTES];
    out.copy_from_slice(&digest);
    out
}

impl DataBlock {
    /// Stamp the current time, draw a fresh nonce and hash `payload`.
    /// `prekey` stays empty until the caller sets it.
    pub fn new(payload: impl Into<Vec<u8>>) -> Result<Self, EnvelopeError> {
        let mut block = Self {
            time: Lv::default(),
            nonce: Lv::default(),
            prekey: Lv::default(),
            data: Lv::default(),
            data_hash: Lv::default(),
        };
        block.set_time_now();
        block.generate_nonce()?;
        block.set_data(payload);
        Ok(block)
    }

    pub fn set_time_now(&mut self) {
        self.set_time(Utc::now());
    }

    pub fn set_time(&mut self, at: DateTime<Utc>) {
        self.time = Lv::from_utf8(&at.to_rfc3339_opts(SecondsFormat::Millis, true));
    }

    pub fn generate_nonce(&mut self) -> Result<(), EnvelopeError> {
        let mut nonce = [0u8; NONCE_BYTES];
        getrandom(&mut nonce).map_err(|_| EnvelopeError::Random)?;
        self.nonce = Lv::from_raw_bytes(nonce);
        Ok(())
    }

    pub fn set_prekey(&mut self, prekey_id: &str) {
        self.prekey = Lv::from_utf8(prekey_id);
    }

    pub fn prekey_as_string(&self) -> String {
        self.prekey.value_as_string()
    }

    /// Replace `data` and recompute `data_hash`.
    pub fn set_data(&mut self, payload: impl Into<Vec<u8>>) {
        self.data = Lv::from_raw_bytes(payload);
        self.data_hash = Lv::from_raw_bytes(hash(self.data.value()));
    }

    pub fn verify_hash(&self) -> bool {
        let expected = hash(self.data.value());
        expected.as_slice().ct_eq(self.data_hash.value()).into()
    }

    /// Parse `time`.
    ///
    /// Accepts RFC 3339 text. Peers built on the server library stamp an
    /// 8-byte big-endian i64 of Unix nanoseconds instead; that form is
    /// accepted when the field is not valid RFC 3339.
    pub fn timestamp(&self) -> Result<DateTime<Utc>, EnvelopeError> {
        if let Ok(text) = core::str::from_utf8(self.time.value()) {
            if let Ok(at) = DateTime::parse_from_rfc3339(text.trim()) {
                return Ok(at.with_timezone(&Utc));
            }
        }
        if let Ok(raw) = <[u8; 8]>::try_from(self.time.value()) {
            return Ok(Utc.timestamp_nanos(i64::from_be_bytes(raw)));
        }
        Err(EnvelopeError::InvalidTimestamp)
    }

    /// The block as one combined LV.
    pub fn as_lv(&self) -> Result<Lv, EnvelopeError> {
        Lv::combine(&[
            self.time.clone(),
            self.nonce.clone(),
            self.prekey.clone(),
            self.data.clone(),
            self.data_hash.clone(),
        ])
    }

    /// `marshal(combine([time, nonce, prekey, data, data_hash]))`
    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        self.as_lv()?.marshal()
    }

    /// Inverse of `to_bytes`. Fields are assigned by position; anything
    /// after the fifth is ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let fields = Lv::unmarshal(bytes)?.expand()?;
        if fields.len() < FIELD_COUNT {
            return Err(EnvelopeError::MalformedDataBlock {
                fields: fields.len(),
            });
        }
        let mut fields = fields.into_iter();
        let mut next = || fields.next().unwrap_or_default();
        Ok(Self {
            time: next(),
            nonce: next(),
            prekey: next(),
            data: next(),
            data_hash: next(),
        })
    }
}
