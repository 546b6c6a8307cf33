//! LV (length-value) codec
//!
//! Format:
//!   length[4, u32 big-endian] || value[length]
//!
//! A "combined" LV is an LV whose value is the concatenation of other
//! marshaled LVs. Nothing on the wire says whether an LV is flat or
//! combined; the reader decides by how it calls `expand`.
//!
//! Scalars stored *inside* a value (`from_u32_le`, `from_u64_le`) are
//! little-endian. Only the length prefix is big-endian.

use serde::Serialize;

use crate::error::EnvelopeError;

/// Size of the length prefix.
pub const LENGTH_PREFIX_BYTES: usize = 4;

/// Length ceiling. Prefixes at or above this are rejected on decode and
/// values this large are refused on encode.
pub const MAX_VALUE_BYTES: usize = 2_147_483_647;

/// A length-prefixed byte chunk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Lv {
    value: Vec<u8>,
}

impl Lv {
    // -----------------------------------------------------------------------
    // Constructors
    // -----------------------------------------------------------------------

    pub fn from_raw_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            value: bytes.into(),
        }
    }

    pub fn from_utf8(text: &str) -> Self {
        Self::from_raw_bytes(text.as_bytes())
    }

    pub fn from_u32_le(v: u32) -> Self {
        Self::from_raw_bytes(v.to_le_bytes())
    }

    pub fn from_u64_le(v: u64) -> Self {
        Self::from_raw_bytes(v.to_le_bytes())
    }

    /// Serialize `value` to compact JSON text and wrap the UTF-8 bytes.
    pub fn from_json_value<T: Serialize + ?Sized>(value: &T) -> Result<Self, EnvelopeError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| EnvelopeError::UnsupportedType(e.to_string()))?;
        Ok(Self::from_raw_bytes(bytes))
    }

    /// Concatenate the marshaled form of every element into one new LV.
    pub fn combine(lvs: &[Lv]) -> Result<Self, EnvelopeError> {
        let total: usize = lvs.iter().map(|lv| LENGTH_PREFIX_BYTES + lv.len()).sum();
        let mut out = Vec::with_capacity(total);
        for lv in lvs {
            lv.marshal_into(&mut out)?;
        }
        Ok(Self { value: out })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn into_value(self) -> Vec<u8> {
        self.value
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// The value as it would appear in the length prefix.
    pub fn length(&self) -> Result<u32, EnvelopeError> {
        if self.value.len() >= MAX_VALUE_BYTES {
            return Err(EnvelopeError::TooLarge(self.value.len()));
        }
        Ok(self.value.len() as u32)
    }

    /// Lossy UTF-8 view of the value.
    pub fn value_as_string(&self) -> String {
        String::from_utf8_lossy(&self.value).into_owned()
    }

    pub fn as_u32_le(&self) -> Option<u32> {
        let bytes: [u8; 4] = self.value.as_slice().try_into().ok()?;
        Some(u32::from_le_bytes(bytes))
    }

    pub fn as_u64_le(&self) -> Option<u64> {
        let bytes: [u8; 8] = self.value.as_slice().try_into().ok()?;
        Some(u64::from_le_bytes(bytes))
    }

    // -----------------------------------------------------------------------
    // Wire form
    // -----------------------------------------------------------------------

    /// `length[4 BE] || value`
    pub fn marshal(&self) -> Result<Vec<u8>, EnvelopeError> {
        let mut out = Vec::with_capacity(LENGTH_PREFIX_BYTES + self.value.len());
        self.marshal_into(&mut out)?;
        Ok(out)
    }

    fn marshal_into(&self, out: &mut Vec<u8>) -> Result<(), EnvelopeError> {
        let length = self.length()?;
        out.extend_from_slice(&length.to_be_bytes());
        out.extend_from_slice(&self.value);
        Ok(())
    }

    /// Read one LV from the front of `data`, returning it and the rest.
    pub fn read_from(data: &[u8]) -> Result<(Lv, &[u8]), EnvelopeError> {
        if data.len() < LENGTH_PREFIX_BYTES {
            return Err(EnvelopeError::Truncated {
                needed: LENGTH_PREFIX_BYTES,
                available: data.len(),
            });
        }
        let (prefix, rest) = data.split_at(LENGTH_PREFIX_BYTES);
        let length = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        if length >= MAX_VALUE_BYTES {
            return Err(EnvelopeError::TooLarge(length));
        }
        if length > rest.len() {
            return Err(EnvelopeError::Truncated {
                needed: length,
                available: rest.len(),
            });
        }
        let (value, rest) = rest.split_at(length);
        Ok((Lv::from_raw_bytes(value), rest))
    }

    /// Read a single LV. Bytes after it are ignored.
    pub fn unmarshal(data: &[u8]) -> Result<Lv, EnvelopeError> {
        Self::read_from(data).map(|(lv, _)| lv)
    }

    /// Split this LV's value into the LVs it was combined from.
    pub fn expand(&self) -> Result<Vec<Lv>, EnvelopeError> {
        let mut out = Vec::new();
        let mut rest = self.value.as_slice();
        while !rest.is_empty() {
            let (lv, tail) = Self::read_from(rest)?;
            out.push(lv);
            rest = tail;
        }
        Ok(out)
    }

    /// `hex(marshal())`
    pub fn to_hex(&self) -> Result<String, EnvelopeError> {
        Ok(hex::encode(self.marshal()?))
    }

    pub fn from_hex(text: &str) -> Result<Lv, EnvelopeError> {
        let bytes = hex::decode(text.trim())?;
        Self::unmarshal(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn marshal_hello() {
        let lv = Lv::from_utf8("hello");
        assert_eq!(lv.marshal().unwrap(), b"\x00\x00\x00\x05hello".to_vec());
    }

    #[test]
    fn empty_value_is_legal() {
        let lv = Lv::from_raw_bytes(Vec::new());
        assert_eq!(lv.marshal().unwrap(), vec![0, 0, 0, 0]);
        assert_eq!(Lv::unmarshal(&[0, 0, 0, 0]).unwrap(), lv);

        let combined = Lv::combine(&[lv.clone(), Lv::from_utf8("x"), lv.clone()]).unwrap();
        let parts = combined.expand().unwrap();
        assert_eq!(parts, vec![lv.clone(), Lv::from_utf8("x"), lv]);
    }

    #[test]
    fn scalars_are_little_endian() {
        assert_eq!(Lv::from_u32_le(1).value(), &[1, 0, 0, 0]);
        assert_eq!(Lv::from_u64_le(0x0102).value(), &[2, 1, 0, 0, 0, 0, 0, 0]);
        assert_eq!(Lv::from_u32_le(0xDEADBEEF).as_u32_le(), Some(0xDEADBEEF));
        assert_eq!(Lv::from_u64_le(u64::MAX - 7).as_u64_le(), Some(u64::MAX - 7));
        assert_eq!(Lv::from_utf8("abc").as_u32_le(), None);

        // Prefix stays big-endian regardless.
        assert_eq!(&Lv::from_u32_le(7).marshal().unwrap()[..4], &[0, 0, 0, 4]);
    }

    #[test]
    fn json_values_are_compact_text() {
        let lv = Lv::from_json_value(&serde_json::json!({"a": 1})).unwrap();
        assert_eq!(lv.value_as_string(), r#"{"a":1}"#);
    }

    #[test]
    fn combine_is_lv_of_lvs() {
        let combined = Lv::combine(&[Lv::from_utf8("ab"), Lv::from_utf8("c")]).unwrap();
        assert_eq!(
            combined.value(),
            &[0, 0, 0, 2, b'a', b'b', 0, 0, 0, 1, b'c']
        );
        assert_eq!(combined.length().unwrap(), 11);
    }

    #[test]
    fn expand_rejects_overlong_prefix() {
        let lv = Lv::from_raw_bytes(vec![0, 0, 0, 9, 1, 2, 3]);
        assert_eq!(
            lv.expand(),
            Err(EnvelopeError::Truncated { needed: 9, available: 3 })
        );
    }

    #[test]
    fn expand_rejects_partial_prefix() {
        let lv = Lv::from_raw_bytes(vec![0, 0, 0, 1, 7, 0, 0]);
        assert_eq!(
            lv.expand(),
            Err(EnvelopeError::Truncated { needed: 4, available: 2 })
        );
    }

    #[test]
    fn unmarshal_rejects_size_ceiling() {
        let data = [0x7F, 0xFF, 0xFF, 0xFF];
        assert!(matches!(Lv::unmarshal(&data), Err(EnvelopeError::TooLarge(_))));
    }

    #[test]
    fn unmarshal_ignores_trailing_bytes() {
        let lv = Lv::unmarshal(&[0, 0, 0, 1, 9, 0xAA, 0xBB]).unwrap();
        assert_eq!(lv.value(), &[9]);
    }

    #[test]
    fn hex_form() {
        let lv = Lv::from_utf8("hi");
        assert_eq!(lv.to_hex().unwrap(), "000000026869");
        assert_eq!(Lv::from_hex("000000026869").unwrap(), lv);
        assert_eq!(Lv::from_hex("zz"), Err(EnvelopeError::InvalidHex));
    }

    proptest! {
        #[test]
        fn combine_then_expand_recovers_value(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let combined = Lv::combine(&[Lv::from_raw_bytes(bytes.clone())]).unwrap();
            let parts = combined.expand().unwrap();
            prop_assert_eq!(parts.len(), 1);
            prop_assert_eq!(parts[0].value(), bytes.as_slice());
        }
    }
}
