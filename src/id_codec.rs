//! Default ID codec (C10 / §4.7): the variable-length tag prepended to
//! every encoded message so a decoder can look up which schema to use
//! before decoding anything else.
//!
//! Short form (1 byte): LSB clear, remaining 7 bits carry IDs `0..=127`.
//! Long form (2 bytes): LSB set, remaining 15 bits carry IDs `128..=32767`
//! little-endian within the two bytes. IDs above 32767 fail validation.

use crate::bitvec::BitVec;
use crate::constants::{LONG_FORM_ID_BYTES, ONE_BYTE_MAX_ID, SHORT_FORM_ID_BYTES, TWO_BYTE_MAX_ID};
use crate::result::{require, Error, Result};

/// Whether an ID fits the 1-byte short form or needs the 2-byte long form.
pub fn is_long_form(id: u32) -> bool {
    id > ONE_BYTE_MAX_ID
}

pub fn validate_id(id: u32) -> Result<()> {
    require(id <= TWO_BYTE_MAX_ID, format!("message id {id} exceeds the maximum representable id {TWO_BYTE_MAX_ID}"))
}

/// Number of bytes the id codec will use to represent `id`.
pub fn encoded_len(id: u32) -> usize {
    if is_long_form(id) {
        LONG_FORM_ID_BYTES
    } else {
        SHORT_FORM_ID_BYTES
    }
}

/// Encodes `id` as its id-codec bits, LSB (the form selector) first.
pub fn encode(id: u32) -> Result<BitVec> {
    validate_id(id)?;
    let mut out = BitVec::new();
    if is_long_form(id) {
        out.push_back(true);
        out.append(&BitVec::from_unsigned(id as u64, 15));
    } else {
        out.push_back(false);
        out.append(&BitVec::from_unsigned(id as u64, 7));
    }
    Ok(out)
}

/// Reads the form selector bit from the front of `pool` (without consuming
/// the rest) to decide how many more bits to pull, then returns the
/// decoded id plus total bits consumed.
pub fn decode(pool: &mut BitVec) -> Result<(u32, usize)> {
    let selector = pool.get(0);
    if selector {
        let bits = BitVec::pull_from(pool, 16)?;
        let raw = bits.to_unsigned()?;
        let id = (raw >> 1) as u32;
        Ok((id, 16))
    } else {
        let bits = BitVec::pull_from(pool, 8)?;
        let raw = bits.to_unsigned()?;
        let id = (raw >> 1) as u32;
        Ok((id, 8))
    }
}

/// Reads the id from a byte slice (the first bytes of a wire message)
/// without needing a caller-managed `BitVec`; convenience for
/// `Driver::id`.
pub fn id_from_bytes(bytes: &[u8]) -> Result<u32> {
    let first = *bytes.first().ok_or_else(|| Error::decode("empty buffer, cannot read id"))?;
    if first & 1 == 1 {
        require(bytes.len() >= 2, "truncated long-form id")?;
        let raw = u16::from_le_bytes([bytes[0], bytes[1]]);
        Ok((raw >> 1) as u32)
    } else {
        Ok((first >> 1) as u32)
    }
}

/// Pluggable id codec boundary (`Driver::set_id_codec`): a host can swap in
/// a different id scheme (e.g. a fixed-width one for a closed message set)
/// as long as it can still self-delimit from the leading bytes of a wire
/// message.
pub trait IdCodec: Send + Sync {
    fn encode(&self, id: u32) -> Result<BitVec>;
    fn id_from_bytes(&self, bytes: &[u8]) -> Result<u32>;
    fn encoded_len(&self, id: u32) -> usize;
}

/// The short/long-form id codec documented at the top of this module.
#[derive(Debug, Default)]
pub struct DefaultIdCodec;

impl IdCodec for DefaultIdCodec {
    fn encode(&self, id: u32) -> Result<BitVec> {
        encode(id)
    }

    fn id_from_bytes(&self, bytes: &[u8]) -> Result<u32> {
        id_from_bytes(bytes)
    }

    fn encoded_len(&self, id: u32) -> usize {
        encoded_len(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_matches_scenario() {
        let bits = encode(2).unwrap();
        assert_eq!(bits.to_byte_vec(), vec![0x04]);
        let (id, len) = decode(&mut bits.clone()).unwrap();
        assert_eq!(id, 2);
        assert_eq!(len, 8);
    }

    #[test]
    fn long_id_matches_scenario() {
        let bits = encode(10000).unwrap();
        let bytes = bits.to_byte_vec();
        assert_eq!(bytes.len(), 2);
        assert_eq!(id_from_bytes(&bytes).unwrap(), 10000);
    }

    #[test]
    fn id_over_max_is_rejected() {
        assert!(encode(40000).is_err());
    }

    #[test]
    fn boundary_between_short_and_long_form() {
        assert!(!is_long_form(ONE_BYTE_MAX_ID));
        assert!(is_long_form(ONE_BYTE_MAX_ID + 1));
    }
}
