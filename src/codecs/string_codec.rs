//! String codec (§4.4): a length header of `ceil_log2(max_length+1)` bits
//! followed by that many bytes. Strings longer than `max_length` are
//! truncated by default, or raise `OutOfRange` in strict mode.

use crate::bitvec::BitVec;
use crate::codec_trait::{ceil_log2, FieldCodec};
use crate::context::TraversalContext;
use crate::result::{require, Error, Result};
use crate::schema::FieldDescriptor;
use crate::value::Value;

pub struct StringCodec {
    name: String,
}

impl StringCodec {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn max_length(field: &FieldDescriptor) -> Result<usize> {
        field
            .options
            .max_length
            .ok_or_else(|| Error::schema(format!("{}: string field missing `max_length`", field.name)))
    }

    fn header_bits(max_length: usize) -> usize {
        ceil_log2(max_length as u64 + 1) as usize
    }
}

impl FieldCodec for StringCodec {
    fn encode(&self, value: &Value, field: &FieldDescriptor, ctx: &mut TraversalContext) -> Result<BitVec> {
        let max_length = Self::max_length(field)?;
        let s = value.as_str()?;
        let bytes = s.as_bytes();
        let len = if bytes.len() > max_length {
            if ctx.strict {
                return Err(Error::out_of_range(format!(
                    "{}: string of {} bytes exceeds max_length {max_length}",
                    field.name,
                    bytes.len()
                )));
            }
            max_length
        } else {
            bytes.len()
        };
        let mut out = BitVec::from_unsigned(len as u64, Self::header_bits(max_length));
        out.append(&BitVec::from_byte_slice(&bytes[..len]));
        Ok(out)
    }

    fn encode_absent(&self, field: &FieldDescriptor) -> Result<BitVec> {
        let max_length = Self::max_length(field)?;
        Ok(BitVec::with_len(Self::header_bits(max_length)))
    }

    fn size(&self, value: &Value, field: &FieldDescriptor, ctx: &TraversalContext) -> Result<usize> {
        let max_length = Self::max_length(field)?;
        let s = value.as_str()?;
        let len = s.as_bytes().len().min(max_length);
        let _ = ctx;
        Ok(Self::header_bits(max_length) + len * 8)
    }

    fn decode(&self, pool: &mut BitVec, field: &FieldDescriptor, _ctx: &mut TraversalContext) -> Result<Value> {
        let max_length = Self::max_length(field)?;
        let header_bits = Self::header_bits(max_length);
        let len = BitVec::pull_from(pool, header_bits)?.to_unsigned()? as usize;
        require(len <= max_length, format!("{}: decoded length {len} exceeds max_length {max_length}", field.name))?;
        let body = BitVec::pull_from(pool, len * 8)?;
        let bytes = body.to_byte_vec();
        let s = String::from_utf8(bytes).map_err(|e| Error::decode(format!("{}: invalid utf-8: {e}", field.name)))?;
        Ok(Value::String(s))
    }

    fn min_size(&self, field: &FieldDescriptor) -> Result<usize> {
        Self::max_length(field).map(Self::header_bits)
    }

    fn max_size(&self, field: &FieldDescriptor) -> Result<usize> {
        let max_length = Self::max_length(field)?;
        Ok(Self::header_bits(max_length) + max_length * 8)
    }

    fn validate(&self, field: &FieldDescriptor) -> Result<()> {
        Self::max_length(field).map(|_| ())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
