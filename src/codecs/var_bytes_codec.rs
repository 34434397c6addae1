//! Variable-length bytes codec (§4.4, codec version ≥ 3): a length header
//! plus a variable-length body, analogous to the string codec but without
//! truncation — oversized values always raise `OutOfRange`, strict mode or
//! not, since there is no sensible default of silently dropping bytes from
//! an opaque payload.

use crate::bitvec::BitVec;
use crate::codec_trait::{ceil_log2, FieldCodec};
use crate::context::TraversalContext;
use crate::result::{require, Error, Result};
use crate::schema::FieldDescriptor;
use crate::value::Value;

pub struct VarBytesCodec {
    name: String,
}

impl VarBytesCodec {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn max_length(field: &FieldDescriptor) -> Result<usize> {
        field
            .options
            .max_length
            .ok_or_else(|| Error::schema(format!("{}: var_bytes field missing `max_length`", field.name)))
    }

    fn header_bits(max_length: usize) -> usize {
        ceil_log2(max_length as u64 + 1) as usize
    }
}

impl FieldCodec for VarBytesCodec {
    fn encode(&self, value: &Value, field: &FieldDescriptor, _ctx: &mut TraversalContext) -> Result<BitVec> {
        let max_length = Self::max_length(field)?;
        let bytes = value.as_bytes()?;
        if bytes.len() > max_length {
            return Err(Error::out_of_range(format!(
                "{}: {} bytes exceeds max_length {max_length}",
                field.name,
                bytes.len()
            )));
        }
        let mut out = BitVec::from_unsigned(bytes.len() as u64, Self::header_bits(max_length));
        out.append(&BitVec::from_byte_slice(bytes));
        Ok(out)
    }

    fn encode_absent(&self, field: &FieldDescriptor) -> Result<BitVec> {
        let max_length = Self::max_length(field)?;
        Ok(BitVec::with_len(Self::header_bits(max_length)))
    }

    fn size(&self, value: &Value, field: &FieldDescriptor, _ctx: &TraversalContext) -> Result<usize> {
        let max_length = Self::max_length(field)?;
        Ok(Self::header_bits(max_length) + value.as_bytes()?.len() * 8)
    }

    fn decode(&self, pool: &mut BitVec, field: &FieldDescriptor, _ctx: &mut TraversalContext) -> Result<Value> {
        let max_length = Self::max_length(field)?;
        let header_bits = Self::header_bits(max_length);
        let len = BitVec::pull_from(pool, header_bits)?.to_unsigned()? as usize;
        require(len <= max_length, format!("{}: decoded length {len} exceeds max_length {max_length}", field.name))?;
        let body = BitVec::pull_from(pool, len * 8)?;
        Ok(Value::Bytes(body.to_byte_vec()))
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
