//! Fixed-width bytes codec (§4.4): exactly `max_length` bytes on the wire;
//! optional fields add a 1-bit presence prefix.

use crate::bitvec::BitVec;
use crate::codec_trait::FieldCodec;
use crate::context::TraversalContext;
use crate::result::{Error, Result};
use crate::schema::FieldDescriptor;
use crate::value::Value;

pub struct BytesCodec {
    name: String,
}

impl BytesCodec {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn max_length(field: &FieldDescriptor) -> Result<usize> {
        field
            .options
            .max_length
            .ok_or_else(|| Error::schema(format!("{}: bytes field missing `max_length`", field.name)))
    }
}

impl FieldCodec for BytesCodec {
    fn encode(&self, value: &Value, field: &FieldDescriptor, ctx: &mut TraversalContext) -> Result<BitVec> {
        let max_length = Self::max_length(field)?;
        let bytes = value.as_bytes()?;
        if bytes.len() > max_length && ctx.strict {
            return Err(Error::out_of_range(format!(
                "{}: {} bytes exceeds max_length {max_length}",
                field.name,
                bytes.len()
            )));
        }
        let mut padded = vec![0u8; max_length];
        let n = bytes.len().min(max_length);
        padded[..n].copy_from_slice(&bytes[..n]);

        let mut out = BitVec::new();
        if field.is_optional() {
            out.push_back(true);
        }
        out.append(&BitVec::from_byte_slice(&padded));
        Ok(out)
    }

    fn encode_absent(&self, field: &FieldDescriptor) -> Result<BitVec> {
        let max_length = Self::max_length(field)?;
        let mut out = BitVec::new();
        out.push_back(false);
        out.append(&BitVec::with_len(max_length * 8));
        Ok(out)
    }

    fn size(&self, _value: &Value, field: &FieldDescriptor, _ctx: &TraversalContext) -> Result<usize> {
        self.max_size(field)
    }

    fn decode(&self, pool: &mut BitVec, field: &FieldDescriptor, _ctx: &mut TraversalContext) -> Result<Value> {
        let max_length = Self::max_length(field)?;
        if field.is_optional() {
            let present = BitVec::pull_from(pool, 1)?.to_unsigned()? == 1;
            let body = BitVec::pull_from(pool, max_length * 8)?;
            if !present {
                return Err(Error::NullValue);
            }
            return Ok(Value::Bytes(body.to_byte_vec()));
        }
        let body = BitVec::pull_from(pool, max_length * 8)?;
        Ok(Value::Bytes(body.to_byte_vec()))
    }

    fn min_size(&self, field: &FieldDescriptor) -> Result<usize> {
        self.max_size(field)
    }

    fn max_size(&self, field: &FieldDescriptor) -> Result<usize> {
        let max_length = Self::max_length(field)?;
        Ok(max_length * 8 + if field.is_optional() { 1 } else { 0 })
    }

    fn validate(&self, field: &FieldDescriptor) -> Result<()> {
        Self::max_length(field).map(|_| ())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
