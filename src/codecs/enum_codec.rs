//! Enum codec (§4.4): value maps to its declaration index and is encoded
//! as a bounded integer in `[0, count-1]`, reusing the same presence-value
//! sentinel strategy as the numeric codec.

use crate::bitvec::BitVec;
use crate::codec_trait::{ceil_log2, FieldCodec};
use crate::context::TraversalContext;
use crate::result::{require, Error, Result};
use crate::schema::FieldDescriptor;
use crate::value::Value;

pub struct EnumCodec {
    name: String,
}

impl EnumCodec {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn count(field: &FieldDescriptor) -> Result<u64> {
        require(!field.enum_values.is_empty(), format!("{}: enum has no declared values", field.name))?;
        Ok(field.enum_values.len() as u64)
    }
}

impl FieldCodec for EnumCodec {
    fn encode(&self, value: &Value, field: &FieldDescriptor, _ctx: &mut TraversalContext) -> Result<BitVec> {
        let idx = match value {
            Value::Enum(i) => *i,
            other => return Err(Error::internal(format!("{:?} is not an enum value", other.field_type()))),
        };
        let count = Self::count(field)?;
        let optional = field.is_optional();
        if optional {
            let full_width = ceil_log2(count + 1) as usize;
            Ok(BitVec::from_unsigned(idx as u64 + 1, full_width))
        } else {
            let width = ceil_log2(count) as usize;
            Ok(BitVec::from_unsigned(idx as u64, width))
        }
    }

    fn encode_absent(&self, field: &FieldDescriptor) -> Result<BitVec> {
        let count = Self::count(field)?;
        let full_width = ceil_log2(count + 1) as usize;
        Ok(BitVec::from_unsigned(0, full_width))
    }

    fn size(&self, _value: &Value, field: &FieldDescriptor, _ctx: &TraversalContext) -> Result<usize> {
        self.max_size(field)
    }

    fn decode(&self, pool: &mut BitVec, field: &FieldDescriptor, _ctx: &mut TraversalContext) -> Result<Value> {
        let count = Self::count(field)?;
        if field.is_optional() {
            let full_width = ceil_log2(count + 1) as usize;
            let raw = BitVec::pull_from(pool, full_width)?.to_unsigned()?;
            if raw == 0 {
                return Err(Error::NullValue);
            }
            Ok(Value::Enum((raw - 1) as i32))
        } else {
            let width = ceil_log2(count) as usize;
            let raw = BitVec::pull_from(pool, width)?.to_unsigned()?;
            Ok(Value::Enum(raw as i32))
        }
    }

    fn min_size(&self, field: &FieldDescriptor) -> Result<usize> {
        self.max_size(field)
    }

    fn max_size(&self, field: &FieldDescriptor) -> Result<usize> {
        let count = Self::count(field)?;
        Ok(if field.is_optional() {
            ceil_log2(count + 1) as usize
        } else {
            ceil_log2(count) as usize
        })
    }

    fn validate(&self, field: &FieldDescriptor) -> Result<()> {
        Self::count(field).map(|_| ())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamic_conditions::DynamicConditions;
    use crate::schema::{Cardinality, FieldOptions, FieldType, MessageDescriptor};
    use std::sync::Arc;

    fn field() -> FieldDescriptor {
        FieldDescriptor {
            name: "color".into(),
            position: 0,
            field_type: FieldType::Enum,
            cardinality: Cardinality::Required,
            options: FieldOptions::default(),
            message_type: None,
            enum_values: vec!["RED".into(), "GREEN".into(), "BLUE".into()],
        }
    }

    #[test]
    fn round_trips_index() {
        let codec = EnumCodec::new("dccl.default3");
        let f = field();
        let mut c = TraversalContext::new(Arc::new(MessageDescriptor::new("test.Root")), true, DynamicConditions::noop());
        let bits = codec.encode(&Value::Enum(2), &f, &mut c).unwrap();
        assert_eq!(bits.len(), 2);
        let mut pool = bits;
        assert_eq!(codec.decode(&mut pool, &f, &mut c).unwrap(), Value::Enum(2));
    }
}
