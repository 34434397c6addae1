//! Static codec (§4.4): zero bits on the wire; decode always returns the
//! literal `static_value` from the field's options. Implicitly
//! `force_required` since there's never anything to make optional.

use crate::bitvec::BitVec;
use crate::codec_trait::FieldCodec;
use crate::context::TraversalContext;
use crate::result::{Error, Result};
use crate::schema::{FieldDescriptor, FieldType};
use crate::value::Value;

pub struct StaticCodec {
    name: String,
}

impl StaticCodec {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn literal(field: &FieldDescriptor) -> Result<Value> {
        let raw = field
            .options
            .static_value
            .as_ref()
            .ok_or_else(|| Error::schema(format!("{}: static field missing `static_value`", field.name)))?;
        Ok(match field.field_type {
            FieldType::Bool => Value::Bool(raw == "true" || raw == "1"),
            FieldType::Int32 => Value::Int32(raw.parse().map_err(|_| Error::schema("bad static int32"))?),
            FieldType::Int64 => Value::Int64(raw.parse().map_err(|_| Error::schema("bad static int64"))?),
            FieldType::UInt32 => Value::UInt32(raw.parse().map_err(|_| Error::schema("bad static uint32"))?),
            FieldType::UInt64 => Value::UInt64(raw.parse().map_err(|_| Error::schema("bad static uint64"))?),
            FieldType::Float => Value::Float(raw.parse().map_err(|_| Error::schema("bad static float"))?),
            FieldType::Double => Value::Double(raw.parse().map_err(|_| Error::schema("bad static double"))?),
            FieldType::String => Value::String(raw.clone()),
            FieldType::Bytes => Value::Bytes(raw.as_bytes().to_vec()),
            FieldType::Enum => Value::Enum(raw.parse().map_err(|_| Error::schema("bad static enum index"))?),
            FieldType::Message => return Err(Error::schema(format!("{}: static codec does not support message fields", field.name))),
        })
    }
}

impl FieldCodec for StaticCodec {
    fn encode(&self, _value: &Value, _field: &FieldDescriptor, _ctx: &mut TraversalContext) -> Result<BitVec> {
        Ok(BitVec::new())
    }

    fn encode_absent(&self, _field: &FieldDescriptor) -> Result<BitVec> {
        Ok(BitVec::new())
    }

    fn size(&self, _value: &Value, _field: &FieldDescriptor, _ctx: &TraversalContext) -> Result<usize> {
        Ok(0)
    }

    fn decode(&self, _pool: &mut BitVec, field: &FieldDescriptor, _ctx: &mut TraversalContext) -> Result<Value> {
        Self::literal(field)
    }

    fn min_size(&self, _field: &FieldDescriptor) -> Result<usize> {
        Ok(0)
    }

    fn max_size(&self, _field: &FieldDescriptor) -> Result<usize> {
        Ok(0)
    }

    fn validate(&self, field: &FieldDescriptor) -> Result<()> {
        Self::literal(field).map(|_| ())
    }

    fn force_required(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamic_conditions::DynamicConditions;
    use crate::schema::{Cardinality, FieldOptions, MessageDescriptor};
    use std::sync::Arc;

    #[test]
    fn decode_returns_literal() {
        let f = FieldDescriptor {
            name: "k".into(),
            position: 0,
            field_type: FieldType::Int32,
            cardinality: Cardinality::Required,
            options: FieldOptions { static_value: Some("7".into()), ..Default::default() },
            message_type: None,
            enum_values: vec![],
        };
        let codec = StaticCodec::new("dccl.static3");
        let mut c = TraversalContext::new(Arc::new(MessageDescriptor::new("test.Root")), true, DynamicConditions::noop());
        let mut pool = BitVec::new();
        assert_eq!(codec.decode(&mut pool, &f, &mut c).unwrap(), Value::Int32(7));
    }
}
