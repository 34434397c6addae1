//! Boolean codec (§4.4): 1 bit if required (0=false, 1=true); 2 bits if
//! optional, with 0 reserved for "absent" (1=false, 2=true).

use crate::bitvec::BitVec;
use crate::codec_trait::FieldCodec;
use crate::context::TraversalContext;
use crate::result::{Error, Result};
use crate::schema::FieldDescriptor;
use crate::value::Value;

pub struct BoolCodec {
    name: String,
}

impl BoolCodec {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl FieldCodec for BoolCodec {
    fn encode(&self, value: &Value, field: &FieldDescriptor, _ctx: &mut TraversalContext) -> Result<BitVec> {
        let b = value.as_bool()?;
        if field.is_optional() {
            Ok(BitVec::from_unsigned(if b { 2 } else { 1 }, 2))
        } else {
            Ok(BitVec::from_unsigned(b as u64, 1))
        }
    }

    fn encode_absent(&self, field: &FieldDescriptor) -> Result<BitVec> {
        let _ = field;
        Ok(BitVec::from_unsigned(0, 2))
    }

    fn size(&self, _value: &Value, field: &FieldDescriptor, _ctx: &TraversalContext) -> Result<usize> {
        self.max_size(field)
    }

    fn decode(&self, pool: &mut BitVec, field: &FieldDescriptor, _ctx: &mut TraversalContext) -> Result<Value> {
        if field.is_optional() {
            let raw = BitVec::pull_from(pool, 2)?.to_unsigned()?;
            match raw {
                0 => Err(Error::NullValue),
                1 => Ok(Value::Bool(false)),
                _ => Ok(Value::Bool(true)),
            }
        } else {
            let raw = BitVec::pull_from(pool, 1)?.to_unsigned()?;
            Ok(Value::Bool(raw == 1))
        }
    }

    fn min_size(&self, field: &FieldDescriptor) -> Result<usize> {
        self.max_size(field)
    }

    fn max_size(&self, field: &FieldDescriptor) -> Result<usize> {
        Ok(if field.is_optional() { 2 } else { 1 })
    }

    fn validate(&self, _field: &FieldDescriptor) -> Result<()> {
        Ok(())
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

    fn field(optional: bool) -> FieldDescriptor {
        FieldDescriptor {
            name: "flag".into(),
            position: 0,
            field_type: FieldType::Bool,
            cardinality: if optional { Cardinality::Optional } else { Cardinality::Required },
            options: FieldOptions::default(),
            message_type: None,
            enum_values: vec![],
        }
    }

    fn ctx() -> TraversalContext {
        TraversalContext::new(Arc::new(MessageDescriptor::new("test.Root")), true, DynamicConditions::noop())
    }

    #[test]
    fn required_bool_round_trips_in_one_bit() {
        let codec = BoolCodec::new("dccl.default3");
        let f = field(false);
        let mut c = ctx();
        let bits = codec.encode(&Value::Bool(true), &f, &mut c).unwrap();
        assert_eq!(bits.len(), 1);
        let mut pool = bits;
        assert_eq!(codec.decode(&mut pool, &f, &mut c).unwrap(), Value::Bool(true));
    }

    #[test]
    fn optional_absent_is_null() {
        let codec = BoolCodec::new("dccl.default3");
        let f = field(true);
        let mut c = ctx();
        let mut pool = codec.encode_absent(&f).unwrap();
        assert!(matches!(codec.decode(&mut pool, &f, &mut c).unwrap_err(), Error::NullValue));
    }
}
