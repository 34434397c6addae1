//! Typed field values and the reflective message-view adapters that read and
//! write them. This is the `TypeHelper` of the design: rather than codecs
//! reaching into a host's native message struct via generated accessors,
//! every codec reads/writes through [`MessageView`]/[`MessageViewMut`],
//! which any host message type can implement over its own storage.
//!
//! [`DynamicMessage`] is the one concrete implementation this crate ships:
//! a schema-driven, `HashMap`-backed message used by the test suite and by
//! embedders who don't have a generated message type of their own.

use std::collections::HashMap;
use std::sync::Arc;

use crate::result::{Error, Result};
use crate::schema::{FieldType, MessageDescriptor};

/// A single scalar or message value, tagged by the wire [`FieldType`] it
/// was read as. `Enum` carries the declaration index, not a host enum type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Enum(i32),
    Message(DynamicMessage),
}

impl Value {
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::Bool(_) => FieldType::Bool,
            Value::Int32(_) => FieldType::Int32,
            Value::Int64(_) => FieldType::Int64,
            Value::UInt32(_) => FieldType::UInt32,
            Value::UInt64(_) => FieldType::UInt64,
            Value::Float(_) => FieldType::Float,
            Value::Double(_) => FieldType::Double,
            Value::String(_) => FieldType::String,
            Value::Bytes(_) => FieldType::Bytes,
            Value::Enum(_) => FieldType::Enum,
            Value::Message(_) => FieldType::Message,
        }
    }

    /// Reads this value as an `f64`, the wire-arithmetic type every bounded
    /// numeric codec narrows to before quantizing. Fails for non-numeric
    /// variants.
    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Value::Int32(v) => Ok(*v as f64),
            Value::Int64(v) => Ok(*v as f64),
            Value::UInt32(v) => Ok(*v as f64),
            Value::UInt64(v) => Ok(*v as f64),
            Value::Float(v) => Ok(*v as f64),
            Value::Double(v) => Ok(*v),
            Value::Enum(v) => Ok(*v as f64),
            other => Err(Error::internal(format!("{:?} is not numeric", other.field_type()))),
        }
    }

    /// Builds a value of `field_type` from a wire-arithmetic `f64`, the
    /// inverse of [`Value::as_f64`] for numeric types.
    pub fn from_f64(field_type: FieldType, v: f64) -> Result<Value> {
        Ok(match field_type {
            FieldType::Int32 => Value::Int32(v as i32),
            FieldType::Int64 => Value::Int64(v as i64),
            FieldType::UInt32 => Value::UInt32(v as u32),
            FieldType::UInt64 => Value::UInt64(v as u64),
            FieldType::Float => Value::Float(v as f32),
            FieldType::Double => Value::Double(v),
            FieldType::Enum => Value::Enum(v as i32),
            other => return Err(Error::internal(format!("{other:?} is not numeric"))),
        })
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(Error::internal(format!("{:?} is not bool", other.field_type()))),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Value::String(s) => Ok(s.as_str()),
            other => Err(Error::internal(format!("{:?} is not string", other.field_type()))),
        }
    }

    pub fn as_bytes(&self) -> Result<&[u8]> {
        match self {
            Value::Bytes(b) => Ok(b.as_slice()),
            other => Err(Error::internal(format!("{:?} is not bytes", other.field_type()))),
        }
    }

    pub fn as_message(&self) -> Result<&DynamicMessage> {
        match self {
            Value::Message(m) => Ok(m),
            other => Err(Error::internal(format!("{:?} is not message", other.field_type()))),
        }
    }
}

/// Storage slot for one field: unset, a single value, or (for repeated
/// fields) a vector of values.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Unset,
    Single(Value),
    Repeated(Vec<Value>),
}

impl FieldValue {
    pub fn is_set(&self) -> bool {
        !matches!(self, FieldValue::Unset)
    }
}

/// Read-only reflective view over a message instance.
pub trait MessageView {
    fn descriptor(&self) -> &Arc<MessageDescriptor>;
    fn field_value(&self, name: &str) -> &FieldValue;
}

/// Mutable reflective view; `MessageViewMut: MessageView` so codecs can
/// borrow either capability as needed.
pub trait MessageViewMut: MessageView {
    fn set_field(&mut self, name: &str, value: FieldValue);
    fn clear_field(&mut self, name: &str);
}

/// The one concrete [`MessageView`]/[`MessageViewMut`] implementation this
/// crate ships: a schema-described message backed by a name-keyed map.
/// Sufficient for the test suite and for embedders without a generated
/// message type; a host with its own struct type can implement the traits
/// directly over its own fields instead.
#[derive(Debug, Clone)]
pub struct DynamicMessage {
    descriptor: Arc<MessageDescriptor>,
    fields: HashMap<String, FieldValue>,
}

impl DynamicMessage {
    pub fn new(descriptor: Arc<MessageDescriptor>) -> Self {
        let fields = descriptor.fields.iter().map(|f| (f.name.clone(), FieldValue::Unset)).collect();
        Self { descriptor, fields }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        match self.fields.get(name) {
            Some(FieldValue::Single(v)) => Some(v),
            _ => None,
        }
    }

    pub fn get_repeated(&self, name: &str) -> &[Value] {
        match self.fields.get(name) {
            Some(FieldValue::Repeated(v)) => v.as_slice(),
            _ => &[],
        }
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), FieldValue::Single(value));
    }

    pub fn set_repeated(&mut self, name: &str, values: Vec<Value>) {
        self.fields.insert(name.to_string(), FieldValue::Repeated(values));
    }
}

impl MessageView for DynamicMessage {
    fn descriptor(&self) -> &Arc<MessageDescriptor> {
        &self.descriptor
    }

    fn field_value(&self, name: &str) -> &FieldValue {
        self.fields.get(name).unwrap_or(&FieldValue::Unset)
    }
}

impl MessageViewMut for DynamicMessage {
    fn set_field(&mut self, name: &str, value: FieldValue) {
        self.fields.insert(name.to_string(), value);
    }

    fn clear_field(&mut self, name: &str) {
        self.fields.insert(name.to_string(), FieldValue::Unset);
    }
}

impl PartialEq for DynamicMessage {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor.full_name == other.descriptor.full_name && self.fields.len() == other.fields.len()
            && self.fields.iter().all(|(k, v)| {
                other.fields.get(k).is_some_and(|ov| field_value_eq(v, ov))
            })
    }
}

fn field_value_eq(a: &FieldValue, b: &FieldValue) -> bool {
    match (a, b) {
        (FieldValue::Unset, FieldValue::Unset) => true,
        (FieldValue::Single(x), FieldValue::Single(y)) => x == y,
        (FieldValue::Repeated(x), FieldValue::Repeated(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Cardinality, FieldDescriptor, FieldOptions};

    fn sample_descriptor() -> Arc<MessageDescriptor> {
        Arc::new(MessageDescriptor::new("test.Sample").with_field(FieldDescriptor {
            name: "x".into(),
            position: 0,
            field_type: FieldType::Int32,
            cardinality: Cardinality::Required,
            options: FieldOptions::default(),
            message_type: None,
            enum_values: vec![],
        }))
    }

    #[test]
    fn unset_field_reads_as_none() {
        let msg = DynamicMessage::new(sample_descriptor());
        assert!(msg.get("x").is_none());
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut msg = DynamicMessage::new(sample_descriptor());
        msg.set("x", Value::Int32(42));
        assert_eq!(msg.get("x"), Some(&Value::Int32(42)));
    }

    #[test]
    fn numeric_conversion_round_trips() {
        let v = Value::from_f64(FieldType::Double, 3.5).unwrap();
        assert_eq!(v.as_f64().unwrap(), 3.5);
    }
}
