//! Reflective schema surface: field/message descriptors and their option
//! bags. This crate does not ship a schema language or a `.proto`-style
//! compiler; it assumes a host builds these descriptors (by hand, from a
//! code-generator, or from some other IDL) and hands them to [`crate::driver::Driver`].
//!
//! Option bags are plain `serde`-derivable structs so a host can load a
//! schema definition from JSON/TOML/etc. without this crate prescribing a
//! format.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::result::{require, Error, Result};

/// Wire-relevant type of a field. Distinct from the host language's type;
/// e.g. an `enum` field carries a `FieldType::Enum` even though the host
/// value type might be some Rust enum wrapped behind [`crate::value::Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Bool,
    Int32,
    Int64,
    UInt32,
    UInt64,
    Float,
    Double,
    String,
    Bytes,
    Enum,
    Message,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Bool => "bool",
            FieldType::Int32 => "int32",
            FieldType::Int64 => "int64",
            FieldType::UInt32 => "uint32",
            FieldType::UInt64 => "uint64",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::String => "string",
            FieldType::Bytes => "bytes",
            FieldType::Enum => "enum",
            FieldType::Message => "message",
        }
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            FieldType::Int32 | FieldType::Int64 | FieldType::UInt32 | FieldType::UInt64
        )
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integral() || matches!(self, FieldType::Float | FieldType::Double)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    Required,
    Optional,
    Repeated,
}

/// A single case of a schema-level `oneof` union (C7, codec version ≥ 4):
/// at most one of the fields sharing an `oneof_index` may be set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneofInfo {
    pub oneof_index: u32,
    pub case_count: u32,
}

/// Options attached to a single field, mirroring spec's field option bag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldOptions {
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Deprecated alias of `resolution = 10^-precision`.
    pub precision: Option<i32>,
    pub resolution: Option<f64>,
    pub max_length: Option<usize>,
    pub max_repeat: Option<usize>,
    pub min_repeat: Option<usize>,
    pub static_value: Option<String>,
    pub num_days: Option<u32>,
    pub in_head: Option<bool>,
    pub omit: bool,
    pub codec: Option<String>,
    pub codec_group: Option<String>,
    pub codec_version: Option<u32>,
    pub required_if: Option<String>,
    pub omit_if: Option<String>,
    pub only_if: Option<String>,
    pub min_if: Option<String>,
    pub max_if: Option<String>,
    /// Initial frequency table for a field registered under the
    /// `dccl.arithmetic` codec; seeds the codec's live, per-field model the
    /// first time this field is encoded or decoded on a given `Driver`.
    pub arithmetic_model: Option<crate::arithmetic::ArithmeticModel>,
    /// Use the presence-bit strategy instead of the reserved-value strategy
    /// for optional numeric/bool fields.
    pub presence_bit: bool,
    pub oneof: Option<OneofInfo>,
}

impl FieldOptions {
    /// Effective resolution after resolving the `precision`/`resolution`
    /// alias; defaults to 1 when neither is set.
    ///
    /// Per spec §9, setting both `precision` and `resolution` is a schema
    /// error, not a silent precedence rule.
    pub fn effective_resolution(&self) -> Result<f64> {
        match (self.precision, self.resolution) {
            (Some(_), Some(_)) => Err(Error::schema(
                "field sets both `precision` and `resolution`; only one may be set",
            )),
            (Some(p), None) => Ok(10f64.powi(-p)),
            (None, Some(r)) => Ok(r),
            (None, None) => Ok(1.0),
        }
    }
}

/// Options attached to a whole message, mirroring spec's message option bag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageOptions {
    pub id: Option<u32>,
    pub codec: Option<String>,
    pub codec_group: Option<String>,
    pub codec_version: Option<u32>,
    pub max_bytes: Option<usize>,
}

/// Metadata for one field of a [`MessageDescriptor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub position: usize,
    pub field_type: FieldType,
    pub cardinality: Cardinality,
    pub options: FieldOptions,
    /// Present only when `field_type == Message`.
    pub message_type: Option<Arc<MessageDescriptor>>,
    /// Present only when `field_type == Enum`: the declared value names in
    /// declaration order (index 0 is encoded as wire value 0).
    pub enum_values: Vec<String>,
}

impl FieldDescriptor {
    pub fn is_repeated(&self) -> bool {
        self.cardinality == Cardinality::Repeated
    }

    pub fn is_optional(&self) -> bool {
        self.cardinality == Cardinality::Optional
    }

    pub fn full_type_name(&self) -> Option<&str> {
        self.message_type.as_ref().map(|m| m.full_name.as_str())
    }
}

/// Metadata for one message type: its fields plus message-level options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDescriptor {
    pub full_name: String,
    pub fields: Vec<FieldDescriptor>,
    pub options: MessageOptions,
}

impl MessageDescriptor {
    pub fn new(full_name: impl Into<String>) -> Self {
        Self { full_name: full_name.into(), fields: Vec::new(), options: MessageOptions::default() }
    }

    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The codec version in effect for this message, defaulting to 3 when
    /// unset (matches the reference default used by the default codec name
    /// table when a schema does not pin a version).
    pub fn codec_version(&self) -> u32 {
        self.options.codec_version.unwrap_or(3)
    }

    pub fn id(&self) -> Result<u32> {
        self.options.id.ok_or_else(|| Error::schema(format!("message {} has no `id` option", self.full_name)))
    }

    /// Walks every field validating option combinations the field codecs
    /// will rely on; called once at [`crate::driver::Driver::load`] time.
    pub fn validate(&self) -> Result<()> {
        require(self.options.id.is_some(), format!("message {} missing required `id` option", self.full_name))?;
        for f in &self.fields {
            f.options.effective_resolution().map_err(|e| {
                Error::schema(format!("{}.{}: {e}", self.full_name, f.name))
            })?;
            if let (Some(min), Some(max)) = (f.options.min, f.options.max) {
                require(min <= max, format!("{}.{}: min > max", self.full_name, f.name))?;
            }
            if f.field_type == FieldType::Message {
                require(
                    f.message_type.is_some(),
                    format!("{}.{}: message field missing message_type", self.full_name, f.name),
                )?;
            }
            if f.field_type == FieldType::Enum {
                require(
                    !f.enum_values.is_empty(),
                    format!("{}.{}: enum field has no declared values", self.full_name, f.name),
                )?;
            }
        }
        Ok(())
    }
}
