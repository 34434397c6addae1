//! Bounded numeric codec (§4.4): backs `int32`/`int64`/`uint32`/`uint64`/
//! `float`/`double`, unified on `f64` wire arithmetic regardless of the
//! field's declared type. The source engine instantiates a separate
//! template per `(WireType, FieldType)` pair; Rust's generics don't buy
//! anything here since the arithmetic is identical, so this codec converts
//! to/from the declared `FieldType` only at the `pre_encode`/`post_decode`
//! boundary.

use crate::bitvec::BitVec;
use crate::codec_trait::{ceil_log2, FieldCodec};
use crate::codecs::{numeric_bounds, range_count};
use crate::context::TraversalContext;
use crate::result::{require, Error, Result};
use crate::schema::FieldDescriptor;
use crate::value::Value;

/// `PRESENCE_VALUE` reserves wire value 0 to mean "absent" and shifts every
/// real value up by one; `PRESENCE_BIT` prepends an explicit presence bit
/// and keeps the value width unshifted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceStrategy {
    Value,
    Bit,
}

pub struct NumericCodec {
    name: String,
    presence: PresenceStrategy,
    force_required: bool,
}

impl NumericCodec {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), presence: PresenceStrategy::Value, force_required: false }
    }

    pub fn with_presence_bit(name: impl Into<String>) -> Self {
        Self { name: name.into(), presence: PresenceStrategy::Bit, force_required: false }
    }

    fn is_optional(&self, field: &FieldDescriptor) -> bool {
        field.is_optional() && !self.force_required
    }

    fn required_width(min: f64, max: f64, resolution: f64) -> usize {
        ceil_log2(range_count(min, max, resolution)) as usize
    }

    fn quantize(min: f64, resolution: f64, v: f64) -> u64 {
        ((v - min) / resolution).round().max(0.0) as u64
    }
}

impl FieldCodec for NumericCodec {
    fn pre_encode(&self, value: Value, _field: &FieldDescriptor) -> Result<Value> {
        Ok(Value::Double(value.as_f64()?))
    }

    fn post_decode(&self, value: Value, field: &FieldDescriptor) -> Result<Value> {
        Value::from_f64(field.field_type, value.as_f64()?).map_err(|_| {
            Error::internal(format!("{}: cannot convert decoded wire value back to field type", field.name))
        })
    }

    fn encode(&self, value: &Value, field: &FieldDescriptor, ctx: &mut TraversalContext) -> Result<BitVec> {
        let (min, max, resolution) = numeric_bounds(field)?;
        let v = value.as_f64()?;
        if v.is_nan() {
            return self.encode_absent(field);
        }
        let count = range_count(min, max, resolution);
        let width = Self::required_width(min, max, resolution);

        let in_range = v >= min - 1e-9 && v <= max + 1e-9;
        if !in_range && ctx.strict {
            return Err(Error::out_of_range(format!("{}: value {v} outside [{min}, {max}]", field.name)));
        }
        let clamped = v.clamp(min, max);
        let u = Self::quantize(min, resolution, clamped).min(count - 1);

        let mut out = BitVec::new();
        let optional = self.is_optional(field);
        match self.presence {
            PresenceStrategy::Value => {
                if optional {
                    let full_width = ceil_log2(count + 1) as usize;
                    out.append(&BitVec::from_unsigned(u + 1, full_width));
                } else {
                    out.append(&BitVec::from_unsigned(u, width));
                }
            }
            PresenceStrategy::Bit => {
                if optional {
                    out.push_back(true);
                }
                out.append(&BitVec::from_unsigned(u, width));
            }
        }
        Ok(out)
    }

    fn encode_absent(&self, field: &FieldDescriptor) -> Result<BitVec> {
        let (min, max, resolution) = numeric_bounds(field)?;
        let count = range_count(min, max, resolution);
        let width = Self::required_width(min, max, resolution);
        let mut out = BitVec::new();
        match self.presence {
            PresenceStrategy::Value => {
                let full_width = ceil_log2(count + 1) as usize;
                out.append(&BitVec::from_unsigned(0, full_width));
            }
            PresenceStrategy::Bit => {
                out.push_back(false);
                out.append(&BitVec::with_len(width));
            }
        }
        Ok(out)
    }

    fn size(&self, value: &Value, field: &FieldDescriptor, _ctx: &TraversalContext) -> Result<usize> {
        let _ = value;
        self.max_size(field)
    }

    fn decode(&self, pool: &mut BitVec, field: &FieldDescriptor, _ctx: &mut TraversalContext) -> Result<Value> {
        let (min, max, resolution) = numeric_bounds(field)?;
        let count = range_count(min, max, resolution);
        let width = Self::required_width(min, max, resolution);
        let optional = self.is_optional(field);

        let u = match self.presence {
            PresenceStrategy::Value => {
                if optional {
                    let full_width = ceil_log2(count + 1) as usize;
                    let raw = BitVec::pull_from(pool, full_width)?.to_unsigned()?;
                    if raw == 0 {
                        return Err(Error::NullValue);
                    }
                    raw - 1
                } else {
                    BitVec::pull_from(pool, width)?.to_unsigned()?
                }
            }
            PresenceStrategy::Bit => {
                if optional {
                    let present = BitVec::pull_from(pool, 1)?.to_unsigned()? == 1;
                    if !present {
                        let _ = BitVec::pull_from(pool, width)?;
                        return Err(Error::NullValue);
                    }
                }
                BitVec::pull_from(pool, width)?.to_unsigned()?
            }
        };
        Ok(Value::Double(min + (u as f64) * resolution))
    }

    fn min_size(&self, field: &FieldDescriptor) -> Result<usize> {
        self.max_size(field)
    }

    fn max_size(&self, field: &FieldDescriptor) -> Result<usize> {
        let (min, max, resolution) = numeric_bounds(field)?;
        let count = range_count(min, max, resolution);
        let width = Self::required_width(min, max, resolution);
        let optional = self.is_optional(field);
        Ok(match self.presence {
            PresenceStrategy::Value => {
                if optional {
                    ceil_log2(count + 1) as usize
                } else {
                    width
                }
            }
            PresenceStrategy::Bit => width + if optional { 1 } else { 0 },
        })
    }

    fn validate(&self, field: &FieldDescriptor) -> Result<()> {
        let (min, max, resolution) = numeric_bounds(field)?;
        require(resolution > 0.0, format!("{}: resolution must be positive", field.name))?;
        require(min <= max, format!("{}: min > max", field.name))?;
        let min_multiple = (min / resolution).round() * resolution;
        let max_multiple = (max / resolution).round() * resolution;
        require(
            (min_multiple - min).abs() < 1e-10,
            format!("{}: min is not an integer multiple of resolution", field.name),
        )?;
        require(
            (max_multiple - max).abs() < 1e-10,
            format!("{}: max is not an integer multiple of resolution", field.name),
        )?;
        Ok(())
    }

    fn force_required(&self) -> bool {
        self.force_required
    }

    fn name(&self) -> &str {
        &self.name
    }
}
