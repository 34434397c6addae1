//! The polymorphic field codec contract (C3).
//!
//! Every codec implements this trait for one `(field_type, wire_type)`
//! pair. Identity in the registry is the `(FieldType, name)` pair (C4), not
//! the Rust type implementing the trait, so several schema field types can
//! share one `FieldCodec` impl (e.g. the numeric codec backs `int32`,
//! `uint64`, `double`, ...).

use std::fmt::Write as _;

use crate::bitvec::BitVec;
use crate::context::TraversalContext;
use crate::result::{Error, Result};
use crate::schema::FieldDescriptor;
use crate::value::Value;

/// Smallest `n` such that `2^n >= count`, i.e. the bit width needed to
/// enumerate `count` distinct values including a sentinel 0. Used for
/// presence-value sentinel widths, repeated-field count prefixes, and
/// oneof index prefixes throughout the codec implementations.
pub fn ceil_log2(count: u64) -> u32 {
    if count <= 1 {
        return 0;
    }
    (u64::BITS - (count - 1).leading_zeros()).max(1)
}

/// Contract every field codec implements. Methods are written so they can
/// be called through a `dyn FieldCodec` stored in the registry; there is no
/// static dispatch path.
pub trait FieldCodec: Send + Sync {
    /// Type conversion prior to `encode`; default is identity.
    fn pre_encode(&self, value: Value, _field: &FieldDescriptor) -> Result<Value> {
        Ok(value)
    }

    /// Emits bits for one already-`pre_encode`d value; bit 0 is the first
    /// transmitted bit.
    fn encode(&self, value: &Value, field: &FieldDescriptor, ctx: &mut TraversalContext) -> Result<BitVec>;

    /// Bit count `encode` would produce for `value`.
    fn size(&self, value: &Value, field: &FieldDescriptor, ctx: &TraversalContext) -> Result<usize>;

    /// Consumes bits from the front of `pool`, producing a wire value.
    /// Raises [`Error::NullValue`] when the bits decode to the "field
    /// absent" sentinel.
    fn decode(&self, pool: &mut BitVec, field: &FieldDescriptor, ctx: &mut TraversalContext) -> Result<Value>;

    /// Inverse of `pre_encode`; default is identity.
    fn post_decode(&self, value: Value, _field: &FieldDescriptor) -> Result<Value> {
        Ok(value)
    }

    /// Emits the "field absent" bit pattern for an optional field that has
    /// no value; the message codec calls this instead of `encode` when a
    /// field is unset. Default pads with `min_size` zero bits, correct for
    /// codecs that are never optional (`force_required`) or whose absent
    /// pattern happens to be all-zero.
    fn encode_absent(&self, field: &FieldDescriptor) -> Result<BitVec> {
        Ok(BitVec::with_len(self.min_size(field)?))
    }

    /// Tight lower bound in bits for any value this codec could encode for
    /// `field`.
    fn min_size(&self, field: &FieldDescriptor) -> Result<usize>;

    /// Tight upper bound in bits; for variable-size codecs `min < max`.
    fn max_size(&self, field: &FieldDescriptor) -> Result<usize>;

    /// Raises [`Error::Schema`] on missing or incompatible options.
    fn validate(&self, field: &FieldDescriptor) -> Result<()>;

    /// Writes a human-readable description of this codec's configuration
    /// for `field`.
    fn info(&self, field: &FieldDescriptor, sink: &mut dyn std::fmt::Write) -> Result<()> {
        writeln!(sink, "{}: {} ({})", field.name, field.field_type.as_str(), self.name())
            .map_err(|e| Error::internal(e.to_string()))
    }

    /// Contribution to the schema hash (folded together with every other
    /// field's type, cardinality, option bag and codec-specific hash at
    /// `Driver::load`).
    fn hash(&self, field: &FieldDescriptor) -> u64 {
        let mut h: u64 = 0xcbf29ce484222325;
        for byte in field.name.as_bytes() {
            h ^= *byte as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        h
    }

    /// Stable name this codec is registered under; used by `info` and by
    /// deprecated-name warnings.
    fn name(&self) -> &str;

    /// When true, suppresses the extra null/presence encoding an optional
    /// field would otherwise consume (the static codec uses this: it never
    /// needs a presence marker because it never puts any bits on the
    /// wire).
    fn force_required(&self) -> bool {
        false
    }

    /// Default repeated-field encode: a count prefix of
    /// `ceil_log2(max_repeat - min_repeat + 1)` bits (codec version ≥ 3) or
    /// no prefix and always `max_repeat` elements (version 2), followed by
    /// the elements themselves.
    fn encode_repeated(
        &self,
        values: &[Value],
        field: &FieldDescriptor,
        ctx: &mut TraversalContext,
        codec_version: u32,
    ) -> Result<BitVec> {
        let max_repeat = field.options.max_repeat.unwrap_or(1);
        let min_repeat = field.options.min_repeat.unwrap_or(0);
        if values.len() > max_repeat || values.len() < min_repeat {
            return Err(Error::out_of_range(format!(
                "{}: repeat count {} outside [{min_repeat}, {max_repeat}]",
                field.name,
                values.len()
            )));
        }
        let mut out = BitVec::new();
        if codec_version >= 3 {
            let count_bits = ceil_log2((max_repeat - min_repeat + 1) as u64) as usize;
            let count = BitVec::from_unsigned((values.len() - min_repeat) as u64, count_bits);
            out.append(&count);
            for v in values {
                out.append(&self.encode(v, field, ctx)?);
            }
        } else {
            for i in 0..max_repeat {
                if let Some(v) = values.get(i) {
                    out.append(&self.encode(v, field, ctx)?);
                } else {
                    out.append(&BitVec::with_len(self.min_size(field)?));
                }
            }
        }
        Ok(out)
    }

    fn decode_repeated(
        &self,
        pool: &mut BitVec,
        field: &FieldDescriptor,
        ctx: &mut TraversalContext,
        codec_version: u32,
    ) -> Result<Vec<Value>> {
        let max_repeat = field.options.max_repeat.unwrap_or(1);
        let min_repeat = field.options.min_repeat.unwrap_or(0);
        let mut out = Vec::new();
        if codec_version >= 3 {
            let count_bits = ceil_log2((max_repeat - min_repeat + 1) as u64) as usize;
            let count_bv = BitVec::pull_from(pool, count_bits)?;
            let count = count_bv.to_unsigned()? as usize + min_repeat;
            for _ in 0..count {
                out.push(self.decode(pool, field, ctx)?);
            }
        } else {
            for _ in 0..max_repeat {
                match self.decode(pool, field, ctx) {
                    Ok(v) => out.push(v),
                    Err(Error::NullValue) => break,
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(out)
    }

    fn size_repeated(&self, values: &[Value], field: &FieldDescriptor, ctx: &TraversalContext, codec_version: u32) -> Result<usize> {
        let max_repeat = field.options.max_repeat.unwrap_or(1);
        let min_repeat = field.options.min_repeat.unwrap_or(0);
        let mut bits = 0usize;
        if codec_version >= 3 {
            bits += ceil_log2((max_repeat - min_repeat + 1) as u64) as usize;
        }
        for v in values {
            bits += self.size(v, field, ctx)?;
        }
        Ok(bits)
    }
}
