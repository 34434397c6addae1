//! Built-in primitive field codecs (C6): bool, bounded numeric, string,
//! fixed/variable bytes, enum, static, and time. Each implements
//! [`crate::codec_trait::FieldCodec`] and is registered under one or more
//! names in a [`crate::registry::CodecRegistry`] at `Driver::new` time.

mod bool_codec;
mod bytes_codec;
mod enum_codec;
mod numeric;
mod static_codec;
mod string_codec;
mod time_codec;
mod var_bytes_codec;

pub use bool_codec::BoolCodec;
pub use bytes_codec::BytesCodec;
pub use enum_codec::EnumCodec;
pub use numeric::NumericCodec;
pub use static_codec::StaticCodec;
pub use string_codec::StringCodec;
pub use time_codec::{Clock, SystemClock, TimeCodec, TimeUnit};
pub use var_bytes_codec::VarBytesCodec;

use crate::result::{Error, Result};
use crate::schema::FieldDescriptor;

/// Shared helper: reads the `(min, max, resolution)` triple a bounded
/// numeric-flavored codec needs, raising a schema error if bounds are
/// missing. Dynamic-condition tightening happens once per field in
/// `message_codec` before the codec ever sees the descriptor, so by the
/// time a codec reads these options they're already the effective bounds.
pub(crate) fn numeric_bounds(field: &FieldDescriptor) -> Result<(f64, f64, f64)> {
    let min = field
        .options
        .min
        .ok_or_else(|| Error::schema(format!("{}: numeric field missing `min`", field.name)))?;
    let max = field
        .options
        .max
        .ok_or_else(|| Error::schema(format!("{}: numeric field missing `max`", field.name)))?;
    let resolution = field.options.effective_resolution()?;
    Ok((min, max, resolution))
}

/// Number of distinct quantized values in `[min, max]` at `resolution`,
/// i.e. `(max - min) / resolution + 1`.
pub(crate) fn range_count(min: f64, max: f64, resolution: f64) -> u64 {
    (((max - min) / resolution).round() as i64 + 1).max(1) as u64
}
