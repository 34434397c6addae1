/// Maximum ID representable in the short (1 byte) form of the default ID codec.
pub const ONE_BYTE_MAX_ID: u32 = (1 << 7) - 1;
/// Maximum ID representable in the long (2 byte) form of the default ID codec.
pub const TWO_BYTE_MAX_ID: u32 = (1 << 15) - 1;

pub const SHORT_FORM_ID_BYTES: usize = 1;
pub const LONG_FORM_ID_BYTES: usize = 2;

/// Default codec group name used when no field, message or group level
/// override picks a more specific codec.
pub fn default_codec_name(version: u32) -> String {
    format!("dccl.default{version}")
}

pub const SECONDS_IN_DAY: i64 = 86_400;

/// `CODE_BITS` for the adaptive arithmetic coder (see `arithmetic` module).
pub const ARITHMETIC_CODE_BITS: u32 = 32;
