use thiserror::Error;

pub type Result<A, E = Error> = std::result::Result<A, E>;

/// Crate-wide error type. Variants map to the error kinds a codec can raise:
/// schema problems are fatal at load time, `OutOfRange`/`Underflow`/`Decode`
/// are raised during encode/decode, `NullValue` is caught internally by the
/// message codec to mean "field absent".
#[derive(Debug, Error)]
pub enum Error {
    #[error("schema error: {0}")]
    Schema(String),
    #[error("out of range: {0}")]
    OutOfRange(String),
    #[error("null value")]
    NullValue,
    #[error("bit pool underflow: requested {requested} bits, {available} available")]
    Underflow { requested: usize, available: usize },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("internal error (codec invariant violated): {0}")]
    Internal(String),
    #[error("crypto error: {0}")]
    Crypto(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn schema(msg: impl Into<String>) -> Self {
        Error::Schema(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Error::Decode(msg.into())
    }

    pub fn out_of_range(msg: impl Into<String>) -> Self {
        Error::OutOfRange(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }
}

/// Asserts a schema invariant, raising `Error::Schema` with `what` and the
/// field/message path when `cond` is false. Mirrors the terse `require()`
/// assertion helper codecs use inside `validate()`.
pub fn require(cond: bool, what: impl Into<String>) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(Error::schema(what))
    }
}
