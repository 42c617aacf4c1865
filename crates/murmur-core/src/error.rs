//! Error types for murmur
//!
//! Nothing in the reconciliation path is fatal: a payload that fails to
//! decode is counted as malformed and skipped while the session keeps
//! running.

use thiserror::Error;

/// Core murmur errors
#[derive(Error, Debug)]
pub enum MurmurError {
    // Wire errors
    #[error("Buffer too short: expected {expected}, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Unknown envelope kind: 0x{0:02x}")]
    UnknownKind(u8),

    #[error("Unknown theme byte: 0x{0:02x}")]
    UnknownTheme(u8),

    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("Field {field} too long: {len} (max {max})")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Trailing bytes after envelope: {0}")]
    TrailingBytes(usize),
}

/// Result type for murmur operations
pub type MurmurResult<T> = Result<T, MurmurError>;
