//! Murmur Wire Protocol - broadcast envelope format
//!
//! Every broadcast delivery carries exactly one envelope:
//! - Kind byte
//! - Fixed little-endian fields
//! - Length-prefixed UTF-8 strings
//!
//! Decoding is total: any malformed input is an error value, never a panic,
//! so a misbehaving peer cannot take a receiver down.

pub mod codec;
pub mod envelope;

pub use codec::*;
pub use envelope::*;
