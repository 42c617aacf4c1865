//! Murmur Core - Fundamental types and primitives
//!
//! This crate defines the core types used throughout murmur:
//! - Identifiers (PeerId, MessageId)
//! - Time primitives (Timestamp, Clock)
//! - Shared state entities (Peer, ChatMessage, counter, theme)
//! - Error taxonomy

pub mod error;
pub mod format;
pub mod id;
pub mod model;
pub mod time;

pub use error::*;
pub use id::*;
pub use model::*;
pub use time::*;
