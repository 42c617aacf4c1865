//! In-process broadcast channel
//!
//! Topic-named fan-out between sessions in the same process. The bus is
//! deliberately unreliable in the ways the sync layer must tolerate: there
//! is no delivery confirmation and no self-delivery, and per-subscriber
//! logs are bounded and silently drop history for laggards.

pub mod bus;

pub use bus::*;
