//! Murmur State - the replicated document and its merge rules
//!
//! Three pieces, owned by each session:
//! - [`StateStore`]: the local copy of peers, messages, counter and theme
//! - [`TimerRegistry`]: every pending deadline (expiry, typing, sync)
//! - [`Reconciler`]: applies received envelopes so that peers converge
//!
//! Everything here is single-writer: each session owns its store outright,
//! so nothing locks.

pub mod reconcile;
pub mod store;
pub mod timers;

pub use reconcile::*;
pub use store::*;
pub use timers::*;
