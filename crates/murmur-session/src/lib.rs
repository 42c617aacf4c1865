//! Session layer: a peer's identity and command handling, plus the loop
//! that keeps local state converging with everyone else on the topic
//!
//! - [`Identity`] draws the random peer id and display name
//! - [`Session`] turns user commands into envelopes and feeds received
//!   deliveries through the reconciler
//! - [`drive`] runs a session against a bus subscription on a tokio timer

pub mod identity;
pub mod runner;
pub mod session;

pub use identity::*;
pub use runner::*;
pub use session::*;
