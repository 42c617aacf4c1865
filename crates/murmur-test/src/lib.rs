//! Test harness for murmur
//!
//! Simulates what the broadcast channel actually does to deliveries:
//! - Latency and jitter
//! - Random and burst loss
//! - Reordering
//! - Duplication
//!
//! [`Cluster`] wires several sessions together over chaos links and steps
//! them in virtual-time lockstep, so whole convergence scenarios run in
//! microseconds and reproduce from a seed.

pub mod chaos;
pub mod cluster;

pub use chaos::*;
pub use cluster::*;
