//! Step scheduling for the two bridge/device pairs
//!
//! This module handles:
//! - Choosing the next management call from a pair's phase
//! - Running one scheduler task per pair with at most one call in flight
//! - Adapting the polling cadence to both pairs' progress
//! - Routing operator events and commands into the owning scheduler

mod pair;
pub mod steps;
mod supervisor;

pub use pair::PairEvent;
pub use supervisor::{PairHandle, Supervisor};
