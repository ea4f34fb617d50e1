//! Summit Shared Connection Model
//!
//! This crate provides the pair identity, wire message types, reducer and
//! predicates shared by the link scheduler and anything that renders its
//! state. Nothing in here performs I/O.

pub mod api;
pub mod identity;
pub mod predicates;
pub mod state_machine;

pub use identity::{NameError, PairName, Side};
pub use predicates::{bridge_connected, device_connected, poll_interval, slow_polling, terminal_state, Cadence};
pub use state_machine::{reduce, ConnectionState, Event, PairState};

/// Polling and retry parameters for the management API
pub mod polling {
    /// Cadence while either pair is still converging
    pub const FAST_INTERVAL_MS: u64 = 500;

    /// Cadence once no further progress is possible without the operator
    pub const SLOW_INTERVAL_MS: u64 = 5000;

    /// Consecutive soft bridge-connect failures before the bridge is reported missing
    pub const SOFT_FAILURE_LIMIT: u32 = 3;

    /// Detail code on a failed bridge connect that is worth retrying
    pub const SOFT_FAILURE_CODE: i32 = 4;

    /// Device listing error message meaning the device is already attached
    pub const ALREADY_CONNECTED: &str = "InsAlreadyConnected";

    /// Substring of failures caused by the server disposing a pair mid-call
    pub const DISPOSED_RACE: &str = "device-status";

    /// Battery value while the level is not known
    pub const BATTERY_UNKNOWN: i32 = -1;
}
