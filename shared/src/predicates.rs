//! State-only questions asked by the scheduler and by anything rendering a pair

use std::time::Duration;

use crate::polling;
use crate::state_machine::{ConnectionState, PairState};

pub fn bridge_connected(state: &PairState) -> bool {
    state.phase >= ConnectionState::ConnectedBridge
}

pub fn device_connected(state: &PairState) -> bool {
    state.phase >= ConnectionState::ConnectedDevice
}

/// No further automatic progress without the operator
pub fn terminal_state(state: &PairState) -> bool {
    matches!(
        state.phase,
        ConnectionState::NotFoundBridge
            | ConnectionState::NotFoundDevice
            | ConnectionState::ErrorBridge
            | ConnectionState::ErrorDevice
    )
}

/// Whether polling the management API quickly would be wasted effort
pub fn slow_polling(a: &PairState, b: &PairState) -> bool {
    let settled = |s: &PairState| device_connected(s) || terminal_state(s);
    settled(a) && settled(b)
}

/// Inter-pass sleep intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub fast: Duration,
    pub slow: Duration,
}

impl Default for Cadence {
    fn default() -> Self {
        Self {
            fast: Duration::from_millis(polling::FAST_INTERVAL_MS),
            slow: Duration::from_millis(polling::SLOW_INTERVAL_MS),
        }
    }
}

/// How long a scheduler sleeps after a pass, given both pairs' states
pub fn poll_interval(cadence: &Cadence, own: &PairState, peer: &PairState) -> Duration {
    if slow_polling(own, peer) {
        cadence.slow
    } else {
        cadence.fast
    }
}
