//! Pair Connection State Machine
//!
//! Defines the connection phases of one bridge/device pair and the pure
//! reducer that advances them in response to management API outcomes.

use std::fmt;

use crate::api::{
    Bridge, ConnectBridgeResponse, ConnectDeviceResponse, ConnectionStatus, DescribeBridgeResponse,
    Device, DeviceStatusResponse, ListDevicesResponse, SenseConfigureResponse,
    StreamConfigureResponse, StreamConfigureStatus,
};
use crate::identity::PairName;
use crate::polling;
use crate::predicates::{bridge_connected, device_connected};

/// Connection phases, ordered so that later phases are "more connected".
///
/// The error and disconnected phases sort below `Unknown`, which keeps them
/// out of every `>=` progress comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectionState {
    ErrorBridge,
    ErrorDevice,
    Disconnected,
    Unknown,
    ScanningBridge,
    NotConnectedBridge,
    NotFoundBridge,
    DiscoveredBridge,
    ConnectingBridge,
    ConnectedBridge,
    ScanningDevice,
    NotFoundDevice,
    DiscoveredDevice,
    ConnectingDevice,
    ConnectedDevice,
    Streaming,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::ErrorBridge => "error-bridge",
            ConnectionState::ErrorDevice => "error-device",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Unknown => "unknown",
            ConnectionState::ScanningBridge => "scanning-bridge",
            ConnectionState::NotConnectedBridge => "not-connected-bridge",
            ConnectionState::NotFoundBridge => "not-found-bridge",
            ConnectionState::DiscoveredBridge => "discovered-bridge",
            ConnectionState::ConnectingBridge => "connecting-bridge",
            ConnectionState::ConnectedBridge => "connected-bridge",
            ConnectionState::ScanningDevice => "scanning-device",
            ConnectionState::NotFoundDevice => "not-found-device",
            ConnectionState::DiscoveredDevice => "discovered-device",
            ConnectionState::ConnectingDevice => "connecting-device",
            ConnectionState::ConnectedDevice => "connected-device",
            ConnectionState::Streaming => "streaming",
        }
    }

    /// Phases whose entry invalidates both battery readings
    fn drops_link(self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected | ConnectionState::ErrorBridge | ConnectionState::ErrorDevice
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current connection state of one bridge/device pair
#[derive(Debug, Clone, PartialEq)]
pub struct PairState {
    pub name: PairName,
    pub phase: ConnectionState,
    pub previous: ConnectionState,
    pub bridge_battery: i32,
    pub device_battery: i32,
    pub connection_attempts: u32,
    pub error: Option<String>,
}

impl PairState {
    /// A freshly configured pair in the `Unknown` phase
    pub fn new(name: PairName) -> Self {
        Self {
            name,
            phase: ConnectionState::Unknown,
            previous: ConnectionState::Unknown,
            bridge_battery: polling::BATTERY_UNKNOWN,
            device_battery: polling::BATTERY_UNKNOWN,
            connection_attempts: 0,
            error: None,
        }
    }

    /// Move to `phase`, keeping `previous` and batteries consistent
    fn enter(mut self, phase: ConnectionState) -> Self {
        if phase == self.phase {
            return self;
        }
        self.previous = self.phase;
        self.phase = phase;
        if phase.drops_link() {
            self.bridge_battery = polling::BATTERY_UNKNOWN;
            self.device_battery = polling::BATTERY_UNKNOWN;
        }
        self
    }

    fn fail(self, phase: ConnectionState, message: impl Into<String>) -> Self {
        let mut next = self.enter(phase);
        next.error = Some(message.into());
        next
    }
}

/// Inputs to the reducer.
///
/// Start events are issued right before an API call, success events carry
/// the call's response, and failure events carry the call's error text.
/// Every per-pair event names its target pair; events addressed to another
/// name leave the state untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ConnectedBridges { name: String },
    ConnectedBridgesSuccess { name: String, bridges: Vec<Bridge> },
    /// The connected-bridges query itself failed; applies to every pair
    ConnectedBridgesFailure { message: String },
    ListBridges { name: String },
    ListBridgesSuccess { name: String, bridges: Vec<Bridge> },
    /// The bridge listing itself failed; applies to every pair
    ListBridgesFailure { message: String },
    ConnectBridge { name: String },
    ConnectBridgeSuccess { name: String, response: ConnectBridgeResponse },
    ConnectBridgeFailure { name: String, message: String },
    DisconnectBridge { name: String },
    BridgeStatusSuccess { name: String, response: DescribeBridgeResponse },
    /// Bridge status, beep or disconnect call failed
    BridgeFailure { name: String, message: String },
    ListDevices { name: String },
    ListDevicesSuccess { name: String, response: ListDevicesResponse },
    ConnectDevice { name: String },
    ConnectDeviceSuccess { name: String, response: ConnectDeviceResponse },
    DisconnectDevice { name: String },
    DeviceStatusSuccess { name: String, response: DeviceStatusResponse },
    SenseConfigured { name: String, response: SenseConfigureResponse },
    StreamEnabled { name: String, response: StreamConfigureResponse },
    StreamDisabled { name: String, response: StreamConfigureResponse },
    /// Any device-side call failed (listing, connect, status, sense, stream, integrity)
    DeviceFailure { name: String, message: String },
    ResetConnection { name: String },
}

impl Event {
    /// The pair this event is addressed to, or `None` for system-wide events
    pub fn target(&self) -> Option<&str> {
        match self {
            Event::ConnectedBridgesFailure { .. } | Event::ListBridgesFailure { .. } => None,
            Event::ConnectedBridges { name }
            | Event::ConnectedBridgesSuccess { name, .. }
            | Event::ListBridges { name }
            | Event::ListBridgesSuccess { name, .. }
            | Event::ConnectBridge { name }
            | Event::ConnectBridgeSuccess { name, .. }
            | Event::ConnectBridgeFailure { name, .. }
            | Event::DisconnectBridge { name }
            | Event::BridgeStatusSuccess { name, .. }
            | Event::BridgeFailure { name, .. }
            | Event::ListDevices { name }
            | Event::ListDevicesSuccess { name, .. }
            | Event::ConnectDevice { name }
            | Event::ConnectDeviceSuccess { name, .. }
            | Event::DisconnectDevice { name }
            | Event::DeviceStatusSuccess { name, .. }
            | Event::SenseConfigured { name, .. }
            | Event::StreamEnabled { name, .. }
            | Event::StreamDisabled { name, .. }
            | Event::DeviceFailure { name, .. }
            | Event::ResetConnection { name } => Some(name),
        }
    }

    pub fn is_system_wide(&self) -> bool {
        self.target().is_none()
    }
}

/// Advance one pair's state by one event.
///
/// Pure and total: an event addressed to another pair, or one whose
/// precondition the current phase does not meet, returns the state as is.
pub fn reduce(state: PairState, event: &Event) -> PairState {
    use ConnectionState::*;

    if let Some(target) = event.target() {
        if target != state.name.as_str() {
            return state;
        }
    }

    match event {
        // The connected-bridges listing can report a bridge that has gone
        // dark, so a pair stuck at NotFoundDevice is allowed to re-validate.
        Event::ConnectedBridges { .. } => match state.phase {
            Unknown | Disconnected | NotFoundDevice => state.enter(ScanningBridge),
            _ => state,
        },
        Event::ConnectedBridgesSuccess { bridges, .. } if state.phase == ScanningBridge => {
            if state.name.matches_any(bridges.iter().map(|b| b.name.as_str())) {
                state.enter(ConnectedBridge)
            } else {
                state.enter(NotConnectedBridge)
            }
        }
        Event::ListBridges { .. } => match state.phase {
            Unknown | Disconnected | NotFoundDevice | NotConnectedBridge => {
                state.enter(ScanningBridge)
            }
            _ => state,
        },
        Event::ListBridgesSuccess { bridges, .. } if state.phase == ScanningBridge => {
            if state.name.matches_any(bridges.iter().map(|b| b.name.as_str())) {
                state.enter(DiscoveredBridge)
            } else {
                state.enter(NotFoundBridge)
            }
        }
        Event::ConnectedBridgesFailure { message } | Event::ListBridgesFailure { message } => {
            state.fail(ErrorBridge, message.as_str())
        }
        Event::ConnectBridge { .. } if state.phase == DiscoveredBridge => {
            state.enter(ConnectingBridge)
        }
        Event::ConnectBridgeSuccess { response, .. } if state.phase == ConnectingBridge => {
            connect_bridge_outcome(state, response)
        }
        Event::ConnectBridgeFailure { message, .. } | Event::BridgeFailure { message, .. } => {
            state.fail(ErrorBridge, message.as_str())
        }
        Event::DisconnectBridge { .. } if state.phase == ConnectedBridge => {
            state.enter(Disconnected)
        }
        Event::BridgeStatusSuccess { response, .. } => bridge_status(state, response),
        Event::ListDevices { .. } if state.phase == ConnectedBridge => state.enter(ScanningDevice),
        Event::ListDevicesSuccess { response, .. } if state.phase == ScanningDevice => {
            list_devices_outcome(state, response)
        }
        Event::ConnectDevice { .. } if state.phase == DiscoveredDevice => {
            state.enter(ConnectingDevice)
        }
        Event::ConnectDeviceSuccess { response, .. } if state.phase == ConnectingDevice => {
            match response.status() {
                ConnectionStatus::ConnectionSuccess => state.enter(ConnectedDevice),
                ConnectionStatus::ConnectionFailure | ConnectionStatus::Unspecified => {
                    let reason = response.failure_reason();
                    state.fail(ErrorDevice, reason)
                }
            }
        }
        Event::DisconnectDevice { .. } if device_connected(&state) => state.enter(Disconnected),
        Event::DeviceStatusSuccess { response, .. } => device_status(state, response),
        Event::SenseConfigured { response, .. } => match &response.error {
            Some(error) if error.rejection().is_some() => {
                let message = error.message.clone();
                state.fail(Disconnected, message)
            }
            _ => state,
        },
        Event::StreamEnabled { response, .. } if device_connected(&state) => {
            stream_outcome(state, response, Streaming)
        }
        Event::StreamDisabled { response, .. } if device_connected(&state) => {
            stream_outcome(state, response, ConnectedDevice)
        }
        // The server can dispose a pair's resources while a status call is
        // still pending; that surfaces as a failure but is a disconnect.
        Event::DeviceFailure { message, .. } => {
            if message.contains(polling::DISPOSED_RACE) {
                state.fail(Disconnected, message.as_str())
            } else {
                state.fail(ErrorDevice, message.as_str())
            }
        }
        Event::ResetConnection { .. } => {
            let mut next = state.enter(Unknown);
            next.bridge_battery = polling::BATTERY_UNKNOWN;
            next.device_battery = polling::BATTERY_UNKNOWN;
            next.connection_attempts = 0;
            next.error = None;
            next
        }
        _ => state,
    }
}

fn connect_bridge_outcome(mut state: PairState, response: &ConnectBridgeResponse) -> PairState {
    if response.status() == ConnectionStatus::ConnectionSuccess {
        state.connection_attempts = 0;
        return state.enter(ConnectionState::ConnectedBridge);
    }

    if response.is_soft_failure() {
        state.connection_attempts += 1;
        return if state.connection_attempts >= polling::SOFT_FAILURE_LIMIT {
            state.enter(ConnectionState::NotFoundBridge)
        } else {
            state.enter(ConnectionState::Disconnected)
        };
    }

    let reason = response.failure_reason();
    state.fail(ConnectionState::ErrorBridge, reason)
}

fn bridge_status(mut state: PairState, response: &DescribeBridgeResponse) -> PairState {
    if let Some(error) = &response.error {
        if error.rejection().is_some_and(|code| code.bridge_dark()) {
            let message = error.message.clone();
            return state.fail(ConnectionState::Disconnected, message);
        }
    }

    if bridge_connected(&state) {
        if let Ok(details) = response.bridge_details() {
            state.bridge_battery = details.battery_level;
        }
    }
    state
}

fn list_devices_outcome(state: PairState, response: &ListDevicesResponse) -> PairState {
    // TODO: confirm with a device status call before trusting the
    // already-connected shortcut; a dark device can still be reported here.
    if response.already_connected() {
        return state.enter(ConnectionState::ConnectedDevice);
    }

    let found = state
        .name
        .matches_any(response.devices.iter().map(|d: &Device| d.name.as_str()));
    if found {
        state.enter(ConnectionState::DiscoveredDevice)
    } else {
        state.enter(ConnectionState::NotFoundDevice)
    }
}

fn device_status(mut state: PairState, response: &DeviceStatusResponse) -> PairState {
    if let Some(error) = &response.error {
        if error.rejection().is_some() {
            let message = error.message.clone();
            return state.fail(ConnectionState::Disconnected, message);
        }
    }

    if device_connected(&state) {
        state.device_battery = response
            .battery_level_percent
            .map(|level| level as i32)
            .unwrap_or(polling::BATTERY_UNKNOWN);
    }
    state
}

fn stream_outcome(
    state: PairState,
    response: &StreamConfigureResponse,
    on_success: ConnectionState,
) -> PairState {
    match response.status() {
        StreamConfigureStatus::Success => state.enter(on_success),
        StreamConfigureStatus::Unknown | StreamConfigureStatus::Failure => {
            let message = response
                .error
                .as_ref()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| "stream configuration failed".to_string());
            state.fail(ConnectionState::Disconnected, message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{
        BridgeDetails, ConnectBridgeDetails, ConnectDeviceDetails, RejectCode, SummitError,
    };
    use bytes::Bytes;
    use prost::Message;

    const LEFT: &str = "//summit/bridge/foo/device/bar";
    const RIGHT: &str = "//summit/bridge/bar/device/baz";

    fn pair(name: &str, phase: ConnectionState) -> PairState {
        let mut state = PairState::new(PairName::parse(name).unwrap());
        state.phase = phase;
        state
    }

    fn bridges(names: &[&str]) -> Vec<Bridge> {
        names
            .iter()
            .map(|n| Bridge {
                name: n.to_string(),
            })
            .collect()
    }

    fn connect_bridge(status: ConnectionStatus, detail: Option<i32>) -> Event {
        Event::ConnectBridgeSuccess {
            name: LEFT.into(),
            response: ConnectBridgeResponse {
                name: "//summit/bridge/foo".into(),
                connection_status: status.into(),
                details: detail.map(|code| ConnectBridgeDetails {
                    connection_status: code,
                }),
            },
        }
    }

    fn soft_failure() -> Event {
        connect_bridge(
            ConnectionStatus::ConnectionFailure,
            Some(polling::SOFT_FAILURE_CODE),
        )
    }

    fn every_event(name: &str) -> Vec<Event> {
        let n = name.to_string();
        vec![
            Event::ConnectedBridges { name: n.clone() },
            Event::ConnectedBridgesSuccess {
                name: n.clone(),
                bridges: bridges(&[LEFT, RIGHT]),
            },
            Event::ConnectedBridgesSuccess {
                name: n.clone(),
                bridges: bridges(&["//summit/bridge/other"]),
            },
            Event::ListBridges { name: n.clone() },
            Event::ListBridgesSuccess {
                name: n.clone(),
                bridges: bridges(&[LEFT, RIGHT]),
            },
            Event::ConnectBridge { name: n.clone() },
            Event::ConnectBridgeSuccess {
                name: n.clone(),
                response: ConnectBridgeResponse {
                    name: n.clone(),
                    connection_status: ConnectionStatus::ConnectionSuccess.into(),
                    details: None,
                },
            },
            Event::ConnectBridgeFailure {
                name: n.clone(),
                message: "boom".into(),
            },
            Event::DisconnectBridge { name: n.clone() },
            Event::BridgeStatusSuccess {
                name: n.clone(),
                response: DescribeBridgeResponse {
                    name: n.clone(),
                    details: Bytes::from(BridgeDetails { battery_level: 10 }.encode_to_vec()),
                    error: None,
                },
            },
            Event::BridgeFailure {
                name: n.clone(),
                message: "boom".into(),
            },
            Event::ListDevices { name: n.clone() },
            Event::ListDevicesSuccess {
                name: n.clone(),
                response: ListDevicesResponse::default(),
            },
            Event::ConnectDevice { name: n.clone() },
            Event::ConnectDeviceSuccess {
                name: n.clone(),
                response: ConnectDeviceResponse {
                    name: n.clone(),
                    connection_status: ConnectionStatus::ConnectionSuccess.into(),
                    details: None,
                },
            },
            Event::DisconnectDevice { name: n.clone() },
            Event::DeviceStatusSuccess {
                name: n.clone(),
                response: DeviceStatusResponse {
                    battery_level_percent: Some(50),
                    error: None,
                },
            },
            Event::SenseConfigured {
                name: n.clone(),
                response: SenseConfigureResponse {
                    error: Some(SummitError::rejected(RejectCode::NoCtmConnected, "dark")),
                },
            },
            Event::StreamEnabled {
                name: n.clone(),
                response: StreamConfigureResponse {
                    stream_configure_status: StreamConfigureStatus::Success.into(),
                    error: None,
                },
            },
            Event::StreamDisabled {
                name: n.clone(),
                response: StreamConfigureResponse {
                    stream_configure_status: StreamConfigureStatus::Failure.into(),
                    error: None,
                },
            },
            Event::DeviceFailure {
                name: n.clone(),
                message: "boom".into(),
            },
            Event::ResetConnection { name: n },
        ]
    }

    #[test]
    fn test_initial_state() {
        let state = PairState::new(PairName::parse(LEFT).unwrap());
        assert_eq!(state.phase, ConnectionState::Unknown);
        assert_eq!(state.previous, ConnectionState::Unknown);
        assert_eq!(state.bridge_battery, -1);
        assert_eq!(state.device_battery, -1);
        assert_eq!(state.connection_attempts, 0);
        assert_eq!(state.error, None);
    }

    #[test]
    fn test_phase_ordering() {
        use ConnectionState::*;
        assert!(Streaming > ConnectedDevice);
        assert!(ConnectedDevice > ConnectedBridge);
        assert!(NotFoundDevice > ConnectedBridge);
        assert!(Disconnected < Unknown);
        assert!(ErrorBridge < Unknown);
        assert!(ErrorDevice < ConnectedBridge);
    }

    #[test]
    fn test_events_for_other_pairs_are_ignored() {
        for phase in [
            ConnectionState::Unknown,
            ConnectionState::ScanningBridge,
            ConnectionState::DiscoveredBridge,
            ConnectionState::ConnectedBridge,
            ConnectionState::ScanningDevice,
            ConnectionState::ConnectedDevice,
            ConnectionState::Streaming,
        ] {
            let mut state = pair(LEFT, phase);
            state.bridge_battery = 80;
            state.device_battery = 70;
            for event in every_event(RIGHT) {
                assert_eq!(reduce(state.clone(), &event), state, "{event:?} leaked");
            }
        }
    }

    #[test]
    fn test_list_bridges_not_found_scenario() {
        let state = pair(LEFT, ConnectionState::Unknown);

        let state = reduce(state, &Event::ListBridges { name: LEFT.into() });
        assert_eq!(state.phase, ConnectionState::ScanningBridge);

        let state = reduce(
            state,
            &Event::ListBridgesSuccess {
                name: LEFT.into(),
                bridges: vec![],
            },
        );
        assert_eq!(state.phase, ConnectionState::NotFoundBridge);
        assert_eq!(state.previous, ConnectionState::ScanningBridge);
    }

    #[test]
    fn test_list_bridges_discovers_by_prefix() {
        let state = pair(LEFT, ConnectionState::ScanningBridge);
        let state = reduce(
            state,
            &Event::ListBridgesSuccess {
                name: LEFT.into(),
                bridges: bridges(&["//summit/bridge/baz", "//summit/bridge/foo"]),
            },
        );
        assert_eq!(state.phase, ConnectionState::DiscoveredBridge);
    }

    #[test]
    fn test_connected_bridges_query() {
        let state = reduce(
            pair(LEFT, ConnectionState::Disconnected),
            &Event::ConnectedBridges { name: LEFT.into() },
        );
        assert_eq!(state.phase, ConnectionState::ScanningBridge);

        let connected = reduce(
            state.clone(),
            &Event::ConnectedBridgesSuccess {
                name: LEFT.into(),
                bridges: bridges(&[LEFT, RIGHT]),
            },
        );
        assert_eq!(connected.phase, ConnectionState::ConnectedBridge);
        assert_eq!(connected.previous, ConnectionState::ScanningBridge);

        let not_connected = reduce(
            state,
            &Event::ConnectedBridgesSuccess {
                name: LEFT.into(),
                bridges: vec![],
            },
        );
        assert_eq!(not_connected.phase, ConnectionState::NotConnectedBridge);
    }

    #[test]
    fn test_connected_bridges_ignored_while_connected() {
        let state = pair(LEFT, ConnectionState::ConnectedBridge);
        let next = reduce(state.clone(), &Event::ConnectedBridges { name: LEFT.into() });
        assert_eq!(next, state);
    }

    #[test]
    fn test_listing_failure_is_system_wide() {
        let message = "failure message";
        for event in [
            Event::ListBridgesFailure {
                message: message.into(),
            },
            Event::ConnectedBridgesFailure {
                message: message.into(),
            },
        ] {
            let left = reduce(pair(LEFT, ConnectionState::ScanningBridge), &event);
            let right = reduce(pair(RIGHT, ConnectionState::ConnectedBridge), &event);

            assert_eq!(left.phase, ConnectionState::ErrorBridge);
            assert_eq!(left.previous, ConnectionState::ScanningBridge);
            assert_eq!(left.error.as_deref(), Some(message));

            assert_eq!(right.phase, ConnectionState::ErrorBridge);
            assert_eq!(right.previous, ConnectionState::ConnectedBridge);
            assert_eq!(right.error.as_deref(), Some(message));
        }
    }

    #[test]
    fn test_connect_bridge_requires_discovery() {
        let state = pair(LEFT, ConnectionState::Unknown);
        let next = reduce(state.clone(), &Event::ConnectBridge { name: LEFT.into() });
        assert_eq!(next, state);

        let next = reduce(
            pair(LEFT, ConnectionState::DiscoveredBridge),
            &Event::ConnectBridge { name: LEFT.into() },
        );
        assert_eq!(next.phase, ConnectionState::ConnectingBridge);
        assert_eq!(next.previous, ConnectionState::DiscoveredBridge);
    }

    #[test]
    fn test_connect_bridge_success_resets_attempts() {
        let mut state = pair(LEFT, ConnectionState::ConnectingBridge);
        state.connection_attempts = 2;

        let state = reduce(state, &connect_bridge(ConnectionStatus::ConnectionSuccess, None));
        assert_eq!(state.phase, ConnectionState::ConnectedBridge);
        assert_eq!(state.previous, ConnectionState::ConnectingBridge);
        assert_eq!(state.connection_attempts, 0);
    }

    #[test]
    fn test_soft_failures_escalate_after_three_attempts() {
        let mut state = pair(LEFT, ConnectionState::ConnectingBridge);

        for attempt in 1..polling::SOFT_FAILURE_LIMIT {
            state = reduce(state, &soft_failure());
            assert_eq!(state.phase, ConnectionState::Disconnected);
            assert_eq!(state.connection_attempts, attempt);
            assert_eq!(state.error, None);
            state.phase = ConnectionState::ConnectingBridge;
        }

        state = reduce(state, &soft_failure());
        assert_eq!(state.phase, ConnectionState::NotFoundBridge);
        assert_eq!(state.connection_attempts, polling::SOFT_FAILURE_LIMIT);
    }

    #[test]
    fn test_hard_connect_failure_errors() {
        let state = reduce(
            pair(LEFT, ConnectionState::ConnectingBridge),
            &connect_bridge(ConnectionStatus::ConnectionFailure, None),
        );
        assert_eq!(state.phase, ConnectionState::ErrorBridge);
        assert_eq!(state.error.as_deref(), Some("CONNECTION_FAILURE"));

        let state = reduce(
            pair(LEFT, ConnectionState::ConnectingBridge),
            &connect_bridge(ConnectionStatus::Unspecified, Some(9)),
        );
        assert_eq!(state.phase, ConnectionState::ErrorBridge);
        assert_eq!(state.connection_attempts, 0);
    }

    #[test]
    fn test_connect_bridge_call_failure() {
        let state = reduce(
            pair(LEFT, ConnectionState::ConnectingBridge),
            &Event::ConnectBridgeFailure {
                name: LEFT.into(),
                message: "unavailable".into(),
            },
        );
        assert_eq!(state.phase, ConnectionState::ErrorBridge);
        assert_eq!(state.previous, ConnectionState::ConnectingBridge);
        assert_eq!(state.error.as_deref(), Some("unavailable"));
    }

    #[test]
    fn test_disconnect_bridge() {
        let state = pair(LEFT, ConnectionState::Unknown);
        assert_eq!(
            reduce(state.clone(), &Event::DisconnectBridge { name: LEFT.into() }),
            state
        );

        let mut state = pair(LEFT, ConnectionState::ConnectedBridge);
        state.bridge_battery = 70;
        let state = reduce(state, &Event::DisconnectBridge { name: LEFT.into() });
        assert_eq!(state.phase, ConnectionState::Disconnected);
        assert_eq!(state.previous, ConnectionState::ConnectedBridge);
        assert_eq!(state.bridge_battery, -1);
    }

    #[test]
    fn test_list_devices_outcomes() {
        let scanning = reduce(
            pair(LEFT, ConnectionState::ConnectedBridge),
            &Event::ListDevices { name: LEFT.into() },
        );
        assert_eq!(scanning.phase, ConnectionState::ScanningDevice);

        let found = reduce(
            scanning.clone(),
            &Event::ListDevicesSuccess {
                name: LEFT.into(),
                response: ListDevicesResponse {
                    devices: vec![Device { name: LEFT.into() }],
                    error: None,
                },
            },
        );
        assert_eq!(found.phase, ConnectionState::DiscoveredDevice);

        let missing = reduce(
            scanning.clone(),
            &Event::ListDevicesSuccess {
                name: LEFT.into(),
                response: ListDevicesResponse::default(),
            },
        );
        assert_eq!(missing.phase, ConnectionState::NotFoundDevice);

        let attached = reduce(
            scanning,
            &Event::ListDevicesSuccess {
                name: LEFT.into(),
                response: ListDevicesResponse {
                    devices: vec![],
                    error: Some(SummitError {
                        reject_code: None,
                        message: polling::ALREADY_CONNECTED.into(),
                    }),
                },
            },
        );
        assert_eq!(attached.phase, ConnectionState::ConnectedDevice);
        assert_eq!(attached.previous, ConnectionState::ScanningDevice);
    }

    #[test]
    fn test_list_devices_does_not_leak_across_pairs() {
        let left = pair(LEFT, ConnectionState::ScanningDevice);
        let right = pair(RIGHT, ConnectionState::ScanningDevice);
        let event = Event::ListDevicesSuccess {
            name: LEFT.into(),
            response: ListDevicesResponse {
                devices: vec![Device { name: LEFT.into() }, Device { name: RIGHT.into() }],
                error: None,
            },
        };

        assert_eq!(reduce(left, &event).phase, ConnectionState::DiscoveredDevice);
        assert_eq!(reduce(right.clone(), &event), right);
    }

    #[test]
    fn test_connect_device() {
        let connecting = reduce(
            pair(LEFT, ConnectionState::DiscoveredDevice),
            &Event::ConnectDevice { name: LEFT.into() },
        );
        assert_eq!(connecting.phase, ConnectionState::ConnectingDevice);

        let connected = reduce(
            connecting.clone(),
            &Event::ConnectDeviceSuccess {
                name: LEFT.into(),
                response: ConnectDeviceResponse {
                    name: LEFT.into(),
                    connection_status: ConnectionStatus::ConnectionSuccess.into(),
                    details: None,
                },
            },
        );
        assert_eq!(connected.phase, ConnectionState::ConnectedDevice);
        assert_eq!(connected.previous, ConnectionState::ConnectingDevice);

        let rejected = reduce(
            connecting,
            &Event::ConnectDeviceSuccess {
                name: LEFT.into(),
                response: ConnectDeviceResponse {
                    name: LEFT.into(),
                    connection_status: ConnectionStatus::Unspecified.into(),
                    details: Some(ConnectDeviceDetails {
                        connection_status: "failure message".into(),
                    }),
                },
            },
        );
        assert_eq!(rejected.phase, ConnectionState::ErrorDevice);
        assert_eq!(rejected.error.as_deref(), Some("failure message"));
    }

    #[test]
    fn test_disconnect_device_resets_batteries() {
        let mut state = pair(LEFT, ConnectionState::ConnectedDevice);
        state.bridge_battery = 80;
        state.device_battery = 60;

        let state = reduce(state, &Event::DisconnectDevice { name: LEFT.into() });
        assert_eq!(state.phase, ConnectionState::Disconnected);
        assert_eq!(state.previous, ConnectionState::ConnectedDevice);
        assert_eq!(state.bridge_battery, -1);
        assert_eq!(state.device_battery, -1);
    }

    #[test]
    fn test_disconnect_device_requires_connection() {
        let state = pair(LEFT, ConnectionState::DiscoveredDevice);
        let next = reduce(state.clone(), &Event::DisconnectDevice { name: LEFT.into() });
        assert_eq!(next, state);
    }

    #[test]
    fn test_bridge_status_updates_battery() {
        let response = DescribeBridgeResponse {
            name: "//summit/bridge/foo".into(),
            details: Bytes::from(BridgeDetails { battery_level: 42 }.encode_to_vec()),
            error: None,
        };
        let event = Event::BridgeStatusSuccess {
            name: LEFT.into(),
            response,
        };

        let state = reduce(pair(LEFT, ConnectionState::ConnectedDevice), &event);
        assert_eq!(state.bridge_battery, 42);
        assert_eq!(state.phase, ConnectionState::ConnectedDevice);

        // readings are meaningless before the bridge is connected
        let state = reduce(pair(LEFT, ConnectionState::ScanningBridge), &event);
        assert_eq!(state.bridge_battery, -1);
    }

    #[test]
    fn test_bridge_status_rejection_disconnects() {
        let mut state = pair(LEFT, ConnectionState::ConnectedDevice);
        state.bridge_battery = 55;
        state.device_battery = 66;

        let state = reduce(
            state,
            &Event::BridgeStatusSuccess {
                name: LEFT.into(),
                response: DescribeBridgeResponse {
                    name: "//summit/bridge/foo".into(),
                    details: Bytes::new(),
                    error: Some(SummitError::rejected(RejectCode::NoCtmConnected, "faliure message")),
                },
            },
        );
        assert_eq!(state.phase, ConnectionState::Disconnected);
        assert_eq!(state.bridge_battery, -1);
        assert_eq!(state.device_battery, -1);
        assert_eq!(state.error.as_deref(), Some("faliure message"));
    }

    #[test]
    fn test_bridge_status_other_rejection_keeps_phase() {
        let state = pair(LEFT, ConnectionState::ConnectedBridge);
        let next = reduce(
            state,
            &Event::BridgeStatusSuccess {
                name: LEFT.into(),
                response: DescribeBridgeResponse {
                    name: "//summit/bridge/foo".into(),
                    details: Bytes::from(BridgeDetails { battery_level: 10 }.encode_to_vec()),
                    error: Some(SummitError::rejected(RejectCode::InsCommandRejected, "busy")),
                },
            },
        );
        assert_eq!(next.phase, ConnectionState::ConnectedBridge);
        assert_eq!(next.bridge_battery, 10);
    }

    #[test]
    fn test_device_status() {
        let state = reduce(
            pair(LEFT, ConnectionState::ConnectedDevice),
            &Event::DeviceStatusSuccess {
                name: LEFT.into(),
                response: DeviceStatusResponse {
                    battery_level_percent: Some(73),
                    error: None,
                },
            },
        );
        assert_eq!(state.phase, ConnectionState::ConnectedDevice);
        assert_eq!(state.device_battery, 73);
        assert_eq!(state.previous, ConnectionState::Unknown);

        let state = reduce(
            state,
            &Event::DeviceStatusSuccess {
                name: LEFT.into(),
                response: DeviceStatusResponse {
                    battery_level_percent: None,
                    error: Some(SummitError::rejected(RejectCode::NoCtmConnected, "faliure message")),
                },
            },
        );
        assert_eq!(state.phase, ConnectionState::Disconnected);
        assert_eq!(state.device_battery, -1);
        assert_eq!(state.error.as_deref(), Some("faliure message"));
    }

    #[test]
    fn test_device_failure_and_disposed_race() {
        let failed = reduce(
            pair(LEFT, ConnectionState::ScanningDevice),
            &Event::DeviceFailure {
                name: LEFT.into(),
                message: "failure message".into(),
            },
        );
        assert_eq!(failed.phase, ConnectionState::ErrorDevice);
        assert_eq!(failed.previous, ConnectionState::ScanningDevice);
        assert_eq!(failed.error.as_deref(), Some("failure message"));

        let raced = reduce(
            pair(LEFT, ConnectionState::ConnectedDevice),
            &Event::DeviceFailure {
                name: LEFT.into(),
                message: "Exception was thrown by handler: device-status null".into(),
            },
        );
        assert_eq!(raced.phase, ConnectionState::Disconnected);
    }

    #[test]
    fn test_stream_enable_and_disable() {
        let ok = StreamConfigureResponse {
            stream_configure_status: StreamConfigureStatus::Success.into(),
            error: None,
        };

        let streaming = reduce(
            pair(LEFT, ConnectionState::ConnectedDevice),
            &Event::StreamEnabled {
                name: LEFT.into(),
                response: ok.clone(),
            },
        );
        assert_eq!(streaming.phase, ConnectionState::Streaming);

        let stopped = reduce(
            streaming,
            &Event::StreamDisabled {
                name: LEFT.into(),
                response: ok.clone(),
            },
        );
        assert_eq!(stopped.phase, ConnectionState::ConnectedDevice);
        assert_eq!(stopped.previous, ConnectionState::Streaming);

        // not device-connected: nothing to stream
        let state = pair(LEFT, ConnectionState::ConnectedBridge);
        let next = reduce(
            state.clone(),
            &Event::StreamEnabled {
                name: LEFT.into(),
                response: ok,
            },
        );
        assert_eq!(next, state);
    }

    #[test]
    fn test_stream_failure_disconnects() {
        let mut state = pair(LEFT, ConnectionState::ConnectedDevice);
        state.device_battery = 90;
        let state = reduce(
            state,
            &Event::StreamEnabled {
                name: LEFT.into(),
                response: StreamConfigureResponse {
                    stream_configure_status: StreamConfigureStatus::Failure.into(),
                    error: Some(SummitError {
                        reject_code: None,
                        message: "no sense".into(),
                    }),
                },
            },
        );
        assert_eq!(state.phase, ConnectionState::Disconnected);
        assert_eq!(state.device_battery, -1);
        assert_eq!(state.error.as_deref(), Some("no sense"));
    }

    #[test]
    fn test_sense_configuration() {
        let state = pair(LEFT, ConnectionState::ConnectedDevice);
        let ok = reduce(
            state.clone(),
            &Event::SenseConfigured {
                name: LEFT.into(),
                response: SenseConfigureResponse { error: None },
            },
        );
        assert_eq!(ok, state);

        let dark = reduce(
            state,
            &Event::SenseConfigured {
                name: LEFT.into(),
                response: SenseConfigureResponse {
                    error: Some(SummitError::rejected(RejectCode::CtmCommandTimeout, "timeout")),
                },
            },
        );
        assert_eq!(dark.phase, ConnectionState::Disconnected);
    }

    #[test]
    fn test_every_link_drop_resets_batteries() {
        let drops: Vec<(ConnectionState, Event)> = vec![
            (
                ConnectionState::ConnectedDevice,
                Event::DeviceFailure {
                    name: LEFT.into(),
                    message: "boom".into(),
                },
            ),
            (
                ConnectionState::ConnectedDevice,
                Event::BridgeFailure {
                    name: LEFT.into(),
                    message: "boom".into(),
                },
            ),
            (
                ConnectionState::Streaming,
                Event::ListBridgesFailure {
                    message: "boom".into(),
                },
            ),
            (ConnectionState::ConnectingBridge, soft_failure()),
        ];

        for (phase, event) in drops {
            let mut state = pair(LEFT, phase);
            state.bridge_battery = 50;
            state.device_battery = 50;
            let next = reduce(state, &event);
            assert!(
                matches!(
                    next.phase,
                    ConnectionState::Disconnected
                        | ConnectionState::ErrorBridge
                        | ConnectionState::ErrorDevice
                ),
                "{event:?}"
            );
            assert_eq!(next.bridge_battery, -1, "{event:?}");
            assert_eq!(next.device_battery, -1, "{event:?}");
        }
    }

    #[test]
    fn test_previous_state_only_written_on_change() {
        let mut state = pair(LEFT, ConnectionState::ErrorBridge);
        state.previous = ConnectionState::ScanningBridge;

        let next = reduce(
            state,
            &Event::ListBridgesFailure {
                message: "again".into(),
            },
        );
        assert_eq!(next.phase, ConnectionState::ErrorBridge);
        assert_eq!(next.previous, ConnectionState::ScanningBridge);
        assert_eq!(next.error.as_deref(), Some("again"));
    }

    #[test]
    fn test_reset_connection() {
        let mut state = pair(LEFT, ConnectionState::ErrorDevice);
        state.error = Some("boom".into());
        state.connection_attempts = 2;

        let state = reduce(state, &Event::ResetConnection { name: LEFT.into() });
        assert_eq!(state.phase, ConnectionState::Unknown);
        assert_eq!(state.previous, ConnectionState::ErrorDevice);
        assert_eq!(state.error, None);
        assert_eq!(state.connection_attempts, 0);
        assert_eq!(state.bridge_battery, -1);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let events = vec![
            Event::ConnectedBridges { name: LEFT.into() },
            Event::ConnectedBridgesSuccess {
                name: LEFT.into(),
                bridges: vec![],
            },
            Event::ListBridges { name: LEFT.into() },
            Event::ListBridgesSuccess {
                name: LEFT.into(),
                bridges: bridges(&["//summit/bridge/foo"]),
            },
            Event::ConnectBridge { name: LEFT.into() },
            soft_failure(),
            Event::ConnectedBridges { name: LEFT.into() },
        ];

        let run = || {
            events
                .iter()
                .fold(pair(LEFT, ConnectionState::Unknown), reduce)
        };
        let first = run();
        assert_eq!(first, run());
        assert_eq!(first.phase, ConnectionState::ScanningBridge);
        assert_eq!(first.connection_attempts, 1);
    }
}
