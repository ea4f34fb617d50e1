//! Per-phase dispatch table
//!
//! Each [`Step`] is one management call. [`plan`] decides which steps a pair
//! takes in its current phase; [`Step::perform`] makes the call and turns the
//! outcome into the event the reducer consumes.

use summit_shared::{ConnectionState, Event, PairName};

use crate::manager::DeviceManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    QueryConnectedBridges,
    ListBridges,
    ConnectBridge,
    ListDevices,
    ConnectDevice,
    PollBridgeStatus,
    PollDeviceStatus,
}

/// Steps for one pass, in order: at most one advancing step, then the
/// status polls once the device is connected
pub fn plan(phase: ConnectionState) -> Vec<Step> {
    use ConnectionState::*;

    let advance = match phase {
        Unknown | Disconnected | NotFoundDevice => Some(Step::QueryConnectedBridges),
        NotConnectedBridge => Some(Step::ListBridges),
        DiscoveredBridge => Some(Step::ConnectBridge),
        ConnectedBridge => Some(Step::ListDevices),
        DiscoveredDevice => Some(Step::ConnectDevice),
        _ => None,
    };

    let mut steps: Vec<Step> = advance.into_iter().collect();
    if phase >= ConnectedDevice {
        steps.push(Step::PollBridgeStatus);
        steps.push(Step::PollDeviceStatus);
    }
    steps
}

impl Step {
    /// Whether the step still makes sense after earlier steps in the pass
    pub fn applies_to(self, phase: ConnectionState) -> bool {
        match self {
            Step::PollBridgeStatus | Step::PollDeviceStatus => {
                phase >= ConnectionState::ConnectedDevice
            }
            _ => plan(phase).first() == Some(&self),
        }
    }

    /// Event applied right before the call, moving the pair into its
    /// in-progress phase
    pub fn start_event(self, name: &PairName) -> Option<Event> {
        let name = name.to_string();
        match self {
            Step::QueryConnectedBridges => Some(Event::ConnectedBridges { name }),
            Step::ListBridges => Some(Event::ListBridges { name }),
            Step::ConnectBridge => Some(Event::ConnectBridge { name }),
            Step::ListDevices => Some(Event::ListDevices { name }),
            Step::ConnectDevice => Some(Event::ConnectDevice { name }),
            Step::PollBridgeStatus | Step::PollDeviceStatus => None,
        }
    }

    /// Make the call and describe its outcome
    pub async fn perform(self, manager: &dyn DeviceManager, pair: &PairName) -> Event {
        let name = pair.to_string();
        match self {
            Step::QueryConnectedBridges => match manager.list_connected_bridges(pair.bridge()).await {
                Ok(response) => Event::ConnectedBridgesSuccess {
                    name,
                    bridges: response.bridges,
                },
                Err(e) => Event::ConnectedBridgesFailure {
                    message: format!("{e:#}"),
                },
            },
            Step::ListBridges => match manager.list_bridges(pair.bridge()).await {
                Ok(response) => Event::ListBridgesSuccess {
                    name,
                    bridges: response.bridges,
                },
                Err(e) => Event::ListBridgesFailure {
                    message: format!("{e:#}"),
                },
            },
            Step::ConnectBridge => match manager.connect_bridge(pair.bridge()).await {
                Ok(response) => Event::ConnectBridgeSuccess { name, response },
                Err(e) => Event::ConnectBridgeFailure {
                    name,
                    message: format!("{e:#}"),
                },
            },
            Step::ListDevices => match manager.list_devices(pair.bridge()).await {
                Ok(response) => Event::ListDevicesSuccess { name, response },
                Err(e) => Event::DeviceFailure {
                    name,
                    message: format!("{e:#}"),
                },
            },
            Step::ConnectDevice => match manager.connect_device(pair.as_str()).await {
                Ok(response) => Event::ConnectDeviceSuccess { name, response },
                Err(e) => Event::DeviceFailure {
                    name,
                    message: format!("{e:#}"),
                },
            },
            Step::PollBridgeStatus => match manager.describe_bridge(pair.bridge()).await {
                Ok(response) => match response.bridge_details() {
                    Ok(_) => Event::BridgeStatusSuccess { name, response },
                    Err(e) => Event::BridgeFailure {
                        name,
                        message: format!("unreadable bridge details: {e}"),
                    },
                },
                Err(e) => Event::BridgeFailure {
                    name,
                    message: format!("{e:#}"),
                },
            },
            Step::PollDeviceStatus => match manager.device_status(pair.as_str()).await {
                Ok(response) => Event::DeviceStatusSuccess { name, response },
                Err(e) => Event::DeviceFailure {
                    name,
                    message: format!("{e:#}"),
                },
            },
        }
    }
}
