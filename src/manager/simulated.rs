//! In-process management service for development and tests
//!
//! Models one bridge per configured pair with its device behind it. A
//! [`Scenario`] picks the failure mode; tests can also flip individual
//! conditions at runtime and inspect the calls that were made.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use clap::ValueEnum;
use prost::Message;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use summit_shared::api::{
    Bridge, BridgeDetails, CommandAck, ConnectBridgeDetails, ConnectBridgeResponse,
    ConnectDeviceDetails, ConnectDeviceResponse, ConnectionStatus, DescribeBridgeResponse, Device,
    DeviceStatusResponse, ListBridgesResponse, ListDevicesResponse, RejectCode,
    SenseConfigureResponse, StreamConfigureResponse, StreamConfigureStatus, SummitError,
};
use summit_shared::{polling, PairName};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{DeviceManager, LeadPair};
use crate::config::StreamSettings;

const BRIDGE_BATTERY: i32 = 87;
const DEVICE_BATTERY: u32 = 64;
/// Soft failures each bridge reports under [`Scenario::FlakyBridge`]
const FLAKY_SOFT_FAILURES: u32 = polling::SOFT_FAILURE_LIMIT - 1;

/// Behaviour of the simulated service
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scenario {
    /// Every bridge and device is present and connects first time
    #[default]
    Healthy,
    /// Bridges reject connection with the retryable code a few times
    FlakyBridge,
    /// The last configured pair's device is not behind its bridge
    MissingDevice,
    /// Bridge listings fail outright
    Offline,
}

#[derive(Debug)]
struct SimDevice {
    name: String,
    present: bool,
    connected: bool,
    streaming: bool,
}

#[derive(Debug)]
struct SimBridge {
    name: String,
    connected: bool,
    soft_failures: u32,
    garbled_details: bool,
    device: SimDevice,
}

impl SimBridge {
    fn drop_link(&mut self) {
        self.connected = false;
        self.device.connected = false;
        self.device.streaming = false;
    }
}

#[derive(Debug, Default)]
struct World {
    listing_fails: bool,
    /// Bridge connects never answer
    connects_stall: bool,
    bridges: Vec<SimBridge>,
}

impl World {
    fn bridge(&mut self, bridge: &str) -> Option<&mut SimBridge> {
        self.bridges.iter_mut().find(|b| b.name == bridge)
    }

    fn device(&mut self, device: &str) -> Option<&mut SimBridge> {
        self.bridges.iter_mut().find(|b| b.device.name == device)
    }
}

#[derive(Debug, Default)]
struct CallTracker {
    in_flight: HashMap<String, usize>,
    max_in_flight: usize,
    log: Vec<String>,
}

/// Decrements the caller's in-flight count when the call completes
struct InFlight {
    tracker: Arc<Mutex<CallTracker>>,
    key: String,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Ok(mut tracker) = self.tracker.lock() {
            if let Some(count) = tracker.in_flight.get_mut(&self.key) {
                *count = count.saturating_sub(1);
            }
        }
    }
}

/// Simulated management service
pub struct SimulatedManager {
    world: RwLock<World>,
    tracker: Arc<Mutex<CallTracker>>,
    latency: Duration,
}

impl SimulatedManager {
    /// Build a world holding one bridge and device per pair
    pub fn new(pairs: &[PairName], scenario: Scenario) -> Self {
        let bridges = pairs
            .iter()
            .enumerate()
            .map(|(i, pair)| SimBridge {
                name: pair.bridge().to_string(),
                connected: false,
                soft_failures: match scenario {
                    Scenario::FlakyBridge => FLAKY_SOFT_FAILURES,
                    _ => 0,
                },
                garbled_details: false,
                device: SimDevice {
                    name: pair.as_str().to_string(),
                    present: !(scenario == Scenario::MissingDevice && i + 1 == pairs.len()),
                    connected: false,
                    streaming: false,
                },
            })
            .collect();

        info!(
            "[SIM] Simulated service with {} bridge(s), scenario {:?}",
            pairs.len(),
            scenario
        );

        Self {
            world: RwLock::new(World {
                listing_fails: scenario == Scenario::Offline,
                connects_stall: false,
                bridges,
            }),
            tracker: Arc::new(Mutex::new(CallTracker::default())),
            latency: Duration::from_millis(20),
        }
    }

    /// Time each call spends in flight
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every bridge listing fail (or succeed again)
    pub async fn set_listing_failure(&self, fails: bool) {
        self.world.write().await.listing_fails = fails;
    }

    /// Number of retryable connect failures the bridge reports before succeeding
    pub async fn set_soft_failures(&self, bridge: &str, count: u32) {
        if let Some(b) = self.world.write().await.bridge(bridge) {
            b.soft_failures = count;
        }
    }

    /// Make bridge connects hang without answering (or answer again)
    pub async fn set_connects_stall(&self, stall: bool) {
        self.world.write().await.connects_stall = stall;
    }

    /// The bridge describes itself with a payload that does not decode
    pub async fn garble_bridge_details(&self, bridge: &str) {
        if let Some(b) = self.world.write().await.bridge(bridge) {
            b.garbled_details = true;
        }
    }

    /// The bridge loses its link to the service and everything behind it
    pub async fn drop_bridge_link(&self, bridge: &str) {
        if let Some(b) = self.world.write().await.bridge(bridge) {
            info!("[SIM] Bridge {} went dark", bridge);
            b.drop_link();
        }
    }

    /// Highest number of concurrent calls observed for any one pair
    pub fn max_in_flight(&self) -> usize {
        self.tracker.lock().map(|t| t.max_in_flight).unwrap_or(0)
    }

    /// Every call made so far, as `"<operation> <name>"`
    pub fn calls(&self) -> Vec<String> {
        self.tracker
            .lock()
            .map(|t| t.log.clone())
            .unwrap_or_default()
    }

    /// Calls made so far for names belonging to `bridge`
    #[cfg(test)]
    pub fn calls_for(&self, bridge: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call_key(call.split_once(' ').map_or("", |(_, n)| n)) == bridge)
            .count()
    }

    async fn begin(&self, operation: &str, name: &str) -> InFlight {
        let key = call_key(name);
        if let Ok(mut tracker) = self.tracker.lock() {
            tracker.log.push(format!("{operation} {name}"));
            let count = tracker.in_flight.entry(key.clone()).or_insert(0);
            *count += 1;
            let count = *count;
            tracker.max_in_flight = tracker.max_in_flight.max(count);
        }
        debug!("[SIM] {} {}", operation, name);

        let call = InFlight {
            tracker: self.tracker.clone(),
            key,
        };
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        call
    }
}

/// Calls are attributed to the bridge the name belongs to
fn call_key(name: &str) -> String {
    match PairName::parse(name) {
        Ok(pair) => pair.bridge().to_string(),
        Err(_) => name.to_string(),
    }
}

fn dark(message: &str) -> Option<SummitError> {
    Some(SummitError::rejected(RejectCode::NoCtmConnected, message))
}

fn ack(error: Option<SummitError>) -> CommandAck {
    CommandAck { error }
}

#[async_trait]
impl DeviceManager for SimulatedManager {
    async fn list_connected_bridges(&self, query: &str) -> Result<ListBridgesResponse> {
        let _call = self.begin("list_connected_bridges", query).await;
        let world = self.world.read().await;
        if world.listing_fails {
            return Err(anyhow!("management service unavailable"));
        }
        let bridges = world
            .bridges
            .iter()
            .filter(|b| b.connected && b.name.starts_with(query))
            .map(|b| Bridge {
                name: b.name.clone(),
            })
            .collect();
        Ok(ListBridgesResponse { bridges })
    }

    async fn list_bridges(&self, query: &str) -> Result<ListBridgesResponse> {
        let _call = self.begin("list_bridges", query).await;
        let world = self.world.read().await;
        if world.listing_fails {
            return Err(anyhow!("management service unavailable"));
        }
        let bridges = world
            .bridges
            .iter()
            .filter(|b| b.name.starts_with(query))
            .map(|b| Bridge {
                name: b.name.clone(),
            })
            .collect();
        Ok(ListBridgesResponse { bridges })
    }

    async fn connect_bridge(&self, bridge: &str) -> Result<ConnectBridgeResponse> {
        let _call = self.begin("connect_bridge", bridge).await;
        let stalled = self.world.read().await.connects_stall;
        if stalled {
            debug!("[SIM] connect_bridge {} stalled", bridge);
            std::future::pending::<()>().await;
        }

        let mut world = self.world.write().await;
        let b = world
            .bridge(bridge)
            .ok_or_else(|| anyhow!("unknown bridge {bridge}"))?;

        if b.soft_failures > 0 {
            b.soft_failures -= 1;
            return Ok(ConnectBridgeResponse {
                name: bridge.to_string(),
                connection_status: ConnectionStatus::ConnectionFailure.into(),
                details: Some(ConnectBridgeDetails {
                    connection_status: polling::SOFT_FAILURE_CODE,
                }),
            });
        }

        b.connected = true;
        Ok(ConnectBridgeResponse {
            name: bridge.to_string(),
            connection_status: ConnectionStatus::ConnectionSuccess.into(),
            details: None,
        })
    }

    async fn disconnect_bridge(&self, bridge: &str) -> Result<CommandAck> {
        let _call = self.begin("disconnect_bridge", bridge).await;
        let mut world = self.world.write().await;
        let b = world
            .bridge(bridge)
            .ok_or_else(|| anyhow!("unknown bridge {bridge}"))?;
        b.drop_link();
        Ok(ack(None))
    }

    async fn describe_bridge(&self, bridge: &str) -> Result<DescribeBridgeResponse> {
        let _call = self.begin("describe_bridge", bridge).await;
        let mut world = self.world.write().await;
        let b = world
            .bridge(bridge)
            .ok_or_else(|| anyhow!("unknown bridge {bridge}"))?;

        if !b.connected {
            return Ok(DescribeBridgeResponse {
                name: bridge.to_string(),
                details: Bytes::new(),
                error: dark("bridge is not connected"),
            });
        }
        let details = if b.garbled_details {
            Bytes::from_static(&[0xff])
        } else {
            let details = BridgeDetails {
                battery_level: BRIDGE_BATTERY,
            };
            Bytes::from(details.encode_to_vec())
        };
        Ok(DescribeBridgeResponse {
            name: bridge.to_string(),
            details,
            error: None,
        })
    }

    async fn configure_beep(&self, bridge: &str, enabled: bool) -> Result<CommandAck> {
        let _call = self.begin("configure_beep", bridge).await;
        let mut world = self.world.write().await;
        let b = world
            .bridge(bridge)
            .ok_or_else(|| anyhow!("unknown bridge {bridge}"))?;
        if !b.connected {
            return Ok(ack(dark("bridge is not connected")));
        }
        debug!("[SIM] Beep on {} {}", bridge, if enabled { "enabled" } else { "disabled" });
        Ok(ack(None))
    }

    async fn list_devices(&self, query: &str) -> Result<ListDevicesResponse> {
        let _call = self.begin("list_devices", query).await;
        let mut world = self.world.write().await;
        let b = world
            .bridges
            .iter_mut()
            .find(|b| b.name.starts_with(query) && b.connected)
            .ok_or_else(|| anyhow!("no connected bridge matches {query}"))?;

        if b.device.connected {
            return Ok(ListDevicesResponse {
                devices: vec![],
                error: Some(SummitError {
                    reject_code: None,
                    message: polling::ALREADY_CONNECTED.to_string(),
                }),
            });
        }
        let devices = if b.device.present {
            vec![Device {
                name: b.device.name.clone(),
            }]
        } else {
            vec![]
        };
        Ok(ListDevicesResponse {
            devices,
            error: None,
        })
    }

    async fn connect_device(&self, device: &str) -> Result<ConnectDeviceResponse> {
        let _call = self.begin("connect_device", device).await;
        let mut world = self.world.write().await;
        let b = world
            .device(device)
            .ok_or_else(|| anyhow!("unknown device {device}"))?;

        if !b.connected || !b.device.present {
            return Ok(ConnectDeviceResponse {
                name: device.to_string(),
                connection_status: ConnectionStatus::ConnectionFailure.into(),
                details: Some(ConnectDeviceDetails {
                    connection_status: "device not reachable".into(),
                }),
            });
        }
        b.device.connected = true;
        Ok(ConnectDeviceResponse {
            name: device.to_string(),
            connection_status: ConnectionStatus::ConnectionSuccess.into(),
            details: None,
        })
    }

    async fn disconnect_device(&self, device: &str) -> Result<CommandAck> {
        let _call = self.begin("disconnect_device", device).await;
        let mut world = self.world.write().await;
        let b = world
            .device(device)
            .ok_or_else(|| anyhow!("unknown device {device}"))?;
        b.device.connected = false;
        b.device.streaming = false;
        Ok(ack(None))
    }

    async fn device_status(&self, device: &str) -> Result<DeviceStatusResponse> {
        let _call = self.begin("device_status", device).await;
        let mut world = self.world.write().await;
        let b = world
            .device(device)
            .ok_or_else(|| anyhow!("unknown device {device}"))?;

        if !b.device.connected {
            return Ok(DeviceStatusResponse {
                battery_level_percent: None,
                error: Some(SummitError::rejected(
                    RejectCode::CtmUnexpectedDisconnect,
                    "device is not connected",
                )),
            });
        }
        Ok(DeviceStatusResponse {
            battery_level_percent: Some(DEVICE_BATTERY),
            error: None,
        })
    }

    async fn configure_sense(
        &self,
        device: &str,
        settings: &StreamSettings,
    ) -> Result<SenseConfigureResponse> {
        let _call = self.begin("configure_sense", device).await;
        let mut world = self.world.write().await;
        let b = world
            .device(device)
            .ok_or_else(|| anyhow!("unknown device {device}"))?;

        if !b.device.connected {
            return Ok(SenseConfigureResponse {
                error: dark("device is not connected"),
            });
        }
        debug!("[SIM] Sense configured on {}: {:?}", device, settings);
        Ok(SenseConfigureResponse { error: None })
    }

    async fn stream_enable(
        &self,
        device: &str,
        settings: &StreamSettings,
    ) -> Result<StreamConfigureResponse> {
        let _call = self.begin("stream_enable", device).await;
        let mut world = self.world.write().await;
        let b = world
            .device(device)
            .ok_or_else(|| anyhow!("unknown device {device}"))?;

        if !b.device.connected {
            return Ok(StreamConfigureResponse {
                stream_configure_status: StreamConfigureStatus::Failure.into(),
                error: dark("device is not connected"),
            });
        }
        debug!("[SIM] Streaming from {}: {:?}", device, settings);
        b.device.streaming = true;
        Ok(StreamConfigureResponse {
            stream_configure_status: StreamConfigureStatus::Success.into(),
            error: None,
        })
    }

    async fn stream_disable(&self, device: &str) -> Result<StreamConfigureResponse> {
        let _call = self.begin("stream_disable", device).await;
        let mut world = self.world.write().await;
        let b = world
            .device(device)
            .ok_or_else(|| anyhow!("unknown device {device}"))?;
        b.device.streaming = false;
        Ok(StreamConfigureResponse {
            stream_configure_status: StreamConfigureStatus::Success.into(),
            error: None,
        })
    }

    async fn integrity_test(&self, device: &str, leads: &[LeadPair]) -> Result<CommandAck> {
        let _call = self.begin("integrity_test", device).await;
        let mut world = self.world.write().await;
        let b = world
            .device(device)
            .ok_or_else(|| anyhow!("unknown device {device}"))?;

        if !b.device.connected {
            return Err(anyhow!("integrity test on disconnected device {device}"));
        }
        if b.device.streaming {
            return Ok(ack(Some(SummitError::rejected(
                RejectCode::InsCommandRejected,
                "cannot test leads while streaming",
            ))));
        }
        debug!("[SIM] Tested {} lead pair(s) on {}", leads.len(), device);
        Ok(ack(None))
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
