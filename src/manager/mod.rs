//! Remote device-management API
//!
//! Schedulers only ever talk to the management service through
//! [`DeviceManager`], so the backend can be swapped between the real service
//! and the in-process simulation.

pub mod simulated;

pub use simulated::{Scenario, SimulatedManager};

use anyhow::Result;
use async_trait::async_trait;
use summit_shared::api::{
    CommandAck, ConnectBridgeResponse, ConnectDeviceResponse, DescribeBridgeResponse,
    DeviceStatusResponse, ListBridgesResponse, ListDevicesResponse, SenseConfigureResponse,
    StreamConfigureResponse,
};

use crate::config::StreamSettings;

/// Two electrode contacts measured against each other by an integrity test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeadPair(pub u8, pub u8);

/// Operations offered by the device-management service.
///
/// Bridge operations take the bare `//summit/bridge/<id>` name, device
/// operations the full pair name. A transport or service failure is an
/// `Err`; a rejection the service reports in-band comes back inside the
/// response.
#[async_trait]
pub trait DeviceManager: Send + Sync {
    async fn list_connected_bridges(&self, query: &str) -> Result<ListBridgesResponse>;

    async fn list_bridges(&self, query: &str) -> Result<ListBridgesResponse>;

    async fn connect_bridge(&self, bridge: &str) -> Result<ConnectBridgeResponse>;

    async fn disconnect_bridge(&self, bridge: &str) -> Result<CommandAck>;

    async fn describe_bridge(&self, bridge: &str) -> Result<DescribeBridgeResponse>;

    async fn configure_beep(&self, bridge: &str, enabled: bool) -> Result<CommandAck>;

    async fn list_devices(&self, query: &str) -> Result<ListDevicesResponse>;

    async fn connect_device(&self, device: &str) -> Result<ConnectDeviceResponse>;

    async fn disconnect_device(&self, device: &str) -> Result<CommandAck>;

    async fn device_status(&self, device: &str) -> Result<DeviceStatusResponse>;

    async fn configure_sense(
        &self,
        device: &str,
        settings: &StreamSettings,
    ) -> Result<SenseConfigureResponse>;

    async fn stream_enable(
        &self,
        device: &str,
        settings: &StreamSettings,
    ) -> Result<StreamConfigureResponse>;

    async fn stream_disable(&self, device: &str) -> Result<StreamConfigureResponse>;

    async fn integrity_test(&self, device: &str, leads: &[LeadPair]) -> Result<CommandAck>;

    /// Human-readable backend name
    fn name(&self) -> &'static str;
}
