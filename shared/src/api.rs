//! Management API message types
//!
//! Only the fields that drive connection state are declared here. Bridge
//! details are carried as an encoded [`BridgeDetails`] payload and decoded on
//! demand, mirroring how the service packs them into an opaque `Any`.

use bytes::Bytes;
use prost::Message;

use crate::polling;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ConnectionStatus {
    Unspecified = 0,
    ConnectionSuccess = 1,
    ConnectionFailure = 2,
}

impl ConnectionStatus {
    /// Status name as reported by the service
    pub fn label(self) -> &'static str {
        match self {
            ConnectionStatus::Unspecified => "CONNECT_STATUS_UNSPECIFIED",
            ConnectionStatus::ConnectionSuccess => "CONNECTION_SUCCESS",
            ConnectionStatus::ConnectionFailure => "CONNECTION_FAILURE",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum RejectCode {
    Unspecified = 0,
    NoCtmConnected = 1,
    CtmCommandTimeout = 2,
    CtmUnexpectedDisconnect = 3,
    InsCommandRejected = 4,
}

impl RejectCode {
    /// Whether a bridge status rejection means the bridge link has gone dark
    pub fn bridge_dark(self) -> bool {
        matches!(
            self,
            RejectCode::NoCtmConnected
                | RejectCode::CtmCommandTimeout
                | RejectCode::CtmUnexpectedDisconnect
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum StreamConfigureStatus {
    Unknown = 0,
    Success = 1,
    Failure = 2,
}

/// Error block attached to otherwise successful responses
#[derive(Clone, PartialEq, Message)]
pub struct SummitError {
    #[prost(enumeration = "RejectCode", optional, tag = "1")]
    pub reject_code: Option<i32>,

    #[prost(string, tag = "2")]
    pub message: String,
}

impl SummitError {
    pub fn rejected(code: RejectCode, message: impl Into<String>) -> Self {
        Self {
            reject_code: Some(code.into()),
            message: message.into(),
        }
    }

    /// The rejection code, if the service attached one
    pub fn rejection(&self) -> Option<RejectCode> {
        self.reject_code
            .map(|code| RejectCode::try_from(code).unwrap_or(RejectCode::Unspecified))
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct Bridge {
    #[prost(string, tag = "1")]
    pub name: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListBridgesResponse {
    #[prost(message, repeated, tag = "1")]
    pub bridges: Vec<Bridge>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ConnectBridgeDetails {
    #[prost(int32, tag = "1")]
    pub connection_status: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ConnectBridgeResponse {
    #[prost(string, tag = "1")]
    pub name: String,

    #[prost(enumeration = "ConnectionStatus", tag = "2")]
    pub connection_status: i32,

    #[prost(message, optional, tag = "3")]
    pub details: Option<ConnectBridgeDetails>,
}

impl ConnectBridgeResponse {
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus::try_from(self.connection_status).unwrap_or(ConnectionStatus::Unspecified)
    }

    /// A failure the service expects to clear up on retry
    pub fn is_soft_failure(&self) -> bool {
        self.status() == ConnectionStatus::ConnectionFailure
            && self
                .details
                .as_ref()
                .is_some_and(|d| d.connection_status == polling::SOFT_FAILURE_CODE)
    }

    /// Human-readable reason for a rejected connection
    pub fn failure_reason(&self) -> String {
        match &self.details {
            Some(details) => format!(
                "{} (detail code {})",
                self.status().label(),
                details.connection_status
            ),
            None => self.status().label().to_string(),
        }
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct BridgeDetails {
    #[prost(int32, tag = "1")]
    pub battery_level: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct DescribeBridgeResponse {
    #[prost(string, tag = "1")]
    pub name: String,

    /// Encoded [`BridgeDetails`]
    #[prost(bytes = "bytes", tag = "2")]
    pub details: Bytes,

    #[prost(message, optional, tag = "3")]
    pub error: Option<SummitError>,
}

impl DescribeBridgeResponse {
    pub fn bridge_details(&self) -> Result<BridgeDetails, prost::DecodeError> {
        BridgeDetails::decode(self.details.clone())
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct Device {
    #[prost(string, tag = "1")]
    pub name: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListDevicesResponse {
    #[prost(message, repeated, tag = "1")]
    pub devices: Vec<Device>,

    #[prost(message, optional, tag = "2")]
    pub error: Option<SummitError>,
}

impl ListDevicesResponse {
    pub fn already_connected(&self) -> bool {
        self.error
            .as_ref()
            .is_some_and(|e| e.message == polling::ALREADY_CONNECTED)
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct ConnectDeviceDetails {
    #[prost(string, tag = "1")]
    pub connection_status: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct ConnectDeviceResponse {
    #[prost(string, tag = "1")]
    pub name: String,

    #[prost(enumeration = "ConnectionStatus", tag = "2")]
    pub connection_status: i32,

    #[prost(message, optional, tag = "3")]
    pub details: Option<ConnectDeviceDetails>,
}

impl ConnectDeviceResponse {
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus::try_from(self.connection_status).unwrap_or(ConnectionStatus::Unspecified)
    }

    pub fn failure_reason(&self) -> String {
        match &self.details {
            Some(details) if !details.connection_status.is_empty() => {
                details.connection_status.clone()
            }
            _ => self.status().label().to_string(),
        }
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct DeviceStatusResponse {
    #[prost(uint32, optional, tag = "1")]
    pub battery_level_percent: Option<u32>,

    #[prost(message, optional, tag = "2")]
    pub error: Option<SummitError>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SenseConfigureResponse {
    #[prost(message, optional, tag = "1")]
    pub error: Option<SummitError>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StreamConfigureResponse {
    #[prost(enumeration = "StreamConfigureStatus", tag = "1")]
    pub stream_configure_status: i32,

    #[prost(message, optional, tag = "2")]
    pub error: Option<SummitError>,
}

impl StreamConfigureResponse {
    pub fn status(&self) -> StreamConfigureStatus {
        StreamConfigureStatus::try_from(self.stream_configure_status)
            .unwrap_or(StreamConfigureStatus::Unknown)
    }
}

/// Plain acknowledgement for calls whose only payload is an optional error
#[derive(Clone, PartialEq, Message)]
pub struct CommandAck {
    #[prost(message, optional, tag = "1")]
    pub error: Option<SummitError>,
}
