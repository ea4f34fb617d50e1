//! Bridge/device pair identities
//!
//! Every entity on the management API is addressed by a resource name of the
//! form `//summit/bridge/<bridge-id>/device/<device-id>`. Bridge listings
//! return only the `//summit/bridge/<bridge-id>` prefix, so responses are
//! matched back to a pair by prefix containment.

use std::fmt;
use thiserror::Error;

const BRIDGE_PREFIX: &str = "//summit/bridge/";
const DEVICE_SEGMENT: &str = "/device/";

/// Errors raised while parsing a pair name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("invalid name: {0}")]
    Invalid(String),

    #[error("empty {segment} id in {name}")]
    EmptySegment { segment: &'static str, name: String },
}

/// One of the two pairs this application drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// Validated `//summit/bridge/<id>/device/<id>` name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairName {
    full: String,
    bridge_len: usize,
}

impl PairName {
    /// Parse and validate a full pair name
    pub fn parse(name: &str) -> Result<Self, NameError> {
        let rest = name
            .strip_prefix(BRIDGE_PREFIX)
            .ok_or_else(|| NameError::Invalid(name.to_string()))?;
        let (bridge_id, device_id) = rest
            .split_once(DEVICE_SEGMENT)
            .ok_or_else(|| NameError::Invalid(name.to_string()))?;

        if bridge_id.is_empty() {
            return Err(NameError::EmptySegment {
                segment: "bridge",
                name: name.to_string(),
            });
        }
        if device_id.is_empty() {
            return Err(NameError::EmptySegment {
                segment: "device",
                name: name.to_string(),
            });
        }
        if !is_word(bridge_id) || !is_word(device_id) {
            return Err(NameError::Invalid(name.to_string()));
        }

        Ok(Self {
            full: name.to_string(),
            bridge_len: BRIDGE_PREFIX.len() + bridge_id.len(),
        })
    }

    /// The complete bridge+device name
    pub fn as_str(&self) -> &str {
        &self.full
    }

    /// The bare bridge name (`//summit/bridge/<id>`)
    pub fn bridge(&self) -> &str {
        &self.full[..self.bridge_len]
    }

    /// Whether a name returned by the API refers to this pair.
    ///
    /// The returned name must be a prefix of this pair's name ending on a
    /// path segment boundary, so `//summit/bridge/foo` matches this pair but
    /// not `//summit/bridge/foobar/device/x`.
    pub fn matches(&self, returned: &str) -> bool {
        if returned.is_empty() || !self.full.starts_with(returned) {
            return false;
        }
        self.full.len() == returned.len() || self.full[returned.len()..].starts_with('/')
    }

    /// Whether any of the returned names refers to this pair
    pub fn matches_any<'a>(&self, mut returned: impl Iterator<Item = &'a str>) -> bool {
        returned.any(|name| self.matches(name))
    }
}

impl fmt::Display for PairName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

impl std::str::FromStr for PairName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_word(segment: &str) -> bool {
    segment
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
}
