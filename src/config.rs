//! Pair configuration and scheduler tunables
//!
//! The configuration file names the two bridge/device pairs and carries the
//! streaming parameters used once a device is connected:
//!
//! ```json
//! {
//!   "left":  { "name": "//summit/bridge/foo/device/bar", "config": {} },
//!   "right": { "name": "//summit/bridge/baz/device/quux", "config": {} }
//! }
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use summit_shared::{polling, Cadence, PairName, Side};

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub left: PairConfig,
    pub right: PairConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// One bridge/device pair
#[derive(Debug, Clone, Deserialize)]
pub struct PairConfig {
    /// Full `//summit/bridge/<id>/device/<id>` name
    pub name: String,
    /// Streaming parameters for this pair
    #[serde(default)]
    pub config: StreamSettings,
}

/// Sensing channels to configure and stream once the device is connected
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StreamSettings {
    pub time_domain: bool,
    pub fft: bool,
    pub power_domain: bool,
    pub accelerometer: bool,
    pub detector: bool,
    pub adaptive_state: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            time_domain: true,
            fft: false,
            power_domain: false,
            accelerometer: true,
            detector: false,
            adaptive_state: false,
        }
    }
}

/// Scheduler timing, in milliseconds in the configuration file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Sleep between passes while a pair is still converging
    pub fast_interval_ms: u64,
    /// Sleep between passes once polling quickly would be wasted
    pub slow_interval_ms: u64,
    /// Pending operator events/commands per pair
    pub inbox_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fast_interval_ms: polling::FAST_INTERVAL_MS,
            slow_interval_ms: polling::SLOW_INTERVAL_MS,
            inbox_capacity: 32,
        }
    }
}

impl SchedulerConfig {
    pub fn cadence(&self) -> Cadence {
        Cadence {
            fast: Duration::from_millis(self.fast_interval_ms),
            slow: Duration::from_millis(self.slow_interval_ms),
        }
    }
}

impl AppConfig {
    /// Load and validate a JSON configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(content: &str) -> Result<Self> {
        let config: AppConfig =
            serde_json::from_str(content).context("Failed to parse config as JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Built-in pairs used when no configuration file is given
    pub fn demo() -> Self {
        Self {
            left: PairConfig {
                name: "//summit/bridge/foo/device/bar".into(),
                config: StreamSettings::default(),
            },
            right: PairConfig {
                name: "//summit/bridge/baz/device/quux".into(),
                config: StreamSettings::default(),
            },
            scheduler: SchedulerConfig::default(),
        }
    }

    pub fn pair(&self, side: Side) -> &PairConfig {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    /// Validated name of one side's pair
    pub fn pair_name(&self, side: Side) -> Result<PairName> {
        let name = &self.pair(side).name;
        PairName::parse(name).with_context(|| format!("{side} pair"))
    }

    fn validate(&self) -> Result<()> {
        let left = self.pair_name(Side::Left)?;
        let right = self.pair_name(Side::Right)?;
        if left == right {
            bail!("left and right pairs share the name {left}");
        }
        if self.scheduler.fast_interval_ms == 0 || self.scheduler.slow_interval_ms == 0 {
            bail!("scheduler intervals must be non-zero");
        }
        if self.scheduler.inbox_capacity == 0 {
            bail!("scheduler inbox capacity must be non-zero");
        }
        Ok(())
    }
}
