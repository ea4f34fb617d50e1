//! Operator-initiated actions on one pair
//!
//! This module handles:
//! - Parsing operator commands
//! - Checking that the pair's phase allows the action
//! - Dispatching to the handler that makes the management calls
//! - Reporting the reducer events the calls produced

mod executor;
pub mod handlers;

pub use executor::{CommandExecutor, CommandResult};

use anyhow::{anyhow, Error};
use std::fmt;
use std::str::FromStr;

/// Actions an operator can request for a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Forget everything and start discovery from scratch
    Reset,
    DisconnectBridge,
    DisconnectDevice,
    /// Configure sensing and start streaming
    EnableStream,
    DisableStream,
    ConfigureSense,
    /// Measure impedance across the lead pairs
    IntegrityTest,
    /// Enable the bridge's audible beep
    Beep,
}

impl OperatorCommand {
    pub const ALL: [OperatorCommand; 8] = [
        OperatorCommand::Reset,
        OperatorCommand::DisconnectBridge,
        OperatorCommand::DisconnectDevice,
        OperatorCommand::EnableStream,
        OperatorCommand::DisableStream,
        OperatorCommand::ConfigureSense,
        OperatorCommand::IntegrityTest,
        OperatorCommand::Beep,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperatorCommand::Reset => "reset",
            OperatorCommand::DisconnectBridge => "disconnect-bridge",
            OperatorCommand::DisconnectDevice => "disconnect-device",
            OperatorCommand::EnableStream => "stream-enable",
            OperatorCommand::DisableStream => "stream-disable",
            OperatorCommand::ConfigureSense => "configure-sense",
            OperatorCommand::IntegrityTest => "integrity-test",
            OperatorCommand::Beep => "beep",
        }
    }
}

impl fmt::Display for OperatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatorCommand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperatorCommand::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| anyhow!("unknown command: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        for command in OperatorCommand::ALL {
            assert_eq!(command.as_str().parse::<OperatorCommand>().unwrap(), command);
        }
        assert!("launch".parse::<OperatorCommand>().is_err());
    }
}
