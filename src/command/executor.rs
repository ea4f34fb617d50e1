//! Command executor - checks phase guards and dispatches operator commands

use std::sync::Arc;
use summit_shared::{Event, PairState};
use tracing::{info, warn};

use super::handlers::{self, HandlerContext};
use super::OperatorCommand;
use crate::config::StreamSettings;
use crate::manager::DeviceManager;

/// Result of command execution
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    /// Command completed; `events` must be applied to the pair in order
    Completed { message: String, events: Vec<Event> },
    /// Command ran but the service refused or failed it
    Failed { message: String, events: Vec<Event> },
    /// Command not valid in the pair's current phase; nothing was called
    Rejected { message: String },
}

impl CommandResult {
    pub fn events(&self) -> &[Event] {
        match self {
            CommandResult::Completed { events, .. } | CommandResult::Failed { events, .. } => {
                events
            }
            CommandResult::Rejected { .. } => &[],
        }
    }

    pub fn message(&self) -> &str {
        match self {
            CommandResult::Completed { message, .. }
            | CommandResult::Failed { message, .. }
            | CommandResult::Rejected { message } => message,
        }
    }
}

/// Executes operator commands for one pair
pub struct CommandExecutor {
    manager: Arc<dyn DeviceManager>,
    settings: StreamSettings,
}

impl CommandExecutor {
    pub fn new(manager: Arc<dyn DeviceManager>, settings: StreamSettings) -> Self {
        Self { manager, settings }
    }

    /// Execute a command against the pair's current state
    pub async fn execute(&self, command: OperatorCommand, state: &PairState) -> CommandResult {
        info!("[CMD] {} on {} ({})", command, state.name, state.phase);

        let ctx = HandlerContext {
            state,
            settings: &self.settings,
            manager: self.manager.as_ref(),
        };

        let result = match command {
            OperatorCommand::Reset => CommandResult::Completed {
                message: "connection reset".into(),
                events: vec![Event::ResetConnection {
                    name: state.name.to_string(),
                }],
            },
            OperatorCommand::DisconnectBridge => handlers::handle_disconnect_bridge(&ctx).await,
            OperatorCommand::DisconnectDevice => handlers::handle_disconnect_device(&ctx).await,
            OperatorCommand::EnableStream => handlers::handle_stream_enable(&ctx).await,
            OperatorCommand::DisableStream => handlers::handle_stream_disable(&ctx).await,
            OperatorCommand::ConfigureSense => handlers::handle_configure_sense(&ctx).await,
            OperatorCommand::IntegrityTest => handlers::handle_integrity_test(&ctx).await,
            OperatorCommand::Beep => handlers::handle_beep(&ctx).await,
        };

        match &result {
            CommandResult::Completed { message, .. } => {
                info!("[CMD] {} completed: {}", command, message)
            }
            CommandResult::Failed { message, .. } => warn!("[CMD] {} failed: {}", command, message),
            CommandResult::Rejected { message } => {
                warn!("[CMD] {} rejected: {}", command, message)
            }
        }
        result
    }
}
