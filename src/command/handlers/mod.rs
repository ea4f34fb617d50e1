//! Command handlers for operator actions

mod configure;
mod disconnect;
mod integrity;
mod stream;

pub use configure::{handle_beep, handle_configure_sense};
pub use disconnect::{handle_disconnect_bridge, handle_disconnect_device};
pub use integrity::handle_integrity_test;
pub use stream::{handle_stream_disable, handle_stream_enable};

use summit_shared::api::SummitError;
use summit_shared::{Event, PairState};

use crate::command::CommandResult;
use crate::config::StreamSettings;
use crate::manager::DeviceManager;

/// Context passed to command handlers
pub struct HandlerContext<'a> {
    pub state: &'a PairState,
    pub settings: &'a StreamSettings,
    pub manager: &'a dyn DeviceManager,
}

impl HandlerContext<'_> {
    pub fn name(&self) -> String {
        self.state.name.to_string()
    }

    fn reject(&self, action: &str, needs: &str) -> CommandResult {
        CommandResult::Rejected {
            message: format!(
                "{action} needs a {needs} pair, {} is {}",
                self.state.name, self.state.phase
            ),
        }
    }

    fn bridge_failure(&self, message: String) -> CommandResult {
        CommandResult::Failed {
            events: vec![Event::BridgeFailure {
                name: self.name(),
                message: message.clone(),
            }],
            message,
        }
    }

    fn device_failure(&self, message: String) -> CommandResult {
        CommandResult::Failed {
            events: vec![Event::DeviceFailure {
                name: self.name(),
                message: message.clone(),
            }],
            message,
        }
    }
}

/// The message of an in-band error, if the service attached one
fn error_message(error: &Option<SummitError>) -> Option<String> {
    error.as_ref().map(|e| e.message.clone())
}
