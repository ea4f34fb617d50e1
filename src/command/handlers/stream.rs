//! Streaming handlers

use summit_shared::api::StreamConfigureStatus;
use summit_shared::{ConnectionState, Event};

use super::HandlerContext;
use crate::command::CommandResult;

/// Handle STREAM_ENABLE
///
/// Sensing is configured first; a rejected configuration ends the command
/// without touching the stream.
pub async fn handle_stream_enable(ctx: &HandlerContext<'_>) -> CommandResult {
    if ctx.state.phase != ConnectionState::ConnectedDevice {
        return ctx.reject("stream enable", "connected-device");
    }

    let device = ctx.state.name.as_str();
    let sense = match ctx.manager.configure_sense(device, ctx.settings).await {
        Ok(response) => response,
        Err(e) => return ctx.device_failure(format!("{e:#}")),
    };
    if let Some(error) = &sense.error {
        return CommandResult::Failed {
            message: error.message.clone(),
            events: vec![Event::SenseConfigured {
                name: ctx.name(),
                response: sense.clone(),
            }],
        };
    }

    match ctx.manager.stream_enable(device, ctx.settings).await {
        Ok(response) => {
            let ok = response.status() == StreamConfigureStatus::Success;
            let events = vec![
                Event::SenseConfigured {
                    name: ctx.name(),
                    response: sense,
                },
                Event::StreamEnabled {
                    name: ctx.name(),
                    response,
                },
            ];
            if ok {
                CommandResult::Completed {
                    message: format!("streaming from {device}"),
                    events,
                }
            } else {
                CommandResult::Failed {
                    message: format!("stream enable refused by {device}"),
                    events,
                }
            }
        }
        Err(e) => ctx.device_failure(format!("{e:#}")),
    }
}

/// Handle STREAM_DISABLE
pub async fn handle_stream_disable(ctx: &HandlerContext<'_>) -> CommandResult {
    if ctx.state.phase != ConnectionState::Streaming {
        return ctx.reject("stream disable", "streaming");
    }

    let device = ctx.state.name.as_str();
    match ctx.manager.stream_disable(device).await {
        Ok(response) => {
            let ok = response.status() == StreamConfigureStatus::Success;
            let events = vec![Event::StreamDisabled {
                name: ctx.name(),
                response,
            }];
            if ok {
                CommandResult::Completed {
                    message: format!("stopped streaming from {device}"),
                    events,
                }
            } else {
                CommandResult::Failed {
                    message: format!("stream disable refused by {device}"),
                    events,
                }
            }
        }
        Err(e) => ctx.device_failure(format!("{e:#}")),
    }
}
