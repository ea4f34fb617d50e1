//! Sense configuration and bridge beep handlers

use summit_shared::{bridge_connected, device_connected, Event};

use super::{error_message, HandlerContext};
use crate::command::CommandResult;

/// Handle CONFIGURE_SENSE
pub async fn handle_configure_sense(ctx: &HandlerContext<'_>) -> CommandResult {
    if !device_connected(ctx.state) {
        return ctx.reject("sense configuration", "device-connected");
    }

    match ctx
        .manager
        .configure_sense(ctx.state.name.as_str(), ctx.settings)
        .await
    {
        Ok(response) => {
            let failed = error_message(&response.error);
            let events = vec![Event::SenseConfigured {
                name: ctx.name(),
                response,
            }];
            match failed {
                Some(message) => CommandResult::Failed { message, events },
                None => CommandResult::Completed {
                    message: "sense configured".into(),
                    events,
                },
            }
        }
        Err(e) => ctx.device_failure(format!("{e:#}")),
    }
}

/// Handle CONFIGURE_BEEP
pub async fn handle_beep(ctx: &HandlerContext<'_>) -> CommandResult {
    if !bridge_connected(ctx.state) {
        return ctx.reject("beep", "bridge-connected");
    }

    match ctx.manager.configure_beep(ctx.state.name.bridge(), true).await {
        Ok(ack) => match error_message(&ack.error) {
            Some(message) => ctx.bridge_failure(message),
            None => CommandResult::Completed {
                message: format!("beep enabled on {}", ctx.state.name.bridge()),
                events: vec![],
            },
        },
        Err(e) => ctx.bridge_failure(format!("{e:#}")),
    }
}
