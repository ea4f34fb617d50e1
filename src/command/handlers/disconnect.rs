//! Manual disconnect handlers

use summit_shared::{device_connected, ConnectionState, Event};

use super::{error_message, HandlerContext};
use crate::command::CommandResult;

/// Handle DISCONNECT_BRIDGE
///
/// Only a pair sitting at `connected-bridge` can drop its bridge; once a
/// device is attached the device has to go first.
pub async fn handle_disconnect_bridge(ctx: &HandlerContext<'_>) -> CommandResult {
    if ctx.state.phase != ConnectionState::ConnectedBridge {
        return ctx.reject("bridge disconnect", "connected-bridge");
    }

    match ctx.manager.disconnect_bridge(ctx.state.name.bridge()).await {
        Ok(ack) => match error_message(&ack.error) {
            Some(message) => ctx.bridge_failure(message),
            None => CommandResult::Completed {
                message: format!("bridge {} disconnected", ctx.state.name.bridge()),
                events: vec![Event::DisconnectBridge { name: ctx.name() }],
            },
        },
        Err(e) => ctx.bridge_failure(format!("{e:#}")),
    }
}

/// Handle DISCONNECT_DEVICE
pub async fn handle_disconnect_device(ctx: &HandlerContext<'_>) -> CommandResult {
    if !device_connected(ctx.state) {
        return ctx.reject("device disconnect", "device-connected");
    }

    match ctx.manager.disconnect_device(ctx.state.name.as_str()).await {
        Ok(ack) => match error_message(&ack.error) {
            Some(message) => ctx.device_failure(message),
            None => CommandResult::Completed {
                message: format!("device {} disconnected", ctx.state.name),
                events: vec![Event::DisconnectDevice { name: ctx.name() }],
            },
        },
        Err(e) => ctx.device_failure(format!("{e:#}")),
    }
}
