//! Reboot and reset handlers

use super::HandlerContext;
use crate::command::CommandResult;
use tracing::info;

/// Handle REBOOT
pub async fn handle_reboot(ctx: &HandlerContext<'_>) -> CommandResult {
    info!("  [REBOOT] Unit {} restarting", ctx.unit_id);

    match ctx.actuator.reboot().await {
        Ok(()) => CommandResult::Completed {
            message: "Rebooting".into(),
        },
        Err(e) => CommandResult::Failed {
            message: format!("Reboot failed: {}", e),
        },
    }
}

/// Handle RESET: outputs go back to their power-on state. Settings are only
/// ever changed through SAVESETTINGS, so they are kept.
pub async fn handle_reset(ctx: &HandlerContext<'_>) -> CommandResult {
    match ctx.actuator.reset().await {
        Ok(()) => CommandResult::Completed {
            message: "Outputs reset".into(),
        },
        Err(e) => CommandResult::Failed {
            message: format!("Reset failed: {}", e),
        },
    }
}
