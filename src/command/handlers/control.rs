//! Climate regulation, light and air circulation handlers

use super::HandlerContext;
use crate::command::CommandResult;
use tracing::debug;

/// Handle START: begin regulating toward the active setpoints
pub async fn handle_start(ctx: &HandlerContext<'_>) -> CommandResult {
    if ctx.status.running {
        return CommandResult::Completed {
            message: "Already running".into(),
        };
    }

    let config = ctx.settings.snapshot().await;
    debug!(
        "  [START] Target {:.1}C {:.1}%RH",
        config.setpoint_temperature, config.setpoint_humidity
    );

    match ctx.actuator.start().await {
        Ok(()) => CommandResult::Completed {
            message: format!(
                "Regulation started at {:.1}C {:.1}%RH",
                config.setpoint_temperature, config.setpoint_humidity
            ),
        },
        Err(e) => CommandResult::Failed {
            message: format!("Start failed: {}", e),
        },
    }
}

/// Handle STOP
pub async fn handle_stop(ctx: &HandlerContext<'_>) -> CommandResult {
    if !ctx.status.running {
        return CommandResult::Completed {
            message: "Already stopped".into(),
        };
    }

    match ctx.actuator.stop().await {
        Ok(()) => CommandResult::Completed {
            message: "Regulation stopped".into(),
        },
        Err(e) => CommandResult::Failed {
            message: format!("Stop failed: {}", e),
        },
    }
}

/// Handle LIGHTON / LIGHTOFF
pub async fn handle_light(ctx: &HandlerContext<'_>, on: bool) -> CommandResult {
    let label = if on { "on" } else { "off" };

    if ctx.status.light_on == on {
        return CommandResult::Completed {
            message: format!("Light already {}", label),
        };
    }

    match ctx.actuator.set_light(on).await {
        Ok(()) => CommandResult::Completed {
            message: format!("Light {}", label),
        },
        Err(e) => CommandResult::Failed {
            message: format!("Light {} failed: {}", label, e),
        },
    }
}

/// Handle AIRCIRCULATION: one fan cycle, accepted whether or not regulation runs
pub async fn handle_air_circulation(ctx: &HandlerContext<'_>) -> CommandResult {
    match ctx.actuator.circulate_air().await {
        Ok(()) => CommandResult::Completed {
            message: "Air circulation cycle started".into(),
        },
        Err(e) => CommandResult::Failed {
            message: format!("Air circulation failed: {}", e),
        },
    }
}
