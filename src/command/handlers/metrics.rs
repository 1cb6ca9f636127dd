//! Metrics export handler

use super::HandlerContext;
use crate::command::CommandResult;
use tracing::warn;

/// Handle EXPORTMETRICS
///
/// A sensor failure does not fail the export; the measured series keep their
/// last value and the setpoints are still reported.
pub async fn handle_export_metrics(ctx: &HandlerContext<'_>) -> CommandResult {
    let config = ctx.settings.snapshot().await;

    let readings = match ctx.sensors.read().await {
        Ok(readings) => Some(readings),
        Err(e) => {
            warn!("  [METRICS] Sensor read failed: {}", e);
            None
        }
    };

    match ctx.metrics.render(&config, readings.as_ref(), &ctx.status) {
        Ok(text) => CommandResult::Completed { message: text },
        Err(e) => CommandResult::Failed {
            message: format!("Metrics export failed: {}", e),
        },
    }
}
