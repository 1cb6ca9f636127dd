//! Command executor - dispatches resolved envelopes to handlers

use super::handlers::{self, HandlerContext};
use crate::device::{Actuator, SensorSource};
use crate::metrics::MetricsExporter;
use crate::settings::SettingsStore;
use incubator_shared::{now_ms, Action, CommandEnvelope, Response, Status, UNKNOWN_ACTION_BODY};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Result of command execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Command completed; `message` is the response body
    Completed { message: String },
    /// A collaborator failed while executing the command
    Failed { message: String },
    /// Request parameters were refused; nothing changed
    Rejected { message: String },
    /// No action could be resolved from the request
    Unknown,
}

impl CommandResult {
    pub fn into_response(self) -> Response {
        match self {
            CommandResult::Completed { message } => Response::new(Status::Ok, message),
            CommandResult::Failed { message } => {
                Response::new(Status::InternalError, format!("ERROR: {}", message))
            }
            CommandResult::Rejected { message } => {
                Response::new(Status::UnprocessableEntity, format!("ERROR: {}", message))
            }
            CommandResult::Unknown => Response::new(Status::NotFound, UNKNOWN_ACTION_BODY),
        }
    }
}

/// Executes resolved commands against the device collaborators
pub struct CommandExecutor {
    actuator: Arc<dyn Actuator>,
    sensors: Arc<dyn SensorSource>,
    settings: Arc<SettingsStore>,
    metrics: Arc<MetricsExporter>,
}

impl CommandExecutor {
    pub fn new(
        actuator: Arc<dyn Actuator>,
        sensors: Arc<dyn SensorSource>,
        settings: Arc<SettingsStore>,
        metrics: Arc<MetricsExporter>,
    ) -> Self {
        Self {
            actuator,
            sensors,
            settings,
            metrics,
        }
    }

    /// Execute the envelope's action and store the response on it.
    /// Envelopes that are not resolved are left untouched.
    pub async fn execute(&self, envelope: &mut CommandEnvelope) {
        if !envelope.is_resolved() {
            debug!("Skipping envelope in state {:?}", envelope.state());
            return;
        }

        let start_time = now_ms();
        let action = envelope.action();
        self.metrics.record_request(action);

        info!(
            "Executing command: action={} request={:?}",
            action,
            envelope.request_line()
        );

        let ctx = HandlerContext {
            unit_id: self.settings.unit_id(),
            status: self.actuator.status(),
            actuator: self.actuator.as_ref(),
            sensors: self.sensors.as_ref(),
            settings: self.settings.as_ref(),
            metrics: self.metrics.as_ref(),
        };

        let result = match action {
            Action::Start => handlers::handle_start(&ctx).await,
            Action::Stop => handlers::handle_stop(&ctx).await,
            Action::LightOn => handlers::handle_light(&ctx, true).await,
            Action::LightOff => handlers::handle_light(&ctx, false).await,
            Action::AirCirculation => handlers::handle_air_circulation(&ctx).await,
            Action::Reboot => handlers::handle_reboot(&ctx).await,
            Action::Reset => handlers::handle_reset(&ctx).await,
            Action::ExportMetrics => handlers::handle_export_metrics(&ctx).await,
            Action::SaveSettings => handlers::handle_save_settings(&ctx, envelope.params()).await,
            Action::NotDefined => CommandResult::Unknown,
        };

        let processing_time = now_ms().saturating_sub(start_time);

        match &result {
            CommandResult::Completed { message } => {
                if action == Action::ExportMetrics {
                    info!("  Command completed: {} bytes of metrics", message.len());
                } else {
                    info!("  Command completed: {}", message);
                }
            }
            CommandResult::Failed { message } => error!("  Command failed: {}", message),
            CommandResult::Rejected { message } => warn!("  Command rejected: {}", message),
            CommandResult::Unknown => warn!("  Unknown action in {:?}", envelope.request_line()),
        }
        debug!("  Processing time: {}ms", processing_time);

        if let Err(e) = envelope.respond(result.into_response()) {
            error!("Failed to store response: {}", e);
        }
    }
}
