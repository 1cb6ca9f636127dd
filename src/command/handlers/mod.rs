//! Command handlers, one module per command family

mod control;
mod metrics;
mod settings;
mod system;

pub use control::{handle_air_circulation, handle_light, handle_start, handle_stop};
pub use metrics::handle_export_metrics;
pub use settings::handle_save_settings;
pub use system::{handle_reboot, handle_reset};

use crate::device::{Actuator, ActuatorStatus, SensorSource};
use crate::metrics::MetricsExporter;
use crate::settings::SettingsStore;

/// Context passed to command handlers
pub struct HandlerContext<'a> {
    pub unit_id: u32,
    /// Actuator state when the command was dispatched
    pub status: ActuatorStatus,
    pub actuator: &'a dyn Actuator,
    pub sensors: &'a dyn SensorSource,
    pub settings: &'a SettingsStore,
    pub metrics: &'a MetricsExporter,
}
