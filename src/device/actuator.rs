//! Actuator abstraction for heater, humidifier, light and fans

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use thiserror::Error;
use tracing::info;

/// Errors reported by actuator hardware
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActuatorError {
    #[error("Actuator fault: {0}")]
    Fault(String),
}

/// Snapshot of actuator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActuatorStatus {
    /// Climate regulation is active
    pub running: bool,
    pub light_on: bool,
    /// Air circulation cycles since power-on
    pub circulation_cycles: u32,
    /// Restarts requested since the process started
    pub reboots: u32,
}

/// Hardware-facing side of the controller
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Begin regulating toward the active setpoints
    async fn start(&self) -> Result<(), ActuatorError>;

    /// Stop regulation and switch heater/humidifier off
    async fn stop(&self) -> Result<(), ActuatorError>;

    async fn set_light(&self, on: bool) -> Result<(), ActuatorError>;

    /// Run one air circulation cycle
    async fn circulate_air(&self) -> Result<(), ActuatorError>;

    /// Restart the controller
    async fn reboot(&self) -> Result<(), ActuatorError>;

    /// Return every output to its power-on state without restarting
    async fn reset(&self) -> Result<(), ActuatorError>;

    fn status(&self) -> ActuatorStatus;
}

/// Actuator that only records and logs what it was asked to do
#[derive(Debug, Default)]
pub struct SimulatedActuator {
    running: AtomicBool,
    light_on: AtomicBool,
    circulation_cycles: AtomicU32,
    reboots: AtomicU32,
}

impl SimulatedActuator {
    pub fn new() -> Self {
        Self::default()
    }

    fn power_on_state(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.light_on.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Actuator for SimulatedActuator {
    async fn start(&self) -> Result<(), ActuatorError> {
        info!("[ACTUATOR] Regulation started");
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ActuatorError> {
        info!("[ACTUATOR] Regulation stopped");
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn set_light(&self, on: bool) -> Result<(), ActuatorError> {
        info!("[ACTUATOR] Light {}", if on { "on" } else { "off" });
        self.light_on.store(on, Ordering::SeqCst);
        Ok(())
    }

    async fn circulate_air(&self) -> Result<(), ActuatorError> {
        let cycle = self.circulation_cycles.fetch_add(1, Ordering::SeqCst) + 1;
        info!("[ACTUATOR] Air circulation cycle {}", cycle);
        Ok(())
    }

    async fn reboot(&self) -> Result<(), ActuatorError> {
        let count = self.reboots.fetch_add(1, Ordering::SeqCst) + 1;
        info!("[ACTUATOR] Reboot #{} (simulated)", count);
        self.power_on_state();
        Ok(())
    }

    async fn reset(&self) -> Result<(), ActuatorError> {
        info!("[ACTUATOR] Outputs reset to power-on state");
        self.power_on_state();
        Ok(())
    }

    fn status(&self) -> ActuatorStatus {
        ActuatorStatus {
            running: self.running.load(Ordering::SeqCst),
            light_on: self.light_on.load(Ordering::SeqCst),
            circulation_cycles: self.circulation_cycles.load(Ordering::SeqCst),
            reboots: self.reboots.load(Ordering::SeqCst),
        }
    }
}
