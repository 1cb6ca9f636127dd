//! Climate sensor abstraction

use crate::settings::SettingsReader;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    #[error("Sensor unavailable: {0}")]
    Unavailable(String),
}

/// One measurement of the chamber climate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReadings {
    /// Chamber temperature in °C
    pub temperature: f64,
    /// Chamber relative humidity in %RH
    pub humidity: f64,
}

#[async_trait]
pub trait SensorSource: Send + Sync {
    async fn read(&self) -> Result<SensorReadings, SensorError>;
}

/// Sensor stand-in that reports the active setpoints with a small
/// deterministic oscillation
pub struct SimulatedSensors {
    settings: SettingsReader,
    samples: AtomicU32,
    disconnected: AtomicBool,
}

/// Oscillation period in samples
const DRIFT_PERIOD: u32 = 8;
const DRIFT_STEP: f64 = 0.05;

impl SimulatedSensors {
    pub fn new(settings: SettingsReader) -> Self {
        Self {
            settings,
            samples: AtomicU32::new(0),
            disconnected: AtomicBool::new(false),
        }
    }

    /// Simulate a detached sensor bus
    #[cfg(test)]
    pub fn set_disconnected(&self, disconnected: bool) {
        self.disconnected.store(disconnected, Ordering::SeqCst);
    }

    fn drift(sample: u32) -> f64 {
        let phase = (sample % DRIFT_PERIOD) as f64;
        let half = (DRIFT_PERIOD / 2) as f64;
        // Triangle wave centred on zero
        (half - (phase - half).abs() - half / 2.0) * DRIFT_STEP
    }
}

#[async_trait]
impl SensorSource for SimulatedSensors {
    async fn read(&self) -> Result<SensorReadings, SensorError> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(SensorError::Unavailable("no response on sensor bus".into()));
        }

        let config = self.settings.snapshot().await;
        let sample = self.samples.fetch_add(1, Ordering::SeqCst);
        let drift = Self::drift(sample);

        Ok(SensorReadings {
            temperature: config.setpoint_temperature + drift,
            humidity: (config.setpoint_humidity - drift * 4.0).clamp(0.0, 100.0),
        })
    }
}
