//! Prometheus exposition for the `exportmetrics` action

use crate::device::{ActuatorStatus, SensorReadings};
use incubator_shared::{Action, DeviceConfiguration};
use prometheus::{Encoder, Gauge, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("Exposition is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Owns the registry and every exported series
pub struct MetricsExporter {
    registry: Registry,
    requests_total: IntCounterVec,
    unit_id: IntGauge,
    setpoint_temperature: Gauge,
    setpoint_humidity: Gauge,
    temperature: Gauge,
    humidity: Gauge,
    running: IntGauge,
    light_on: IntGauge,
    air_circulation_cycles: IntGauge,
}

impl MetricsExporter {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("incubator_requests_total", "Requests dispatched, by action"),
            &["action"],
        )?;
        let unit_id = IntGauge::with_opts(Opts::new(
            "incubator_unit_id",
            "Provisioned unit id",
        ))?;
        let setpoint_temperature = Gauge::with_opts(Opts::new(
            "incubator_setpoint_temperature_celsius",
            "Active temperature setpoint",
        ))?;
        let setpoint_humidity = Gauge::with_opts(Opts::new(
            "incubator_setpoint_humidity_percent",
            "Active relative humidity setpoint",
        ))?;
        let temperature = Gauge::with_opts(Opts::new(
            "incubator_temperature_celsius",
            "Measured chamber temperature",
        ))?;
        let humidity = Gauge::with_opts(Opts::new(
            "incubator_humidity_percent",
            "Measured chamber relative humidity",
        ))?;
        let running = IntGauge::with_opts(Opts::new(
            "incubator_running",
            "1 while climate regulation is active",
        ))?;
        let light_on = IntGauge::with_opts(Opts::new(
            "incubator_light_on",
            "1 while the chamber light is on",
        ))?;
        let air_circulation_cycles = IntGauge::with_opts(Opts::new(
            "incubator_air_circulation_cycles",
            "Air circulation cycles since power-on",
        ))?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(unit_id.clone()))?;
        registry.register(Box::new(setpoint_temperature.clone()))?;
        registry.register(Box::new(setpoint_humidity.clone()))?;
        registry.register(Box::new(temperature.clone()))?;
        registry.register(Box::new(humidity.clone()))?;
        registry.register(Box::new(running.clone()))?;
        registry.register(Box::new(light_on.clone()))?;
        registry.register(Box::new(air_circulation_cycles.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            unit_id,
            setpoint_temperature,
            setpoint_humidity,
            temperature,
            humidity,
            running,
            light_on,
            air_circulation_cycles,
        })
    }

    /// Count one dispatched request
    pub fn record_request(&self, action: Action) {
        let label = action.to_string();
        self.requests_total
            .with_label_values(&[label.as_str()])
            .inc();
    }

    /// Refresh the gauges and encode the registry in text format.
    /// Measured values are left at their last value when `readings` is `None`.
    pub fn render(
        &self,
        config: &DeviceConfiguration,
        readings: Option<&SensorReadings>,
        status: &ActuatorStatus,
    ) -> Result<String, MetricsError> {
        self.unit_id.set(i64::from(config.id));
        self.setpoint_temperature.set(config.setpoint_temperature);
        self.setpoint_humidity.set(config.setpoint_humidity);

        if let Some(readings) = readings {
            self.temperature.set(readings.temperature);
            self.humidity.set(readings.humidity);
        }

        self.running.set(i64::from(status.running));
        self.light_on.set(i64::from(status.light_on));
        self.air_circulation_cycles
            .set(i64::from(status.circulation_cycles));

        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
