//! Hardware collaborators: actuators and climate sensors
//!
//! The firmware drives these through traits so the command handlers never
//! touch pins directly. The simulated implementations are used on
//! development hosts.

pub mod actuator;
pub mod sensors;

pub use actuator::{Actuator, ActuatorStatus, SimulatedActuator};
pub use sensors::{SensorReadings, SensorSource, SimulatedSensors};
