//! Command execution infrastructure for the controller
//!
//! This module handles:
//! - Dispatching resolved envelopes to the handler for their action
//! - Mapping handler outcomes to response statuses
//! - Counting requests for the metrics exporter

mod executor;
pub mod handlers;

pub use executor::{CommandExecutor, CommandResult};
