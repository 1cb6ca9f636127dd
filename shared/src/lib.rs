//! Incubator Shared Types
//!
//! This crate provides the command envelope, the request codec and the
//! device configuration record shared by the incubator controller firmware
//! and its tooling.

pub mod codec;
pub mod envelope;
pub mod settings;
pub mod state_machine;

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

pub use codec::ParseError;
pub use envelope::{
    CommandEnvelope, FormParams, Response, Status, MALFORMED_REQUEST_BODY, UNKNOWN_ACTION_BODY,
};
pub use settings::{
    DefaultProfile, DeviceConfiguration, MacAddress, ValidationError, FACTORY_PROFILES,
};
pub use state_machine::{EnvelopeEvent, EnvelopeState, InvalidTransition};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Operating limits for the controller
pub mod limits {
    /// Maximum length of the request line, terminator excluded
    pub const MAX_REQUEST_LINE_BYTES: usize = 1024;

    /// Maximum size of the raw header block
    pub const MAX_HEADER_BYTES: usize = 4096;

    /// Maximum accepted request body
    pub const MAX_BODY_BYTES: usize = 2048;

    /// Lowest temperature setpoint the incubator may regulate to (°C)
    pub const SETPOINT_TEMPERATURE_MIN: f64 = 20.0;

    /// Highest temperature setpoint the incubator may regulate to (°C)
    pub const SETPOINT_TEMPERATURE_MAX: f64 = 40.0;

    /// Relative humidity setpoint band (%RH)
    pub const SETPOINT_HUMIDITY_MIN: f64 = 0.0;
    pub const SETPOINT_HUMIDITY_MAX: f64 = 100.0;

    /// Layout version of the persisted settings record
    pub const SETTINGS_FORMAT_VERSION: u8 = 1;
}

/// Commands the controller can execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Action {
    #[default]
    NotDefined,
    Start,
    ExportMetrics,
    Stop,
    Reboot,
    Reset,
    LightOn,
    LightOff,
    SaveSettings,
    AirCirculation,
}

impl Action {
    /// Every action reachable from the wire vocabulary
    pub const ALL: [Action; 9] = [
        Action::Start,
        Action::ExportMetrics,
        Action::Stop,
        Action::Reboot,
        Action::Reset,
        Action::LightOn,
        Action::LightOff,
        Action::SaveSettings,
        Action::AirCirculation,
    ];

    /// Resolve a wire keyword. Matching is case-insensitive and ignores
    /// surrounding whitespace; anything else is `NotDefined`.
    pub fn from_keyword(text: &str) -> Action {
        let token = text.trim();
        Action::ALL
            .into_iter()
            .find(|action| {
                action
                    .keyword()
                    .is_some_and(|kw| kw.eq_ignore_ascii_case(token))
            })
            .unwrap_or(Action::NotDefined)
    }

    /// Canonical wire keyword for this action
    pub fn keyword(&self) -> Option<&'static str> {
        match self {
            Action::NotDefined => None,
            Action::Start => Some("start"),
            Action::ExportMetrics => Some("exportmetrics"),
            Action::Stop => Some("stop"),
            Action::Reboot => Some("reboot"),
            Action::Reset => Some("reset"),
            Action::LightOn => Some("lighton"),
            Action::LightOff => Some("lightoff"),
            Action::SaveSettings => Some("savesettings"),
            Action::AirCirculation => Some("aircirculation"),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword().unwrap_or("notdefined"))
    }
}
