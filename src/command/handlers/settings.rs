//! Settings update handler

use super::HandlerContext;
use crate::command::CommandResult;
use crate::settings::SettingsError;
use incubator_shared::{DeviceConfiguration, FormParams, ValidationError};
use std::net::Ipv4Addr;
use std::str::FromStr;
use tracing::debug;

/// Build a candidate record by applying request parameters onto `current`.
///
/// Recognised keys: `temp`/`temperature`, `humidity`, `ip`, `subnet`/`mask`.
/// Other keys are ignored. Ranges are not checked here; the store does that.
pub fn apply_updates(
    current: &DeviceConfiguration,
    params: &FormParams,
) -> Result<DeviceConfiguration, ValidationError> {
    let mut candidate = current.clone();
    let mut changed = false;

    if let Some(value) = lookup(params, &["temp", "temperature"]) {
        candidate.setpoint_temperature = parse_field("temperature", value)?;
        changed = true;
    }
    if let Some(value) = lookup(params, &["humidity"]) {
        candidate.setpoint_humidity = parse_field("humidity", value)?;
        changed = true;
    }
    if let Some(value) = lookup(params, &["ip"]) {
        candidate.ip_address = parse_field::<Ipv4Addr>("ip", value)?;
        changed = true;
    }
    if let Some(value) = lookup(params, &["subnet", "mask"]) {
        candidate.subnet_mask = parse_field::<Ipv4Addr>("subnet", value)?;
        changed = true;
    }

    if !changed {
        return Err(ValidationError::NothingToSave);
    }

    Ok(candidate)
}

/// First alias present in `params`
fn lookup<'a>(params: &'a FormParams, aliases: &[&str]) -> Option<&'a str> {
    aliases.iter().find_map(|alias| params.get(alias))
}

fn parse_field<T: FromStr>(field: &'static str, value: &str) -> Result<T, ValidationError> {
    value
        .trim()
        .parse()
        .map_err(|_| ValidationError::UnparseableField {
            field,
            value: value.to_string(),
        })
}

/// Handle SAVESETTINGS
pub async fn handle_save_settings(ctx: &HandlerContext<'_>, params: &FormParams) -> CommandResult {
    let current = ctx.settings.snapshot().await;

    let candidate = match apply_updates(&current, params) {
        Ok(candidate) => candidate,
        Err(e) => {
            return CommandResult::Rejected {
                message: e.to_string(),
            }
        }
    };

    debug!(
        "  [SETTINGS] Candidate {:.1}C {:.1}%RH ip={} mask={}",
        candidate.setpoint_temperature,
        candidate.setpoint_humidity,
        candidate.ip_address,
        candidate.subnet_mask
    );

    match ctx.settings.save(candidate.clone()).await {
        Ok(()) => CommandResult::Completed {
            message: format!(
                "Settings saved: {:.1}C {:.1}%RH ip={} mask={}",
                candidate.setpoint_temperature,
                candidate.setpoint_humidity,
                candidate.ip_address,
                candidate.subnet_mask
            ),
        },
        Err(SettingsError::Validation(e)) => CommandResult::Rejected {
            message: e.to_string(),
        },
        Err(e) => CommandResult::Failed {
            message: e.to_string(),
        },
    }
}
