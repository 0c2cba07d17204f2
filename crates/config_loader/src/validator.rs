//! Configuration validation
//!
//! Field rules come from the `validator` derive on `VisionConfig`; the
//! cross-field rules live here:
//! - non-empty mock serials are unique
//! - device selection indices are non-negative
//! - at least one channel is streamed
//! - registration needs both color and depth
//! - sink names are unique

use std::collections::HashSet;

use contracts::{ContractError, VisionConfig};
use validator::Validate;

/// First violated rule, or `Ok(())`
pub fn validate(config: &VisionConfig) -> Result<(), ContractError> {
    validate_fields(config)?;
    validate_serials(config)?;
    validate_selection(config)?;
    validate_streaming(config)?;
    validate_sinks(config)?;
    Ok(())
}

fn validate_fields(config: &VisionConfig) -> Result<(), ContractError> {
    config
        .validate()
        .map_err(|e| ContractError::config_validation("config", e.to_string()))
}

fn validate_serials(config: &VisionConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, serial) in config.backend.serials.iter().enumerate() {
        // an empty serial simulates an unresolved device
        if !serial.is_empty() && !seen.insert(serial.as_str()) {
            return Err(ContractError::config_validation(
                format!("backend.serials[{idx}]"),
                format!("duplicate serial '{serial}'"),
            ));
        }
    }
    Ok(())
}

fn validate_selection(config: &VisionConfig) -> Result<(), ContractError> {
    if let Some(index) = config.devices.select.iter().find(|i| **i < 0) {
        return Err(ContractError::config_validation(
            "devices.select",
            format!("device index must be >= 0, got {index}"),
        ));
    }
    Ok(())
}

fn validate_streaming(config: &VisionConfig) -> Result<(), ContractError> {
    if config.streaming.channels.is_empty() {
        return Err(ContractError::config_validation(
            "streaming.channels",
            "at least one channel is required",
        ));
    }
    if config.registration.enabled && !config.streaming.can_register() {
        return Err(ContractError::config_validation(
            "registration.enabled",
            format!(
                "registration needs color and depth, streaming {}",
                config.streaming.channels
            ),
        ));
    }
    Ok(())
}

fn validate_sinks(config: &VisionConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in config.sinks.iter().enumerate() {
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].name"),
                format!("duplicate sink name '{}'", sink.name),
            ));
        }
    }
    Ok(())
}
