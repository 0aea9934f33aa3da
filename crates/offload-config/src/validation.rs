// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Ensures configuration values are within valid ranges before the runtime
//! builds devices and probes memory-kind backends from them.

use crate::{ConfigError, ConfigResult, OffloadConfig, KNOWN_BACKENDS, UNSET};

/// Validation errors that can occur during config validation
#[derive(Debug, Clone)]
pub enum ConfigValidationError {
    MissingRequired { field: String },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRequired { field } => {
                write!(f, "Missing required configuration: {}", field)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete configuration
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every problem found
pub fn validate_config(config: &OffloadConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_device(config, &mut errors);
    validate_teams(config, &mut errors);
    validate_memory(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn validate_device(config: &OffloadConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.device.num_devices == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "device.num_devices".to_string(),
            reason: "at least one device is required".to_string(),
        });
    }
    if config.device.address_base <= 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "device.address_base".to_string(),
            reason: "must be positive so the null address is never handed out".to_string(),
        });
    }
    if config.device.max_allocation_size == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "device.max_allocation_size".to_string(),
            reason: "must be positive".to_string(),
        });
    }
    if let Some(path) = &config.device.image_dump_path {
        if path.as_os_str().is_empty() {
            errors.push(ConfigValidationError::MissingRequired {
                field: "device.image_dump_path".to_string(),
            });
        }
    }
}

fn validate_teams(config: &OffloadConfig, errors: &mut Vec<ConfigValidationError>) {
    for (field, value) in [
        ("teams.team_limit", config.teams.team_limit),
        ("teams.num_teams", config.teams.num_teams),
    ] {
        if value != UNSET && value <= 0 {
            errors.push(ConfigValidationError::InvalidValue {
                field: field.to_string(),
                reason: format!("must be {} (unset) or positive, got {}", UNSET, value),
            });
        }
    }
}

fn validate_memory(config: &OffloadConfig, errors: &mut Vec<ConfigValidationError>) {
    for name in &config.memory.backends {
        if !KNOWN_BACKENDS.contains(&name.as_str()) {
            errors.push(ConfigValidationError::InvalidValue {
                field: "memory.backends".to_string(),
                reason: format!(
                    "unknown backend '{}' (expected one of: {})",
                    name,
                    KNOWN_BACKENDS.join(", ")
                ),
            });
        }
    }
    if config.memory.hbw_page_size != 0 && !config.memory.hbw_page_size.is_power_of_two() {
        errors.push(ConfigValidationError::InvalidValue {
            field: "memory.hbw_page_size".to_string(),
            reason: "must be 0 or a power of two".to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = OffloadConfig::default();
        let result = validate_config(&config);
        if let Err(e) = &result {
            eprintln!("Validation error: {}", e);
        }
        assert!(result.is_ok());
    }

    #[test]
    fn test_zero_devices_rejected() {
        let mut config = OffloadConfig::default();
        config.device.num_devices = 0;

        let result = validate_config(&config);
        match result {
            Err(ConfigError::ValidationError(msg)) => assert!(msg.contains("device.num_devices")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_null_address_base_rejected() {
        let mut config = OffloadConfig::default();
        config.device.address_base = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_team_values() {
        let mut config = OffloadConfig::default();
        config.teams.team_limit = 128;
        assert!(validate_config(&config).is_ok());

        config.teams.num_teams = -7;
        match validate_config(&config) {
            Err(ConfigError::ValidationError(msg)) => assert!(msg.contains("teams.num_teams")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_backend() {
        let mut config = OffloadConfig::default();
        config.memory.backends.push("quantum".to_string());

        match validate_config(&config) {
            Err(ConfigError::ValidationError(msg)) => assert!(msg.contains("quantum")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_page_size_must_be_power_of_two() {
        let mut config = OffloadConfig::default();
        config.memory.hbw_page_size = 3000;
        assert!(validate_config(&config).is_err());

        config.memory.hbw_page_size = 2 * 1024 * 1024;
        assert!(validate_config(&config).is_ok());
    }
}
