// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Offload Configuration System
//!
//! Type-safe configuration loader for the offload runtime with support for:
//! - TOML file parsing (`offload_configuration.toml`)
//! - Environment variable overrides (including the OpenMP team variables)
//! - CLI argument overrides
//!
//! ## Usage
//!
//! ```rust,no_run
//! use offload_config::{load_config_or_default, OffloadConfig};
//!
//! let config: OffloadConfig = load_config_or_default(None, None).expect("invalid config");
//! println!("Devices: {}", config.device.num_devices);
//! println!("Team limit: {:?}", config.teams.team_limit());
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod loader;
pub mod types;
pub mod validation;

pub use loader::{
    apply_cli_overrides, apply_environment_overrides, find_config_file, load_config,
    load_config_or_default, CONFIG_FILE_NAME,
};
pub use types::*;
pub use validation::{validate_config, ConfigValidationError};

/// Re-export for convenience
pub use serde;

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found. Searched: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax: {0}")]
    ParseError(String),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_types_compile() {
        let config = OffloadConfig::default();
        assert_eq!(config.device.num_devices, 1);
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: ConfigError = toml::from_str::<OffloadConfig>("[device\nnum_devices = 1")
            .unwrap_err()
            .into();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
