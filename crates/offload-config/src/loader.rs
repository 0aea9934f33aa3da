// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! This module implements the 3-tier configuration loading system:
//! 1. TOML file (base defaults)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{ConfigError, ConfigResult, OffloadConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

/// File name searched for when no explicit path is given
pub const CONFIG_FILE_NAME: &str = "offload_configuration.toml";

/// Find the offload configuration file
///
/// Search order:
/// 1. `OFFLOAD_CONFIG_PATH` environment variable
/// 2. Current working directory: `./offload_configuration.toml`
/// 3. Parent directories (up to 5 levels)
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("OFFLOAD_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by OFFLOAD_CONFIG_PATH not found: {}",
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));

        let mut current = cwd.clone();
        for _ in 0..5 {
            if let Some(parent) = current.parent() {
                search_paths.push(parent.join(CONFIG_FILE_NAME));
                current = parent.to_path_buf();
            }
        }
    }

    for path in &search_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\nSet OFFLOAD_CONFIG_PATH to specify a custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from a TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, will search for config file.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if config file is not found or contains invalid TOML
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<OffloadConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: OffloadConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config);
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli);
    }

    Ok(config)
}

/// Load configuration, falling back to built-in defaults when no file exists
///
/// An explicit `config_path` that does not exist is still an error; only the
/// automatic search is allowed to come up empty. Overrides are applied either way.
pub fn load_config_or_default(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<OffloadConfig> {
    if config_path.is_some() {
        return load_config(config_path, cli_args);
    }

    match find_config_file() {
        Ok(path) => load_config(Some(&path), cli_args),
        Err(ConfigError::FileNotFound(_)) if env::var("OFFLOAD_CONFIG_PATH").is_err() => {
            let mut config = OffloadConfig::default();
            apply_environment_overrides(&mut config);
            if let Some(cli) = cli_args {
                apply_cli_overrides(&mut config, cli);
            }
            Ok(config)
        }
        Err(e) => Err(e),
    }
}

/// Parse a numeric override, keeping the current value on failure
fn parse_override<T: FromStr>(source: &str, raw: &str, current: &mut T) {
    match raw.trim().parse::<T>() {
        Ok(value) => *current = value,
        Err(_) => warn!(
            target: "offload-config",
            "Ignoring non-numeric value {:?} for {}",
            raw,
            source
        ),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `OMP_TEAM_LIMIT` -> `teams.team_limit`
/// - `OMP_NUM_TEAMS` -> `teams.num_teams`
/// - `OFFLOAD_NUM_DEVICES` -> `device.num_devices`
/// - `OFFLOAD_IMAGE_DUMP` -> `device.image_dump_path` (empty disables)
/// - `OFFLOAD_MEMKIND_BACKENDS` -> `memory.backends` (comma separated)
/// - `OFFLOAD_LOG_LEVEL` -> `logging.level`
pub fn apply_environment_overrides(config: &mut OffloadConfig) {
    if let Ok(value) = env::var("OMP_TEAM_LIMIT") {
        parse_override("OMP_TEAM_LIMIT", &value, &mut config.teams.team_limit);
    }
    if let Ok(value) = env::var("OMP_NUM_TEAMS") {
        parse_override("OMP_NUM_TEAMS", &value, &mut config.teams.num_teams);
    }
    if let Ok(value) = env::var("OFFLOAD_NUM_DEVICES") {
        parse_override("OFFLOAD_NUM_DEVICES", &value, &mut config.device.num_devices);
    }
    if let Ok(value) = env::var("OFFLOAD_IMAGE_DUMP") {
        config.device.image_dump_path = if value.is_empty() {
            None
        } else {
            Some(PathBuf::from(value))
        };
    }
    if let Ok(value) = env::var("OFFLOAD_MEMKIND_BACKENDS") {
        config.memory.backends = split_list(&value);
    }
    if let Ok(value) = env::var("OFFLOAD_LOG_LEVEL") {
        config.logging.level = value;
    }
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - Map of CLI arguments (e.g., `{"num_devices": "2", "team_limit": "64"}`)
pub fn apply_cli_overrides(config: &mut OffloadConfig, cli_args: &HashMap<String, String>) {
    if let Some(value) = cli_args.get("num_devices") {
        parse_override("num_devices", value, &mut config.device.num_devices);
    }
    if let Some(value) = cli_args.get("address_base") {
        parse_override("address_base", value, &mut config.device.address_base);
    }
    if let Some(value) = cli_args.get("max_allocation_size") {
        parse_override("max_allocation_size", value, &mut config.device.max_allocation_size);
    }
    if let Some(value) = cli_args.get("image_dump_path") {
        config.device.image_dump_path = if value.is_empty() {
            None
        } else {
            Some(PathBuf::from(value))
        };
    }
    if let Some(value) = cli_args.get("team_limit") {
        parse_override("team_limit", value, &mut config.teams.team_limit);
    }
    if let Some(value) = cli_args.get("num_teams") {
        parse_override("num_teams", value, &mut config.teams.num_teams);
    }
    if let Some(value) = cli_args.get("backends") {
        config.memory.backends = split_list(value);
    }
    if let Some(value) = cli_args.get("hbw_page_size") {
        parse_override("hbw_page_size", value, &mut config.memory.hbw_page_size);
    }
    if let Some(value) = cli_args.get("log_level") {
        config.logging.level = value.clone();
    }
}
