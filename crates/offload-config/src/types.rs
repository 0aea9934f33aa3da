// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections in
//! `offload_configuration.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Value used by the OpenMP team variables to mean "not set".
pub const UNSET: i32 = -1;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OffloadConfig {
    pub device: DeviceConfig,
    pub teams: TeamsConfig,
    pub memory: MemoryConfig,
    pub logging: LoggingConfig,
}

/// Synthetic device configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Number of devices exposed by the registry
    pub num_devices: usize,
    /// First device address handed out; keeps the null range reserved
    pub address_base: i64,
    /// Exclusive upper bound for a single allocation, in bytes
    pub max_allocation_size: u64,
    /// Where each loaded image is written verbatim (None = disabled)
    pub image_dump_path: Option<PathBuf>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            num_devices: 1,
            address_base: 16,
            max_allocation_size: 1 << 32,
            image_dump_path: None,
        }
    }
}

/// OpenMP team limits (`OMP_TEAM_LIMIT`, `OMP_NUM_TEAMS`)
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TeamsConfig {
    pub team_limit: i32,
    pub num_teams: i32,
}

impl Default for TeamsConfig {
    fn default() -> Self {
        Self {
            team_limit: UNSET,
            num_teams: UNSET,
        }
    }
}

impl TeamsConfig {
    /// Team-count limit, `None` when unset
    pub fn team_limit(&self) -> Option<u32> {
        positive(self.team_limit)
    }

    /// Default team count, `None` when unset
    pub fn num_teams(&self) -> Option<u32> {
        positive(self.num_teams)
    }
}

fn positive(value: i32) -> Option<u32> {
    u32::try_from(value).ok().filter(|v| *v > 0)
}

/// Memory-kind backend selection
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Backends to probe, most capable first ("high-bandwidth", "large-capacity", "memkind")
    pub backends: Vec<String>,
    /// Shared library names tried for the high-bandwidth backend
    pub high_bandwidth_libraries: Vec<String>,
    /// Shared library names tried for the large-capacity backend
    pub large_capacity_libraries: Vec<String>,
    /// Shared library names tried for the kind-based (libmemkind) backend
    pub memkind_libraries: Vec<String>,
    /// Required page size for high-bandwidth resources (0 = no filter)
    pub hbw_page_size: usize,
    /// Pool size used for arenas of the standard allocators (0 = backend default)
    pub default_pool_size: usize,
}

/// Backend names accepted in `memory.backends`
pub const KNOWN_BACKENDS: &[&str] = &["high-bandwidth", "large-capacity", "memkind"];

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backends: KNOWN_BACKENDS.iter().map(|s| s.to_string()).collect(),
            high_bandwidth_libraries: vec!["libsicm.so".to_string(), "libsicm.so.0".to_string()],
            large_capacity_libraries: vec!["libsicm_optane.so".to_string()],
            memkind_libraries: vec!["libmemkind.so".to_string(), "libmemkind.so.0".to_string()],
            hbw_page_size: 0,
            default_pool_size: 0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level for all crates (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_sentinel_is_unset() {
        let teams = TeamsConfig::default();
        assert_eq!(teams.team_limit(), None);
        assert_eq!(teams.num_teams(), None);

        let teams = TeamsConfig {
            team_limit: 64,
            num_teams: 0,
        };
        assert_eq!(teams.team_limit(), Some(64));
        assert_eq!(teams.num_teams(), None);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: OffloadConfig = toml::from_str("[device]\nnum_devices = 2\n").unwrap();
        assert_eq!(config.device.num_devices, 2);
        assert_eq!(config.device.address_base, 16);
        assert_eq!(config.device.max_allocation_size, 1 << 32);
        assert!(config.device.image_dump_path.is_none());
        assert_eq!(
            config.memory.backends,
            vec!["high-bandwidth", "large-capacity", "memkind"]
        );
        assert_eq!(config.memory.memkind_libraries[0], "libmemkind.so");
    }

    #[test]
    fn test_config_serializes_to_json() {
        let json = serde_json::to_string(&OffloadConfig::default()).unwrap();
        assert!(json.contains("\"num_devices\":1"));
        assert!(json.contains("\"team_limit\":-1"));
    }
}
