// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Fixed-size collection of devices, built once from configuration

use crate::device::{Device, DeviceSettings};
use crate::executor::{RegionExecutor, TeamLimits, TraceExecutor};
use offload_config::{DeviceConfig, TeamsConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Owns every device of the runtime
#[derive(Debug)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
    team_limits: TeamLimits,
    shut_down: AtomicBool,
}

impl DeviceRegistry {
    /// Build `device.num_devices` devices sharing one executor
    pub fn new(
        device: &DeviceConfig,
        teams: &TeamsConfig,
        executor: Arc<dyn RegionExecutor>,
    ) -> Self {
        let settings = DeviceSettings::from_config(device, teams);
        let team_limits = settings.team_limits;

        if let Some(limit) = team_limits.team_limit {
            debug!(target: "offload-device", "Parsed team limit = {}", limit);
        }
        if let Some(n) = team_limits.num_teams {
            debug!(target: "offload-device", "Parsed default team count = {}", n);
        }

        let devices = (0..device.num_devices)
            .map(|id| Device::new(id, settings.clone(), Arc::clone(&executor)))
            .collect::<Vec<_>>();

        info!(
            target: "offload-device",
            "Device registry ready: {} device(s), executor '{}'",
            devices.len(),
            executor.name()
        );

        Self {
            devices,
            team_limits,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Registry with the default [`TraceExecutor`]
    pub fn with_trace_executor(device: &DeviceConfig, teams: &TeamsConfig) -> Self {
        Self::new(device, teams, Arc::new(TraceExecutor))
    }

    pub fn number_of_devices(&self) -> usize {
        self.devices.len()
    }

    /// Device `id`
    ///
    /// # Panics
    ///
    /// If `id >= number_of_devices()`. Callers query the count first; use
    /// [`DeviceRegistry::get`] where the id is untrusted.
    pub fn device(&self, id: usize) -> &Device {
        assert!(
            id < self.devices.len(),
            "Unexpected device id {} (have {})",
            id,
            self.devices.len()
        );
        &self.devices[id]
    }

    /// Device `id`, if it exists
    pub fn get(&self, id: usize) -> Option<&Device> {
        self.devices.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    pub fn team_limits(&self) -> TeamLimits {
        self.team_limits
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Release every allocation and entry table
    ///
    /// Only the first call does work and returns `true`.
    pub fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return false;
        }
        let released: usize = self.devices.iter().map(Device::reset).sum();
        info!(
            target: "offload-device",
            "Device registry shut down ({} allocations released)",
            released
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HostAddr;

    #[test]
    fn test_single_device_by_default() {
        let registry =
            DeviceRegistry::with_trace_executor(&DeviceConfig::default(), &TeamsConfig::default());
        assert_eq!(registry.number_of_devices(), 1);
        assert_eq!(registry.device(0).id(), 0);
        assert!(registry.get(1).is_none());
        assert_eq!(registry.team_limits().as_raw(), (-1, -1));
    }

    #[test]
    fn test_configured_device_count() {
        let device = DeviceConfig {
            num_devices: 3,
            ..DeviceConfig::default()
        };
        let registry = DeviceRegistry::with_trace_executor(&device, &TeamsConfig::default());
        let ids: Vec<usize> = registry.iter().map(Device::id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    #[should_panic(expected = "Unexpected device id")]
    fn test_out_of_range_device_panics() {
        let registry =
            DeviceRegistry::with_trace_executor(&DeviceConfig::default(), &TeamsConfig::default());
        registry.device(1);
    }

    #[test]
    fn test_team_limits_from_config() {
        let teams = TeamsConfig {
            team_limit: 64,
            num_teams: -1,
        };
        let registry = DeviceRegistry::with_trace_executor(&DeviceConfig::default(), &teams);
        assert_eq!(registry.team_limits().team_limit, Some(64));
        assert_eq!(registry.device(0).team_limits().num_teams, None);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let registry =
            DeviceRegistry::with_trace_executor(&DeviceConfig::default(), &TeamsConfig::default());
        registry.device(0).allocate(HostAddr(1), 4).unwrap();

        assert!(registry.shutdown());
        assert!(registry.is_shut_down());
        assert_eq!(registry.device(0).live_allocations(), 0);
        assert!(!registry.shutdown());
    }
}
