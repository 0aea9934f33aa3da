// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Runtime
//!
//! Owns the device registry, the allocator policy, the standard allocators and
//! the region executor. Backend probing happens once, in the constructor.
//! Teardown is idempotent and also runs on drop.
//!
//! The `data_*`, `load_binary` and `run_target_*` methods mirror the plugin
//! entry points a host runtime calls; unlike [`DeviceRegistry::device`], they
//! report a bad device id as an error instead of panicking.

use crate::error::{OffloadError, Result};
use offload_config::{load_config_or_default, validate_config, OffloadConfig};
use offload_device::{
    is_valid_image, Device, DeviceAddr, DeviceImage, DeviceRegistry, EntryTableView, HostAddr,
    RegionExecutor, TeamRequest, TraceExecutor,
};
use offload_memkind::{
    Allocator, AllocatorConfig, AllocatorPolicy, StandardAllocator, StandardAllocators,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Offload runtime context
#[derive(Debug)]
pub struct Runtime {
    config: OffloadConfig,
    registry: DeviceRegistry,
    policy: AllocatorPolicy,
    standard_allocators: StandardAllocators,
    shut_down: AtomicBool,
}

impl Runtime {
    /// Runtime with the tracing executor
    ///
    /// # Errors
    ///
    /// `Config` if the configuration fails validation.
    pub fn new(config: OffloadConfig) -> Result<Self> {
        Self::with_executor(config, Arc::new(TraceExecutor))
    }

    /// Runtime dispatching regions to `executor`
    pub fn with_executor(config: OffloadConfig, executor: Arc<dyn RegionExecutor>) -> Result<Self> {
        validate_config(&config)?;

        let registry = DeviceRegistry::new(&config.device, &config.teams, executor);
        let policy = AllocatorPolicy::probe(&config.memory);
        let standard_allocators = policy.install_standard_allocators();

        info!(
            target: "offload",
            "Runtime ready: {} device(s), memory backend '{}' ({})",
            registry.number_of_devices(),
            policy.backend_name(),
            policy.backend_kind()
        );

        Ok(Self {
            config,
            registry,
            policy,
            standard_allocators,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Runtime from `offload_configuration.toml` (if found) plus environment overrides
    pub fn from_environment() -> Result<Self> {
        let config = load_config_or_default(None, None)?;
        Self::new(config)
    }

    pub fn config(&self) -> &OffloadConfig {
        &self.config
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &AllocatorPolicy {
        &self.policy
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(OffloadError::ShutDown);
        }
        Ok(())
    }

    /// Device `id`, checked
    pub fn device(&self, id: usize) -> Result<&Device> {
        self.ensure_live()?;
        self.registry.get(id).ok_or(OffloadError::InvalidDevice {
            id,
            count: self.registry.number_of_devices(),
        })
    }

    // ----- plugin entry points -----

    /// See [`offload_device::is_valid_image`]
    pub fn is_valid_image(&self, bytes: &[u8]) -> bool {
        is_valid_image(bytes)
    }

    pub fn number_of_devices(&self) -> usize {
        self.registry.number_of_devices()
    }

    /// Check that `id` names a device
    pub fn init_device(&self, id: usize) -> Result<()> {
        let device = self.device(id)?;
        debug!(
            target: "offload",
            "Device {} initialized (cursor {:#x})",
            id,
            device.cursor()
        );
        Ok(())
    }

    /// Admit the image only if it carries the WebAssembly magic, then load it
    pub fn load_binary(&self, id: usize, image: &DeviceImage<'_>) -> Result<EntryTableView> {
        let device = self.device(id)?;
        image.check_magic()?;
        Ok(device.load_image(image)?)
    }

    pub fn data_alloc(&self, id: usize, size: u64, host_addr: HostAddr) -> Result<DeviceAddr> {
        Ok(self.device(id)?.allocate(host_addr, size)?)
    }

    pub fn data_submit(&self, id: usize, addr: DeviceAddr, data: &[u8]) -> Result<()> {
        Ok(self.device(id)?.submit(addr, data)?)
    }

    pub fn data_retrieve(&self, id: usize, out: &mut [u8], addr: DeviceAddr) -> Result<()> {
        Ok(self.device(id)?.retrieve(addr, out)?)
    }

    pub fn data_delete(&self, id: usize, addr: DeviceAddr) -> Result<()> {
        Ok(self.device(id)?.release(addr)?)
    }

    pub fn run_target_region(
        &self,
        id: usize,
        entry: HostAddr,
        args: &[DeviceAddr],
        offsets: &[isize],
    ) -> Result<()> {
        Ok(self.device(id)?.run_region(entry, args, offsets)?)
    }

    pub fn run_target_team_region(
        &self,
        id: usize,
        entry: HostAddr,
        args: &[DeviceAddr],
        offsets: &[isize],
        request: TeamRequest,
    ) -> Result<()> {
        Ok(self.device(id)?.run_team_region(entry, args, offsets, request)?)
    }

    // ----- memory kinds -----

    /// One of the standard allocators installed at startup
    pub fn allocator(&self, which: StandardAllocator) -> Option<&Allocator> {
        self.standard_allocators.get(which)
    }

    pub fn standard_allocators(&self) -> &StandardAllocators {
        &self.standard_allocators
    }

    /// Create a custom allocator
    pub fn init_allocator(&self, config: &AllocatorConfig) -> Result<Allocator> {
        self.ensure_live()?;
        Ok(self.policy.init_allocator(config)?)
    }

    // ----- teardown -----

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Release device state and unload the memory backend
    ///
    /// Only the first call does work and returns `true`.
    pub fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.registry.shutdown();
        self.policy.shutdown();
        info!(target: "offload", "Runtime shut down");
        true
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
