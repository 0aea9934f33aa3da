// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Device
//!
//! One synthetic execution target: the entry table of its loaded image plus
//! its address space. All operations take `&self`; the entry table sits behind
//! an `RwLock` and the address space behind a `Mutex`.
//!
//! Lock order, when both are held: image state, then address space.

use crate::address_space::{AddressSpace, AddressSpaceConfig, Allocation};
use crate::entry_table::{EntryKind, EntryTable, EntryTableView, OffloadEntry};
use crate::error::{DeviceError, Result};
use crate::executor::{RegionArg, RegionExecutor, RegionLaunch, TeamLimits, TeamRequest};
use crate::image::{persist_image, DeviceImage};
use crate::types::{DeviceAddr, HostAddr};
use offload_config::{DeviceConfig, TeamsConfig};
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-device settings derived from configuration
#[derive(Debug, Clone, Default)]
pub struct DeviceSettings {
    pub address_space: AddressSpaceConfig,
    /// Where to write each loaded image; `None` disables the dump
    pub image_dump_path: Option<PathBuf>,
    pub team_limits: TeamLimits,
}

impl DeviceSettings {
    pub fn from_config(device: &DeviceConfig, teams: &TeamsConfig) -> Self {
        Self {
            address_space: AddressSpaceConfig::from(device),
            image_dump_path: device.image_dump_path.clone(),
            team_limits: TeamLimits::from(teams),
        }
    }
}

#[derive(Debug, Default)]
struct ImageState {
    table: EntryTable,
    bytes: Vec<u8>,
}

/// A synthetic device
pub struct Device {
    id: usize,
    settings: DeviceSettings,
    executor: Arc<dyn RegionExecutor>,
    image: RwLock<ImageState>,
    address_space: Mutex<AddressSpace>,
}

// Never blocks: a locked field prints as `None`.
impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("executor", &self.executor.name())
            .field("entries", &self.image.try_read().map(|state| state.table.len()))
            .field(
                "live_allocations",
                &self
                    .address_space
                    .try_lock()
                    .map(|space| space.live_allocations()),
            )
            .finish()
    }
}

impl Device {
    pub fn new(id: usize, settings: DeviceSettings, executor: Arc<dyn RegionExecutor>) -> Self {
        let address_space = AddressSpace::new(settings.address_space);
        Self {
            id,
            settings,
            executor,
            image: RwLock::new(ImageState::default()),
            address_space: Mutex::new(address_space),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn team_limits(&self) -> TeamLimits {
        self.settings.team_limits
    }

    /// Name of the injected executor
    pub fn executor_name(&self) -> &str {
        self.executor.name()
    }

    // ----- image loading -----

    /// Replace the entry table with the image's entries
    ///
    /// All descriptors are validated before anything changes. On failure the
    /// table is left empty and no image is kept.
    ///
    /// # Errors
    ///
    /// `NullEntryAddress` / `DuplicateEntryAddress` for a bad descriptor.
    pub fn load_image(&self, image: &DeviceImage<'_>) -> Result<EntryTableView> {
        debug!(
            target: "offload-device",
            "[DEVICE-{}] Loading image ({} bytes, {} entries)",
            self.id,
            image.bytes.len(),
            image.entries.len()
        );

        let mut state = self.image.write();
        state.table.clear();
        state.bytes.clear();

        if let Err(e) = image.validate_entries() {
            warn!(target: "offload-device", "[DEVICE-{}] Rejected image: {}", self.id, e);
            return Err(e);
        }

        for entry in image.entries {
            match entry.kind() {
                EntryKind::Region => {
                    debug!(target: "offload-device", "[DEVICE-{}] Entry point {}", self.id, entry.name)
                }
                EntryKind::Global => debug!(
                    target: "offload-device",
                    "[DEVICE-{}] Entry point to global {} ({} bytes)",
                    self.id,
                    entry.name,
                    entry.size
                ),
            }
            state.table.push(entry.clone());
        }
        state.bytes.extend_from_slice(image.bytes);

        if let Some(path) = &self.settings.image_dump_path {
            if let Err(e) = persist_image(path, image.bytes) {
                warn!(
                    target: "offload-device",
                    "[DEVICE-{}] Could not write image dump to {}: {}",
                    self.id,
                    path.display(),
                    e
                );
            }
        }

        info!(
            target: "offload-device",
            "[DEVICE-{}] Image loaded with {} entries",
            self.id,
            state.table.len()
        );
        Ok(state.table.view())
    }

    /// Entry registered under `host_addr`
    pub fn find_entry(&self, host_addr: HostAddr) -> Option<OffloadEntry> {
        self.image.read().table.find(host_addr).cloned()
    }

    /// Snapshot of the current entry table
    pub fn entries(&self) -> EntryTableView {
        self.image.read().table.view()
    }

    /// Copy of the bytes of the currently loaded image
    pub fn loaded_image(&self) -> Vec<u8> {
        self.image.read().bytes.clone()
    }

    // ----- address space -----

    pub fn allocate(&self, host_addr: HostAddr, size: u64) -> Result<DeviceAddr> {
        debug!(
            target: "offload-device",
            "[DEVICE-{}] Data alloc size {} hostptr {}",
            self.id,
            size,
            host_addr
        );
        self.address_space.lock().allocate(host_addr, size)
    }

    pub fn submit(&self, addr: DeviceAddr, data: &[u8]) -> Result<()> {
        debug!(
            target: "offload-device",
            "[DEVICE-{}] Data submit size {} to {}",
            self.id,
            data.len(),
            addr
        );
        self.address_space.lock().submit(addr, data)
    }

    pub fn retrieve(&self, addr: DeviceAddr, out: &mut [u8]) -> Result<()> {
        debug!(
            target: "offload-device",
            "[DEVICE-{}] Data retrieve size {} from {}",
            self.id,
            out.len(),
            addr
        );
        self.address_space.lock().retrieve(addr, out)
    }

    pub fn release(&self, addr: DeviceAddr) -> Result<()> {
        debug!(target: "offload-device", "[DEVICE-{}] Data delete {}", self.id, addr);
        self.address_space.lock().release(addr)
    }

    /// Next device address that would be handed out
    pub fn cursor(&self) -> i64 {
        self.address_space.lock().cursor()
    }

    pub fn live_allocations(&self) -> usize {
        self.address_space.lock().live_allocations()
    }

    /// Size and buffered state of a live allocation
    pub fn allocation_info(&self, addr: DeviceAddr) -> Option<(u64, bool)> {
        self.address_space
            .lock()
            .allocation(addr)
            .map(|a: &Allocation| (a.size(), a.is_buffered()))
    }

    // ----- dispatch -----

    /// Run a plain region
    ///
    /// # Errors
    ///
    /// `EntryNotFound`, `ArgumentCountMismatch`, or `Execution` if the
    /// executor fails.
    pub fn run_region(&self, entry_addr: HostAddr, args: &[DeviceAddr], offsets: &[isize]) -> Result<()> {
        self.dispatch(entry_addr, args, offsets, None)
    }

    /// Run a team region; the request is resolved against the device's team limits
    pub fn run_team_region(
        &self,
        entry_addr: HostAddr,
        args: &[DeviceAddr],
        offsets: &[isize],
        request: TeamRequest,
    ) -> Result<()> {
        self.dispatch(entry_addr, args, offsets, Some(request))
    }

    fn dispatch(
        &self,
        entry_addr: HostAddr,
        args: &[DeviceAddr],
        offsets: &[isize],
        request: Option<TeamRequest>,
    ) -> Result<()> {
        let state = self.image.read();
        let entry = state.table.find(entry_addr).ok_or_else(|| {
            debug!(
                target: "offload-device",
                "[DEVICE-{}] Can't find entry point {}",
                self.id,
                entry_addr
            );
            DeviceError::EntryNotFound(entry_addr)
        })?;

        if args.len() != offsets.len() {
            return Err(DeviceError::ArgumentCountMismatch {
                args: args.len(),
                offsets: offsets.len(),
            });
        }

        let teams = request.map(|r| r.resolve(&self.settings.team_limits));
        debug!(
            target: "offload-device",
            "[DEVICE-{}] Target region: entry '{}' arg_num {} teams {:?}",
            self.id,
            entry.name,
            args.len(),
            teams
        );
        let region_args: Vec<RegionArg> = args
            .iter()
            .zip(offsets)
            .enumerate()
            .map(|(i, (&base, &offset))| {
                debug!(target: "offload-device", "\tArg {}: {} + {}", i, base, offset);
                RegionArg::new(base, offset)
            })
            .collect();

        let address_space = self.address_space.lock();
        let launch = RegionLaunch {
            device_id: self.id,
            entry,
            image: &state.bytes,
            args: &region_args,
            teams,
            address_space: &address_space,
        };

        self.executor.run(&launch).map_err(|e| DeviceError::Execution {
            entry: entry.name.clone(),
            reason: e.to_string(),
        })
    }

    // ----- teardown -----

    /// Drop the loaded image and every allocation
    ///
    /// Returns how many allocations were released. The address cursor is not rewound.
    pub fn reset(&self) -> usize {
        {
            let mut state = self.image.write();
            state.table.clear();
            state.bytes.clear();
        }
        let released = self.address_space.lock().release_all();
        debug!(
            target: "offload-device",
            "[DEVICE-{}] Reset: released {} allocations",
            self.id,
            released
        );
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ExecutorError, TraceExecutor};
    use crate::image::WASM_MAGIC;
    use parking_lot::Mutex as PlMutex;

    /// Records every launch it sees
    #[derive(Default)]
    struct RecordingExecutor {
        calls: PlMutex<Vec<(String, Vec<RegionArg>, Option<u32>, usize)>>,
        fail: bool,
    }

    impl RegionExecutor for RecordingExecutor {
        fn name(&self) -> &str {
            "recording"
        }

        fn run(&self, launch: &RegionLaunch<'_>) -> std::result::Result<(), ExecutorError> {
            self.calls.lock().push((
                launch.entry.name.clone(),
                launch.args.to_vec(),
                launch.teams.map(|t| t.num_teams),
                launch.image.len(),
            ));
            if self.fail {
                return Err("trap".into());
            }
            Ok(())
        }
    }

    fn device_with(executor: Arc<dyn RegionExecutor>) -> Device {
        Device::new(0, DeviceSettings::default(), executor)
    }

    fn sample_entries() -> Vec<OffloadEntry> {
        vec![
            OffloadEntry::region(HostAddr(0x100), "kernel_a"),
            OffloadEntry::region(HostAddr(0x200), "kernel_b"),
            OffloadEntry::global(HostAddr(0x300), "counter", 4),
        ]
    }

    #[test]
    fn test_load_and_find() {
        let device = device_with(Arc::new(TraceExecutor));
        let entries = sample_entries();
        let view = device.load_image(&DeviceImage::new(&WASM_MAGIC, &entries)).unwrap();
        assert_eq!(view.len(), 3);

        for entry in &entries {
            assert_eq!(device.find_entry(entry.host_addr).as_ref(), Some(entry));
        }
        assert!(device.find_entry(HostAddr(0x400)).is_none());
        assert_eq!(device.loaded_image(), WASM_MAGIC.to_vec());
    }

    #[test]
    fn test_failed_load_leaves_no_entries() {
        let device = device_with(Arc::new(TraceExecutor));
        let entries = sample_entries();
        device.load_image(&DeviceImage::new(&WASM_MAGIC, &entries)).unwrap();

        let broken = vec![
            OffloadEntry::region(HostAddr(0x500), "first"),
            OffloadEntry::region(HostAddr::NULL, "null"),
        ];
        assert!(device.load_image(&DeviceImage::new(&WASM_MAGIC, &broken)).is_err());
        assert!(device.entries().is_empty());
        assert!(device.find_entry(HostAddr(0x100)).is_none());
        assert!(device.find_entry(HostAddr(0x500)).is_none());
        assert!(device.loaded_image().is_empty());
    }

    #[test]
    fn test_reload_replaces_entries() {
        let device = device_with(Arc::new(TraceExecutor));
        let first = sample_entries();
        let view = device.load_image(&DeviceImage::new(&WASM_MAGIC, &first)).unwrap();

        let second = vec![OffloadEntry::region(HostAddr(0x900), "only")];
        device.load_image(&DeviceImage::new(&WASM_MAGIC, &second)).unwrap();
        assert_eq!(device.entries().len(), 1);
        assert!(device.find_entry(HostAddr(0x100)).is_none());
        assert_eq!(view.len(), 3);
    }

    #[test]
    fn test_empty_image_is_success() {
        let device = device_with(Arc::new(TraceExecutor));
        let view = device.load_image(&DeviceImage::new(&WASM_MAGIC, &[])).unwrap();
        assert!(view.is_empty());
    }

    #[test]
    fn test_run_region_passes_args() {
        let executor = Arc::new(RecordingExecutor::default());
        let device = device_with(executor.clone());
        let entries = sample_entries();
        device.load_image(&DeviceImage::new(&WASM_MAGIC, &entries)).unwrap();

        let buf = device.allocate(HostAddr(0xabc), 16).unwrap();
        device
            .run_region(HostAddr(0x100), &[buf, buf], &[0, 8])
            .unwrap();

        let calls = executor.calls.lock();
        assert_eq!(calls.len(), 1);
        let (name, args, teams, image_len) = &calls[0];
        assert_eq!(name, "kernel_a");
        assert_eq!(args[1].address(), Some(DeviceAddr(buf.get() + 8)));
        assert_eq!(*teams, None);
        assert_eq!(*image_len, 4);
    }

    #[test]
    fn test_run_team_region_resolves_geometry() {
        let executor = Arc::new(RecordingExecutor::default());
        let settings = DeviceSettings {
            team_limits: TeamLimits {
                team_limit: Some(16),
                num_teams: None,
            },
            ..DeviceSettings::default()
        };
        let device = Device::new(0, settings, executor.clone());
        let entries = sample_entries();
        device.load_image(&DeviceImage::new(&WASM_MAGIC, &entries)).unwrap();

        device
            .run_team_region(HostAddr(0x200), &[], &[], TeamRequest::new(0, 0, 100))
            .unwrap();
        assert_eq!(executor.calls.lock()[0].2, Some(16));
    }

    #[test]
    fn test_dispatch_errors() {
        let device = device_with(Arc::new(RecordingExecutor {
            fail: true,
            ..Default::default()
        }));
        let entries = sample_entries();
        device.load_image(&DeviceImage::new(&WASM_MAGIC, &entries)).unwrap();

        assert!(matches!(
            device.run_region(HostAddr(0x999), &[], &[]),
            Err(DeviceError::EntryNotFound(HostAddr(0x999)))
        ));
        assert!(matches!(
            device.run_region(HostAddr(0x100), &[DeviceAddr(16)], &[]),
            Err(DeviceError::ArgumentCountMismatch { args: 1, offsets: 0 })
        ));
        match device.run_region(HostAddr(0x100), &[], &[]) {
            Err(DeviceError::Execution { entry, reason }) => {
                assert_eq!(entry, "kernel_a");
                assert_eq!(reason, "trap");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_image_dump() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.wasm");
        let settings = DeviceSettings {
            image_dump_path: Some(path.clone()),
            ..DeviceSettings::default()
        };
        let device = Device::new(0, settings, Arc::new(TraceExecutor));
        device
            .load_image(&DeviceImage::new(b"\0asm\x01\0\0\0", &[]))
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"\0asm\x01\0\0\0");
    }

    #[test]
    fn test_unwritable_dump_does_not_fail_load() {
        let dir = tempfile::tempdir().unwrap();
        let settings = DeviceSettings {
            image_dump_path: Some(dir.path().join("missing").join("dump.wasm")),
            ..DeviceSettings::default()
        };
        let device = Device::new(0, settings, Arc::new(TraceExecutor));
        let entries = sample_entries();
        assert!(device.load_image(&DeviceImage::new(&WASM_MAGIC, &entries)).is_ok());
    }

    #[test]
    fn test_reset() {
        let device = device_with(Arc::new(TraceExecutor));
        let entries = sample_entries();
        device.load_image(&DeviceImage::new(&WASM_MAGIC, &entries)).unwrap();
        let addr = device.allocate(HostAddr(1), 8).unwrap();
        device.submit(addr, &[0; 8]).unwrap();
        assert_eq!(device.allocation_info(addr), Some((8, true)));

        assert_eq!(device.reset(), 1);
        assert!(device.entries().is_empty());
        assert_eq!(device.live_allocations(), 0);
        assert_eq!(device.cursor(), 24);
    }

    #[test]
    fn test_debug_while_address_space_locked() {
        let device = device_with(Arc::new(TraceExecutor));
        device.allocate(HostAddr(1), 8).unwrap();

        let guard = device.address_space.lock();
        let text = format!("{:?}", device);
        assert!(text.contains("live_allocations: None"), "{}", text);
        drop(guard);

        let text = format!("{:?}", device);
        assert!(text.contains("live_allocations: Some(1)"), "{}", text);
        assert!(text.contains("entries: Some(0)"), "{}", text);
    }
}
