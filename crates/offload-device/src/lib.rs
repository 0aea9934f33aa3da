// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # offload-device
//!
//! Synthetic offload device for WebAssembly images.
//!
//! ## Architecture
//!
//! ```text
//! DeviceRegistry
//!   └── Device (× num_devices)
//!         ├── EntryTable    host symbol → entry, replaced by every image load
//!         ├── AddressSpace  bump-allocated device addresses → host buffers
//!         └── RegionExecutor (shared, injected)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use offload_config::{DeviceConfig, TeamsConfig};
//! use offload_device::{DeviceImage, DeviceRegistry, HostAddr, OffloadEntry, WASM_MAGIC};
//!
//! let registry = DeviceRegistry::with_trace_executor(&DeviceConfig::default(), &TeamsConfig::default());
//! let device = registry.device(0);
//!
//! let entries = [OffloadEntry::region(HostAddr(0x1000), "kernel")];
//! device.load_image(&DeviceImage::new(&WASM_MAGIC, &entries)).unwrap();
//!
//! let buf = device.allocate(HostAddr(0x2000), 4).unwrap();
//! device.submit(buf, &[1, 2, 3, 4]).unwrap();
//! device.run_region(HostAddr(0x1000), &[buf], &[0]).unwrap();
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod address_space;
pub mod device;
pub mod entry_table;
pub mod error;
pub mod executor;
pub mod image;
pub mod registry;
pub mod types;

pub use address_space::{AddressSpace, AddressSpaceConfig, Allocation};
pub use device::{Device, DeviceSettings};
pub use entry_table::{EntryKind, EntryTable, EntryTableView, OffloadEntry};
pub use error::{DeviceError, Result};
pub use executor::{
    ExecutorError, RegionArg, RegionExecutor, RegionLaunch, TeamLaunch, TeamLimits, TeamRequest,
    TraceExecutor, DEFAULT_NUM_TEAMS, DEFAULT_NUM_THREADS, HARD_THREAD_LIMIT, HARD_TEAM_LIMIT,
};
pub use image::{is_valid_image, persist_image, DeviceImage, WASM_MAGIC};
pub use registry::DeviceRegistry;
pub use types::{DeviceAddr, HostAddr};
