// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # offload - Device-Offload Execution Core
//!
//! Loads WebAssembly device images onto synthetic devices, keeps the host
//! symbol → entry bindings they expose, moves data through a bump-allocated
//! device address space, dispatches compute regions through an injectable
//! executor, and serves memory-kind aware allocations through whichever
//! allocator backend is present on the machine.
//!
//! ## Quick Start
//!
//! ```rust
//! use offload::prelude::*;
//!
//! let runtime = Runtime::new(OffloadConfig::default()).unwrap();
//! assert_eq!(runtime.number_of_devices(), 1);
//!
//! let entries = [OffloadEntry::region(HostAddr(0x1000), "saxpy")];
//! let table = runtime
//!     .load_binary(0, &DeviceImage::new(&WASM_MAGIC, &entries))
//!     .unwrap();
//! assert_eq!(table.len(), 1);
//!
//! let data = [1u8, 2, 3, 4];
//! let dev = runtime.data_alloc(0, data.len() as u64, HostAddr::of(&data)).unwrap();
//! runtime.data_submit(0, dev, &data).unwrap();
//! runtime.run_target_region(0, HostAddr(0x1000), &[dev], &[0]).unwrap();
//!
//! let mut back = [0u8; 4];
//! runtime.data_retrieve(0, &mut back, dev).unwrap();
//! assert_eq!(back, data);
//! runtime.data_delete(0, dev).unwrap();
//! ```
//!
//! ## Crates
//!
//! - [`config`]: TOML configuration with environment and CLI overrides
//! - [`device`]: devices, images, entry tables, address spaces, executors
//! - [`memkind`]: allocator policy, kind catalog, arenas, backends
//! - [`observability`]: logging setup and per-crate debug flags
//!
//! ## Features
//! - **`file-logging`**: per-run JSON log files

pub use offload_config as config;
pub use offload_device as device;
pub use offload_memkind as memkind;
pub use offload_observability as observability;

mod error;
mod runtime;
pub mod status;

pub use error::{OffloadError, Result};
pub use runtime::Runtime;

/// Install the console subscriber using the configured level and `OFFLOAD_DEBUG` flags
///
/// # Errors
///
/// `OffloadError::Logging` if a global subscriber is already installed.
pub fn init_logging(config: &config::OffloadConfig) -> Result<observability::LoggingGuard> {
    let flags = observability::parse_debug_flags();
    observability::init_logging(&flags, &config.logging.level)
        .map_err(|e| OffloadError::Logging(format!("{:#}", e)))
}

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use crate::config::{load_config_or_default, OffloadConfig};
    pub use crate::device::{
        is_valid_image, DeviceAddr, DeviceError, DeviceImage, EntryTableView, HostAddr,
        OffloadEntry, RegionExecutor, RegionLaunch, TeamRequest, WASM_MAGIC,
    };
    pub use crate::memkind::{
        Allocator, AllocatorConfig, AllocatorPolicy, MemKindError, MemorySpace, Partition,
        StandardAllocator,
    };
    pub use crate::status::{to_status, OFFLOAD_FAIL, OFFLOAD_SUCCESS};
    pub use crate::{OffloadError, Runtime};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_facade_imports() {
        use crate::prelude::*;
        let _entry = OffloadEntry::region(HostAddr(1), "k");
        let _space = MemorySpace::HighBw;
        assert_eq!(OFFLOAD_SUCCESS, 0);
    }
}
