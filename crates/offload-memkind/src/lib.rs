// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # offload-memkind
//!
//! Memory-kind allocation for the offload runtime.
//!
//! An [`AllocatorPolicy`] binds to one [`MemoryBackend`] at startup: a
//! NUMA-aware allocator library opened at runtime, libmemkind, or the process
//! heap. The
//! backend's resources are classified into a [`KindCatalog`], and every
//! allocator gets an [`Arena`] scoped to its memory space.
//!
//! ```rust
//! use offload_config::MemoryConfig;
//! use offload_memkind::{AllocatorPolicy, StandardAllocator};
//!
//! let policy = AllocatorPolicy::probe(&MemoryConfig::default());
//! let allocators = policy.install_standard_allocators();
//! let high_bw = allocators.get(StandardAllocator::HighBw).unwrap();
//! if let Some(ptr) = high_bw.allocate(4096) {
//!     high_bw.free(ptr);
//! }
//! policy.shutdown();
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod arena;
pub mod backend;
pub mod catalog;
pub mod error;
pub mod policy;
pub mod space;

pub use arena::Arena;
pub use backend::{
    ArenaHandle, BackendCapabilities, BackendKind, DynamicBackend, KindBackend, LibrarySpec,
    MemoryBackend, SymbolNames, SystemBackend,
};
pub use catalog::{KindCatalog, MemoryResource, ResourceHandle, ResourceTag};
pub use error::{MemKindError, Result};
pub use policy::{Allocator, AllocatorPolicy, ProbeFailure, StandardAllocators};
pub use space::{AllocatorConfig, MemoryKind, MemorySpace, Partition, StandardAllocator};
