// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Memory Backend Abstraction
//!
//! A backend turns memory resources into arenas and arenas into allocations.
//! The policy binds exactly one backend at startup:
//!
//! - [`SystemBackend`]: the process heap, always available
//! - [`DynamicBackend`]: a NUMA-aware device-list library opened at runtime,
//!   parameterized by a [`LibrarySpec`] (high-bandwidth or large-capacity flavour)
//! - [`KindBackend`]: libmemkind, which allocates from exported kind handles

mod dynamic;
pub mod ffi;
mod memkind;
mod system;

pub use dynamic::{DynamicBackend, LibrarySpec, SymbolNames};
pub use memkind::KindBackend;
pub use system::{SystemBackend, SYSTEM_ALIGNMENT};

use crate::catalog::MemoryResource;
use std::fmt;
use std::ptr::NonNull;

/// Which backend flavour is bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Process heap
    Default,
    HighBandwidth,
    LargeCapacity,
    /// Kind-based library
    Memkind,
}

impl BackendKind {
    /// Parse a configuration backend name
    pub fn from_config_name(name: &str) -> Option<Self> {
        match name {
            "high-bandwidth" => Some(BackendKind::HighBandwidth),
            "large-capacity" => Some(BackendKind::LargeCapacity),
            "memkind" => Some(BackendKind::Memkind),
            _ => None,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Default => write!(f, "default"),
            BackendKind::HighBandwidth => write!(f, "high-bandwidth"),
            BackendKind::LargeCapacity => write!(f, "large-capacity"),
            BackendKind::Memkind => write!(f, "memkind"),
        }
    }
}

/// Optional operations detected when the backend bound
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// Resources are classified into kind groups; without it every recognized
    /// memory space is served from the full resource list
    pub kind_classification: bool,
    /// Resources report their page size
    pub page_size_query: bool,
    /// Arenas support interleaved placement
    pub interleaved_alloc: bool,
}

/// Opaque backend arena handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaHandle(pub usize);

/// Memory backend trait
///
/// Implementations must be thread-safe. After [`MemoryBackend::shutdown`]
/// every allocating call returns `None` and no backend code is invoked.
pub trait MemoryBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    fn kind(&self) -> BackendKind;

    fn capabilities(&self) -> BackendCapabilities;

    /// Currently available resources
    fn enumerate_resources(&self) -> Vec<MemoryResource>;

    /// Create an arena of `pool_size` bytes (`0` = backend default) over `resources`
    fn create_arena(&self, pool_size: usize, resources: &[MemoryResource]) -> Option<ArenaHandle>;

    fn destroy_arena(&self, arena: ArenaHandle);

    fn arena_alloc(&self, arena: ArenaHandle, size: usize) -> Option<NonNull<u8>>;

    /// Interleaved allocation; backends without the capability place normally
    fn arena_alloc_interleaved(&self, arena: ArenaHandle, size: usize) -> Option<NonNull<u8>> {
        self.arena_alloc(arena, size)
    }

    /// Release memory returned by either allocation call
    fn free(&self, ptr: NonNull<u8>);

    /// Release backend resources; only the first call returns `true`
    fn shutdown(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_names() {
        assert_eq!(
            BackendKind::from_config_name("high-bandwidth"),
            Some(BackendKind::HighBandwidth)
        );
        assert_eq!(
            BackendKind::from_config_name("large-capacity"),
            Some(BackendKind::LargeCapacity)
        );
        assert_eq!(
            BackendKind::from_config_name("memkind"),
            Some(BackendKind::Memkind)
        );
        assert_eq!(BackendKind::from_config_name("numa"), None);
        assert_eq!(BackendKind::LargeCapacity.to_string(), "large-capacity");
    }
}
