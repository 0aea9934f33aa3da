// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Kind-based allocator library (libmemkind)
//!
//! There is no device list and no arena step: the library exports global kind
//! handles and allocates straight from a kind. Every usable kind becomes one
//! resource, and the "arena" created over a resource group is the group's
//! first kind. A kind whose availability check fails is treated as absent.
//!
//! | Symbol                          | Tag    | Page  |
//! |---------------------------------|--------|-------|
//! | `MEMKIND_DEFAULT` (required)    | DRAM   | 4 KiB |
//! | `MEMKIND_HUGETLB`               | DRAM   | 2 MiB |
//! | `MEMKIND_HBW_PREFERRED`         | HBM    | 4 KiB |
//! | `MEMKIND_HBW_PREFERRED_HUGETLB` | HBM    | 2 MiB |
//!
//! `MEMKIND_INTERLEAVE`, when usable, serves interleaved allocations.

use super::dynamic::{load_optional_symbol, load_symbol, open_library};
use super::ffi::{KindCheckFn, KindFreeFn, KindMallocFn, RawKind};
use super::{ArenaHandle, BackendCapabilities, BackendKind, MemoryBackend};
use crate::catalog::{MemoryResource, ResourceHandle, ResourceTag};
use crate::error::{MemKindError, Result};
use libloading::Library;
use parking_lot::RwLock;
use std::ptr::NonNull;
use tracing::{debug, info};

const PAGE_4K: usize = 4 * 1024;
const PAGE_2M: usize = 2 * 1024 * 1024;

pub const DEFAULT_KIND: &str = "MEMKIND_DEFAULT";
pub const INTERLEAVE_KIND: &str = "MEMKIND_INTERLEAVE";

struct KindSymbol {
    symbol: &'static str,
    tag: ResourceTag,
    page_size: usize,
}

const RESOURCE_KINDS: [KindSymbol; 4] = [
    KindSymbol {
        symbol: DEFAULT_KIND,
        tag: ResourceTag::Dram,
        page_size: PAGE_4K,
    },
    KindSymbol {
        symbol: "MEMKIND_HUGETLB",
        tag: ResourceTag::Dram,
        page_size: PAGE_2M,
    },
    KindSymbol {
        symbol: "MEMKIND_HBW_PREFERRED",
        tag: ResourceTag::KnlHbm,
        page_size: PAGE_4K,
    },
    KindSymbol {
        symbol: "MEMKIND_HBW_PREFERRED_HUGETLB",
        tag: ResourceTag::KnlHbm,
        page_size: PAGE_2M,
    },
];

#[derive(Clone, Copy)]
struct KindFns {
    malloc: KindMallocFn,
    free: KindFreeFn,
    check: KindCheckFn,
}

struct LoadedKinds {
    fns: KindFns,
    resources: Vec<MemoryResource>,
    interleave: Option<usize>,
    // Dropped last: unloads the code behind `fns`.
    _library: Library,
}

/// Backend bound to libmemkind
pub struct KindBackend {
    name: String,
    capabilities: BackendCapabilities,
    state: RwLock<Option<LoadedKinds>>,
}

impl std::fmt::Debug for KindBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindBackend")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

/// Read an exported kind handle; `None` unless the library reports it usable
fn read_kind(check: KindCheckFn, slot: *mut RawKind) -> Option<RawKind> {
    if slot.is_null() {
        return None;
    }
    // SAFETY: slot is the address of an exported `memkind_t` global.
    let kind = unsafe { *slot };
    if kind.is_null() {
        return None;
    }
    // SAFETY: kind is a library-owned handle.
    (unsafe { check(kind) } == 0).then_some(kind)
}

impl KindBackend {
    /// Open the library, resolve the allocation functions and usable kinds
    ///
    /// # Errors
    ///
    /// - `LibraryLoad` if no file name opens
    /// - `MissingSymbol` if an allocation function or `MEMKIND_DEFAULT` is absent
    /// - `KindUnavailable` if the default kind fails its availability check
    pub fn load(file_names: &[String]) -> Result<Self> {
        let (library, file_name) = open_library(file_names)?;

        let fns = KindFns {
            check: load_symbol(&library, &file_name, "memkind_check_available")?,
            malloc: load_symbol(&library, &file_name, "memkind_malloc")?,
            free: load_symbol(&library, &file_name, "memkind_free")?,
        };
        let default_slot: *mut RawKind = load_symbol(&library, &file_name, DEFAULT_KIND)?;
        if read_kind(fns.check, default_slot).is_none() {
            return Err(MemKindError::KindUnavailable {
                library: file_name,
                kind: DEFAULT_KIND.to_string(),
            });
        }

        let mut resources = Vec::with_capacity(RESOURCE_KINDS.len());
        for entry in &RESOURCE_KINDS {
            let kind = load_optional_symbol::<*mut RawKind>(&library, entry.symbol)
                .and_then(|slot| read_kind(fns.check, slot));
            match kind {
                Some(kind) => resources.push(MemoryResource {
                    handle: ResourceHandle(kind as usize),
                    tag: entry.tag,
                    node: -1,
                    page_size: Some(entry.page_size),
                }),
                None => debug!(
                    target: "offload-memkind",
                    "[memkind] Kind {} unavailable",
                    entry.symbol
                ),
            }
        }
        let interleave = load_optional_symbol::<*mut RawKind>(&library, INTERLEAVE_KIND)
            .and_then(|slot| read_kind(fns.check, slot))
            .map(|kind| kind as usize);

        let capabilities = BackendCapabilities {
            kind_classification: true,
            page_size_query: true,
            interleaved_alloc: interleave.is_some(),
        };
        info!(
            target: "offload-memkind",
            "[memkind] Loaded {} ({} kinds, {:?})",
            file_name,
            resources.len(),
            capabilities
        );

        Ok(Self {
            name: file_name,
            capabilities,
            state: RwLock::new(Some(LoadedKinds {
                fns,
                resources,
                interleave,
                _library: library,
            })),
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.state.read().is_some()
    }
}

impl MemoryBackend for KindBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Memkind
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    fn enumerate_resources(&self) -> Vec<MemoryResource> {
        self.state
            .read()
            .as_ref()
            .map(|loaded| loaded.resources.clone())
            .unwrap_or_default()
    }

    // Kinds have no pool; `pool_size` is ignored.
    fn create_arena(&self, _pool_size: usize, resources: &[MemoryResource]) -> Option<ArenaHandle> {
        let state = self.state.read();
        state.as_ref()?;
        resources.first().map(|r| ArenaHandle(r.handle.0))
    }

    fn destroy_arena(&self, _arena: ArenaHandle) {}

    fn arena_alloc(&self, arena: ArenaHandle, size: usize) -> Option<NonNull<u8>> {
        let state = self.state.read();
        let loaded = state.as_ref()?;
        // SAFETY: arena is a kind handle taken from this library's resources.
        let ptr = unsafe { (loaded.fns.malloc)(arena.0 as RawKind, size) };
        NonNull::new(ptr.cast::<u8>())
    }

    fn arena_alloc_interleaved(&self, arena: ArenaHandle, size: usize) -> Option<NonNull<u8>> {
        let state = self.state.read();
        let loaded = state.as_ref()?;
        let kind = loaded.interleave.unwrap_or(arena.0);
        // SAFETY: as in arena_alloc.
        let ptr = unsafe { (loaded.fns.malloc)(kind as RawKind, size) };
        NonNull::new(ptr.cast::<u8>())
    }

    fn free(&self, ptr: NonNull<u8>) {
        let state = self.state.read();
        if let Some(loaded) = state.as_ref() {
            // SAFETY: ptr came from memkind_malloc; a null kind is detected by the library.
            unsafe { (loaded.fns.free)(std::ptr::null_mut(), ptr.as_ptr().cast()) };
        }
    }

    fn shutdown(&self) -> bool {
        let Some(loaded) = self.state.write().take() else {
            return false;
        };
        drop(loaded);
        info!(target: "offload-memkind", "[memkind] Unloaded {}", self.name);
        true
    }
}

impl Drop for KindBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::MemoryKind;

    #[test]
    fn test_missing_library() {
        let names = vec!["liboffload-missing-memkind.so".to_string()];
        assert!(matches!(
            KindBackend::load(&names),
            Err(MemKindError::LibraryLoad { .. })
        ));
    }

    #[test]
    fn test_kind_table_classification() {
        let hbw: Vec<&str> = RESOURCE_KINDS
            .iter()
            .filter(|k| k.tag.kind() == Some(MemoryKind::HighBandwidth))
            .map(|k| k.symbol)
            .collect();
        assert_eq!(hbw, vec!["MEMKIND_HBW_PREFERRED", "MEMKIND_HBW_PREFERRED_HUGETLB"]);
        assert_eq!(RESOURCE_KINDS[0].symbol, DEFAULT_KIND);
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    #[test]
    fn test_library_without_kind_symbols() {
        match KindBackend::load(&["libm.so.6".to_string()]) {
            Err(MemKindError::MissingSymbol { library, symbol }) => {
                assert_eq!(library, "libm.so.6");
                assert_eq!(symbol, "memkind_check_available");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
