// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Allocator library opened at runtime
//!
//! One implementation serves every library flavour. A [`LibrarySpec`] names
//! the candidate file names and symbols; optional symbols that resolve become
//! capabilities. Resolved function pointers live next to the `Library` inside
//! an `RwLock<Option<_>>`, so unloading drops both at once and no stale
//! pointer can be called afterwards.

use super::ffi::{
    ArenaAllocFn, ArenaCreateFn, ArenaDestroyFn, CheckAvailableFn, DevicePageSizeFn, FreeFn,
    InitFn, RawArena, RawDevice, RawDeviceList,
};
use super::{ArenaHandle, BackendCapabilities, BackendKind, MemoryBackend};
use crate::catalog::{MemoryResource, ResourceHandle, ResourceTag};
use crate::error::{MemKindError, Result};
use ahash::AHashMap;
use libloading::Library;
use parking_lot::{Mutex, RwLock};
use std::ffi::c_void;
use std::ptr::NonNull;
use tracing::{debug, info, warn};

/// Symbol names looked up in the library
#[derive(Debug, Clone)]
pub struct SymbolNames {
    pub init: &'static str,
    pub arena_create: &'static str,
    pub arena_destroy: &'static str,
    pub arena_alloc: &'static str,
    pub free: &'static str,
    pub check_available: &'static str,
    /// Optional: per-device page size
    pub device_page_size: &'static str,
    /// Optional: interleaved arena allocation
    pub arena_alloc_interleaved: &'static str,
}

impl SymbolNames {
    pub const SICM: SymbolNames = SymbolNames {
        init: "sicm_init",
        arena_create: "sicm_arena_create",
        arena_destroy: "sicm_arena_destroy",
        arena_alloc: "sicm_arena_alloc",
        free: "sicm_free",
        check_available: "sicm_device_check",
        device_page_size: "sicm_device_page_size",
        arena_alloc_interleaved: "sicm_arena_alloc_interleaved",
    };
}

/// Which library to open and how to bind it
#[derive(Debug, Clone)]
pub struct LibrarySpec {
    pub kind: BackendKind,
    /// Tried in order; the first that opens wins
    pub file_names: Vec<String>,
    pub symbols: SymbolNames,
}

impl LibrarySpec {
    pub fn high_bandwidth(file_names: Vec<String>) -> Self {
        Self {
            kind: BackendKind::HighBandwidth,
            file_names,
            symbols: SymbolNames::SICM,
        }
    }

    pub fn large_capacity(file_names: Vec<String>) -> Self {
        Self {
            kind: BackendKind::LargeCapacity,
            file_names,
            symbols: SymbolNames::SICM,
        }
    }
}

#[derive(Clone, Copy)]
struct BackendFns {
    arena_create: ArenaCreateFn,
    arena_destroy: ArenaDestroyFn,
    arena_alloc: ArenaAllocFn,
    free: FreeFn,
    check_available: CheckAvailableFn,
    device_page_size: Option<DevicePageSizeFn>,
    arena_alloc_interleaved: Option<ArenaAllocFn>,
}

struct Loaded {
    fns: BackendFns,
    devices: RawDeviceList,
    // Dropped last: unloads the code behind `fns`.
    _library: Library,
}

// SAFETY: the device list points into memory owned by the loaded library,
// which stays mapped for as long as `Loaded` exists. It is only read.
unsafe impl Send for Loaded {}
unsafe impl Sync for Loaded {}

/// Device list handed to `arena_create`; kept alive as long as the arena
struct ArenaDevices {
    _devices: Box<[*mut RawDevice]>,
    _list: Box<RawDeviceList>,
}

// SAFETY: the pointers are library-owned device descriptors, never dereferenced here.
unsafe impl Send for ArenaDevices {}

/// Backend bound to a dynamically loaded allocator library
pub struct DynamicBackend {
    name: String,
    kind: BackendKind,
    capabilities: BackendCapabilities,
    state: RwLock<Option<Loaded>>,
    arenas: Mutex<AHashMap<usize, ArenaDevices>>,
}

impl std::fmt::Debug for DynamicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicBackend")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("capabilities", &self.capabilities)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl DynamicBackend {
    /// Open the library and resolve its symbols
    ///
    /// # Errors
    ///
    /// `LibraryLoad` if no file name opens, `MissingSymbol` if a required
    /// symbol is absent (the library is unloaded again).
    pub fn load(spec: &LibrarySpec) -> Result<Self> {
        let (library, file_name) = open_library(&spec.file_names)?;
        let names = &spec.symbols;

        let init: InitFn = load_symbol(&library, &file_name, names.init)?;
        let fns = BackendFns {
            arena_create: load_symbol(&library, &file_name, names.arena_create)?,
            arena_destroy: load_symbol(&library, &file_name, names.arena_destroy)?,
            arena_alloc: load_symbol(&library, &file_name, names.arena_alloc)?,
            free: load_symbol(&library, &file_name, names.free)?,
            check_available: load_symbol(&library, &file_name, names.check_available)?,
            device_page_size: load_optional_symbol(&library, names.device_page_size),
            arena_alloc_interleaved: load_optional_symbol(&library, names.arena_alloc_interleaved),
        };

        let capabilities = BackendCapabilities {
            kind_classification: true,
            page_size_query: fns.device_page_size.is_some(),
            interleaved_alloc: fns.arena_alloc_interleaved.is_some(),
        };

        // SAFETY: init takes no arguments and returns a library-owned device list.
        let devices = unsafe { init() };
        info!(
            target: "offload-memkind",
            "[{}] Loaded {} ({} devices, {:?})",
            spec.kind,
            file_name,
            devices.count,
            capabilities
        );

        Ok(Self {
            name: file_name,
            kind: spec.kind,
            capabilities,
            state: RwLock::new(Some(Loaded {
                fns,
                devices,
                _library: library,
            })),
            arenas: Mutex::new(AHashMap::new()),
        })
    }

    /// Whether the library is still loaded
    pub fn is_loaded(&self) -> bool {
        self.state.read().is_some()
    }
}

pub(super) fn open_library(file_names: &[String]) -> Result<(Library, String)> {
    let mut last_error = String::from("no library file names configured");
    for file_name in file_names {
        // SAFETY: dynamic library probing only; initializers of allocator libraries are trusted.
        match unsafe { Library::new(file_name) } {
            Ok(library) => return Ok((library, file_name.clone())),
            Err(e) => {
                debug!(target: "offload-memkind", "Could not open {}: {}", file_name, e);
                last_error = e.to_string();
            }
        }
    }
    Err(MemKindError::LibraryLoad {
        tried: file_names.join(", "),
        reason: last_error,
    })
}

pub(super) fn load_symbol<T: Copy>(
    library: &Library,
    library_name: &str,
    symbol: &str,
) -> Result<T> {
    // SAFETY: symbol type is expected to match the allocator library ABI in `ffi`.
    let resolved = unsafe { library.get::<T>(symbol.as_bytes()) }.map_err(|_| {
        MemKindError::MissingSymbol {
            library: library_name.to_string(),
            symbol: symbol.to_string(),
        }
    })?;
    Ok(*resolved)
}

pub(super) fn load_optional_symbol<T: Copy>(library: &Library, symbol: &str) -> Option<T> {
    // SAFETY: as in `load_symbol`.
    unsafe { library.get::<T>(symbol.as_bytes()) }
        .ok()
        .map(|s| *s)
}

impl MemoryBackend for DynamicBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    fn enumerate_resources(&self) -> Vec<MemoryResource> {
        let state = self.state.read();
        let Some(loaded) = state.as_ref() else {
            return Vec::new();
        };
        if loaded.devices.devices.is_null() {
            return Vec::new();
        }

        let mut resources = Vec::with_capacity(loaded.devices.count as usize);
        for i in 0..loaded.devices.count as usize {
            // SAFETY: `devices` holds `count` entries, as returned by init.
            let device = unsafe { *loaded.devices.devices.add(i) };
            if device.is_null() {
                continue;
            }
            // SAFETY: device is a live library-owned descriptor.
            if unsafe { (loaded.fns.check_available)(device) } != 0 {
                debug!(target: "offload-memkind", "[{}] Device {} unavailable", self.name, i);
                continue;
            }
            // SAFETY: as above; only the leading repr(C) fields are read.
            let (tag, node) = unsafe { ((*device).tag, (*device).node) };
            let page_size = loaded.fns.device_page_size.and_then(|query| {
                // SAFETY: as above.
                let kib = unsafe { query(device) };
                usize::try_from(kib).ok().filter(|&k| k > 0).map(|k| k * 1024)
            });
            resources.push(MemoryResource {
                handle: ResourceHandle(device as usize),
                tag: ResourceTag::from_raw(tag),
                node,
                page_size,
            });
        }
        resources
    }

    fn create_arena(&self, pool_size: usize, resources: &[MemoryResource]) -> Option<ArenaHandle> {
        let state = self.state.read();
        let loaded = state.as_ref()?;

        let mut devices: Box<[*mut RawDevice]> = resources
            .iter()
            .map(|r| r.handle.0 as *mut RawDevice)
            .collect();
        let mut list = Box::new(RawDeviceList {
            count: u32::try_from(devices.len()).ok()?,
            devices: devices.as_mut_ptr(),
        });

        // SAFETY: list and its device array stay alive until destroy_arena.
        let arena = unsafe { (loaded.fns.arena_create)(pool_size, 0, &mut *list) };
        if arena.is_null() {
            warn!(
                target: "offload-memkind",
                "[{}] arena_create({} bytes, {} devices) failed",
                self.name,
                pool_size,
                resources.len()
            );
            return None;
        }

        self.arenas.lock().insert(
            arena as usize,
            ArenaDevices {
                _devices: devices,
                _list: list,
            },
        );
        Some(ArenaHandle(arena as usize))
    }

    fn destroy_arena(&self, arena: ArenaHandle) {
        let state = self.state.read();
        if self.arenas.lock().remove(&arena.0).is_none() {
            return;
        }
        if let Some(loaded) = state.as_ref() {
            // SAFETY: arena was created by this library and is destroyed once.
            unsafe { (loaded.fns.arena_destroy)(arena.0 as RawArena) };
        }
    }

    fn arena_alloc(&self, arena: ArenaHandle, size: usize) -> Option<NonNull<u8>> {
        let state = self.state.read();
        let loaded = state.as_ref()?;
        // SAFETY: arena is a live handle from create_arena.
        let ptr = unsafe { (loaded.fns.arena_alloc)(arena.0 as RawArena, size) };
        NonNull::new(ptr.cast::<u8>())
    }

    fn arena_alloc_interleaved(&self, arena: ArenaHandle, size: usize) -> Option<NonNull<u8>> {
        let state = self.state.read();
        let loaded = state.as_ref()?;
        let alloc = loaded
            .fns
            .arena_alloc_interleaved
            .unwrap_or(loaded.fns.arena_alloc);
        // SAFETY: as in arena_alloc.
        let ptr = unsafe { alloc(arena.0 as RawArena, size) };
        NonNull::new(ptr.cast::<u8>())
    }

    fn free(&self, ptr: NonNull<u8>) {
        let state = self.state.read();
        match state.as_ref() {
            // SAFETY: ptr came from this library's arena_alloc.
            Some(loaded) => unsafe { (loaded.fns.free)(ptr.as_ptr().cast::<c_void>()) },
            None => warn!(
                target: "offload-memkind",
                "[{}] free after shutdown ignored ({:p})",
                self.name,
                ptr
            ),
        }
    }

    fn shutdown(&self) -> bool {
        let mut state = self.state.write();
        let Some(loaded) = state.take() else {
            return false;
        };

        let arenas: Vec<usize> = self.arenas.lock().drain().map(|(handle, _)| handle).collect();
        for handle in &arenas {
            // SAFETY: each live arena is destroyed exactly once before unload.
            unsafe { (loaded.fns.arena_destroy)(*handle as RawArena) };
        }
        drop(loaded);

        info!(
            target: "offload-memkind",
            "[{}] Unloaded ({} arenas destroyed)",
            self.name,
            arenas.len()
        );
        true
    }
}

impl Drop for DynamicBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}
