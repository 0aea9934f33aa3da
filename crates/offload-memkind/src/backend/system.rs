// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Process-heap backend, bound when no allocator library is available

use super::{ArenaHandle, BackendCapabilities, BackendKind, MemoryBackend};
use crate::catalog::{MemoryResource, ResourceHandle, ResourceTag};
use ahash::AHashMap;
use parking_lot::Mutex;
use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::warn;

/// Alignment of every system-backend allocation
pub const SYSTEM_ALIGNMENT: usize = 16;

/// Heap backend
///
/// Arenas are bookkeeping only; every allocation goes to the global allocator.
/// Live layouts are tracked so `free` can be called with just the pointer.
#[derive(Debug, Default)]
pub struct SystemBackend {
    next_arena: AtomicUsize,
    arenas: Mutex<AHashMap<usize, usize>>,
    live: Mutex<AHashMap<usize, Layout>>,
    shut_down: AtomicBool,
}

impl SystemBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocations not yet freed
    pub fn live_allocations(&self) -> usize {
        self.live.lock().len()
    }

    pub fn live_arenas(&self) -> usize {
        self.arenas.lock().len()
    }
}

impl MemoryBackend for SystemBackend {
    fn name(&self) -> &str {
        "system"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Default
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::default()
    }

    fn enumerate_resources(&self) -> Vec<MemoryResource> {
        vec![MemoryResource {
            handle: ResourceHandle(0),
            tag: ResourceTag::Dram,
            node: 0,
            page_size: None,
        }]
    }

    fn create_arena(&self, pool_size: usize, _resources: &[MemoryResource]) -> Option<ArenaHandle> {
        if self.shut_down.load(Ordering::Acquire) {
            return None;
        }
        let id = self.next_arena.fetch_add(1, Ordering::Relaxed) + 1;
        self.arenas.lock().insert(id, pool_size);
        Some(ArenaHandle(id))
    }

    fn destroy_arena(&self, arena: ArenaHandle) {
        self.arenas.lock().remove(&arena.0);
    }

    fn arena_alloc(&self, _arena: ArenaHandle, size: usize) -> Option<NonNull<u8>> {
        if size == 0 || self.shut_down.load(Ordering::Acquire) {
            return None;
        }
        let layout = Layout::from_size_align(size, SYSTEM_ALIGNMENT).ok()?;
        // SAFETY: layout has non-zero size.
        let ptr = NonNull::new(unsafe { alloc::alloc(layout) })?;
        self.live.lock().insert(ptr.as_ptr() as usize, layout);
        Some(ptr)
    }

    fn free(&self, ptr: NonNull<u8>) {
        let Some(layout) = self.live.lock().remove(&(ptr.as_ptr() as usize)) else {
            warn!(target: "offload-memkind", "[SYSTEM] Ignoring free of unknown pointer {:p}", ptr);
            return;
        };
        // SAFETY: ptr was returned by alloc::alloc with this layout and is freed once.
        unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
    }

    fn shutdown(&self) -> bool {
        !self.shut_down.swap(true, Ordering::AcqRel)
    }
}
