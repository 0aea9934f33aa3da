// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Backend arena scoped to one memory space and pool size

use crate::backend::{ArenaHandle, MemoryBackend};
use crate::catalog::MemoryResource;
use crate::error::{MemKindError, Result};
use crate::space::MemorySpace;
use std::ptr::NonNull;
use std::sync::Arc;
use tracing::debug;

/// Owns one backend arena; destroys it on drop
pub struct Arena {
    backend: Arc<dyn MemoryBackend>,
    handle: ArenaHandle,
    space: MemorySpace,
    pool_size: usize,
    interleaved: bool,
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("backend", &self.backend.name())
            .field("handle", &self.handle)
            .field("space", &self.space)
            .field("pool_size", &self.pool_size)
            .field("interleaved", &self.interleaved)
            .finish()
    }
}

impl Arena {
    /// Create an arena over `resources`
    ///
    /// # Errors
    ///
    /// `ArenaCreation` when the backend refuses.
    pub fn create(
        backend: Arc<dyn MemoryBackend>,
        space: MemorySpace,
        pool_size: usize,
        resources: &[MemoryResource],
    ) -> Result<Self> {
        let handle = backend
            .create_arena(pool_size, resources)
            .ok_or_else(|| MemKindError::ArenaCreation {
                backend: backend.name().to_string(),
                space,
                pool_size,
            })?;
        debug!(
            target: "offload-memkind",
            "[{}] Arena {:?} for {:?} over {} resources (pool {} bytes)",
            backend.name(),
            handle,
            space,
            resources.len(),
            pool_size
        );
        Ok(Self {
            backend,
            handle,
            space,
            pool_size,
            interleaved: false,
        })
    }

    /// Arena whose allocations use interleaved placement
    pub fn create_interleaved(
        backend: Arc<dyn MemoryBackend>,
        space: MemorySpace,
        pool_size: usize,
        resources: &[MemoryResource],
    ) -> Result<Self> {
        let mut arena = Self::create(backend, space, pool_size, resources)?;
        arena.interleaved = true;
        Ok(arena)
    }

    pub fn handle(&self) -> ArenaHandle {
        self.handle
    }

    pub fn space(&self) -> MemorySpace {
        self.space
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn is_interleaved(&self) -> bool {
        self.interleaved
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        if self.interleaved {
            self.backend.arena_alloc_interleaved(self.handle, size)
        } else {
            self.backend.arena_alloc(self.handle, size)
        }
    }

    pub fn free(&self, ptr: NonNull<u8>) {
        self.backend.free(ptr);
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        self.backend.destroy_arena(self.handle);
    }
}
