// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Allocator Policy
//!
//! Binds the runtime's allocators to one memory backend.
//!
//! ## Backend selection
//!
//! ```text
//! Unbound ──probe──► Probing(candidate N) ──ok──► Bound(N)
//!                          │ fail
//!                          └──► Probing(N+1) ... ──none left──► Bound(system heap)
//! ```
//!
//! Candidates come from `MemoryConfig::backends` in order. A candidate fails
//! when its library cannot be opened, lacks a required symbol, or reports its
//! default kind unavailable; that is never an error to the caller, only a
//! `debug` log line.
//!
//! ## Allocation routing
//!
//! An [`Allocator`] uses, in order of preference: the policy's interleave arena
//! (if it asked for interleaved placement and one exists), its own arena, or
//! the policy's default arena.

use crate::arena::Arena;
use crate::backend::{
    BackendCapabilities, BackendKind, DynamicBackend, KindBackend, LibrarySpec, MemoryBackend,
    SystemBackend,
};
use crate::catalog::KindCatalog;
use crate::error::{MemKindError, Result};
use crate::space::{AllocatorConfig, MemoryKind, MemorySpace, Partition, StandardAllocator};
use offload_config::MemoryConfig;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A candidate that could not be bound, and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFailure {
    pub kind: BackendKind,
    pub reason: String,
}

/// Allocator bound to an arena of the policy's backend
#[derive(Debug, Clone)]
pub struct Allocator {
    config: AllocatorConfig,
    arena: Option<Arc<Arena>>,
    interleave: Option<Arc<Arena>>,
    fallback: Option<Arc<Arena>>,
}

impl Allocator {
    /// Allocator with no arena of its own
    fn default_path(config: AllocatorConfig, fallback: Option<Arc<Arena>>) -> Self {
        Self {
            config,
            arena: None,
            interleave: None,
            fallback,
        }
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// True when allocations go straight to the policy's default arena
    pub fn is_default_path(&self) -> bool {
        self.arena.is_none()
    }

    /// The allocator's own arena
    pub fn arena(&self) -> Option<&Arena> {
        self.arena.as_deref()
    }

    fn route(&self) -> Option<&Arc<Arena>> {
        self.interleave
            .as_ref()
            .or(self.arena.as_ref())
            .or(self.fallback.as_ref())
    }

    /// Allocate `size` bytes; `None` on exhaustion, zero size, or after shutdown
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        self.route()?.alloc(size)
    }

    /// Return memory obtained from [`Allocator::allocate`]
    pub fn free(&self, ptr: NonNull<u8>) {
        match self.route() {
            Some(arena) => arena.free(ptr),
            None => warn!(target: "offload-memkind", "free({:p}) with no arena bound", ptr),
        }
    }
}

/// The nine standard allocators
#[derive(Debug, Clone)]
pub struct StandardAllocators {
    allocators: Vec<(StandardAllocator, Allocator)>,
}

impl StandardAllocators {
    pub fn get(&self, which: StandardAllocator) -> Option<&Allocator> {
        self.allocators
            .iter()
            .find(|(kind, _)| *kind == which)
            .map(|(_, allocator)| allocator)
    }

    pub fn iter(&self) -> impl Iterator<Item = (StandardAllocator, &Allocator)> {
        self.allocators.iter().map(|(kind, a)| (*kind, a))
    }

    pub fn len(&self) -> usize {
        self.allocators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocators.is_empty()
    }
}

/// Memory-kind policy bound to one backend
pub struct AllocatorPolicy {
    backend: Arc<dyn MemoryBackend>,
    catalog: KindCatalog,
    default_arena: Option<Arc<Arena>>,
    interleave_arena: Option<Arc<Arena>>,
    default_pool_size: usize,
    probe_failures: Vec<ProbeFailure>,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for AllocatorPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocatorPolicy")
            .field("backend", &self.backend.name())
            .field("kind", &self.backend.kind())
            .field("catalog", &self.catalog.summary())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl AllocatorPolicy {
    /// Probe the configured backends in order and bind the first that loads
    ///
    /// Falls back to the system heap when none does; never fails.
    pub fn probe(config: &MemoryConfig) -> Self {
        let mut failures = Vec::new();

        for name in &config.backends {
            let Some(kind) = BackendKind::from_config_name(name) else {
                warn!(target: "offload-memkind", "Unknown memory backend '{}' skipped", name);
                continue;
            };
            debug!(target: "offload-memkind", "Probing {} backend", kind);
            let loaded: Result<Arc<dyn MemoryBackend>> = match kind {
                BackendKind::HighBandwidth => DynamicBackend::load(&LibrarySpec::high_bandwidth(
                    config.high_bandwidth_libraries.clone(),
                ))
                .map(|b| Arc::new(b) as Arc<dyn MemoryBackend>),
                BackendKind::LargeCapacity => DynamicBackend::load(&LibrarySpec::large_capacity(
                    config.large_capacity_libraries.clone(),
                ))
                .map(|b| Arc::new(b) as Arc<dyn MemoryBackend>),
                BackendKind::Memkind => KindBackend::load(&config.memkind_libraries)
                    .map(|b| Arc::new(b) as Arc<dyn MemoryBackend>),
                BackendKind::Default => continue,
            };

            match loaded {
                Ok(backend) => {
                    let mut policy = Self::with_backend(backend, config);
                    policy.probe_failures = failures;
                    return policy;
                }
                Err(e) => {
                    debug!(target: "offload-memkind", "{} backend unavailable: {}", kind, e);
                    failures.push(ProbeFailure {
                        kind,
                        reason: e.to_string(),
                    });
                }
            }
        }

        debug!(target: "offload-memkind", "No memory-kind library found, using the system heap");
        let mut policy = Self::with_backend(Arc::new(SystemBackend::new()), config);
        policy.probe_failures = failures;
        policy
    }

    /// Bind a specific backend
    pub fn with_backend(backend: Arc<dyn MemoryBackend>, config: &MemoryConfig) -> Self {
        let capabilities = backend.capabilities();
        let hbw_page_size = Some(config.hbw_page_size)
            .filter(|&p| p > 0 && capabilities.page_size_query);
        let catalog = KindCatalog::build(backend.enumerate_resources(), hbw_page_size);

        let default_resources = if capabilities.kind_classification {
            catalog.group(MemoryKind::Default)
        } else {
            catalog.all()
        };
        let default_arena = if default_resources.is_empty() {
            warn!(
                target: "offload-memkind",
                "[{}] No default-kind resources; default allocations will fail",
                backend.name()
            );
            None
        } else {
            Arena::create(
                Arc::clone(&backend),
                MemorySpace::Default,
                config.default_pool_size,
                default_resources,
            )
            .map_err(|e| warn!(target: "offload-memkind", "Default arena unavailable: {}", e))
            .ok()
            .map(Arc::new)
        };

        let interleave_arena = if capabilities.kind_classification && catalog.all().len() > 1 {
            Arena::create_interleaved(
                Arc::clone(&backend),
                MemorySpace::Default,
                config.default_pool_size,
                catalog.all(),
            )
            .map_err(|e| debug!(target: "offload-memkind", "Interleave arena unavailable: {}", e))
            .ok()
            .map(Arc::new)
        } else {
            None
        };

        info!(
            target: "offload-memkind",
            "Memory backend bound: {} ({}), kinds {:?}",
            backend.name(),
            backend.kind(),
            catalog.summary()
        );

        Self {
            backend,
            catalog,
            default_arena,
            interleave_arena,
            default_pool_size: config.default_pool_size,
            probe_failures: Vec::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn capabilities(&self) -> BackendCapabilities {
        self.backend.capabilities()
    }

    pub fn catalog(&self) -> &KindCatalog {
        &self.catalog
    }

    /// Candidates that were tried and rejected before binding
    pub fn probe_failures(&self) -> &[ProbeFailure] {
        &self.probe_failures
    }

    pub fn has_interleave_arena(&self) -> bool {
        self.interleave_arena.is_some()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Create an allocator for `config`
    ///
    /// # Errors
    ///
    /// - `UnsupportedMemorySpace` for a space with no kind group
    /// - `EmptyKindGroup` when the backend classifies resources and the group
    ///   is empty (no arena is created)
    /// - `ArenaCreation` when the backend refuses the arena
    /// - `BackendShutDown` after [`AllocatorPolicy::shutdown`]
    pub fn init_allocator(&self, config: &AllocatorConfig) -> Result<Allocator> {
        if self.is_shut_down() {
            return Err(MemKindError::BackendShutDown(self.backend.name().to_string()));
        }
        let kind = config
            .space
            .kind()
            .ok_or(MemKindError::UnsupportedMemorySpace(config.space))?;

        let resources = if self.backend.capabilities().kind_classification {
            let group = self.catalog.group(kind);
            if group.is_empty() {
                return Err(MemKindError::EmptyKindGroup {
                    space: config.space,
                    backend: self.backend.name().to_string(),
                });
            }
            group
        } else {
            self.catalog.all()
        };

        let pool_size = if config.pool_size == 0 {
            self.default_pool_size
        } else {
            config.pool_size
        };
        let arena = Arena::create(Arc::clone(&self.backend), config.space, pool_size, resources)?;

        let interleave = match config.partition {
            Partition::Interleaved => self.interleave_arena.clone(),
            _ => None,
        };

        Ok(Allocator {
            config: *config,
            arena: Some(Arc::new(arena)),
            interleave,
            fallback: self.default_arena.clone(),
        })
    }

    /// Allocator that always uses the default arena
    pub fn default_allocator(&self, config: AllocatorConfig) -> Allocator {
        Allocator::default_path(config, self.default_arena.clone())
    }

    /// Initialize the nine standard allocators
    ///
    /// The null allocator always takes the default path. Any other allocator
    /// whose initialization fails is bound to the default path with a warning.
    pub fn install_standard_allocators(&self) -> StandardAllocators {
        let allocators = StandardAllocator::ALL
            .iter()
            .map(|&which| {
                let config = which.config(self.default_pool_size);
                if which == StandardAllocator::Null {
                    return (which, self.default_allocator(config));
                }
                match self.init_allocator(&config) {
                    Ok(allocator) => (which, allocator),
                    Err(e) => {
                        warn!(
                            target: "offload-memkind",
                            "Standard allocator '{}' falls back to the default path: {}",
                            which,
                            e
                        );
                        (which, self.default_allocator(config))
                    }
                }
            })
            .collect();
        StandardAllocators { allocators }
    }

    /// Unload the backend; only the first call returns `true`
    pub fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.backend.shutdown();
        info!(target: "offload-memkind", "Memory backend '{}' shut down", self.backend.name());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_libraries() -> MemoryConfig {
        MemoryConfig {
            high_bandwidth_libraries: vec!["liboffload-missing-hbw.so".to_string()],
            large_capacity_libraries: vec!["liboffload-missing-optane.so".to_string()],
            memkind_libraries: vec!["liboffload-missing-memkind.so".to_string()],
            ..MemoryConfig::default()
        }
    }

    #[test]
    fn test_probe_falls_back_to_system() {
        let policy = AllocatorPolicy::probe(&missing_libraries());
        assert_eq!(policy.backend_kind(), BackendKind::Default);
        assert_eq!(policy.backend_name(), "system");

        let failures: Vec<BackendKind> = policy.probe_failures().iter().map(|f| f.kind).collect();
        assert_eq!(
            failures,
            vec![
                BackendKind::HighBandwidth,
                BackendKind::LargeCapacity,
                BackendKind::Memkind
            ]
        );
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    #[test]
    fn test_library_lacking_required_symbols_is_skipped() {
        // libm opens fine but exports none of the allocator entry points.
        let config = MemoryConfig {
            backends: vec!["high-bandwidth".to_string(), "large-capacity".to_string()],
            high_bandwidth_libraries: vec!["libm.so.6".to_string()],
            large_capacity_libraries: vec!["libm.so.6".to_string()],
            ..MemoryConfig::default()
        };
        let policy = AllocatorPolicy::probe(&config);
        assert_eq!(policy.backend_kind(), BackendKind::Default);

        let failures = policy.probe_failures();
        assert_eq!(failures.len(), 2);
        for failure in failures {
            assert!(failure.reason.contains("sicm_init"), "{}", failure.reason);
        }

        let allocators = policy.install_standard_allocators();
        let ptr = allocators.get(StandardAllocator::HighBw).unwrap().allocate(32).unwrap();
        allocators.get(StandardAllocator::HighBw).unwrap().free(ptr);
    }

    #[test]
    fn test_system_backend_serves_every_known_space() {
        let policy = AllocatorPolicy::probe(&missing_libraries());
        for space in [
            MemorySpace::Default,
            MemorySpace::LargeCap,
            MemorySpace::Const,
            MemorySpace::HighBw,
            MemorySpace::LowLat,
        ] {
            let allocator = policy.init_allocator(&AllocatorConfig::new(space)).unwrap();
            let ptr = allocator.allocate(64).unwrap();
            allocator.free(ptr);
        }
        assert!(matches!(
            policy.init_allocator(&AllocatorConfig::new(MemorySpace::Custom(99))),
            Err(MemKindError::UnsupportedMemorySpace(MemorySpace::Custom(99)))
        ));
    }

    #[test]
    fn test_standard_allocators_without_backend() {
        let policy = AllocatorPolicy::probe(&missing_libraries());
        let standard = policy.install_standard_allocators();
        assert_eq!(standard.len(), 9);
        assert!(standard
            .get(StandardAllocator::Null)
            .map_or(false, Allocator::is_default_path));

        for (which, allocator) in standard.iter() {
            let ptr = allocator
                .allocate(16)
                .unwrap_or_else(|| panic!("{} allocator returned nothing", which));
            allocator.free(ptr);
        }
        assert!(policy.catalog().group(MemoryKind::Default).len() == 1);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let policy = AllocatorPolicy::probe(&missing_libraries());
        let allocator = policy
            .init_allocator(&AllocatorConfig::new(MemorySpace::Default))
            .unwrap();

        assert!(policy.shutdown());
        assert!(!policy.shutdown());
        assert!(allocator.allocate(8).is_none());
        assert!(matches!(
            policy.init_allocator(&AllocatorConfig::new(MemorySpace::Default)),
            Err(MemKindError::BackendShutDown(_))
        ));
    }
}
