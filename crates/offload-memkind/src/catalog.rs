// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Kind Catalog
//!
//! Groups the physical memory resources reported by a backend into memory
//! kinds. Built once when a backend binds; read-only afterwards.
//!
//! Tag map:
//!
//! | Raw tag | Resource          | Kind            |
//! |---------|-------------------|-----------------|
//! | 0       | DRAM              | default         |
//! | 1       | KNL on-package HBM| high-bandwidth  |
//! | 2       | Optane            | large-capacity  |
//! | 3       | POWER HBM         | high-bandwidth  |
//!
//! No tag classifies as constant or low-latency, so those groups stay empty
//! on every dynamically loaded backend.

use crate::space::MemoryKind;
use ahash::AHashMap;

/// Opaque backend handle for one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle(pub usize);

/// Resource tag as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceTag {
    Dram,
    KnlHbm,
    Optane,
    PowerPcHbm,
    Other(i32),
}

impl ResourceTag {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => ResourceTag::Dram,
            1 => ResourceTag::KnlHbm,
            2 => ResourceTag::Optane,
            3 => ResourceTag::PowerPcHbm,
            other => ResourceTag::Other(other),
        }
    }

    /// Kind group this tag belongs to, if any
    pub fn kind(self) -> Option<MemoryKind> {
        match self {
            ResourceTag::Dram => Some(MemoryKind::Default),
            ResourceTag::KnlHbm | ResourceTag::PowerPcHbm => Some(MemoryKind::HighBandwidth),
            ResourceTag::Optane => Some(MemoryKind::LargeCapacity),
            ResourceTag::Other(_) => None,
        }
    }
}

/// One physical memory resource (typically a NUMA node)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryResource {
    pub handle: ResourceHandle,
    pub tag: ResourceTag,
    pub node: i32,
    /// Page size in bytes, when the backend can report it
    pub page_size: Option<usize>,
}

/// Memory kind → resources
#[derive(Debug, Clone, Default)]
pub struct KindCatalog {
    all: Vec<MemoryResource>,
    groups: AHashMap<MemoryKind, Vec<MemoryResource>>,
}

impl KindCatalog {
    /// Classify `resources`
    ///
    /// With `hbw_page_size` set, high-bandwidth resources that report a
    /// different page size are left out. Resources with no reported page size
    /// are kept.
    pub fn build(resources: Vec<MemoryResource>, hbw_page_size: Option<usize>) -> Self {
        let mut groups: AHashMap<MemoryKind, Vec<MemoryResource>> =
            MemoryKind::ALL.iter().map(|&k| (k, Vec::new())).collect();

        for resource in &resources {
            let Some(kind) = resource.tag.kind() else {
                continue;
            };
            if kind == MemoryKind::HighBandwidth {
                if let (Some(required), Some(actual)) = (hbw_page_size, resource.page_size) {
                    if required != actual {
                        continue;
                    }
                }
            }
            groups.entry(kind).or_default().push(resource.clone());
        }

        Self {
            all: resources,
            groups,
        }
    }

    /// Every resource the backend reported
    pub fn all(&self) -> &[MemoryResource] {
        &self.all
    }

    pub fn group(&self, kind: MemoryKind) -> &[MemoryResource] {
        self.groups.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `(kind, resource count)` for every kind, in [`MemoryKind::ALL`] order
    pub fn summary(&self) -> Vec<(MemoryKind, usize)> {
        MemoryKind::ALL
            .iter()
            .map(|&k| (k, self.group(k).len()))
            .collect()
    }
}
