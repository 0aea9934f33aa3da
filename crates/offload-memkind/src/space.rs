// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Memory spaces, memory kinds and allocator configurations

use std::fmt;

/// Memory-space intent requested by an allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemorySpace {
    Default,
    LargeCap,
    Const,
    HighBw,
    LowLat,
    /// Implementation-defined space with no kind group
    Custom(u32),
}

impl MemorySpace {
    /// Kind group serving this space, `None` for custom spaces
    pub fn kind(self) -> Option<MemoryKind> {
        match self {
            MemorySpace::Default => Some(MemoryKind::Default),
            MemorySpace::LargeCap => Some(MemoryKind::LargeCapacity),
            MemorySpace::Const => Some(MemoryKind::Constant),
            MemorySpace::HighBw => Some(MemoryKind::HighBandwidth),
            MemorySpace::LowLat => Some(MemoryKind::LowLatency),
            MemorySpace::Custom(_) => None,
        }
    }
}

/// Classification of physical memory resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemoryKind {
    Default,
    HighBandwidth,
    LargeCapacity,
    Constant,
    LowLatency,
}

impl MemoryKind {
    pub const ALL: [MemoryKind; 5] = [
        MemoryKind::Default,
        MemoryKind::HighBandwidth,
        MemoryKind::LargeCapacity,
        MemoryKind::Constant,
        MemoryKind::LowLatency,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MemoryKind::Default => "default",
            MemoryKind::HighBandwidth => "high-bandwidth",
            MemoryKind::LargeCapacity => "large-capacity",
            MemoryKind::Constant => "constant",
            MemoryKind::LowLatency => "low-latency",
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Placement trait of an allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Partition {
    #[default]
    Environment,
    Nearest,
    Blocked,
    /// Spread pages across all resources when the backend can
    Interleaved,
}

/// What an allocator asks of the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorConfig {
    pub space: MemorySpace,
    /// Arena pool size in bytes; `0` lets the backend choose
    pub pool_size: usize,
    pub partition: Partition,
}

impl AllocatorConfig {
    pub fn new(space: MemorySpace) -> Self {
        Self {
            space,
            pool_size: 0,
            partition: Partition::default(),
        }
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_partition(mut self, partition: Partition) -> Self {
        self.partition = partition;
        self
    }
}

/// The runtime's predefined allocators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardAllocator {
    Null,
    Default,
    LargeCap,
    Const,
    HighBw,
    LowLat,
    CGroup,
    PTeam,
    Thread,
}

impl StandardAllocator {
    pub const ALL: [StandardAllocator; 9] = [
        StandardAllocator::Null,
        StandardAllocator::Default,
        StandardAllocator::LargeCap,
        StandardAllocator::Const,
        StandardAllocator::HighBw,
        StandardAllocator::LowLat,
        StandardAllocator::CGroup,
        StandardAllocator::PTeam,
        StandardAllocator::Thread,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StandardAllocator::Null => "null",
            StandardAllocator::Default => "default",
            StandardAllocator::LargeCap => "large_cap",
            StandardAllocator::Const => "const",
            StandardAllocator::HighBw => "high_bw",
            StandardAllocator::LowLat => "low_lat",
            StandardAllocator::CGroup => "cgroup",
            StandardAllocator::PTeam => "pteam",
            StandardAllocator::Thread => "thread",
        }
    }

    /// Memory space the allocator draws from
    ///
    /// The null allocator means "use the default"; the group-scoped allocators
    /// (`cgroup`, `pteam`, `thread`) live in low-latency memory.
    pub fn memory_space(self) -> MemorySpace {
        match self {
            StandardAllocator::Null | StandardAllocator::Default => MemorySpace::Default,
            StandardAllocator::LargeCap => MemorySpace::LargeCap,
            StandardAllocator::Const => MemorySpace::Const,
            StandardAllocator::HighBw => MemorySpace::HighBw,
            StandardAllocator::LowLat
            | StandardAllocator::CGroup
            | StandardAllocator::PTeam
            | StandardAllocator::Thread => MemorySpace::LowLat,
        }
    }

    pub fn config(self, pool_size: usize) -> AllocatorConfig {
        AllocatorConfig::new(self.memory_space()).with_pool_size(pool_size)
    }
}

impl fmt::Display for StandardAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_to_kind() {
        assert_eq!(MemorySpace::HighBw.kind(), Some(MemoryKind::HighBandwidth));
        assert_eq!(MemorySpace::LargeCap.kind(), Some(MemoryKind::LargeCapacity));
        assert_eq!(MemorySpace::Custom(7).kind(), None);
    }

    #[test]
    fn test_standard_allocators() {
        assert_eq!(StandardAllocator::ALL.len(), 9);
        assert_eq!(StandardAllocator::Thread.memory_space(), MemorySpace::LowLat);
        assert_eq!(StandardAllocator::Null.memory_space(), MemorySpace::Default);

        let config = StandardAllocator::HighBw.config(4096);
        assert_eq!(config.space, MemorySpace::HighBw);
        assert_eq!(config.pool_size, 4096);
        assert_eq!(config.partition, Partition::Environment);
    }
}
