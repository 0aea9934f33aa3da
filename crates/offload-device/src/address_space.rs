// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Synthetic Device Address Space
//!
//! Maps device addresses to host-memory-backed allocations.
//!
//! Addresses come from a bump cursor: every allocation takes `[cursor, cursor + size)`
//! and the cursor only moves forward, so an address is never reissued while the
//! device lives. Releasing an allocation frees its buffer and removes the slot but
//! does not give the range back.
//!
//! Per-allocation lifecycle:
//!
//! ```text
//! allocate ──► Allocated (no buffer) ──submit──► Allocated (buffered) ──release──► gone
//!                     │                              ▲       │
//!                     └──────────release─────────────┼───────┘
//!                                                 submit (overwrite)
//! ```

use crate::error::{DeviceError, Result};
use crate::types::{DeviceAddr, HostAddr};
use ahash::AHashMap;
use offload_config::DeviceConfig;

/// Cursor base and size ceiling for an address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressSpaceConfig {
    /// First address handed out (keeps `0..base` reserved as the null range)
    pub base: i64,
    /// Exclusive upper bound for a single allocation
    pub max_allocation_size: u64,
}

impl Default for AddressSpaceConfig {
    fn default() -> Self {
        Self {
            base: 16,
            max_allocation_size: 1 << 32,
        }
    }
}

impl From<&DeviceConfig> for AddressSpaceConfig {
    fn from(config: &DeviceConfig) -> Self {
        Self {
            base: config.address_base,
            max_allocation_size: config.max_allocation_size,
        }
    }
}

/// One live device allocation
#[derive(Debug)]
pub struct Allocation {
    host_addr: HostAddr,
    device_addr: DeviceAddr,
    size: u64,
    buffer: Option<Vec<u8>>,
}

impl Allocation {
    /// Host address recorded at allocation time (bookkeeping only)
    pub fn host_addr(&self) -> HostAddr {
        self.host_addr
    }

    /// Device address of the allocation
    pub fn device_addr(&self) -> DeviceAddr {
        self.device_addr
    }

    /// Declared size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Backing contents, `None` until the first submit
    pub fn buffer(&self) -> Option<&[u8]> {
        self.buffer.as_deref()
    }

    /// Whether a submit has populated the buffer
    pub fn is_buffered(&self) -> bool {
        self.buffer.is_some()
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len as u64 != self.size {
            return Err(DeviceError::SizeMismatch {
                addr: self.device_addr,
                expected: self.size,
                actual: len as u64,
            });
        }
        Ok(())
    }
}

/// Device address → allocation map with a monotonic bump cursor
#[derive(Debug)]
pub struct AddressSpace {
    config: AddressSpaceConfig,
    cursor: i64,
    allocations: AHashMap<i64, Allocation>,
}

impl AddressSpace {
    /// Create an empty address space with its cursor at `config.base`
    pub fn new(config: AddressSpaceConfig) -> Self {
        Self {
            cursor: config.base,
            config,
            allocations: AHashMap::new(),
        }
    }

    /// Next address that will be handed out
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// Configuration in effect
    pub fn config(&self) -> AddressSpaceConfig {
        self.config
    }

    /// Number of live allocations
    pub fn live_allocations(&self) -> usize {
        self.allocations.len()
    }

    /// Look up a live allocation
    pub fn allocation(&self, addr: DeviceAddr) -> Option<&Allocation> {
        self.allocations.get(&addr.0)
    }

    /// Iterate over live allocations (unordered)
    pub fn allocations(&self) -> impl Iterator<Item = &Allocation> {
        self.allocations.values()
    }

    /// Reserve `size` bytes of device address space
    ///
    /// # Errors
    ///
    /// `InvalidAllocationSize` when `size == 0` or `size >= max_allocation_size`;
    /// `AddressSpaceExhausted` when the cursor would overflow.
    pub fn allocate(&mut self, host_addr: HostAddr, size: u64) -> Result<DeviceAddr> {
        if size == 0 || size >= self.config.max_allocation_size {
            return Err(DeviceError::InvalidAllocationSize {
                size,
                limit: self.config.max_allocation_size,
            });
        }

        let next = i64::try_from(size)
            .ok()
            .and_then(|s| self.cursor.checked_add(s))
            .ok_or(DeviceError::AddressSpaceExhausted {
                cursor: self.cursor,
                size,
            })?;

        let device_addr = DeviceAddr(self.cursor);
        self.cursor = next;
        self.allocations.insert(
            device_addr.0,
            Allocation {
                host_addr,
                device_addr,
                size,
                buffer: None,
            },
        );
        Ok(device_addr)
    }

    /// Copy `data` into the allocation, creating the buffer on first use
    ///
    /// # Errors
    ///
    /// Unknown address, length different from the declared size, or failure to
    /// reserve the backing buffer. The buffer is untouched on error.
    pub fn submit(&mut self, addr: DeviceAddr, data: &[u8]) -> Result<()> {
        let allocation = self
            .allocations
            .get_mut(&addr.0)
            .ok_or(DeviceError::UnknownDeviceAddress(addr))?;
        allocation.check_len(data.len())?;

        match allocation.buffer.as_mut() {
            Some(buffer) => buffer.copy_from_slice(data),
            None => {
                let mut buffer = Vec::new();
                buffer
                    .try_reserve_exact(data.len())
                    .map_err(|_| DeviceError::BufferAllocation {
                        addr,
                        size: allocation.size,
                    })?;
                buffer.extend_from_slice(data);
                allocation.buffer = Some(buffer);
            }
        }
        Ok(())
    }

    /// Copy the allocation's contents into `out`
    ///
    /// # Errors
    ///
    /// Unknown address, nothing submitted yet, or length mismatch.
    pub fn retrieve(&self, addr: DeviceAddr, out: &mut [u8]) -> Result<()> {
        let allocation = self
            .allocations
            .get(&addr.0)
            .ok_or(DeviceError::UnknownDeviceAddress(addr))?;
        let buffer = allocation
            .buffer
            .as_deref()
            .ok_or(DeviceError::BufferNotInitialized(addr))?;
        allocation.check_len(out.len())?;

        out.copy_from_slice(buffer);
        Ok(())
    }

    /// Free the buffer and remove the slot; the address is not reused
    ///
    /// # Errors
    ///
    /// `UnknownDeviceAddress` when nothing is allocated at `addr`.
    pub fn release(&mut self, addr: DeviceAddr) -> Result<()> {
        self.allocations
            .remove(&addr.0)
            .map(drop)
            .ok_or(DeviceError::UnknownDeviceAddress(addr))
    }

    /// Drop every allocation, keeping the cursor where it is
    pub fn release_all(&mut self) -> usize {
        let released = self.allocations.len();
        self.allocations.clear();
        released
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new(AddressSpaceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: HostAddr = HostAddr(0xdead_0000);

    #[test]
    fn test_cursor_starts_at_base() {
        let space = AddressSpace::default();
        assert_eq!(space.cursor(), 16);
        assert_eq!(space.live_allocations(), 0);
    }

    #[test]
    fn test_size_bounds() {
        let mut space = AddressSpace::default();
        assert!(matches!(
            space.allocate(HOST, 0),
            Err(DeviceError::InvalidAllocationSize { size: 0, .. })
        ));
        assert!(matches!(
            space.allocate(HOST, 1 << 32),
            Err(DeviceError::InvalidAllocationSize { .. })
        ));

        let cursor = space.cursor();
        let addr = space.allocate(HOST, (1 << 32) - 1).unwrap();
        assert!(addr.get() >= cursor);
        assert_eq!(space.cursor(), cursor + (1 << 32) - 1);
    }

    #[test]
    fn test_bump_is_monotonic() {
        let mut space = AddressSpace::default();
        let a1 = space.allocate(HOST, 24).unwrap();
        let a2 = space.allocate(HOST, 8).unwrap();
        assert_eq!(a2.get(), a1.get() + 24);

        space.release(a1).unwrap();
        let a3 = space.allocate(HOST, 24).unwrap();
        assert_eq!(a3.get(), a2.get() + 8);
    }

    #[test]
    fn test_custom_ceiling() {
        let mut space = AddressSpace::new(AddressSpaceConfig {
            base: 4096,
            max_allocation_size: 64,
        });
        assert_eq!(space.allocate(HOST, 63).unwrap(), DeviceAddr(4096));
        assert!(space.allocate(HOST, 64).is_err());
    }

    #[test]
    fn test_cursor_overflow_reports_exhaustion() {
        let mut space = AddressSpace::new(AddressSpaceConfig {
            base: i64::MAX - 8,
            max_allocation_size: 1 << 32,
        });
        assert!(matches!(
            space.allocate(HOST, 16),
            Err(DeviceError::AddressSpaceExhausted { .. })
        ));
        assert_eq!(space.live_allocations(), 0);
    }

    #[test]
    fn test_submit_retrieve_round_trip() {
        let mut space = AddressSpace::default();
        let addr = space.allocate(HOST, 4).unwrap();
        assert!(!space.allocation(addr).unwrap().is_buffered());

        space.submit(addr, &[1, 2, 3, 4]).unwrap();
        let mut out = [0u8; 4];
        space.retrieve(addr, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);

        space.submit(addr, &[9, 8, 7, 6]).unwrap();
        space.retrieve(addr, &mut out).unwrap();
        assert_eq!(out, [9, 8, 7, 6]);
    }

    #[test]
    fn test_retrieve_before_submit_fails() {
        let mut space = AddressSpace::default();
        let addr = space.allocate(HOST, 4).unwrap();
        let mut out = [0u8; 4];
        assert!(matches!(
            space.retrieve(addr, &mut out),
            Err(DeviceError::BufferNotInitialized(_))
        ));
    }

    #[test]
    fn test_size_mismatch_leaves_buffer_untouched() {
        let mut space = AddressSpace::default();
        let addr = space.allocate(HOST, 4).unwrap();
        space.submit(addr, &[1, 2, 3, 4]).unwrap();

        assert!(matches!(
            space.submit(addr, &[0; 3]),
            Err(DeviceError::SizeMismatch { expected: 4, actual: 3, .. })
        ));
        let mut short = [0u8; 2];
        assert!(space.retrieve(addr, &mut short).is_err());
        assert_eq!(short, [0, 0]);

        assert_eq!(space.allocation(addr).unwrap().buffer(), Some(&[1, 2, 3, 4][..]));
    }

    #[test]
    fn test_release_once() {
        let mut space = AddressSpace::default();
        let addr = space.allocate(HOST, 4).unwrap();
        space.release(addr).unwrap();
        assert!(matches!(
            space.release(addr),
            Err(DeviceError::UnknownDeviceAddress(a)) if a == addr
        ));
        assert!(space.submit(addr, &[0; 4]).is_err());
    }

    #[test]
    fn test_unknown_address() {
        let mut space = AddressSpace::default();
        assert!(space.submit(DeviceAddr(16), &[0]).is_err());
        assert!(space.retrieve(DeviceAddr(16), &mut [0]).is_err());
    }

    #[test]
    fn test_release_all_keeps_cursor() {
        let mut space = AddressSpace::default();
        space.allocate(HOST, 10).unwrap();
        space.allocate(HOST, 10).unwrap();
        assert_eq!(space.release_all(), 2);
        assert_eq!(space.cursor(), 36);
        assert_eq!(space.allocate(HOST, 1).unwrap(), DeviceAddr(36));
    }
}
