// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for device operations

use crate::types::{DeviceAddr, HostAddr};
use thiserror::Error;

/// Device errors
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Image bytes do not start with the expected magic
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// An entry descriptor in the image has a null host address
    #[error("Invalid image: entry {index} ('{name}') has a null host address")]
    NullEntryAddress {
        /// Position of the entry in the image
        index: usize,
        /// Entry name as carried by the image
        name: String,
    },

    /// Two entry descriptors in one image share a host address
    #[error("Invalid image: entry {index} ('{name}') reuses host address {host_addr}")]
    DuplicateEntryAddress {
        /// Position of the second occurrence
        index: usize,
        /// Entry name as carried by the image
        name: String,
        /// The repeated address
        host_addr: HostAddr,
    },

    /// Allocation size is zero or not below the configured ceiling
    #[error("Invalid allocation size {size} (must be in 1..{limit})")]
    InvalidAllocationSize {
        /// Requested bytes
        size: u64,
        /// Exclusive upper bound
        limit: u64,
    },

    /// The bump cursor cannot advance any further
    #[error("Device address space exhausted: cursor {cursor}, requested {size} bytes")]
    AddressSpaceExhausted {
        /// Cursor at the time of the request
        cursor: i64,
        /// Requested bytes
        size: u64,
    },

    /// No live allocation at this device address
    #[error("Unknown device address {0}")]
    UnknownDeviceAddress(DeviceAddr),

    /// Transfer length differs from the allocation's declared size
    #[error("Size mismatch at {addr}: allocation is {expected} bytes, transfer is {actual} bytes")]
    SizeMismatch {
        /// Target allocation
        addr: DeviceAddr,
        /// Declared allocation size
        expected: u64,
        /// Transfer length
        actual: u64,
    },

    /// Retrieve before any submit
    #[error("Device buffer at {0} has never been written")]
    BufferNotInitialized(DeviceAddr),

    /// Host memory for the backing buffer could not be reserved
    #[error("Failed to allocate {size} bytes of backing storage for {addr}")]
    BufferAllocation {
        /// Target allocation
        addr: DeviceAddr,
        /// Requested bytes
        size: u64,
    },

    /// No entry registered under this host address
    #[error("Entry not found for host address {0}")]
    EntryNotFound(HostAddr),

    /// Argument and offset arrays disagree
    #[error("Argument count mismatch: {args} arguments, {offsets} offsets")]
    ArgumentCountMismatch {
        /// Number of argument pointers
        args: usize,
        /// Number of offsets
        offsets: usize,
    },

    /// The region executor reported a failure
    #[error("Region execution failed for '{entry}': {reason}")]
    Execution {
        /// Entry name
        entry: String,
        /// Executor message
        reason: String,
    },
}

/// Result type for device operations
pub type Result<T> = std::result::Result<T, DeviceError>;
