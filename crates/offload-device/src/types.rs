// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Opaque address types shared by the device layer

use std::fmt;

/// Host-side address used as an identifier only; never dereferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct HostAddr(pub u64);

impl HostAddr {
    /// The null host address
    pub const NULL: HostAddr = HostAddr(0);

    /// Whether this is the null address
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Identify a host object by its address
    pub fn of<T: ?Sized>(value: &T) -> Self {
        HostAddr(value as *const T as *const () as usize as u64)
    }
}

impl fmt::Display for HostAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Synthetic device address. Values come from a per-device cursor and never
/// alias a host pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceAddr(pub i64);

impl DeviceAddr {
    /// Raw value
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for DeviceAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev:{:#x}", self.0)
    }
}
