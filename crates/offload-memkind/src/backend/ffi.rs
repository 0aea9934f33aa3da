// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! C ABI of the dynamically loaded allocator libraries
//!
//! Two ABIs are bound:
//!
//! - Device-list libraries follow the SICM low-level interface: `init`
//!   returns a list of device pointers owned by the library, arenas are
//!   opaque pointers, and devices are passed back by pointer.
//! - Kind-based libraries (libmemkind) export global kind handles
//!   (`MEMKIND_DEFAULT`, ...) and allocate directly from a kind.

use std::ffi::{c_int, c_uint, c_void};

/// Device descriptor (leading fields only; the library owns the allocation)
#[repr(C)]
#[derive(Debug)]
pub struct RawDevice {
    pub tag: c_int,
    pub node: c_int,
    pub page_size: c_int,
}

/// Counted array of device pointers
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawDeviceList {
    pub count: c_uint,
    pub devices: *mut *mut RawDevice,
}

impl RawDeviceList {
    pub const EMPTY: RawDeviceList = RawDeviceList {
        count: 0,
        devices: std::ptr::null_mut(),
    };
}

pub type RawArena = *mut c_void;

pub type InitFn = unsafe extern "C" fn() -> RawDeviceList;
pub type ArenaCreateFn =
    unsafe extern "C" fn(pool_size: usize, flags: c_int, devices: *mut RawDeviceList) -> RawArena;
pub type ArenaDestroyFn = unsafe extern "C" fn(arena: RawArena);
pub type ArenaAllocFn = unsafe extern "C" fn(arena: RawArena, size: usize) -> *mut c_void;
pub type FreeFn = unsafe extern "C" fn(ptr: *mut c_void);
/// Returns `0` when the device is usable
pub type CheckAvailableFn = unsafe extern "C" fn(device: *mut RawDevice) -> c_int;
/// Page size in KiB, non-positive when unknown
pub type DevicePageSizeFn = unsafe extern "C" fn(device: *mut RawDevice) -> c_int;

/// Kind handle (`memkind_t`)
pub type RawKind = *mut c_void;

pub type KindMallocFn = unsafe extern "C" fn(kind: RawKind, size: usize) -> *mut c_void;
/// A null kind lets the library detect the owning kind
pub type KindFreeFn = unsafe extern "C" fn(kind: RawKind, ptr: *mut c_void);
/// Returns `0` when the kind is usable on this machine
pub type KindCheckFn = unsafe extern "C" fn(kind: RawKind) -> c_int;
