// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Device image descriptor and admission checks
//!
//! The four-byte WebAssembly magic is the only format contract enforced here.
//! Image contents are otherwise opaque and handed to the region executor as-is.

use crate::entry_table::OffloadEntry;
use crate::error::{DeviceError, Result};
use ahash::AHashSet;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// WebAssembly module magic (`"\0asm"`)
pub const WASM_MAGIC: [u8; 4] = *b"\0asm";

/// True iff the image is at least four bytes long and starts with [`WASM_MAGIC`]
pub fn is_valid_image(bytes: &[u8]) -> bool {
    bytes.len() >= WASM_MAGIC.len() && bytes[..WASM_MAGIC.len()] == WASM_MAGIC
}

/// Image byte range plus its entry descriptors, in image order
#[derive(Debug, Clone, Copy)]
pub struct DeviceImage<'a> {
    pub bytes: &'a [u8],
    pub entries: &'a [OffloadEntry],
}

impl<'a> DeviceImage<'a> {
    pub fn new(bytes: &'a [u8], entries: &'a [OffloadEntry]) -> Self {
        Self { bytes, entries }
    }

    /// See [`is_valid_image`]
    pub fn is_valid(&self) -> bool {
        is_valid_image(self.bytes)
    }

    /// Reject bytes that do not carry [`WASM_MAGIC`]
    ///
    /// # Errors
    ///
    /// `InvalidImage` with the length and leading bytes of the rejected image.
    pub fn check_magic(&self) -> Result<()> {
        if self.is_valid() {
            return Ok(());
        }
        let head = &self.bytes[..self.bytes.len().min(WASM_MAGIC.len())];
        Err(DeviceError::InvalidImage(format!(
            "{} bytes, expected prefix {:02x?}, found {:02x?}",
            self.bytes.len(),
            WASM_MAGIC,
            head
        )))
    }

    /// Check every descriptor without touching any device state
    ///
    /// # Errors
    ///
    /// The first null or repeated host address, by position.
    pub fn validate_entries(&self) -> Result<()> {
        let mut seen = AHashSet::with_capacity(self.entries.len());
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.host_addr.is_null() {
                return Err(DeviceError::NullEntryAddress {
                    index,
                    name: entry.name.clone(),
                });
            }
            if !seen.insert(entry.host_addr) {
                return Err(DeviceError::DuplicateEntryAddress {
                    index,
                    name: entry.name.clone(),
                    host_addr: entry.host_addr,
                });
            }
        }
        Ok(())
    }
}

/// Write the raw image to `path`, truncating whatever was there
pub fn persist_image(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.flush()
}
