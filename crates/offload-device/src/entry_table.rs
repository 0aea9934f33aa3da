// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Entry table: host symbol address → device entry bindings
//!
//! The table is mutated only by image loading. Lookups scan in registration
//! order and return the first match.

use crate::types::HostAddr;

/// What an entry refers to, derived from its size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Executable compute region (`size == 0`)
    Region,
    /// Global variable of `size` bytes
    Global,
}

/// One symbol exposed by a loaded image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffloadEntry {
    /// Host-side identifier used as lookup key; never dereferenced
    pub host_addr: HostAddr,
    /// Human-readable symbol name
    pub name: String,
    /// Zero for regions, byte size for globals
    pub size: u64,
    /// Backend-specific metadata, carried verbatim
    pub flags: i32,
}

impl OffloadEntry {
    /// Executable region entry
    pub fn region(host_addr: HostAddr, name: impl Into<String>) -> Self {
        Self {
            host_addr,
            name: name.into(),
            size: 0,
            flags: 0,
        }
    }

    /// Global variable entry
    pub fn global(host_addr: HostAddr, name: impl Into<String>, size: u64) -> Self {
        Self {
            host_addr,
            name: name.into(),
            size,
            flags: 0,
        }
    }

    /// Attach backend metadata
    pub fn with_flags(mut self, flags: i32) -> Self {
        self.flags = flags;
        self
    }

    pub fn kind(&self) -> EntryKind {
        if self.size == 0 {
            EntryKind::Region
        } else {
            EntryKind::Global
        }
    }
}

/// Ordered entries of the currently loaded image
#[derive(Debug, Default)]
pub struct EntryTable {
    entries: Vec<OffloadEntry>,
}

impl EntryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Append in registration order
    pub fn push(&mut self, entry: OffloadEntry) {
        self.entries.push(entry);
    }

    /// First entry registered under `host_addr`
    pub fn find(&self, host_addr: HostAddr) -> Option<&OffloadEntry> {
        self.entries.iter().find(|e| e.host_addr == host_addr)
    }

    /// Snapshot of the current contents
    pub fn view(&self) -> EntryTableView {
        EntryTableView {
            entries: self.entries.clone(),
        }
    }
}

/// Owned snapshot of an entry table
///
/// Later loads do not affect an existing view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryTableView {
    entries: Vec<OffloadEntry>,
}

impl EntryTableView {
    pub fn entries(&self) -> &[OffloadEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Regions only
    pub fn regions(&self) -> impl Iterator<Item = &OffloadEntry> {
        self.entries.iter().filter(|e| e.kind() == EntryKind::Region)
    }

    /// Globals only
    pub fn globals(&self) -> impl Iterator<Item = &OffloadEntry> {
        self.entries.iter().filter(|e| e.kind() == EntryKind::Global)
    }
}

impl<'a> IntoIterator for &'a EntryTableView {
    type Item = &'a OffloadEntry;
    type IntoIter = std::slice::Iter<'a, OffloadEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_size() {
        assert_eq!(OffloadEntry::region(HostAddr(1), "k").kind(), EntryKind::Region);
        assert_eq!(OffloadEntry::global(HostAddr(2), "g", 8).kind(), EntryKind::Global);
    }

    #[test]
    fn test_find_first_match() {
        let mut table = EntryTable::new();
        table.push(OffloadEntry::region(HostAddr(0x10), "a"));
        table.push(OffloadEntry::region(HostAddr(0x20), "b").with_flags(3));

        assert_eq!(table.find(HostAddr(0x20)).map(|e| e.name.as_str()), Some("b"));
        assert_eq!(table.find(HostAddr(0x20)).map(|e| e.flags), Some(3));
        assert!(table.find(HostAddr(0x30)).is_none());
    }

    #[test]
    fn test_view_is_a_snapshot() {
        let mut table = EntryTable::new();
        table.push(OffloadEntry::region(HostAddr(0x10), "a"));
        table.push(OffloadEntry::global(HostAddr(0x20), "g", 4));
        let view = table.view();

        table.clear();
        assert!(table.is_empty());
        assert_eq!(view.len(), 2);
        assert_eq!(view.regions().count(), 1);
        assert_eq!(view.globals().count(), 1);
        assert_eq!((&view).into_iter().next().map(|e| e.host_addr), Some(HostAddr(0x10)));
    }
}
