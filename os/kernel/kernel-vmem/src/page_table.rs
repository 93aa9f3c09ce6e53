//! # Per-address-space Page Table
//!
//! A flat, growable array of [`PageTableEntry`] values. Each entry maps one
//! virtual page to one physical frame. Lookups are linear; the table only ever
//! holds the pages a process has actually touched.

use crate::{PageEntryBits, VmError, reserve_for_push};
use alloc::vec::Vec;
use kernel_memory_addresses::{PhysicalPage, VirtualPage};

/// One virtual page → physical frame mapping.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PageTableEntry {
    page: VirtualPage,
    frame: PhysicalPage,
    bits: PageEntryBits,
}

impl PageTableEntry {
    #[inline]
    #[must_use]
    pub const fn new(page: VirtualPage, frame: PhysicalPage, bits: PageEntryBits) -> Self {
        Self { page, frame, bits }
    }

    #[inline]
    #[must_use]
    pub const fn page(&self) -> VirtualPage {
        self.page
    }

    #[inline]
    #[must_use]
    pub const fn frame(&self) -> PhysicalPage {
        self.frame
    }

    #[inline]
    #[must_use]
    pub const fn bits(&self) -> PageEntryBits {
        self.bits
    }

    #[inline]
    pub const fn bits_mut(&mut self) -> &mut PageEntryBits {
        &mut self.bits
    }
}

/// Growable table of page mappings owned by one address space.
///
/// ### Invariants
/// - At most one entry per virtual page.
/// - Storage grows by doubling; growth failure is reported as
///   [`VmError::OutOfMemory`] rather than aborting.
#[derive(Debug, Default)]
pub struct PageTable {
    entries: Vec<PageTableEntry>,
}

impl PageTable {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, page: VirtualPage) -> Option<&PageTableEntry> {
        self.entries.iter().find(|e| e.page == page)
    }

    pub fn get_mut(&mut self, page: VirtualPage) -> Option<&mut PageTableEntry> {
        self.entries.iter_mut().find(|e| e.page == page)
    }

    /// Number of mappings the table holds without growing.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    /// Make room for `additional` more mappings up front.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`] if the storage cannot be grown.
    pub fn reserve(&mut self, additional: usize) -> Result<(), VmError> {
        self.entries
            .try_reserve(additional)
            .map_err(|_| VmError::OutOfMemory)
    }

    /// Append a mapping.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`] if the table cannot grow.
    ///
    /// # Panics
    /// If `entry.page()` is already mapped.
    pub fn insert(&mut self, entry: PageTableEntry) -> Result<(), VmError> {
        assert!(
            self.get(entry.page).is_none(),
            "page {} mapped twice",
            entry.page
        );
        reserve_for_push(&mut self.entries).map_err(|_| VmError::OutOfMemory)?;
        self.entries.push(entry);
        Ok(())
    }

    /// Remove the mapping for `page`, if any. Entry order is not preserved.
    pub fn remove(&mut self, page: VirtualPage) -> Option<PageTableEntry> {
        let idx = self.entries.iter().position(|e| e.page == page)?;
        Some(self.entries.swap_remove(idx))
    }

    /// Remove the most recently inserted mapping.
    pub fn pop(&mut self) -> Option<PageTableEntry> {
        self.entries.pop()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageTableEntry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PageTableEntry> {
        self.entries.iter_mut()
    }

    /// Remove every mapping, yielding them.
    pub fn drain(&mut self) -> impl Iterator<Item = PageTableEntry> + '_ {
        self.entries.drain(..)
    }

    /// Release storage; the table must already be empty.
    pub(crate) fn release(&mut self) {
        debug_assert!(self.entries.is_empty());
        self.entries = Vec::new();
    }
}
