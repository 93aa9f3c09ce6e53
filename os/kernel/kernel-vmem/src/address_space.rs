//! # User Address Space
//!
//! One [`AddressSpace`] per process: its declared regions, the heap and stack
//! extents, and the page table of frames it owns.
//!
//! ## Lifecycle
//!
//! ```text
//!  create ──► define_region* ──► prepare_load ──► (loader writes) ──► complete_load
//!   Empty          Empty             Loading                             Ready
//!                                        │
//!                        faults, sbrk, copy at any point after this
//!                                        │
//!                                     destroy
//! ```
//!
//! - [`prepare_load`](AddressSpace::prepare_load) eagerly backs every region
//!   page plus one heap and one stack anchor page, and makes every region
//!   writable so the loader can fill text and data.
//! - [`complete_load`](AddressSpace::complete_load) restores the declared
//!   permissions.
//! - Everything else is demand-paged by the fault handler.
//!
//! ## Layout
//!
//! ```text
//!  0 ┌──────────────┐
//!    │ regions      │
//!    ├──────────────┤ heap start = first page above the highest region
//!    │ heap ↑       │ heap end starts at heap start, moves with sbrk
//!    │     ...      │
//!    │ stack ↓      │ USER_STACK_PAGES pages
//!    └──────────────┘ USER_STACK_TOP
//! ```
//!
//! ## Ownership
//!
//! Every frame in the page table is owned by exactly this address space.
//! [`destroy`](AddressSpace::destroy) hands them back to the allocator;
//! dropping a non-empty address space without it leaks them and logs a
//! warning.

use crate::info::{USER_STACK_BOTTOM, USER_STACK_TOP};
use crate::{
    FrameAlloc, PageEntryBits, PageTable, PageTableEntry, Permissions, PhysMapper, Region,
    copy_frame, reserve_for_push, zero_frame,
};
use alloc::vec::Vec;
use core::ops::Range;
use kernel_memory_addresses::{
    PAGE_SIZE, PhysicalAddress, PhysicalPage, VirtualAddress, VirtualPage, checked_align_up,
};
use log::{debug, trace, warn};

/// Where an address space is in its load lifecycle.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum LoadState {
    /// Regions may be declared; nothing is backed yet.
    #[default]
    Empty,
    /// Regions are backed and temporarily writable.
    Loading,
    /// Declared permissions are in force.
    Ready,
}

/// The part of an address space a page belongs to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Segment {
    /// Index into [`AddressSpace::regions`].
    Region(usize),
    Heap,
    Stack,
}

/// Per-process virtual memory.
#[derive(Debug, Default)]
pub struct AddressSpace {
    regions: Vec<Region>,
    page_table: PageTable,
    heap_start: VirtualAddress,
    /// Current break. Not page aligned.
    heap_end: VirtualAddress,
    stack_bottom: VirtualAddress,
    stack_top: VirtualAddress,
    state: LoadState,
}

impl AddressSpace {
    /// An empty address space: no regions, no mappings, zero-sized heap and stack.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            regions: Vec::new(),
            page_table: PageTable::new(),
            heap_start: VirtualAddress::new(0),
            heap_end: VirtualAddress::new(0),
            stack_bottom: VirtualAddress::new(0),
            stack_top: VirtualAddress::new(0),
            state: LoadState::Empty,
        }
    }

    #[inline]
    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    #[inline]
    #[must_use]
    pub const fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    #[inline]
    #[must_use]
    pub const fn load_state(&self) -> LoadState {
        self.state
    }

    /// Heap extent: from the heap start up to the current break.
    #[inline]
    #[must_use]
    pub const fn heap(&self) -> Range<VirtualAddress> {
        self.heap_start..self.heap_end
    }

    /// Stack extent; empty until [`prepare_load`](Self::prepare_load).
    #[inline]
    #[must_use]
    pub const fn stack(&self) -> Range<VirtualAddress> {
        self.stack_bottom..self.stack_top
    }

    /// Number of frames currently owned.
    #[inline]
    #[must_use]
    pub fn frames_in_use(&self) -> usize {
        self.page_table.len()
    }

    /// Declare a region covering `[vaddr, vaddr + size)`, page-aligned outward.
    ///
    /// # Errors
    /// - [`VmError::InvalidRange`]: empty, wrapping, or reaching into the
    ///   stack window, the page just below it, or kernel space.
    /// - [`VmError::RegionOverlap`]: shares a page with an existing region or
    ///   the established heap.
    /// - [`VmError::OutOfMemory`]: the region list cannot grow.
    pub fn define_region(
        &mut self,
        vaddr: VirtualAddress,
        size: u64,
        perms: Permissions,
    ) -> Result<(), VmError> {
        let mut region = Region::new(vaddr, size, perms)?;
        // the page below the stack window is left for the heap anchor
        if region.end().as_u64() > USER_STACK_BOTTOM - PAGE_SIZE {
            return Err(VmError::InvalidRange);
        }
        if self
            .regions
            .iter()
            .any(|r| r.overlaps(region.base().base(), region.end()))
        {
            return Err(VmError::RegionOverlap);
        }
        if self.state != LoadState::Empty {
            let heap = self.heap_reserved();
            if region.overlaps(heap.start, heap.end) {
                return Err(VmError::RegionOverlap);
            }
        }

        if self.state == LoadState::Loading {
            region.set_current(Permissions::READ_WRITE);
        }

        reserve_for_push(&mut self.regions).map_err(|_| VmError::OutOfMemory)?;
        debug!("define_region: {region:?}");
        self.regions.push(region);
        Ok(())
    }

    /// Top of the user stack. Nothing is allocated here; the top page is
    /// backed by [`prepare_load`](Self::prepare_load).
    #[inline]
    #[must_use]
    pub const fn define_stack(&self) -> VirtualAddress {
        VirtualAddress::new(USER_STACK_TOP)
    }

    /// Back every declared page with a zeroed frame, anchor the heap and
    /// the stack, and make every region writable for the loader.
    ///
    /// On failure every frame allocated by this call is released and the
    /// address space is left as it was.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`] if frames or page-table storage run out.
    ///
    /// # Panics
    /// If called twice.
    pub fn prepare_load<A: FrameAlloc + ?Sized, M: PhysMapper + ?Sized>(
        &mut self,
        alloc: &A,
        mapper: &M,
    ) -> Result<(), VmError> {
        let heap_anchor = self.heap_anchor();
        let stack_anchor = VirtualAddress::new(USER_STACK_TOP - PAGE_SIZE).page();
        self.provision(alloc, mapper, heap_anchor, stack_anchor)?;

        self.heap_start = heap_anchor.base();
        self.heap_end = heap_anchor.base();
        Ok(())
    }

    fn provision<A: FrameAlloc + ?Sized, M: PhysMapper + ?Sized>(
        &mut self,
        alloc: &A,
        mapper: &M,
        heap_anchor: VirtualPage,
        stack_anchor: VirtualPage,
    ) -> Result<(), VmError> {
        assert_eq!(self.state, LoadState::Empty, "prepare_load called twice");

        let needed: u64 = self.regions.iter().map(Region::pages).sum::<u64>() + 2;
        debug!(
            "prepare_load: {} regions, {needed} frames, heap anchor {heap_anchor}, stack anchor {stack_anchor}",
            self.regions.len()
        );
        // size the table once so that no frame is taken before it can fail
        let needed = usize::try_from(needed).map_err(|_| VmError::OutOfMemory)?;
        self.page_table.reserve(needed)?;

        let mark = self.page_table.len();
        if let Err(e) = self.back_all(alloc, mapper, heap_anchor, stack_anchor) {
            warn!("prepare_load failed: {e}; releasing {} frames", self.page_table.len() - mark);
            self.unwind_to(mark, alloc);
            return Err(e);
        }

        for region in &mut self.regions {
            region.set_current(Permissions::READ_WRITE);
        }
        self.stack_bottom = VirtualAddress::new(USER_STACK_BOTTOM);
        self.stack_top = VirtualAddress::new(USER_STACK_TOP);
        self.state = LoadState::Loading;
        Ok(())
    }

    fn back_all<A: FrameAlloc + ?Sized, M: PhysMapper + ?Sized>(
        &mut self,
        alloc: &A,
        mapper: &M,
        heap_anchor: VirtualPage,
        stack_anchor: VirtualPage,
    ) -> Result<(), VmError> {
        for i in 0..self.regions.len() {
            let region = self.regions[i];
            for page in region.iter_pages() {
                self.back_page(page, Permissions::READ_WRITE, alloc, mapper)?;
            }
        }
        self.back_page(heap_anchor, Permissions::READ_WRITE, alloc, mapper)?;
        self.back_page(stack_anchor, Permissions::READ_WRITE, alloc, mapper)
    }

    /// Map `page` to a fresh frame unless it is already mapped.
    fn back_page<A: FrameAlloc + ?Sized, M: PhysMapper + ?Sized>(
        &mut self,
        page: VirtualPage,
        perms: Permissions,
        alloc: &A,
        mapper: &M,
    ) -> Result<(), VmError> {
        if self.page_table.get(page).is_none() {
            self.map_new_page(page, perms, alloc, mapper)?;
        }
        Ok(())
    }

    /// Free the frames of every mapping inserted after `mark`.
    fn unwind_to<A: FrameAlloc + ?Sized>(&mut self, mark: usize, alloc: &A) {
        while self.page_table.len() > mark {
            if let Some(entry) = self.page_table.pop() {
                alloc.free_frames(entry.frame());
            }
        }
    }

    /// Restore every region's declared permissions after loading.
    ///
    /// # Panics
    /// If [`prepare_load`](Self::prepare_load) has not run.
    pub fn complete_load(&mut self) {
        assert_eq!(
            self.state,
            LoadState::Loading,
            "complete_load without prepare_load"
        );
        for region in &mut self.regions {
            region.set_current(region.declared_permissions());
        }
        for entry in self.page_table.iter_mut() {
            if let Some(r) = self.regions.iter().find(|r| r.contains(entry.page())) {
                entry.bits_mut().set_permissions(r.permissions());
            }
        }
        self.state = LoadState::Ready;
        debug!("complete_load: {} regions", self.regions.len());
    }

    /// Deep copy into a new address space with fresh frames.
    ///
    /// Regions, heap and stack bounds, load state and the contents of every
    /// mapped page are duplicated. No frame is shared with `self`. On failure
    /// every frame allocated for the copy is released.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`] if frames or bookkeeping storage run out.
    pub fn copy<A: FrameAlloc + ?Sized, M: PhysMapper + ?Sized>(
        &self,
        alloc: &A,
        mapper: &M,
    ) -> Result<Self, VmError> {
        let mut dst = Self::new();
        dst.regions
            .try_reserve_exact(self.regions.len())
            .map_err(|_| VmError::OutOfMemory)?;
        dst.regions.extend(self.regions.iter().map(|r| {
            let mut r = *r;
            r.set_current(r.declared_permissions());
            r
        }));

        if self.state == LoadState::Empty {
            debug!("copy: {} regions, nothing backed yet", dst.regions.len());
            return Ok(dst);
        }

        if let Err(e) = dst.copy_pages_from(self, alloc, mapper) {
            warn!("copy failed: {e}; unwinding");
            dst.destroy(alloc);
            return Err(e);
        }

        debug!(
            "copy: {} regions, {} pages duplicated",
            dst.regions.len(),
            dst.page_table.len()
        );
        Ok(dst)
    }

    fn copy_pages_from<A: FrameAlloc + ?Sized, M: PhysMapper + ?Sized>(
        &mut self,
        src: &Self,
        alloc: &A,
        mapper: &M,
    ) -> Result<(), VmError> {
        let heap_anchor = src.heap_start.page();
        let stack_anchor = VirtualAddress::new(USER_STACK_TOP - PAGE_SIZE).page();
        self.provision(alloc, mapper, heap_anchor, stack_anchor)?;
        self.heap_start = src.heap_start;
        self.heap_end = src.heap_end;

        for src_entry in src.page_table.iter() {
            let frame = match self.page_table.get(src_entry.page()) {
                Some(e) => e.frame(),
                None => self.map_new_page(src_entry.page(), Permissions::READ_WRITE, alloc, mapper)?,
            };
            // SAFETY: `frame` was just allocated for this address space and
            // `src` is borrowed shared for the duration of the copy.
            unsafe { copy_frame(mapper, src_entry.frame(), frame) };
            if let Some(e) = self.page_table.get_mut(src_entry.page()) {
                *e.bits_mut() = src_entry.bits();
            }
        }

        // Anchors that `src` has since released (sbrk shrink) must not linger.
        let stale: Vec<VirtualPage> = self
            .page_table
            .iter()
            .map(PageTableEntry::page)
            .filter(|p| src.page_table.get(*p).is_none())
            .collect();
        for page in stale {
            if let Some(e) = self.page_table.remove(page) {
                alloc.free_frames(e.frame());
            }
        }

        if src.state == LoadState::Ready {
            self.complete_load();
        }
        Ok(())
    }

    /// Return every owned frame to `alloc` and release all bookkeeping.
    pub fn destroy<A: FrameAlloc + ?Sized>(mut self, alloc: &A) {
        let mut freed = 0usize;
        for entry in self.page_table.drain() {
            alloc.free_frames(entry.frame());
            freed += 1;
        }
        self.page_table.release();
        self.regions = Vec::new();
        debug!("destroy: freed {freed} frames");
    }

    /// Move the heap break by `delta` bytes and return the previous break.
    ///
    /// Shrinking frees the frames of pages lying wholly above the new break.
    /// Growing allocates nothing; new heap pages are demand-paged.
    ///
    /// # Errors
    /// - [`VmError::InvalidRange`]: the heap is not established yet, or the
    ///   break would drop below the heap start or reach the stack window.
    /// - [`VmError::RegionOverlap`]: the grown heap would run into a region.
    pub fn sbrk<A: FrameAlloc + ?Sized>(
        &mut self,
        delta: i64,
        alloc: &A,
    ) -> Result<VirtualAddress, VmError> {
        if self.state == LoadState::Empty {
            return Err(VmError::InvalidRange);
        }
        let old_end = self.heap_end;
        let new_end = old_end
            .as_u64()
            .checked_add_signed(delta)
            .map(VirtualAddress::new)
            .ok_or(VmError::InvalidRange)?;
        if new_end < self.heap_start {
            return Err(VmError::InvalidRange);
        }
        let new_top = checked_align_up(new_end.as_u64()).ok_or(VmError::InvalidRange)?;
        if new_top > USER_STACK_BOTTOM {
            return Err(VmError::InvalidRange);
        }
        let new_top = VirtualAddress::new(new_top);
        if delta > 0
            && self
                .regions
                .iter()
                .any(|r| r.overlaps(self.heap_start, new_top))
        {
            return Err(VmError::RegionOverlap);
        }

        self.heap_end = new_end;
        if new_end < old_end {
            let old_top = Self::page_ceil(old_end);
            // the anchor page stays backed even when the heap is emptied
            let keep = self.heap_start + PAGE_SIZE;
            let mut page = new_top.max(keep).page();
            while page.base() < old_top {
                if let Some(e) = self.page_table.remove(page) {
                    trace!("sbrk: releasing {page} ({})", e.frame());
                    alloc.free_frames(e.frame());
                }
                let Some(next) = page.checked_next() else {
                    break;
                };
                page = next;
            }
        }
        trace!("sbrk({delta}): {old_end} -> {new_end}");
        Ok(old_end)
    }

    /// Physical address backing `va`, if its page is mapped.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.page_table
            .get(va.page())
            .map(|e| e.frame().base() + va.page_offset())
    }

    /// Which part of the address space `page` belongs to, if any.
    #[must_use]
    pub fn classify(&self, page: VirtualPage) -> Option<Segment> {
        if let Some(i) = self.regions.iter().position(|r| r.contains(page)) {
            return Some(Segment::Region(i));
        }
        let heap = self.heap_pages();
        if heap.start <= page.base() && page.base() < heap.end {
            return Some(Segment::Heap);
        }
        if self.stack_bottom <= page.base() && page.base() < self.stack_top {
            return Some(Segment::Stack);
        }
        None
    }

    /// Permissions a newly faulted page in `segment` receives.
    #[must_use]
    pub fn permissions_for(&self, segment: Segment) -> Permissions {
        match segment {
            Segment::Region(i) => self
                .regions
                .get(i)
                .map_or(Permissions::NONE, Region::permissions),
            Segment::Heap | Segment::Stack => Permissions::READ_WRITE,
        }
    }

    /// Page-table entry for `page`, if mapped.
    #[must_use]
    pub fn entry(&self, page: VirtualPage) -> Option<&PageTableEntry> {
        self.page_table.get(page)
    }

    pub fn entry_mut(&mut self, page: VirtualPage) -> Option<&mut PageTableEntry> {
        self.page_table.get_mut(page)
    }

    /// Back `page` with a freshly allocated, zero-filled frame.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`] if no frame is available or the page table
    /// cannot grow; in the latter case the frame is returned to `alloc`.
    ///
    /// # Panics
    /// If `page` is already mapped.
    pub fn map_new_page<A: FrameAlloc + ?Sized, M: PhysMapper + ?Sized>(
        &mut self,
        page: VirtualPage,
        perms: Permissions,
        alloc: &A,
        mapper: &M,
    ) -> Result<PhysicalPage, VmError> {
        let frame = alloc.alloc_frame().ok_or(VmError::OutOfMemory)?;
        // SAFETY: the frame was just handed to us by the allocator.
        unsafe { zero_frame(mapper, frame) };
        let entry = PageTableEntry::new(page, frame, PageEntryBits::mapped(perms));
        if let Err(e) = self.page_table.insert(entry) {
            alloc.free_frames(frame);
            return Err(e);
        }
        trace!("map {page} -> {frame} {perms:?}");
        Ok(frame)
    }

    /// First page above the highest region, or one page above zero.
    fn heap_anchor(&self) -> VirtualPage {
        let top = self
            .regions
            .iter()
            .map(|r| r.end().as_u64())
            .max()
            .unwrap_or(PAGE_SIZE);
        VirtualAddress::new(top).page()
    }

    /// Heap extent rounded out to whole pages.
    fn heap_pages(&self) -> Range<VirtualAddress> {
        self.heap_start..Self::page_ceil(self.heap_end)
    }

    /// Heap pages, plus the anchor page while the heap is still empty.
    fn heap_reserved(&self) -> Range<VirtualAddress> {
        let pages = self.heap_pages();
        pages.start..pages.end.max(pages.start + PAGE_SIZE)
    }

    fn page_ceil(va: VirtualAddress) -> VirtualAddress {
        VirtualAddress::new(checked_align_up(va.as_u64()).unwrap_or(USER_STACK_BOTTOM))
    }
}

impl Drop for AddressSpace {
    fn drop(&mut self) {
        if !self.page_table.is_empty() {
            warn!(
                "address space dropped without destroy; leaking {} frames",
                self.page_table.len()
            );
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VmError {
    #[error("out of memory")]
    OutOfMemory,
    #[error("invalid address range")]
    InvalidRange,
    #[error("region overlaps an existing mapping")]
    RegionOverlap,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestFrames, TestPhys};

    const TEXT: u64 = 0x40_0000;
    const DATA: u64 = 0x50_0000;

    fn va(a: u64) -> VirtualAddress {
        VirtualAddress::new(a)
    }

    fn loaded(frames: &TestFrames, phys: &TestPhys) -> AddressSpace {
        let mut aspace = AddressSpace::new();
        aspace
            .define_region(va(TEXT), 0x2000, Permissions::READ_EXECUTE)
            .unwrap();
        aspace
            .define_region(va(DATA), 0x1800, Permissions::READ_WRITE)
            .unwrap();
        aspace.prepare_load(frames, phys).unwrap();
        aspace
    }

    #[test]
    fn new_is_empty() {
        let aspace = AddressSpace::new();
        assert!(aspace.regions().is_empty());
        assert!(aspace.page_table().is_empty());
        assert!(aspace.heap().is_empty());
        assert!(aspace.stack().is_empty());
        assert_eq!(aspace.load_state(), LoadState::Empty);
    }

    #[test]
    fn define_region_validates() {
        let mut aspace = AddressSpace::new();
        aspace
            .define_region(va(TEXT), 0x1000, Permissions::READ_EXECUTE)
            .unwrap();
        assert_eq!(
            aspace.define_region(va(TEXT + 0x800), 0x1000, Permissions::READ_WRITE),
            Err(VmError::RegionOverlap)
        );
        assert_eq!(
            aspace.define_region(va(TEXT), 0, Permissions::READ_WRITE),
            Err(VmError::InvalidRange)
        );
        assert_eq!(
            aspace.define_region(va(USER_STACK_BOTTOM - 0x1000), 0x2000, Permissions::READ_WRITE),
            Err(VmError::InvalidRange)
        );
        assert_eq!(
            aspace.define_region(va(USER_STACK_TOP), 0x1000, Permissions::READ_WRITE),
            Err(VmError::InvalidRange)
        );
        // adjacent is fine
        aspace
            .define_region(va(TEXT + 0x1000), 0x1000, Permissions::READ_WRITE)
            .unwrap();
        assert_eq!(aspace.regions().len(), 2);
    }

    #[test]
    fn region_list_grows_past_initial_capacity() {
        let mut aspace = AddressSpace::new();
        for i in 0..32 {
            aspace
                .define_region(va(TEXT + i * 0x1000), 0x1000, Permissions::READ_ONLY)
                .unwrap();
        }
        assert_eq!(aspace.regions().len(), 32);
    }

    #[test]
    fn prepare_load_backs_regions_and_anchors() {
        let frames = TestFrames::new(64);
        let phys = TestPhys::new(64);
        let aspace = loaded(&frames, &phys);

        // 2 text + 2 data + heap anchor + stack anchor
        assert_eq!(aspace.frames_in_use(), 6);
        assert_eq!(frames.live(), 6);
        assert_eq!(aspace.load_state(), LoadState::Loading);
        assert!(aspace.regions().iter().all(|r| r.permissions() == Permissions::READ_WRITE));

        assert_eq!(aspace.heap(), va(DATA + 0x2000)..va(DATA + 0x2000));
        assert_eq!(aspace.stack(), va(USER_STACK_BOTTOM)..va(USER_STACK_TOP));
        assert!(aspace.translate(va(USER_STACK_TOP - 1)).is_some());
        assert!(aspace.translate(va(DATA + 0x2000)).is_some());

        aspace.destroy(&frames);
        assert_eq!(frames.live(), 0);
    }

    #[test]
    fn prepare_load_sizes_the_table_up_front() {
        let frames = TestFrames::new(64);
        let phys = TestPhys::new(64);
        let mut aspace = AddressSpace::new();
        aspace
            .define_region(va(TEXT), 0x9000, Permissions::READ_EXECUTE)
            .unwrap();
        aspace.prepare_load(&frames, &phys).unwrap();
        assert_eq!(aspace.frames_in_use(), 11);
        assert!(aspace.page_table().capacity() >= 11);
        aspace.destroy(&frames);
    }

    #[test]
    fn heap_anchor_keeps_clear_of_the_stack_window() {
        let frames = TestFrames::new(8);
        let phys = TestPhys::new(8);
        let mut aspace = AddressSpace::new();
        assert_eq!(
            aspace.define_region(va(USER_STACK_BOTTOM - PAGE_SIZE), PAGE_SIZE, Permissions::READ_WRITE),
            Err(VmError::InvalidRange)
        );
        aspace
            .define_region(va(USER_STACK_BOTTOM - 2 * PAGE_SIZE), PAGE_SIZE, Permissions::READ_WRITE)
            .unwrap();
        aspace.prepare_load(&frames, &phys).unwrap();

        let start = va(USER_STACK_BOTTOM - PAGE_SIZE);
        assert_eq!(aspace.heap(), start..start);
        assert!(aspace.heap().start < aspace.stack().start);
        assert_eq!(aspace.frames_in_use(), 3);

        // exactly one page of heap fits below the stack
        assert_eq!(aspace.sbrk(i64::try_from(PAGE_SIZE).unwrap(), &frames), Ok(start));
        assert_eq!(aspace.sbrk(1, &frames), Err(VmError::InvalidRange));
        aspace.destroy(&frames);
        assert_eq!(frames.live(), 0);
    }

    #[test]
    fn heap_anchor_without_regions() {
        let frames = TestFrames::new(8);
        let phys = TestPhys::new(8);
        let mut aspace = AddressSpace::new();
        aspace.prepare_load(&frames, &phys).unwrap();
        assert_eq!(aspace.heap().start, va(PAGE_SIZE));
        assert_eq!(aspace.frames_in_use(), 2);
        aspace.destroy(&frames);
    }

    #[test]
    fn prepare_load_rolls_back_on_exhaustion() {
        let frames = TestFrames::new(3);
        let phys = TestPhys::new(3);
        let mut aspace = AddressSpace::new();
        aspace
            .define_region(va(TEXT), 0x4000, Permissions::READ_ONLY)
            .unwrap();
        assert_eq!(aspace.prepare_load(&frames, &phys), Err(VmError::OutOfMemory));
        assert_eq!(frames.live(), 0);
        assert!(aspace.page_table().is_empty());
        assert_eq!(aspace.load_state(), LoadState::Empty);
        assert_eq!(aspace.regions()[0].permissions(), Permissions::READ_ONLY);
    }

    #[test]
    fn new_frames_are_zeroed() {
        let frames = TestFrames::new(16);
        let phys = TestPhys::new(16);
        phys.fill(0xAA);
        let aspace = loaded(&frames, &phys);
        for e in aspace.page_table().iter() {
            assert!(phys.frame_bytes(e.frame()).iter().all(|b| *b == 0));
        }
        aspace.destroy(&frames);
    }

    #[test]
    fn complete_load_restores_declared_permissions() {
        let frames = TestFrames::new(16);
        let phys = TestPhys::new(16);
        let mut aspace = loaded(&frames, &phys);
        aspace.complete_load();
        assert_eq!(aspace.load_state(), LoadState::Ready);
        assert_eq!(aspace.regions()[0].permissions(), Permissions::READ_EXECUTE);
        let text = aspace.entry(va(TEXT).page()).unwrap();
        assert_eq!(text.bits().permissions(), Permissions::READ_EXECUTE);
        aspace.destroy(&frames);
    }

    #[test]
    #[should_panic(expected = "complete_load without prepare_load")]
    fn complete_load_requires_prepare() {
        AddressSpace::new().complete_load();
    }

    #[test]
    fn classify_regions_heap_stack() {
        let frames = TestFrames::new(16);
        let phys = TestPhys::new(16);
        let aspace = loaded(&frames, &phys);
        let page = |a: u64| va(a).page();

        assert_eq!(aspace.classify(page(TEXT)), Some(Segment::Region(0)));
        assert_eq!(aspace.classify(page(DATA + 0x1FFF)), Some(Segment::Region(1)));
        assert_eq!(aspace.classify(page(TEXT - 1)), None);
        // the heap anchor is backed, but the break has not moved yet
        assert_eq!(aspace.classify(page(DATA + 0x2000)), None);
        assert_eq!(aspace.classify(page(USER_STACK_TOP - 1)), Some(Segment::Stack));
        assert_eq!(aspace.classify(page(USER_STACK_BOTTOM)), Some(Segment::Stack));
        assert_eq!(aspace.classify(page(USER_STACK_BOTTOM - 1)), None);
        assert_eq!(aspace.classify(page(USER_STACK_TOP)), None);
        aspace.destroy(&frames);
    }

    #[test]
    fn sbrk_moves_break_and_frees_on_shrink() {
        let frames = TestFrames::new(32);
        let phys = TestPhys::new(32);
        let mut aspace = loaded(&frames, &phys);
        let start = aspace.heap().start;

        let old = aspace.sbrk(0x2100, &frames).unwrap();
        assert_eq!(old, start);
        assert_eq!(aspace.heap().end, start + 0x2100);
        assert_eq!(aspace.classify(start.page()), Some(Segment::Heap));
        assert_eq!(aspace.classify((start + 0x2000).page()), Some(Segment::Heap));
        assert_eq!(aspace.classify((start + 0x3000).page()), None);

        // fault-in two heap pages by hand
        for off in [0x1000, 0x2000] {
            let page = (start + off).page();
            aspace
                .map_new_page(page, Permissions::READ_WRITE, &frames, &phys)
                .unwrap();
        }
        let before = frames.live();

        // shrink to one byte into the anchor page: everything above it goes
        aspace.sbrk(-0x20FF, &frames).unwrap();
        assert_eq!(aspace.heap().end, start + 1);
        assert!(aspace.entry(start.page()).is_some());
        assert!(aspace.entry((start + 0x1000).page()).is_none());
        assert!(aspace.entry((start + 0x2000).page()).is_none());
        assert_eq!(frames.live(), before - 2);

        aspace.sbrk(-1, &frames).unwrap();
        assert_eq!(aspace.heap(), start..start);
        assert!(aspace.entry(start.page()).is_some());
        assert_eq!(frames.live(), before - 2);

        assert_eq!(aspace.sbrk(-0x10_0000, &frames), Err(VmError::InvalidRange));
        assert_eq!(
            aspace.sbrk(i64::try_from(USER_STACK_BOTTOM).unwrap(), &frames),
            Err(VmError::InvalidRange)
        );
        aspace.destroy(&frames);
        assert_eq!(frames.live(), 0);
    }

    #[test]
    fn regions_cannot_claim_the_heap_anchor() {
        let frames = TestFrames::new(16);
        let phys = TestPhys::new(16);
        let mut aspace = loaded(&frames, &phys);
        let anchor = aspace.heap().start;
        assert_eq!(
            aspace.define_region(anchor, 0x1000, Permissions::READ_WRITE),
            Err(VmError::RegionOverlap)
        );
        aspace
            .define_region(anchor + PAGE_SIZE, 0x1000, Permissions::READ_WRITE)
            .unwrap();
        assert_eq!(aspace.sbrk(0x1001, &frames), Err(VmError::RegionOverlap));
        aspace.destroy(&frames);
    }

    #[test]
    fn sbrk_before_load_is_rejected() {
        let frames = TestFrames::new(1);
        let mut aspace = AddressSpace::new();
        assert_eq!(aspace.sbrk(0, &frames), Err(VmError::InvalidRange));
    }

    #[test]
    fn copy_duplicates_contents_into_fresh_frames() {
        let frames = TestFrames::new(64);
        let phys = TestPhys::new(64);
        let mut src = loaded(&frames, &phys);
        src.complete_load();

        let text = src.entry(va(TEXT).page()).unwrap().frame();
        phys.write(text.at(7), 0x5A);

        let dst = src.copy(&frames, &phys).unwrap();
        assert_eq!(dst.load_state(), LoadState::Ready);
        assert_eq!(dst.frames_in_use(), src.frames_in_use());
        assert_eq!(dst.heap(), src.heap());
        assert_eq!(dst.stack(), src.stack());
        assert_eq!(dst.regions(), src.regions());

        let copied = dst.entry(va(TEXT).page()).unwrap().frame();
        assert_ne!(copied, text);
        assert_eq!(phys.read(copied.at(7)), 0x5A);

        phys.write(copied.at(7), 0x11);
        assert_eq!(phys.read(text.at(7)), 0x5A);

        for e in dst.page_table().iter() {
            assert!(src.page_table().iter().all(|s| s.frame() != e.frame()));
        }

        src.destroy(&frames);
        dst.destroy(&frames);
        assert_eq!(frames.live(), 0);
    }

    #[test]
    fn copy_includes_faulted_pages() {
        let frames = TestFrames::new(64);
        let phys = TestPhys::new(64);
        let mut src = loaded(&frames, &phys);
        let deep_stack = va(USER_STACK_TOP - 3 * PAGE_SIZE).page();
        let f = src
            .map_new_page(deep_stack, Permissions::READ_WRITE, &frames, &phys)
            .unwrap();
        phys.write(f.at(0), 9);

        let dst = src.copy(&frames, &phys).unwrap();
        assert_eq!(dst.load_state(), LoadState::Loading);
        let g = dst.entry(deep_stack).unwrap().frame();
        assert_eq!(phys.read(g.at(0)), 9);

        src.destroy(&frames);
        dst.destroy(&frames);
    }

    #[test]
    fn copy_failure_leaks_nothing() {
        let frames = TestFrames::new(10);
        let phys = TestPhys::new(10);
        let src = loaded(&frames, &phys);
        let before = frames.live();
        assert_eq!(src.copy(&frames, &phys).err(), Some(VmError::OutOfMemory));
        assert_eq!(frames.live(), before);
        src.destroy(&frames);
    }
}
