//! # Virtual Memory Support
//!
//! Per-process address spaces for a software-managed TLB architecture.
//!
//! ## What you get
//! - An [`AddressSpace`] holding declared [`Region`]s, heap and stack extents
//!   and a growable [`PageTable`] of virtual page → physical frame mappings.
//! - [`PageEntryBits`] and [`Permissions`] for per-page state.
//! - A translation-cache model ([`tlb`]) with a [`TranslationCache`] seam and a
//!   software implementation ([`SoftTlb`]) for hosted tests.
//! - A tiny allocator/mapper interface ([`FrameAlloc`], [`PhysMapper`]).
//!
//! ## Translation model
//!
//! There is no hardware page-table walker. The processor only knows the
//! translations currently loaded into its TLB; any miss traps into the kernel:
//!
//! ```text
//!   load/store ──► TLB hit? ──yes──► physical access
//!                     │
//!                     no
//!                     ▼
//!               fault handler ──► AddressSpace::classify
//!                     │                 │
//!                     │          region / heap / stack?
//!                     │                 │ no ──► access violation
//!                     ▼                 ▼ yes
//!              PageTable lookup ── miss ──► FrameAlloc + zero + insert
//!                     │
//!                     ▼
//!               tlb::install ──► retry the access
//! ```
//!
//! The page table is therefore pure software bookkeeping: an entry's absence
//! means "not yet touched", not "invalid". Validity is decided by region, heap
//! and stack membership alone.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

pub mod address_space;
mod page_entry_bits;
mod page_table;
mod region;
pub mod tlb;

#[cfg(test)]
mod test_support;

pub use crate::address_space::{AddressSpace, LoadState, Segment, VmError};
pub use crate::page_entry_bits::{PageEntryBits, Permissions};
pub use crate::page_table::{PageTable, PageTableEntry};
pub use crate::region::Region;
pub use crate::tlb::{SoftTlb, TlbEntry, TranslationCache};

/// Re-export constants as info module.
pub use kernel_info::memory as info;

use alloc::collections::TryReserveError;
use alloc::vec::Vec;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalPage};

/// [`PAGE_SIZE`] as a byte count for slice and pointer APIs.
#[allow(clippy::cast_possible_truncation)]
pub const FRAME_BYTES: usize = PAGE_SIZE as usize;

/// Source of **physical** 4 KiB frames.
///
/// The implementation decides where frames come from (boot stealing, coremap,
/// a test pool). Returned frames are always frame-aligned; runs of more than
/// one frame are physically contiguous.
///
/// Methods take `&self`: the kernel allocator is shared between CPUs and
/// serializes internally.
pub trait FrameAlloc {
    /// Allocate `count` contiguous frames and return the first one.
    ///
    /// Returns `None` on out-of-memory.
    fn alloc_frames(&self, count: usize) -> Option<PhysicalPage>;

    /// Return a run previously handed out by [`alloc_frames`](Self::alloc_frames).
    ///
    /// `first` must be the first frame of the run; implementations treat
    /// anything else as a fatal caller bug.
    fn free_frames(&self, first: PhysicalPage);

    /// Allocate a single frame.
    #[inline]
    fn alloc_frame(&self) -> Option<PhysicalPage> {
        self.alloc_frames(1)
    }
}

/// Converts physical frames to pointers usable by the kernel.
///
/// Typical patterns:
/// - **Kernel**: a direct-mapped window at a fixed offset.
/// - **Tests**: a heap allocation standing in for RAM.
///
/// # Safety
/// Implementors guarantee that for every frame the allocator can hand out,
/// [`frame_ptr`](Self::frame_ptr) returns a pointer valid for reads and writes
/// of [`PAGE_SIZE`] bytes for as long as the mapper lives.
pub unsafe trait PhysMapper {
    /// Kernel-usable pointer to the first byte of `frame`.
    fn frame_ptr(&self, frame: PhysicalPage) -> *mut u8;
}

/// Fill `frame` with zeros.
///
/// # Safety
/// The caller must own `frame` (nobody else reads or writes it concurrently).
#[inline]
pub unsafe fn zero_frame<M: PhysMapper + ?Sized>(mapper: &M, frame: PhysicalPage) {
    let dst = mapper.frame_ptr(frame);
    unsafe { core::ptr::write_bytes(dst, 0, FRAME_BYTES) }
}

/// Copy the full contents of frame `src` into frame `dst`.
///
/// # Safety
/// The caller must own `dst`, `src` must not be written concurrently, and the
/// two frames must differ.
#[inline]
pub unsafe fn copy_frame<M: PhysMapper + ?Sized>(mapper: &M, src: PhysicalPage, dst: PhysicalPage) {
    debug_assert_ne!(src, dst, "copy_frame onto itself");
    let s = mapper.frame_ptr(src);
    let d = mapper.frame_ptr(dst);
    unsafe { core::ptr::copy_nonoverlapping(s, d, FRAME_BYTES) }
}

/// Make room for one more element, doubling the capacity when full.
///
/// Growth failure is reported instead of aborting, so callers can surface it
/// as out-of-memory.
pub(crate) fn reserve_for_push<T>(v: &mut Vec<T>) -> Result<(), TryReserveError> {
    if v.len() < v.capacity() {
        return Ok(());
    }
    let additional = v.capacity().max(4);
    v.try_reserve_exact(additional)
}
