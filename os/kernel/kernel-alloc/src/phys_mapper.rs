//! # Physical Mappers
//!
//! The kernel reaches physical memory through a direct-mapped window: every
//! physical address `pa` below [`DIRECT_MAP_SIZE`] is visible at
//! `DIRECT_MAP_BASE + pa`.
//!
//! - [`kernel_virtual`] / [`kernel_physical`] convert between the two views.
//! - [`DirectMapPhysMapper`] implements [`PhysMapper`] over that window.
//! - [`HeapPhysMapper`] simulates RAM in a heap allocation, for hosted tests.
//!
//! ## Example
//! ```rust
//! use kernel_alloc::phys_mapper::{kernel_physical, kernel_virtual};
//! use kernel_memory_addresses::PhysicalAddress;
//!
//! let pa = PhysicalAddress::new(0x1234_5000);
//! let va = kernel_virtual(pa);
//! assert_eq!(va.as_u64(), 0x9234_5000);
//! assert_eq!(kernel_physical(va), pa);
//! ```

use alloc::alloc::{Layout, alloc_zeroed, dealloc, handle_alloc_error};
use core::ptr::NonNull;
use kernel_info::memory::{DIRECT_MAP_BASE, DIRECT_MAP_SIZE};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, VirtualAddress};
use kernel_vmem::{FRAME_BYTES, PhysMapper};

/// Kernel virtual address of physical address `pa`.
///
/// # Panics
/// If `pa` lies beyond the direct-mapped window.
#[inline]
#[must_use]
pub const fn kernel_virtual(pa: PhysicalAddress) -> VirtualAddress {
    assert!(pa.as_u64() < DIRECT_MAP_SIZE, "physical address outside direct map");
    VirtualAddress::new(DIRECT_MAP_BASE + pa.as_u64())
}

/// Physical address behind kernel virtual address `va`.
///
/// # Panics
/// If `va` is not inside the direct-mapped window.
#[inline]
#[must_use]
pub const fn kernel_physical(va: VirtualAddress) -> PhysicalAddress {
    let v = va.as_u64();
    assert!(
        v >= DIRECT_MAP_BASE && v - DIRECT_MAP_BASE < DIRECT_MAP_SIZE,
        "virtual address outside direct map"
    );
    PhysicalAddress::new(v - DIRECT_MAP_BASE)
}

/// [`PhysMapper`] for the kernel's direct-mapped window.
///
/// The returned pointers are only dereferenceable on the target, once the
/// boot code has established the direct map.
#[derive(Copy, Clone, Debug, Default)]
pub struct DirectMapPhysMapper;

unsafe impl PhysMapper for DirectMapPhysMapper {
    #[allow(clippy::cast_possible_truncation)]
    fn frame_ptr(&self, frame: PhysicalPage) -> *mut u8 {
        kernel_virtual(frame.base()).as_u64() as *mut u8
    }
}

/// RAM simulated by a zeroed, page-aligned heap allocation.
///
/// Physical address 0 is the first byte of the allocation.
pub struct HeapPhysMapper {
    base: NonNull<u8>,
    frames: usize,
}

impl HeapPhysMapper {
    /// Simulate `frames` frames of RAM.
    ///
    /// # Panics
    /// If `frames` is zero or too large to allocate.
    #[must_use]
    pub fn new(frames: usize) -> Self {
        let layout = Self::layout(frames);
        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        let Some(base) = NonNull::new(ptr) else {
            handle_alloc_error(layout);
        };
        Self { base, frames }
    }

    fn layout(frames: usize) -> Layout {
        assert!(frames > 0, "empty simulated RAM");
        frames
            .checked_mul(FRAME_BYTES)
            .and_then(|size| Layout::from_size_align(size, FRAME_BYTES).ok())
            .unwrap_or_else(|| panic!("simulated RAM of {frames} frames is too large"))
    }

    #[inline]
    #[must_use]
    pub const fn frames(&self) -> usize {
        self.frames
    }

    fn offset_of(&self, pa: PhysicalAddress) -> usize {
        let off = usize::try_from(pa.as_u64()).unwrap_or(usize::MAX);
        assert!(
            off < self.frames * FRAME_BYTES,
            "{pa:?} outside simulated RAM"
        );
        off
    }

    /// Read one byte of simulated RAM.
    #[must_use]
    pub fn read(&self, pa: PhysicalAddress) -> u8 {
        let off = self.offset_of(pa);
        // SAFETY: bounds checked above; bytes are initialized.
        unsafe { self.base.as_ptr().add(off).read_volatile() }
    }

    /// Write one byte of simulated RAM.
    pub fn write(&self, pa: PhysicalAddress, value: u8) {
        let off = self.offset_of(pa);
        // SAFETY: bounds checked above.
        unsafe { self.base.as_ptr().add(off).write_volatile(value) }
    }

    /// Fill the whole of `frame` with `value`.
    pub fn fill_frame(&self, frame: PhysicalPage, value: u8) {
        let ptr = self.frame_ptr(frame);
        // SAFETY: frame_ptr checked the frame is inside the allocation.
        unsafe { core::ptr::write_bytes(ptr, value, FRAME_BYTES) }
    }
}

unsafe impl PhysMapper for HeapPhysMapper {
    fn frame_ptr(&self, frame: PhysicalPage) -> *mut u8 {
        let off = self.offset_of(frame.base());
        // SAFETY: in bounds of the allocation.
        unsafe { self.base.as_ptr().add(off) }
    }
}

impl Drop for HeapPhysMapper {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with the same layout.
        unsafe { dealloc(self.base.as_ptr(), Self::layout(self.frames)) }
    }
}

// SAFETY: the mapper only hands out raw pointers; callers serialize access
// to each frame through frame ownership.
unsafe impl Send for HeapPhysMapper {}
unsafe impl Sync for HeapPhysMapper {}
