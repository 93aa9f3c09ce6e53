//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for raw memory addresses and page bases used by the
//! frame allocator, the address-space bookkeeping and the fault handler.
//!
//! ## Overview
//!
//! The kernel manages memory in fixed 4 KiB units. Physical memory is carved
//! into **frames**; virtual memory into **pages**. Mixing the two is the most
//! common source of bugs in VM code, so each kind gets its own type:
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`PhysicalAddress`] | A byte address in physical memory (RAM). |
//! | [`PhysicalPage`] | The page-aligned base of a physical frame; also knows its frame index. |
//! | [`VirtualAddress`] | A byte address in some virtual address space. |
//! | [`VirtualPage`] | The page-aligned base of a virtual page. |
//!
//! All types are `#[repr(transparent)]` wrappers around `u64` and are `Copy`,
//! `Eq`, `Ord` and `Hash`.
//!
//! ## Frame numbers
//!
//! Frame index `i` is the frame starting at physical address `i * PAGE_SIZE`.
//! The conversion in both directions is a pure function:
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let frame = PhysicalPage::from_index(3);
//! assert_eq!(frame.base().as_u64(), 3 * PAGE_SIZE);
//! assert_eq!(frame.index(), 3);
//!
//! let pa = PhysicalAddress::new(0x3042);
//! assert_eq!(pa.page().index(), 3);
//! assert_eq!(pa.page_offset(), 0x42);
//! ```
//!
//! ## Design Notes
//!
//! - Alignment is an invariant of the page types: they can only be produced by
//!   aligning down ([`containing_address`](VirtualPage::containing_address)) or
//!   by a checked conversion ([`TryFrom`]).
//! - Arithmetic that could leave the address space is offered in `checked_*`
//!   form; plain `+` is reserved for cases where overflow is a bug.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod physical_address;
mod physical_page;
mod virtual_address;
mod virtual_page;

pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
pub use virtual_address::VirtualAddress;
pub use virtual_page::VirtualPage;

/// Size of a page (and of a physical frame) in bytes.
pub const PAGE_SIZE: u64 = 4096;

/// log2([`PAGE_SIZE`]), i.e. the number of in-page offset bits.
pub const PAGE_SHIFT: u32 = 12;

/// Mask selecting the page-aligned part of an address.
pub const PAGE_FRAME_MASK: u64 = !(PAGE_SIZE - 1);

const _: () = assert!(1 << PAGE_SHIFT == PAGE_SIZE);

/// Round `value` down to a multiple of [`PAGE_SIZE`].
#[inline]
#[must_use]
pub const fn align_down(value: u64) -> u64 {
    value & PAGE_FRAME_MASK
}

/// Round `value` up to a multiple of [`PAGE_SIZE`], or `None` on overflow.
#[inline]
#[must_use]
pub const fn checked_align_up(value: u64) -> Option<u64> {
    match value.checked_add(PAGE_SIZE - 1) {
        Some(v) => Some(v & PAGE_FRAME_MASK),
        None => None,
    }
}

/// Number of pages needed to cover `bytes` bytes.
#[inline]
#[must_use]
pub const fn pages_for(bytes: u64) -> u64 {
    bytes.div_ceil(PAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_helpers() {
        assert_eq!(align_down(0x1FFF), 0x1000);
        assert_eq!(checked_align_up(0x1001), Some(0x2000));
        assert_eq!(checked_align_up(0x2000), Some(0x2000));
        assert_eq!(checked_align_up(u64::MAX), None);
        assert_eq!(pages_for(0), 0);
        assert_eq!(pages_for(1), 1);
        assert_eq!(pages_for(PAGE_SIZE + 1), 2);
    }

    #[test]
    fn page_and_frame_types_agree() {
        let va = VirtualAddress::new(0x0040_1234);
        let vp = va.page();
        assert_eq!(vp.base().as_u64(), 0x0040_1000);
        assert_eq!(va.page_offset(), 0x234);

        let frame = PhysicalPage::from_index(0x401);
        assert_eq!(frame.base().as_u64(), vp.base().as_u64());
        assert_eq!(PhysicalAddress::new(0x0040_1FFF).page(), frame);
    }
}
