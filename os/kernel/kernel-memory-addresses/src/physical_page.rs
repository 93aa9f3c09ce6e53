use crate::{PAGE_FRAME_MASK, PAGE_SHIFT, PAGE_SIZE, PhysicalAddress};
use core::fmt;

/// A physical frame: the page-aligned base of a 4 KiB unit of RAM.
///
/// Every frame also has a **frame index**, its position counted from physical
/// address zero. The allocator's coremap is indexed by it.
///
/// ### Invariants
/// - The low [`PAGE_SHIFT`] bits of the base are always zero.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let frame = PhysicalPage::from_index(16);
/// assert_eq!(frame.base(), PhysicalAddress::new(0x10000));
/// assert_eq!(frame.index(), 16);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage(u64);

impl PhysicalPage {
    /// Frame that contains `addr` (aligns down to the frame boundary).
    #[inline]
    #[must_use]
    pub const fn containing_address(addr: PhysicalAddress) -> Self {
        Self(addr.as_u64() & PAGE_FRAME_MASK)
    }

    /// Frame with the given frame index.
    ///
    /// # Panics
    /// If the resulting base address does not fit into 64 bits.
    #[inline]
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        let index = index as u64;
        assert!(index <= (u64::MAX >> PAGE_SHIFT), "frame index out of range");
        Self(index << PAGE_SHIFT)
    }

    /// Frame index of this frame.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn index(self) -> usize {
        (self.0 >> PAGE_SHIFT) as usize
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.0)
    }

    /// Physical address `offset` bytes into this frame.
    #[inline]
    #[must_use]
    pub const fn at(self, offset: u64) -> PhysicalAddress {
        debug_assert!(offset < PAGE_SIZE, "offset beyond frame");
        PhysicalAddress::new(self.0 + offset)
    }

}

impl fmt::Display for PhysicalPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}@0x{:X}", self.index(), self.0)
    }
}

impl fmt::Debug for PhysicalPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage({:#018X})", self.0)
    }
}

impl TryFrom<PhysicalAddress> for PhysicalPage {
    type Error = PhysicalAddress;

    /// Succeeds only for frame-aligned addresses; hands the address back otherwise.
    #[inline]
    fn try_from(pa: PhysicalAddress) -> Result<Self, PhysicalAddress> {
        if pa.is_page_aligned() {
            Ok(pa.page())
        } else {
            Err(pa)
        }
    }
}
