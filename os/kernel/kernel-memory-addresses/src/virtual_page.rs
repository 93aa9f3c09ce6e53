use crate::{PAGE_FRAME_MASK, PAGE_SIZE, VirtualAddress};
use core::fmt;

/// Virtual memory page base.
///
/// A `VirtualPage` is the **page-aligned base** of a 4 KiB virtual page. It is
/// the key of every page-table entry and translation-cache entry.
///
/// ### Invariants
/// - The low bits of the base are always zero (page aligned).
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let vp = VirtualPage::containing_address(VirtualAddress::new(0x0040_0FFF));
/// assert_eq!(vp.base().as_u64(), 0x0040_0000);
/// assert_eq!(vp.checked_next().unwrap().base().as_u64(), 0x0040_1000);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPage(u64);

impl VirtualPage {
    /// Page that contains `addr` (aligns down to page boundary).
    #[inline]
    #[must_use]
    pub const fn containing_address(addr: VirtualAddress) -> Self {
        Self(addr.as_u64() & PAGE_FRAME_MASK)
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress::new(self.0)
    }

    /// The page `count` pages above this one, or `None` on overflow.
    #[inline]
    #[must_use]
    pub const fn checked_add_pages(self, count: u64) -> Option<Self> {
        match count.checked_mul(PAGE_SIZE) {
            Some(bytes) => match self.0.checked_add(bytes) {
                Some(v) => Some(Self(v)),
                None => None,
            },
            None => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn checked_next(self) -> Option<Self> {
        self.checked_add_pages(1)
    }
}

impl fmt::Display for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl fmt::Debug for VirtualPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPage({:#018X})", self.0)
    }
}

impl TryFrom<VirtualAddress> for VirtualPage {
    type Error = VirtualAddress;

    #[inline]
    fn try_from(va: VirtualAddress) -> Result<Self, VirtualAddress> {
        if va.is_page_aligned() {
            Ok(va.page())
        } else {
            Err(va)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_arithmetic() {
        let vp = VirtualAddress::new(0x5000).page();
        assert_eq!(
            vp.checked_add_pages(3).map(VirtualPage::base),
            Some(VirtualAddress::new(0x8000))
        );
        assert_eq!(vp.checked_add_pages(u64::MAX), None);
        assert_eq!(
            VirtualAddress::new(u64::MAX).page().checked_next(),
            None
        );
    }
}
