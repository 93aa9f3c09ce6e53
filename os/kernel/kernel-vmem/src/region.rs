use crate::{Permissions, VmError};
use core::fmt;
use kernel_memory_addresses::{
    PAGE_SIZE, VirtualAddress, VirtualPage, align_down, checked_align_up, pages_for,
};

/// A declared, page-aligned span of user address space.
///
/// Regions are registered by the program loader (text, data, bss) before the
/// first fault. A region remembers both its declared permissions and the ones
/// currently in force, since loading temporarily makes every region writable.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Region {
    base: VirtualPage,
    pages: u64,
    declared: Permissions,
    current: Permissions,
}

impl Region {
    /// Page-align `[vaddr, vaddr + size)` outward into a region.
    ///
    /// # Errors
    /// [`VmError::InvalidRange`] for an empty span or one that wraps around
    /// the address space.
    pub fn new(vaddr: VirtualAddress, size: u64, perms: Permissions) -> Result<Self, VmError> {
        if size == 0 {
            return Err(VmError::InvalidRange);
        }
        let end = vaddr
            .as_u64()
            .checked_add(size)
            .and_then(checked_align_up)
            .ok_or(VmError::InvalidRange)?;
        let start = align_down(vaddr.as_u64());
        Ok(Self {
            base: VirtualAddress::new(start).page(),
            pages: pages_for(end - start),
            declared: perms,
            current: perms,
        })
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> VirtualPage {
        self.base
    }

    #[inline]
    #[must_use]
    pub const fn pages(&self) -> u64 {
        self.pages
    }

    /// First address past the region.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> VirtualAddress {
        VirtualAddress::new(self.base.base().as_u64() + self.pages * PAGE_SIZE)
    }

    #[inline]
    #[must_use]
    pub const fn declared_permissions(&self) -> Permissions {
        self.declared
    }

    /// Permissions in force right now.
    #[inline]
    #[must_use]
    pub const fn permissions(&self) -> Permissions {
        self.current
    }

    #[inline]
    pub(crate) const fn set_current(&mut self, perms: Permissions) {
        self.current = perms;
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, page: VirtualPage) -> bool {
        page >= self.base && page.base() < self.end()
    }

    /// Whether this region shares a page with `[start, end)`.
    #[inline]
    #[must_use]
    pub fn overlaps(&self, start: VirtualAddress, end: VirtualAddress) -> bool {
        self.base.base() < end && start < self.end()
    }

    /// All pages of the region, lowest first.
    pub fn iter_pages(&self) -> impl Iterator<Item = VirtualPage> + use<> {
        let base = self.base.base().as_u64();
        (0..self.pages).map(move |i| VirtualAddress::new(base + i * PAGE_SIZE).page())
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Region({}..{} {:?}",
            self.base.base(),
            self.end(),
            self.current
        )?;
        if self.current != self.declared {
            write!(f, " declared {:?}", self.declared)?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn aligns_outward() {
        let r = Region::new(VirtualAddress::new(0x40_0123), 0x1000, Permissions::READ_ONLY).unwrap();
        assert_eq!(r.base().base().as_u64(), 0x40_0000);
        assert_eq!(r.end().as_u64(), 0x40_2000);
        assert_eq!(r.pages(), 2);
        assert_eq!(r.iter_pages().count(), 2);
    }

    #[test]
    fn contains_is_half_open() {
        let r = Region::new(VirtualAddress::new(0x40_0000), 0x3000, Permissions::READ_WRITE).unwrap();
        let page = |a: u64| VirtualAddress::new(a).page();
        assert!(!r.contains(page(0x3F_F000)));
        assert!(r.contains(page(0x40_0000)));
        assert!(r.contains(page(0x40_2FFF)));
        assert!(!r.contains(page(0x40_3000)));
    }

    #[test]
    fn rejects_empty_and_wrapping() {
        assert_eq!(
            Region::new(VirtualAddress::new(0x1000), 0, Permissions::READ_ONLY),
            Err(VmError::InvalidRange)
        );
        assert_eq!(
            Region::new(VirtualAddress::new(u64::MAX - 10), 100, Permissions::READ_ONLY),
            Err(VmError::InvalidRange)
        );
    }

    proptest! {
        #[test]
        fn smallest_page_span_covering_the_request(
            vaddr in 0u64..(1 << 40),
            size in 1u64..(1 << 20),
        ) {
            let r = Region::new(VirtualAddress::new(vaddr), size, Permissions::READ_WRITE).unwrap();
            let start = r.base().base().as_u64();
            prop_assert!(start <= vaddr && vaddr - start < PAGE_SIZE);
            prop_assert!(r.end().as_u64() >= vaddr + size);
            prop_assert!(r.end().as_u64() - (vaddr + size) < PAGE_SIZE);
            prop_assert_eq!(r.iter_pages().count() as u64, r.pages());

            let first = VirtualAddress::new(vaddr).page();
            let last = VirtualAddress::new(vaddr + size - 1).page();
            prop_assert!(r.contains(first) && r.contains(last));
            prop_assert!(r.overlaps(VirtualAddress::new(vaddr), VirtualAddress::new(vaddr + size)));
            prop_assert!(!r.overlaps(r.end(), r.end() + PAGE_SIZE));
        }
    }
}
