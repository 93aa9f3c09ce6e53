use bitfield_struct::bitfield;
use core::fmt;

/// Per-page state stored in every [`PageTableEntry`](crate::PageTableEntry).
///
/// The page table is software-only, so this layout is private to the kernel.
/// It packs the permission triple together with the bookkeeping flags the
/// fault handler maintains.
///
/// ### Bit layout
///
/// | Bit | Name         | Meaning |
/// |-----|--------------|---------|
/// | 0   | `valid`      | Entry maps a frame |
/// | 1   | `readable`   | Loads allowed |
/// | 2   | `writable`   | Stores allowed |
/// | 3   | `executable` | Instruction fetch allowed |
/// | 4   | `referenced` | Page was touched since it was mapped |
/// | 5   | `dirty`      | Page was written since it was mapped |
/// | 6–7 | reserved     | |
///
/// ### Example
/// ```rust
/// # use kernel_vmem::{PageEntryBits, Permissions};
/// let bits = PageEntryBits::mapped(Permissions::READ_WRITE);
/// assert!(bits.valid());
/// assert!(bits.writable());
/// assert!(!bits.executable());
/// assert_eq!(bits.permissions(), Permissions::READ_WRITE);
/// ```
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    pub valid: bool,
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
    pub referenced: bool,
    pub dirty: bool,
    #[bits(2)]
    __: u8,
}

impl PageEntryBits {
    /// Bits for a freshly mapped page with permissions `perms`.
    #[inline]
    #[must_use]
    pub const fn mapped(perms: Permissions) -> Self {
        Self::new().with_valid(true).with_permissions(perms)
    }

    #[inline]
    #[must_use]
    pub const fn with_permissions(self, perms: Permissions) -> Self {
        self.with_readable(perms.read)
            .with_writable(perms.write)
            .with_executable(perms.execute)
    }

    #[inline]
    pub const fn set_permissions(&mut self, perms: Permissions) {
        *self = self.with_permissions(perms);
    }

    #[inline]
    #[must_use]
    pub const fn permissions(&self) -> Permissions {
        Permissions {
            read: self.readable(),
            write: self.writable(),
            execute: self.executable(),
        }
    }
}

/// A read/write/execute permission triple.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
#[allow(clippy::struct_excessive_bools)]
pub struct Permissions {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl Permissions {
    pub const NONE: Self = Self::new(false, false, false);
    pub const READ_ONLY: Self = Self::new(true, false, false);
    pub const READ_WRITE: Self = Self::new(true, true, false);
    pub const READ_EXECUTE: Self = Self::new(true, false, true);

    #[inline]
    #[must_use]
    pub const fn new(read: bool, write: bool, execute: bool) -> Self {
        Self {
            read,
            write,
            execute,
        }
    }
}

impl fmt::Debug for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |on: bool, c: char| if on { c } else { '-' };
        write!(
            f,
            "{}{}{}",
            flag(self.read, 'r'),
            flag(self.write, 'w'),
            flag(self.execute, 'x')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_independent() {
        let mut bits = PageEntryBits::mapped(Permissions::READ_EXECUTE);
        bits.set_referenced(true);
        bits.set_dirty(true);
        assert_eq!(bits.permissions(), Permissions::READ_EXECUTE);

        bits.set_permissions(Permissions::READ_WRITE);
        assert!(bits.referenced());
        assert!(bits.dirty());
        assert!(bits.valid());
        assert_eq!(bits.into_bits(), 0b0011_0111);
    }

    #[test]
    fn debug_is_rwx_string() {
        assert_eq!(format!("{:?}", Permissions::READ_EXECUTE), "r-x");
        assert_eq!(format!("{:?}", Permissions::new(true, true, true)), "rwx");
    }
}
