//! # Translation Faults
//!
//! The processor traps whenever a user access misses the TLB. The handler
//! decides whether the address is legal for the current address space, backs
//! the page with a frame on first touch and loads the translation.

use core::fmt;
use kernel_memory_addresses::{PhysicalPage, VirtualAddress};
use kernel_vmem::{AddressSpace, FrameAlloc, PhysMapper, TranslationCache, VmError, tlb};
use log::trace;

/// Why the processor trapped.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum FaultKind {
    /// Load from a page with no cached translation.
    Read = 0,
    /// Store to a page with no cached translation.
    Write = 1,
    /// Store through a translation without write permission.
    ReadOnly = 2,
}

impl FaultKind {
    #[must_use]
    pub const fn explain(self) -> &'static str {
        match self {
            Self::Read => "read from an untranslated page",
            Self::Write => "write to an untranslated page",
            Self::ReadOnly => "write through a read-only translation",
        }
    }
}

impl TryFrom<u32> for FaultKind {
    type Error = FaultError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Read),
            1 => Ok(Self::Write),
            2 => Ok(Self::ReadOnly),
            other => Err(FaultError::InvalidFaultKind(other)),
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.explain())
    }
}

/// A fault that could not be resolved.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FaultError {
    #[error("out of memory")]
    OutOfMemory,
    /// The address lies outside every region, the heap and the stack.
    #[error("access violation at {0}")]
    AccessViolation(VirtualAddress),
    #[error("invalid fault kind {0}")]
    InvalidFaultKind(u32),
    #[error(transparent)]
    Vm(VmError),
}

impl From<VmError> for FaultError {
    fn from(value: VmError) -> Self {
        match value {
            VmError::OutOfMemory => Self::OutOfMemory,
            other => Self::Vm(other),
        }
    }
}

/// Resolve a translation fault at `addr` and load the TLB.
///
/// Returns the frame now backing the faulting page. An already mapped page
/// keeps its frame; only the first touch allocates.
///
/// # Errors
/// - [`FaultError::AccessViolation`] if `addr` is not part of `aspace`.
/// - [`FaultError::OutOfMemory`] if a frame or page-table slot is unavailable.
///
/// # Panics
/// If there is no current address space, or on a [`FaultKind::ReadOnly`]
/// fault. Translations are always loaded writable, so either one is a kernel
/// bug.
pub fn handle_fault<A, M, T>(
    aspace: Option<&mut AddressSpace>,
    kind: FaultKind,
    addr: VirtualAddress,
    alloc: &A,
    mapper: &M,
    tlb: &T,
) -> Result<PhysicalPage, FaultError>
where
    A: FrameAlloc + ?Sized,
    M: PhysMapper + ?Sized,
    T: TranslationCache + ?Sized,
{
    let Some(aspace) = aspace else {
        panic!("{kind} at {addr} with no current address space");
    };
    assert_ne!(kind, FaultKind::ReadOnly, "{kind} at {addr}");

    let page = addr.page();
    let Some(segment) = aspace.classify(page) else {
        trace!("fault: {kind} at {addr}: no segment");
        return Err(FaultError::AccessViolation(addr));
    };

    let frame = if let Some(entry) = aspace.entry(page) {
        entry.frame()
    } else {
        let perms = aspace.permissions_for(segment);
        aspace.map_new_page(page, perms, alloc, mapper)?
    };

    if let Some(entry) = aspace.entry_mut(page) {
        let bits = entry.bits_mut();
        bits.set_referenced(true);
        if kind == FaultKind::Write {
            bits.set_dirty(true);
        }
    }

    let slot = tlb::install(tlb, page, frame, true);
    trace!("fault: {kind} at {addr} ({segment:?}) -> {frame} in slot {slot}");
    Ok(frame)
}
