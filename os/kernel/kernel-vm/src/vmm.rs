//! The virtual memory manager as seen by process management and the loader.

use crate::fault::{FaultError, FaultKind, handle_fault};
use kernel_memory_addresses::{PhysicalPage, VirtualAddress, checked_align_up};
use kernel_vmem::{AddressSpace, FrameAlloc, Permissions, PhysMapper, TranslationCache, VmError, tlb};
use log::{debug, trace};

/// Ties address spaces to a frame allocator, a physical mapper and the TLB.
///
/// The manager does not track which address space is current; callers pass it
/// to [`fault`](Self::fault) and [`activate`](Self::activate).
pub struct Vmm<'m, A, M, T>
where
    A: FrameAlloc + ?Sized,
    M: PhysMapper + ?Sized,
    T: TranslationCache + ?Sized,
{
    alloc: &'m A,
    mapper: &'m M,
    tlb: &'m T,
}

impl<'m, A, M, T> Vmm<'m, A, M, T>
where
    A: FrameAlloc + ?Sized,
    M: PhysMapper + ?Sized,
    T: TranslationCache + ?Sized,
{
    #[must_use]
    pub const fn new(alloc: &'m A, mapper: &'m M, tlb: &'m T) -> Self {
        Self { alloc, mapper, tlb }
    }

    /// A fresh, empty address space.
    #[must_use]
    #[allow(clippy::unused_self)]
    pub const fn create(&self) -> AddressSpace {
        AddressSpace::new()
    }

    /// Duplicate `src` for a new process.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`]; nothing of the copy survives the failure.
    pub fn copy(&self, src: &AddressSpace) -> Result<AddressSpace, VmError> {
        src.copy(self.alloc, self.mapper)
    }

    /// Release every frame of `aspace`.
    ///
    /// The caller deactivates `aspace` first if it is current.
    pub fn destroy(&self, aspace: AddressSpace) {
        aspace.destroy(self.alloc);
    }

    /// Make `aspace` current: drop every cached translation of its predecessor.
    pub fn activate(&self, aspace: &AddressSpace) {
        tlb::invalidate_all(self.tlb);
        trace!("activate: {} pages mapped", aspace.frames_in_use());
    }

    /// Nothing to undo; the next [`activate`](Self::activate) flushes.
    #[allow(clippy::unused_self)]
    pub fn deactivate(&self, _aspace: &AddressSpace) {
        trace!("deactivate");
    }

    /// Declare `[vaddr, vaddr + size)` with the given permissions.
    ///
    /// # Errors
    /// See [`AddressSpace::define_region`].
    #[allow(clippy::fn_params_excessive_bools)]
    pub fn define_region(
        &self,
        aspace: &mut AddressSpace,
        vaddr: VirtualAddress,
        size: u64,
        readable: bool,
        writable: bool,
        executable: bool,
    ) -> Result<(), VmError> {
        aspace.define_region(vaddr, size, Permissions::new(readable, writable, executable))
    }

    /// Back all declared pages and open them for writing by the loader.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`]; `aspace` is left as it was.
    pub fn prepare_load(&self, aspace: &mut AddressSpace) -> Result<(), VmError> {
        aspace.prepare_load(self.alloc, self.mapper)
    }

    /// Put the declared region permissions into force.
    pub fn complete_load(&self, aspace: &mut AddressSpace) {
        aspace.complete_load();
        tlb::invalidate_all(self.tlb);
        debug!("complete_load: {} regions", aspace.regions().len());
    }

    /// Initial user stack pointer.
    #[must_use]
    #[allow(clippy::unused_self)]
    pub const fn define_stack(&self, aspace: &AddressSpace) -> VirtualAddress {
        aspace.define_stack()
    }

    /// Move the heap break of `aspace` and return the previous break.
    ///
    /// Translations of released heap pages are dropped from the TLB.
    ///
    /// # Errors
    /// See [`AddressSpace::sbrk`].
    pub fn sbrk(&self, aspace: &mut AddressSpace, delta: i64) -> Result<VirtualAddress, VmError> {
        let before = aspace.heap();
        let old = aspace.sbrk(delta, self.alloc)?;
        let after = aspace.heap();

        if after.end < before.end {
            let mut page = page_ceil(after.end).page();
            let end = page_ceil(before.end);
            while page.base() < end {
                tlb::invalidate_page(self.tlb, page);
                let Some(next) = page.checked_next() else {
                    break;
                };
                page = next;
            }
        }
        Ok(old)
    }

    /// Trap entry: resolve fault `code` at `addr` against `current`.
    ///
    /// # Errors
    /// [`FaultError::InvalidFaultKind`] for an unknown `code`, otherwise as
    /// [`handle_fault`].
    ///
    /// # Panics
    /// As [`handle_fault`].
    pub fn fault(
        &self,
        current: Option<&mut AddressSpace>,
        code: u32,
        addr: VirtualAddress,
    ) -> Result<PhysicalPage, FaultError> {
        let kind = FaultKind::try_from(code)?;
        handle_fault(current, kind, addr, self.alloc, self.mapper, self.tlb)
    }
}

fn page_ceil(va: VirtualAddress) -> VirtualAddress {
    checked_align_up(va.as_u64()).map_or(va, VirtualAddress::new)
}
