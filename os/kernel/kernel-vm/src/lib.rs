//! # Demand-Paged Virtual Memory
//!
//! The upward-facing half of the VM subsystem: the translation-fault handler
//! and the [`Vmm`] facade used by process management and the program loader.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_alloc::{FrameAllocator, HeapPhysMapper};
//! use kernel_info::boot::PhysicalMemoryInfo;
//! use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
//! use kernel_vm::{FaultKind, Vmm};
//! use kernel_vmem::SoftTlb;
//!
//! let frames = FrameAllocator::new(PhysicalMemoryInfo::new(
//!     PhysicalAddress::new(0x2000),
//!     PhysicalAddress::new(0x40_0000),
//! ));
//! frames.bootstrap();
//! let ram = HeapPhysMapper::new(0x400);
//! let tlb: SoftTlb = SoftTlb::new();
//! let vmm = Vmm::new(&frames, &ram, &tlb);
//!
//! let mut aspace = vmm.create();
//! vmm.define_region(&mut aspace, VirtualAddress::new(0x40_0000), 0x2000, true, false, true)?;
//! vmm.prepare_load(&mut aspace)?;
//! vmm.complete_load(&mut aspace);
//! vmm.activate(&aspace);
//!
//! vmm.fault(Some(&mut aspace), FaultKind::Read as u32, VirtualAddress::new(0x40_0010))?;
//! assert!(tlb.translate(VirtualAddress::new(0x40_0010)).is_some());
//!
//! vmm.destroy(aspace);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod fault;
mod vmm;

pub use crate::fault::{FaultError, FaultKind, handle_fault};
pub use crate::vmm::Vmm;
