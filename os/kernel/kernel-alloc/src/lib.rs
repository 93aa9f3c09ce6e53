//! # Kernel Physical Memory Allocation
//!
//! Owns every physical frame above the kernel image and hands out contiguous
//! runs of them.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 FrameAllocator                      │
//! │    • one SpinLock (interrupts off while held)       │
//! │    • implements kernel_vmem::FrameAlloc             │
//! └───────────┬─────────────────────────┬───────────────┘
//!             │ before bootstrap()      │ after bootstrap()
//! ┌───────────▼───────────┐ ┌───────────▼───────────────┐
//! │      BootStealer      │ │          Coremap          │
//! │  bump pointer, no     │ │  one FrameRecord/frame,   │
//! │  freeing              │ │  first-fit runs, free     │
//! └───────────────────────┘ └───────────────────────────┘
//! ```
//!
//! ### Bootstrap
//!
//! Early in boot there is no heap to hold the coremap, so frames are *stolen*
//! from the bottom of unmanaged RAM with a bump pointer. Stolen memory is never
//! returned. [`FrameAllocator::bootstrap`] allocates the coremap and marks
//! every frame below the bump pointer (kernel image and everything stolen so
//! far) as [`FrameState::Fixed`].
//!
//! ### Kernel pages
//!
//! Kernel allocations are addressed through the direct-mapped window (see
//! [`phys_mapper`]), so [`FrameAllocator::alloc_kpages`] returns kernel
//! virtual addresses rather than frames.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_alloc::FrameAllocator;
//! use kernel_info::boot::PhysicalMemoryInfo;
//! use kernel_memory_addresses::PhysicalAddress;
//!
//! let info = PhysicalMemoryInfo::new(PhysicalAddress::new(0x4000), PhysicalAddress::new(0x40_0000));
//! let frames = FrameAllocator::new(info);
//! frames.bootstrap();
//!
//! let run = frames.alloc(4).expect("frames");
//! frames.free(run);
//! assert_eq!(frames.stats().allocated, 0);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod bootstrap;
pub mod coremap;
pub mod frame_alloc;
pub mod global;
pub mod phys_mapper;

pub use crate::coremap::{FrameRecord, FrameState, FrameStats};
pub use crate::frame_alloc::FrameAllocator;
pub use crate::phys_mapper::{DirectMapPhysMapper, HeapPhysMapper};
