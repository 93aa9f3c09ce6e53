//! # Kernel Configuration
//!
//! Memory-layout constants and the boot-time RAM hand-off shared by the frame
//! allocator, the address-space code and the fault handler.
//!
//! ## Virtual Memory Layout
//!
//! The VM subsystem assumes a classic split address space: user space at the
//! bottom, a direct-mapped kernel window above it.
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │  Regions (text, data)           │
//!             │  Heap (grows up)                │
//!             │             ...                 │
//!             │  Stack window (grows down)      │
//! USER_STACK_TOP / USERSPACE_END                 ┤ 0x8000_0000
//!             │  Direct map of physical memory  │
//! DIRECT_MAP_BASE + DIRECT_MAP_SIZE              ┤ 0xA000_0000
//!             └─────────────────────────────────┘
//! ```
//!
//! ## Modules
//! * [`memory`]: compile-time layout constants, checked by `const` assertions.
//! * [`boot`]: the physical-memory bounds the boot code hands to the allocator.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
