//! # Kernel synchronization primitives
//!
//! * [`SpinLock`]: a test-and-test-and-set lock that also disables local
//!   interrupts for as long as it is held.
//! * [`IrqGuard`]: RAII interrupt disable/restore.
//! * [`SyncOnceCell`]: a one-time initialized global.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod spin_lock;
mod sync_once_cell;

pub use irq::IrqGuard;
pub use spin_lock::{SpinLock, SpinLockGuard};
pub use sync_once_cell::SyncOnceCell;
