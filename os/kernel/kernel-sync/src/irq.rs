//! Local interrupt control.
//!
//! On bare-metal `x86_64` this uses `cli`/`sti` and reads `IF` from `RFLAGS`.
//! On hosted targets (unit and integration tests) interrupts are modelled by a
//! per-thread flag, so code that must run with interrupts disabled can be
//! checked with [`interrupts_enabled`].
//!
//! Other bare-metal targets are rejected at compile time. A MIPS port, where
//! the software TLB words come from, would toggle `Status.IE` instead.

/// RAII guard that disables interrupts on creation and restores them on drop.
///
/// `IrqGuard::new()` snapshots the interrupt-enable state. If interrupts were
/// enabled, it disables them. On drop, it re-enables them **only** if they
/// were previously enabled, so guards nest.
///
/// # Examples
///
/// ```
/// use kernel_sync::irq::{IrqGuard, interrupts_enabled};
///
/// {
///     let _g = IrqGuard::new();
///     assert!(!interrupts_enabled());
/// }
/// ```
pub struct IrqGuard {
    /// Whether interrupts were enabled when the guard was created.
    were_enabled: bool,
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqGuard {
    /// Disables interrupts if they are currently enabled and remembers the state.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let enabled = interrupts_enabled();
        if enabled {
            disable_interrupts();
        }
        Self {
            were_enabled: enabled,
        }
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        if self.were_enabled {
            enable_interrupts();
        }
    }
}

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
mod arch {
    /// `IF` bit in `RFLAGS`.
    const RFLAGS_IF: u64 = 1 << 9;

    #[inline]
    pub fn disable() {
        unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
    }

    #[inline]
    pub fn enable() {
        unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
    }

    #[inline]
    pub fn enabled() -> bool {
        let r: u64;
        unsafe { core::arch::asm!("pushfq; pop {}", out(reg) r, options(nostack, preserves_flags)) }
        r & RFLAGS_IF != 0
    }
}

#[cfg(all(target_os = "none", not(target_arch = "x86_64")))]
compile_error!("kernel-sync has no interrupt control for this bare-metal architecture");

#[cfg(not(target_os = "none"))]
mod arch {
    extern crate std;

    use core::cell::Cell;

    std::thread_local! {
        static ENABLED: Cell<bool> = const { Cell::new(true) };
    }

    #[inline]
    pub fn disable() {
        ENABLED.with(|e| e.set(false));
    }

    #[inline]
    pub fn enable() {
        ENABLED.with(|e| e.set(true));
    }

    #[inline]
    pub fn enabled() -> bool {
        ENABLED.with(Cell::get)
    }
}

/// Disables interrupts on the local CPU.
#[inline]
pub fn disable_interrupts() {
    arch::disable();
}

/// Enables interrupts on the local CPU.
#[inline]
pub fn enable_interrupts() {
    arch::enable();
}

/// Whether interrupts are currently enabled on the local CPU.
#[inline]
#[must_use]
pub fn interrupts_enabled() -> bool {
    arch::enabled()
}
