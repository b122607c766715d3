//! Interrupt enable/disable primitives.
//!
//! Bare-metal state is a single global flag: this target has no per-core
//! interrupt controller state worth tracking beyond "are interrupts masked
//! right now". [`crate::sched::critical::CriticalSection`] is the nesting
//! RAII guard built on top of these two functions.

use core::sync::atomic::{AtomicBool, Ordering};

static ENABLED: AtomicBool = AtomicBool::new(true);

/// Masks interrupts. Returns the previous state so the caller can restore
/// it exactly (this is the primitive `CriticalSection::enter` is built on).
pub fn disable() -> bool {
    ENABLED.swap(false, Ordering::AcqRel)
}

/// Unmasks interrupts unconditionally.
pub fn enable() {
    ENABLED.store(true, Ordering::Release);
}

/// Restores a previously saved state.
pub fn restore(was_enabled: bool) {
    ENABLED.store(was_enabled, Ordering::Release);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Acquire)
}
