//! RAII critical section.
//!
//! Replaces the C source's `state = OS_CriticalBegin(); ...;
//! OS_CriticalEnd(state);` pairing (`original_source/trunk/kernel/rtos.c`)
//! with a guard while preserving the exact nesting semantics of spec.md §5:
//! interrupts re-enable only once the outermost guard drops.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::arch::irq;

static DEPTH: AtomicU32 = AtomicU32::new(0);

/// Holds interrupts masked for as long as it is alive. Nestable: only the
/// outermost `enter()` actually disables interrupts, and only the
/// outermost drop re-enables them.
pub struct CriticalSection {
    outermost: bool,
    previously_enabled: bool,
}

impl CriticalSection {
    pub fn enter() -> Self {
        let previously_enabled = irq::disable();
        let depth = DEPTH.fetch_add(1, Ordering::AcqRel);
        Self { outermost: depth == 0, previously_enabled }
    }
}

impl Drop for CriticalSection {
    fn drop(&mut self) {
        let depth = DEPTH.fetch_sub(1, Ordering::AcqRel);
        if depth == 1 && self.outermost {
            irq::restore(self.previously_enabled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_sections_restore_only_at_depth_zero() {
        assert!(irq::is_enabled());
        let outer = CriticalSection::enter();
        assert!(!irq::is_enabled());
        {
            let _inner = CriticalSection::enter();
            assert!(!irq::is_enabled());
        }
        assert!(!irq::is_enabled());
        drop(outer);
        assert!(irq::is_enabled());
    }
}
