//! Everything that differs between the bare soft-core target and the hosted
//! `sim` test backend lives behind this module.
//!
//! The real bare-metal backend (raw MMIO register access, the actual
//! assembly context switch) is an out-of-scope external collaborator per
//! spec.md §1 — this crate ships only the trait boundary and the `sim`
//! implementation used by every test.

pub mod context;
pub mod irq;

use core::sync::atomic::{AtomicUsize, Ordering};

static NEXT_CORE_ID: AtomicUsize = AtomicUsize::new(0);

/// Identifies the calling CPU core. On the single-core target this is
/// always 0; under the `smp` feature each `sim` worker thread is handed a
/// distinct id the first time it calls this function.
pub fn core_id() -> usize {
    #[cfg(feature = "smp")]
    {
        context::sim::THREAD_CORE_ID.with(|cell| {
            *cell.borrow_mut().get_or_insert_with(|| NEXT_CORE_ID.fetch_add(1, Ordering::Relaxed))
        })
    }
    #[cfg(not(feature = "smp"))]
    {
        let _ = &NEXT_CORE_ID;
        0
    }
}

/// Parks the calling core until the next interrupt/wakeup. On bare metal
/// this is `wfi`; under `sim` it is a condition-variable park performed by
/// the scheduler's idle thread.
pub fn wait_for_interrupt() {
    #[cfg(feature = "sim")]
    {
        std::thread::yield_now();
    }
    #[cfg(not(feature = "sim"))]
    {
        core::hint::spin_loop();
    }
}
