//! SMP-only additions: a single global spin lock plus the per-thread spin
//! count needed to restore it across a preemption.
//!
//! Grounded in spec.md §4.2/§5's SMP note: cross-CPU invalidation uses an
//! IPI "ping", and because a thread can be preempted while it holds the
//! spin lock, the nesting depth has to be saved on the thread itself
//! rather than on the lock (a lock-local counter would be wrong once a
//! different thread resumes on that core).

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

static LOCKED: AtomicBool = AtomicBool::new(false);
static OWNER_SPIN_COUNT: AtomicU32 = AtomicU32::new(0);

/// Acquires the global SMP spin lock, busy-waiting across cores.
pub fn spin_lock() {
    while LOCKED.compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed).is_err()
    {
        core::hint::spin_loop();
    }
    OWNER_SPIN_COUNT.fetch_add(1, Ordering::Relaxed);
}

pub fn spin_unlock() {
    OWNER_SPIN_COUNT.fetch_sub(1, Ordering::Relaxed);
    LOCKED.store(false, Ordering::Release);
}

/// Saves and clears the current owner's spin depth, for a preempted thread
/// to restore later via [`restore_spin_count`].
pub fn save_spin_count() -> u32 {
    OWNER_SPIN_COUNT.swap(0, Ordering::AcqRel)
}

pub fn restore_spin_count(count: u32) {
    OWNER_SPIN_COUNT.store(count, Ordering::Release);
}

/// Sends an inter-processor interrupt to every other core so they
/// invalidate any state cached from before a cross-CPU update (e.g. a
/// thread migrating between cores' ready lists). The actual IPI mechanism
/// is board-specific and out of scope; `sim` cores simply re-read shared
/// state since it already uses atomics/mutexes.
pub fn ping_other_cores() {
    #[cfg(feature = "sim")]
    {
        // sim cores share memory directly; nothing to invalidate.
    }
}
