//! Thread context switch abstraction.
//!
//! The bare-metal backend (save/restore of the soft core's register file via
//! inline assembly) is the out-of-scope collaborator named in spec.md §1.
//! What's left in-scope is the trait boundary the scheduler calls through,
//! plus the `sim` backend used by every test: each kernel thread becomes an
//! OS thread, and a [`sim::RunGate`] enforces "only one runnable at a time"
//! exactly as a single-core soft core would behave.

/// Performs a raw context switch: save the current stack pointer into
/// `*old_stack`, then resume execution at `new_stack`.
///
/// # Safety
/// `old_stack` must point at the currently-running thread's saved stack
/// slot, and `new_stack` must be a stack previously prepared for this
/// thread (by [`prepare_stack`] or by a prior switch away from it).
pub unsafe trait ContextSwitch {
    unsafe fn switch(old_stack: *mut usize, new_stack: usize);
}

/// Bare-metal backend: implemented by the board-specific crate (out of
/// scope here). Declared so the scheduler can name a concrete type even
/// when `sim` is disabled.
#[cfg(not(feature = "sim"))]
pub struct Bare;

#[cfg(not(feature = "sim"))]
unsafe impl ContextSwitch for Bare {
    unsafe fn switch(_old_stack: *mut usize, _new_stack: usize) {
        unimplemented!("bare-metal context switch is board-specific and out of scope")
    }
}

#[cfg(feature = "sim")]
pub mod sim {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::sync::{Arc, Condvar, Mutex};

    std::thread_local! {
        pub static THREAD_CORE_ID: RefCell<Option<usize>> = const { RefCell::new(None) };
    }

    /// Enforces that exactly one registered thread runs at a time, the way
    /// a single soft core only ever executes one instruction stream.
    ///
    /// The scheduler's `reschedule` calls [`RunGate::resume`] with the
    /// handle it picked; every other parked thread stays blocked in
    /// [`RunGate::park_until_turn`] until it is picked again.
    pub struct RunGate {
        state: Mutex<GateState>,
        cv: Condvar,
    }

    struct GateState {
        running: Option<u64>,
        ready: VecDeque<u64>,
    }

    impl RunGate {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new(GateState { running: None, ready: VecDeque::new() }),
                cv: Condvar::new(),
            })
        }

        /// Marks `id` as the one thread allowed to run and wakes everyone
        /// so the newly-chosen thread can notice it's its turn.
        pub fn resume(&self, id: u64) {
            let mut state = self.state.lock().unwrap();
            state.running = Some(id);
            self.cv.notify_all();
        }

        /// Blocks the calling OS thread until `id` is the running id.
        pub fn park_until_turn(&self, id: u64) {
            let mut state = self.state.lock().unwrap();
            while state.running != Some(id) {
                state = self.cv.wait(state).unwrap();
            }
        }
    }
}
