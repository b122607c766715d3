//! Recursive (re-entrant) mutex.
//!
//! Grounded in `OS_MutexCreate`/`OS_MutexPend`/`OS_MutexPost` from
//! `original_source/trunk/kernel/rtos.c`: a re-entrant pend by the current
//! owner only bumps a count and never touches the underlying semaphore,
//! matching spec.md §4.3's "recursive mutex ... re-entrant pend doesn't
//! touch the underlying semaphore".

use hermit_sync::InterruptTicketMutex;

use crate::config::Ticks;
use crate::sched::task::ThreadId;
use crate::sched::Scheduler;
use crate::sync::semaphore::Semaphore;

struct MutexState {
    owner: Option<ThreadId>,
    count: u32,
}

pub struct Mutex {
    sem: Semaphore,
    state: InterruptTicketMutex<MutexState>,
}

impl Mutex {
    pub const fn new() -> Self {
        Self {
            sem: Semaphore::new(1),
            state: InterruptTicketMutex::new(MutexState { owner: None, count: 0 }),
        }
    }

    /// Acquires the mutex, recursively if the caller already owns it.
    /// Returns `0` on success, `-1` on timeout (same convention as
    /// [`Semaphore::pend`]).
    pub fn pend(&self, sched: &Scheduler, id: ThreadId, timeout: Option<Ticks>) -> i32 {
        {
            let mut state = self.state.lock();
            if state.owner == Some(id) {
                state.count += 1;
                return 0;
            }
        }
        let result = self.sem.pend(sched, id, timeout);
        if result == 0 {
            let mut state = self.state.lock();
            state.owner = Some(id);
            state.count = 1;
        }
        result
    }

    /// Releases one level of ownership; the underlying semaphore is only
    /// posted once the recursion count reaches zero.
    pub fn post(&self, sched: &Scheduler, id: ThreadId) {
        let mut state = self.state.lock();
        if state.owner != Some(id) {
            return;
        }
        state.count -= 1;
        if state.count == 0 {
            state.owner = None;
            drop(state);
            self.sem.post(sched);
        }
    }

    pub fn owner(&self) -> Option<ThreadId> {
        self.state.lock().owner
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::task::Priority;

    #[test]
    fn reentrant_pend_does_not_deadlock() {
        let sched = Scheduler::new();
        sched.init_idle();
        let id = sched.create("owner", Priority(2), |_| {}, 0);
        let mtx = Mutex::new();
        assert_eq!(mtx.pend(&sched, id, None), 0);
        assert_eq!(mtx.pend(&sched, id, None), 0);
        assert_eq!(mtx.owner(), Some(id));
        mtx.post(&sched, id);
        assert_eq!(mtx.owner(), Some(id));
        mtx.post(&sched, id);
        assert_eq!(mtx.owner(), None);
    }
}
