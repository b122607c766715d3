//! Counting semaphore with timeout.
//!
//! Grounded in `OS_SemaphoreCreate`/`OS_SemaphorePend`/`OS_SemaphorePost`
//! from `original_source/trunk/kernel/rtos.c`. `pend` returns `0` when the
//! semaphore was posted and `-1` on timeout, matching the original's
//! return convention exactly. The waiter list is kept
//! sorted by thread priority, not plain FIFO, so `post`
//! always wakes the highest-priority waiter.

use alloc::collections::VecDeque;

use hermit_sync::InterruptTicketMutex;

use crate::arch;
use crate::config::Ticks;
use crate::sched::task::ThreadId;
use crate::sched::Scheduler;
use crate::sync::priority_insert;

struct SemaphoreState {
    count: isize,
    waiters: VecDeque<ThreadId>,
}

pub struct Semaphore {
    state: InterruptTicketMutex<SemaphoreState>,
}

impl Semaphore {
    pub const fn new(count: isize) -> Self {
        Self { state: InterruptTicketMutex::new(SemaphoreState { count, waiters: VecDeque::new() }) }
    }

    /// Non-blocking acquire; returns `true` if the resource was available.
    pub fn try_pend(&self) -> bool {
        let mut state = self.state.lock();
        if state.count > 0 {
            state.count -= 1;
            true
        } else {
            false
        }
    }

    /// Blocking acquire. `timeout` is a duration in ticks, `None` blocks
    /// forever. Returns `0` on success, `-1` on timeout — the same
    /// convention `OS_SemaphorePend` uses.
    pub fn pend(&self, sched: &Scheduler, id: ThreadId, timeout: Option<Ticks>) -> i32 {
        loop {
            {
                let mut state = self.state.lock();
                if state.count > 0 {
                    state.count -= 1;
                    return 0;
                }
                priority_insert(&mut state.waiters, sched, id);
            }

            sched.block(id);
            if let Some(delay) = timeout {
                sched.arm_timeout(id, sched.now().wrapping_add(delay));
            }
            sched.reschedule(false);
            arch::wait_for_interrupt();

            if sched.take_timed_out(id) {
                let mut state = self.state.lock();
                state.waiters.retain(|&w| w != id);
                return -1;
            }
        }
    }

    /// Releases one resource, waking the highest-priority waiter if any
    /// (FIFO among equal priorities).
    pub fn post(&self, sched: &Scheduler) {
        let woken = {
            let mut state = self.state.lock();
            state.count += 1;
            state.waiters.pop_front()
        };
        if let Some(id) = woken {
            sched.wake(id);
        }
    }

    pub fn count(&self) -> isize {
        self.state.lock().count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_pend_respects_count() {
        let sem = Semaphore::new(1);
        assert!(sem.try_pend());
        assert!(!sem.try_pend());
    }

    #[test]
    fn post_increments_count() {
        let sched = Scheduler::new();
        sched.init_idle();
        let sem = Semaphore::new(0);
        assert!(!sem.try_pend());
        sem.post(&sched);
        assert!(sem.try_pend());
    }

    #[test]
    fn pend_times_out_when_never_posted() {
        let sched = Scheduler::new();
        sched.init_idle();
        let waiter = sched.create("waiter", crate::sched::task::Priority(2), |_| {}, 0);
        let sem = Semaphore::new(0);
        // Drive scheduler ticks past the deadline in another logical step:
        // pend arms a timeout at now()+1; advance ticks until it fires.
        let result = core::cell::Cell::new(None);
        // simulate: spawn pend on a loop that also ticks since sim has no
        // real second thread driving time here.
        let outcome = sem_pend_with_manual_tick(&sem, &sched, waiter, 2);
        result.set(Some(outcome));
        assert_eq!(result.get(), Some(-1));
    }

    fn sem_pend_with_manual_tick(
        sem: &Semaphore,
        sched: &Scheduler,
        id: ThreadId,
        timeout: Ticks,
    ) -> i32 {
        // Mirrors `pend` but interleaves `tick()` calls since this test has
        // no second OS thread to advance time concurrently.
        {
            let mut state = sem.state.lock();
            if state.count > 0 {
                state.count -= 1;
                return 0;
            }
            state.waiters.push_back(id);
        }
        sched.block(id);
        sched.arm_timeout(id, sched.now().wrapping_add(timeout));
        for _ in 0..timeout + 1 {
            sched.tick();
        }
        if sched.take_timed_out(id) {
            let mut state = sem.state.lock();
            state.waiters.retain(|&w| w != id);
            -1
        } else {
            0
        }
    }
}
