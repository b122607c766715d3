//! Fixed-size message queue.
//!
//! Grounded in `OS_MQueueCreate`/`OS_MQueueSend`/`OS_MQueueGet` from
//! `original_source/trunk/kernel/rtos.c`: a ring buffer of a fixed
//! capacity, non-blocking send (refuses when full, since the sender is
//! often an ISR that must never block), blocking get with the same
//! wait/timeout shape as [`Semaphore::pend`](crate::sync::semaphore::Semaphore::pend).
//! The waiter list is kept sorted by thread priority, same as the
//! semaphore it is built alongside.

use alloc::collections::VecDeque;

use hermit_sync::InterruptTicketMutex;

use crate::arch;
use crate::config::Ticks;
use crate::sched::task::ThreadId;
use crate::sched::Scheduler;
use crate::sync::priority_insert;

struct QueueState<T> {
    ring: VecDeque<T>,
    capacity: usize,
    waiters: VecDeque<ThreadId>,
}

pub struct MQueue<T> {
    state: InterruptTicketMutex<QueueState<T>>,
}

impl<T> MQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: InterruptTicketMutex::new(QueueState {
                ring: VecDeque::with_capacity(capacity),
                capacity,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Non-blocking send. Returns `false` if the queue is full.
    pub fn send(&self, sched: &Scheduler, msg: T) -> bool {
        let woken = {
            let mut state = self.state.lock();
            if state.ring.len() >= state.capacity {
                return false;
            }
            state.ring.push_back(msg);
            state.waiters.pop_front()
        };
        if let Some(id) = woken {
            sched.wake(id);
        }
        true
    }

    /// Non-blocking receive.
    pub fn try_get(&self) -> Option<T> {
        self.state.lock().ring.pop_front()
    }

    /// Blocking receive. Returns `None` on timeout.
    pub fn get(&self, sched: &Scheduler, id: ThreadId, timeout: Option<Ticks>) -> Option<T> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(msg) = state.ring.pop_front() {
                    return Some(msg);
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
                return None;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_refuses_when_full() {
        let sched = Scheduler::new();
        sched.init_idle();
        let q: MQueue<u32> = MQueue::new(2);
        assert!(q.send(&sched, 1));
        assert!(q.send(&sched, 2));
        assert!(!q.send(&sched, 3));
    }

    #[test]
    fn fifo_order() {
        let sched = Scheduler::new();
        sched.init_idle();
        let q: MQueue<u32> = MQueue::new(4);
        q.send(&sched, 1);
        q.send(&sched, 2);
        assert_eq!(q.try_get(), Some(1));
        assert_eq!(q.try_get(), Some(2));
        assert_eq!(q.try_get(), None);
    }
}
