//! Synchronization primitives built on the scheduler's block/wake
//! bookkeeping: a counting semaphore, a recursive mutex built on top of it,
//! and a fixed-size message queue.

pub mod mqueue;
pub mod mutex;
pub mod semaphore;

use alloc::collections::VecDeque;

use crate::sched::task::ThreadId;
use crate::sched::Scheduler;

/// Inserts `id` into `waiters` ordered by descending thread priority, FIFO
/// among equal priorities (insert after the last waiter of the same or
/// higher priority). Shared by [`semaphore::Semaphore`] and
/// [`mqueue::MQueue`] so every blocking primitive built on the scheduler
/// wakes its highest-priority waiter first, not just the one built on top
/// of the other.
pub(crate) fn priority_insert(waiters: &mut VecDeque<ThreadId>, sched: &Scheduler, id: ThreadId) {
    let priority = sched.priority_of(id).ok();
    let position = waiters
        .iter()
        .position(|&w| sched.priority_of(w).ok() < priority)
        .unwrap_or(waiters.len());
    waiters.insert(position, id);
}
