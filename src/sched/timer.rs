//! Timer service: a dedicated thread that delivers one-shot and periodic
//! timer expirations as messages.
//!
//! Grounded in `OS_TimerThread`/`OS_TimerCreate`/`OS_TimerStart`/
//! `OS_TimerStop` from `original_source/trunk/kernel/rtos.c`: a sorted list
//! of armed timers, a thread that sleeps until the nearest deadline, and on
//! wake posts a 3-word `{TIMER, handle, info}` message before re-arming
//! periodic timers.

use alloc::vec::Vec;

use hermit_sync::InterruptTicketMutex;

use crate::config::Ticks;
use crate::sched::Scheduler;
use crate::sync::mqueue::MQueue;

#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy)]
pub struct TimerId(pub u32);

/// The message delivered when a timer fires, matching the original's
/// `{TIMER, handle, info}` three-word wire shape.
#[derive(Debug, Clone, Copy)]
pub struct TimerMessage {
    pub handle: TimerId,
    pub info: u32,
}

struct ArmedTimer {
    id: TimerId,
    deadline: Ticks,
    period: Option<Ticks>,
    info: u32,
}

/// Tracks every armed timer and which queue to post expirations into.
pub struct TimerService {
    next_id: InterruptTicketMutex<u32>,
    timers: InterruptTicketMutex<Vec<ArmedTimer>>,
}

impl TimerService {
    pub fn new() -> Self {
        Self {
            next_id: InterruptTicketMutex::new(0),
            timers: InterruptTicketMutex::new(Vec::new()),
        }
    }

    /// Arms a new timer. `period` of `None` makes it one-shot.
    pub fn create(&self, now: Ticks, delay: Ticks, period: Option<Ticks>, info: u32) -> TimerId {
        let mut next_id = self.next_id.lock();
        let id = TimerId(*next_id);
        *next_id += 1;
        drop(next_id);

        let deadline = now.wrapping_add(delay);
        self.timers.lock().push(ArmedTimer { id, deadline, period, info });
        id
    }

    pub fn stop(&self, id: TimerId) {
        self.timers.lock().retain(|t| t.id != id);
    }

    /// How many ticks until the next deadline, so the caller can sleep
    /// instead of busy-polling (`OS_TimerThread`'s `OS_ThreadSleep` call).
    pub fn ticks_until_next(&self, now: Ticks) -> Option<Ticks> {
        let timers = self.timers.lock();
        timers.iter().map(|t| t.deadline.wrapping_sub(now)).min()
    }

    /// Delivers every timer due at or before `now` into `queue`, re-arming
    /// periodic ones.
    pub fn fire_due(&self, sched: &Scheduler, now: Ticks, queue: &MQueue<TimerMessage>) {
        let mut timers = self.timers.lock();
        let mut still_armed = Vec::with_capacity(timers.len());
        for mut t in timers.drain(..) {
            if t.deadline <= now {
                let _ = queue.send(sched, TimerMessage { handle: t.id, info: t.info });
                if let Some(period) = t.period {
                    t.deadline = now.wrapping_add(period);
                    still_armed.push(t);
                }
            } else {
                still_armed.push(t);
            }
        }
        *timers = still_armed;
    }
}

impl Default for TimerService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_fires_once() {
        let sched = Scheduler::new();
        sched.init_idle();
        let svc = TimerService::new();
        let q = MQueue::new(4);
        svc.create(0, 5, None, 42);
        svc.fire_due(&sched, 4, &q);
        assert!(q.try_get().is_none());
        svc.fire_due(&sched, 5, &q);
        let msg = q.try_get().unwrap();
        assert_eq!(msg.info, 42);
        svc.fire_due(&sched, 10, &q);
        assert!(q.try_get().is_none());
    }

    #[test]
    fn periodic_rearms() {
        let sched = Scheduler::new();
        sched.init_idle();
        let svc = TimerService::new();
        let q = MQueue::new(4);
        svc.create(0, 5, Some(5), 1);
        svc.fire_due(&sched, 5, &q);
        assert!(q.try_get().is_some());
        svc.fire_due(&sched, 10, &q);
        assert!(q.try_get().is_some());
    }
}
