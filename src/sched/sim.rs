//! Gives a thread created under the hosted `sim` backend somewhere real to
//! run its entry function: one OS thread per kernel thread, parked on the
//! scheduler's [`RunGate`](crate::arch::context::sim::RunGate) until
//! `Scheduler::reschedule` names it as the one thread allowed to execute.
//! A condition variable gating "only one runnable at a time" stands in for
//! a real register-level context switch on a hosted target.

use alloc::sync::Arc;

use crate::arch::context::sim::RunGate;
use crate::sched::task::ThreadEntry;

pub struct SimThreadHandle {
    join: Option<std::thread::JoinHandle<()>>,
}

impl SimThreadHandle {
    /// Spawns the OS thread backing kernel thread `id`. It blocks on `gate`
    /// immediately and only calls `entry` once `id` is resumed.
    pub(crate) fn spawn(id: u64, gate: Arc<RunGate>, entry: ThreadEntry, arg: usize) -> Self {
        let join = std::thread::Builder::new()
            .name(alloc::format!("kthread-{id}"))
            .spawn(move || {
                gate.park_until_turn(id);
                entry(arg);
            })
            .expect("failed to spawn simulated kernel thread");
        Self { join: Some(join) }
    }
}

impl Drop for SimThreadHandle {
    fn drop(&mut self) {
        // The OS thread may still be parked waiting for a turn that will
        // never come (the kernel thread was reaped without ever running
        // again); detach rather than block the reaper on `join`.
        self.join.take();
    }
}
