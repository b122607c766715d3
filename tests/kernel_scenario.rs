//! Exercises `Kernel` itself rather than any one subsystem: the heap gets
//! registered, the idle thread gets created, a thread can be spawned and
//! scheduled, and a tick drives the net stack's retransmit/DHCP sweep
//! without panicking. Per-subsystem behavior (scheduler ordering,
//! semaphore timeouts, TCP/DHCP state machines) has its own dedicated
//! coverage; this is the wiring those pieces are assembled by.
//!
//! Run with `cargo test --features sim`.

use rtos_kernel::config::KernelConfig;
use rtos_kernel::drivers::net::loopback::Loopback;
use rtos_kernel::sched::task::NORMAL_PRIO;
use rtos_kernel::Kernel;

fn boot() -> Kernel {
    let kernel = Kernel::new(KernelConfig::default());
    let heap: &'static mut [u8] = Box::leak(vec![0u8; 1 << 16].into_boxed_slice());
    unsafe {
        kernel.init(heap);
    }
    kernel
}

#[test]
fn spawned_thread_is_scheduled_ahead_of_idle() {
    let kernel = boot();
    let worker = kernel.spawn("worker", NORMAL_PRIO, |_| {}, 0);
    assert_eq!(kernel.scheduler.reschedule(false), worker);
}

#[test]
fn frame_pool_starts_fully_free() {
    let kernel = boot();
    assert_eq!(kernel.net.frames.free_count(), rtos_kernel::config::FRAME_COUNT);
}

#[test]
fn tick_drains_net_stack_without_a_bound_interface() {
    let kernel = boot();
    let iface = Loopback::new();
    for t in 0..5 {
        let _ = t;
        kernel.tick(&iface);
    }
    // A clean boot with nothing else going on should have broadcast
    // exactly one DHCP DISCOVER by now and nothing else.
    assert!(iface.sent_count() >= 1);
}
