//! A memory-only `NetworkInterface` for tests: every transmitted frame
//! is simply recorded, and can be fed back in as a received frame.
//!
//! Grounded in the teacher crate's `LoopbackDriver` (`drivers/net/`):
//! same "queue of buffers, pop on receive" shape, minus the DMA
//! allocator and interrupt-line plumbing this board doesn't need for a
//! host-side test double.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use hermit_sync::InterruptTicketMutex;

use crate::drivers::net::NetworkInterface;
use crate::error::KernelError;

pub struct Loopback {
    sent: InterruptTicketMutex<VecDeque<Vec<u8>>>,
    inbound: InterruptTicketMutex<VecDeque<Vec<u8>>>,
}

impl Loopback {
    pub fn new() -> Self {
        Self { sent: InterruptTicketMutex::new(VecDeque::new()), inbound: InterruptTicketMutex::new(VecDeque::new()) }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn last_sent(&self) -> Option<Vec<u8>> {
        self.sent.lock().back().cloned()
    }

    pub fn take_sent(&self) -> Option<Vec<u8>> {
        self.sent.lock().pop_front()
    }

    /// Queues a frame as if it had just arrived over the wire.
    pub fn inject(&self, frame: Vec<u8>) {
        self.inbound.lock().push_back(frame);
    }
}

impl Default for Loopback {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkInterface for Loopback {
    fn mac_address(&self) -> [u8; 6] {
        [0; 6]
    }

    fn mtu(&self) -> u16 {
        u16::MAX
    }

    fn transmit(&self, frame: &[u8]) -> Result<(), KernelError> {
        self.sent.lock().push_back(frame.to_vec());
        Ok(())
    }

    fn try_receive(&self) -> Option<Vec<u8>> {
        self.inbound.lock().pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transmitted_frames_are_recorded_in_order() {
        let iface = Loopback::new();
        iface.transmit(&[1, 2, 3]).unwrap();
        iface.transmit(&[4, 5]).unwrap();
        assert_eq!(iface.sent_count(), 2);
        assert_eq!(iface.take_sent(), Some(alloc::vec![1, 2, 3]));
    }

    #[test]
    fn injected_frames_are_received_fifo() {
        let iface = Loopback::new();
        iface.inject(alloc::vec![9, 9]);
        assert_eq!(iface.try_receive(), Some(alloc::vec![9, 9]));
        assert_eq!(iface.try_receive(), None);
    }
}
