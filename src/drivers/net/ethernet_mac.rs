//! The board's Ethernet MAC device: a receive ring, a transmit buffer,
//! and a handful of control/status/PHY registers, all reached through
//! [`Mmio`].
//!
//! Grounded in spec.md §6 "Ethernet-facing MMIO": receive ring base,
//! transmit buffer base, a control register (write
//! `length_in_words + 4` to kick a transmit), an interrupt status/mask
//! register pair, and SMI-over-GPIO for the PHY — configured once at
//! init for 10 Mb/s full duplex via the fixed word `PHY_SMI_10MB_FULL_DUPLEX`.
//! Frame encode/decode itself is [`crate::net::mac`]'s job; this module
//! only knows where the bytes live on the bus.

use alloc::vec::Vec;

use hermit_sync::InterruptTicketMutex;

use crate::config::{PHY_SMI_10MB_FULL_DUPLEX, RECEIVE_RING_SIZE};
use crate::drivers::mmio::Mmio;
use crate::drivers::net::NetworkInterface;
use crate::error::KernelError;
use crate::net::mac::{frame_for_transmit, MacReceiver};

const REG_CONTROL: usize = RECEIVE_RING_SIZE;
const REG_INT_STATUS: usize = REG_CONTROL + 4;
const REG_INT_MASK: usize = REG_CONTROL + 8;
const REG_SMI: usize = REG_CONTROL + 12;
const TRANSMIT_BUFFER_OFFSET: usize = REG_CONTROL + 16;

const INT_RX_PENDING: u32 = 1 << 0;
const INT_TX_COMPLETE: u32 = 1 << 1;

pub struct EthernetMac<M: Mmio> {
    bus: M,
    own_mac: [u8; 6],
    ring: InterruptTicketMutex<(Vec<u8>, usize)>,
    receiver: InterruptTicketMutex<MacReceiver>,
}

impl<M: Mmio> EthernetMac<M> {
    pub fn init(bus: M, own_mac: [u8; 6]) -> Self {
        bus.write32(REG_SMI, PHY_SMI_10MB_FULL_DUPLEX);
        bus.write32(REG_INT_MASK, INT_RX_PENDING | INT_TX_COMPLETE);
        let mut ring = alloc::vec![crate::config::RING_SENTINEL; RECEIVE_RING_SIZE];
        bus.read_bytes(0, &mut ring);
        Self {
            bus,
            own_mac,
            ring: InterruptTicketMutex::new((ring, 0)),
            receiver: InterruptTicketMutex::new(MacReceiver::new()),
        }
    }

    /// Refreshes the software copy of the receive ring from the bus and
    /// runs the frame-start/CRC scan over it. Called from the Ethernet
    /// ISR's bottom half (spec.md §4.1/§5).
    pub fn poll_receive(&self) -> Option<Vec<u8>> {
        let mut guard = self.ring.lock();
        let (ring, read_ptr) = &mut *guard;
        self.bus.read_bytes(0, ring);
        let mut receiver = self.receiver.lock();
        let frame = receiver.try_receive(ring, read_ptr, self.own_mac);
        if frame.is_some() {
            self.bus.write_bytes(0, ring);
        }
        frame
    }
}

impl<M: Mmio> NetworkInterface for EthernetMac<M> {
    fn mac_address(&self) -> [u8; 6] {
        self.own_mac
    }

    fn mtu(&self) -> u16 {
        crate::config::PACKET_SIZE as u16
    }

    fn transmit(&self, frame: &[u8]) -> Result<(), KernelError> {
        if self.bus.read32(REG_CONTROL) != 0 {
            return Err(KernelError::DeviceBusy);
        }
        let dest = crate::net::wire::read_mac(frame, crate::net::wire::ETHERNET_DEST);
        let wire = frame_for_transmit(dest, &frame[crate::net::wire::ETHERNET_SOURCE..]);
        self.bus.write_bytes(TRANSMIT_BUFFER_OFFSET, &wire);
        let length_in_words = (wire.len() as u32 + 3) / 4;
        self.bus.write32(REG_CONTROL, length_in_words + 4);
        Ok(())
    }

    fn try_receive(&self) -> Option<Vec<u8>> {
        if self.bus.read32(REG_INT_STATUS) & INT_RX_PENDING == 0 {
            return None;
        }
        let frame = self.poll_receive();
        self.bus.write32(REG_INT_STATUS, INT_RX_PENDING);
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::mmio::SimBus;

    #[test]
    fn transmit_kicks_the_control_register() {
        let bus = SimBus::new(TRANSMIT_BUFFER_OFFSET + 2048);
        let mac = EthernetMac::init(bus, [0x00, 0x10, 0xdd, 0xce, 0x15, 0xd4]);
        let mut frame = alloc::vec![0u8; 60];
        frame[0..6].copy_from_slice(&[0xff; 6]);
        mac.transmit(&frame).unwrap();
        assert!(mac.bus.read32(REG_CONTROL) > 0);
    }
}
