//! Network driver trait and its implementations.
//!
//! Grounded in the teacher crate's `drivers::net::NetworkInterface`
//! trait: a small synchronous surface (`get_mac_address`/`get_mtu`/
//! send/receive) that higher layers poll rather than block on. Kept the
//! same shape here; the two methods the stack actually drives —
//! [`NetworkInterface::transmit`] and [`NetworkInterface::try_receive`] —
//! replace the teacher's buffer-token dance with plain byte slices,
//! since this board has no DMA ring to hand ownership through.

pub mod ethernet_mac;
pub mod loopback;

use alloc::vec::Vec;

use crate::error::KernelError;

/// A board's Ethernet MAC device, as the stack sees it.
pub trait NetworkInterface: Sync + Send {
    fn mac_address(&self) -> [u8; 6];
    fn mtu(&self) -> u16;
    /// Hands a fully-framed (already nibble-swapped, CRC-trailed for a
    /// real MAC; verbatim for a test double) buffer to the device.
    fn transmit(&self, frame: &[u8]) -> Result<(), KernelError>;
    /// Non-blocking poll for one received frame, decoded and
    /// CRC-verified, or `None` if the ring has nothing new.
    fn try_receive(&self) -> Option<Vec<u8>>;
}
