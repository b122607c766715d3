//! The TCP/IP stack: wire formats, checksums, frame pool, sockets, and
//! the per-protocol handlers tied together by [`dispatch::Stack`].
//!
//! Grounded end to end in `original_source/trunk/kernel/tcpip.c` and
//! `ethernet.c`; see each submodule's doc comment for the specific
//! functions it replaces.

pub mod arp;
pub mod checksum;
pub mod crc;
pub mod dhcp;
pub mod dispatch;
pub mod dns;
pub mod frame;
pub mod icmp;
pub mod ip;
pub mod mac;
pub mod socket;
pub mod tcp;
pub mod udp;
pub mod wire;

pub use dispatch::Stack;
