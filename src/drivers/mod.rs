//! Driver layer: the seam between the portable stack above and the
//! board-specific hardware below.
//!
//! Mirrors the teacher crate's `drivers` module shape (a `net`
//! submodule holding the `NetworkInterface` trait and its
//! implementations) without the PCI/virtio machinery this board has no
//! use for.

pub mod mmio;
pub mod net;
