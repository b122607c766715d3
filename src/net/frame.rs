//! The fixed-size pool of packet buffers every layer of the stack borrows
//! from, with backpressure reserves so one direction of traffic can never
//! starve another.
//!
//! Grounded in `IPFrameGet`/`FrameFree`/`FrameInsert`/`FrameRemove` from
//! `original_source/trunk/kernel/tcpip.c`: `FRAME_COUNT` frames allocated
//! once, handed out by `IPFrameGet(reserve)` which refuses once fewer than
//! `reserve` frames remain free (tcpip.c:219), and linked onto a handful of
//! named lists (free, send, resend, read-queue, window) by index rather
//! than by pointer.

use alloc::vec::Vec;

use hermit_sync::InterruptTicketMutex;

use crate::config::{Ticks, FRAME_COUNT, PACKET_SIZE};
use crate::net::socket::SocketId;

#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy, Hash)]
pub struct FrameId(pub u32);

pub struct Frame {
    pub data: [u8; PACKET_SIZE],
    pub len: usize,
    /// Tick the frame was last (re)transmitted, for `RETRANSMIT_TIME`
    /// aging (spec.md §4.7).
    pub sent_at: Option<Ticks>,
    pub retries: u32,
    /// Owning socket for a frame awaiting cumulative ACK, and the
    /// sequence number that ACK must reach before the frame can be
    /// freed (`frame->socket`/`frame->seqEnd`).
    pub socket: Option<SocketId>,
    pub seq_end: u32,
}

impl Frame {
    fn empty() -> Self {
        Self { data: [0; PACKET_SIZE], len: 0, sent_at: None, retries: 0, socket: None, seq_end: 0 }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn fill(&mut self, bytes: &[u8]) {
        self.len = bytes.len().min(PACKET_SIZE);
        self.data[..self.len].copy_from_slice(&bytes[..self.len]);
        self.sent_at = None;
        self.retries = 0;
        self.socket = None;
        self.seq_end = 0;
    }
}

struct Inner {
    frames: Vec<Frame>,
    free: Vec<FrameId>,
}

/// Owns all `FRAME_COUNT` frame buffers. Checked out with [`FramePool::get`]
/// and returned with [`FramePool::free`]; nothing else allocates from the
/// heap once `FramePool::new` has run.
pub struct FramePool {
    inner: InterruptTicketMutex<Inner>,
}

impl FramePool {
    pub fn new() -> Self {
        let mut frames = Vec::with_capacity(FRAME_COUNT);
        let mut free = Vec::with_capacity(FRAME_COUNT);
        for i in 0..FRAME_COUNT {
            frames.push(Frame::empty());
            free.push(FrameId(i as u32));
        }
        Self { inner: InterruptTicketMutex::new(Inner { frames, free }) }
    }

    /// The literal `IPFrameGet(freeCount)`: refuses to hand out a frame if
    /// doing so would drop the free count below `reserve`.
    pub fn get(&self, reserve: usize) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        if inner.free.len() <= reserve {
            return None;
        }
        inner.free.pop()
    }

    pub fn free(&self, id: FrameId) {
        let mut inner = self.inner.lock();
        inner.frames[id.0 as usize] = Frame::empty();
        inner.free.push(id);
    }

    pub fn with<R>(&self, id: FrameId, f: impl FnOnce(&Frame) -> R) -> R {
        let inner = self.inner.lock();
        f(&inner.frames[id.0 as usize])
    }

    pub fn with_mut<R>(&self, id: FrameId, f: impl FnOnce(&mut Frame) -> R) -> R {
        let mut inner = self.inner.lock();
        f(&mut inner.frames[id.0 as usize])
    }

    pub fn free_count(&self) -> usize {
        self.inner.lock().free.len()
    }
}

impl Default for FramePool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FRAME_COUNT_RCV, FRAME_COUNT_SEND};

    #[test]
    fn reserve_blocks_exhaustion() {
        let pool = FramePool::new();
        let mut held = alloc::vec::Vec::new();
        while let Some(id) = pool.get(FRAME_COUNT_SEND) {
            held.push(id);
        }
        assert_eq!(pool.free_count(), FRAME_COUNT_SEND);
        assert!(pool.get(FRAME_COUNT_SEND).is_none());
        // A caller willing to dip into the send reserve (e.g. an ACK that
        // must go out) can still get one as long as it respects the
        // smaller rcv reserve.
        assert!(pool.get(FRAME_COUNT_RCV).is_some());
    }

    #[test]
    fn freed_frame_is_reused() {
        let pool = FramePool::new();
        let id = pool.get(0).unwrap();
        pool.with_mut(id, |f| f.fill(b"hello"));
        pool.free(id);
        let id2 = pool.get(0).unwrap();
        pool.with(id2, |f| assert_eq!(f.len, 0));
    }
}
