//! Per-connection socket state and the global socket table.
//!
//! Grounded in `IPOpen`/`IPWrite`/`IPWriteFlush`/`IPRead`/`IPClose`/
//! `IPClose2` from `original_source/trunk/kernel/tcpip.c`. The original's
//! doubly-linked `SocketHead` list and `malloc`'d `IPSocket` become an
//! arena (`SocketId` is an index, same shape as [`FramePool`]); the two
//! 34-byte `headerSend`/`headerRcv` templates are kept verbatim as raw
//! byte buffers indexed via `net::wire`'s offset constants, since they
//! exist purely so a reply can be stamped out by `memcpy`-ing a template
//! and patching a handful of fields — reproducing that with typed header
//! structs would cost an allocation and a serialize pass on every packet.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use hermit_sync::InterruptTicketMutex;

use crate::config::Ticks;
use crate::error::{KernelError, KernelResult};
use crate::net::frame::{FrameId, FramePool};
use crate::net::wire::*;

pub const HEADER_TEMPLATE_LEN: usize = 34;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Listen,
    Tcp,
    Udp,
    FinClient,
    FinServer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Tcp,
    Udp,
}

#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy, Hash)]
pub struct SocketId(pub u32);

/// One TCP connection or UDP endpoint. Mirrors `IPSocket` field for
/// field, minus the intrusive list pointers (the arena replaces those).
pub struct IpSocket {
    pub state: SocketState,
    pub kind: SocketKind,
    /// Template stamped onto every outgoing packet on this socket, then
    /// patched (flags, seq/ack, lengths, checksum) per send.
    pub header_send: [u8; HEADER_TEMPLATE_LEN],
    /// Template an inbound packet is matched against (source/dest IP and
    /// port already filled in at `open`).
    pub header_rcv: [u8; HEADER_TEMPLATE_LEN],
    pub seq: u32,
    pub ack: u32,
    /// Highest ack number seen from the peer; resend-list pruning drains
    /// frames with `seq_end <= seq_received`.
    pub seq_received: u32,
    pub read_queue: VecDeque<FrameId>,
    pub read_offset: usize,
    pub send_frame: Option<FrameId>,
    pub send_offset: usize,
    pub timeout: Ticks,
    pub user_data: usize,
}

impl IpSocket {
    fn listen(dest_port: u16) -> Self {
        let mut header_rcv = [0u8; HEADER_TEMPLATE_LEN];
        write_u16(&mut header_rcv, TCP_DEST_PORT, dest_port);
        Self {
            state: SocketState::Listen,
            kind: SocketKind::Tcp,
            header_send: [0u8; HEADER_TEMPLATE_LEN],
            header_rcv,
            seq: 0,
            ack: 0,
            seq_received: 0,
            read_queue: VecDeque::new(),
            read_offset: 0,
            send_frame: None,
            send_offset: 0,
            timeout: 0,
            user_data: 0,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn connect(
        kind: SocketKind,
        own_mac: [u8; 6],
        own_ip: [u8; 4],
        gateway_mac: [u8; 6],
        dest_ip: [u8; 4],
        dest_port: u16,
        source_port: u16,
    ) -> Self {
        let mut send = [0u8; HEADER_TEMPLATE_LEN];
        let mut rcv = [0u8; HEADER_TEMPLATE_LEN];

        write_mac(&mut send, ETHERNET_DEST, gateway_mac);
        write_mac(&mut send, ETHERNET_SOURCE, own_mac);
        send[ETHERNET_FRAME_TYPE] = 0x08;

        send[IP_VERSION_LENGTH] = 0x45;
        send[IP_TIME_TO_LIVE] = 0x80;
        write_ipv4(&mut send, IP_SOURCE, own_ip);
        write_ipv4(&mut send, IP_DEST, dest_ip);
        write_ipv4(&mut rcv, IP_SOURCE, dest_ip);
        write_ipv4(&mut rcv, IP_DEST, own_ip);

        write_u16(&mut send, TCP_SOURCE_PORT, source_port);
        write_u16(&mut send, TCP_DEST_PORT, dest_port);
        write_u16(&mut rcv, TCP_SOURCE_PORT, dest_port);
        write_u16(&mut rcv, TCP_DEST_PORT, source_port);

        let protocol = match kind {
            SocketKind::Tcp => IP_PROTO_TCP,
            SocketKind::Udp => IP_PROTO_UDP,
        };
        send[IP_PROTOCOL] = protocol;
        rcv[IP_PROTOCOL] = protocol;

        Self {
            state: match kind {
                SocketKind::Tcp => SocketState::Tcp,
                SocketKind::Udp => SocketState::Udp,
            },
            kind,
            header_send: send,
            header_rcv: rcv,
            seq: 0,
            ack: 0,
            seq_received: 0,
            read_queue: VecDeque::new(),
            read_offset: 0,
            send_frame: None,
            send_offset: 0,
            timeout: 0,
            user_data: 0,
        }
    }

    fn data_offset(&self) -> usize {
        match self.kind {
            SocketKind::Tcp => TCP_DATA,
            SocketKind::Udp => UDP_DATA,
        }
    }
}

struct Inner {
    sockets: Vec<Option<IpSocket>>,
    free: Vec<u32>,
    next_source_port: u16,
}

/// Owns every live socket. One instance lives inside `Kernel`; all
/// mutation happens under the single lock, mirroring the original's one
/// `IPMutex` serializing the whole socket/frame-list layer (spec.md §5).
pub struct SocketTable {
    inner: InterruptTicketMutex<Inner>,
}

impl SocketTable {
    pub fn new() -> Self {
        Self {
            inner: InterruptTicketMutex::new(Inner {
                sockets: Vec::new(),
                free: Vec::new(),
                next_source_port: 0x1007,
            }),
        }
    }

    fn insert(&self, socket: IpSocket) -> SocketId {
        let mut inner = self.inner.lock();
        if let Some(raw) = inner.free.pop() {
            inner.sockets[raw as usize] = Some(socket);
            SocketId(raw)
        } else {
            let raw = inner.sockets.len() as u32;
            inner.sockets.push(Some(socket));
            SocketId(raw)
        }
    }

    /// `IPOpen(IP_MODE_TCP, 0, port, ...)`: opens a listening socket.
    pub fn listen(&self, port: u16) -> SocketId {
        self.insert(IpSocket::listen(port))
    }

    /// `IPOpen` with a non-zero destination address: opens an outbound
    /// TCP or UDP socket and returns the next ephemeral source port to
    /// use for it alongside its id.
    pub fn connect(
        &self,
        kind: SocketKind,
        own_mac: [u8; 6],
        own_ip: [u8; 4],
        gateway_mac: [u8; 6],
        dest_ip: [u8; 4],
        dest_port: u16,
    ) -> (SocketId, u16) {
        let source_port = {
            let mut inner = self.inner.lock();
            let port = inner.next_source_port;
            inner.next_source_port = inner.next_source_port.wrapping_add(1);
            port
        };
        let socket = IpSocket::connect(kind, own_mac, own_ip, gateway_mac, dest_ip, dest_port, source_port);
        (self.insert(socket), source_port)
    }

    /// Accepts a new connection off a listening socket: clones its
    /// receive template (`memcpy(socketNew, socket, sizeof(IPSocket))` in
    /// the original), then patches in the peer's address.
    pub fn accept(&self, listener: SocketId, peer_mac: [u8; 6], peer_ip: [u8; 4], peer_port: u16, own_mac: [u8; 6], own_ip: [u8; 4]) -> KernelResult<SocketId> {
        let dest_port = {
            let inner = self.inner.lock();
            let listener = inner.sockets[listener.0 as usize].as_ref().ok_or(KernelError::InvalidArgument)?;
            read_u16(&listener.header_rcv, TCP_DEST_PORT)
        };
        let mut socket = IpSocket::connect(SocketKind::Tcp, own_mac, own_ip, peer_mac, peer_ip, peer_port, dest_port);
        socket.state = SocketState::Tcp;
        Ok(self.insert(socket))
    }

    pub fn with<R>(&self, id: SocketId, f: impl FnOnce(&IpSocket) -> R) -> KernelResult<R> {
        let inner = self.inner.lock();
        inner.sockets[id.0 as usize].as_ref().map(f).ok_or(KernelError::SocketClosed)
    }

    pub fn with_mut<R>(&self, id: SocketId, f: impl FnOnce(&mut IpSocket) -> R) -> KernelResult<R> {
        let mut inner = self.inner.lock();
        inner.sockets[id.0 as usize].as_mut().map(f).ok_or(KernelError::SocketClosed)
    }

    /// Iterates every live socket id; used by the dispatcher's 5-tuple
    /// lookup and by `IPTick`'s idle-timeout sweep.
    pub fn for_each(&self, mut f: impl FnMut(SocketId, &IpSocket)) {
        let inner = self.inner.lock();
        for (i, slot) in inner.sockets.iter().enumerate() {
            if let Some(socket) = slot {
                f(SocketId(i as u32), socket);
            }
        }
    }

    /// `IPClose2`: drops the socket from the table. Frames already queued
    /// on it (read queue, in-flight send/resend) are the caller's
    /// responsibility to unwind first via [`FramePool::free`] — this
    /// mirrors the original where `IPClose2` itself walks those lists,
    /// but keeping frame-pool access out of `SocketTable` avoids the two
    /// modules needing a reference to each other for every socket op.
    pub fn remove(&self, id: SocketId, frames: &FramePool) {
        let mut inner = self.inner.lock();
        if let Some(mut socket) = inner.sockets[id.0 as usize].take() {
            for frame_id in socket.read_queue.drain(..) {
                frames.free(frame_id);
            }
            if let Some(frame_id) = socket.send_frame.take() {
                frames.free(frame_id);
            }
        }
        inner.free.push(id.0);
    }

    /// `IPWrite`: accumulates bytes into an in-progress send frame,
    /// flushing at `TCP_SEGMENT_SIZE` bytes for TCP, or immediately for
    /// UDP. Returns the number of bytes actually accepted; a caller that
    /// gets back less than `buf.len()` loops with a short sleep
    /// (`IPWritePend`'s contract), since the frame pool may be exhausted.
    pub fn write(&self, id: SocketId, frames: &FramePool, buf: &[u8]) -> KernelResult<usize> {
        use crate::config::{FRAME_COUNT_SEND, TCP_SEGMENT_SIZE};

        let mut accepted = 0;
        while accepted < buf.len() {
            let is_udp = self.with(id, |s| s.kind == SocketKind::Udp)?;

            let frame_id = {
                let existing = self.with(id, |s| s.send_frame)?;
                match existing {
                    Some(f) => f,
                    None => match frames.get(FRAME_COUNT_SEND) {
                        Some(f) => {
                            self.with_mut(id, |s| {
                                s.send_frame = Some(f);
                                s.send_offset = 0;
                            })?;
                            f
                        }
                        None => break,
                    },
                }
            };

            let offset = self.with(id, |s| s.send_offset)?;
            let data_offset = self.with(id, |s| s.data_offset())?;
            let remaining = buf.len() - accepted;
            let room = TCP_SEGMENT_SIZE - offset;
            let chunk = remaining.min(room);

            frames.with_mut(frame_id, |frame| {
                frame.data[data_offset + offset..data_offset + offset + chunk]
                    .copy_from_slice(&buf[accepted..accepted + chunk]);
            });
            accepted += chunk;
            self.with_mut(id, |s| s.send_offset += chunk)?;

            if is_udp {
                let (header, len) = self.with(id, |s| (s.header_send, data_offset + s.send_offset))?;
                frames.with_mut(frame_id, |frame| {
                    frame.data[..UDP_LENGTH].copy_from_slice(&header[..UDP_LENGTH]);
                    frame.len = len;
                });
                self.with_mut(id, |s| {
                    s.send_frame = None;
                    s.send_offset = 0;
                })?;
            } else if offset + chunk >= TCP_SEGMENT_SIZE {
                self.flush(id, frames)?;
            }
        }
        Ok(accepted)
    }

    /// `IPWriteFlush`: forces out whatever's accumulated in the
    /// in-progress TCP send frame, even below `TCP_SEGMENT_SIZE` bytes.
    /// Returns the completed frame (with ACK set) for the caller to hand
    /// to `net::socket`'s sender, or `None` if there was nothing pending.
    pub fn flush(&self, id: SocketId, frames: &FramePool) -> KernelResult<Option<FrameId>> {
        let frame_id = self.with_mut(id, |s| {
            if s.kind == SocketKind::Udp {
                return None;
            }
            s.send_frame.take()
        })?;
        let Some(frame_id) = frame_id else { return Ok(None) };

        let (header, send_offset, seq) = self.with(id, |s| (s.header_send, s.send_offset, s.seq))?;
        frames.with_mut(frame_id, |frame| {
            frame.data[..TCP_SEQ].copy_from_slice(&header[..TCP_SEQ]);
            frame.data[TCP_FLAGS] = TCP_FLAGS_ACK;
            write_u32(&mut frame.data, TCP_SEQ, seq);
            frame.len = TCP_DATA + send_offset;
        });
        self.with_mut(id, |s| {
            s.seq = s.seq.wrapping_add(send_offset as u32);
            s.send_offset = 0;
        })?;
        Ok(Some(frame_id))
    }

    /// `IPRead`: copies buffered payload bytes out of the socket's read
    /// queue, freeing frames as they're fully drained.
    pub fn read(&self, id: SocketId, frames: &FramePool, buf: &mut [u8]) -> KernelResult<usize> {
        let mut count = 0;
        let data_offset = self.with(id, |s| s.data_offset())?;
        while count < buf.len() {
            let Some(front) = self.with(id, |s| s.read_queue.front().copied())? else { break };
            let read_offset = self.with(id, |s| s.read_offset)?;
            let (len, bytes_available) =
                frames.with(front, |frame| (frame.len, frame.len.saturating_sub(data_offset + read_offset)));
            if bytes_available == 0 {
                self.with_mut(id, |s| {
                    s.read_queue.pop_front();
                    s.read_offset = 0;
                })?;
                frames.free(front);
                continue;
            }
            let chunk = (buf.len() - count).min(bytes_available);
            frames.with(front, |frame| {
                buf[count..count + chunk]
                    .copy_from_slice(&frame.data[data_offset + read_offset..data_offset + read_offset + chunk]);
            });
            count += chunk;
            self.with_mut(id, |s| s.read_offset += chunk)?;
            if data_offset + self.with(id, |s| s.read_offset)? >= len {
                self.with_mut(id, |s| {
                    s.read_queue.pop_front();
                    s.read_offset = 0;
                })?;
                frames.free(front);
            }
        }
        Ok(count)
    }
}

impl Default for SocketTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWN_MAC: [u8; 6] = [0x00, 0x10, 0xdd, 0xce, 0x15, 0xd4];
    const OWN_IP: [u8; 4] = [192, 168, 1, 42];
    const GATEWAY_MAC: [u8; 6] = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];
    const DEST_IP: [u8; 4] = [192, 168, 1, 1];

    #[test]
    fn udp_write_sends_immediately() {
        let table = SocketTable::new();
        let frames = FramePool::new();
        let (id, _) = table.connect(SocketKind::Udp, OWN_MAC, OWN_IP, GATEWAY_MAC, DEST_IP, 53);
        let accepted = table.write(id, &frames, b"hello").unwrap();
        assert_eq!(accepted, 5);
        assert!(table.with(id, |s| s.send_frame).unwrap().is_none());
    }

    #[test]
    fn tcp_write_accumulates_until_flush() {
        let table = SocketTable::new();
        let frames = FramePool::new();
        let (id, _) = table.connect(SocketKind::Tcp, OWN_MAC, OWN_IP, GATEWAY_MAC, DEST_IP, 80);
        table.write(id, &frames, b"partial").unwrap();
        assert!(table.with(id, |s| s.send_frame).unwrap().is_some());
        let flushed = table.flush(id, &frames).unwrap();
        assert!(flushed.is_some());
        assert!(table.with(id, |s| s.send_frame).unwrap().is_none());
    }

    #[test]
    fn read_drains_queued_frames_in_order() {
        let table = SocketTable::new();
        let frames = FramePool::new();
        let (id, _) = table.connect(SocketKind::Tcp, OWN_MAC, OWN_IP, GATEWAY_MAC, DEST_IP, 80);
        let frame_id = frames.get(0).unwrap();
        frames.with_mut(frame_id, |f| f.fill(&[0u8; TCP_DATA + 3]));
        frames.with_mut(frame_id, |f| {
            f.data[TCP_DATA] = b'h';
            f.data[TCP_DATA + 1] = b'i';
            f.data[TCP_DATA + 2] = b'!';
        });
        table.with_mut(id, |s| s.read_queue.push_back(frame_id)).unwrap();

        let mut buf = [0u8; 3];
        let n = table.read(id, &frames, &mut buf).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf, b"hi!");
    }
}
