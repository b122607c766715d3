//! The stack's shared state and its two tick-driven loops: draining the
//! transmit queue into the NIC driver, and sweeping the resend queue and
//! idle sockets.
//!
//! Grounded in `IPInit`/`IPMainThread`/`IPSendFrame`/`IPFrameReschedule`/
//! `IPTick`/`IPProcessEthernetPacket` from
//! `original_source/trunk/kernel/tcpip.c`. `IPMainThread`'s single loop
//! (drain one message, drain one send-queue frame, maybe run `IPTick`) is
//! split here into the pieces a caller wires together explicitly —
//! `process_ethernet_frame` for an inbound frame, `pump_transmit` for the
//! outbound side, `tick` for aging — since this stack has no hidden
//! global thread of its own (design note in spec.md §9: explicit handles,
//! not singletons).

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use hermit_sync::InterruptTicketMutex;

use crate::config::{Ticks, RETRANSMIT_TIME, TCP_MAX_RETRIES};
use crate::drivers::net::NetworkInterface;
use crate::net::frame::{FrameId, FramePool};
use crate::net::socket::{SocketId, SocketKind, SocketState, SocketTable};
use crate::net::wire::*;
use crate::net::{arp, dhcp, icmp, tcp, udp};

pub struct AddressState {
    pub own_ip: [u8; 4],
    pub gateway_ip: [u8; 4],
    pub gateway_mac: [u8; 6],
    pub dns_ip: [u8; 4],
}

impl Default for AddressState {
    fn default() -> Self {
        Self { own_ip: [0; 4], gateway_ip: [0xff; 4], gateway_mac: [0xff; 6], dns_ip: [0; 4] }
    }
}

/// Everything the stack needs that used to be file-scope `static`s in the
/// original: frame pool, socket table, send/resend queues, and the
/// learned addresses. One instance lives inside `Kernel`.
pub struct Stack {
    pub own_mac: [u8; 6],
    pub frames: FramePool,
    pub sockets: SocketTable,
    addr: InterruptTicketMutex<AddressState>,
    send_queue: InterruptTicketMutex<VecDeque<FrameId>>,
    resend_queue: InterruptTicketMutex<VecDeque<FrameId>>,
    pub(crate) dhcp: InterruptTicketMutex<dhcp::DhcpState>,
    dhcp_retry_at: InterruptTicketMutex<Ticks>,
}

impl Stack {
    pub fn new(own_mac: [u8; 6]) -> Self {
        Self {
            own_mac,
            frames: FramePool::new(),
            sockets: SocketTable::new(),
            addr: InterruptTicketMutex::new(AddressState::default()),
            send_queue: InterruptTicketMutex::new(VecDeque::new()),
            resend_queue: InterruptTicketMutex::new(VecDeque::new()),
            dhcp: InterruptTicketMutex::new(dhcp::DhcpState::Idle),
            dhcp_retry_at: InterruptTicketMutex::new(0),
        }
    }

    pub fn own_ip(&self) -> [u8; 4] {
        self.addr.lock().own_ip
    }

    pub fn set_own_ip(&self, ip: [u8; 4]) {
        self.addr.lock().own_ip = ip;
    }

    pub fn gateway_ip(&self) -> [u8; 4] {
        self.addr.lock().gateway_ip
    }

    pub fn set_gateway_ip(&self, ip: [u8; 4]) {
        self.addr.lock().gateway_ip = ip;
    }

    pub fn gateway_mac(&self) -> [u8; 6] {
        self.addr.lock().gateway_mac
    }

    pub fn set_gateway_mac(&self, mac: [u8; 6]) {
        self.addr.lock().gateway_mac = mac;
    }

    pub fn dns_ip(&self) -> [u8; 4] {
        self.addr.lock().dns_ip
    }

    pub fn set_dns_ip(&self, ip: [u8; 4]) {
        self.addr.lock().dns_ip = ip;
    }

    /// `IPSendPacket` + `IPSendFrame`: stamps length/checksums, links the
    /// frame to its owning socket (if any) with the sequence number that
    /// must be ACKed before it can be freed, and queues it for transmit.
    pub fn send(&self, socket: Option<SocketId>, frame_id: FrameId, length: usize) {
        let seq = socket.and_then(|id| self.sockets.with(id, |s| s.seq).ok());
        self.frames.with_mut(frame_id, |frame| {
            crate::net::ip::finalize(&mut frame.data, length);
            frame.len = length;
            frame.sent_at = None;
            frame.retries = 0;
            frame.socket = socket;
            if let Some(seq) = seq {
                let payload = length.saturating_sub(TCP_DATA);
                frame.seq_end = crate::net::ip::seq_end(seq, payload, frame.data[TCP_FLAGS]);
            }
        });
        self.send_queue.lock().push_back(frame_id);
    }

    /// Drains the transmit queue into `iface`, one frame at a time.
    /// `IPMainThread`'s "frameOut == NULL" branch plus `UartPacketSend`.
    pub fn pump_transmit(&self, iface: &dyn NetworkInterface, now: Ticks) {
        while let Some(frame_id) = self.send_queue.lock().pop_front() {
            let sent = self.frames.with(frame_id, |f| iface.transmit(f.as_slice()));
            match sent {
                Ok(()) => self.frame_sent(frame_id, now),
                Err(_) => self.frames.free(frame_id),
            }
        }
    }

    /// `IPFrameReschedule`: once a frame has actually gone out, either
    /// it can never be ACKed (no socket, UDP, zero-length, or already
    /// retried `TCP_MAX_RETRIES` times) and is freed, or it moves to the
    /// resend queue armed with a fresh `RETRANSMIT_TIME` deadline.
    fn frame_sent(&self, frame_id: FrameId, now: Ticks) {
        let (socket, len, flags, retries) =
            self.frames.with(frame_id, |f| (f.socket, f.len, f.data[TCP_FLAGS], f.retries));
        let is_udp = socket.map(|id| self.sockets.with(id, |s| s.kind == SocketKind::Udp).unwrap_or(true));
        let mut payload = len.saturating_sub(TCP_DATA);
        if flags & (TCP_FLAGS_SYN | TCP_FLAGS_FIN) != 0 {
            payload = 1;
        }
        let next_retries = retries + 1;
        if socket.is_none() || is_udp == Some(true) || payload == 0 || next_retries > TCP_MAX_RETRIES {
            self.frames.free(frame_id);
            return;
        }
        self.frames.with_mut(frame_id, |f| {
            f.sent_at = Some(now);
            f.retries = next_retries;
        });
        self.resend_queue.lock().push_back(frame_id);
    }

    /// Drops every resend-queue / send-queue frame owned by `socket`
    /// without retrying them (`IPClose2`'s frame-list sweep).
    fn disown_socket_frames(&self, socket: SocketId) {
        let mut resend = self.resend_queue.lock();
        let mut remaining = VecDeque::with_capacity(resend.len());
        while let Some(frame_id) = resend.pop_front() {
            let owned = self.frames.with(frame_id, |f| f.socket == Some(socket));
            if owned {
                self.frames.free(frame_id);
            } else {
                remaining.push_back(frame_id);
            }
        }
        *resend = remaining;
    }

    /// Cumulative ACK: frees every resend-queue frame belonging to
    /// `socket` whose `seq_end` the new `ack` has already covered.
    fn prune_resend(&self, socket: SocketId, ack: u32) {
        let mut resend = self.resend_queue.lock();
        let mut remaining = VecDeque::with_capacity(resend.len());
        while let Some(frame_id) = resend.pop_front() {
            let (owner, seq_end) = self.frames.with(frame_id, |f| (f.socket, f.seq_end));
            if owner == Some(socket) && (ack.wrapping_sub(seq_end) as i32) >= 0 {
                self.frames.free(frame_id);
            } else {
                remaining.push_back(frame_id);
            }
        }
        *resend = remaining;
    }

    /// `IPProcessEthernetPacket`: top-level dispatch by ethertype then IP
    /// protocol. Always consumes `frame_id` — freeing it, reusing it for
    /// an immediate reply, or adopting it onto a socket's read queue.
    /// Returns `true` if the frame was adopted (freed later by
    /// `SocketTable::read`/`remove` instead of here), mirroring the
    /// original's 0/1 return convention.
    pub fn process_ethernet_frame(&self, frame_id: FrameId) -> bool {
        let header = self.frames.with(frame_id, |f| {
            (read_u16(&f.data, ETHERNET_FRAME_TYPE), f.len)
        });
        let (ethertype, len) = header;
        if len > crate::config::PACKET_SIZE {
            self.frames.free(frame_id);
            return false;
        }

        if ethertype == ETHERTYPE_ARP {
            arp::handle(self, frame_id);
            return false;
        }
        if ethertype != ETHERTYPE_IP {
            self.frames.free(frame_id);
            return false;
        }

        let (ip_length, proto, dest_mac, dest_ip) = self.frames.with(frame_id, |f| {
            (
                read_u16(&f.data, IP_LENGTH) as usize,
                f.data[IP_PROTOCOL],
                read_mac(&f.data, ETHERNET_DEST),
                read_ipv4(&f.data, IP_DEST),
            )
        });
        if len < UDP_DATA || ip_length > len - IP_VERSION_LENGTH {
            self.frames.free(frame_id);
            return false;
        }

        if proto == IP_PROTO_UDP {
            let (src_port, dest_port) =
                self.frames.with(frame_id, |f| (read_u16(&f.data, UDP_SOURCE_PORT), read_u16(&f.data, UDP_DEST_PORT)));
            if src_port == crate::config::DHCP_SERVER_PORT && dest_port == crate::config::DHCP_CLIENT_PORT {
                dhcp::handle_reply(self, frame_id);
                return false;
            }
        }

        if dest_mac != self.own_mac || dest_ip != self.own_ip() {
            self.frames.free(frame_id);
            return false;
        }

        match proto {
            IP_PROTO_ICMP => {
                icmp::handle_echo_request(self, frame_id);
                false
            }
            IP_PROTO_TCP => tcp::handle(self, frame_id),
            IP_PROTO_UDP => udp::handle(self, frame_id),
            _ => {
                self.frames.free(frame_id);
                false
            }
        }
    }

    /// `IPClose`/`IPClose2`: flushes pending writes, sends FIN for TCP,
    /// and removes the socket once its frames have drained.
    pub fn close_socket(&self, id: SocketId) {
        let _ = self.sockets.flush(id, &self.frames).map(|frame_id| {
            if let Some(frame_id) = frame_id {
                self.send(Some(id), frame_id, self.frames.with(frame_id, |f| f.len));
            }
        });
        let state = self.sockets.with(id, |s| s.state);
        let kind = self.sockets.with(id, |s| s.kind);
        if kind == Ok(SocketKind::Udp) {
            self.disown_socket_frames(id);
            self.sockets.remove(id, &self.frames);
            return;
        }
        if let Some(frame_id) = self.frames.get(0) {
            let (header, seq, ack) =
                self.sockets.with(id, |s| (s.header_send, s.seq, s.ack)).unwrap_or(([0u8; 34], 0, 0));
            self.frames.with_mut(frame_id, |f| {
                f.data[..TCP_SEQ].copy_from_slice(&header[..TCP_SEQ]);
                f.data[TCP_FLAGS] = TCP_FLAGS_FIN | TCP_FLAGS_ACK;
                write_u32(&mut f.data, TCP_SEQ, seq);
                write_u32(&mut f.data, TCP_ACK, ack);
                f.len = TCP_DATA;
            });
            self.send(Some(id), frame_id, TCP_DATA);
            let _ = self.sockets.with_mut(id, |s| s.seq = s.seq.wrapping_add(1));
        }
        if state == Ok(SocketState::FinClient) {
            self.disown_socket_frames(id);
            self.sockets.remove(id, &self.frames);
        } else {
            let _ = self.sockets.with_mut(id, |s| s.state = SocketState::FinServer);
        }
    }

    /// `IPTick`: ages the resend queue (retransmit or drop), the DHCP
    /// retry timer, and idle-socket timeouts.
    pub fn tick(&self, now: Ticks, iface: &dyn NetworkInterface) {
        let mut due = Vec::new();
        {
            let mut resend = self.resend_queue.lock();
            let mut remaining = VecDeque::with_capacity(resend.len());
            while let Some(frame_id) = resend.pop_front() {
                let sent_at = self.frames.with(frame_id, |f| f.sent_at);
                let is_due = matches!(sent_at, Some(t) if now.wrapping_sub(t) >= RETRANSMIT_TIME);
                if is_due {
                    due.push(frame_id);
                } else {
                    remaining.push_back(frame_id);
                }
            }
            *resend = remaining;
        }
        for frame_id in due {
            self.send_queue.lock().push_back(frame_id);
        }
        self.pump_transmit(iface, now);

        if *self.dhcp_retry_at.lock() <= now {
            dhcp::on_tick(self, now);
        }

        let mut ids = Vec::new();
        self.sockets.for_each(|id, socket| {
            if socket.timeout != 0 {
                ids.push(id);
            }
        });
        for id in ids {
            let expired = self.sockets.with_mut(id, |s| {
                s.timeout = s.timeout.saturating_sub(1);
                s.timeout == 0
            });
            if expired == Ok(true) {
                let state = self.sockets.with(id, |s| s.state);
                if state == Ok(SocketState::Tcp) || state == Ok(SocketState::FinClient) {
                    self.close_socket(id);
                } else {
                    self.disown_socket_frames(id);
                    self.sockets.remove(id, &self.frames);
                }
            }
        }
    }

    pub(crate) fn arm_dhcp_retry(&self, now: Ticks, delay: Ticks) {
        *self.dhcp_retry_at.lock() = now.wrapping_add(delay);
    }

    pub(crate) fn prune_resend_on_ack(&self, socket: SocketId, ack: u32) {
        self.prune_resend(socket, ack);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::net::loopback::Loopback;

    #[test]
    fn arp_request_for_our_ip_gets_a_reply() {
        let stack = Stack::new([0x00, 0x10, 0xdd, 0xce, 0x15, 0xd4]);
        stack.set_own_ip([192, 168, 1, 42]);
        let iface = Loopback::new();

        let frame_id = stack.frames.get(0).unwrap();
        stack.frames.with_mut(frame_id, |f| {
            f.data[0..6].copy_from_slice(&[0xff; 6]);
            write_mac(&mut f.data, ETHERNET_SOURCE, [0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
            write_u16(&mut f.data, ETHERNET_FRAME_TYPE, ETHERTYPE_ARP);
            write_u16(&mut f.data, ARP_OP, ARP_OP_REQUEST);
            write_mac(&mut f.data, ARP_ETHERNET_SENDER, [0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
            write_ipv4(&mut f.data, ARP_IP_SENDER, [192, 168, 1, 99]);
            write_ipv4(&mut f.data, ARP_IP_TARGET, [192, 168, 1, 42]);
            f.len = ARP_LEN;
        });

        let adopted = stack.process_ethernet_frame(frame_id);
        assert!(!adopted);
        stack.pump_transmit(&iface, 0);
        assert_eq!(iface.sent_count(), 1);
    }
}
