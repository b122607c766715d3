//! TCP segment processing: connection setup, teardown, and the data path.
//!
//! Grounded in `IPProcessTCPPacket`/`TCPSendPacket` from
//! `original_source/trunk/kernel/tcpip.c`. This stack only ever has one
//! listening socket accept a SYN by spawning a new connected socket
//! (`memcpy` of the listener's template in the original, `SocketTable::accept`
//! here); everything else matches an already-open socket by its receive
//! template (source IP/port, dest port) the same way `udp::handle` does.

use crate::config::TCP_ADVERTISED_MSS;
use crate::net::dispatch::Stack;
use crate::net::frame::FrameId;
use crate::net::socket::{SocketId, SocketKind, SocketState};
use crate::net::wire::*;

fn find_socket(stack: &Stack, src_ip: [u8; 4], dest_ip: [u8; 4], src_port: u16, dest_port: u16) -> Option<SocketId> {
    let mut matched = None;
    stack.sockets.for_each(|id, socket| {
        if matched.is_some() || socket.kind != SocketKind::Tcp || socket.state == SocketState::Listen {
            return;
        }
        let rcv_ip = read_ipv4(&socket.header_rcv, IP_SOURCE);
        let rcv_dest_ip = read_ipv4(&socket.header_rcv, IP_DEST);
        let rcv_src_port = read_u16(&socket.header_rcv, TCP_SOURCE_PORT);
        let rcv_dest_port = read_u16(&socket.header_rcv, TCP_DEST_PORT);
        if rcv_ip == src_ip && rcv_dest_ip == dest_ip && rcv_src_port == src_port && rcv_dest_port == dest_port {
            matched = Some(id);
        }
    });
    matched
}

fn find_listener(stack: &Stack, dest_port: u16) -> Option<SocketId> {
    let mut matched = None;
    stack.sockets.for_each(|id, socket| {
        if matched.is_some() || socket.state != SocketState::Listen {
            return;
        }
        if read_u16(&socket.header_rcv, TCP_DEST_PORT) == dest_port {
            matched = Some(id);
        }
    });
    matched
}

/// Sends a bare ACK/SYN-ACK/RST response reusing `frame_id`'s buffer,
/// built from `socket`'s send template (`EthernetCreateResponse` plus the
/// TCP-specific field patching `IPProcessTCPPacket` does inline).
fn respond(stack: &Stack, socket_id: SocketId, frame_id: FrameId, flags: u8, with_mss: bool) {
    let (header, seq, ack) = stack.sockets.with(socket_id, |s| (s.header_send, s.seq, s.ack)).unwrap_or(([0u8; 34], 0, 0));
    let len = stack.frames.with_mut(frame_id, |f| {
        f.data[..TCP_SEQ].copy_from_slice(&header[..TCP_SEQ]);
        write_u32(&mut f.data, TCP_SEQ, seq);
        write_u32(&mut f.data, TCP_ACK, ack);
        f.data[TCP_HEADER_LENGTH] = (TCP_DATA - TCP_SOURCE_PORT) as u8 / 4 << 4;
        f.data[TCP_FLAGS] = flags;
        write_u16(&mut f.data, TCP_WINDOW_SIZE, 0x2000);
        let mut len = TCP_DATA;
        if with_mss {
            f.data[TCP_DATA] = 2;
            f.data[TCP_DATA + 1] = 4;
            write_u16(&mut f.data, TCP_DATA + 2, TCP_ADVERTISED_MSS);
            len = TCP_DATA + 4;
        }
        f.len = len;
        len
    });
    stack.send(Some(socket_id), frame_id, len);
}

/// `IPProcessTCPPacket`. Returns `true` if the frame was adopted onto a
/// socket's read queue (payload accepted), `false` once it has been
/// consumed some other way (control segment, duplicate, or dropped).
pub fn handle(stack: &Stack, frame_id: FrameId) -> bool {
    let (src_ip, dest_ip, src_port, dest_port, seq, ack, flags, len) = stack.frames.with(frame_id, |f| {
        (
            read_ipv4(&f.data, IP_SOURCE),
            read_ipv4(&f.data, IP_DEST),
            read_u16(&f.data, TCP_SOURCE_PORT),
            read_u16(&f.data, TCP_DEST_PORT),
            read_u32(&f.data, TCP_SEQ),
            read_u32(&f.data, TCP_ACK),
            f.data[TCP_FLAGS],
            f.len,
        )
    });

    if let Some(socket_id) = find_socket(stack, src_ip, dest_ip, src_port, dest_port) {
        return handle_established(stack, socket_id, frame_id, seq, ack, flags, len);
    }

    if flags & TCP_FLAGS_SYN == 0 {
        stack.frames.free(frame_id);
        return false;
    }

    let Some(listener) = find_listener(stack, dest_port) else {
        stack.frames.free(frame_id);
        return false;
    };

    let peer_mac = stack.frames.with(frame_id, |f| read_mac(&f.data, ETHERNET_SOURCE));
    let Ok(socket_id) = stack.sockets.accept(listener, peer_mac, src_ip, src_port, stack.own_mac, stack.own_ip()) else {
        stack.frames.free(frame_id);
        return false;
    };
    let _ = stack.sockets.with_mut(socket_id, |s| {
        s.ack = seq.wrapping_add(1);
        s.seq = s.ack.wrapping_add(0x1234_5678);
        s.timeout = crate::config::SOCKET_TIMEOUT;
    });
    let new_seq = stack.sockets.with(socket_id, |s| s.seq).unwrap_or(0);
    respond(stack, socket_id, frame_id, TCP_FLAGS_SYN | TCP_FLAGS_ACK, true);
    let _ = stack.sockets.with_mut(socket_id, |s| s.seq = new_seq.wrapping_add(1));
    false
}

fn handle_established(
    stack: &Stack,
    socket_id: SocketId,
    frame_id: FrameId,
    seq: u32,
    ack: u32,
    flags: u8,
    len: usize,
) -> bool {
    let _ = stack.sockets.with_mut(socket_id, |s| s.timeout = crate::config::SOCKET_TIMEOUT);

    if flags & TCP_FLAGS_ACK != 0 {
        stack.prune_resend_on_ack(socket_id, ack);
        let _ = stack.sockets.with_mut(socket_id, |s| {
            if (ack.wrapping_sub(s.seq_received) as i32) > 0 {
                s.seq_received = ack;
            }
        });
    }

    if flags & TCP_FLAGS_RST != 0 {
        stack.frames.free(frame_id);
        stack.close_socket(socket_id);
        return false;
    }

    if flags & TCP_FLAGS_FIN != 0 {
        let _ = stack.sockets.with_mut(socket_id, |s| s.ack = s.ack.wrapping_add(1));
        respond(stack, socket_id, frame_id, TCP_FLAGS_ACK, false);
        let state = stack.sockets.with(socket_id, |s| s.state);
        if state == Ok(SocketState::FinServer) {
            stack.sockets.remove(socket_id, &stack.frames);
        } else {
            let _ = stack.sockets.with_mut(socket_id, |s| s.state = SocketState::FinClient);
        }
        return false;
    }

    let payload = len.saturating_sub(TCP_DATA);
    if payload == 0 {
        stack.frames.free(frame_id);
        return false;
    }

    let expected = stack.sockets.with(socket_id, |s| s.ack).unwrap_or(0);
    if seq != expected {
        // Out-of-order or duplicate: ack what we actually have, drop the data.
        respond(stack, socket_id, frame_id, TCP_FLAGS_ACK, false);
        return false;
    }

    let adopted = stack.sockets.with_mut(socket_id, |s| {
        s.ack = s.ack.wrapping_add(payload as u32);
        s.read_queue.push_back(frame_id);
    });
    if adopted.is_err() {
        stack.frames.free(frame_id);
        return false;
    }

    let Some(ack_frame) = stack.frames.get(0) else { return true };
    respond(stack, socket_id, ack_frame, TCP_FLAGS_ACK, false);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syn_to_listener_spawns_a_connected_socket() {
        let stack = Stack::new([0x00, 0x10, 0xdd, 0xce, 0x15, 0xd4]);
        stack.set_own_ip([192, 168, 1, 42]);
        let listener = stack.sockets.listen(80);

        let frame_id = stack.frames.get(0).unwrap();
        stack.frames.with_mut(frame_id, |f| {
            write_mac(&mut f.data, ETHERNET_SOURCE, [1, 2, 3, 4, 5, 6]);
            write_ipv4(&mut f.data, IP_SOURCE, [192, 168, 1, 99]);
            write_u16(&mut f.data, TCP_SOURCE_PORT, 4000);
            write_u16(&mut f.data, TCP_DEST_PORT, 80);
            write_u32(&mut f.data, TCP_SEQ, 1000);
            f.data[TCP_FLAGS] = TCP_FLAGS_SYN;
            f.len = TCP_DATA;
        });

        let adopted = handle(&stack, frame_id);
        assert!(!adopted);
        let _ = listener;

        let mut found_connected = false;
        stack.sockets.for_each(|_, s| {
            if s.state == SocketState::Tcp {
                found_connected = true;
                assert_eq!(s.ack, 1001);
            }
        });
        assert!(found_connected);
    }
}
