//! Cross-module TCP scenarios that span the dispatcher, the socket table,
//! and a transmit-capturing driver together, as opposed to the
//! single-module unit tests colocated with `net::tcp`.
//!
//! Run with `cargo test --features sim` (the crate needs its hosted
//! backend to build a `std`-linked test binary).

use rtos_kernel::drivers::net::loopback::Loopback;
use rtos_kernel::drivers::net::NetworkInterface;
use rtos_kernel::net::socket::{SocketKind, SocketState};
use rtos_kernel::net::wire::*;
use rtos_kernel::net::Stack;

const OWN_MAC: [u8; 6] = [0x00, 0x10, 0xdd, 0xce, 0x15, 0xd4];

#[test]
fn three_way_handshake_answers_with_syn_ack_and_mss() {
    let stack = Stack::new(OWN_MAC);
    stack.set_own_ip([192, 168, 1, 42]);
    stack.sockets.listen(80);
    let iface = Loopback::new();

    let syn = stack.frames.get(0).unwrap();
    stack.frames.with_mut(syn, |f| {
        write_mac(&mut f.data, ETHERNET_SOURCE, [1, 2, 3, 4, 5, 6]);
        write_ipv4(&mut f.data, IP_SOURCE, [192, 168, 1, 99]);
        write_u16(&mut f.data, TCP_SOURCE_PORT, 4000);
        write_u16(&mut f.data, TCP_DEST_PORT, 80);
        write_u32(&mut f.data, TCP_SEQ, 1000);
        f.data[TCP_FLAGS] = TCP_FLAGS_SYN;
        f.len = TCP_DATA;
    });

    assert!(!stack.process_ethernet_frame(syn));
    stack.pump_transmit(&iface, 0);

    assert_eq!(iface.sent_count(), 1);
    let reply = iface.last_sent().unwrap();
    assert_eq!(read_u32(&reply, TCP_ACK), 1001);
    assert_eq!(read_u32(&reply, TCP_SEQ), 0x1234_5678u32.wrapping_add(1001));
    assert_eq!(reply[TCP_FLAGS], TCP_FLAGS_SYN | TCP_FLAGS_ACK);
    assert_eq!(&reply[TCP_DATA..TCP_DATA + 4], &[2, 4, 2, 24]);

    let mut connected = false;
    stack.sockets.for_each(|_, s| {
        if s.kind == SocketKind::Tcp && s.state == SocketState::Tcp {
            connected = true;
        }
    });
    assert!(connected, "SYN to a listener must spawn a connected socket");
}

/// Drains every frame the driver has queued and counts the TCP ones,
/// ignoring whatever the DHCP client's background retry timer (sharing
/// the same `Stack::tick`) happened to broadcast in the meantime.
fn count_tcp_sends(iface: &Loopback) -> u32 {
    let mut count = 0;
    while let Some(frame) = iface.take_sent() {
        if frame.len() > IP_PROTOCOL && frame[IP_PROTOCOL] == IP_PROTO_TCP {
            count += 1;
        }
    }
    count
}

#[test]
fn unacked_segment_is_retransmitted_then_dropped() {
    use rtos_kernel::config::RETRANSMIT_TIME;

    let stack = Stack::new(OWN_MAC);
    stack.set_own_ip([192, 168, 1, 42]);
    let (socket_id, _source_port) =
        stack.sockets.connect(SocketKind::Tcp, OWN_MAC, [192, 168, 1, 42], [0xaa; 6], [192, 168, 1, 1], 9000);
    let iface = Loopback::new();

    let payload = [0x41u8; 100];
    let accepted = stack.sockets.write(socket_id, &stack.frames, &payload).unwrap();
    assert_eq!(accepted, payload.len());
    let frame_id = stack.sockets.flush(socket_id, &stack.frames).unwrap().expect("segment queued");
    let len = stack.frames.with(frame_id, |f| f.len);
    stack.send(Some(socket_id), frame_id, len);

    // Initial transmit, then four retransmits at each RETRANSMIT_TIME
    // boundary; the fifth scheduled retry exceeds TCP_MAX_RETRIES and the
    // frame is dropped instead of requeued.
    stack.pump_transmit(&iface, 0);
    let mut tcp_sends = count_tcp_sends(&iface);
    assert_eq!(tcp_sends, 1);

    for round in 1..=5u32 {
        let now = RETRANSMIT_TIME * round;
        stack.tick(now, &iface);
        tcp_sends += count_tcp_sends(&iface);
    }
    assert_eq!(tcp_sends, 5, "segment should be retransmitted 4 times before being dropped");

    // One more tick past every retry deadline must not produce a sixth
    // send: the frame was freed, not requeued, on the fourth retransmit.
    stack.tick(RETRANSMIT_TIME * 6, &iface);
    assert_eq!(count_tcp_sends(&iface), 0);
}
