//! ICMP echo (ping) handling.
//!
//! Grounded in the PING branch of `IPProcessEthernetPacket` and
//! `EthernetCreateResponse` from `original_source/trunk/kernel/tcpip.c`:
//! an echo request is turned into a reply in place by swapping the
//! Ethernet/IP source and destination and flipping the ICMP type byte,
//! leaving the identifier/sequence/payload untouched.

use crate::net::dispatch::Stack;
use crate::net::frame::FrameId;
use crate::net::wire::*;

fn swap_response_addresses(packet: &mut [u8], own_mac: [u8; 6]) {
    let peer_mac = read_mac(packet, ETHERNET_SOURCE);
    let own_ip = read_ipv4(packet, IP_DEST);
    let peer_ip = read_ipv4(packet, IP_SOURCE);
    write_mac(packet, ETHERNET_DEST, peer_mac);
    write_mac(packet, ETHERNET_SOURCE, own_mac);
    write_ipv4(packet, IP_SOURCE, own_ip);
    write_ipv4(packet, IP_DEST, peer_ip);
}

pub fn handle_echo_request(stack: &Stack, frame_id: FrameId) {
    let (ty, len) = stack.frames.with(frame_id, |f| (f.data[PING_TYPE], f.len));
    if ty != ICMP_TYPE_ECHO_REQUEST {
        stack.frames.free(frame_id);
        return;
    }
    stack.frames.with_mut(frame_id, |f| {
        swap_response_addresses(&mut f.data, stack.own_mac);
        f.data[PING_TYPE] = ICMP_TYPE_ECHO_REPLY;
    });
    stack.send(None, frame_id, len);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_request_becomes_a_reply_to_the_sender() {
        let stack = Stack::new([0x00, 0x10, 0xdd, 0xce, 0x15, 0xd4]);
        stack.set_own_ip([192, 168, 1, 42]);
        let frame_id = stack.frames.get(0).unwrap();
        stack.frames.with_mut(frame_id, |f| {
            write_mac(&mut f.data, ETHERNET_SOURCE, [1, 2, 3, 4, 5, 6]);
            write_ipv4(&mut f.data, IP_SOURCE, [192, 168, 1, 99]);
            write_ipv4(&mut f.data, IP_DEST, [192, 168, 1, 42]);
            f.data[PING_TYPE] = ICMP_TYPE_ECHO_REQUEST;
            f.len = PING_DATA;
        });

        handle_echo_request(&stack, frame_id);

        stack.frames.with(frame_id, |f| {
            assert_eq!(f.data[PING_TYPE], ICMP_TYPE_ECHO_REPLY);
            assert_eq!(read_ipv4(&f.data, IP_DEST), [192, 168, 1, 99]);
            assert_eq!(read_mac(&f.data, ETHERNET_DEST), [1, 2, 3, 4, 5, 6]);
        });
    }
}
