//! ARP request/reply handling.
//!
//! Grounded in the ARP branch of `IPProcessEthernetPacket` from
//! `original_source/trunk/kernel/tcpip.c`: a reply updates the learned
//! gateway MAC if it came from the gateway's IP, a request addressed to
//! our IP gets an in-place reply.

use crate::net::dispatch::Stack;
use crate::net::frame::FrameId;
use crate::net::wire::*;

pub fn handle(stack: &Stack, frame_id: FrameId) {
    let (op, sender_mac, sender_ip, target_ip) = stack.frames.with(frame_id, |f| {
        (
            read_u16(&f.data, ARP_OP),
            read_mac(&f.data, ARP_ETHERNET_SENDER),
            read_ipv4(&f.data, ARP_IP_SENDER),
            read_ipv4(&f.data, ARP_IP_TARGET),
        )
    });

    if op == ARP_OP_REPLY {
        if sender_ip == stack.gateway_ip() {
            stack.set_gateway_mac(sender_mac);
        }
        stack.frames.free(frame_id);
        return;
    }

    if op != ARP_OP_REQUEST || target_ip != stack.own_ip() {
        stack.frames.free(frame_id);
        return;
    }

    stack.frames.with_mut(frame_id, |f| {
        write_mac(&mut f.data, ETHERNET_DEST, sender_mac);
        write_mac(&mut f.data, ETHERNET_SOURCE, stack.own_mac);
        write_u16(&mut f.data, ARP_OP, ARP_OP_REPLY);
        write_mac(&mut f.data, ARP_ETHERNET_SENDER, stack.own_mac);
        write_ipv4(&mut f.data, ARP_IP_SENDER, target_ip);
        write_mac(&mut f.data, ARP_ETHERNET_TARGET, sender_mac);
        write_ipv4(&mut f.data, ARP_IP_TARGET, sender_ip);
        f.len = ARP_LEN;
    });
    stack.send(None, frame_id, ARP_LEN);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_updates_gateway_mac_only_when_from_known_gateway() {
        let stack = Stack::new([0x00, 0x10, 0xdd, 0xce, 0x15, 0xd4]);
        stack.set_gateway_ip([10, 0, 0, 1]);

        let frame_id = stack.frames.get(0).unwrap();
        stack.frames.with_mut(frame_id, |f| {
            write_u16(&mut f.data, ARP_OP, ARP_OP_REPLY);
            write_mac(&mut f.data, ARP_ETHERNET_SENDER, [1, 2, 3, 4, 5, 6]);
            write_ipv4(&mut f.data, ARP_IP_SENDER, [10, 0, 0, 1]);
            f.len = ARP_LEN;
        });
        handle(&stack, frame_id);
        assert_eq!(stack.gateway_mac(), [1, 2, 3, 4, 5, 6]);
    }
}
