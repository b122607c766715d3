//! DHCP client: lease acquisition and renewal.
//!
//! Grounded in `IPDhcp` from `original_source/trunk/kernel/tcpip.c`: a
//! tiny state machine driven by a periodic tick rather than by explicit
//! calls — `state 1` sends DISCOVER, `state 2` processes whatever reply
//! comes back (OFFER advances to REQUEST, ACK binds the lease and
//! triggers a gratuitous ARP at the gateway if it wasn't already known).

use crate::config::{DHCP_CLIENT_PORT, DHCP_LEASE_REFRESH_SECONDS, DHCP_RETRANSMIT_SECONDS, DHCP_SERVER_PORT, Ticks};
use crate::net::dispatch::Stack;
use crate::net::frame::FrameId;
use crate::net::wire::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpState {
    Idle,
    DiscoverSent,
    RequestSent { offered_ip: [u8; 4], server_ip: [u8; 4] },
    Bound,
}

const BROADCAST_MAC: [u8; 6] = [0xff; 6];
const BROADCAST_IP: [u8; 4] = [0xff, 0xff, 0xff, 0xff];

fn build_header(frame_id: FrameId, stack: &Stack, message_type: u8, xid: u32) {
    stack.frames.with_mut(frame_id, |f| {
        f.data = [0u8; crate::config::PACKET_SIZE];
        write_mac(&mut f.data, ETHERNET_DEST, BROADCAST_MAC);
        write_mac(&mut f.data, ETHERNET_SOURCE, stack.own_mac);
        f.data[ETHERNET_FRAME_TYPE] = 0x08;
        f.data[ETHERNET_FRAME_TYPE + 1] = 0x00;

        f.data[IP_VERSION_LENGTH] = 0x45;
        f.data[IP_TIME_TO_LIVE] = 0x80;
        f.data[IP_PROTOCOL] = IP_PROTO_UDP;
        write_ipv4(&mut f.data, IP_SOURCE, [0, 0, 0, 0]);
        write_ipv4(&mut f.data, IP_DEST, BROADCAST_IP);

        write_u16(&mut f.data, UDP_SOURCE_PORT, DHCP_CLIENT_PORT);
        write_u16(&mut f.data, UDP_DEST_PORT, DHCP_SERVER_PORT);

        f.data[DHCP_OPCODE] = DHCP_OPCODE_REQUEST;
        f.data[DHCP_HW_TYPE] = 1;
        f.data[DHCP_HW_LEN] = 6;
        write_u32(&mut f.data, DHCP_TRANS_ID, xid);
        write_mac(&mut f.data, DHCP_CLIENT_ETHERNET, stack.own_mac);
        write_u32(&mut f.data, DHCP_MAGIC_COOKIE, DHCP_MAGIC_COOKIE_VALUE);

        let mut opt = DHCP_OPTIONS;
        f.data[opt] = DHCP_MESSAGE_TYPE;
        f.data[opt + 1] = 1;
        f.data[opt + 2] = message_type;
        opt += 3;
        f.data[opt] = DHCP_END_OPTION;
        f.len = opt + 1;
    });
}

/// Drives the client forward once a lease needs (re)acquiring, and on
/// every retransmit-timer expiry thereafter.
pub fn on_tick(stack: &Stack, now: Ticks) {
    let state = *stack.dhcp.lock();
    match state {
        DhcpState::Idle => {
            let Some(frame_id) = stack.frames.get(0) else {
                stack.arm_dhcp_retry(now, DHCP_RETRANSMIT_SECONDS);
                return;
            };
            build_header(frame_id, stack, DHCP_DISCOVER, 0x4442_0001);
            let len = stack.frames.with(frame_id, |f| f.len);
            stack.send(None, frame_id, len);
            *stack.dhcp.lock() = DhcpState::DiscoverSent;
            stack.arm_dhcp_retry(now, DHCP_RETRANSMIT_SECONDS);
        }
        DhcpState::DiscoverSent => {
            stack.arm_dhcp_retry(now, DHCP_RETRANSMIT_SECONDS);
        }
        DhcpState::RequestSent { .. } => {
            stack.arm_dhcp_retry(now, DHCP_RETRANSMIT_SECONDS);
        }
        DhcpState::Bound => {
            *stack.dhcp.lock() = DhcpState::Idle;
            stack.arm_dhcp_retry(now, DHCP_LEASE_REFRESH_SECONDS);
        }
    }
}

/// Processes an inbound DHCP reply (OFFER or ACK). Always consumes
/// `frame_id`.
pub fn handle_reply(stack: &Stack, frame_id: FrameId) {
    let (message_type, offered_ip, server_ip, giaddr, ip_source, peer_mac, dns_ip) = stack.frames.with(frame_id, |f| {
        let mut message_type = 0u8;
        let mut dns_ip = [0u8; 4];
        let mut opt = DHCP_OPTIONS;
        while opt + 1 < f.len && f.data[opt] != DHCP_END_OPTION {
            let code = f.data[opt];
            let option_len = f.data[opt + 1] as usize;
            let value = &f.data[opt + 2..opt + 2 + option_len];
            match code {
                DHCP_MESSAGE_TYPE if option_len == 1 => message_type = value[0],
                DHCP_PARAM_DNS if option_len >= 4 => dns_ip.copy_from_slice(&value[..4]),
                _ => {}
            }
            opt += 2 + option_len;
        }
        (
            message_type,
            read_ipv4(&f.data, DHCP_YOUR_IP),
            read_ipv4(&f.data, DHCP_SERVER_IP),
            read_ipv4(&f.data, DHCP_GATEWAY_IP),
            read_ipv4(&f.data, IP_SOURCE),
            read_mac(&f.data, ETHERNET_SOURCE),
            dns_ip,
        )
    });
    stack.frames.free(frame_id);

    let state = *stack.dhcp.lock();
    match (state, message_type) {
        (DhcpState::DiscoverSent, DHCP_OFFER) => {
            let Some(reply) = stack.frames.get(0) else { return };
            build_header(reply, stack, DHCP_REQUEST, 0x4442_0001);
            stack.frames.with_mut(reply, |f| {
                let mut opt = f.len - 1;
                f.data[opt] = DHCP_REQUEST_IP;
                f.data[opt + 1] = 4;
                write_ipv4(&mut f.data, opt + 2, offered_ip);
                opt += 6;
                f.data[opt] = DHCP_END_OPTION;
                f.len = opt + 1;
            });
            let len = stack.frames.with(reply, |f| f.len);
            stack.send(None, reply, len);
            *stack.dhcp.lock() = DhcpState::RequestSent { offered_ip, server_ip };
        }
        (DhcpState::RequestSent { offered_ip: expected_ip, .. }, DHCP_ACK) => {
            let bound_ip = if offered_ip == [0, 0, 0, 0] { expected_ip } else { offered_ip };
            stack.set_own_ip(bound_ip);
            // `giaddr` (BOOTP relay-agent field) names the gateway; fall back
            // to the server's own IP when no relay set it, matching
            // `tcpip.c`'s `memcpy(ipAddressGateway, packet+DHCP_GATEWAY_IP, 4)`.
            let gateway_ip = if giaddr != [0, 0, 0, 0] { giaddr } else { server_ip };
            stack.set_gateway_ip(gateway_ip);
            // The ACK's Ethernet source is provisionally the gateway's MAC;
            // correct only when the server that answered isn't the gateway
            // itself (packet's IP source differs from the learned gateway).
            stack.set_gateway_mac(peer_mac);
            if ip_source != gateway_ip {
                send_gratuitous_arp(stack, gateway_ip);
            }
            if dns_ip != [0, 0, 0, 0] {
                stack.set_dns_ip(dns_ip);
            }
            *stack.dhcp.lock() = DhcpState::Bound;
        }
        _ => {}
    }
}

fn send_gratuitous_arp(stack: &Stack, target_ip: [u8; 4]) {
    let Some(frame_id) = stack.frames.get(0) else { return };
    stack.frames.with_mut(frame_id, |f| {
        write_mac(&mut f.data, ETHERNET_DEST, BROADCAST_MAC);
        write_mac(&mut f.data, ETHERNET_SOURCE, stack.own_mac);
        write_u16(&mut f.data, ETHERNET_FRAME_TYPE, ETHERTYPE_ARP);
        write_u16(&mut f.data, ARP_HARD_TYPE, 1);
        write_u16(&mut f.data, ARP_PROT_TYPE, ETHERTYPE_IP);
        f.data[ARP_HARD_SIZE] = 6;
        f.data[ARP_PROT_SIZE] = 4;
        write_u16(&mut f.data, ARP_OP, ARP_OP_REQUEST);
        write_mac(&mut f.data, ARP_ETHERNET_SENDER, stack.own_mac);
        write_ipv4(&mut f.data, ARP_IP_SENDER, stack.own_ip());
        write_mac(&mut f.data, ARP_ETHERNET_TARGET, [0u8; 6]);
        write_ipv4(&mut f.data, ARP_IP_TARGET, target_ip);
        f.len = ARP_LEN;
    });
    stack.send(None, frame_id, ARP_LEN);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::net::loopback::Loopback;

    #[test]
    fn idle_tick_broadcasts_a_discover() {
        let stack = Stack::new([0x00, 0x10, 0xdd, 0xce, 0x15, 0xd4]);
        let iface = Loopback::new();
        on_tick(&stack, 0);
        stack.pump_transmit(&iface, 0);
        assert_eq!(iface.sent_count(), 1);
        let last = iface.last_sent().unwrap();
        assert_eq!(read_mac(&last, ETHERNET_DEST), BROADCAST_MAC);
        assert_eq!(last[DHCP_OPTIONS + 2], DHCP_DISCOVER);
    }
}
