//! End-to-end DHCP lease acquisition: DISCOVER, a crafted OFFER, the
//! resulting REQUEST, and a crafted ACK, checked against the bound
//! addresses the client ends up with.
//!
//! Run with `cargo test --features sim`.

use rtos_kernel::drivers::net::loopback::Loopback;
use rtos_kernel::net::dhcp;
use rtos_kernel::net::wire::*;
use rtos_kernel::net::Stack;

const OWN_MAC: [u8; 6] = [0x00, 0x10, 0xdd, 0xce, 0x15, 0xd4];

fn write_dhcp_option(f: &mut [u8], opt: &mut usize, code: u8, value: &[u8]) {
    f[*opt] = code;
    f[*opt + 1] = value.len() as u8;
    f[*opt + 2..*opt + 2 + value.len()].copy_from_slice(value);
    *opt += 2 + value.len();
}

/// Builds a minimal DHCP reply (OFFER or ACK) the way a server would,
/// addressed back at the client.
fn build_reply(stack: &Stack, message_type: u8, your_ip: [u8; 4], server_ip: [u8; 4], options: &[(u8, &[u8])]) -> Vec<u8> {
    let frame_id = stack.frames.get(0).unwrap();
    stack.frames.with_mut(frame_id, |f| {
        f.data = [0u8; rtos_kernel::config::PACKET_SIZE];
        write_mac(&mut f.data, ETHERNET_DEST, OWN_MAC);
        write_mac(&mut f.data, ETHERNET_SOURCE, [0xaa; 6]);
        write_u16(&mut f.data, ETHERNET_FRAME_TYPE, ETHERTYPE_IP);

        f.data[IP_VERSION_LENGTH] = 0x45;
        f.data[IP_PROTOCOL] = IP_PROTO_UDP;
        write_ipv4(&mut f.data, IP_SOURCE, server_ip);
        write_ipv4(&mut f.data, IP_DEST, [255, 255, 255, 255]);

        write_u16(&mut f.data, UDP_SOURCE_PORT, rtos_kernel::config::DHCP_SERVER_PORT);
        write_u16(&mut f.data, UDP_DEST_PORT, rtos_kernel::config::DHCP_CLIENT_PORT);

        f.data[DHCP_OPCODE] = DHCP_OPCODE_REPLY;
        write_ipv4(&mut f.data, DHCP_YOUR_IP, your_ip);
        write_ipv4(&mut f.data, DHCP_SERVER_IP, server_ip);
        write_mac(&mut f.data, DHCP_CLIENT_ETHERNET, OWN_MAC);
        write_u32(&mut f.data, DHCP_MAGIC_COOKIE, DHCP_MAGIC_COOKIE_VALUE);

        let mut opt = DHCP_OPTIONS;
        write_dhcp_option(&mut f.data, &mut opt, DHCP_MESSAGE_TYPE, &[message_type]);
        for (code, value) in options {
            write_dhcp_option(&mut f.data, &mut opt, *code, value);
        }
        f.data[opt] = DHCP_END_OPTION;
        f.len = opt + 1;
        let len = f.len;
        (frame_id, len)
    });
    let bytes = stack.frames.with(frame_id, |f| f.as_slice().to_vec());
    stack.frames.free(frame_id);
    bytes
}

fn inject_reply(stack: &Stack, bytes: Vec<u8>) {
    let frame_id = stack.frames.get(0).unwrap();
    stack.frames.with_mut(frame_id, |f| {
        f.fill(&bytes);
    });
    dhcp::handle_reply(stack, frame_id);
}

#[test]
fn full_lease_cycle_binds_address_gateway_and_dns() {
    let stack = Stack::new(OWN_MAC);
    let iface = Loopback::new();

    dhcp::on_tick(&stack, 0);
    stack.pump_transmit(&iface, 0);
    let discover = iface.last_sent().expect("DISCOVER must be broadcast from a clean state");
    assert_eq!(discover[DHCP_OPTIONS + 2], DHCP_DISCOVER);

    let offer = build_reply(
        &stack,
        DHCP_OFFER,
        [192, 168, 1, 42],
        [192, 168, 1, 1],
        &[],
    );
    inject_reply(&stack, offer);
    stack.pump_transmit(&iface, 1);
    let request = iface.last_sent().expect("OFFER must provoke a REQUEST");
    assert_eq!(request[DHCP_OPTIONS + 2], DHCP_REQUEST);

    let mut saw_requested_ip = false;
    let mut opt = DHCP_OPTIONS;
    while opt + 1 < request.len() && request[opt] != DHCP_END_OPTION {
        let code = request[opt];
        let option_len = request[opt + 1] as usize;
        if code == DHCP_REQUEST_IP {
            assert_eq!(&request[opt + 2..opt + 2 + option_len], &[192, 168, 1, 42]);
            saw_requested_ip = true;
        }
        opt += 2 + option_len;
    }
    assert!(saw_requested_ip, "REQUEST must mirror the offered IP in option 50");

    // GIADDR is left at zero (`build_reply` zeroes the whole frame and never
    // writes it), so the gateway IP must fall back to the server's own IP,
    // and the ACK's Ethernet source becomes the provisional gateway MAC.
    let ack = build_reply(
        &stack,
        DHCP_ACK,
        [192, 168, 1, 42],
        [192, 168, 1, 1],
        &[(DHCP_PARAM_DNS, &[8, 8, 8, 8])],
    );
    inject_reply(&stack, ack);

    assert_eq!(stack.own_ip(), [192, 168, 1, 42]);
    assert_eq!(stack.gateway_ip(), [192, 168, 1, 1]);
    assert_eq!(stack.gateway_mac(), [0xaa; 6]);
    assert_eq!(stack.dns_ip(), [8, 8, 8, 8]);
}
