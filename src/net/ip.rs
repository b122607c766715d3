//! IP-level packet finalization shared by every protocol handler.
//!
//! Grounded in `IPSendPacket` from
//! `original_source/trunk/kernel/tcpip.c`: before a frame leaves the send
//! queue its length fields and checksums (IP header, then ICMP or UDP or
//! TCP depending on `IP_PROTOCOL`) are recomputed from scratch. The
//! original recognizes the transport by inspecting `packet[IP_PROTOCOL]`
//! after the caller has already filled it in from a header template;
//! kept the same way here rather than threading an enum through every
//! caller.

use crate::net::checksum::{checksum, pseudo_header};
use crate::net::wire::*;

/// Patches length fields and recomputes every checksum for an outgoing
/// IP packet of `length` bytes (Ethernet header through payload,
/// inclusive). Must run after the caller has filled in addresses, ports,
/// flags, and payload, and before the frame is hung on the send queue.
pub fn finalize(packet: &mut [u8], length: usize) {
    if read_u16(packet, ETHERNET_FRAME_TYPE) != ETHERTYPE_IP {
        return;
    }

    let ip_length = (length - IP_VERSION_LENGTH) as u16;
    write_u16(packet, IP_LENGTH, ip_length);
    write_u16(packet, IP_CHECKSUM, 0);
    let ip_checksum = checksum(&packet[IP_VERSION_LENGTH..IP_VERSION_LENGTH + IP_HEADER_LEN]);
    write_u16(packet, IP_CHECKSUM, ip_checksum);

    match packet[IP_PROTOCOL] {
        IP_PROTO_ICMP => {
            write_u16(packet, PING_CHECKSUM, 0);
            let sum = checksum(&packet[PING_TYPE..length]);
            write_u16(packet, PING_CHECKSUM, sum);
        }
        IP_PROTO_UDP => {
            let udp_length = (length - UDP_SOURCE_PORT) as u16;
            write_u16(packet, UDP_LENGTH, udp_length);
            let pseudo = pseudo_header(read_ipv4(packet, IP_SOURCE), read_ipv4(packet, IP_DEST), IP_PROTO_UDP, udp_length);
            write_u16(packet, UDP_CHECKSUM, 0);
            let mut acc = crate::net::checksum::ChecksumAccumulator::new();
            acc.add(&pseudo);
            acc.add(&packet[UDP_SOURCE_PORT..UDP_SOURCE_PORT + udp_length as usize]);
            let sum = acc.finish();
            write_u16(packet, UDP_CHECKSUM, sum);
        }
        IP_PROTO_TCP => {
            let tcp_length = (ip_length as usize - IP_HEADER_LEN) as u16;
            let pseudo = pseudo_header(read_ipv4(packet, IP_SOURCE), read_ipv4(packet, IP_DEST), IP_PROTO_TCP, tcp_length);
            write_u16(packet, TCP_CHECKSUM, 0);
            let mut acc = crate::net::checksum::ChecksumAccumulator::new();
            acc.add(&pseudo);
            acc.add(&packet[TCP_SOURCE_PORT..TCP_SOURCE_PORT + tcp_length as usize]);
            let sum = acc.finish();
            write_u16(packet, TCP_CHECKSUM, sum);
        }
        _ => {}
    }
}

/// `frame->seqEnd = socket->seq + length`, where a bare SYN or FIN with
/// no payload still advances the sequence space by one.
pub fn seq_end(socket_seq: u32, payload_len: usize, flags: u8) -> u32 {
    let contributes_one = flags & (TCP_FLAGS_SYN | TCP_FLAGS_FIN) != 0;
    let len = if contributes_one { 1 } else { payload_len as u32 };
    socket_seq.wrapping_add(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tcp_checksum_round_trips() {
        let mut packet = [0u8; TCP_DATA + 4];
        packet[ETHERNET_FRAME_TYPE] = 0x08;
        packet[IP_VERSION_LENGTH] = 0x45;
        packet[IP_PROTOCOL] = IP_PROTO_TCP;
        write_ipv4(&mut packet, IP_SOURCE, [192, 168, 1, 42]);
        write_ipv4(&mut packet, IP_DEST, [192, 168, 1, 1]);
        write_u16(&mut packet, TCP_SOURCE_PORT, 1234);
        write_u16(&mut packet, TCP_DEST_PORT, 80);
        packet[TCP_FLAGS] = TCP_FLAGS_SYN;

        let len = packet.len();
        finalize(&mut packet, len);

        let tcp_length = packet.len() - TCP_SOURCE_PORT;
        let pseudo = pseudo_header([192, 168, 1, 42], [192, 168, 1, 1], IP_PROTO_TCP, tcp_length as u16);
        let mut acc = crate::net::checksum::ChecksumAccumulator::new();
        acc.add(&pseudo);
        acc.add(&packet[TCP_SOURCE_PORT..]);
        assert_eq!(acc.finish(), 0);
    }

    #[test]
    fn seq_end_counts_syn_as_one_byte() {
        assert_eq!(seq_end(1000, 0, TCP_FLAGS_SYN), 1001);
        assert_eq!(seq_end(1000, 50, TCP_FLAGS_ACK), 1050);
    }
}
