//! DNS query encoding and A-record answer parsing.
//!
//! Grounded in `IPResolve`/`DnsCallback` from
//! `original_source/trunk/kernel/tcpip.c`. The original blocks a calling
//! thread on `socket->userData` until `DnsCallback` fills it in; that
//! poll-for-completion shape doesn't translate into a library with no
//! thread of its own, so this module only does the pure encode/decode —
//! `net::dispatch` wires the reply into whatever the caller used to issue
//! the query (typically a one-shot UDP socket to port 53).

use alloc::vec::Vec;

use crate::net::wire::*;

/// Encodes a DNS query for an A record, ready to append after the UDP
/// header in an outgoing frame.
pub fn encode_query(id: u16, name: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(DNS_QUESTIONS + name.len() + 6);
    out.extend_from_slice(&id.to_be_bytes());
    out.extend_from_slice(&(DNS_FLAGS_RECURSIVE).to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes()); // num questions
    out.extend_from_slice(&0u16.to_be_bytes()); // answers
    out.extend_from_slice(&0u16.to_be_bytes()); // authority
    out.extend_from_slice(&0u16.to_be_bytes()); // additional

    for label in name.split('.') {
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
    out.extend_from_slice(&DNS_QUERY_TYPE_A.to_be_bytes());
    out.extend_from_slice(&DNS_QUERY_CLASS_IN.to_be_bytes());
    out
}

fn skip_name(packet: &[u8], mut offset: usize) -> Option<usize> {
    loop {
        let len = *packet.get(offset)?;
        if len == 0 {
            return Some(offset + 1);
        }
        if len & 0xc0 == 0xc0 {
            return Some(offset + 2);
        }
        offset += 1 + len as usize;
    }
}

/// Walks a DNS reply past its question section looking for the first
/// type-A/class-IN answer and returns its address.
pub fn parse_a_record(packet: &[u8]) -> Option<[u8; 4]> {
    let flags = read_u16(packet, DNS_FLAGS);
    if flags & DNS_FLAGS_RESPONSE == 0 {
        return None;
    }
    let num_questions = read_u16(packet, DNS_NUM_QUESTIONS);
    let num_answers = read_u16(packet, DNS_NUM_ANSWERS_RR);

    let mut offset = DNS_QUESTIONS;
    for _ in 0..num_questions {
        offset = skip_name(packet, offset)?;
        offset += 4; // type + class
    }

    for _ in 0..num_answers {
        offset = skip_name(packet, offset)?;
        let rtype = read_u16(packet, offset);
        let rclass = read_u16(packet, offset + 2);
        let rdlength = read_u16(packet, offset + 8) as usize;
        let rdata_offset = offset + 10;
        if rtype == DNS_QUERY_TYPE_A && rclass == DNS_QUERY_CLASS_IN && rdlength == 4 {
            return Some(read_ipv4(packet, rdata_offset));
        }
        offset = rdata_offset + rdlength;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_encodes_labels_and_terminator() {
        let query = encode_query(0x1234, "example.com");
        assert_eq!(&query[0..2], &[0x12, 0x34]);
        assert_eq!(query[DNS_QUESTIONS], 7);
        assert_eq!(&query[DNS_QUESTIONS + 1..DNS_QUESTIONS + 8], b"example");
    }

    #[test]
    fn reply_with_single_a_record_parses() {
        let mut packet = [0u8; 64];
        write_u16(&mut packet, DNS_FLAGS, DNS_FLAGS_RESPONSE);
        write_u16(&mut packet, DNS_NUM_QUESTIONS, 1);
        write_u16(&mut packet, DNS_NUM_ANSWERS_RR, 1);

        let mut offset = DNS_QUESTIONS;
        for label in ["example", "com"] {
            packet[offset] = label.len() as u8;
            packet[offset + 1..offset + 1 + label.len()].copy_from_slice(label.as_bytes());
            offset += 1 + label.len();
        }
        packet[offset] = 0;
        offset += 1;
        write_u16(&mut packet, offset, DNS_QUERY_TYPE_A);
        write_u16(&mut packet, offset + 2, DNS_QUERY_CLASS_IN);
        offset += 4;

        packet[offset] = 0xc0;
        packet[offset + 1] = DNS_QUESTIONS as u8;
        offset += 2;
        write_u16(&mut packet, offset, DNS_QUERY_TYPE_A);
        write_u16(&mut packet, offset + 2, DNS_QUERY_CLASS_IN);
        write_u16(&mut packet, offset + 8, 4);
        write_ipv4(&mut packet, offset + 10, [93, 184, 216, 34]);

        assert_eq!(parse_a_record(&packet), Some([93, 184, 216, 34]));
    }
}
