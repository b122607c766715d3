//! Byte offsets and tag values for the wire formats this stack speaks.
//!
//! Grounded in the `ETHERNET_*`/`IP_*`/`TCP_*`/`UDP_*`/`ARP_*`/`DHCP_*`/
//! `DNS_*`/`PING_*` offset macros at the top of
//! `original_source/trunk/kernel/tcpip.c`. The original indexes a flat
//! byte buffer with these as `#define`s; kept here as named constants so
//! every protocol module indexes the same flat `&[u8]`/`&mut [u8]` frame
//! buffer the same way, rather than each inventing its own struct layout.

pub const ETHERNET_DEST: usize = 0;
pub const ETHERNET_SOURCE: usize = 6;
pub const ETHERNET_FRAME_TYPE: usize = 12;
pub const ETHERNET_HEADER_LEN: usize = 14;

pub const ETHERTYPE_IP: u16 = 0x0800;
pub const ETHERTYPE_ARP: u16 = 0x0806;

pub const ARP_HARD_TYPE: usize = 14;
pub const ARP_PROT_TYPE: usize = 16;
pub const ARP_HARD_SIZE: usize = 18;
pub const ARP_PROT_SIZE: usize = 19;
pub const ARP_OP: usize = 20;
pub const ARP_ETHERNET_SENDER: usize = 22;
pub const ARP_IP_SENDER: usize = 28;
pub const ARP_ETHERNET_TARGET: usize = 32;
pub const ARP_IP_TARGET: usize = 38;
pub const ARP_LEN: usize = 42;

pub const ARP_OP_REQUEST: u16 = 1;
pub const ARP_OP_REPLY: u16 = 2;

pub const IP_VERSION_LENGTH: usize = 14;
pub const IP_TYPE_OF_SERVICE: usize = 15;
pub const IP_LENGTH: usize = 16;
pub const IP_ID16: usize = 18;
pub const IP_FRAG_OFFSET: usize = 20;
pub const IP_TIME_TO_LIVE: usize = 22;
pub const IP_PROTOCOL: usize = 23;
pub const IP_CHECKSUM: usize = 24;
pub const IP_SOURCE: usize = 26;
pub const IP_DEST: usize = 30;
pub const IP_HEADER_LEN: usize = 20;

pub const IP_PROTO_ICMP: u8 = 0x01;
pub const IP_PROTO_TCP: u8 = 0x06;
pub const IP_PROTO_UDP: u8 = 0x11;

pub const UDP_SOURCE_PORT: usize = 34;
pub const UDP_DEST_PORT: usize = 36;
pub const UDP_LENGTH: usize = 38;
pub const UDP_CHECKSUM: usize = 40;
pub const UDP_DATA: usize = 42;

pub const TCP_SOURCE_PORT: usize = 34;
pub const TCP_DEST_PORT: usize = 36;
pub const TCP_SEQ: usize = 38;
pub const TCP_ACK: usize = 42;
pub const TCP_HEADER_LENGTH: usize = 46;
pub const TCP_FLAGS: usize = 47;
pub const TCP_WINDOW_SIZE: usize = 48;
pub const TCP_CHECKSUM: usize = 50;
pub const TCP_URGENT_POINTER: usize = 52;
pub const TCP_DATA: usize = 54;

pub const TCP_FLAGS_FIN: u8 = 1;
pub const TCP_FLAGS_SYN: u8 = 2;
pub const TCP_FLAGS_RST: u8 = 4;
pub const TCP_FLAGS_ACK: u8 = 16;

pub const PING_TYPE: usize = 34;
pub const PING_CODE: usize = 35;
pub const PING_CHECKSUM: usize = 36;
pub const PING_ID: usize = 38;
pub const PING_SEQUENCE: usize = 40;
pub const PING_DATA: usize = 44;

pub const ICMP_TYPE_ECHO_REQUEST: u8 = 8;
pub const ICMP_TYPE_ECHO_REPLY: u8 = 0;

pub const DHCP_OPCODE: usize = 42;
pub const DHCP_HW_TYPE: usize = 43;
pub const DHCP_HW_LEN: usize = 44;
pub const DHCP_HOP_COUNT: usize = 45;
pub const DHCP_TRANS_ID: usize = 46;
pub const DHCP_NUM_SEC: usize = 50;
pub const DHCP_UNUSED: usize = 52;
pub const DHCP_CLIENT_IP: usize = 54;
pub const DHCP_YOUR_IP: usize = 58;
pub const DHCP_SERVER_IP: usize = 62;
pub const DHCP_GATEWAY_IP: usize = 66;
pub const DHCP_CLIENT_ETHERNET: usize = 70;
pub const DHCP_MAGIC_COOKIE: usize = 278;
pub const DHCP_OPTIONS: usize = 282;

pub const DHCP_MAGIC_COOKIE_VALUE: u32 = 0x6382_5363;

pub const DHCP_OPCODE_REQUEST: u8 = 1;
pub const DHCP_OPCODE_REPLY: u8 = 2;

pub const DHCP_MESSAGE_TYPE: u8 = 53;
pub const DHCP_DISCOVER: u8 = 1;
pub const DHCP_OFFER: u8 = 2;
pub const DHCP_REQUEST: u8 = 3;
pub const DHCP_ACK: u8 = 5;
pub const DHCP_REQUEST_IP: u8 = 50;
pub const DHCP_REQUEST_SERV_IP: u8 = 54;
pub const DHCP_CLIENT_ID: u8 = 61;
pub const DHCP_HOST_NAME: u8 = 12;
pub const DHCP_PARAMS: u8 = 55;
pub const DHCP_PARAM_SUBNET: u8 = 1;
pub const DHCP_PARAM_ROUTER: u8 = 3;
pub const DHCP_PARAM_DNS: u8 = 6;
pub const DHCP_END_OPTION: u8 = 0xff;

pub const DNS_ID: usize = 0;
pub const DNS_FLAGS: usize = 2;
pub const DNS_NUM_QUESTIONS: usize = 4;
pub const DNS_NUM_ANSWERS_RR: usize = 6;
pub const DNS_NUM_AUTHORITY_RR: usize = 8;
pub const DNS_NUM_ADDITIONAL_RR: usize = 10;
pub const DNS_QUESTIONS: usize = 12;

pub const DNS_FLAGS_RESPONSE: u16 = 0x8000;
pub const DNS_FLAGS_RECURSIVE: u16 = 0x0100;
pub const DNS_QUERY_TYPE_A: u16 = 1;
pub const DNS_QUERY_CLASS_IN: u16 = 1;

pub fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

pub fn write_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

pub fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

pub fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

pub fn read_mac(buf: &[u8], offset: usize) -> [u8; 6] {
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&buf[offset..offset + 6]);
    mac
}

pub fn write_mac(buf: &mut [u8], offset: usize, mac: [u8; 6]) {
    buf[offset..offset + 6].copy_from_slice(&mac);
}

pub fn read_ipv4(buf: &[u8], offset: usize) -> [u8; 4] {
    let mut ip = [0u8; 4];
    ip.copy_from_slice(&buf[offset..offset + 4]);
    ip
}

pub fn write_ipv4(buf: &mut [u8], offset: usize, ip: [u8; 4]) {
    buf[offset..offset + 4].copy_from_slice(&ip);
}
