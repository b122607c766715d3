//! Central place for the tunables named throughout the spec.
//!
//! Mirrors the teacher crate's own `config.rs`: everything that was a raw
//! numeric literal scattered through the original C sources lives here as a
//! named constant instead.

/// Unit of all timeouts; one period of the periodic timer interrupt.
pub type Ticks = u32;

/// Pass to `Semaphore::pend`/`MQueue::get` to block with no deadline.
pub const WAIT_FOREVER: Ticks = Ticks::MAX;

/// Number of statically-reserved semaphores handed out before the allocator
/// is used (`SEM_RESERVED_COUNT` in `original_source/trunk/kernel/rtos.c`).
pub const SEM_RESERVED_COUNT: usize = 2;

/// Default and minimum thread stack sizes (`STACK_SIZE_DEFAULT` /
/// `STACK_SIZE_MINIMUM` in the original RTOS).
pub const STACK_SIZE_DEFAULT: usize = 0x2000;
pub const STACK_SIZE_MINIMUM: usize = 0x400;

/// Sentinel word written at the top of a thread's stack; a context switch
/// asserts it is unchanged (spec.md §4.2 "Stack overflow check").
pub const THREAD_STACK_MAGIC: u32 = 0x4321_abcd;

/// Magic word stashed in a heap block's header, checked on free.
pub const HEAP_BLOCK_MAGIC: u32 = 0x1234_abcd;

/// Maximum number of named heaps `Heap::register` can track.
pub const HEAP_COUNT: usize = 8;

/// Idle thread priority; always the lowest schedulable priority.
pub const IDLE_PRIORITY: u32 = 0;

/// Ethernet framing constants (spec.md §4.1 / §6).
pub const ETHERNET_PREAMBLE_BYTE: u8 = 0x55;
pub const ETHERNET_START_OF_FRAME: u8 = 0x5d;
pub const ETHERNET_PREAMBLE_LEN: usize = 7;
pub const ETHERNET_MIN_FRAME_LEN: usize = 60;
pub const ETHERNET_MIN_DECODE_LEN: usize = 40;
pub const ETHERNET_ADDR_LEN: usize = 6;
pub const CRC_LEN: usize = 4;

/// Byte pattern used to mark consumed receive-ring positions. Chosen by the
/// original hardware designer because it can never begin a valid frame.
pub const RING_SENTINEL: u8 = 0xde;

/// Receive ring size in bytes; must be a power of two (ring index is masked).
pub const RECEIVE_RING_SIZE: usize = 0x10000;

/// Maximum size of a single Ethernet frame buffer (`PACKET_SIZE`).
pub const PACKET_SIZE: usize = 1500;

/// Total number of pool-allocated IP frames (`FRAME_COUNT`).
pub const FRAME_COUNT: usize = 48;
/// Frames reserved so an overloaded sender cannot starve the receiver.
pub const FRAME_COUNT_RCV: usize = 4;
/// Frames reserved so a receive burst cannot starve outgoing sends/ACKs.
pub const FRAME_COUNT_SEND: usize = 6;
/// Frames reserved to compute the advertised TCP window.
pub const FRAME_COUNT_WINDOW: usize = 8;

/// TCP retransmit grace period, in ticks.
pub const RETRANSMIT_TIME: Ticks = 200;
/// Idle-socket close timeout, in ticks.
pub const SOCKET_TIMEOUT: Ticks = 1000;
/// Number of times a TCP segment is retransmitted before being dropped.
pub const TCP_MAX_RETRIES: u32 = 4;
/// TCP MSS this stack advertises at SYN (spec.md §4.7).
pub const TCP_ADVERTISED_MSS: u16 = 536;
/// Bytes accumulated into one outgoing TCP segment before an implicit flush.
pub const TCP_SEGMENT_SIZE: usize = 512;

/// DHCP client/server ports and retry cadence (RFC 2131).
pub const DHCP_SERVER_PORT: u16 = 67;
pub const DHCP_CLIENT_PORT: u16 = 68;
pub const DHCP_RETRANSMIT_SECONDS: Ticks = 4;
pub const DHCP_LEASE_REFRESH_SECONDS: Ticks = 3600 * 4;

/// DNS server port (RFC 1035).
pub const DNS_PORT: u16 = 53;

/// SMI word written once at init to configure the PHY for 10Mb/s full duplex.
pub const PHY_SMI_10MB_FULL_DUPLEX: u32 = 0x5f80_0100;

/// Per-board values that plausibly vary, grouped the way the teacher groups
/// its own handful of runtime-configurable parameters.
#[derive(Debug, Clone, Copy)]
pub struct KernelConfig {
    pub mac_address: [u8; 6],
    /// Size the board's boot code should reserve for the static array it
    /// passes to `Kernel::init` — read by that out-of-scope boot code
    /// (spec.md §1), not by this crate.
    pub heap_size: usize,
    /// Period the board's boot code should program the periodic timer
    /// interrupt for before calling `Kernel::tick` on each expiry.
    pub tick_period_ms: u32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            mac_address: [0x00, 0x10, 0xdd, 0xce, 0x15, 0xd4],
            heap_size: 1 << 20,
            tick_period_ms: 10,
        }
    }
}
