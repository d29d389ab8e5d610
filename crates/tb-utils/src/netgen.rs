use std::net::{Ipv4Addr, Ipv6Addr};

use axi_agents::StreamFrame;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use tracing::trace;

use crate::{packet_to_stream, FlowTuple, UtilError};

/// Source MAC address of every generated frame.
pub const SRC_MAC: [u8; 6] = [0x53, 0x00, 0x00, 0x00, 0x00, 0x01];
/// Destination MAC address of every generated frame.
pub const DST_MAC: [u8; 6] = [0x53, 0x00, 0x00, 0x00, 0x00, 0x02];
/// Shortest random payload appended after the headers.
pub const MIN_PAYLOAD_BYTES: usize = 50;
/// Longest random payload appended after the headers.
pub const MAX_PAYLOAD_BYTES: usize = 1000;

const ETH_HEADER_BYTES: usize = 14;
const IPV4_HEADER_BYTES: usize = 20;
const IPV6_HEADER_BYTES: usize = 40;
const TCP_HEADER_BYTES: usize = 20;
const UDP_HEADER_BYTES: usize = 8;

const ETHERTYPE_RAW: u16 = 0x9000;
const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86DD;

const PROTO_RAW_V4: u8 = 0;
const PROTO_TCP: u8 = 6;
const PROTO_UDP: u8 = 17;
const PROTO_IPV6: u8 = 41;
const PROTO_NONE_V6: u8 = 59;

const IPV4_MORE_FRAGMENTS: u16 = 0x2000;
const MAX_FRAGMENT_OFFSET: u16 = 0x1FFF;
const HOP_LIMIT: u8 = 64;
const TCP_SYN: u8 = 0x02;
const TCP_WINDOW: u16 = 8192;

/// Layer 4 header above the IP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// Payload follows the IP header directly.
    None,
    /// TCP segment with the given ports.
    Tcp {
        /// Source port.
        src_port: u16,
        /// Destination port.
        dst_port: u16,
    },
    /// UDP datagram with the given ports.
    Udp {
        /// Source port.
        src_port: u16,
        /// Destination port.
        dst_port: u16,
    },
}

impl Transport {
    const fn protocol(self, none: u8) -> u8 {
        match self {
            Self::None => none,
            Self::Tcp { .. } => PROTO_TCP,
            Self::Udp { .. } => PROTO_UDP,
        }
    }

    const fn ports(self) -> Option<(u16, u16)> {
        match self {
            Self::None => None,
            Self::Tcp { src_port, dst_port } | Self::Udp { src_port, dst_port } => {
                Some((src_port, dst_port))
            }
        }
    }
}

/// Header stack of a generated frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encapsulation {
    /// Ethernet header and payload only.
    Ethernet,
    /// IPv4 packet.
    Ipv4 {
        /// Source address.
        src: Ipv4Addr,
        /// Destination address.
        dst: Ipv4Addr,
        /// Carried transport header.
        transport: Transport,
    },
    /// IPv4 fragment, either with MF set or a nonzero offset.
    Ipv4Fragment {
        /// Source address.
        src: Ipv4Addr,
        /// Destination address.
        dst: Ipv4Addr,
        /// Flags and fragment offset field.
        fragment: u16,
    },
    /// IPv6 packet tunnelled in IPv4.
    Ipv6InIpv4 {
        /// Outer source address.
        src: Ipv4Addr,
        /// Outer destination address.
        dst: Ipv4Addr,
        /// Inner source address.
        inner_src: Ipv6Addr,
        /// Inner destination address.
        inner_dst: Ipv6Addr,
    },
    /// IPv6 packet.
    Ipv6 {
        /// Source address.
        src: Ipv6Addr,
        /// Destination address.
        dst: Ipv6Addr,
        /// Carried transport header.
        transport: Transport,
    },
}

impl Encapsulation {
    /// Receive-side-scaling input for this header stack: outer addresses,
    /// plus ports when an unfragmented TCP or UDP header follows.
    #[must_use]
    pub fn flow(&self) -> Option<FlowTuple> {
        match *self {
            Self::Ethernet => None,
            Self::Ipv4 { src, dst, transport } => {
                Some(with_ports(FlowTuple::ipv4(src, dst), transport))
            }
            Self::Ipv4Fragment { src, dst, .. } | Self::Ipv6InIpv4 { src, dst, .. } => {
                Some(FlowTuple::ipv4(src, dst))
            }
            Self::Ipv6 { src, dst, transport } => {
                Some(with_ports(FlowTuple::ipv6(src, dst), transport))
            }
        }
    }
}

const fn with_ports(flow: FlowTuple, transport: Transport) -> FlowTuple {
    match transport.ports() {
        Some((src_port, dst_port)) => flow.with_ports(src_port, dst_port),
        None => flow,
    }
}

/// One generated Ethernet frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedPacket {
    encapsulation: Encapsulation,
    payload_len: usize,
    bytes: Vec<u8>,
}

impl GeneratedPacket {
    /// Header stack of the frame.
    #[must_use]
    pub const fn encapsulation(&self) -> &Encapsulation {
        &self.encapsulation
    }

    /// Length of the random payload behind the headers.
    #[must_use]
    pub const fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Frame bytes starting at the destination MAC, without FCS.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the packet, returning its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Shorthand for [`Encapsulation::flow`].
    #[must_use]
    pub fn flow(&self) -> Option<FlowTuple> {
        self.encapsulation.flow()
    }

    /// Splits the frame into words for a `bus_bits`-wide stream.
    ///
    /// # Errors
    ///
    /// Same as [`packet_to_stream`].
    pub fn to_stream(&self, bus_bits: u32) -> Result<StreamFrame, UtilError> {
        packet_to_stream(&self.bytes, bus_bits)
    }
}

/// Seeded source of random Ethernet frames.
///
/// Half the frames carry IPv4 and half IPv6. IPv4 frames are fragments one
/// time in ten, tunnel IPv6 one time in ten, carry TCP or UDP six times in
/// ten and nothing otherwise. IPv6 frames carry TCP or UDP eight times in
/// ten. Every frame ends in 50 to 1000 random payload bytes.
#[derive(Debug, Clone)]
pub struct PacketGenerator {
    rng: Xoshiro256StarStar,
    eth_only: bool,
}

impl PacketGenerator {
    /// Generator producing the full header mix.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Xoshiro256StarStar::seed_from_u64(seed),
            eth_only: false,
        }
    }

    /// Restricts output to Ethernet frames without layer 3 headers.
    #[must_use]
    pub const fn eth_only(mut self) -> Self {
        self.eth_only = true;
        self
    }

    /// Draws the next frame.
    pub fn next_packet(&mut self) -> GeneratedPacket {
        let encapsulation = self.draw_encapsulation();
        let payload_len = self.rng.gen_range(MIN_PAYLOAD_BYTES..=MAX_PAYLOAD_BYTES);
        let mut payload = vec![0; payload_len];
        self.rng.fill(payload.as_mut_slice());

        let bytes = encode(&encapsulation, &payload);
        trace!(?encapsulation, bytes = bytes.len(), "packet generated");
        GeneratedPacket {
            encapsulation,
            payload_len,
            bytes,
        }
    }

    fn draw_encapsulation(&mut self) -> Encapsulation {
        if self.eth_only {
            return Encapsulation::Ethernet;
        }
        if self.rng.gen_bool(0.5) {
            let src = Ipv4Addr::from(self.rng.gen::<u32>());
            let dst = Ipv4Addr::from(self.rng.gen::<u32>());
            match self.rng.gen_range(0..10u8) {
                0 => {
                    let fragment = if self.rng.gen_bool(0.5) {
                        IPV4_MORE_FRAGMENTS
                    } else {
                        self.rng.gen_range(1..=MAX_FRAGMENT_OFFSET)
                    };
                    Encapsulation::Ipv4Fragment { src, dst, fragment }
                }
                1 => Encapsulation::Ipv6InIpv4 {
                    src,
                    dst,
                    inner_src: Ipv6Addr::from(self.rng.gen::<u128>()),
                    inner_dst: Ipv6Addr::from(self.rng.gen::<u128>()),
                },
                2..=7 => Encapsulation::Ipv4 {
                    src,
                    dst,
                    transport: self.draw_transport(),
                },
                _ => Encapsulation::Ipv4 {
                    src,
                    dst,
                    transport: Transport::None,
                },
            }
        } else {
            let src = Ipv6Addr::from(self.rng.gen::<u128>());
            let dst = Ipv6Addr::from(self.rng.gen::<u128>());
            let transport = if self.rng.gen_bool(0.8) {
                self.draw_transport()
            } else {
                Transport::None
            };
            Encapsulation::Ipv6 { src, dst, transport }
        }
    }

    fn draw_transport(&mut self) -> Transport {
        let src_port = self.rng.gen();
        let dst_port = self.rng.gen();
        if self.rng.gen_bool(0.5) {
            Transport::Tcp { src_port, dst_port }
        } else {
            Transport::Udp { src_port, dst_port }
        }
    }
}

impl Iterator for PacketGenerator {
    type Item = GeneratedPacket;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_packet())
    }
}

fn encode(encapsulation: &Encapsulation, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(
        ETH_HEADER_BYTES + 2 * IPV6_HEADER_BYTES + TCP_HEADER_BYTES + payload.len(),
    );
    frame.extend_from_slice(&DST_MAC);
    frame.extend_from_slice(&SRC_MAC);

    match *encapsulation {
        Encapsulation::Ethernet => {
            frame.extend_from_slice(&ETHERTYPE_RAW.to_be_bytes());
            frame.extend_from_slice(payload);
        }
        Encapsulation::Ipv4 { src, dst, transport } => {
            frame.extend_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
            let protocol = transport.protocol(PROTO_RAW_V4);
            let segment = transport_segment(transport, &address_bytes_v4(src, dst), protocol, payload);
            push_ipv4_header(&mut frame, src, dst, protocol, 0, segment.len());
            frame.extend_from_slice(&segment);
        }
        Encapsulation::Ipv4Fragment { src, dst, fragment } => {
            frame.extend_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
            push_ipv4_header(&mut frame, src, dst, PROTO_RAW_V4, fragment, payload.len());
            frame.extend_from_slice(payload);
        }
        Encapsulation::Ipv6InIpv4 {
            src,
            dst,
            inner_src,
            inner_dst,
        } => {
            frame.extend_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
            push_ipv4_header(
                &mut frame,
                src,
                dst,
                PROTO_IPV6,
                0,
                IPV6_HEADER_BYTES + payload.len(),
            );
            push_ipv6_header(&mut frame, inner_src, inner_dst, PROTO_NONE_V6, payload.len());
            frame.extend_from_slice(payload);
        }
        Encapsulation::Ipv6 { src, dst, transport } => {
            frame.extend_from_slice(&ETHERTYPE_IPV6.to_be_bytes());
            let protocol = transport.protocol(PROTO_NONE_V6);
            let segment = transport_segment(transport, &address_bytes_v6(src, dst), protocol, payload);
            push_ipv6_header(&mut frame, src, dst, protocol, segment.len());
            frame.extend_from_slice(&segment);
        }
    }
    frame
}

fn address_bytes_v4(src: Ipv4Addr, dst: Ipv4Addr) -> Vec<u8> {
    [src.octets(), dst.octets()].concat()
}

fn address_bytes_v6(src: Ipv6Addr, dst: Ipv6Addr) -> Vec<u8> {
    [src.octets(), dst.octets()].concat()
}

fn len16(len: usize) -> u16 {
    u16::try_from(len).unwrap_or(u16::MAX)
}

fn push_ipv4_header(
    frame: &mut Vec<u8>,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    protocol: u8,
    fragment: u16,
    payload_len: usize,
) {
    let mut header = [0u8; IPV4_HEADER_BYTES];
    header[0] = 0x45;
    header[2..4].copy_from_slice(&len16(IPV4_HEADER_BYTES + payload_len).to_be_bytes());
    header[4..6].copy_from_slice(&1u16.to_be_bytes());
    header[6..8].copy_from_slice(&fragment.to_be_bytes());
    header[8] = HOP_LIMIT;
    header[9] = protocol;
    header[12..16].copy_from_slice(&src.octets());
    header[16..20].copy_from_slice(&dst.octets());
    let checksum = fold_checksum(sum_words(0, &header));
    header[10..12].copy_from_slice(&checksum.to_be_bytes());
    frame.extend_from_slice(&header);
}

fn push_ipv6_header(
    frame: &mut Vec<u8>,
    src: Ipv6Addr,
    dst: Ipv6Addr,
    next_header: u8,
    payload_len: usize,
) {
    frame.extend_from_slice(&[0x60, 0, 0, 0]);
    frame.extend_from_slice(&len16(payload_len).to_be_bytes());
    frame.extend_from_slice(&[next_header, HOP_LIMIT]);
    frame.extend_from_slice(&src.octets());
    frame.extend_from_slice(&dst.octets());
}

fn transport_segment(
    transport: Transport,
    addresses: &[u8],
    protocol: u8,
    payload: &[u8],
) -> Vec<u8> {
    let mut segment = Vec::with_capacity(TCP_HEADER_BYTES + payload.len());
    let checksum_at = match transport {
        Transport::None => {
            segment.extend_from_slice(payload);
            return segment;
        }
        Transport::Tcp { src_port, dst_port } => {
            segment.extend_from_slice(&src_port.to_be_bytes());
            segment.extend_from_slice(&dst_port.to_be_bytes());
            segment.extend_from_slice(&[0; 8]);
            segment.extend_from_slice(&[0x50, TCP_SYN]);
            segment.extend_from_slice(&TCP_WINDOW.to_be_bytes());
            segment.extend_from_slice(&[0; 4]);
            16
        }
        Transport::Udp { src_port, dst_port } => {
            segment.extend_from_slice(&src_port.to_be_bytes());
            segment.extend_from_slice(&dst_port.to_be_bytes());
            segment.extend_from_slice(&len16(UDP_HEADER_BYTES + payload.len()).to_be_bytes());
            segment.extend_from_slice(&[0; 2]);
            6
        }
    };
    segment.extend_from_slice(payload);

    let seed = pseudo_header_sum(addresses, protocol, segment.len());
    let checksum = match fold_checksum(sum_words(seed, &segment)) {
        // A zero UDP checksum means "not computed".
        0 if protocol == PROTO_UDP => 0xFFFF,
        value => value,
    };
    segment[checksum_at..checksum_at + 2].copy_from_slice(&checksum.to_be_bytes());
    segment
}

fn pseudo_header_sum(addresses: &[u8], protocol: u8, len: usize) -> u32 {
    let len = u32::try_from(len).unwrap_or(u32::MAX);
    sum_words(0, addresses) + u32::from(protocol) + (len >> 16) + (len & 0xFFFF)
}

fn sum_words(acc: u32, bytes: &[u8]) -> u32 {
    bytes.chunks(2).fold(acc, |acc, pair| {
        let word = u16::from_be_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]);
        acc + u32::from(word)
    })
}

fn fold_checksum(mut acc: u32) -> u16 {
    while acc > 0xFFFF {
        acc = (acc & 0xFFFF) + (acc >> 16);
    }
    !u16::try_from(acc).unwrap_or(u16::MAX)
}
