//! Ethernet → IPv4 → TCP/UDP frame decoding.
//!
//! Every offset derived from the frame (ihl, total length, data offset) is
//! checked against the captured length before a slice is taken. The returned
//! views borrow the capture buffer; nothing is copied.

use std::net::Ipv4Addr;

use etherparse::{Ethernet2HeaderSlice, Ipv4HeaderSlice, TcpHeaderSlice, UdpHeaderSlice};

use crate::config::TransportProtocol;
use crate::error::DecodeError;

pub const ETHERNET_HEADER_LEN: usize = 14;
pub const IPV4_MIN_HEADER_LEN: usize = 20;
pub const TCP_MIN_HEADER_LEN: usize = 20;
pub const UDP_HEADER_LEN: usize = 8;

/// Smallest frame that can carry an Ethernet and an IPv4 header.
pub const MIN_FRAME_LEN: usize = ETHERNET_HEADER_LEN + IPV4_MIN_HEADER_LEN;

const ETHERTYPE_IPV4: u16 = 0x0800;

/// IPv4 header view.
#[derive(Debug, Clone)]
pub struct NetworkHeader<'a> {
    slice: Ipv4HeaderSlice<'a>,
}

impl<'a> NetworkHeader<'a> {
    pub fn version(&self) -> u8 {
        self.slice.slice()[0] >> 4
    }

    /// Internet header length in 32-bit words.
    pub fn ihl(&self) -> u8 {
        self.slice.ihl()
    }

    pub fn header_len(&self) -> usize {
        usize::from(self.slice.ihl()) * 4
    }

    /// Declared datagram length, header included, in host byte order.
    pub fn total_len(&self) -> u16 {
        self.slice.total_len()
    }

    pub fn ttl(&self) -> u8 {
        self.slice.ttl()
    }

    pub fn protocol(&self) -> u8 {
        self.slice.protocol().0
    }

    pub fn source(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.slice.source())
    }

    pub fn destination(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.slice.destination())
    }
}

/// TCP or UDP header view, depending on the configured transport.
#[derive(Debug, Clone)]
pub enum TransportHeader<'a> {
    Tcp(TcpHeaderSlice<'a>),
    Udp(UdpHeaderSlice<'a>),
}

impl<'a> TransportHeader<'a> {
    pub fn source_port(&self) -> u16 {
        match self {
            TransportHeader::Tcp(tcp) => tcp.source_port(),
            TransportHeader::Udp(udp) => udp.source_port(),
        }
    }

    pub fn destination_port(&self) -> u16 {
        match self {
            TransportHeader::Tcp(tcp) => tcp.destination_port(),
            TransportHeader::Udp(udp) => udp.destination_port(),
        }
    }

    /// UDP length field, or the TCP header length (data offset × 4).
    pub fn declared_len(&self) -> u16 {
        match self {
            TransportHeader::Tcp(tcp) => u16::from(tcp.data_offset()) * 4,
            TransportHeader::Udp(udp) => udp.length(),
        }
    }

    fn header_len(&self) -> usize {
        match self {
            TransportHeader::Tcp(tcp) => tcp.slice().len(),
            TransportHeader::Udp(udp) => udp.slice().len(),
        }
    }
}

/// A decoded frame. Lives only as long as the capture buffer it borrows.
#[derive(Debug, Clone)]
pub struct Frame<'a> {
    captured_len: usize,
    link: Ethernet2HeaderSlice<'a>,
    network: NetworkHeader<'a>,
    transport: TransportHeader<'a>,
    payload: &'a [u8],
}

impl<'a> Frame<'a> {
    pub fn captured_len(&self) -> usize {
        self.captured_len
    }

    pub fn source_mac(&self) -> [u8; 6] {
        self.link.source()
    }

    pub fn destination_mac(&self) -> [u8; 6] {
        self.link.destination()
    }

    pub fn ether_type(&self) -> u16 {
        self.link.ether_type().0
    }

    pub fn network(&self) -> &NetworkHeader<'a> {
        &self.network
    }

    pub fn transport(&self) -> &TransportHeader<'a> {
        &self.transport
    }

    /// Transport payload: from the end of the transport header to the end of
    /// the IPv4 datagram, clipped to the captured bytes.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}

/// Decodes one captured Ethernet frame.
///
/// Only the first `caplen` bytes of `data` are treated as captured.
pub fn parse_frame(
    data: &[u8],
    caplen: usize,
    protocol: TransportProtocol,
) -> Result<Frame<'_>, DecodeError> {
    let captured = &data[..caplen.min(data.len())];
    if captured.len() < MIN_FRAME_LEN {
        return Err(DecodeError::Truncated {
            needed: MIN_FRAME_LEN,
            captured: captured.len(),
        });
    }

    let link = Ethernet2HeaderSlice::from_slice(captured).map_err(|_| DecodeError::Truncated {
        needed: ETHERNET_HEADER_LEN,
        captured: captured.len(),
    })?;
    let ether_type = link.ether_type().0;
    if ether_type != ETHERTYPE_IPV4 {
        return Err(DecodeError::NotIpv4(ether_type));
    }

    let (network, ip_payload) = parse_ipv4(captured)?;
    if network.protocol() != protocol.ip_number() {
        return Err(DecodeError::UnexpectedProtocol {
            expected: protocol.ip_number(),
            found: network.protocol(),
        });
    }

    let offset = ETHERNET_HEADER_LEN + network.header_len();
    let transport = parse_transport(ip_payload, offset, captured.len(), protocol)?;
    let payload = &ip_payload[transport.header_len()..];

    Ok(Frame {
        captured_len: captured.len(),
        link,
        network,
        transport,
        payload,
    })
}

/// Returns the header view and the datagram payload. The payload ends at the
/// declared total length, so Ethernet trailer padding is never included.
///
/// Known limitation: outbound frames captured on a host with TCP segmentation
/// offload often carry a total length of 0 and are rejected as `Malformed`.
fn parse_ipv4(captured: &[u8]) -> Result<(NetworkHeader<'_>, &[u8]), DecodeError> {
    let ip = &captured[ETHERNET_HEADER_LEN..];

    let version = ip[0] >> 4;
    if version != 4 {
        return Err(DecodeError::Malformed { layer: "ipv4" });
    }
    let header_len = usize::from(ip[0] & 0x0f) * 4;
    if header_len < IPV4_MIN_HEADER_LEN {
        return Err(DecodeError::Malformed { layer: "ipv4" });
    }
    if header_len > ip.len() {
        return Err(DecodeError::Truncated {
            needed: ETHERNET_HEADER_LEN + header_len,
            captured: captured.len(),
        });
    }
    let total_len = usize::from(u16::from_be_bytes([ip[2], ip[3]]));
    if total_len < header_len {
        return Err(DecodeError::Malformed { layer: "ipv4" });
    }

    let datagram = &ip[..total_len.min(ip.len())];
    let slice = Ipv4HeaderSlice::from_slice(&datagram[..header_len])
        .map_err(|_| DecodeError::Malformed { layer: "ipv4" })?;
    Ok((NetworkHeader { slice }, &datagram[header_len..]))
}

/// `offset` is where `segment` starts in the frame; it only feeds error values.
fn parse_transport(
    segment: &[u8],
    offset: usize,
    captured_len: usize,
    protocol: TransportProtocol,
) -> Result<TransportHeader<'_>, DecodeError> {
    let truncated = |needed: usize| DecodeError::Truncated {
        needed: offset + needed,
        captured: captured_len,
    };

    match protocol {
        TransportProtocol::Tcp => {
            if segment.len() < TCP_MIN_HEADER_LEN {
                return Err(truncated(TCP_MIN_HEADER_LEN));
            }
            let header_len = usize::from(segment[12] >> 4) * 4;
            if header_len < TCP_MIN_HEADER_LEN {
                return Err(DecodeError::Malformed { layer: "tcp" });
            }
            if header_len > segment.len() {
                return Err(truncated(header_len));
            }
            TcpHeaderSlice::from_slice(segment)
                .map(TransportHeader::Tcp)
                .map_err(|_| DecodeError::Malformed { layer: "tcp" })
        }
        TransportProtocol::Udp => {
            if segment.len() < UDP_HEADER_LEN {
                return Err(truncated(UDP_HEADER_LEN));
            }
            UdpHeaderSlice::from_slice(segment)
                .map(TransportHeader::Udp)
                .map_err(|_| truncated(UDP_HEADER_LEN))
        }
    }
}
