//! Header decoder: turns a captured frame into the fields the flow state
//! machine and reassembler need, or drops it.
//!
//! Grounded on `L4Context::new` in the teacher's connection tracker, which
//! chains `Ethernet -> Ipv4 -> Tcp` via `Packet::parse_to` and derives the
//! payload offset/length from the parsed headers rather than trusting the
//! captured length directly.

use crate::protocols::frame::Frame;
use crate::protocols::packet::ethernet::Ethernet;
use crate::protocols::packet::ipv4::Ipv4;
use crate::protocols::packet::tcp::{Tcp, ACK, FIN, PSH, RST, SYN, URG};
use crate::protocols::packet::Packet;

use std::net::Ipv4Addr;

/// Decoded TCP segment, with just the fields the rest of this tool needs.
#[derive(Debug, Clone, Copy)]
pub struct TcpSegment<'a> {
    pub src_addr: Ipv4Addr,
    pub dst_addr: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub seq_no: u32,
    pub ack_no: u32,
    pub flags: u8,
    pub payload: &'a [u8],
}

impl<'a> TcpSegment<'a> {
    pub fn syn(&self) -> bool {
        self.flags & SYN != 0
    }
    pub fn ack(&self) -> bool {
        self.flags & ACK != 0
    }
    pub fn fin(&self) -> bool {
        self.flags & FIN != 0
    }
    pub fn rst(&self) -> bool {
        self.flags & RST != 0
    }
    pub fn psh(&self) -> bool {
        self.flags & PSH != 0
    }
    pub fn urg(&self) -> bool {
        self.flags & URG != 0
    }

    /// Returns `true` if this segment carries no information a flow needs
    /// to react to: no payload and no control flag set.
    pub fn is_empty_ack(&self) -> bool {
        self.payload.is_empty() && self.flags & (SYN | FIN | RST) == 0
    }
}

/// Decodes a captured frame as an Ethernet/IPv4/TCP segment.
///
/// Returns `None` for anything that is not well-formed IPv4-over-Ethernet
/// TCP: truncated frames, non-IPv4 EtherType, non-TCP protocol, undersized
/// IP/TCP headers, or a negative computed payload length. All of these are
/// silent drops per the frame-level error policy; nothing here is surfaced
/// as an error.
pub fn decode_tcp(data: &[u8]) -> Option<TcpSegment<'_>> {
    let frame = Frame::new(data);
    let eth = Ethernet::parse_from(&EthernetRoot(frame)).ok()?;
    let ipv4 = eth.parse_to::<Ipv4>().ok()?;
    let tcp = ipv4.parse_to::<Tcp>().ok()?;

    let payload_size = (ipv4.total_length() as usize)
        .checked_sub(ipv4.header_len() + tcp.header_len())?;
    let payload = frame
        .get_data_slice(tcp.next_header_offset(), payload_size)
        .ok()?;

    Some(TcpSegment {
        src_addr: ipv4.src_addr(),
        dst_addr: ipv4.dst_addr(),
        src_port: tcp.src_port(),
        dst_port: tcp.dst_port(),
        seq_no: tcp.seq_no(),
        ack_no: tcp.ack_no(),
        flags: tcp.flags(),
        payload,
    })
}

/// A degenerate root `Packet` over the raw frame, so `Ethernet::parse_from`
/// can be invoked uniformly through the `Packet` trait like every other
/// layer in the stack.
struct EthernetRoot<'a>(Frame<'a>);

impl<'a> Packet<'a> for EthernetRoot<'a> {
    fn frame(&self) -> &Frame<'a> {
        &self.0
    }
    fn header_len(&self) -> usize {
        0
    }
    fn next_header_offset(&self) -> usize {
        0
    }
    fn next_header(&self) -> Option<usize> {
        None
    }
    fn parse_from(_outer: &'a impl Packet<'a>) -> anyhow::Result<Self>
    where
        Self: Sized,
    {
        unreachable!("EthernetRoot is only ever constructed directly")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_frame(payload: &[u8], seq: u32, flags: u8) -> Vec<u8> {
        let mut buf = Vec::new();
        // Ethernet header: dst, src MACs, EtherType = IPv4
        buf.extend_from_slice(&[0u8; 6]);
        buf.extend_from_slice(&[1u8; 6]);
        buf.extend_from_slice(&0x0800u16.to_be_bytes());

        let ip_header_len = 20usize;
        let tcp_header_len = 20usize;
        let total_length = (ip_header_len + tcp_header_len + payload.len()) as u16;

        // IPv4 header
        buf.push(0x45); // version 4, IHL 5
        buf.push(0); // DSCP/ECN
        buf.extend_from_slice(&total_length.to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes()); // identification
        buf.extend_from_slice(&0u16.to_be_bytes()); // flags/frag
        buf.push(64); // TTL
        buf.push(6); // protocol = TCP
        buf.extend_from_slice(&0u16.to_be_bytes()); // checksum
        buf.extend_from_slice(&[10, 0, 0, 1]); // src
        buf.extend_from_slice(&[10, 0, 0, 2]); // dst

        // TCP header
        buf.extend_from_slice(&1234u16.to_be_bytes()); // src port
        buf.extend_from_slice(&80u16.to_be_bytes()); // dst port
        buf.extend_from_slice(&seq.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes()); // ack
        buf.push(0x50); // data offset 5, no NS
        buf.push(flags);
        buf.extend_from_slice(&0xffffu16.to_be_bytes()); // window
        buf.extend_from_slice(&0u16.to_be_bytes()); // checksum
        buf.extend_from_slice(&0u16.to_be_bytes()); // urgent pointer

        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn decodes_well_formed_segment() {
        let frame = build_frame(b"hello", 1000, PSH | ACK);
        let seg = decode_tcp(&frame).expect("should decode");
        assert_eq!(seg.src_addr, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(seg.dst_addr, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(seg.src_port, 1234);
        assert_eq!(seg.dst_port, 80);
        assert_eq!(seg.seq_no, 1000);
        assert_eq!(seg.payload, b"hello");
        assert!(seg.psh());
        assert!(seg.ack());
    }

    #[test]
    fn rejects_truncated_frame() {
        let frame = build_frame(b"hello", 1000, PSH | ACK);
        let truncated = &frame[..frame.len() - 10];
        assert!(decode_tcp(truncated).is_none());
    }

    #[test]
    fn rejects_non_ipv4_ethertype() {
        let mut frame = build_frame(b"hello", 1000, PSH | ACK);
        frame[12] = 0x86;
        frame[13] = 0xdd; // IPv6 EtherType
        assert!(decode_tcp(&frame).is_none());
    }

    #[test]
    fn empty_ack_has_no_information() {
        let frame = build_frame(b"", 1000, ACK);
        let seg = decode_tcp(&frame).expect("should decode");
        assert!(seg.is_empty_ack());
    }

    #[test]
    fn syn_with_no_payload_is_not_an_empty_ack() {
        let frame = build_frame(b"", 1000, SYN);
        let seg = decode_tcp(&frame).expect("should decode");
        assert!(!seg.is_empty_ack());
    }
}
