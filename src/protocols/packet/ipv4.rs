//! IPv4 packet header.

use crate::protocols::frame::Frame;
use crate::protocols::packet::{Packet, PacketHeader, PacketParseError};
use crate::utils::types::*;

use std::net::Ipv4Addr;

use anyhow::{bail, Result};

/// IPv4 EtherType.
pub const IPV4_PROTOCOL: usize = 0x0800;

/// Minimum valid IPv4 header length in bytes (no options).
const MIN_IHL_BYTES: usize = 20;

/// An IPv4 packet.
///
/// IPv4 options are not parsed; fields inside them are never read by this
/// tool, so option bytes are simply skipped over via [`Packet::header_len`].
#[derive(Debug)]
pub struct Ipv4<'a> {
    header: Ipv4Header,
    offset: usize,
    frame: Frame<'a>,
}

impl<'a> Ipv4<'a> {
    /// Returns the header length measured in 32-bit words (IHL).
    #[inline]
    pub fn ihl(&self) -> u8 {
        self.header.version_ihl & 0x0f
    }

    /// Returns the total length of the packet in bytes, including header and data.
    #[inline]
    pub fn total_length(&self) -> u16 {
        self.header.total_length.into()
    }

    /// Returns the encapsulated protocol identifier.
    #[inline]
    pub fn protocol(&self) -> u8 {
        self.header.protocol
    }

    /// Returns the sender's IPv4 address.
    #[inline]
    pub fn src_addr(&self) -> Ipv4Addr {
        self.header.src_addr
    }

    /// Returns the receiver's IPv4 address.
    #[inline]
    pub fn dst_addr(&self) -> Ipv4Addr {
        self.header.dst_addr
    }
}

impl<'a> Packet<'a> for Ipv4<'a> {
    fn frame(&self) -> &Frame<'a> {
        &self.frame
    }

    fn header_len(&self) -> usize {
        self.header.length()
    }

    fn next_header_offset(&self) -> usize {
        self.offset + self.header_len()
    }

    fn next_header(&self) -> Option<usize> {
        Some(self.protocol().into())
    }

    fn parse_from(outer: &'a impl Packet<'a>) -> Result<Self>
    where
        Self: Sized,
    {
        let offset = outer.next_header_offset();
        if let Ok(header) = outer.frame().get_data(offset) {
            match outer.next_header() {
                Some(IPV4_PROTOCOL) => {
                    let header: Ipv4Header = unsafe { *header };
                    if header.length() < MIN_IHL_BYTES {
                        bail!(PacketParseError::HeaderTooShort);
                    }
                    Ok(Ipv4 {
                        header,
                        offset,
                        frame: *outer.frame(),
                    })
                }
                _ => bail!(PacketParseError::InvalidProtocol),
            }
        } else {
            bail!(PacketParseError::InvalidRead)
        }
    }
}

/// Fixed portion of an IPv4 header.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
struct Ipv4Header {
    version_ihl: u8,
    dscp_ecn: u8,
    total_length: u16be,
    identification: u16be,
    flags_to_fragment_offset: u16be,
    time_to_live: u8,
    protocol: u8,
    header_checksum: u16be,
    src_addr: Ipv4Addr,
    dst_addr: Ipv4Addr,
}

impl PacketHeader for Ipv4Header {
    /// Header length measured in bytes. Equivalent to the payload offset.
    fn length(&self) -> usize {
        ((self.version_ihl & 0xf) << 2).into()
    }
}
