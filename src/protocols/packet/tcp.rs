//! TCP segment header.

use crate::protocols::frame::Frame;
use crate::protocols::packet::{Packet, PacketHeader, PacketParseError};
use crate::utils::types::*;

use anyhow::{bail, Result};

/// TCP assigned protocol number.
pub const TCP_PROTOCOL: usize = 6;

// TCP flags.
pub const URG: u8 = 0b0010_0000;
pub const ACK: u8 = 0b0001_0000;
pub const PSH: u8 = 0b0000_1000;
pub const RST: u8 = 0b0000_0100;
pub const SYN: u8 = 0b0000_0010;
pub const FIN: u8 = 0b0000_0001;

/// Minimum valid TCP header length in bytes (no options).
const MIN_DATA_OFFSET_BYTES: usize = 20;

/// A TCP segment.
///
/// TCP options are not parsed by default.
#[derive(Debug)]
pub struct Tcp<'a> {
    header: TcpHeader,
    offset: usize,
    frame: Frame<'a>,
}

impl Tcp<'_> {
    /// Returns the sending port.
    #[inline]
    pub fn src_port(&self) -> u16 {
        self.header.src_port.into()
    }

    /// Returns the receiving port.
    #[inline]
    pub fn dst_port(&self) -> u16 {
        self.header.dst_port.into()
    }

    /// Returns the sequence number.
    #[inline]
    pub fn seq_no(&self) -> u32 {
        self.header.seq_no.into()
    }

    /// Returns the acknowledgment number.
    #[inline]
    pub fn ack_no(&self) -> u32 {
        self.header.ack_no.into()
    }

    /// Returns the header length measured in 32-bit words.
    #[inline]
    pub fn data_offset(&self) -> u8 {
        (self.header.data_offset_to_ns & 0xf0) >> 4
    }

    /// Returns the 8-bit TCP flags.
    #[inline]
    pub fn flags(&self) -> u8 {
        self.header.flags
    }

    /// Returns `true` if the urgent pointer flag is set.
    #[inline]
    pub fn urg(&self) -> bool {
        (self.flags() & URG) != 0
    }

    /// Returns `true` if the acknowledgment flag is set.
    #[inline]
    pub fn ack(&self) -> bool {
        (self.flags() & ACK) != 0
    }

    /// Returns `true` if the push flag is set.
    #[inline]
    pub fn psh(&self) -> bool {
        (self.flags() & PSH) != 0
    }

    /// Returns `true` if the reset flag is set.
    #[inline]
    pub fn rst(&self) -> bool {
        (self.flags() & RST) != 0
    }

    /// Returns `true` if the synchronize flag is set.
    #[inline]
    pub fn syn(&self) -> bool {
        (self.flags() & SYN) != 0
    }

    /// Returns `true` if the FIN flag is set.
    #[inline]
    pub fn fin(&self) -> bool {
        (self.flags() & FIN) != 0
    }
}

impl<'a> Packet<'a> for Tcp<'a> {
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
        None
    }

    fn parse_from(outer: &'a impl Packet<'a>) -> Result<Self>
    where
        Self: Sized,
    {
        let offset = outer.next_header_offset();
        if let Ok(header) = outer.frame().get_data(offset) {
            match outer.next_header() {
                Some(TCP_PROTOCOL) => {
                    let header: TcpHeader = unsafe { *header };
                    if header.length() < MIN_DATA_OFFSET_BYTES {
                        bail!(PacketParseError::HeaderTooShort);
                    }
                    Ok(Tcp {
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

/// Fixed portion of a TCP header.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
struct TcpHeader {
    src_port: u16be,
    dst_port: u16be,
    seq_no: u32be,
    ack_no: u32be,
    data_offset_to_ns: u8,
    flags: u8,
    window: u16be,
    checksum: u16be,
    urgent_pointer: u16be,
}

impl PacketHeader for TcpHeader {
    /// Header length measured in bytes. Equivalent to the payload offset.
    fn length(&self) -> usize {
        ((self.data_offset_to_ns & 0xf0) >> 2).into()
    }
}
