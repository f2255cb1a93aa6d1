//! Captured frame buffer.
//!
//! Unlike the teacher's `Mbuf`, which wraps a DPDK-owned `rte_mbuf` for
//! zero-copy access to mempool buffers, a `Frame` here simply wraps the byte
//! slice handed back by the capture source (`pcap::Packet::data`) for the
//! lifetime of that packet's processing. There is no DPDK runtime in this
//! tool: one frame is read, dispatched, and dropped before the next is read.

use crate::protocols::packet::PacketHeader;

use anyhow::{bail, Result};
use thiserror::Error;

/// A single captured link-layer frame.
#[derive(Clone, Copy)]
pub struct Frame<'a> {
    data: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Wraps a captured frame's bytes. Does not copy.
    pub fn new(data: &'a [u8]) -> Self {
        Frame { data }
    }

    /// Returns the length of the captured data.
    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    /// Returns the entire captured frame as a byte slice.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Returns a byte slice of `count` bytes at `offset`. Errors if the
    /// requested range runs past the captured data.
    pub fn get_data_slice(&self, offset: usize, count: usize) -> Result<&'a [u8]> {
        if offset > self.data_len() {
            bail!(FrameError::BadOffset);
        }
        match offset.checked_add(count) {
            Some(end) if end <= self.data_len() => Ok(&self.data[offset..end]),
            _ => bail!(FrameError::ReadPastBuffer),
        }
    }

    /// Reads the data at `offset` as `T`. Errors if `offset` is past the end
    /// of the captured data or `T` would read past it.
    ///
    /// # Safety
    /// The caller must only invoke this for `T` types that are valid to
    /// construct from an arbitrary byte pattern (i.e. `#[repr(C, packed)]`
    /// structs of plain integers), matching the teacher's `Mbuf::get_data`
    /// contract.
    pub fn get_data<T: PacketHeader>(&self, offset: usize) -> Result<*const T> {
        let bytes = self.get_data_slice(offset, T::size_of())?;
        Ok(bytes.as_ptr() as *const T)
    }
}

#[derive(Error, Debug)]
pub(crate) enum FrameError {
    #[error("Offset exceeds captured frame length")]
    BadOffset,

    #[error("Data read exceeds captured frame length")]
    ReadPastBuffer,
}
