//! Capture source abstraction over `pcap`, covering both live interfaces
//! and offline capture files. Grounded in the teacher's `Capture::from_file`
//! loop in `runtime/offline.rs`, generalized to also open a live device the
//! way `pcap::Capture::from_device` does, since this tool has no DPDK poll
//! mode driver to read packets from.

use anyhow::{Context, Result};
use pcap::{Active, Capture, Device, Offline};

use crate::config::{CaptureSource, RuntimeConfig};

/// Outcome of polling the capture source for one more frame.
pub enum NextFrame {
    /// A frame was captured.
    Frame(Vec<u8>),
    /// The live read timeout elapsed with nothing captured; keep polling.
    Timeout,
    /// An offline replay reached the end of its capture file; stop.
    Eof,
}

/// Either side of `pcap::Capture`'s active/offline split, unified behind
/// one `next_packet` call so the runtime loop doesn't need to care which.
pub enum CaptureHandle {
    Live(Capture<Active>),
    Offline(Capture<Offline>),
}

impl CaptureHandle {
    pub fn open(config: &RuntimeConfig) -> Result<Self> {
        let mut handle = match &config.source {
            CaptureSource::Live { nic_name } => {
                let device = Device::list()
                    .context("failed to list capture devices")?
                    .into_iter()
                    .find(|d| &d.name == nic_name)
                    .with_context(|| format!("device {nic_name} not found"))?;
                let cap = Capture::from_device(device)
                    .context("failed to open device")?
                    .promisc(true)
                    .snaplen(65535)
                    .timeout(1000)
                    .open()
                    .with_context(|| format!("couldn't open device {nic_name}"))?;
                if cap.get_datalink() != pcap::Linktype::ETHERNET {
                    anyhow::bail!("device is not an Ethernet capture");
                }
                CaptureHandle::Live(cap)
            }
            CaptureSource::Offline { pcap_file } => {
                let cap = Capture::from_file(pcap_file).with_context(|| {
                    format!("couldn't open pcap file {}", pcap_file.display())
                })?;
                CaptureHandle::Offline(cap)
            }
        };

        handle.set_filter(&config.pcap_filter)?;

        Ok(handle)
    }

    fn set_filter(&mut self, filter: &str) -> Result<()> {
        match self {
            CaptureHandle::Live(cap) => cap
                .filter(filter, true)
                .with_context(|| format!("couldn't set filter {filter}")),
            CaptureHandle::Offline(cap) => cap
                .filter(filter, true)
                .with_context(|| format!("couldn't set filter {filter}")),
        }
    }

    /// Returns the next captured frame, distinguishing a live read timeout
    /// (retry) from an offline replay reaching its end (stop).
    pub fn next_frame(&mut self) -> NextFrame {
        let packet = match self {
            CaptureHandle::Live(cap) => cap.next_packet(),
            CaptureHandle::Offline(cap) => cap.next_packet(),
        };
        match packet {
            Ok(p) => NextFrame::Frame(p.data.to_vec()),
            Err(pcap::Error::TimeoutExpired) => NextFrame::Timeout,
            Err(pcap::Error::NoMorePackets) => NextFrame::Eof,
            Err(e) => {
                log::warn!("capture read error: {e}");
                NextFrame::Timeout
            }
        }
    }

    /// Returns `(received, dropped)` kernel-level packet counters, when the
    /// underlying capture supports them.
    pub fn stats(&mut self) -> Option<(u32, u32)> {
        let stats = match self {
            CaptureHandle::Live(cap) => cap.stats().ok()?,
            CaptureHandle::Offline(cap) => cap.stats().ok()?,
        };
        Some((stats.received, stats.dropped))
    }
}
