//! Flow key derivation and client-IP anonymization.

use std::fmt;
use std::net::Ipv4Addr;

/// Canonical identifier of a TCP flow's 4-tuple, in the direction it is
/// keyed (the SYN sender is always the "source" side of the key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub src_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_ip: Ipv4Addr,
    pub dst_port: u16,
}

impl FlowKey {
    pub fn new(src_ip: Ipv4Addr, src_port: u16, dst_ip: Ipv4Addr, dst_port: u16) -> Self {
        FlowKey {
            src_ip,
            src_port,
            dst_ip,
            dst_port,
        }
    }

    /// Swaps source and destination, yielding the key a reply packet on
    /// this same connection would be looked up under.
    pub fn reversed(&self) -> FlowKey {
        FlowKey::new(self.dst_ip, self.dst_port, self.src_ip, self.src_port)
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.src_ip, self.src_port, self.dst_ip, self.dst_port
        )
    }
}

/// Session-wide anonymization key, sampled once at start-up.
#[derive(Debug, Clone, Copy)]
pub struct AnonKey(u32);

impl AnonKey {
    pub fn from_seed(seed: u32) -> Self {
        AnonKey(seed)
    }

    /// Returns the anonymized display form of `key`: the client IPv4 is
    /// XOR'd with the session key and its high-order octet is forced to
    /// `10`, landing it in the display-only `10.0.0.0/8` space. Client port
    /// and the server endpoint are left untouched.
    pub fn anonymize(&self, key: &FlowKey) -> FlowKey {
        let bits = u32::from(key.src_ip) ^ self.0;
        let masked = (bits & 0x00ff_ffff) | (10u32 << 24);
        FlowKey::new(Ipv4Addr::from(masked), key.src_port, key.dst_ip, key.dst_port)
    }
}
