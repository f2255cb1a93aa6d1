//! Types for parsing captured link-layer frames.

pub mod frame;
pub mod packet;
