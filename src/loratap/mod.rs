//! LoRaTap capture encoding
//!
//! Each reception becomes one pcap record: a little-endian frame header,
//! the 35-byte LoRaTap radio header and the raw PHY payload.

mod header;
pub mod pcap;
mod writer;

pub use writer::{open_capture, CaptureWriter};

#[cfg(test)]
pub(crate) use writer::test_sinks;
