//! pcap framing for LoRaTap captures
//!
//! Global and per-frame headers are little endian, the LoRaTap header that
//! follows each frame header is big endian, and the PHY payload is copied
//! verbatim.
//!
//! Useful resources:
//! * https://wiki.wireshark.org/Development/LibpcapFileFormat
//! * https://www.tcpdump.org/linktypes.html

use std::io::Write;

use super::header::{LoraTapHeader, LORATAP_HEADER_LEN};
use crate::reception::Reception;

pub const PCAP_MAGIC: u32 = 0xA1B2_C3D4;
pub const VERSION_MAJOR: u16 = 2;
pub const VERSION_MINOR: u16 = 4;

/// Per-frame snap length
pub const SNAPLEN: u32 = 255;

/// LINKTYPE_LORATAP
pub const LINKTYPE_LORATAP: u32 = 270;

pub const GLOBAL_HEADER_LEN: usize = 24;
pub const FRAME_HEADER_LEN: usize = 16;

/// pcap file header, written once per stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalHeader {
    pub magic: u32,
    pub version_major: u16,
    pub version_minor: u16,
    pub this_zone: i32,
    pub sig_figs: u32,
    pub snaplen: u32,
    pub network: u32,
}

impl Default for GlobalHeader {
    fn default() -> Self {
        Self {
            magic: PCAP_MAGIC,
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            this_zone: 0,
            sig_figs: 0,
            snaplen: SNAPLEN,
            network: LINKTYPE_LORATAP,
        }
    }
}

impl GlobalHeader {
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.magic.to_le_bytes());
        buf.extend_from_slice(&self.version_major.to_le_bytes());
        buf.extend_from_slice(&self.version_minor.to_le_bytes());
        buf.extend_from_slice(&self.this_zone.to_le_bytes());
        buf.extend_from_slice(&self.sig_figs.to_le_bytes());
        buf.extend_from_slice(&self.snaplen.to_le_bytes());
        buf.extend_from_slice(&self.network.to_le_bytes());
    }
}

/// pcap record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub ts_sec: u32,
    pub ts_usec: u32,
    pub incl_len: u32,
    pub orig_len: u32,
}

impl FrameHeader {
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.ts_sec.to_le_bytes());
        buf.extend_from_slice(&self.ts_usec.to_le_bytes());
        buf.extend_from_slice(&self.incl_len.to_le_bytes());
        buf.extend_from_slice(&self.orig_len.to_le_bytes());
    }
}

/// Write the pcap global header
pub fn write_global_header<W: Write>(sink: &mut W) -> std::io::Result<()> {
    let mut buf = Vec::with_capacity(GLOBAL_HEADER_LEN);
    GlobalHeader::default().encode_into(&mut buf);
    sink.write_all(&buf)
}

/// Encode one reception as frame header + LoRaTap header + payload
pub fn encode_frame(reception: &Reception) -> Vec<u8> {
    let payload = &reception.phy_payload;
    let captured = (payload.len() + LORATAP_HEADER_LEN as usize) as u32;
    let timestamp = reception.radio.timestamp;

    let frame_header = FrameHeader {
        ts_sec: timestamp.timestamp() as u32,
        ts_usec: timestamp.timestamp_subsec_micros(),
        incl_len: captured,
        orig_len: captured,
    };

    let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + captured as usize);
    frame_header.encode_into(&mut buf);
    LoraTapHeader::from_radio(&reception.radio).encode_into(&mut buf);
    buf.extend_from_slice(payload);
    buf
}

/// Write one frame to the sink.
///
/// The frame is assembled first and handed to the sink in a single
/// `write_all`; a failing sink may still hold a truncated frame.
pub fn write_frame<W: Write>(sink: &mut W, reception: &Reception) -> std::io::Result<usize> {
    let frame = encode_frame(reception);
    sink.write_all(&frame)?;
    Ok(frame.len())
}
