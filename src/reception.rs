//! Reception data model - one observed uplink and its radio metadata

use chrono::{DateTime, Utc};

/// Largest PHY payload the regional plan allows
pub const MAX_PHY_PAYLOAD_LEN: usize = 255;

/// CRC status reported by the concentrator for a received packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrcStatus {
    #[default]
    Ok,
    Invalid,
    Missing,
}

impl CrcStatus {
    /// Map the packet-forwarder `stat` field (1, -1, 0)
    pub fn from_stat(stat: i8) -> Self {
        match stat {
            1 => Self::Ok,
            -1 => Self::Invalid,
            _ => Self::Missing,
        }
    }
}

/// Radio parameters attached to every uplink
#[derive(Debug, Clone, PartialEq)]
pub struct RadioMetadata {
    /// Concentrator IF channel index
    pub channel: u8,

    /// Center frequency in Hz
    pub frequency_hz: u32,

    /// Bandwidth in Hz
    pub bandwidth_hz: u32,

    /// Spreading factor (5-12)
    pub spreading_factor: u8,

    /// Code-rate label as reported by the gateway, e.g. "4/5"
    pub code_rate: String,

    /// Signal strength in dBm
    pub rssi: i32,

    pub crc: CrcStatus,

    /// Gateway MAC/EUI as a hex string
    pub gateway_mac: String,

    /// Wall-clock instant the reception was observed
    pub timestamp: DateTime<Utc>,
}

impl RadioMetadata {
    /// Gateway identifier as a 64-bit value.
    ///
    /// Invalid or oversized hex degrades to 0.
    pub fn gateway_id(&self) -> u64 {
        parse_gateway_id(&self.gateway_mac)
    }
}

/// One uplink event: radio metadata plus the raw over-the-air bytes
#[derive(Debug, Clone, PartialEq)]
pub struct Reception {
    pub radio: RadioMetadata,
    pub phy_payload: Vec<u8>,
}

impl Reception {
    pub fn new(radio: RadioMetadata, phy_payload: Vec<u8>) -> Self {
        Self { radio, phy_payload }
    }
}

/// Parse a hex-encoded gateway MAC into its 64-bit value
pub fn parse_gateway_id(mac: &str) -> u64 {
    let digits: String = mac.chars().filter(|c| *c != ':' && *c != '-').collect();
    if digits.is_empty() || digits.len() > 16 {
        return 0;
    }
    u64::from_str_radix(&digits, 16).unwrap_or(0)
}
