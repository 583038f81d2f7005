//! LoRaTap v1 radio header (35 bytes, big-endian)

use crate::reception::{CrcStatus, RadioMetadata};

/// Total LoRaTap header length in bytes
pub const LORATAP_HEADER_LEN: u16 = 35;

/// LoRaTap format version
pub const LORATAP_VERSION: u8 = 1;

/// LoRaWAN public sync word
pub const SYNC_WORD: u8 = 0x34;

/// Sentinel for RSSI fields that are not measured separately
pub const RSSI_NOT_MEASURED: u8 = 255;

/// LoRa code rate as encoded in the LoRaTap header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CodeRate {
    None = 0,
    Cr4_5 = 5,
    Cr4_6 = 6,
    Cr4_7 = 7,
    Cr4_8 = 8,
}

impl CodeRate {
    /// Map a gateway code-rate label. Unknown labels map to `None`.
    pub fn from_label(label: &str) -> Self {
        match label {
            "4/5" => Self::Cr4_5,
            "4/6" => Self::Cr4_6,
            "4/7" => Self::Cr4_7,
            "4/8" => Self::Cr4_8,
            _ => Self::None,
        }
    }
}

/// Packed LoRaTap flags byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoraTapFlags {
    pub mod_fsk: bool,
    pub iq_inverted: bool,
    pub implicit_header: bool,
    pub crc_ok: bool,
    pub crc_invalid: bool,
    pub no_crc: bool,
    pub padding: bool,
}

impl LoraTapFlags {
    /// Flags for an uplink with the given CRC status
    pub fn for_crc(crc: CrcStatus) -> Self {
        Self {
            crc_ok: crc == CrcStatus::Ok,
            crc_invalid: crc == CrcStatus::Invalid,
            no_crc: crc == CrcStatus::Missing,
            ..Self::default()
        }
    }

    pub fn pack(&self) -> u8 {
        (self.mod_fsk as u8)
            | (self.iq_inverted as u8) << 1
            | (self.implicit_header as u8) << 2
            | (self.crc_ok as u8) << 3
            | (self.crc_invalid as u8) << 4
            | (self.no_crc as u8) << 5
            | (self.padding as u8) << 6
    }

    /// Bit 7 is ignored
    #[allow(dead_code)]
    pub fn unpack(flags: u8) -> Self {
        Self {
            mod_fsk: flags & 0x01 != 0,
            iq_inverted: flags & 0x02 != 0,
            implicit_header: flags & 0x04 != 0,
            crc_ok: flags & 0x08 != 0,
            crc_invalid: flags & 0x10 != 0,
            no_crc: flags & 0x20 != 0,
            padding: flags & 0x40 != 0,
        }
    }
}

/// Channel descriptor sub-record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoraTapChannel {
    pub frequency: u32,
    /// Bandwidth in units of 125 kHz
    pub bandwidth: u8,
    pub spreading_factor: u8,
}

/// Signal quality sub-record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoraTapRssi {
    pub packet_rssi: u8,
    pub max_rssi: u8,
    pub current_rssi: u8,
    pub snr: u8,
}

/// Fixed-size LoRaTap header preceding every captured payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoraTapHeader {
    pub version: u8,
    pub padding: u8,
    pub length: u16,
    pub channel: LoraTapChannel,
    pub rssi: LoraTapRssi,
    pub sync_word: u8,
    pub source_gw: u64,
    pub timestamp: u32,
    pub flags: LoraTapFlags,
    pub code_rate: CodeRate,
    pub data_rate: u16,
    pub if_channel: u8,
    pub rf_chain: u8,
    pub tag: u16,
}

impl LoraTapHeader {
    /// Build the header for one reception's radio metadata
    pub fn from_radio(radio: &RadioMetadata) -> Self {
        Self {
            version: LORATAP_VERSION,
            padding: 0,
            length: LORATAP_HEADER_LEN,
            channel: LoraTapChannel {
                frequency: radio.frequency_hz,
                bandwidth: (radio.bandwidth_hz / 125_000) as u8,
                spreading_factor: radio.spreading_factor,
            },
            rssi: LoraTapRssi {
                packet_rssi: RSSI_NOT_MEASURED,
                max_rssi: RSSI_NOT_MEASURED,
                // Two's-complement truncation of the dBm value
                current_rssi: radio.rssi as u8,
                snr: 0,
            },
            sync_word: SYNC_WORD,
            source_gw: radio.gateway_id(),
            timestamp: radio.timestamp.timestamp() as u32,
            flags: LoraTapFlags::for_crc(radio.crc),
            code_rate: CodeRate::from_label(&radio.code_rate),
            data_rate: 0,
            if_channel: radio.channel,
            rf_chain: 0,
            tag: 0,
        }
    }

    /// Append the 35-byte big-endian encoding to `buf`
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.version);
        buf.push(self.padding);
        buf.extend_from_slice(&self.length.to_be_bytes());
        buf.extend_from_slice(&self.channel.frequency.to_be_bytes());
        buf.push(self.channel.bandwidth);
        buf.push(self.channel.spreading_factor);
        buf.push(self.rssi.packet_rssi);
        buf.push(self.rssi.max_rssi);
        buf.push(self.rssi.current_rssi);
        buf.push(self.rssi.snr);
        buf.push(self.sync_word);
        buf.extend_from_slice(&self.source_gw.to_be_bytes());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.push(self.flags.pack());
        buf.push(self.code_rate as u8);
        buf.extend_from_slice(&self.data_rate.to_be_bytes());
        buf.push(self.if_channel);
        buf.push(self.rf_chain);
        buf.extend_from_slice(&self.tag.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reception::fixtures;

    #[test]
    fn test_code_rate_labels() {
        assert_eq!(CodeRate::from_label("4/5") as u8, 5);
        assert_eq!(CodeRate::from_label("4/6") as u8, 6);
        assert_eq!(CodeRate::from_label("4/7") as u8, 7);
        assert_eq!(CodeRate::from_label("4/8") as u8, 8);
    }

    #[test]
    fn test_code_rate_unknown_is_none() {
        for label in ["", "4/9", "5/4", "4/5 ", "garbage", "4/5/6", "\u{0}"] {
            assert_eq!(CodeRate::from_label(label), CodeRate::None, "label {:?}", label);
        }
    }

    #[test]
    fn test_flags_pack_unpack() {
        let flags = LoraTapFlags {
            crc_ok: true,
            iq_inverted: true,
            ..Default::default()
        };
        assert_eq!(flags.pack(), 0b0000_1010);
        assert_eq!(LoraTapFlags::unpack(0b0000_1010), flags);

        let all = LoraTapFlags::unpack(0xFF);
        assert_eq!(all.pack(), 0x7F);
    }

    #[test]
    fn test_flags_for_crc() {
        assert_eq!(LoraTapFlags::for_crc(CrcStatus::Ok).pack(), 0x08);
        assert_eq!(LoraTapFlags::for_crc(CrcStatus::Invalid).pack(), 0x10);
        assert_eq!(LoraTapFlags::for_crc(CrcStatus::Missing).pack(), 0x20);
    }

    #[test]
    fn test_header_encoding() {
        let header = LoraTapHeader::from_radio(&fixtures::radio());
        let mut buf = Vec::new();
        header.encode_into(&mut buf);

        assert_eq!(buf.len(), LORATAP_HEADER_LEN as usize);
        assert_eq!(&buf[0..4], &[1, 0, 0, 35]);
        assert_eq!(&buf[4..8], &868_100_000u32.to_be_bytes());
        assert_eq!(buf[8], 1); // 125 kHz
        assert_eq!(buf[9], 7);
        assert_eq!(&buf[10..14], &[255, 255, (-42i32) as u8, 0]);
        assert_eq!(buf[14], SYNC_WORD);
        assert_eq!(&buf[15..23], &[0xAA, 0x55, 0x5A, 0, 0, 0, 0, 0]);
        assert_eq!(&buf[23..27], &1_700_000_000u32.to_be_bytes());
        assert_eq!(buf[27], 0x08);
        assert_eq!(buf[28], 5);
        assert_eq!(&buf[29..], &[0, 0, 2, 0, 0, 0]);
    }
}
