//! Semtech UDP packet-forwarder protocol (v1/v2)
//!
//! Datagram layout: version (1) | token (2) | identifier (1) | body.
//! PUSH_DATA and PULL_DATA carry the gateway EUI (8) before any JSON.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::reception::{CrcStatus, RadioMetadata, Reception, MAX_PHY_PAYLOAD_LEN};

pub const PUSH_DATA: u8 = 0x00;
pub const PUSH_ACK: u8 = 0x01;
pub const PULL_DATA: u8 = 0x02;
pub const PULL_ACK: u8 = 0x04;
pub const TX_ACK: u8 = 0x05;

const HEADER_LEN: usize = 4;
const GATEWAY_EUI_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum PacketError {
    #[error("datagram too short ({0} bytes)")]
    TooShort(usize),

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    #[error("unknown packet identifier 0x{0:02x}")]
    UnknownIdentifier(u8),

    #[error("invalid PUSH_DATA JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parsed upstream datagram
#[derive(Debug)]
pub enum UpstreamPacket {
    /// Each `rxpk` entry is parsed on its own; a bad body shows up as one error entry
    PushData {
        version: u8,
        token: u16,
        gateway_mac: String,
        rxpk: Vec<Result<RxPacket, PacketError>>,
    },
    PullData {
        version: u8,
        token: u16,
        gateway_mac: String,
    },
    TxAck {
        token: u16,
    },
}

impl UpstreamPacket {
    /// Acknowledgement owed to the gateway, if any
    pub fn ack(&self) -> Option<Vec<u8>> {
        match self {
            Self::PushData { version, token, .. } => {
                Some(ack_bytes(*version, *token, PUSH_ACK))
            }
            Self::PullData { version, token, .. } => {
                Some(ack_bytes(*version, *token, PULL_ACK))
            }
            Self::TxAck { .. } => None,
        }
    }
}

/// Acks echo the gateway's protocol version
fn ack_bytes(version: u8, token: u16, identifier: u8) -> Vec<u8> {
    let token = token.to_be_bytes();
    vec![version, token[0], token[1], identifier]
}

/// Data rate: LoRa datarate identifier ("SF7BW125") or FSK bits per second
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DataRate {
    Lora(String),
    Fsk(u32),
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lora(datr) => f.write_str(datr),
            Self::Fsk(bps) => write!(f, "FSK {} bps", bps),
        }
    }
}

/// One `rxpk` object from PUSH_DATA
#[derive(Debug, Clone, Deserialize)]
pub struct RxPacket {
    #[serde(default)]
    pub chan: u8,
    #[serde(default)]
    pub rfch: u8,
    /// Center frequency in MHz
    pub freq: f64,
    #[serde(default)]
    pub stat: i8,
    pub modu: String,
    pub datr: DataRate,
    #[serde(default)]
    pub codr: Option<String>,
    #[serde(default)]
    pub rssi: i32,
    #[serde(default)]
    pub size: usize,
    pub data: String,
}

#[derive(Debug, Deserialize)]
struct PushDataBody {
    #[serde(default)]
    rxpk: Vec<serde_json::Value>,
}

fn parse_rxpk(json: &[u8]) -> Vec<Result<RxPacket, PacketError>> {
    match serde_json::from_slice::<PushDataBody>(json) {
        Ok(body) => body
            .rxpk
            .into_iter()
            .map(|entry| serde_json::from_value(entry).map_err(PacketError::from))
            .collect(),
        Err(e) => vec![Err(e.into())],
    }
}

/// Parse an upstream datagram
pub fn parse_upstream(datagram: &[u8]) -> Result<UpstreamPacket, PacketError> {
    if datagram.len() < HEADER_LEN {
        return Err(PacketError::TooShort(datagram.len()));
    }

    let version = datagram[0];
    if version != 1 && version != 2 {
        return Err(PacketError::UnsupportedVersion(version));
    }
    let token = u16::from_be_bytes([datagram[1], datagram[2]]);
    let identifier = datagram[3];

    match identifier {
        PUSH_DATA => {
            let gateway_mac = gateway_mac(datagram)?;
            let json = &datagram[HEADER_LEN + GATEWAY_EUI_LEN..];
            Ok(UpstreamPacket::PushData {
                version,
                token,
                gateway_mac,
                rxpk: parse_rxpk(json),
            })
        }
        PULL_DATA => Ok(UpstreamPacket::PullData {
            version,
            token,
            gateway_mac: gateway_mac(datagram)?,
        }),
        TX_ACK => Ok(UpstreamPacket::TxAck { token }),
        other => Err(PacketError::UnknownIdentifier(other)),
    }
}

fn gateway_mac(datagram: &[u8]) -> Result<String, PacketError> {
    let end = HEADER_LEN + GATEWAY_EUI_LEN;
    if datagram.len() < end {
        return Err(PacketError::TooShort(datagram.len()));
    }
    Ok(hex::encode_upper(&datagram[HEADER_LEN..end]))
}

/// Parse "SF7BW125" into (spreading factor, bandwidth in Hz)
pub fn parse_lora_datr(datr: &str) -> Option<(u8, u32)> {
    let rest = datr.strip_prefix("SF")?;
    let (sf, bw) = rest.split_once("BW")?;
    let sf: u8 = sf.parse().ok()?;
    let bw_khz: u32 = bw.parse().ok()?;
    if !(5..=12).contains(&sf) {
        return None;
    }
    Some((sf, bw_khz * 1000))
}

impl RxPacket {
    /// Convert to a reception.
    ///
    /// Returns `None` for non-LoRa packets and payloads that cannot be decoded.
    pub fn to_reception(&self, gateway_mac: &str, timestamp: DateTime<Utc>) -> Option<Reception> {
        if self.modu != "LORA" {
            return None;
        }
        let (spreading_factor, bandwidth_hz) = match &self.datr {
            DataRate::Lora(datr) => parse_lora_datr(datr)?,
            DataRate::Fsk(_) => return None,
        };

        let payload = STANDARD.decode(&self.data).ok()?;
        if payload.len() > MAX_PHY_PAYLOAD_LEN {
            return None;
        }

        let radio = RadioMetadata {
            channel: self.chan,
            frequency_hz: (self.freq * 1_000_000.0).round() as u32,
            bandwidth_hz,
            spreading_factor,
            code_rate: self.codr.clone().unwrap_or_default(),
            rssi: self.rssi,
            crc: CrcStatus::from_stat(self.stat),
            gateway_mac: gateway_mac.to_string(),
            timestamp,
        };
        Some(Reception::new(radio, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_data(json: &str) -> Vec<u8> {
        let mut datagram = vec![2, 0xAB, 0xCD, PUSH_DATA];
        datagram.extend_from_slice(&[0xAA, 0x55, 0x5A, 0, 0, 0, 0, 0]);
        datagram.extend_from_slice(json.as_bytes());
        datagram
    }

    const RXPK: &str = r#"{"rxpk":[{"tmst":3512348611,"chan":2,"rfch":0,"freq":868.100000,"stat":1,"modu":"LORA","datr":"SF7BW125","codr":"4/5","rssi":-42,"lsnr":5.5,"size":5,"data":"AQIDBAU="}]}"#;

    #[test]
    fn test_parse_push_data() {
        let packet = parse_upstream(&push_data(RXPK)).unwrap();
        let UpstreamPacket::PushData { token, gateway_mac, rxpk, .. } = &packet else {
            panic!("expected PUSH_DATA, got {:?}", packet);
        };
        assert_eq!(*token, 0xABCD);
        assert_eq!(gateway_mac, "AA555A0000000000");
        assert_eq!(rxpk.len(), 1);
        assert_eq!(packet.ack(), Some(vec![2, 0xAB, 0xCD, PUSH_ACK]));

        let rx = rxpk[0].as_ref().unwrap();
        let reception = rx.to_reception(gateway_mac, Utc::now()).unwrap();
        assert_eq!(reception.phy_payload, vec![1, 2, 3, 4, 5]);
        assert_eq!(reception.radio.frequency_hz, 868_100_000);
        assert_eq!(reception.radio.bandwidth_hz, 125_000);
        assert_eq!(reception.radio.spreading_factor, 7);
        assert_eq!(reception.radio.code_rate, "4/5");
        assert_eq!(reception.radio.rssi, -42);
        assert_eq!(reception.radio.channel, 2);
        assert_eq!(reception.radio.crc, CrcStatus::Ok);
    }

    #[test]
    fn test_parse_push_data_stat_only() {
        let packet = parse_upstream(&push_data(r#"{"stat":{"rxnb":0}}"#)).unwrap();
        assert!(matches!(packet, UpstreamPacket::PushData { ref rxpk, .. } if rxpk.is_empty()));
    }

    #[test]
    fn test_parse_pull_data_and_tx_ack() {
        let mut pull = vec![2, 0x00, 0x01, PULL_DATA];
        pull.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let packet = parse_upstream(&pull).unwrap();
        assert!(matches!(packet, UpstreamPacket::PullData { ref gateway_mac, .. } if gateway_mac == "0102030405060708"));
        assert_eq!(packet.ack(), Some(vec![2, 0x00, 0x01, PULL_ACK]));

        let packet = parse_upstream(&[2, 0, 2, TX_ACK]).unwrap();
        assert!(packet.ack().is_none());
    }

    #[test]
    fn test_v1_acks_echo_version() {
        let mut push = push_data(r#"{"rxpk":[]}"#);
        push[0] = 1;
        let packet = parse_upstream(&push).unwrap();
        assert_eq!(packet.ack(), Some(vec![1, 0xAB, 0xCD, PUSH_ACK]));

        let mut pull = vec![1, 0x12, 0x34, PULL_DATA];
        pull.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let packet = parse_upstream(&pull).unwrap();
        assert_eq!(packet.ack(), Some(vec![1, 0x12, 0x34, PULL_ACK]));
    }

    #[test]
    fn test_bad_json_body_is_still_acked() {
        let packet = parse_upstream(&push_data("{not json")).unwrap();
        assert_eq!(packet.ack(), Some(vec![2, 0xAB, 0xCD, PUSH_ACK]));
        let UpstreamPacket::PushData { rxpk, .. } = packet else {
            panic!("expected PUSH_DATA");
        };
        assert_eq!(rxpk.len(), 1);
        assert!(matches!(rxpk[0], Err(PacketError::Json(_))));
    }

    #[test]
    fn test_bad_rxpk_entry_keeps_siblings() {
        let json = r#"{"rxpk":[
            {"chan":300,"freq":868.1,"stat":1,"modu":"LORA","datr":"SF7BW125","codr":"4/5","rssi":-40,"size":1,"data":"AQ=="},
            {"chan":1,"freq":868.3,"stat":1,"modu":"LORA","datr":"SF9BW125","codr":"4/6","rssi":-97,"size":3,"data":"QAEC"}
        ]}"#;
        let packet = parse_upstream(&push_data(json)).unwrap();
        let UpstreamPacket::PushData { rxpk, gateway_mac, .. } = packet else {
            panic!("expected PUSH_DATA");
        };
        assert_eq!(rxpk.len(), 2);
        assert!(rxpk[0].is_err());
        let reception = rxpk[1]
            .as_ref()
            .unwrap()
            .to_reception(&gateway_mac, Utc::now())
            .unwrap();
        assert_eq!(reception.phy_payload, vec![0x40, 0x01, 0x02]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_upstream(&[2, 0]), Err(PacketError::TooShort(2))));
        assert!(matches!(
            parse_upstream(&[3, 0, 0, PUSH_DATA]),
            Err(PacketError::UnsupportedVersion(3))
        ));
        assert!(matches!(
            parse_upstream(&[2, 0, 0, 0x09]),
            Err(PacketError::UnknownIdentifier(0x09))
        ));
    }

    #[test]
    fn test_parse_lora_datr() {
        assert_eq!(parse_lora_datr("SF7BW125"), Some((7, 125_000)));
        assert_eq!(parse_lora_datr("SF12BW500"), Some((12, 500_000)));
        assert_eq!(parse_lora_datr("SF13BW125"), None);
        assert_eq!(parse_lora_datr("50000"), None);
    }

    #[test]
    fn test_fsk_packets_are_skipped() {
        let json = r#"{"rxpk":[{"chan":8,"freq":868.8,"stat":1,"modu":"FSK","datr":50000,"rssi":-80,"size":2,"data":"AQI="}]}"#;
        let packet = parse_upstream(&push_data(json)).unwrap();
        let UpstreamPacket::PushData { rxpk, gateway_mac, .. } = packet else {
            panic!("expected PUSH_DATA");
        };
        let rx = rxpk[0].as_ref().unwrap();
        assert_eq!(rx.datr.to_string(), "FSK 50000 bps");
        assert!(rx.to_reception(&gateway_mac, Utc::now()).is_none());
    }
}
