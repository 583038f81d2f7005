//! LoRaWAN PHY payload decoder
//!
//! Splits an uplink into MHDR, MAC payload and MIC and types the MAC payload
//! for join requests and data uplinks. MIC verification and payload
//! decryption are not performed.

use thiserror::Error;

use super::types::{
    uplink_command_size, DataUpBody, DecodedPhyPayload, DevAddr, Eui64, FCtrl, Fragment,
    JoinRequestBody, MType, MacCommand, MacPayload, Mhdr,
};

/// MHDR (1) + MIC (4)
const MIN_PHY_LEN: usize = 5;

const JOIN_REQUEST_LEN: usize = 18;

/// DevAddr (4) + FCtrl (1) + FCnt (2)
const MIN_FHDR_LEN: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed PHY payload: {0}")]
    Malformed(&'static str),
}

/// Turns raw PHY bytes into a structured payload
pub trait PhyDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedPhyPayload, DecodeError>;
}

/// LoRaWAN 1.0.x uplink decoder
#[derive(Debug, Clone, Copy, Default)]
pub struct LorawanDecoder;

impl PhyDecoder for LorawanDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedPhyPayload, DecodeError> {
        if bytes.len() < MIN_PHY_LEN {
            return Err(DecodeError::Malformed("shorter than MHDR and MIC"));
        }

        let mhdr = Mhdr::from_byte(bytes[0]);
        let (body, mic_bytes) = bytes[1..].split_at(bytes.len() - MIN_PHY_LEN);
        let mut mic = [0u8; 4];
        mic.copy_from_slice(mic_bytes);

        let mac_payload = match mhdr.mtype {
            MType::JoinRequest => MacPayload::JoinRequest(decode_join_request(body)?),
            MType::UnconfirmedDataUp | MType::ConfirmedDataUp => {
                MacPayload::DataUp(decode_data_up(body)?)
            }
            _ => MacPayload::Other(body.to_vec()),
        };

        Ok(DecodedPhyPayload {
            mhdr,
            mac_payload,
            mic,
        })
    }
}

/// EUIs are little endian on air
fn eui_from_le(bytes: &[u8]) -> Eui64 {
    let mut eui = [0u8; 8];
    eui.copy_from_slice(&bytes[..8]);
    eui.reverse();
    Eui64(eui)
}

fn decode_join_request(body: &[u8]) -> Result<JoinRequestBody, DecodeError> {
    if body.len() != JOIN_REQUEST_LEN {
        return Err(DecodeError::Malformed("join request must be 18 bytes"));
    }

    Ok(JoinRequestBody {
        join_eui: eui_from_le(&body[0..8]),
        dev_eui: eui_from_le(&body[8..16]),
        dev_nonce: u16::from_le_bytes([body[16], body[17]]),
    })
}

fn decode_data_up(body: &[u8]) -> Result<DataUpBody, DecodeError> {
    if body.len() < MIN_FHDR_LEN {
        return Err(DecodeError::Malformed("frame header truncated"));
    }

    let dev_addr = DevAddr(u32::from_le_bytes([body[0], body[1], body[2], body[3]]));
    let fctrl = FCtrl::from_byte(body[4]);
    let fcnt = u16::from_le_bytes([body[5], body[6]]) as u32;

    let fopts_end = MIN_FHDR_LEN + fctrl.fopts_len as usize;
    if body.len() < fopts_end {
        return Err(DecodeError::Malformed("FOpts exceed frame"));
    }
    let fopts = decode_mac_commands(&body[MIN_FHDR_LEN..fopts_end]);

    let (fport, frm_payload) = match body.get(fopts_end) {
        Some(&port) => {
            let data = &body[fopts_end + 1..];
            let fragments = if data.is_empty() {
                Vec::new()
            } else {
                vec![Fragment::Data(data.to_vec())]
            };
            (Some(port), fragments)
        }
        None => (None, Vec::new()),
    };

    Ok(DataUpBody {
        dev_addr,
        fctrl,
        fcnt,
        fopts,
        fport,
        frm_payload,
    })
}

/// Split plaintext MAC commands.
///
/// An unknown CID ends parsing; the remaining bytes are kept under that CID
/// so they still surface as an unmarshalable command.
fn decode_mac_commands(mut bytes: &[u8]) -> Vec<MacCommand> {
    let mut commands = Vec::new();
    while let Some((&cid, rest)) = bytes.split_first() {
        match uplink_command_size(cid) {
            Some(size) if rest.len() >= size => {
                commands.push(MacCommand {
                    cid,
                    payload: rest[..size].to_vec(),
                });
                bytes = &rest[size..];
            }
            _ => {
                commands.push(MacCommand {
                    cid,
                    payload: rest.to_vec(),
                });
                break;
            }
        }
    }
    commands
}
