//! LoRaWAN data types

use std::fmt;

/// MAC message types (MHDR bits 7..5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MType {
    JoinRequest = 0,
    JoinAccept = 1,
    UnconfirmedDataUp = 2,
    UnconfirmedDataDown = 3,
    ConfirmedDataUp = 4,
    ConfirmedDataDown = 5,
    RejoinRequest = 6,
    Proprietary = 7,
}

impl From<u8> for MType {
    fn from(mhdr: u8) -> Self {
        match (mhdr >> 5) & 0x07 {
            0 => Self::JoinRequest,
            1 => Self::JoinAccept,
            2 => Self::UnconfirmedDataUp,
            3 => Self::UnconfirmedDataDown,
            4 => Self::ConfirmedDataUp,
            5 => Self::ConfirmedDataDown,
            6 => Self::RejoinRequest,
            _ => Self::Proprietary,
        }
    }
}

impl fmt::Display for MType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::JoinRequest => "JoinRequest",
            Self::JoinAccept => "JoinAccept",
            Self::UnconfirmedDataUp => "UnconfirmedDataUp",
            Self::UnconfirmedDataDown => "UnconfirmedDataDown",
            Self::ConfirmedDataUp => "ConfirmedDataUp",
            Self::ConfirmedDataDown => "ConfirmedDataDown",
            Self::RejoinRequest => "RejoinRequest",
            Self::Proprietary => "Proprietary",
        };
        f.write_str(name)
    }
}

/// MAC header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mhdr {
    pub mtype: MType,
    pub major: u8,
}

impl Mhdr {
    pub fn from_byte(b: u8) -> Self {
        Self {
            mtype: MType::from(b),
            major: b & 0x03,
        }
    }
}

/// 64-bit extended unique identifier, most-significant byte first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Eui64(pub [u8; 8]);

impl fmt::Display for Eui64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// 32-bit device address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DevAddr(pub u32);

impl DevAddr {
    /// Network identifier carried in the top 7 bits of the address
    pub fn nwk_id(&self) -> u8 {
        (self.0 >> 25) as u8
    }
}

impl fmt::Display for DevAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Uplink frame control byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FCtrl {
    pub adr: bool,
    pub adr_ack_req: bool,
    pub ack: bool,
    pub class_b: bool,
    pub fopts_len: u8,
}

impl FCtrl {
    pub fn from_byte(b: u8) -> Self {
        Self {
            adr: b & 0x80 != 0,
            adr_ack_req: b & 0x40 != 0,
            ack: b & 0x20 != 0,
            class_b: b & 0x10 != 0,
            fopts_len: b & 0x0F,
        }
    }
}

/// Uplink MAC command (CID + payload)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacCommand {
    pub cid: u8,
    pub payload: Vec<u8>,
}

/// Payload size of each uplink MAC command, `None` for unknown CIDs
pub fn uplink_command_size(cid: u8) -> Option<usize> {
    match cid {
        0x01 => Some(1), // ResetInd
        0x02 => Some(0), // LinkCheckReq
        0x03 => Some(1), // LinkADRAns
        0x04 => Some(0), // DutyCycleAns
        0x05 => Some(1), // RXParamSetupAns
        0x06 => Some(2), // DevStatusAns
        0x07 => Some(1), // NewChannelAns
        0x08 => Some(0), // RXTimingSetupAns
        0x09 => Some(0), // TxParamSetupAns
        0x0A => Some(1), // DlChannelAns
        0x0B => Some(1), // RekeyInd
        0x0C => Some(0), // ADRParamSetupAns
        0x0D => Some(0), // DeviceTimeReq
        0x0F => Some(1), // RejoinParamSetupAns
        _ => None,
    }
}

/// Error marshaling a single frame-payload fragment
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FragmentError {
    #[error("unknown uplink MAC command 0x{0:02x}")]
    UnknownCommand(u8),

    #[error("MAC command 0x{cid:02x} expects {expected} payload bytes, got {actual}")]
    CommandSize {
        cid: u8,
        expected: usize,
        actual: usize,
    },
}

/// One element of the frame payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Opaque (possibly encrypted) application data
    Data(Vec<u8>),
    /// Plaintext MAC commands carried on port 0. `LorawanDecoder` does not
    /// decrypt, so it never yields this variant.
    #[cfg_attr(not(test), allow(dead_code))]
    MacCommand(MacCommand),
}

impl Fragment {
    /// Serialize back to the over-the-air bytes
    pub fn marshal(&self) -> Result<Vec<u8>, FragmentError> {
        match self {
            Self::Data(bytes) => Ok(bytes.clone()),
            Self::MacCommand(cmd) => {
                let expected =
                    uplink_command_size(cmd.cid).ok_or(FragmentError::UnknownCommand(cmd.cid))?;
                if cmd.payload.len() != expected {
                    return Err(FragmentError::CommandSize {
                        cid: cmd.cid,
                        expected,
                        actual: cmd.payload.len(),
                    });
                }
                let mut out = Vec::with_capacity(1 + expected);
                out.push(cmd.cid);
                out.extend_from_slice(&cmd.payload);
                Ok(out)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequestBody {
    pub join_eui: Eui64,
    pub dev_eui: Eui64,
    pub dev_nonce: u16,
}

/// Body shared by confirmed and unconfirmed uplinks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUpBody {
    pub dev_addr: DevAddr,
    pub fctrl: FCtrl,
    pub fcnt: u32,
    pub fopts: Vec<MacCommand>,
    pub fport: Option<u8>,
    pub frm_payload: Vec<Fragment>,
}

/// MAC payload as produced by the PHY decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacPayload {
    JoinRequest(JoinRequestBody),
    DataUp(DataUpBody),
    /// Raw MAC payload of any other message type
    Other(Vec<u8>),
}

/// Decoded PHY payload: MHDR, typed MAC payload and MIC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPhyPayload {
    pub mhdr: Mhdr,
    pub mac_payload: MacPayload,
    pub mic: [u8; 4],
}
