//! MAC message classification
//!
//! Maps a decoded PHY payload to a message kind, a display summary and the
//! structured fields used for persistence. Classification is a pure function
//! of its input.

use std::fmt;

use thiserror::Error;
use tracing::debug;

use super::types::{
    DataUpBody, DecodedPhyPayload, DevAddr, Eui64, JoinRequestBody, MType, MacPayload,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    JoinRequest,
    UnconfirmedDataUp,
    ConfirmedDataUp,
    Other,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::JoinRequest => "Join Request",
            Self::UnconfirmedDataUp => "Unconfirmed Data Up",
            Self::ConfirmedDataUp => "Confirmed Data Up",
            Self::Other => "Other",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassificationError {
    #[error("{mtype} body does not match its message type")]
    MalformedBody { mtype: MType },
}

/// Ordered display fields of a classified message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Summary(Vec<(&'static str, String)>);

impl Summary {
    pub fn push(&mut self, name: &'static str, value: impl Into<String>) {
        self.0.push((name, value.into()));
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{}: {}", key, value)?;
        }
        Ok(())
    }
}

/// Decoded fields handed to the persistence collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuredFields {
    JoinRequest {
        dev_eui: Eui64,
        join_eui: Eui64,
        dev_nonce: u16,
    },
    DataUp {
        dev_addr: DevAddr,
        nwk_id: u8,
        fport: Option<u8>,
        fcnt: u32,
        payload_len: usize,
    },
    Other {
        mtype: MType,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedMessage {
    pub kind: MessageKind,
    pub summary: Summary,
    pub fields: StructuredFields,
}

/// Classify a decoded PHY payload by its MAC message type
pub fn classify(phy: &DecodedPhyPayload) -> Result<ClassifiedMessage, ClassificationError> {
    let mtype = phy.mhdr.mtype;
    match mtype {
        MType::JoinRequest => match &phy.mac_payload {
            MacPayload::JoinRequest(body) => Ok(classify_join_request(body)),
            _ => Err(ClassificationError::MalformedBody { mtype }),
        },
        MType::UnconfirmedDataUp | MType::ConfirmedDataUp => match &phy.mac_payload {
            MacPayload::DataUp(body) => {
                let kind = if mtype == MType::ConfirmedDataUp {
                    MessageKind::ConfirmedDataUp
                } else {
                    MessageKind::UnconfirmedDataUp
                };
                Ok(classify_data_up(kind, body))
            }
            _ => Err(ClassificationError::MalformedBody { mtype }),
        },
        _ => {
            if let MacPayload::Other(body) = &phy.mac_payload {
                debug!("{} with {} byte MAC payload left opaque", mtype, body.len());
            }
            let mut summary = Summary::default();
            summary.push("mtype", mtype.to_string());
            Ok(ClassifiedMessage {
                kind: MessageKind::Other,
                summary,
                fields: StructuredFields::Other { mtype },
            })
        }
    }
}

fn classify_join_request(body: &JoinRequestBody) -> ClassifiedMessage {
    let mut summary = Summary::default();
    summary.push("dev_eui", body.dev_eui.to_string());
    summary.push("join_eui", body.join_eui.to_string());
    summary.push("dev_nonce", format!("{:x}", body.dev_nonce));

    ClassifiedMessage {
        kind: MessageKind::JoinRequest,
        summary,
        fields: StructuredFields::JoinRequest {
            dev_eui: body.dev_eui,
            join_eui: body.join_eui,
            dev_nonce: body.dev_nonce,
        },
    }
}

fn classify_data_up(kind: MessageKind, body: &DataUpBody) -> ClassifiedMessage {
    // Fragments that fail to marshal are skipped, not fatal
    let mut payload_len = 0;
    for fragment in &body.frm_payload {
        match fragment.marshal() {
            Ok(bytes) => payload_len += bytes.len(),
            Err(e) => debug!("Skipping frame payload fragment: {}", e),
        }
    }

    debug!(
        adr = body.fctrl.adr,
        adr_ack_req = body.fctrl.adr_ack_req,
        ack = body.fctrl.ack,
        class_b = body.fctrl.class_b,
        fopts = body.fopts.len(),
        "data up frame control"
    );

    let nwk_id = body.dev_addr.nwk_id();

    let mut summary = Summary::default();
    summary.push("dev_addr", body.dev_addr.to_string());
    summary.push("nwk_id", format!("{:02x}", nwk_id));
    summary.push(
        "fport",
        body.fport
            .map(|p| format!("{:03}", p))
            .unwrap_or_else(|| "absent".to_string()),
    );
    summary.push("fcnt", body.fcnt.to_string());
    summary.push("len", payload_len.to_string());

    ClassifiedMessage {
        kind,
        summary,
        fields: StructuredFields::DataUp {
            dev_addr: body.dev_addr,
            nwk_id,
            fport: body.fport,
            fcnt: body.fcnt,
            payload_len,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lorawan::types::{FCtrl, Fragment, MacCommand, Mhdr};

    fn phy(mtype_byte: u8, mac_payload: MacPayload) -> DecodedPhyPayload {
        DecodedPhyPayload {
            mhdr: Mhdr::from_byte(mtype_byte),
            mac_payload,
            mic: [0; 4],
        }
    }

    fn join_body() -> JoinRequestBody {
        JoinRequestBody {
            join_eui: Eui64([0x70, 0xB3, 0xD5, 0x7E, 0xD0, 0, 0, 1]),
            dev_eui: Eui64([0, 0x04, 0xA3, 0x0B, 0, 0x1C, 0x05, 0x30]),
            dev_nonce: 0x1234,
        }
    }

    fn data_body(fragments: Vec<Fragment>) -> DataUpBody {
        DataUpBody {
            dev_addr: DevAddr(0x2601_1BDA),
            fctrl: FCtrl::default(),
            fcnt: 42,
            fopts: Vec::new(),
            fport: Some(10),
            frm_payload: fragments,
        }
    }

    #[test]
    fn test_classify_join_request() {
        let msg = classify(&phy(0x00, MacPayload::JoinRequest(join_body()))).unwrap();

        assert_eq!(msg.kind, MessageKind::JoinRequest);
        assert_eq!(msg.summary.get("dev_nonce"), Some("1234"));
        assert_eq!(msg.summary.get("dev_eui"), Some("0004a30b001c0530"));
        assert_eq!(msg.summary.get("join_eui"), Some("70b3d57ed0000001"));
        assert!(matches!(
            msg.fields,
            StructuredFields::JoinRequest { dev_nonce: 0x1234, .. }
        ));
    }

    #[test]
    fn test_classify_data_up_fragment_lengths() {
        let body = data_body(vec![Fragment::Data(vec![0; 5]), Fragment::Data(vec![0; 7])]);
        let msg = classify(&phy(0x40, MacPayload::DataUp(body))).unwrap();

        assert_eq!(msg.kind, MessageKind::UnconfirmedDataUp);
        assert_eq!(msg.summary.get("len"), Some("12"));
        assert_eq!(msg.summary.get("dev_addr"), Some("26011bda"));
        assert_eq!(msg.summary.get("nwk_id"), Some("13"));
        assert_eq!(msg.summary.get("fport"), Some("010"));
        assert_eq!(msg.summary.get("fcnt"), Some("42"));
    }

    #[test]
    fn test_classify_data_up_skips_bad_fragment() {
        let bad = Fragment::MacCommand(MacCommand {
            cid: 0x7E,
            payload: vec![0; 7],
        });
        let body = data_body(vec![Fragment::Data(vec![0; 5]), bad]);
        let msg = classify(&phy(0x80, MacPayload::DataUp(body))).unwrap();

        assert_eq!(msg.kind, MessageKind::ConfirmedDataUp);
        assert_eq!(msg.summary.get("len"), Some("5"));
        assert!(matches!(
            msg.fields,
            StructuredFields::DataUp { payload_len: 5, .. }
        ));
    }

    #[test]
    fn test_classify_data_up_absent_port() {
        let mut body = data_body(Vec::new());
        body.fport = None;
        let msg = classify(&phy(0x40, MacPayload::DataUp(body))).unwrap();
        assert_eq!(msg.summary.get("fport"), Some("absent"));
        assert_eq!(msg.summary.get("len"), Some("0"));
    }

    #[test]
    fn test_classify_other() {
        let msg = classify(&phy(0x60, MacPayload::Other(vec![1, 2, 3]))).unwrap();
        assert_eq!(msg.kind, MessageKind::Other);
        assert_eq!(msg.summary.to_string(), "mtype: UnconfirmedDataDown");
        assert_eq!(
            msg.fields,
            StructuredFields::Other {
                mtype: MType::UnconfirmedDataDown
            }
        );
    }

    #[test]
    fn test_classify_malformed_body() {
        let err = classify(&phy(0x00, MacPayload::Other(vec![]))).unwrap_err();
        assert_eq!(
            err,
            ClassificationError::MalformedBody {
                mtype: MType::JoinRequest
            }
        );

        let err = classify(&phy(0x40, MacPayload::JoinRequest(join_body()))).unwrap_err();
        assert_eq!(
            err,
            ClassificationError::MalformedBody {
                mtype: MType::UnconfirmedDataUp
            }
        );
    }

    #[test]
    fn test_classify_is_idempotent() {
        let input = phy(
            0x40,
            MacPayload::DataUp(data_body(vec![Fragment::Data(vec![9; 3])])),
        );
        assert_eq!(classify(&input), classify(&input));
    }

    #[test]
    fn test_summary_display() {
        let msg = classify(&phy(0x00, MacPayload::JoinRequest(join_body()))).unwrap();
        assert_eq!(
            msg.summary.to_string(),
            "dev_eui: 0004a30b001c0530 | join_eui: 70b3d57ed0000001 | dev_nonce: 1234"
        );
    }
}
