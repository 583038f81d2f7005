//! Per-run ingest counters, owned by the ingest loop

use std::fmt;

use crate::lorawan::MessageKind;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub receptions: u64,
    pub frames_written: u64,
    pub write_failures: u64,
    pub decode_errors: u64,
    pub classification_errors: u64,
    pub join_requests: u64,
    pub unconfirmed_data_up: u64,
    pub confirmed_data_up: u64,
    pub other: u64,
    /// Collaborator events dropped because a queue was full
    pub dropped_events: u64,
    /// Periodic `[Stats]` lines emitted
    pub reports: u64,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_reception(&mut self) {
        self.receptions += 1;
    }

    pub fn record_frame_written(&mut self) {
        self.frames_written += 1;
    }

    pub fn record_write_failure(&mut self) {
        self.write_failures += 1;
    }

    pub fn record_decode_error(&mut self) {
        self.decode_errors += 1;
    }

    pub fn record_classification_error(&mut self) {
        self.classification_errors += 1;
    }

    pub fn record_classified(&mut self, kind: MessageKind) {
        match kind {
            MessageKind::JoinRequest => self.join_requests += 1,
            MessageKind::UnconfirmedDataUp => self.unconfirmed_data_up += 1,
            MessageKind::ConfirmedDataUp => self.confirmed_data_up += 1,
            MessageKind::Other => self.other += 1,
        }
    }

    pub fn record_dropped_event(&mut self) {
        self.dropped_events += 1;
    }

    pub fn record_report(&mut self) {
        self.reports += 1;
    }

    pub fn classified(&self) -> u64 {
        self.join_requests + self.unconfirmed_data_up + self.confirmed_data_up + self.other
    }
}

impl fmt::Display for IngestStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Receptions: {} | Frames: {} | Write failures: {} | Decode errors: {} | Unclassifiable: {} | JoinReq: {} | UnconfUp: {} | ConfUp: {} | Other: {} | Dropped: {}",
            self.receptions,
            self.frames_written,
            self.write_failures,
            self.decode_errors,
            self.classification_errors,
            self.join_requests,
            self.unconfirmed_data_up,
            self.confirmed_data_up,
            self.other,
            self.dropped_events
        )
    }
}
