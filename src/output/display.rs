//! Display collaborator - one row per classified uplink

use std::fmt;

use tokio::sync::mpsc;
use tracing::info;

use crate::lorawan::{MessageKind, Summary};
use crate::reception::RadioMetadata;

/// Classified message plus the radio metadata of its reception
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayEvent {
    pub sequence: u64,
    pub radio: RadioMetadata,
    pub kind: MessageKind,
    pub summary: Summary,
}

impl fmt::Display for DisplayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} gw={} ch={} freq={} rssi={} cr={} | {} | {}",
            self.sequence,
            self.radio.timestamp.format("%Y-%m-%d %H:%M:%S%.6f"),
            self.radio.gateway_mac,
            self.radio.channel,
            self.radio.frequency_hz,
            self.radio.rssi,
            self.radio.code_rate,
            self.kind,
            self.summary
        )
    }
}

/// Render display events until every sender is dropped; returns the row count
pub async fn run_display(mut rx: mpsc::Receiver<DisplayEvent>) -> u64 {
    let mut rows = 0u64;
    while let Some(event) = rx.recv().await {
        info!("{}", event);
        rows += 1;
    }
    rows
}
