//! Ingest loop - couples the reception queue to capture and classification

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::stats::IngestStats;
use crate::loratap::CaptureWriter;
use crate::lorawan::{classify, ClassifiedMessage, PhyDecoder, StructuredFields};
use crate::output::DisplayEvent;
use crate::reception::Reception;

/// Queues feeding the display and persistence collaborators.
///
/// Sends never wait: a full queue drops the event.
#[derive(Debug, Clone, Default)]
pub struct Collaborators {
    pub display: Option<mpsc::Sender<DisplayEvent>>,
    pub persistence: Option<mpsc::Sender<StructuredFields>>,
}

/// Single consumer of receptions. Owns the capture sink and the run counters.
pub struct IngestLoop<W: Write, D: PhyDecoder> {
    capture: CaptureWriter<W>,
    decoder: D,
    collaborators: Collaborators,
    stats: IngestStats,
    stats_interval: Duration,
}

impl<W: Write, D: PhyDecoder> IngestLoop<W, D> {
    pub fn new(capture: CaptureWriter<W>, decoder: D, collaborators: Collaborators) -> Self {
        Self {
            capture,
            decoder,
            collaborators,
            stats: IngestStats::new(),
            stats_interval: Duration::from_secs(10),
        }
    }

    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    #[cfg(test)]
    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    /// Capture, classify and fan out one reception
    pub fn handle(&mut self, reception: &Reception) -> Option<ClassifiedMessage> {
        self.stats.record_reception();
        let radio = &reception.radio;

        debug!(
            channel = radio.channel,
            frequency = radio.frequency_hz,
            code_rate = %radio.code_rate,
            gateway_mac = %radio.gateway_mac,
            payload_b64 = %STANDARD.encode(&reception.phy_payload),
            "received packet with phy payload"
        );

        // Capture first; a failed write never stops classification
        match self.capture.write_frame(reception) {
            Ok(()) => self.stats.record_frame_written(),
            Err(e) => {
                self.stats.record_write_failure();
                error!("Failed to write capture frame: {}", e);
            }
        }

        let phy = match self.decoder.decode(&reception.phy_payload) {
            Ok(phy) => phy,
            Err(e) => {
                self.stats.record_decode_error();
                warn!("Error decoding packet from {}: {}", radio.gateway_mac, e);
                return None;
            }
        };

        debug!(
            mtype = %phy.mhdr.mtype,
            major = phy.mhdr.major,
            mic = %hex::encode(phy.mic),
            "decoded phy payload"
        );

        let message = match classify(&phy) {
            Ok(message) => message,
            Err(e) => {
                self.stats.record_classification_error();
                warn!("Unclassifiable packet from {}: {}", radio.gateway_mac, e);
                return None;
            }
        };
        self.stats.record_classified(message.kind);

        self.fan_out(reception, &message);
        Some(message)
    }

    fn fan_out(&mut self, reception: &Reception, message: &ClassifiedMessage) {
        if let Some(tx) = &self.collaborators.display {
            let event = DisplayEvent {
                sequence: self.stats.classified(),
                radio: reception.radio.clone(),
                kind: message.kind,
                summary: message.summary.clone(),
            };
            if let Err(e) = tx.try_send(event) {
                self.stats.record_dropped_event();
                warn!("Display event dropped: {}", e);
            }
        }

        if let Some(tx) = &self.collaborators.persistence {
            if let Err(e) = tx.try_send(message.fields.clone()) {
                self.stats.record_dropped_event();
                warn!("Persistence event dropped: {}", e);
            }
        }
    }

    /// Consume receptions in delivery order until shutdown or the queue closes,
    /// then close the capture sink and return it with the final counters.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<Reception>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(IngestStats, W)> {
        let mut stats_tick = tokio::time::interval(self.stats_interval);
        stats_tick.tick().await;

        if !*shutdown.borrow() {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => {
                        info!("Shutdown requested, stopping ingestion");
                        break;
                    }
                    _ = stats_tick.tick() => {
                        self.stats.record_report();
                        info!("[Stats] {}", self.stats);
                    }
                    received = rx.recv() => match received {
                        Some(reception) => {
                            self.handle(&reception);
                        }
                        None => {
                            info!("Reception channel closed");
                            break;
                        }
                    },
                }
            }
        }

        let stats = self.stats;
        info!(
            "Closing capture: {} frames, {} bytes",
            self.capture.frames_written(),
            self.capture.bytes_written()
        );
        let sink = self
            .capture
            .close()
            .context("Failed to flush capture sink")?;

        info!("Ingest stopped. {}", stats);
        Ok((stats, sink))
    }
}
