//! Forwarder listener - receives gateway datagrams and emits receptions

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::packet::{parse_upstream, UpstreamPacket};
use crate::reception::Reception;

/// Largest datagram a packet forwarder sends
const MAX_DATAGRAM_LEN: usize = 65_535;

const RECV_BACKOFF_BASE: Duration = Duration::from_millis(10);
const RECV_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Pause after `consecutive` back-to-back receive errors, doubling up to a cap
fn recv_backoff(consecutive: u32) -> Duration {
    let shift = consecutive.saturating_sub(1).min(16);
    RECV_BACKOFF_BASE
        .saturating_mul(1 << shift)
        .min(RECV_BACKOFF_MAX)
}

/// UDP listener for Semtech packet forwarders
pub struct ForwarderListener {
    socket: UdpSocket,
    running: Arc<AtomicBool>,
    datagrams_received: Arc<AtomicU64>,
    packet_errors: Arc<AtomicU64>,
}

impl ForwarderListener {
    /// Bind the UDP socket
    pub async fn bind(addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("Failed to bind gateway listener on {}", addr))?;

        Ok(Self {
            socket,
            running: Arc::new(AtomicBool::new(false)),
            datagrams_received: Arc::new(AtomicU64::new(0)),
            packet_errors: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive datagrams and forward receptions in arrival order.
    ///
    /// Returns when the reception channel is closed or `stop` is called.
    pub async fn run(&self, tx: mpsc::Sender<Reception>) -> Result<()> {
        info!("Gateway listener started: {} (UDP)", self.local_addr()?);
        self.running.store(true, Ordering::SeqCst);

        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
        let mut seen_gateways = std::collections::HashSet::new();
        let mut recv_errors = 0u32;

        while self.running.load(Ordering::SeqCst) {
            let (len, peer) = tokio::select! {
                result = self.socket.recv_from(&mut buf) => match result {
                    Ok(received) => {
                        recv_errors = 0;
                        received
                    }
                    Err(e) => {
                        recv_errors = recv_errors.saturating_add(1);
                        let pause = recv_backoff(recv_errors);
                        warn!("Error receiving datagram ({} in a row): {}", recv_errors, e);
                        tokio::time::sleep(pause).await;
                        continue;
                    }
                },
                _ = tx.closed() => {
                    info!("Reception channel closed, stopping listener");
                    break;
                }
            };

            self.datagrams_received.fetch_add(1, Ordering::Relaxed);

            let packet = match parse_upstream(&buf[..len]) {
                Ok(packet) => packet,
                Err(e) => {
                    self.packet_errors.fetch_add(1, Ordering::Relaxed);
                    debug!("Dropping datagram from {}: {}", peer, e);
                    continue;
                }
            };

            if let Some(ack) = packet.ack() {
                if let Err(e) = self.socket.send_to(&ack, peer).await {
                    warn!("Failed to acknowledge {}: {}", peer, e);
                }
            }

            match packet {
                UpstreamPacket::PushData {
                    gateway_mac, rxpk, ..
                } => {
                    if seen_gateways.insert(gateway_mac.clone()) {
                        info!("New gateway {} at {}", gateway_mac, peer);
                    }
                    let timestamp = Utc::now();
                    for rx in rxpk {
                        let rx = match rx {
                            Ok(rx) => rx,
                            Err(e) => {
                                self.packet_errors.fetch_add(1, Ordering::Relaxed);
                                debug!("Dropping rxpk from {}: {}", gateway_mac, e);
                                continue;
                            }
                        };
                        let Some(reception) = rx.to_reception(&gateway_mac, timestamp) else {
                            debug!(
                                "Skipping rxpk from {} (modu={}, datr={}, rfch={}, size={})",
                                gateway_mac, rx.modu, rx.datr, rx.rfch, rx.size
                            );
                            continue;
                        };
                        if tx.send(reception).await.is_err() {
                            warn!("Reception channel closed, stopping listener");
                            self.running.store(false, Ordering::SeqCst);
                            break;
                        }
                    }
                }
                UpstreamPacket::PullData { gateway_mac, .. } => {
                    debug!("PULL_DATA from {} ({})", gateway_mac, peer);
                }
                UpstreamPacket::TxAck { token } => {
                    debug!("TX_ACK token {:04x} from {}", token, peer);
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!(
            "Listener stopped. Datagrams: {}, Packet errors: {}",
            self.datagrams_received(),
            self.packet_errors()
        );
        Ok(())
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn datagrams_received(&self) -> u64 {
        self.datagrams_received.load(Ordering::Relaxed)
    }

    pub fn packet_errors(&self) -> u64 {
        self.packet_errors.load(Ordering::Relaxed)
    }
}
