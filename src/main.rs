//! LoRaWAN Capture - Semtech packet-forwarder listener
//!
//! Receives uplinks from LoRaWAN gateways, writes every reception to a
//! LoRaTap pcap stream, classifies the MAC message and hands the result to
//! the display and persistence collaborators.

mod config;
mod forwarder;
mod ingest;
mod loratap;
mod logging;
mod lorawan;
mod output;
mod reception;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use config::Config;
use forwarder::ForwarderListener;
use ingest::{Collaborators, IngestLoop};
use lorawan::LorawanDecoder;
use output::{run_display, InMemoryGraphStore, PersistenceWorker};
use reception::Reception;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    logging::init(config.log_file.as_deref())?;

    info!("===========================================");
    info!("   LoRaWAN Capture - packet forwarder");
    info!("   LoRaTap pcap writer");
    info!("===========================================");

    info!("Configuration:");
    info!("  Bind address: {}", config.bind_address);
    info!("  Capture path: {}", config.capture_path.display());
    info!("  Channel capacity: {}", config.channel_capacity);
    info!("  Collaborator capacity: {}", config.collaborator_capacity);
    info!("  Stats interval: {:?}", config.stats_interval);
    info!("  Persistence: {}", config.persist);
    if let Some(path) = &config.log_file {
        info!("  Log file: {}", path.display());
    }

    // Both are fatal before any ingestion
    let capture = loratap::open_capture(&config.capture_path)?;
    let listener = Arc::new(ForwarderListener::bind(&config.bind_address).await?);

    let (reception_tx, reception_rx) = mpsc::channel::<Reception>(config.channel_capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let runner = listener.clone();
    let listener_handle = tokio::spawn(async move {
        if let Err(e) = runner.run(reception_tx).await {
            error!("Gateway listener failed: {}", e);
        }
    });

    let (display_tx, display_rx) = mpsc::channel(config.collaborator_capacity);
    let display_handle = tokio::spawn(run_display(display_rx));

    let graph = Arc::new(InMemoryGraphStore::new());
    let persistence = if config.persist {
        let (persist_tx, persist_rx) = mpsc::channel(config.collaborator_capacity);
        let worker = PersistenceWorker::new(graph.clone());
        Some((persist_tx, tokio::spawn(worker.run(persist_rx))))
    } else {
        None
    };

    let collaborators = Collaborators {
        display: Some(display_tx),
        persistence: persistence.as_ref().map(|(tx, _)| tx.clone()),
    };
    let persistence_handle = persistence.map(|(_, handle)| handle);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl+C received");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                // Dropping the sender would read as shutdown
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    });

    info!("===========================================");
    info!("  Listening for gateways...");
    info!("  Press Ctrl+C to stop.");
    info!("===========================================");

    let ingest = IngestLoop::new(capture, LorawanDecoder, collaborators)
        .with_stats_interval(config.stats_interval);
    let (stats, _sink) = ingest.run(reception_rx, shutdown_rx).await?;

    // The reception queue is gone, which also ends the listener
    if listener.is_running() {
        listener.stop();
    }
    if let Err(e) = listener_handle.await {
        warn!("Listener task failed: {}", e);
    }

    match display_handle.await {
        Ok(rows) => info!("Display stopped after {} rows", rows),
        Err(e) => warn!("Display task failed: {}", e),
    }
    if let Some(handle) = persistence_handle {
        if let Err(e) = handle.await {
            warn!("Persistence task failed: {}", e);
        }
        info!(
            "Graph: {} nodes, {} relationships",
            graph.node_count(),
            graph.edge_count()
        );
    }

    info!(
        "Shutdown complete. Receptions: {}, Frames written: {}",
        stats.receptions, stats.frames_written
    );
    Ok(())
}
