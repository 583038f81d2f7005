//! Configuration loaded from environment variables

use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// UDP address the packet-forwarder listener binds to
    pub bind_address: String,

    /// Capture file path, `-` for stdout
    pub capture_path: PathBuf,

    /// Reception queue size between listener and ingest loop
    pub channel_capacity: usize,

    /// Display and persistence queue size
    pub collaborator_capacity: usize,

    /// Interval between `[Stats]` log lines
    pub stats_interval: Duration,

    /// Enable the graph persistence collaborator
    pub persist: bool,

    /// Optional JSON log file, in addition to stderr
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:1700".to_string(),
            capture_path: PathBuf::from("capture.pcap"),
            channel_capacity: 1000,
            collaborator_capacity: 256,
            stats_interval: Duration::from_secs(10),
            persist: true,
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            bind_address: lookup("BIND_ADDRESS").unwrap_or(defaults.bind_address),

            capture_path: lookup("CAPTURE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.capture_path),

            channel_capacity: lookup("CHANNEL_CAPACITY")
                .and_then(|s| s.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(defaults.channel_capacity),

            collaborator_capacity: lookup("COLLABORATOR_CAPACITY")
                .and_then(|s| s.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(defaults.collaborator_capacity),

            stats_interval: lookup("STATS_INTERVAL_SECS")
                .and_then(|s| s.parse().ok())
                .filter(|&secs| secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.stats_interval),

            persist: lookup("PERSIST")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.persist),

            log_file: lookup("LOG_FILE")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
        }
    }
}
