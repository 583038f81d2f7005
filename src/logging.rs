//! Tracing setup: human-readable stderr plus an optional JSON log file

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::Subscriber;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const DEFAULT_FILTER: &str = "lorawan_capture=info";

/// One JSON object per event, appended to `path`
pub fn json_file_layer<S>(path: &Path) -> Result<impl Layer<S>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let file: File = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    Ok(fmt::layer()
        .json()
        .with_ansi(false)
        .with_writer(Mutex::new(file)))
}

/// Install the global subscriber. Stdout is left free for the capture stream.
pub fn init(log_file: Option<&Path>) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let file_layer = log_file.map(json_file_layer).transpose()?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::info;

    #[test]
    fn test_json_file_layer_appends_events() {
        let path = std::env::temp_dir().join(format!(
            "lorawan-capture-log-{}.json",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        let subscriber = tracing_subscriber::registry().with(json_file_layer(&path).unwrap());
        tracing::subscriber::with_default(subscriber, || {
            info!(gateway_mac = "AA555A0000000000", "New gateway");
            info!("second line");
        });

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["level"], "INFO");
        assert_eq!(lines[0]["fields"]["message"], "New gateway");
        assert_eq!(lines[0]["fields"]["gateway_mac"], "AA555A0000000000");
        assert_eq!(lines[1]["fields"]["message"], "second line");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_json_file_layer_rejects_bad_path() {
        let path = std::env::temp_dir().join("no-such-dir").join("x").join("log.json");
        assert!(json_file_layer::<tracing_subscriber::Registry>(&path).is_err());
    }
}
