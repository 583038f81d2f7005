//! Capture writer - owns the output sink for one pcap stream

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::info;

use super::pcap::{write_frame, write_global_header};
use crate::reception::Reception;

/// Failure writing a frame to the capture sink
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture sink write failed: {0}")]
    SinkWrite(#[from] io::Error),
}

/// Sequential pcap writer.
///
/// The global header is written when the writer is created; frames follow
/// in the order `write_frame` is called.
pub struct CaptureWriter<W: Write> {
    sink: W,
    frames_written: u64,
    bytes_written: u64,
}

impl<W: Write> CaptureWriter<W> {
    /// Wrap a sink and write the pcap global header to it
    pub fn new(mut sink: W) -> Result<Self, CaptureError> {
        write_global_header(&mut sink)?;
        sink.flush()?;
        Ok(Self {
            sink,
            frames_written: 0,
            bytes_written: 0,
        })
    }

    /// Append one frame and flush so live readers see it immediately
    pub fn write_frame(&mut self, reception: &Reception) -> Result<(), CaptureError> {
        let len = write_frame(&mut self.sink, reception)?;
        self.sink.flush()?;
        self.frames_written += 1;
        self.bytes_written += len as u64;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flush and hand back the sink
    pub fn close(mut self) -> Result<W, CaptureError> {
        self.sink.flush()?;
        Ok(self.sink)
    }
}

/// Open the capture sink named by `path`; `-` selects stdout
pub fn open_capture(path: &Path) -> Result<CaptureWriter<Box<dyn Write + Send>>> {
    let sink: Box<dyn Write + Send> = if path.as_os_str() == "-" {
        Box::new(io::stdout())
    } else {
        let file = File::create(path)
            .with_context(|| format!("Failed to create capture file {}", path.display()))?;
        Box::new(BufWriter::new(file))
    };

    let writer = CaptureWriter::new(sink).context("Failed to write pcap global header")?;
    info!("Capture created: {}", path.display());
    Ok(writer)
}
