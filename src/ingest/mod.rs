//! Reception ingestion: capture, classification and collaborator fan-out

mod ingest_loop;
mod stats;

pub use ingest_loop::{Collaborators, IngestLoop};
