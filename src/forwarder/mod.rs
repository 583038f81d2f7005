//! Gateway packet-forwarder ingestion

mod listener;
pub mod packet;

pub use listener::ForwarderListener;
