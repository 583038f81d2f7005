//! LoRaWAN message decoding and classification

mod classify;
mod phy;
mod types;

pub use classify::{classify, ClassifiedMessage, MessageKind, StructuredFields, Summary};
pub use phy::{LorawanDecoder, PhyDecoder};

#[cfg(test)]
pub(crate) use types::{DevAddr, Eui64, MType};
