//! Fan-out targets for classified messages

mod display;
mod persistence;

pub use display::{run_display, DisplayEvent};
pub use persistence::{InMemoryGraphStore, PersistenceWorker};

#[cfg(test)]
pub(crate) use persistence::{GraphError, MockGraphStore};
