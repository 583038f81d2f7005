//! Persistence collaborator - device/network graph upserts

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::lorawan::StructuredFields;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("graph store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GraphNode {
    JoinServer { join_eui: String },
    Device { dev_eui: String },
    DeviceSession { nwk_addr: String, nwk_id: String },
    Network { nwk_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GraphEdge {
    /// Device joined over the air through a join server
    Otaa { dev_eui: String, join_eui: String },
    DataUp {
        nwk_addr: String,
        nwk_id: String,
        fport: Option<u8>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphMutation {
    /// Create the node if absent
    Upsert(GraphNode),
    /// Create the relationship if absent
    Merge(GraphEdge),
}

/// Graph store receiving idempotent writes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn upsert_node(&self, node: GraphNode) -> Result<(), GraphError>;

    async fn merge_edge(&self, edge: GraphEdge) -> Result<(), GraphError>;
}

#[async_trait]
impl<S: GraphStore + ?Sized> GraphStore for Arc<S> {
    async fn upsert_node(&self, node: GraphNode) -> Result<(), GraphError> {
        (**self).upsert_node(node).await
    }

    async fn merge_edge(&self, edge: GraphEdge) -> Result<(), GraphError> {
        (**self).merge_edge(edge).await
    }
}

/// Graph writes implied by one classified message, nodes before edges
pub fn graph_mutations(fields: &StructuredFields) -> Vec<GraphMutation> {
    match fields {
        StructuredFields::JoinRequest {
            dev_eui, join_eui, ..
        } => {
            let dev_eui = dev_eui.to_string();
            let join_eui = join_eui.to_string();
            vec![
                GraphMutation::Upsert(GraphNode::JoinServer {
                    join_eui: join_eui.clone(),
                }),
                GraphMutation::Upsert(GraphNode::Device {
                    dev_eui: dev_eui.clone(),
                }),
                GraphMutation::Merge(GraphEdge::Otaa { dev_eui, join_eui }),
            ]
        }
        StructuredFields::DataUp {
            dev_addr,
            nwk_id,
            fport,
            ..
        } => {
            let nwk_addr = dev_addr.to_string();
            let nwk_id = format!("{:02x}", nwk_id);
            vec![
                GraphMutation::Upsert(GraphNode::DeviceSession {
                    nwk_addr: nwk_addr.clone(),
                    nwk_id: nwk_id.clone(),
                }),
                GraphMutation::Upsert(GraphNode::Network {
                    nwk_id: nwk_id.clone(),
                }),
                GraphMutation::Merge(GraphEdge::DataUp {
                    nwk_addr,
                    nwk_id,
                    fport: *fport,
                }),
            ]
        }
        StructuredFields::Other { .. } => Vec::new(),
    }
}

/// Set-backed graph store kept for the lifetime of the process
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    nodes: Mutex<HashSet<GraphNode>>,
    edges: Mutex<HashSet<GraphEdge>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.lock().map(|nodes| nodes.len()).unwrap_or(0)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.lock().map(|edges| edges.len()).unwrap_or(0)
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn upsert_node(&self, node: GraphNode) -> Result<(), GraphError> {
        let mut nodes = self
            .nodes
            .lock()
            .map_err(|e| GraphError::Unavailable(e.to_string()))?;
        if nodes.insert(node.clone()) {
            debug!("Graph node created: {:?}", node);
        }
        Ok(())
    }

    async fn merge_edge(&self, edge: GraphEdge) -> Result<(), GraphError> {
        let mut edges = self
            .edges
            .lock()
            .map_err(|e| GraphError::Unavailable(e.to_string()))?;
        if edges.insert(edge.clone()) {
            debug!("Graph edge created: {:?}", edge);
        }
        Ok(())
    }
}

/// Persistence worker statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistenceStats {
    pub messages: u64,
    pub writes: u64,
    pub failures: u64,
}

/// Drains classified fields off the ingest path and applies graph writes
pub struct PersistenceWorker<S: GraphStore> {
    store: S,
    stats: PersistenceStats,
}

impl<S: GraphStore> PersistenceWorker<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            stats: PersistenceStats::default(),
        }
    }

    /// Apply one message's writes. Failures are logged, never retried.
    pub async fn persist(&mut self, fields: &StructuredFields) {
        self.stats.messages += 1;
        for mutation in graph_mutations(fields) {
            let result = match mutation {
                GraphMutation::Upsert(node) => self.store.upsert_node(node).await,
                GraphMutation::Merge(edge) => self.store.merge_edge(edge).await,
            };
            match result {
                Ok(()) => self.stats.writes += 1,
                Err(e) => {
                    self.stats.failures += 1;
                    warn!("Graph write failed: {}", e);
                }
            }
        }
    }

    /// Run until every sender is dropped
    pub async fn run(mut self, mut rx: mpsc::Receiver<StructuredFields>) -> PersistenceStats {
        while let Some(fields) = rx.recv().await {
            self.persist(&fields).await;
        }
        info!(
            "Persistence stopped. Messages: {}, Writes: {}, Failures: {}",
            self.stats.messages, self.stats.writes, self.stats.failures
        );
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lorawan::{DevAddr, Eui64, MType};

    fn join_fields() -> StructuredFields {
        StructuredFields::JoinRequest {
            dev_eui: Eui64([0, 0x04, 0xA3, 0x0B, 0, 0x1C, 0x05, 0x30]),
            join_eui: Eui64([0x70, 0xB3, 0xD5, 0x7E, 0xD0, 0, 0, 1]),
            dev_nonce: 1,
        }
    }

    fn data_fields(fport: Option<u8>) -> StructuredFields {
        StructuredFields::DataUp {
            dev_addr: DevAddr(0x2601_1BDA),
            nwk_id: 0x13,
            fport,
            fcnt: 1,
            payload_len: 3,
        }
    }

    #[test]
    fn test_join_request_mutations() {
        let mutations = graph_mutations(&join_fields());
        assert_eq!(mutations.len(), 3);
        assert_eq!(
            mutations[2],
            GraphMutation::Merge(GraphEdge::Otaa {
                dev_eui: "0004a30b001c0530".to_string(),
                join_eui: "70b3d57ed0000001".to_string(),
            })
        );
    }

    #[test]
    fn test_other_has_no_mutations() {
        let fields = StructuredFields::Other {
            mtype: MType::Proprietary,
        };
        assert!(graph_mutations(&fields).is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_store_is_idempotent() {
        let mut worker = PersistenceWorker::new(InMemoryGraphStore::new());
        worker.persist(&data_fields(Some(1))).await;
        worker.persist(&data_fields(Some(1))).await;
        worker.persist(&data_fields(Some(2))).await;
        worker.persist(&join_fields()).await;

        assert_eq!(worker.store.node_count(), 4);
        assert_eq!(worker.store.edge_count(), 3);
        assert!(worker.store.edges.lock().unwrap().contains(&GraphEdge::DataUp {
            nwk_addr: "26011bda".to_string(),
            nwk_id: "13".to_string(),
            fport: Some(2),
        }));
        assert_eq!(worker.stats.failures, 0);
    }

    #[tokio::test]
    async fn test_store_failures_are_counted_not_fatal() {
        let mut store = MockGraphStore::new();
        store
            .expect_upsert_node()
            .times(2)
            .returning(|_| Err(GraphError::Unavailable("connection refused".to_string())));
        store
            .expect_merge_edge()
            .times(1)
            .returning(|_| Err(GraphError::Unavailable("connection reset".to_string())));

        let (tx, rx) = mpsc::channel(4);
        tx.send(data_fields(None)).await.unwrap();
        drop(tx);

        let stats = PersistenceWorker::new(store).run(rx).await;
        assert_eq!(
            stats,
            PersistenceStats {
                messages: 1,
                writes: 0,
                failures: 3,
            }
        );
    }
}
