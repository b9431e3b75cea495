//! Required capabilities consumed from collaborators (spec §6.2) plus the
//! `DependencyId` enum C1 keys its circuit states by.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::NodeDescriptor;

/// The three external dependencies every outgoing call is gated behind
/// (spec §3 `CircuitState`, §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyId {
    Gateway,
    Embedder,
    VectorIndex,
}

impl fmt::Display for DependencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DependencyId::Gateway => "gateway",
            DependencyId::Embedder => "embedder",
            DependencyId::VectorIndex => "vector_index",
        };
        f.write_str(s)
    }
}

impl DependencyId {
    pub const ALL: [DependencyId; 3] = [
        DependencyId::Gateway,
        DependencyId::Embedder,
        DependencyId::VectorIndex,
    ];
}

/// Monotonic clock, injected so staleness and circuit timing share one
/// source of truth between state and elapsed-time reporting (spec §6.2).
pub trait Clock: Send + Sync {
    fn now(&self) -> chrono::DateTime<chrono::Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now()
    }
}

/// Raw node descriptor shape as returned by the gateway's node listing,
/// before the catalog normalizes it into `NodeDescriptor`.
pub type RawNodeDescriptor = NodeDescriptor;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedChatflow {
    pub id: String,
    pub name: String,
}

/// The Flowise remote service, consumed only through its interface
/// (spec §6.2). Implementations are expected to be idempotent-safe to
/// retry at the `list_nodes`/read level; `create_chatflow` is not retried
/// internally — that is exactly why it is gated by a circuit breaker rather
/// than a retry loop.
#[async_trait]
pub trait FlowiseGateway: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<RawNodeDescriptor>>;

    async fn create_chatflow(
        &self,
        name: &str,
        flow_data: serde_json::Value,
        deployed: bool,
    ) -> Result<CreatedChatflow>;

    async fn get_chatflow(&self, id: &str) -> Result<serde_json::Value>;
    async fn update_chatflow(&self, id: &str, flow_data: serde_json::Value) -> Result<()>;
    async fn delete_chatflow(&self, id: &str) -> Result<()>;
    async fn run_prediction(&self, id: &str, input: serde_json::Value) -> Result<serde_json::Value>;
}

/// A fixed-dimensional embedding model (spec §6.2). Deterministic for
/// identical inputs — this is what makes re-embedding an unchanged payload
/// a no-op (spec §8 property 3).
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorCollection {
    Nodes,
    Templates,
    /// Reserved (spec §6.3); no read/write operation is exposed for these
    /// yet — they carry the P2 learning/artifact-reuse storage surface
    /// without its algorithms (spec §1, §SPEC_FULL.md C).
    SddArtifacts,
    FailedArtifacts,
    Sessions,
}

impl fmt::Display for VectorCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VectorCollection::Nodes => "nodes",
            VectorCollection::Templates => "templates",
            VectorCollection::SddArtifacts => "sdd_artifacts",
            VectorCollection::FailedArtifacts => "failed_artifacts",
            VectorCollection::Sessions => "sessions",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredVectorRecord {
    pub record_id: String,
    pub embedding: Vec<f32>,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorQueryHit {
    pub record_id: String,
    pub score: f32,
    pub payload: serde_json::Value,
}

/// A per-collection nearest-neighbor store (spec §6.2). The only mutable
/// shared structure in the system; supports concurrent readers with
/// single-writer batch updates (spec §5).
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, collection: VectorCollection, records: Vec<StoredVectorRecord>) -> Result<()>;

    async fn query(
        &self,
        collection: VectorCollection,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<VectorQueryHit>>;

    async fn delete(&self, collection: VectorCollection, ids: &[String]) -> Result<()>;

    async fn count(&self, collection: VectorCollection) -> Result<usize>;
}
