//! Builds the `get_system_health` response (spec §6.1, richened per
//! SPEC_FULL.md §C): per-dependency circuit state, per-collection record
//! counts, and catalog generation age. Never fails — spec §6.1 lists no
//! failure mode for this operation.

use std::sync::Arc;

use flowforge_catalog::CatalogCache;
use flowforge_circuit::{CircuitPhase, DependencyGates};
use flowforge_core::{Clock, VectorCollection, VectorIndex};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct DependencyHealth {
    pub dependency: String,
    pub phase: CircuitPhase,
    pub failure_count: u32,
    pub retry_after_s: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct CatalogHealth {
    pub generation_id: u64,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
    pub age_s: u64,
    pub is_stale: bool,
    pub node_count: usize,
}

#[derive(Debug, Serialize)]
pub struct SystemHealth {
    pub dependencies: Vec<DependencyHealth>,
    pub catalog: CatalogHealth,
    pub collection_counts: std::collections::BTreeMap<String, usize>,
}

/// Reimplements `CircuitBreaker::retry_after`'s private computation at the
/// MCP layer, since `DependencyGates::status` only exposes the raw
/// `(phase, failure_count, opened_at)` snapshot, not a derived value.
fn retry_after_s(state: &flowforge_circuit::CircuitState, open_duration_s: u64, clock: &dyn Clock) -> Option<u64> {
    if state.phase != CircuitPhase::Open {
        return None;
    }
    let opened_at = state.opened_at?;
    let deadline = opened_at + chrono::Duration::seconds(open_duration_s as i64);
    let now = clock.now();
    Some(if deadline > now { (deadline - now).num_seconds().max(0) as u64 } else { 0 })
}

pub async fn build_system_health(
    gates: &DependencyGates,
    catalog: &CatalogCache,
    vector_index: &Arc<dyn VectorIndex>,
    clock: &dyn Clock,
    open_duration_s: u64,
) -> SystemHealth {
    let mut dependencies: Vec<DependencyHealth> = gates
        .status()
        .into_iter()
        .map(|(dep, state)| DependencyHealth {
            dependency: dep.to_string(),
            retry_after_s: retry_after_s(&state, open_duration_s, clock),
            phase: state.phase,
            failure_count: state.failure_count,
        })
        .collect();
    dependencies.sort_by(|a, b| a.dependency.cmp(&b.dependency));

    let generation = catalog.current();
    let catalog_health = CatalogHealth {
        generation_id: generation.generation_id,
        fetched_at: generation.fetched_at,
        age_s: catalog.age().as_secs(),
        is_stale: catalog.is_stale(),
        node_count: generation.node_count(),
    };

    let mut collection_counts = std::collections::BTreeMap::new();
    for collection in [
        VectorCollection::Nodes,
        VectorCollection::Templates,
        VectorCollection::SddArtifacts,
        VectorCollection::FailedArtifacts,
        VectorCollection::Sessions,
    ] {
        let count = vector_index.count(collection).await.unwrap_or(0);
        collection_counts.insert(collection.to_string(), count);
    }

    SystemHealth {
        dependencies,
        catalog: catalog_health,
        collection_counts,
    }
}
