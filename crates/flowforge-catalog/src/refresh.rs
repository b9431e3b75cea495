//! The refresh algorithm and public `CatalogCache` contract (spec §4.2).

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use flowforge_circuit::{DependencyGates, FailureClass};
use flowforge_core::{Clock, DependencyId, FlowforgeError, FlowiseGateway, NodeDescriptor, Result};

use crate::generation::{CatalogGeneration, LookupHit, VersionSelector};
use crate::store::CatalogStore;

/// The delta produced by a refresh, consumed by C3 to batch re-embed only
/// what changed (spec §4.2 step 4).
#[derive(Debug, Clone, Default)]
pub struct RefreshDelta {
    pub added: Vec<NodeDescriptor>,
    pub changed: Vec<NodeDescriptor>,
    /// Descriptors newly marked deprecated by this refresh (previously
    /// present, now absent from the gateway's listing).
    pub deprecated: Vec<NodeDescriptor>,
}

impl RefreshDelta {
    pub fn total(&self) -> usize {
        self.added.len() + self.changed.len() + self.deprecated.len()
    }
}

pub enum RefreshOutcome {
    /// `now - fetched_at <= staleness`; no refresh was attempted.
    UpToDate,
    Refreshed(RefreshDelta),
    /// Refresh failed but a previous generation continues to serve lookups
    /// (spec §4.2 "Failure semantics").
    StaleRetained { reason: String },
}

pub struct CatalogCache {
    current: ArcSwap<CatalogGeneration>,
    store: CatalogStore,
    staleness: Duration,
    clock: Arc<dyn Clock>,
}

impl CatalogCache {
    pub fn new(store: CatalogStore, staleness: Duration, clock: Arc<dyn Clock>) -> Result<Self> {
        let loaded = store
            .load_current()
            .map_err(|e| FlowforgeError::validation(format!("loading catalog store: {e}")))?;
        let generation = loaded.unwrap_or_else(|| CatalogGeneration::empty(0, clock.now()));
        Ok(Self {
            current: ArcSwap::new(Arc::new(generation)),
            store,
            staleness,
            clock,
        })
    }

    pub fn current(&self) -> Arc<CatalogGeneration> {
        self.current.load_full()
    }

    pub fn age(&self) -> Duration {
        let fetched_at = self.current().fetched_at;
        (self.clock.now() - fetched_at).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_stale(&self) -> bool {
        self.age() > self.staleness
    }

    pub fn lookup(&self, name: &str, selector: VersionSelector) -> Option<LookupHit> {
        self.current().lookup(name, selector)
    }

    /// spec §4.2: if stale, trigger a refresh and block until it succeeds or
    /// fails. On refresh failure, retain the previous generation and
    /// surface a staleness warning rather than failing the caller's
    /// operation — unless no generation exists at all.
    #[tracing::instrument(skip(self, gates, gateway))]
    pub async fn ensure_fresh(
        &self,
        gates: &DependencyGates,
        gateway: &dyn FlowiseGateway,
    ) -> Result<RefreshOutcome> {
        if !self.is_stale() {
            return Ok(RefreshOutcome::UpToDate);
        }
        self.refresh_now(gates, gateway).await
    }

    /// Forces a refresh regardless of staleness, for the operator-facing
    /// `refresh_node_catalog` operation (spec §6.1) — unlike `ensure_fresh`,
    /// callers here explicitly asked for a refresh rather than merely
    /// needing a fresh-enough generation.
    pub async fn refresh_now(&self, gates: &DependencyGates, gateway: &dyn FlowiseGateway) -> Result<RefreshOutcome> {
        let had_generation = self.current().node_count() > 0 || self.current().generation_id > 0;

        let fetch_result = gates
            .call(
                DependencyId::Gateway,
                || async { gateway.list_nodes().await },
                |e| {
                    if e.is_transport() {
                        FailureClass::Transport
                    } else {
                        FailureClass::Validation
                    }
                },
            )
            .await;

        let raw = match fetch_result {
            Ok(raw) => raw,
            Err(err) => {
                if had_generation {
                    tracing::warn!(error = %err, "catalog refresh failed, retaining previous generation");
                    return Ok(RefreshOutcome::StaleRetained {
                        reason: err.user_message(),
                    });
                }
                return Err(err);
            }
        };

        let now = self.clock.now();
        let previous = self.current();
        let (new_generation, delta) = diff_and_build(&previous, raw, now);

        self.store
            .commit(&new_generation)
            .map_err(|e| FlowforgeError::validation(format!("committing catalog generation: {e}")))?;

        tracing::info!(
            generation_id = new_generation.generation_id,
            added = delta.added.len(),
            changed = delta.changed.len(),
            deprecated = delta.deprecated.len(),
            "catalog refreshed"
        );

        self.current.store(Arc::new(new_generation));
        Ok(RefreshOutcome::Refreshed(delta))
    }
}

/// Diffs `raw` (the gateway's current listing) against `previous` by
/// `(name, version)` (spec §4.2 step 2) and builds the next generation.
fn diff_and_build(
    previous: &CatalogGeneration,
    raw: Vec<NodeDescriptor>,
    fetched_at: DateTime<Utc>,
) -> (CatalogGeneration, RefreshDelta) {
    let mut next = CatalogGeneration::empty(previous.generation_id + 1, fetched_at);
    let mut delta = RefreshDelta::default();
    let mut seen: std::collections::HashSet<(String, u32)> = std::collections::HashSet::new();

    for descriptor in raw {
        seen.insert((descriptor.name.clone(), descriptor.version));
        match previous.lookup(&descriptor.name, VersionSelector::Pinned(descriptor.version)) {
            None => {
                delta.added.push(descriptor.clone());
            }
            Some(hit) if descriptor_changed(&hit.descriptor, &descriptor) => {
                delta.changed.push(descriptor.clone());
            }
            Some(_) => {}
        }
        next.insert(descriptor);
    }

    // Disappeared entries: never hard-delete, mark deprecated (monotonic per
    // (name, version) within a generation).
    for descriptor in previous.iter_all() {
        let key = (descriptor.name.clone(), descriptor.version);
        if seen.contains(&key) {
            continue;
        }
        if descriptor.deprecated {
            next.insert(descriptor.clone());
            continue;
        }
        let mut gone = descriptor.clone();
        gone.deprecated = true;
        delta.deprecated.push(gone.clone());
        next.insert(gone);
    }

    (next, delta)
}

fn descriptor_changed(old: &NodeDescriptor, new: &NodeDescriptor) -> bool {
    old.description != new.description
        || old.base_classes != new.base_classes
        || old.input_anchors != new.input_anchors
        || old.output_anchors != new.output_anchors
        || old.deprecated != new.deprecated
}
