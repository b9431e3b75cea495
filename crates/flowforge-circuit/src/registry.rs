//! `DependencyGates`: the one public operation C1 exposes, `call(dep, f)`,
//! plus disk persistence of circuit state across restarts (spec §6.3).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use flowforge_core::{Clock, DependencyId, Result};
use serde::{Deserialize, Serialize};

use crate::breaker::{CircuitBreaker, CircuitState, FailureClass, PersistedCircuit};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PersistedCircuits {
    #[serde(default)]
    circuits: HashMap<String, PersistedCircuit>,
}

pub struct DependencyGates {
    breakers: HashMap<DependencyId, CircuitBreaker>,
    persistence_path: Option<PathBuf>,
}

impl DependencyGates {
    pub fn new(
        failure_threshold: u32,
        open_duration: Duration,
        clock: Arc<dyn Clock>,
        persistence_path: Option<PathBuf>,
    ) -> Self {
        let mut breakers = HashMap::new();
        for dep in DependencyId::ALL {
            breakers.insert(
                dep,
                CircuitBreaker::new(dep, failure_threshold, open_duration, clock.clone()),
            );
        }
        let gates = Self {
            breakers,
            persistence_path,
        };
        gates.load();
        gates
    }

    fn load(&self) {
        let Some(path) = &self.persistence_path else {
            return;
        };
        let Ok(bytes) = std::fs::read(path) else {
            return;
        };
        let Ok(persisted) = serde_json::from_slice::<PersistedCircuits>(&bytes) else {
            tracing::warn!(path = ?path, "ignoring unreadable circuit persistence file");
            return;
        };
        for (dep, state) in persisted.circuits {
            if let Some(dep_id) = parse_dep(&dep) {
                if let Some(breaker) = self.breakers.get(&dep_id) {
                    breaker.restore(state);
                }
            }
        }
    }

    /// Persists `(failure_count, opened_at)` per dependency (spec §6.3).
    pub fn persist(&self) -> anyhow::Result<()> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };
        let mut circuits = HashMap::new();
        for (dep, breaker) in &self.breakers {
            circuits.insert(dep.to_string(), breaker.persisted());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = tmp_path(path);
        std::fs::write(&tmp, serde_json::to_vec_pretty(&PersistedCircuits { circuits })?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// The one public C1 operation: run `attempt` through `dep`'s circuit.
    pub async fn call<T, F, Fut>(
        &self,
        dep: DependencyId,
        attempt: F,
        classify: impl Fn(&flowforge_core::FlowforgeError) -> FailureClass,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let breaker = self
            .breakers
            .get(&dep)
            .expect("all DependencyId variants have a breaker");
        breaker.call(attempt, classify).await
    }

    pub fn reset(&self, dep: DependencyId) {
        if let Some(breaker) = self.breakers.get(&dep) {
            breaker.reset();
        }
    }

    /// Full tuple for each dependency, in O(1) (spec §4.1 "Observable properties").
    pub fn status(&self) -> HashMap<DependencyId, CircuitState> {
        self.breakers
            .iter()
            .map(|(dep, breaker)| (*dep, breaker.snapshot()))
            .collect()
    }
}

fn parse_dep(s: &str) -> Option<DependencyId> {
    match s {
        "gateway" => Some(DependencyId::Gateway),
        "embedder" => Some(DependencyId::Embedder),
        "vector_index" => Some(DependencyId::VectorIndex),
        _ => None,
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
