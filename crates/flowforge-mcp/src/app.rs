//! Wires the four core components into one set of shared handles, the way
//! the teacher's binaries build a `CodeGraph` from its `ServerConfig` before
//! handing it to either the MCP server or a CLI subcommand.

use std::sync::Arc;
use std::time::Duration;

use flowforge_catalog::{default_state_dir, CatalogCache, CatalogStore};
use flowforge_circuit::DependencyGates;
use flowforge_core::config::Configuration;
use flowforge_core::{Clock, FlowiseGateway, Result, SystemClock, VectorIndex};
use flowforge_vector::{InMemoryVectorIndex, LocalHashEmbedder, SemanticIndex, TemplateLibrary};

use crate::gateway::HttpFlowiseGateway;

#[derive(Clone)]
pub struct Components {
    pub config: Configuration,
    pub gates: Arc<DependencyGates>,
    pub gateway: Arc<dyn FlowiseGateway>,
    pub catalog: Arc<CatalogCache>,
    pub index: Arc<SemanticIndex>,
    pub templates: Arc<TemplateLibrary>,
    pub vector_index: Arc<dyn VectorIndex>,
    pub clock: Arc<dyn Clock>,
}

impl Components {
    /// `templates_dir`, if given, is loaded once at startup (spec §3
    /// "curated out-of-band, loaded once").
    pub fn build(config: Configuration, templates_dir: Option<&std::path::Path>) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let state_dir = std::path::Path::new(&config.catalog.state_dir);
        let gates = Arc::new(DependencyGates::new(
            config.circuit.failure_threshold,
            Duration::from_secs(config.circuit.open_duration_s),
            clock.clone(),
            Some(state_dir.join("circuits.json")),
        ));

        let catalog_store = CatalogStore::new(default_state_dir(&config.catalog.state_dir));
        let catalog = Arc::new(CatalogCache::new(
            catalog_store,
            Duration::from_secs(config.catalog.staleness_s),
            clock.clone(),
        )?);

        let gateway: Arc<dyn FlowiseGateway> = Arc::new(HttpFlowiseGateway::new(&config.gateway)?);

        let vector_index: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::new());
        let embedder = Arc::new(LocalHashEmbedder::default());
        let templates = Arc::new(TemplateLibrary::new());
        if let Some(dir) = templates_dir {
            match templates.load_from_dir(dir) {
                Ok(n) => tracing::info!(count = n, dir = %dir.display(), "loaded flow templates"),
                Err(e) => tracing::warn!(error = %e, dir = %dir.display(), "failed to load flow templates"),
            }
        }

        let index = Arc::new(SemanticIndex::new(embedder, vector_index.clone(), templates.clone()));

        Ok(Self {
            config,
            gates,
            gateway,
            catalog,
            index,
            templates,
            vector_index,
            clock,
        })
    }

    /// Rebuilds the vector index from the current catalog generation and
    /// template library (spec §B.5: the default in-process index persists
    /// nothing extra, so it is rebuilt on every startup).
    pub async fn reindex(&self) -> Result<()> {
        self.index.reindex_full(&self.gates, &self.catalog.current()).await
    }
}
