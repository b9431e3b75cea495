//! `SemanticIndex`: the public C3 contract (spec §4.3) — indexing,
//! ranking, and result shaping over the nodes and templates collections.

use std::sync::Arc;

use dashmap::DashMap;
use flowforge_catalog::{CatalogGeneration, RefreshDelta};
use flowforge_circuit::{DependencyGates, FailureClass};
use flowforge_core::{
    DependencyId, Embedder, FlowTemplate, NodeDescriptor, Result, StoredVectorRecord,
    VectorCollection, VectorIndex,
};

use crate::rendering::{content_hash, render_node, render_template};
use crate::templates::TemplateLibrary;

/// Fixed penalty applied to a deprecated node's score when ranking (spec
/// §4.3): deprecated results are demoted, not excluded.
const DEPRECATED_PENALTY: f32 = 0.1;
/// Tie-break window (spec §4.3: "within 0.05").
const TIE_BREAK_WINDOW: f32 = 0.05;
/// Per-result description budget, to keep node hits small (spec §4.3
/// "size-bounded" results).
const DESCRIPTION_WORD_BUDGET: usize = 40;

#[derive(Debug, Clone, serde::Serialize)]
pub struct NodeHit {
    pub node_name: String,
    pub label: String,
    pub one_line_description: String,
    pub category: String,
    pub deprecated: bool,
    pub score: f32,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TemplateHit {
    pub template_id: String,
    pub name: String,
    pub description: String,
    pub required_node_names: Vec<String>,
    pub parameter_schema_summary: Vec<String>,
    pub score: f32,
}

pub struct SemanticIndex {
    embedder: Arc<dyn Embedder>,
    vector_index: Arc<dyn VectorIndex>,
    templates: Arc<TemplateLibrary>,
    /// record_id -> last-embedded content hash, so re-embedding an unchanged
    /// payload is a no-op (spec §8 property 3).
    content_hashes: DashMap<String, String>,
}

fn node_record_id(descriptor: &NodeDescriptor) -> String {
    format!("{}@{}", descriptor.name, descriptor.version)
}

impl SemanticIndex {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vector_index: Arc<dyn VectorIndex>,
        templates: Arc<TemplateLibrary>,
    ) -> Self {
        Self {
            embedder,
            vector_index,
            templates,
            content_hashes: DashMap::new(),
        }
    }

    pub fn resolve_template(&self, template_id: &str) -> Result<FlowTemplate> {
        self.templates.resolve_template(template_id)
    }

    /// Bulk (re)index of every currently active node plus every known
    /// template. Skips descriptors whose canonical rendering is unchanged
    /// since the last time they were embedded.
    pub async fn reindex_full(&self, gates: &DependencyGates, catalog: &CatalogGeneration) -> Result<()> {
        let nodes: Vec<&NodeDescriptor> = catalog.iter_active().collect();
        self.index_nodes(gates, nodes.into_iter().cloned().collect()).await?;
        self.index_templates(gates, self.templates.iter()).await
    }

    /// Incremental update driven by a catalog refresh's delta set (spec
    /// §4.2 step 4). Deprecated entries are upserted (not deleted) so they
    /// remain searchable-but-demoted, per the duality of "never hard-delete".
    pub async fn apply_delta(&self, gates: &DependencyGates, delta: &RefreshDelta) -> Result<()> {
        let mut changed = Vec::new();
        changed.extend(delta.added.iter().cloned());
        changed.extend(delta.changed.iter().cloned());
        changed.extend(delta.deprecated.iter().cloned());
        self.index_nodes(gates, changed).await
    }

    async fn index_nodes(&self, gates: &DependencyGates, descriptors: Vec<NodeDescriptor>) -> Result<()> {
        let mut texts = Vec::new();
        let mut stale = Vec::new();
        for descriptor in &descriptors {
            let text = render_node(descriptor);
            let hash = content_hash(&text);
            let record_id = node_record_id(descriptor);
            if self.content_hashes.get(&record_id).map(|h| *h == hash).unwrap_or(false) {
                continue; // idempotent: unchanged payload, no re-embed.
            }
            texts.push(text);
            stale.push((record_id, hash, descriptor.clone()));
        }
        if stale.is_empty() {
            return Ok(());
        }

        let embeddings = gates
            .call(
                DependencyId::Embedder,
                || async { self.embedder.embed(&texts).await },
                classify,
            )
            .await?;

        let records: Vec<StoredVectorRecord> = stale
            .iter()
            .zip(embeddings)
            .map(|((record_id, _, descriptor), embedding)| StoredVectorRecord {
                record_id: record_id.clone(),
                embedding,
                payload: serde_json::json!({
                    "name": descriptor.name,
                    "version": descriptor.version,
                    "label": descriptor.label,
                    "category": descriptor.category,
                    "description": descriptor.description,
                    "deprecated": descriptor.deprecated,
                }),
            })
            .collect();

        gates
            .call(
                DependencyId::VectorIndex,
                || async { self.vector_index.upsert(VectorCollection::Nodes, records).await },
                classify,
            )
            .await?;

        for (record_id, hash, _) in stale {
            self.content_hashes.insert(record_id, hash);
        }
        Ok(())
    }

    async fn index_templates(&self, gates: &DependencyGates, templates: Vec<FlowTemplate>) -> Result<()> {
        let mut texts = Vec::new();
        let mut stale = Vec::new();
        for template in &templates {
            let text = render_template(template);
            let hash = content_hash(&text);
            let record_id = template.template_id.clone();
            if self.content_hashes.get(&record_id).map(|h| *h == hash).unwrap_or(false) {
                continue;
            }
            texts.push(text);
            stale.push((record_id, hash, template.clone()));
        }
        if stale.is_empty() {
            return Ok(());
        }

        let embeddings = gates
            .call(
                DependencyId::Embedder,
                || async { self.embedder.embed(&texts).await },
                classify,
            )
            .await?;

        let records: Vec<StoredVectorRecord> = stale
            .iter()
            .zip(embeddings)
            .map(|((record_id, _, template), embedding)| StoredVectorRecord {
                record_id: record_id.clone(),
                embedding,
                payload: serde_json::json!({
                    "template_id": template.template_id,
                    "name": template.name,
                    "description": template.description,
                    "required_node_names": template.required_node_names,
                    "parameter_names": template.parameter_names().collect::<Vec<_>>(),
                }),
            })
            .collect();

        gates
            .call(
                DependencyId::VectorIndex,
                || async { self.vector_index.upsert(VectorCollection::Templates, records).await },
                classify,
            )
            .await?;

        for (record_id, hash, _) in stale {
            self.content_hashes.insert(record_id, hash);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, gates))]
    pub async fn search_nodes(
        &self,
        gates: &DependencyGates,
        query: &str,
        max_results: usize,
        min_similarity: f32,
        category_filter: Option<&str>,
    ) -> Result<Vec<NodeHit>> {
        let embedding = self.embed_query(gates, query).await?;
        let hits = gates
            .call(
                DependencyId::VectorIndex,
                || async {
                    self.vector_index
                        .query(VectorCollection::Nodes, &embedding, max_results.max(32) * 4)
                        .await
                },
                classify,
            )
            .await?;

        let mut candidates: Vec<NodeHit> = hits
            .into_iter()
            .filter(|h| h.score >= min_similarity)
            .filter_map(|h| {
                let payload = &h.payload;
                let category = payload.get("category")?.as_str()?.to_string();
                if let Some(filter) = category_filter {
                    if category != filter {
                        return None;
                    }
                }
                Some(NodeHit {
                    node_name: payload.get("name")?.as_str()?.to_string(),
                    label: payload.get("label")?.as_str()?.to_string(),
                    one_line_description: truncate_at_word_boundary(
                        payload.get("description")?.as_str()?,
                        DESCRIPTION_WORD_BUDGET,
                    ),
                    category,
                    deprecated: payload.get("deprecated").and_then(|v| v.as_bool()).unwrap_or(false),
                    score: h.score,
                })
            })
            .collect();

        sort_with_tie_break(&mut candidates, |hit| hit.score, |a, b| {
            // non-deprecated first
            a.deprecated.cmp(&b.deprecated)
        }, |hit| adjusted_score(hit.score, hit.deprecated));

        candidates.truncate(max_results);
        Ok(candidates)
    }

    #[tracing::instrument(skip(self, gates))]
    pub async fn search_templates(
        &self,
        gates: &DependencyGates,
        query: &str,
        max_results: usize,
        min_similarity: f32,
    ) -> Result<Vec<TemplateHit>> {
        let embedding = self.embed_query(gates, query).await?;
        let hits = gates
            .call(
                DependencyId::VectorIndex,
                || async {
                    self.vector_index
                        .query(VectorCollection::Templates, &embedding, max_results.max(32) * 4)
                        .await
                },
                classify,
            )
            .await?;

        let mut candidates: Vec<TemplateHit> = hits
            .into_iter()
            .filter(|h| h.score >= min_similarity)
            .filter_map(|h| {
                let payload = &h.payload;
                let required: Vec<String> = payload
                    .get("required_node_names")?
                    .as_array()?
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect();
                let params: Vec<String> = payload
                    .get("parameter_names")
                    .and_then(|v| v.as_array())
                    .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                    .unwrap_or_default();
                Some(TemplateHit {
                    template_id: payload.get("template_id")?.as_str()?.to_string(),
                    name: payload.get("name")?.as_str()?.to_string(),
                    description: truncate_at_word_boundary(
                        payload.get("description")?.as_str()?,
                        DESCRIPTION_WORD_BUDGET,
                    ),
                    required_node_names: required,
                    parameter_schema_summary: params,
                    score: h.score,
                })
            })
            .collect();

        sort_with_tie_break(
            &mut candidates,
            |hit| hit.score,
            |a, b| a.required_node_names.len().cmp(&b.required_node_names.len()),
            |hit| hit.score,
        );

        candidates.truncate(max_results);
        Ok(candidates)
    }

    async fn embed_query(&self, gates: &DependencyGates, query: &str) -> Result<Vec<f32>> {
        let embeddings = gates
            .call(
                DependencyId::Embedder,
                || async { self.embedder.embed(&[query.to_string()]).await },
                classify,
            )
            .await?;
        Ok(embeddings.into_iter().next().unwrap_or_default())
    }
}

fn adjusted_score(score: f32, deprecated: bool) -> f32 {
    if deprecated {
        score - DEPRECATED_PENALTY
    } else {
        score
    }
}

fn classify(e: &flowforge_core::FlowforgeError) -> FailureClass {
    if e.is_transport() {
        FailureClass::Transport
    } else {
        FailureClass::Validation
    }
}

fn truncate_at_word_boundary(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        text.to_string()
    } else {
        format!("{}…", words[..max_words].join(" "))
    }
}

/// Sorts descending by `score_fn`, breaking near-ties (within
/// `TIE_BREAK_WINDOW`) using `tie_break` (spec §4.3).
fn sort_with_tie_break<T>(
    items: &mut [T],
    score_fn: impl Fn(&T) -> f32,
    tie_break: impl Fn(&T, &T) -> std::cmp::Ordering,
    sort_key: impl Fn(&T) -> f32,
) {
    items.sort_by(|a, b| {
        let (sa, sb) = (sort_key(a), sort_key(b));
        if (score_fn(a) - score_fn(b)).abs() <= TIE_BREAK_WINDOW {
            tie_break(a, b).then_with(|| sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal))
        } else {
            sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::LocalHashEmbedder;
    use crate::index::InMemoryVectorIndex;
    use flowforge_core::SystemClock;
    use std::time::Duration;

    fn gates() -> DependencyGates {
        DependencyGates::new(3, Duration::from_secs(300), Arc::new(SystemClock), None)
    }

    fn descriptor(name: &str, category: &str, description: &str, deprecated: bool) -> NodeDescriptor {
        NodeDescriptor {
            name: name.into(),
            version: 1,
            label: name.into(),
            category: category.into(),
            base_classes: vec![name.into()],
            input_anchors: vec![],
            output_anchors: vec![flowforge_core::OutputAnchor {
                name: "output".into(),
                type_chain: vec![name.into()],
            }],
            description: description.into(),
            deprecated,
            credential_types: None,
        }
    }

    fn index() -> SemanticIndex {
        SemanticIndex::new(
            Arc::new(LocalHashEmbedder::default()),
            Arc::new(InMemoryVectorIndex::new()),
            Arc::new(TemplateLibrary::new()),
        )
    }

    #[tokio::test]
    async fn reindexing_unchanged_catalog_is_idempotent() {
        let gates = gates();
        let idx = index();
        let mut gen = flowforge_catalog::CatalogGeneration::empty(1, chrono::Utc::now());
        gen.insert(descriptor("chatOpenAI", "Chat Models", "wraps openai chat", false));

        idx.reindex_full(&gates, &gen).await.unwrap();
        let before = idx.content_hashes.len();
        idx.reindex_full(&gates, &gen).await.unwrap();
        assert_eq!(before, idx.content_hashes.len());
    }

    #[tokio::test]
    async fn search_nodes_respects_min_similarity_and_category_filter() {
        let gates = gates();
        let idx = index();
        let mut gen = flowforge_catalog::CatalogGeneration::empty(1, chrono::Utc::now());
        gen.insert(descriptor("chatOpenAI", "Chat Models", "wraps openai chat completion model", false));
        gen.insert(descriptor("bufferMemory", "Memory", "keeps conversation history buffer", false));
        idx.reindex_full(&gates, &gen).await.unwrap();

        let hits = idx
            .search_nodes(&gates, "openai chat completion model", 5, 0.0, None)
            .await
            .unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].node_name, "chatOpenAI");

        let filtered = idx
            .search_nodes(&gates, "openai chat completion model", 5, 0.0, Some("Memory"))
            .await
            .unwrap();
        assert!(filtered.iter().all(|h| h.category == "Memory"));
    }

    #[tokio::test]
    async fn lowering_threshold_never_removes_results() {
        let gates = gates();
        let idx = index();
        let mut gen = flowforge_catalog::CatalogGeneration::empty(1, chrono::Utc::now());
        gen.insert(descriptor("chatOpenAI", "Chat Models", "wraps openai chat completion model", false));
        gen.insert(descriptor("bufferMemory", "Memory", "keeps conversation history buffer", false));
        idx.reindex_full(&gates, &gen).await.unwrap();

        let strict = idx
            .search_nodes(&gates, "openai chat completion model", 5, 0.9, None)
            .await
            .unwrap();
        let loose = idx
            .search_nodes(&gates, "openai chat completion model", 5, 0.0, None)
            .await
            .unwrap();
        let strict_names: std::collections::HashSet<_> = strict.iter().map(|h| h.node_name.clone()).collect();
        let loose_names: std::collections::HashSet<_> = loose.iter().map(|h| h.node_name.clone()).collect();
        assert!(strict_names.is_subset(&loose_names));
    }

    #[tokio::test]
    async fn deprecated_node_is_demoted_not_excluded() {
        let gates = gates();
        let idx = index();
        let mut gen = flowforge_catalog::CatalogGeneration::empty(1, chrono::Utc::now());
        gen.insert(descriptor("oldChain", "Chains", "legacy chain implementation", true));
        idx.reindex_full(&gates, &gen).await.unwrap();

        let hits = idx.search_nodes(&gates, "legacy chain implementation", 5, 0.0, None).await.unwrap();
        assert!(hits.iter().any(|h| h.node_name == "oldChain" && h.deprecated));
    }
}
