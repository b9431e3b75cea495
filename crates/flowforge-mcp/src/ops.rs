//! The five operations exposed by the MCP surface (spec §6.1), as plain
//! async functions over `Components` — shared by the `rmcp` tool router
//! (`server.rs`) and the operator CLI subcommands (`bin/flowforge-mcp.rs`)
//! so neither path re-implements the other's logic.

use std::collections::HashMap;

use flowforge_catalog::RefreshOutcome;
use flowforge_core::{FlowforgeError, Result};
use flowforge_engine::{build_flow, BuildSpec, CompositionNode};
use flowforge_vector::{NodeHit, TemplateHit};
use serde::Serialize;

use crate::app::Components;
use crate::health::{build_system_health, SystemHealth};
use crate::params::BuildFlowParams;

#[derive(Debug, Clone, Serialize)]
pub struct StaleAnnotated<T> {
    #[serde(flatten)]
    pub hit: T,
    pub stale: bool,
}

/// Best-effort freshness check shared by both search operations (spec §8
/// scenario 5): a refresh failure never fails the search, it only flips the
/// `stale` annotation on every returned hit.
async fn ensure_fresh_best_effort(components: &Components) -> Result<bool> {
    match components.catalog.ensure_fresh(&components.gates, components.gateway.as_ref()).await {
        Ok(_) => Ok(components.catalog.is_stale()),
        Err(err) => Err(err),
    }
}

pub async fn search_nodes(
    components: &Components,
    query: &str,
    max_results: Option<usize>,
    min_similarity: Option<f32>,
    category: Option<&str>,
) -> Result<Vec<StaleAnnotated<NodeHit>>> {
    let stale = ensure_fresh_best_effort(components).await?;
    let max_results = max_results.unwrap_or(components.config.search.default_max_results);
    let min_similarity = min_similarity.unwrap_or(components.config.search.default_min_similarity);
    let hits = components
        .index
        .search_nodes(&components.gates, query, max_results, min_similarity, category)
        .await?;
    Ok(hits.into_iter().map(|hit| StaleAnnotated { hit, stale }).collect())
}

pub async fn search_templates(
    components: &Components,
    query: &str,
    max_results: Option<usize>,
    min_similarity: Option<f32>,
) -> Result<Vec<StaleAnnotated<TemplateHit>>> {
    let stale = ensure_fresh_best_effort(components).await?;
    let max_results = max_results.unwrap_or(components.config.search.default_max_results);
    let min_similarity = min_similarity.unwrap_or(components.config.search.default_min_similarity);
    let hits = components
        .index
        .search_templates(&components.gates, query, max_results, min_similarity)
        .await?;
    Ok(hits.into_iter().map(|hit| StaleAnnotated { hit, stale }).collect())
}

/// Converts the wire-shaped params into a `BuildSpec`. Exactly one mode's
/// required fields must be present.
pub fn build_spec_from_params(params: BuildFlowParams) -> Result<BuildSpec> {
    match (params.template_id, params.node_list) {
        (Some(_), Some(_)) => Err(FlowforgeError::validation(
            "build_flow accepts either template_id or node_list, not both",
        )),
        (Some(template_id), None) => Ok(BuildSpec::Template {
            template_id,
            parameter_overrides: params.parameter_overrides.unwrap_or_default(),
        }),
        (None, Some(nodes)) => {
            let node_list: Vec<CompositionNode> = nodes
                .into_iter()
                .map(|n| CompositionNode {
                    descriptor_name: n.descriptor_name,
                    version: n.version,
                })
                .collect();
            let mut literal_inputs: HashMap<usize, HashMap<String, serde_json::Value>> = HashMap::new();
            for (key, value) in params.literal_inputs.unwrap_or_default() {
                let index: usize = key
                    .parse()
                    .map_err(|_| FlowforgeError::validation(format!("literal_inputs key {key} is not a node index")))?;
                literal_inputs.insert(index, value);
            }
            Ok(BuildSpec::Composition {
                node_list,
                literal_inputs,
                deployed: params.deployed.unwrap_or(false),
            })
        }
        (None, None) => Err(FlowforgeError::validation(
            "build_flow requires either template_id or node_list",
        )),
    }
}

pub async fn build_flow_op(components: &Components, params: BuildFlowParams) -> Result<flowforge_core::CreatedChatflow> {
    let spec = build_spec_from_params(params)?;
    if let Err(err) = components.catalog.ensure_fresh(&components.gates, components.gateway.as_ref()).await {
        tracing::warn!(error = %err, "catalog refresh failed before build_flow, proceeding with current generation");
    }
    let catalog = components.catalog.current();
    build_flow(
        spec,
        &components.gates,
        components.gateway.as_ref(),
        &catalog,
        &components.templates,
        &components.config.layout,
    )
    .await
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshSummary {
    pub added: usize,
    pub changed: usize,
    pub deprecated: usize,
    pub total: usize,
    /// Set when the refresh failed and a previous generation was retained
    /// (spec §7 `StaleCatalog`, a warning rather than a failure).
    pub warning: Option<String>,
}

pub async fn refresh_node_catalog(components: &Components) -> Result<RefreshSummary> {
    match components.catalog.refresh_now(&components.gates, components.gateway.as_ref()).await? {
        RefreshOutcome::UpToDate => Ok(RefreshSummary {
            added: 0,
            changed: 0,
            deprecated: 0,
            total: 0,
            warning: None,
        }),
        RefreshOutcome::Refreshed(delta) => {
            if let Err(err) = components.index.apply_delta(&components.gates, &delta).await {
                tracing::warn!(error = %err, "vector reindex after catalog refresh failed");
            }
            Ok(RefreshSummary {
                added: delta.added.len(),
                changed: delta.changed.len(),
                deprecated: delta.deprecated.len(),
                total: delta.total(),
                warning: None,
            })
        }
        RefreshOutcome::StaleRetained { reason } => Ok(RefreshSummary {
            added: 0,
            changed: 0,
            deprecated: 0,
            total: 0,
            warning: Some(reason),
        }),
    }
}

pub async fn get_system_health(components: &Components) -> SystemHealth {
    build_system_health(
        &components.gates,
        &components.catalog,
        &components.vector_index,
        components.clock.as_ref(),
        components.config.circuit.open_duration_s,
    )
    .await
}
