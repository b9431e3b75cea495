//! Tool parameter shapes for the operations in spec §6.1. Deserialized from
//! the MCP client's JSON arguments; `JsonSchema` is derived against rmcp's
//! own re-exported `schemars` to avoid pulling in a second, version-mismatched
//! copy of the trait.

use std::collections::HashMap;

use rmcp::schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct SearchNodesParams {
    pub query: String,
    #[serde(default)]
    pub max_results: Option<usize>,
    #[serde(default)]
    pub similarity_threshold: Option<f32>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct SearchTemplatesParams {
    pub query: String,
    #[serde(default)]
    pub max_results: Option<usize>,
    #[serde(default)]
    pub similarity_threshold: Option<f32>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct CompositionNodeParam {
    pub descriptor_name: String,
    #[serde(default)]
    pub version: Option<u32>,
}

/// Either a template-mode or a composition-mode spec (spec §4.4). Both sets
/// of fields are optional on the wire; exactly one mode's required fields
/// must be present — enforced in `ops::build_spec_from_params` rather than
/// at the schema level, since client SDKs shape tool params as a single
/// flat JSON object rather than a tagged union.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct BuildFlowParams {
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub parameter_overrides: Option<HashMap<String, Value>>,
    #[serde(default)]
    pub node_list: Option<Vec<CompositionNodeParam>>,
    /// Literal inputs keyed by the node's position in `node_list`, as a
    /// JSON object (object keys are always strings on the wire; parsed back
    /// to the node's index).
    #[serde(default)]
    pub literal_inputs: Option<HashMap<String, HashMap<String, Value>>>,
    #[serde(default)]
    pub deployed: Option<bool>,
}
