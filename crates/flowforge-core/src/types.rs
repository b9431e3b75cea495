//! The data model described in spec §3.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single typed connection point on a node (input or output).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputAnchor {
    pub name: String,
    pub required_type: String,
    pub optional: bool,
    /// `list?` cardinality: if true, the anchor accepts zero or more
    /// incoming edges; if false, at most one.
    pub list: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputAnchor {
    pub name: String,
    /// Ordered supertype chain a value leaving this anchor can satisfy,
    /// e.g. `["chatOpenAI", "BaseChatModel", "BaseLanguageModel"]`.
    pub type_chain: Vec<String>,
}

/// A Flowise node type as observable by the core (spec §3 `NodeDescriptor`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub name: String,
    pub version: u32,
    pub label: String,
    pub category: String,
    /// First element is the concrete type; remaining are supertypes.
    pub base_classes: Vec<String>,
    pub input_anchors: Vec<InputAnchor>,
    pub output_anchors: Vec<OutputAnchor>,
    pub description: String,
    pub deprecated: bool,
    pub credential_types: Option<Vec<String>>,
}

impl NodeDescriptor {
    /// Invariant: `base_classes[0]` appears in the produced type chain of
    /// every output anchor.
    pub fn check_base_class_invariant(&self) -> bool {
        let Some(concrete) = self.base_classes.first() else {
            return false;
        };
        self.output_anchors
            .iter()
            .all(|a| a.type_chain.iter().any(|t| t == concrete))
    }

    pub fn concrete_type(&self) -> Option<&str> {
        self.base_classes.first().map(String::as_str)
    }

    pub fn output_for(&self, anchor_name: &str) -> Option<&OutputAnchor> {
        self.output_anchors.iter().find(|a| a.name == anchor_name)
    }

    pub fn input_for(&self, anchor_name: &str) -> Option<&InputAnchor> {
        self.input_anchors.iter().find(|a| a.name == anchor_name)
    }
}

/// A literal value or a reference to another node's output anchor.
///
/// Source patterns requiring re-architecture (spec §9): the original system
/// represents node references as a runtime string interpolation,
/// `"{{nodeId.data.instance}}"`, baked directly into `inputs`. We represent
/// the reference structurally and only render it to that interpolation
/// string at the wire boundary (`engine::serialize`), which keeps validation
/// structural instead of textual and makes the `id == data.id` duality
/// invariant automatic rather than something every caller must remember.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum InputValue {
    Literal(serde_json::Value),
    NodeRef {
        instance_id: String,
        output_anchor: String,
    },
    /// Multiple producers feeding a single `list = true` anchor (e.g. an
    /// agent's `tools`). Kept distinct from `NodeRef` so a single-connection
    /// anchor and a multi-connection one are structurally different, rather
    /// than collapsing to a map that happens to hold one or many refs.
    NodeRefList(Vec<NodeRefTarget>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRefTarget {
    pub instance_id: String,
    pub output_anchor: String,
}

/// A concrete node inside a flow (spec §3 `NodeInstance`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInstance {
    pub id: String,
    pub descriptor_name: String,
    pub descriptor_version: u32,
    pub inputs: BTreeMap<String, InputValue>,
    pub position: Position,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A directed connection between two node instances (spec §3 `Edge`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub edge_id: String,
    pub source_instance_id: String,
    pub source_anchor: String,
    pub target_instance_id: String,
    pub target_anchor: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

/// The constructed artifact (spec §3 `FlowGraph`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FlowGraph {
    pub nodes: Vec<NodeInstance>,
    pub edges: Vec<Edge>,
    pub viewport: Viewport,
}

impl FlowGraph {
    pub fn find_node(&self, id: &str) -> Option<&NodeInstance> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Customizable literal in a template, with a value constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterConstraint {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// A frozen `FlowGraph` shape (spec §3 `FlowTemplate`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowTemplate {
    pub template_id: String,
    pub name: String,
    pub description: String,
    pub required_node_names: Vec<String>,
    pub parameter_schema: Vec<ParameterConstraint>,
    pub flow_data: FlowGraph,
}

impl FlowTemplate {
    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameter_schema.iter().map(|p| p.name.as_str())
    }
}
