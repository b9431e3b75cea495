//! `build_flow`: the single externally visible C4 operation (spec §4.4).

use std::collections::{HashMap, HashSet};

use flowforge_catalog::{CatalogGeneration, VersionSelector};
use flowforge_circuit::{DependencyGates, FailureClass};
use flowforge_core::config::LayoutConfig;
use flowforge_core::{
    CreatedChatflow, DependencyId, Edge, FlowGraph, FlowiseGateway, FlowforgeError, InputValue,
    NodeDescriptor, NodeInstance, Position, Result,
};
use flowforge_vector::TemplateLibrary;
use serde_json::Value;

use crate::edges::infer_edges;
use crate::layout::{height_for, layout_graph};
use crate::ordering::stable_order;
use crate::serialize::serialize_flow;
use crate::validate::validate_graph;

/// One entry in a composition-mode node list.
#[derive(Debug, Clone)]
pub struct CompositionNode {
    pub descriptor_name: String,
    pub version: Option<u32>,
}

#[derive(Debug, Clone)]
pub enum BuildSpec {
    Template {
        template_id: String,
        parameter_overrides: HashMap<String, Value>,
    },
    Composition {
        node_list: Vec<CompositionNode>,
        /// Literal inputs keyed by the node's position in `node_list`,
        /// applied before edge inference and never overwritten by it.
        literal_inputs: HashMap<usize, HashMap<String, Value>>,
        deployed: bool,
    },
}

fn classify(e: &FlowforgeError) -> FailureClass {
    if e.is_transport() {
        FailureClass::Transport
    } else {
        FailureClass::Validation
    }
}

fn next_id(used: &HashSet<String>, descriptor_name: &str) -> String {
    let mut k = 0u32;
    loop {
        let candidate = format!("{descriptor_name}_{k}");
        if !used.contains(&candidate) {
            return candidate;
        }
        k += 1;
    }
}

/// Clones a template's graph and regenerates every instance id, updating
/// both the outer identifier and every embedded reference (spec §4.4.1
/// step 2 — critical for the id-duality invariant).
fn regenerate_ids(mut graph: FlowGraph) -> FlowGraph {
    let mut used: HashSet<String> = HashSet::new();
    let mut remap: HashMap<String, String> = HashMap::new();
    for node in &mut graph.nodes {
        let new_id = next_id(&used, &node.descriptor_name);
        used.insert(new_id.clone());
        remap.insert(node.id.clone(), new_id.clone());
        node.id = new_id;
    }
    for node in &mut graph.nodes {
        for value in node.inputs.values_mut() {
            match value {
                InputValue::NodeRef { instance_id, .. } => {
                    if let Some(new_id) = remap.get(instance_id) {
                        *instance_id = new_id.clone();
                    }
                }
                InputValue::NodeRefList(targets) => {
                    for target in targets {
                        if let Some(new_id) = remap.get(&target.instance_id) {
                            target.instance_id = new_id.clone();
                        }
                    }
                }
                InputValue::Literal(_) => {}
            }
        }
    }
    for edge in &mut graph.edges {
        if let Some(new_id) = remap.get(&edge.source_instance_id) {
            edge.source_instance_id = new_id.clone();
        }
        if let Some(new_id) = remap.get(&edge.target_instance_id) {
            edge.target_instance_id = new_id.clone();
        }
    }
    graph
}

/// Applies `overrides` against `schema` strictly: an unknown key fails fast
/// (spec §4.4.1 step 3). A known key is written onto every node instance
/// that already carries a literal under that anchor name.
fn apply_parameter_overrides(
    graph: &mut FlowGraph,
    schema: &[flowforge_core::ParameterConstraint],
    overrides: HashMap<String, Value>,
) -> Result<()> {
    let by_name: HashMap<&str, &flowforge_core::ParameterConstraint> =
        schema.iter().map(|c| (c.name.as_str(), c)).collect();

    for (key, value) in overrides {
        let Some(constraint) = by_name.get(key.as_str()) else {
            return Err(FlowforgeError::validation(format!(
                "unknown template parameter {key}"
            )));
        };
        check_constraint(constraint, &value)?;
        let mut applied = false;
        for node in &mut graph.nodes {
            if let Some(InputValue::Literal(existing)) = node.inputs.get_mut(&key) {
                *existing = value.clone();
                applied = true;
            }
        }
        if !applied {
            tracing::warn!(parameter = %key, "template parameter_schema entry has no matching literal input");
        }
    }
    Ok(())
}

fn check_constraint(constraint: &flowforge_core::ParameterConstraint, value: &Value) -> Result<()> {
    if let Some(allowed) = &constraint.allowed_values {
        if !allowed.contains(value) {
            return Err(FlowforgeError::validation(format!(
                "value for parameter {} is not one of the allowed values",
                constraint.name
            )));
        }
    }
    if let Some(n) = value.as_f64() {
        if let Some(min) = constraint.min {
            if n < min {
                return Err(FlowforgeError::validation(format!(
                    "value for parameter {} is below its minimum",
                    constraint.name
                )));
            }
        }
        if let Some(max) = constraint.max {
            if n > max {
                return Err(FlowforgeError::validation(format!(
                    "value for parameter {} is above its maximum",
                    constraint.name
                )));
            }
        }
    }
    Ok(())
}

async fn submit(
    gates: &DependencyGates,
    gateway: &dyn FlowiseGateway,
    name: &str,
    wire: Value,
    deployed: bool,
) -> Result<CreatedChatflow> {
    gates
        .call(
            DependencyId::Gateway,
            || async { gateway.create_chatflow(name, wire, deployed).await },
            classify,
        )
        .await
}

#[tracing::instrument(skip(spec, gates, gateway, catalog, templates, layout_config))]
pub async fn build_flow(
    spec: BuildSpec,
    gates: &DependencyGates,
    gateway: &dyn FlowiseGateway,
    catalog: &CatalogGeneration,
    templates: &TemplateLibrary,
    layout_config: &LayoutConfig,
) -> Result<CreatedChatflow> {
    match spec {
        BuildSpec::Template {
            template_id,
            parameter_overrides,
        } => build_from_template(template_id, parameter_overrides, gates, gateway, catalog, templates).await,
        BuildSpec::Composition {
            node_list,
            literal_inputs,
            deployed,
        } => build_from_composition(node_list, literal_inputs, deployed, gates, gateway, catalog, layout_config).await,
    }
}

async fn build_from_template(
    template_id: String,
    parameter_overrides: HashMap<String, Value>,
    gates: &DependencyGates,
    gateway: &dyn FlowiseGateway,
    catalog: &CatalogGeneration,
    templates: &TemplateLibrary,
) -> Result<CreatedChatflow> {
    let template = templates.resolve_template(&template_id)?;
    let mut graph = regenerate_ids(template.flow_data.clone());
    apply_parameter_overrides(&mut graph, &template.parameter_schema, parameter_overrides)?;

    validate_graph(&graph, |name, version| {
        catalog
            .lookup(name, VersionSelector::Pinned(version))
            .map(|hit| hit.descriptor)
    })?;

    let wire = serialize_flow(&graph, |name, version| {
        catalog
            .lookup(name, VersionSelector::Pinned(version))
            .map(|hit| hit.descriptor)
    });

    submit(gates, gateway, &template.name, wire, false).await
}

async fn build_from_composition(
    node_list: Vec<CompositionNode>,
    literal_inputs: HashMap<usize, HashMap<String, Value>>,
    deployed: bool,
    gates: &DependencyGates,
    gateway: &dyn FlowiseGateway,
    catalog: &CatalogGeneration,
    layout_config: &LayoutConfig,
) -> Result<CreatedChatflow> {
    if node_list.is_empty() {
        return Err(FlowforgeError::validation("node_list must not be empty"));
    }

    let mut descriptors = Vec::with_capacity(node_list.len());
    for entry in &node_list {
        let selector = match entry.version {
            Some(v) => VersionSelector::Pinned(v),
            None => VersionSelector::LatestNonDeprecated,
        };
        let hit = catalog
            .lookup(&entry.descriptor_name, selector)
            .ok_or_else(|| FlowforgeError::validation(format!("unknown node {}", entry.descriptor_name)))?;
        descriptors.push(hit.descriptor);
    }

    let mut used: HashSet<String> = HashSet::new();
    let mut instances: Vec<NodeInstance> = Vec::with_capacity(node_list.len());
    for (index, descriptor) in descriptors.iter().enumerate() {
        let id = next_id(&used, &descriptor.name);
        used.insert(id.clone());
        let mut inputs = std::collections::BTreeMap::new();
        if let Some(literals) = literal_inputs.get(&index) {
            for (key, value) in literals {
                inputs.insert(key.clone(), InputValue::Literal(value.clone()));
            }
        }
        instances.push(NodeInstance {
            id,
            descriptor_name: descriptor.name.clone(),
            descriptor_version: descriptor.version,
            inputs,
            position: Position { x: 0.0, y: 0.0 },
            width: 300.0,
            height: height_for(&descriptor.category),
        });
    }

    let paired: Vec<(NodeInstance, NodeDescriptor)> = instances.into_iter().zip(descriptors.into_iter()).collect();
    let ordered = stable_order(paired, |(_, d)| d);
    let (mut ordered_instances, ordered_descriptors): (Vec<NodeInstance>, Vec<NodeDescriptor>) =
        ordered.into_iter().unzip();

    let edges: Vec<Edge> = infer_edges(&mut ordered_instances, &ordered_descriptors)?;

    let mut graph = FlowGraph {
        nodes: ordered_instances,
        edges,
        viewport: Default::default(),
    };

    validate_graph(&graph, |name, version| {
        catalog
            .lookup(name, VersionSelector::Pinned(version))
            .map(|hit| hit.descriptor)
    })?;

    layout_graph(&mut graph, layout_config);

    let flow_name = format!(
        "Composed: {}",
        node_list
            .iter()
            .map(|n| n.descriptor_name.as_str())
            .collect::<Vec<_>>()
            .join(" + ")
    );

    let wire = serialize_flow(&graph, |name, version| {
        catalog
            .lookup(name, VersionSelector::Pinned(version))
            .map(|hit| hit.descriptor)
    });

    submit(gates, gateway, &flow_name, wire, deployed).await
}
