//! Graph validation shared by both build modes (spec §4.4.3). A failure
//! here is an engine bug, not a user error, and is surfaced with the node
//! and anchor that tripped the invariant so it stays debuggable.

use std::collections::{HashMap, HashSet, VecDeque};

use flowforge_core::{FlowGraph, FlowforgeError, InputValue, NodeDescriptor, Result};

/// `descriptor_of` resolves an instance's `(descriptor_name, version)` to
/// its full descriptor; callers pass this rather than a concrete catalog
/// type so the engine stays decoupled from C2.
pub fn validate_graph(
    graph: &FlowGraph,
    descriptor_of: impl Fn(&str, u32) -> Option<NodeDescriptor>,
) -> Result<()> {
    check_unique_ids(graph)?;
    check_edges_reference_existing_nodes(graph)?;
    check_no_self_loops(graph)?;
    check_acyclic(graph)?;
    check_required_inputs_and_arity(graph, &descriptor_of)?;
    Ok(())
}

fn check_unique_ids(graph: &FlowGraph) -> Result<()> {
    let mut seen = HashSet::new();
    for node in &graph.nodes {
        if !seen.insert(node.id.as_str()) {
            return Err(FlowforgeError::structural_at(
                "duplicate node id in constructed graph",
                node.id.clone(),
                "",
            ));
        }
    }
    Ok(())
}

fn check_edges_reference_existing_nodes(graph: &FlowGraph) -> Result<()> {
    let ids: HashSet<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
    for edge in &graph.edges {
        if !ids.contains(edge.source_instance_id.as_str()) || !ids.contains(edge.target_instance_id.as_str()) {
            return Err(FlowforgeError::structural_at(
                "edge references a node absent from the graph",
                edge.target_instance_id.clone(),
                edge.target_anchor.clone(),
            ));
        }
    }
    Ok(())
}

fn check_no_self_loops(graph: &FlowGraph) -> Result<()> {
    for edge in &graph.edges {
        if edge.source_instance_id == edge.target_instance_id {
            return Err(FlowforgeError::structural_at(
                "self-loop edge",
                edge.target_instance_id.clone(),
                edge.target_anchor.clone(),
            ));
        }
    }
    Ok(())
}

/// Kahn's algorithm, explicit queue — no recursion (spec §9).
fn check_acyclic(graph: &FlowGraph) -> Result<()> {
    let mut in_degree: HashMap<&str, usize> = graph.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &graph.edges {
        *in_degree.entry(edge.target_instance_id.as_str()).or_insert(0) += 1;
        adjacency
            .entry(edge.source_instance_id.as_str())
            .or_default()
            .push(edge.target_instance_id.as_str());
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut visited = 0usize;

    while let Some(node) = queue.pop_front() {
        visited += 1;
        if let Some(children) = adjacency.get(node) {
            for child in children {
                let deg = in_degree.get_mut(child).expect("child tracked in in_degree");
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(child);
                }
            }
        }
    }

    if visited != graph.nodes.len() {
        return Err(FlowforgeError::structural("constructed graph contains a cycle"));
    }
    Ok(())
}

fn check_required_inputs_and_arity(
    graph: &FlowGraph,
    descriptor_of: &impl Fn(&str, u32) -> Option<NodeDescriptor>,
) -> Result<()> {
    for node in &graph.nodes {
        let Some(descriptor) = descriptor_of(&node.descriptor_name, node.descriptor_version) else {
            return Err(FlowforgeError::structural_at(
                "node instance has no resolvable descriptor",
                node.id.clone(),
                "",
            ));
        };
        for anchor in &descriptor.input_anchors {
            match node.inputs.get(&anchor.name) {
                Some(InputValue::NodeRef { .. }) if !anchor.list => {}
                Some(InputValue::NodeRefList(targets)) if anchor.list => {
                    if targets.is_empty() && !anchor.optional {
                        return Err(FlowforgeError::structural_at(
                            "required list input has no connections",
                            node.id.clone(),
                            anchor.name.clone(),
                        ));
                    }
                }
                Some(InputValue::Literal(_)) => {}
                Some(InputValue::NodeRef { .. }) if anchor.list => {
                    return Err(FlowforgeError::structural_at(
                        "list anchor was given a single connection instead of a list",
                        node.id.clone(),
                        anchor.name.clone(),
                    ));
                }
                Some(InputValue::NodeRefList(_)) if !anchor.list => {
                    return Err(FlowforgeError::structural_at(
                        "non-list anchor was given multiple connections",
                        node.id.clone(),
                        anchor.name.clone(),
                    ));
                }
                None if anchor.optional => {}
                None => {
                    return Err(FlowforgeError::structural_at(
                        "required input is unsatisfied",
                        node.id.clone(),
                        anchor.name.clone(),
                    ));
                }
                _ => unreachable!(),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowforge_core::{Edge, InputAnchor, NodeInstance, OutputAnchor, Position, Viewport};
    use std::collections::BTreeMap;

    fn descriptor(name: &str, required: bool, list: bool) -> NodeDescriptor {
        NodeDescriptor {
            name: name.into(),
            version: 1,
            label: name.into(),
            category: "Test".into(),
            base_classes: vec![name.into()],
            input_anchors: vec![InputAnchor {
                name: "in".into(),
                required_type: "Any".into(),
                optional: !required,
                list,
            }],
            output_anchors: vec![OutputAnchor {
                name: "out".into(),
                type_chain: vec![name.into()],
            }],
            description: String::new(),
            deprecated: false,
            credential_types: None,
        }
    }

    fn node(id: &str, descriptor_name: &str, inputs: BTreeMap<String, InputValue>) -> NodeInstance {
        NodeInstance {
            id: id.into(),
            descriptor_name: descriptor_name.into(),
            descriptor_version: 1,
            inputs,
            position: Position { x: 0.0, y: 0.0 },
            width: 300.0,
            height: 200.0,
        }
    }

    #[test]
    fn rejects_duplicate_ids() {
        let d = descriptor("n", false, false);
        let graph = FlowGraph {
            nodes: vec![node("a", "n", BTreeMap::new()), node("a", "n", BTreeMap::new())],
            edges: vec![],
            viewport: Viewport::default(),
        };
        let err = validate_graph(&graph, |_, _| Some(d.clone())).unwrap_err();
        assert!(matches!(err, FlowforgeError::StructuralIncompatibility { .. }));
    }

    #[test]
    fn rejects_cycle() {
        let d = descriptor("n", false, false);
        let graph = FlowGraph {
            nodes: vec![node("a", "n", BTreeMap::new()), node("b", "n", BTreeMap::new())],
            edges: vec![
                Edge {
                    edge_id: "e1".into(),
                    source_instance_id: "a".into(),
                    source_anchor: "out".into(),
                    target_instance_id: "b".into(),
                    target_anchor: "in".into(),
                },
                Edge {
                    edge_id: "e2".into(),
                    source_instance_id: "b".into(),
                    source_anchor: "out".into(),
                    target_instance_id: "a".into(),
                    target_anchor: "in".into(),
                },
            ],
            viewport: Viewport::default(),
        };
        let err = validate_graph(&graph, |_, _| Some(d.clone())).unwrap_err();
        assert!(matches!(err, FlowforgeError::StructuralIncompatibility { .. }));
    }

    #[test]
    fn rejects_unsatisfied_required_input() {
        let d = descriptor("n", true, false);
        let graph = FlowGraph {
            nodes: vec![node("a", "n", BTreeMap::new())],
            edges: vec![],
            viewport: Viewport::default(),
        };
        let err = validate_graph(&graph, |_, _| Some(d.clone())).unwrap_err();
        assert!(matches!(err, FlowforgeError::StructuralIncompatibility { .. }));
    }

    #[test]
    fn accepts_well_formed_single_node_graph() {
        let d = descriptor("n", false, false);
        let graph = FlowGraph {
            nodes: vec![node("a", "n", BTreeMap::new())],
            edges: vec![],
            viewport: Viewport::default(),
        };
        assert!(validate_graph(&graph, |_, _| Some(d.clone())).is_ok());
    }
}
