//! Wire serialization to the Flowise `flowData` shape (spec §4.4.5).

use std::collections::HashMap;

use flowforge_core::{FlowGraph, InputValue, NodeDescriptor};
use serde_json::{json, Value};

fn render_input_value(value: &InputValue) -> Value {
    match value {
        InputValue::Literal(v) => v.clone(),
        // Source pattern requiring re-architecture (spec §9): only here,
        // at the wire boundary, does a structural reference become the
        // runtime string interpolation the original system used directly.
        InputValue::NodeRef {
            instance_id,
            output_anchor,
        } => Value::String(format!("{{{{{instance_id}.data.{output_anchor}}}}}")),
        InputValue::NodeRefList(targets) => Value::Array(
            targets
                .iter()
                .map(|t| Value::String(format!("{{{{{}.data.{}}}}}", t.instance_id, t.output_anchor)))
                .collect(),
        ),
    }
}

fn source_handle(instance_id: &str, anchor_name: &str, type_chain: &[String]) -> String {
    format!("{instance_id}-output-{anchor_name}-{}", type_chain.join("|"))
}

fn target_handle(instance_id: &str, anchor_name: &str, required_type: &str) -> String {
    format!("{instance_id}-input-{anchor_name}-{required_type}")
}

/// Serializes `graph` to the Flowise wire shape. `descriptor_of` resolves
/// each instance's descriptor so anchor metadata can be emitted in `data`.
pub fn serialize_flow(
    graph: &FlowGraph,
    descriptor_of: impl Fn(&str, u32) -> Option<NodeDescriptor>,
) -> Value {
    let descriptors: HashMap<String, NodeDescriptor> = graph
        .nodes
        .iter()
        .filter_map(|n| descriptor_of(&n.descriptor_name, n.descriptor_version).map(|d| (n.id.clone(), d)))
        .collect();

    let nodes: Vec<Value> = graph
        .nodes
        .iter()
        .map(|node| {
            let descriptor = descriptors.get(&node.id);
            let inputs: serde_json::Map<String, Value> = node
                .inputs
                .iter()
                .map(|(k, v)| (k.clone(), render_input_value(v)))
                .collect();
            json!({
                "id": node.id,
                "type": "customNode",
                "position": { "x": node.position.x, "y": node.position.y },
                "positionAbsolute": { "x": node.position.x, "y": node.position.y },
                "width": node.width,
                "height": node.height,
                "data": {
                    "id": node.id,
                    "name": node.descriptor_name,
                    "version": node.descriptor_version,
                    "label": descriptor.map(|d| d.label.clone()).unwrap_or_default(),
                    "category": descriptor.map(|d| d.category.clone()).unwrap_or_default(),
                    "inputAnchors": descriptor.map(|d| &d.input_anchors).into_iter().flatten().map(|a| json!({
                        "name": a.name,
                        "type": a.required_type,
                        "optional": a.optional,
                        "list": a.list,
                    })).collect::<Vec<_>>(),
                    "outputAnchors": descriptor.map(|d| &d.output_anchors).into_iter().flatten().map(|a| json!({
                        "name": a.name,
                        "type": a.type_chain.join("|"),
                    })).collect::<Vec<_>>(),
                    "inputs": inputs,
                },
            })
        })
        .collect();

    let edges: Vec<Value> = graph
        .edges
        .iter()
        .map(|edge| {
            let source_descriptor = descriptors.get(&edge.source_instance_id);
            let target_descriptor = descriptors.get(&edge.target_instance_id);
            let type_chain = source_descriptor
                .and_then(|d| d.output_for(&edge.source_anchor))
                .map(|a| a.type_chain.clone())
                .unwrap_or_default();
            let required_type = target_descriptor
                .and_then(|d| d.input_for(&edge.target_anchor))
                .map(|a| a.required_type.clone())
                .unwrap_or_default();
            json!({
                "id": edge.edge_id,
                "source": edge.source_instance_id,
                "target": edge.target_instance_id,
                "sourceHandle": source_handle(&edge.source_instance_id, &edge.source_anchor, &type_chain),
                "targetHandle": target_handle(&edge.target_instance_id, &edge.target_anchor, &required_type),
                "type": "buttonedge",
            })
        })
        .collect();

    json!({
        "nodes": nodes,
        "edges": edges,
        "viewport": {
            "x": graph.viewport.x,
            "y": graph.viewport.y,
            "zoom": graph.viewport.zoom,
        },
    })
}
