//! Left-to-right canvas layout (spec §4.4.4). Longest-path depth assignment
//! via an iterative topological pass — no recursion (spec §9), since depth
//! would otherwise be bounded by user-controlled graph size.

use std::collections::{HashMap, HashSet, VecDeque};

use flowforge_core::config::LayoutConfig;
use flowforge_core::{FlowGraph, Position};

const COLUMN_LEFT: f64 = 100.0;
const COLUMN_TOP: f64 = 100.0;
const NODE_WIDTH: f64 = 300.0;

/// Per-category height lookup table (spec §4.4.4: suggested defaults, not
/// contracts — spec §9 open question).
fn height_for_category(category: &str) -> f64 {
    match category {
        "Chat Models" | "LLMs" => 670.0,
        "Prompts" => 513.0,
        "Tools" | "Agents" => 560.0,
        "Memory" => 400.0,
        "Sticky Note" => 163.0,
        _ => 300.0,
    }
}

fn topo_order(graph: &FlowGraph) -> Vec<String> {
    let mut in_degree: HashMap<&str, usize> = graph.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &graph.edges {
        *in_degree.entry(edge.target_instance_id.as_str()).or_insert(0) += 1;
        adjacency
            .entry(edge.source_instance_id.as_str())
            .or_default()
            .push(edge.target_instance_id.as_str());
    }

    let original_index: HashMap<&str, usize> =
        graph.nodes.iter().enumerate().map(|(i, n)| (n.id.as_str(), i)).collect();

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(id, _)| *id)
        .collect();
    queue.make_contiguous().sort_by_key(|id| original_index[id]);

    let mut order = Vec::with_capacity(graph.nodes.len());
    while let Some(node) = queue.pop_front() {
        order.push(node.to_string());
        if let Some(children) = adjacency.get(node) {
            let mut ready = Vec::new();
            for child in children {
                let deg = in_degree.get_mut(child).expect("child tracked");
                *deg -= 1;
                if *deg == 0 {
                    ready.push(*child);
                }
            }
            ready.sort_by_key(|id| original_index[id]);
            for r in ready {
                queue.push_back(r);
            }
        }
    }
    order
}

fn compute_depths(graph: &FlowGraph) -> HashMap<String, usize> {
    let mut depth: HashMap<String, usize> = graph.nodes.iter().map(|n| (n.id.clone(), 0)).collect();
    let order = topo_order(graph);
    let mut by_source: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &graph.edges {
        by_source
            .entry(edge.source_instance_id.as_str())
            .or_default()
            .push(edge.target_instance_id.as_str());
    }
    for node_id in &order {
        let current = depth[node_id];
        if let Some(children) = by_source.get(node_id.as_str()) {
            for child in children {
                let entry = depth.entry(child.to_string()).or_insert(0);
                *entry = (*entry).max(current + 1);
            }
        }
    }
    depth
}

/// Assigns `position`/dimensions on every node in place.
pub fn layout_graph(graph: &mut FlowGraph, layout: &LayoutConfig) {
    let connected: HashSet<String> = graph
        .edges
        .iter()
        .flat_map(|e| [e.source_instance_id.clone(), e.target_instance_id.clone()])
        .collect();
    let depths = compute_depths(graph);

    let original_index: HashMap<String, usize> =
        graph.nodes.iter().enumerate().map(|(i, n)| (n.id.clone(), i)).collect();

    let mut columns: HashMap<usize, Vec<String>> = HashMap::new();
    let mut disconnected: Vec<String> = Vec::new();
    for node in &graph.nodes {
        if connected.contains(&node.id) {
            columns.entry(depths[&node.id]).or_default().push(node.id.clone());
        } else {
            disconnected.push(node.id.clone());
        }
    }
    for nodes in columns.values_mut() {
        nodes.sort_by_key(|id| original_index[id]);
    }
    disconnected.sort_by_key(|id| original_index[id]);

    let max_row = columns
        .values()
        .map(|nodes| nodes.len())
        .max()
        .unwrap_or(0);

    let mut positions: HashMap<String, Position> = HashMap::new();
    for (&depth, nodes) in &columns {
        for (row_index, id) in nodes.iter().enumerate() {
            positions.insert(
                id.clone(),
                Position {
                    x: COLUMN_LEFT + depth as f64 * layout.column_spacing,
                    y: COLUMN_TOP + row_index as f64 * layout.row_spacing,
                },
            );
        }
    }
    for (offset, id) in disconnected.iter().enumerate() {
        positions.insert(
            id.clone(),
            Position {
                x: COLUMN_LEFT,
                y: COLUMN_TOP + (max_row + offset) as f64 * layout.row_spacing,
            },
        );
    }

    for node in &mut graph.nodes {
        if let Some(pos) = positions.get(&node.id) {
            node.position = *pos;
        }
        node.width = NODE_WIDTH;
    }
}

pub fn height_for(category: &str) -> f64 {
    height_for_category(category)
}
