//! Type-compatible chain inference for composition mode (spec §4.4.2).

use std::collections::{HashSet, VecDeque};

use flowforge_core::{Edge, FlowforgeError, InputValue, NodeDescriptor, NodeInstance, NodeRefTarget, Result};

struct AvailableOutput {
    instance_id: String,
    anchor_name: String,
    type_chain: Vec<String>,
    step: usize,
    consumed: bool,
}

fn find_producer(available: &[AvailableOutput], required_type: &str) -> Option<usize> {
    available
        .iter()
        .enumerate()
        .filter(|(_, o)| o.type_chain.iter().any(|t| t == required_type))
        // Most recently added wins (highest step); among same-step ties
        // prefer one not yet consumed by a non-list anchor (spec §4.4.2).
        .max_by_key(|(_, o)| (o.step, !o.consumed))
        .map(|(idx, _)| idx)
}

/// Whether `target` can already reach `source` through `edges` — adding
/// `source -> target` on top of that would close a cycle. Explicit
/// work-queue BFS, not recursion (spec §9).
pub fn would_create_cycle(edges: &[Edge], source: &str, target: &str) -> bool {
    let mut queue = VecDeque::from([target.to_string()]);
    let mut visited = HashSet::new();
    while let Some(node) = queue.pop_front() {
        if node == source {
            return true;
        }
        if !visited.insert(node.clone()) {
            continue;
        }
        for edge in edges {
            if edge.source_instance_id == node {
                queue.push_back(edge.target_instance_id.clone());
            }
        }
    }
    false
}

/// Infers edges for an already-ordered `(instance, descriptor)` sequence,
/// writing `NodeRef` entries into each instance's `inputs` map as it goes.
pub fn infer_edges(instances: &mut [NodeInstance], descriptors: &[NodeDescriptor]) -> Result<Vec<Edge>> {
    let mut available: Vec<AvailableOutput> = Vec::new();
    let mut edges: Vec<Edge> = Vec::new();
    let mut edge_counter: usize = 0;

    for (step, (instance, descriptor)) in instances.iter_mut().zip(descriptors.iter()).enumerate() {
        for anchor in &descriptor.input_anchors {
            if anchor.list {
                // list=true anchors accept zero or more incoming edges
                // (spec §3 `InputAnchor`); connect every available
                // compatible producer, not just the most recent one, so
                // e.g. an agent's `tools` anchor picks up every tool.
                let matches: Vec<usize> = available
                    .iter()
                    .enumerate()
                    .filter(|(_, o)| o.type_chain.iter().any(|t| t == &anchor.required_type))
                    .map(|(idx, _)| idx)
                    .collect();
                if matches.is_empty() {
                    if anchor.optional {
                        continue;
                    }
                    return Err(FlowforgeError::structural_at(
                        format!("no producer available for required input type {}", anchor.required_type),
                        instance.id.clone(),
                        anchor.name.clone(),
                    ));
                }
                let mut targets = Vec::with_capacity(matches.len());
                for idx in matches {
                    let (source_instance, source_anchor) = {
                        let producer = &available[idx];
                        (producer.instance_id.clone(), producer.anchor_name.clone())
                    };
                    if would_create_cycle(&edges, &source_instance, &instance.id) {
                        return Err(FlowforgeError::structural_at(
                            "would_create_cycle",
                            instance.id.clone(),
                            anchor.name.clone(),
                        ));
                    }
                    edge_counter += 1;
                    edges.push(Edge {
                        edge_id: format!("edge_{edge_counter}"),
                        source_instance_id: source_instance.clone(),
                        source_anchor: source_anchor.clone(),
                        target_instance_id: instance.id.clone(),
                        target_anchor: anchor.name.clone(),
                    });
                    targets.push(NodeRefTarget {
                        instance_id: source_instance,
                        output_anchor: source_anchor,
                    });
                    // list anchors do not consume (spec §4.4.2).
                }
                instance.inputs.insert(anchor.name.clone(), InputValue::NodeRefList(targets));
                continue;
            }

            let Some(idx) = find_producer(&available, &anchor.required_type) else {
                if anchor.optional {
                    continue; // opportunistic connection, skip silently on no match
                }
                return Err(FlowforgeError::structural_at(
                    format!("no producer available for required input type {}", anchor.required_type),
                    instance.id.clone(),
                    anchor.name.clone(),
                ));
            };

            let (source_instance, source_anchor) = {
                let producer = &available[idx];
                (producer.instance_id.clone(), producer.anchor_name.clone())
            };

            if would_create_cycle(&edges, &source_instance, &instance.id) {
                return Err(FlowforgeError::structural_at(
                    "would_create_cycle",
                    instance.id.clone(),
                    anchor.name.clone(),
                ));
            }

            edge_counter += 1;
            edges.push(Edge {
                edge_id: format!("edge_{edge_counter}"),
                source_instance_id: source_instance.clone(),
                source_anchor: source_anchor.clone(),
                target_instance_id: instance.id.clone(),
                target_anchor: anchor.name.clone(),
            });
            instance.inputs.insert(
                anchor.name.clone(),
                InputValue::NodeRef {
                    instance_id: source_instance,
                    output_anchor: source_anchor,
                },
            );
            available[idx].consumed = true;
        }

        for output in &descriptor.output_anchors {
            available.push(AvailableOutput {
                instance_id: instance.id.clone(),
                anchor_name: output.name.clone(),
                type_chain: output.type_chain.clone(),
                step,
                consumed: false,
            });
        }
    }

    Ok(edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowforge_core::{InputAnchor, OutputAnchor, Position};
    use std::collections::BTreeMap;

    fn instance(id: &str, descriptor_name: &str) -> NodeInstance {
        NodeInstance {
            id: id.into(),
            descriptor_name: descriptor_name.into(),
            descriptor_version: 1,
            inputs: BTreeMap::new(),
            position: Position { x: 0.0, y: 0.0 },
            width: 300.0,
            height: 200.0,
        }
    }

    fn chat_model() -> NodeDescriptor {
        NodeDescriptor {
            name: "chatOpenAI".into(),
            version: 1,
            label: "ChatOpenAI".into(),
            category: "Chat Models".into(),
            base_classes: vec!["chatOpenAI".into(), "BaseChatModel".into()],
            input_anchors: vec![],
            output_anchors: vec![OutputAnchor {
                name: "output".into(),
                type_chain: vec!["chatOpenAI".into(), "BaseChatModel".into()],
            }],
            description: String::new(),
            deprecated: false,
            credential_types: None,
        }
    }

    fn prompt_template() -> NodeDescriptor {
        NodeDescriptor {
            name: "promptTemplate".into(),
            version: 1,
            label: "PromptTemplate".into(),
            category: "Prompts".into(),
            base_classes: vec!["promptTemplate".into(), "BasePromptTemplate".into()],
            input_anchors: vec![],
            output_anchors: vec![OutputAnchor {
                name: "output".into(),
                type_chain: vec!["promptTemplate".into(), "BasePromptTemplate".into()],
            }],
            description: String::new(),
            deprecated: false,
            credential_types: None,
        }
    }

    fn llm_chain() -> NodeDescriptor {
        NodeDescriptor {
            name: "llmChain".into(),
            version: 1,
            label: "LLMChain".into(),
            category: "Chains".into(),
            base_classes: vec!["llmChain".into(), "BaseChain".into()],
            input_anchors: vec![
                InputAnchor {
                    name: "model".into(),
                    required_type: "BaseChatModel".into(),
                    optional: false,
                    list: false,
                },
                InputAnchor {
                    name: "prompt".into(),
                    required_type: "BasePromptTemplate".into(),
                    optional: false,
                    list: false,
                },
            ],
            output_anchors: vec![],
            description: String::new(),
            deprecated: false,
            credential_types: None,
        }
    }

    #[test]
    fn linear_chat_wires_model_and_prompt_into_chain() {
        let mut instances = vec![
            instance("chatOpenAI_0", "chatOpenAI"),
            instance("promptTemplate_0", "promptTemplate"),
            instance("llmChain_0", "llmChain"),
        ];
        let descriptors = vec![chat_model(), prompt_template(), llm_chain()];
        let edges = infer_edges(&mut instances, &descriptors).unwrap();
        assert_eq!(edges.len(), 2);
        assert!(instances[2].inputs.contains_key("model"));
        assert!(instances[2].inputs.contains_key("prompt"));
    }

    #[test]
    fn missing_required_producer_fails_structurally() {
        let mut instances = vec![instance("llmChain_0", "llmChain")];
        let descriptors = vec![llm_chain()];
        let err = infer_edges(&mut instances, &descriptors).unwrap_err();
        assert!(matches!(err, FlowforgeError::StructuralIncompatibility { .. }));
    }

    #[test]
    fn list_anchor_accepts_multiple_producers_without_consuming() {
        let tool = |name: &str| NodeDescriptor {
            name: name.into(),
            version: 1,
            label: name.into(),
            category: "Tools".into(),
            base_classes: vec![name.into(), "Tool".into()],
            input_anchors: vec![],
            output_anchors: vec![OutputAnchor {
                name: "output".into(),
                type_chain: vec![name.into(), "Tool".into()],
            }],
            description: String::new(),
            deprecated: false,
            credential_types: None,
        };
        let agent = NodeDescriptor {
            name: "conversationalAgent".into(),
            version: 1,
            label: "ConversationalAgent".into(),
            category: "Agents".into(),
            base_classes: vec!["conversationalAgent".into(), "AgentExecutor".into()],
            input_anchors: vec![InputAnchor {
                name: "tools".into(),
                required_type: "Tool".into(),
                optional: false,
                list: true,
            }],
            output_anchors: vec![],
            description: String::new(),
            deprecated: false,
            credential_types: None,
        };

        let mut instances = vec![
            instance("calculator_0", "calculator"),
            instance("serpAPI_0", "serpAPI"),
            instance("conversationalAgent_0", "conversationalAgent"),
        ];
        let descriptors = vec![tool("calculator"), tool("serpAPI"), agent];
        let edges = infer_edges(&mut instances, &descriptors).unwrap();
        assert_eq!(edges.len(), 2, "both tools connect to the list anchor");
        assert!(matches!(
            instances[2].inputs.get("tools"),
            Some(InputValue::NodeRefList(targets)) if targets.len() == 2
        ));
    }
}
