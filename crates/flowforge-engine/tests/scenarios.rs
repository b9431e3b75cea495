//! Cross-component scenario tests tying C1 (circuit), C2 (catalog), and C4
//! (this crate's engine) together the way a real `build_flow` call chains
//! them, rather than exercising each crate's contract in isolation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use flowforge_catalog::{CatalogCache, CatalogStore};
use flowforge_circuit::DependencyGates;
use flowforge_core::{
    config::LayoutConfig, CreatedChatflow, DependencyId, FlowforgeError, FlowiseGateway,
    InputAnchor, NodeDescriptor, OutputAnchor, Result, SystemClock,
};
use flowforge_engine::{build_flow, BuildSpec, CompositionNode};
use flowforge_vector::TemplateLibrary;
use serde_json::Value;

struct FakeGateway {
    nodes: Mutex<Vec<NodeDescriptor>>,
    created: Mutex<Vec<(String, Value)>>,
    fail: bool,
}

impl FakeGateway {
    fn with_nodes(nodes: Vec<NodeDescriptor>) -> Self {
        Self {
            nodes: Mutex::new(nodes),
            created: Mutex::new(vec![]),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            nodes: Mutex::new(vec![]),
            created: Mutex::new(vec![]),
            fail: true,
        }
    }
}

#[async_trait]
impl FlowiseGateway for FakeGateway {
    async fn list_nodes(&self) -> Result<Vec<NodeDescriptor>> {
        Ok(self.nodes.lock().unwrap().clone())
    }
    async fn create_chatflow(&self, name: &str, flow_data: Value, _deployed: bool) -> Result<CreatedChatflow> {
        if self.fail {
            return Err(FlowforgeError::transport(DependencyId::Gateway, "boom"));
        }
        self.created.lock().unwrap().push((name.to_string(), flow_data));
        Ok(CreatedChatflow {
            id: format!("cf_{}", self.created.lock().unwrap().len()),
            name: name.into(),
        })
    }
    async fn get_chatflow(&self, _id: &str) -> Result<Value> {
        Ok(Value::Null)
    }
    async fn update_chatflow(&self, _id: &str, _flow_data: Value) -> Result<()> {
        Ok(())
    }
    async fn delete_chatflow(&self, _id: &str) -> Result<()> {
        Ok(())
    }
    async fn run_prediction(&self, _id: &str, _input: Value) -> Result<Value> {
        Ok(Value::Null)
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
        description: "wraps openai chat completion model".into(),
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
            InputAnchor { name: "model".into(), required_type: "BaseChatModel".into(), optional: false, list: false },
            InputAnchor { name: "prompt".into(), required_type: "BasePromptTemplate".into(), optional: false, list: false },
        ],
        output_anchors: vec![],
        description: String::new(),
        deprecated: false,
        credential_types: None,
    }
}

fn tool(name: &str) -> NodeDescriptor {
    NodeDescriptor {
        name: name.into(),
        version: 1,
        label: name.into(),
        category: "Tools".into(),
        base_classes: vec![name.into(), "Tool".into()],
        input_anchors: vec![],
        output_anchors: vec![OutputAnchor { name: "output".into(), type_chain: vec![name.into(), "Tool".into()] }],
        description: String::new(),
        deprecated: false,
        credential_types: None,
    }
}

fn conversational_agent() -> NodeDescriptor {
    NodeDescriptor {
        name: "conversationalAgent".into(),
        version: 1,
        label: "ConversationalAgent".into(),
        category: "Agents".into(),
        base_classes: vec!["conversationalAgent".into(), "AgentExecutor".into()],
        input_anchors: vec![InputAnchor { name: "tools".into(), required_type: "Tool".into(), optional: false, list: true }],
        output_anchors: vec![],
        description: String::new(),
        deprecated: false,
        credential_types: None,
    }
}

fn gates() -> DependencyGates {
    DependencyGates::new(3, Duration::from_secs(300), Arc::new(SystemClock), None)
}

/// §8 scenario: linear chat build — a bare model + prompt + chain composes
/// into exactly two edges and a single gateway submission.
#[tokio::test]
async fn linear_chat_build_submits_once_with_two_edges() {
    let gateway = FakeGateway::with_nodes(vec![chat_model(), prompt_template(), llm_chain()]);
    let tmp = tempfile::tempdir().unwrap();
    let cache = CatalogCache::new(CatalogStore::new(tmp.path()), Duration::from_secs(0), Arc::new(SystemClock)).unwrap();
    let gates = gates();
    cache.refresh_now(&gates, &gateway).await.unwrap();

    let spec = BuildSpec::Composition {
        node_list: vec![
            CompositionNode { descriptor_name: "chatOpenAI".into(), version: None },
            CompositionNode { descriptor_name: "promptTemplate".into(), version: None },
            CompositionNode { descriptor_name: "llmChain".into(), version: None },
        ],
        literal_inputs: HashMap::new(),
        deployed: false,
    };
    let templates = TemplateLibrary::new();
    let layout = LayoutConfig::default();
    let result = build_flow(spec, &gates, &gateway, &cache.current(), &templates, &layout).await.unwrap();

    assert_eq!(result.id, "cf_1");
    let created = gateway.created.lock().unwrap();
    assert_eq!(created.len(), 1);
    let (_, wire) = &created[0];
    assert_eq!(wire["edges"].as_array().unwrap().len(), 2);
}

/// §8 scenario: agent-with-tools composition — two tools both wire into the
/// agent's `list = true` anchor without either being consumed.
#[tokio::test]
async fn agent_with_tools_composition_connects_every_tool() {
    let gateway = FakeGateway::with_nodes(vec![tool("calculator"), tool("serpAPI"), conversational_agent()]);
    let tmp = tempfile::tempdir().unwrap();
    let cache = CatalogCache::new(CatalogStore::new(tmp.path()), Duration::from_secs(0), Arc::new(SystemClock)).unwrap();
    let gates = gates();
    cache.refresh_now(&gates, &gateway).await.unwrap();

    let spec = BuildSpec::Composition {
        node_list: vec![
            CompositionNode { descriptor_name: "calculator".into(), version: None },
            CompositionNode { descriptor_name: "serpAPI".into(), version: None },
            CompositionNode { descriptor_name: "conversationalAgent".into(), version: None },
        ],
        literal_inputs: HashMap::new(),
        deployed: false,
    };
    let templates = TemplateLibrary::new();
    let layout = LayoutConfig::default();
    let result = build_flow(spec, &gates, &gateway, &cache.current(), &templates, &layout).await.unwrap();
    assert_eq!(result.id, "cf_1");

    let created = gateway.created.lock().unwrap();
    let (_, wire) = &created[0];
    let agent_node = wire["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|n| n["data"]["name"] == "conversationalAgent")
        .unwrap();
    let tools = agent_node["data"]["inputs"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 2);
}

/// §8 scenario: template reuse — resolving the same template twice produces
/// two independently-id'd chatflows, never colliding instance ids.
#[tokio::test]
async fn template_reuse_produces_independent_instance_ids_each_time() {
    let gateway = FakeGateway::with_nodes(vec![chat_model(), prompt_template(), llm_chain()]);
    let tmp = tempfile::tempdir().unwrap();
    let cache = CatalogCache::new(CatalogStore::new(tmp.path()), Duration::from_secs(0), Arc::new(SystemClock)).unwrap();
    let gates = gates();
    cache.refresh_now(&gates, &gateway).await.unwrap();

    let templates = TemplateLibrary::new();
    templates.register(flowforge_core::FlowTemplate {
        template_id: "tmpl_chat".into(),
        name: "Simple chat".into(),
        description: "model + prompt + chain".into(),
        required_node_names: vec!["chatOpenAI".into(), "promptTemplate".into(), "llmChain".into()],
        parameter_schema: vec![],
        flow_data: flowforge_core::FlowGraph {
            nodes: vec![
                flowforge_core::NodeInstance {
                    id: "tpl_model".into(),
                    descriptor_name: "chatOpenAI".into(),
                    descriptor_version: 1,
                    inputs: Default::default(),
                    position: flowforge_core::Position { x: 0.0, y: 0.0 },
                    width: 300.0,
                    height: 200.0,
                },
                flowforge_core::NodeInstance {
                    id: "tpl_prompt".into(),
                    descriptor_name: "promptTemplate".into(),
                    descriptor_version: 1,
                    inputs: Default::default(),
                    position: flowforge_core::Position { x: 0.0, y: 0.0 },
                    width: 300.0,
                    height: 200.0,
                },
            ],
            edges: vec![],
            viewport: Default::default(),
        },
    });
    let layout = LayoutConfig::default();

    for _ in 0..2 {
        let spec = BuildSpec::Template {
            template_id: "tmpl_chat".into(),
            parameter_overrides: HashMap::new(),
        };
        build_flow(spec, &gates, &gateway, &cache.current(), &templates, &layout).await.unwrap();
    }

    let created = gateway.created.lock().unwrap();
    assert_eq!(created.len(), 2);
    let ids_a: Vec<String> = created[0].1["nodes"].as_array().unwrap().iter().map(|n| n["id"].as_str().unwrap().to_string()).collect();
    let ids_b: Vec<String> = created[1].1["nodes"].as_array().unwrap().iter().map(|n| n["id"].as_str().unwrap().to_string()).collect();
    assert_eq!(ids_a, ids_b, "regeneration is deterministic per independent build, not accumulating across calls");
    assert!(ids_a.iter().all(|id| !id.starts_with("tpl_")));
}

/// §8 scenario: catalog refresh mid-session — a build against a stale
/// generation picks up a node added by a refresh that happens in between.
#[tokio::test]
async fn catalog_refresh_mid_session_makes_new_node_buildable() {
    let gateway = FakeGateway::with_nodes(vec![chat_model()]);
    let tmp = tempfile::tempdir().unwrap();
    let cache = CatalogCache::new(CatalogStore::new(tmp.path()), Duration::from_secs(0), Arc::new(SystemClock)).unwrap();
    let gates = gates();
    cache.refresh_now(&gates, &gateway).await.unwrap();

    let templates = TemplateLibrary::new();
    let layout = LayoutConfig::default();

    let spec = BuildSpec::Composition {
        node_list: vec![CompositionNode { descriptor_name: "promptTemplate".into(), version: None }],
        literal_inputs: HashMap::new(),
        deployed: false,
    };
    let err = build_flow(spec, &gates, &gateway, &cache.current(), &templates, &layout).await.unwrap_err();
    assert!(matches!(err, FlowforgeError::Validation { .. }));

    gateway.nodes.lock().unwrap().push(prompt_template());
    cache.refresh_now(&gates, &gateway).await.unwrap();

    let spec2 = BuildSpec::Composition {
        node_list: vec![CompositionNode { descriptor_name: "promptTemplate".into(), version: None }],
        literal_inputs: HashMap::new(),
        deployed: false,
    };
    let result = build_flow(spec2, &gates, &gateway, &cache.current(), &templates, &layout).await.unwrap();
    assert_eq!(result.id, "cf_1");
}

/// §8 scenario: circuit-open during build — after the gateway trips the
/// circuit, a subsequent build fails fast with `CircuitOpen` and never
/// re-invokes the gateway.
#[tokio::test]
async fn circuit_open_during_build_rejects_without_reaching_gateway() {
    let gateway = FakeGateway::failing();
    let tmp = tempfile::tempdir().unwrap();
    let cache = CatalogCache::new(CatalogStore::new(tmp.path()), Duration::from_secs(0), Arc::new(SystemClock)).unwrap();
    let gates = DependencyGates::new(1, Duration::from_secs(300), Arc::new(SystemClock), None);
    gateway.nodes.lock().unwrap().push(chat_model());
    cache.refresh_now(&gates, &gateway).await.unwrap();

    let templates = TemplateLibrary::new();
    let layout = LayoutConfig::default();

    let spec = BuildSpec::Composition {
        node_list: vec![CompositionNode { descriptor_name: "chatOpenAI".into(), version: None }],
        literal_inputs: HashMap::new(),
        deployed: false,
    };
    let _ = build_flow(spec, &gates, &gateway, &cache.current(), &templates, &layout).await;

    let spec2 = BuildSpec::Composition {
        node_list: vec![CompositionNode { descriptor_name: "chatOpenAI".into(), version: None }],
        literal_inputs: HashMap::new(),
        deployed: false,
    };
    let err = build_flow(spec2, &gates, &gateway, &cache.current(), &templates, &layout).await.unwrap_err();
    assert!(matches!(err, FlowforgeError::CircuitOpen { .. }));
    assert!(gateway.created.lock().unwrap().is_empty());
}
