//! Canonical textual renderings that embeddings are computed from
//! (spec §4.3 "Indexing policy"). The rendering is the basis of idempotence:
//! re-embedding an unchanged payload yields the same text, hence the same
//! content hash, hence no re-embedding call.

use flowforge_core::{FlowTemplate, NodeDescriptor};
use sha2::{Digest, Sha256};

pub fn render_node(descriptor: &NodeDescriptor) -> String {
    let mut parts = vec![
        descriptor.label.clone(),
        descriptor.category.clone(),
        descriptor.description.clone(),
    ];
    for base_class in &descriptor.base_classes {
        parts.push(format!("is-a:{base_class}"));
    }
    parts.join(" | ")
}

pub fn render_template(template: &FlowTemplate) -> String {
    let mut parts = vec![template.name.clone(), template.description.clone()];
    for node in &template.required_node_names {
        parts.push(format!("uses:{node}"));
    }
    parts.join(" | ")
}

pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> NodeDescriptor {
        NodeDescriptor {
            name: "chatOpenAI".into(),
            version: 1,
            label: "ChatOpenAI".into(),
            category: "Chat Models".into(),
            base_classes: vec!["ChatOpenAI".into(), "BaseChatModel".into()],
            input_anchors: vec![],
            output_anchors: vec![],
            description: "OpenAI chat wrapper".into(),
            deprecated: false,
            credential_types: None,
        }
    }

    #[test]
    fn rendering_is_deterministic() {
        let d = descriptor();
        assert_eq!(render_node(&d), render_node(&d));
        assert_eq!(content_hash(&render_node(&d)), content_hash(&render_node(&d)));
    }

    #[test]
    fn rendering_changes_with_payload() {
        let mut d = descriptor();
        let before = content_hash(&render_node(&d));
        d.description = "changed".into();
        let after = content_hash(&render_node(&d));
        assert_ne!(before, after);
    }
}
