//! `FlowTemplate` storage (spec §3): curated out-of-band, loaded once, never
//! mutated by the engine. `resolve_template` is internal to C4 — it is not
//! one of the MCP-exposed operations in spec §6.1.

use std::collections::HashMap;
use std::path::Path;

use flowforge_core::{FlowTemplate, FlowforgeError, Result};
use parking_lot::RwLock;

#[derive(Default)]
pub struct TemplateLibrary {
    templates: RwLock<HashMap<String, FlowTemplate>>,
}

impl TemplateLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, template: FlowTemplate) {
        self.templates.write().insert(template.template_id.clone(), template);
    }

    /// Loads every `*.json` file in `dir` as a `FlowTemplate`. Curation
    /// happens out-of-band; this just reads what's on disk once at startup.
    pub fn load_from_dir(&self, dir: &Path) -> anyhow::Result<usize> {
        if !dir.exists() {
            return Ok(0);
        }
        let mut loaded = 0;
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = std::fs::read(&path)?;
            let template: FlowTemplate = serde_json::from_slice(&bytes)?;
            self.register(template);
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Internal to C4; the `flow_data` is never returned by search (spec §3).
    pub fn resolve_template(&self, template_id: &str) -> Result<FlowTemplate> {
        self.templates
            .read()
            .get(template_id)
            .cloned()
            .ok_or_else(|| FlowforgeError::validation(format!("unknown template {template_id}")))
    }

    pub fn iter(&self) -> Vec<FlowTemplate> {
        self.templates.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.templates.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
