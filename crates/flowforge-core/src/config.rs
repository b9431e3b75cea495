//! Exhaustive configuration surface (spec §6.4), loaded the way the teacher
//! loads `ServerConfig`: defaults, then an optional file, then environment
//! overrides, through the `config` crate.

use anyhow::{Context, Result};
use schemars::JsonSchema;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GatewayConfig {
    pub base_url: String,
    #[serde(default, skip_serializing)]
    #[schemars(skip)]
    pub api_key: Option<SecretString>,
    #[serde(default = "GatewayConfig::default_timeout_s")]
    pub timeout_s: u64,
}

impl GatewayConfig {
    fn default_timeout_s() -> u64 {
        60
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".into(),
            api_key: None,
            timeout_s: Self::default_timeout_s(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CatalogConfig {
    #[serde(default = "CatalogConfig::default_staleness_s")]
    pub staleness_s: u64,
    #[serde(default = "CatalogConfig::default_state_dir")]
    pub state_dir: String,
}

impl CatalogConfig {
    fn default_staleness_s() -> u64 {
        86_400
    }
    fn default_state_dir() -> String {
        "flowforge-state".into()
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            staleness_s: Self::default_staleness_s(),
            state_dir: Self::default_state_dir(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct CircuitConfig {
    #[serde(default = "CircuitConfig::default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "CircuitConfig::default_open_duration_s")]
    pub open_duration_s: u64,
}

impl CircuitConfig {
    fn default_failure_threshold() -> u32 {
        3
    }
    fn default_open_duration_s() -> u64 {
        300
    }
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: Self::default_failure_threshold(),
            open_duration_s: Self::default_open_duration_s(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct SearchConfig {
    #[serde(default = "SearchConfig::default_max_results")]
    pub default_max_results: usize,
    #[serde(default = "SearchConfig::default_min_similarity")]
    pub default_min_similarity: f32,
}

impl SearchConfig {
    fn default_max_results() -> usize {
        5
    }
    fn default_min_similarity() -> f32 {
        0.7
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_max_results: Self::default_max_results(),
            default_min_similarity: Self::default_min_similarity(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct LayoutConfig {
    #[serde(default = "LayoutConfig::default_column_spacing")]
    pub column_spacing: f64,
    #[serde(default = "LayoutConfig::default_row_spacing")]
    pub row_spacing: f64,
}

impl LayoutConfig {
    fn default_column_spacing() -> f64 {
        300.0
    }
    fn default_row_spacing() -> f64 {
        200.0
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            column_spacing: Self::default_column_spacing(),
            row_spacing: Self::default_row_spacing(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EmbedderConfig {
    #[serde(default = "EmbedderConfig::default_model_id")]
    pub model_id: String,
}

impl EmbedderConfig {
    fn default_model_id() -> String {
        "local-minilm-hash-v1".into()
    }
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            model_id: Self::default_model_id(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Configuration {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub circuit: CircuitConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub embedder: EmbedderConfig,
}

impl Configuration {
    /// Loads defaults, then `path` if it exists, then `FLOWFORGE_*`
    /// environment overrides (e.g. `FLOWFORGE_GATEWAY__BASE_URL`).
    pub fn load(path: Option<&str>) -> Result<Self> {
        let defaults = Configuration::default();
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&defaults).context("default config")?);

        if let Some(path) = path {
            if std::path::Path::new(path).exists() {
                builder = builder.add_source(config::File::with_name(path));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("FLOWFORGE")
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder.build().context("building configuration")?;
        cfg.try_deserialize().context("deserializing configuration")
    }
}
