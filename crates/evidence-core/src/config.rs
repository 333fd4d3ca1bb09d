//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge the built-in defaults + `config.toml` +
//! `config.<env>.toml` + `APP_*` env vars. Provides helpers to expand `~` and
//! `${VAR}` and to resolve relative paths against a known base directory.
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::registry::{CollectionDescriptor, CollectionRegistry};
use crate::types::TierThresholds;

pub const DEFAULT_CONFIG: &str = include_str!("../config.default.toml");

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new()
            .merge(Toml::string(DEFAULT_CONFIG))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?.validate()?;
        Ok(config)
    }

    /// Defaults only, no files or environment. Used by tests and embedders.
    pub fn defaults() -> Self {
        Self { figment: Figment::new().merge(Toml::string(DEFAULT_CONFIG)) }
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{}': {}", key, e)))
    }

    pub fn settings(&self) -> Result<Settings> {
        Ok(self.figment.extract::<Settings>()?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub knowledge: KnowledgeSettings,
    pub collections: Vec<CollectionDescriptor>,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.retrieval.validate()?;
        // Building the registry performs the per-collection checks.
        CollectionRegistry::new(self.collections.clone()).map(|_| ())
    }

    pub fn registry(&self) -> Result<CollectionRegistry> {
        CollectionRegistry::new(self.collections.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k_per_collection: usize,
    /// Hits below this raw similarity are dropped at the gateway boundary.
    pub score_threshold: f32,
    pub max_results: usize,
    pub max_expansion_terms: usize,
    pub entity_discount: f32,
    pub semantic_discount: f32,
    pub entity_expansion_top_k: usize,
    pub semantic_expansion_top_k: usize,
    pub tiers: TierThresholds,
    pub per_collection_timeout_ms: u64,
    pub overall_deadline_ms: u64,
    /// Metadata field used for entity-equality filters.
    pub entity_field: String,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k_per_collection: 5,
            score_threshold: 0.4,
            max_results: 30,
            max_expansion_terms: 5,
            entity_discount: 0.8,
            semantic_discount: 0.7,
            entity_expansion_top_k: 3,
            semantic_expansion_top_k: 2,
            tiers: TierThresholds::default(),
            per_collection_timeout_ms: 5_000,
            overall_deadline_ms: 15_000,
            entity_field: "target_antigen".to_string(),
        }
    }
}

impl RetrievalSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_results == 0 {
            return Err(Error::InvalidConfig("retrieval.max_results must be > 0".into()));
        }
        if self.tiers.medium > self.tiers.high {
            return Err(Error::InvalidConfig(format!(
                "retrieval.tiers.medium ({}) exceeds retrieval.tiers.high ({})",
                self.tiers.medium, self.tiers.high
            )));
        }
        for (name, d) in [("entity_discount", self.entity_discount), ("semantic_discount", self.semantic_discount)] {
            if !(d > 0.0 && d <= 1.0) {
                return Err(Error::InvalidConfig(format!("retrieval.{} must be in (0, 1], got {}", name, d)));
            }
        }
        if self.entity_field.trim().is_empty() {
            return Err(Error::InvalidConfig("retrieval.entity_field is empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub query_instruction: String,
    pub dimension: usize,
    pub model_dir: String,
    pub use_fake: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            query_instruction: "Represent this sentence for searching relevant passages: ".to_string(),
            dimension: 384,
            model_dir: "models/bge-small-en-v1.5".to_string(),
            use_fake: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreSettings {
    pub uri: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self { uri: "data/lancedb".to_string() }
    }
}

/// Where the static lookup tables come from. Unset paths mean the tables
/// compiled into the binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KnowledgeSettings {
    pub expansion_table: Option<String>,
    pub knowledge_table: Option<String>,
    /// Extra names treated as entity-filter values during query expansion.
    pub extra_entities: Vec<String>,
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
