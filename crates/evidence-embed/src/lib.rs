//! Embedding capability adapters.
//!
//! Questions are embedded through [`QueryEmbedder`], which applies the BGE
//! query instruction. Stored passages are embedded without it by the
//! ingestion side; the two conventions must not be mixed.
use anyhow::{Result, anyhow};
use std::sync::Arc;
use tracing::info;

use evidence_core::config::{expand_path, EmbeddingSettings};
use evidence_core::traits::Embedder;

pub mod device;
pub mod fake;
pub mod model;
pub mod pool;
pub mod tokenize;

pub use fake::FakeEmbedder;
pub use model::BgeEmbedder;
pub use pool::cls_l2;

pub const BGE_QUERY_INSTRUCTION: &str = "Represent this sentence for searching relevant passages: ";

/// Wraps an [`Embedder`] and embeds questions in query form.
#[derive(Clone)]
pub struct QueryEmbedder { inner: Arc<dyn Embedder>, instruction: String }

impl QueryEmbedder {
    pub fn new(inner: Arc<dyn Embedder>) -> Self { Self::with_instruction(inner, BGE_QUERY_INSTRUCTION) }

    pub fn with_instruction(inner: Arc<dyn Embedder>, instruction: impl Into<String>) -> Self {
        Self { inner, instruction: instruction.into() }
    }

    pub fn instruction(&self) -> &str { &self.instruction }

    pub fn dim(&self) -> usize { self.inner.dim() }

    /// The exact string sent to the model for a question.
    pub fn query_text(&self, text: &str) -> String { format!("{}{}", self.instruction, text) }

    pub fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.inner.embed_batch(&[self.query_text(text)])?;
        if out.is_empty() { return Err(anyhow!("embedder returned no vector")); }
        Ok(out.swap_remove(0))
    }

    /// [`embed_query`](Self::embed_query) on the blocking pool, so model
    /// inference does not stall the async workers.
    pub async fn embed_query_async(&self, text: &str) -> Result<Vec<f32>> {
        let this = self.clone();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || this.embed_query(&text))
            .await
            .map_err(|e| anyhow!("embedding task failed: {}", e))?
    }
}

pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    let env_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
    if settings.use_fake || env_fake {
        info!(dim = settings.dimension, "using FakeEmbedder");
        return Ok(Arc::new(FakeEmbedder::new(settings.dimension)));
    }
    let dir = model::resolve_model_dir(&expand_path(&settings.model_dir))?;
    Ok(Arc::new(BgeEmbedder::new(&dir)?))
}
