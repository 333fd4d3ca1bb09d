use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::filter::FilterExpr;
use crate::types::RawHit;

/// Embedding capability. Implementations embed text verbatim; the query
/// instruction prefix is applied by the caller.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Similarity search over one named collection.
///
/// Hits come back ordered by descending score, at most `top_k` of them,
/// restricted by `filter` when one is given.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&FilterExpr>,
    ) -> anyhow::Result<Vec<RawHit>>;
}

pub type TokenStream = BoxStream<'static, anyhow::Result<String>>;

/// Text generation capability consumed by callers of the retrieval core.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, system_prompt: &str) -> anyhow::Result<String>;
    async fn generate_stream(&self, prompt: &str, system_prompt: &str) -> anyhow::Result<TokenStream>;
}

/// Generator used when no generation service is configured: produces no text.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopGenerator;

#[async_trait]
impl TextGenerator for NoopGenerator {
    async fn generate(&self, _prompt: &str, _system_prompt: &str) -> anyhow::Result<String> {
        Ok(String::new())
    }

    async fn generate_stream(&self, _prompt: &str, _system_prompt: &str) -> anyhow::Result<TokenStream> {
        Ok(Box::pin(futures::stream::empty()))
    }
}
