//! Evidence Retrieval facade.
//!
//! Wires the collection registry, search coordinator, query expander,
//! knowledge store and entity resolver into `retrieve`,
//! `retrieve_comparative` and `find_related`, plus answer generation on top
//! of a [`TextGenerator`].
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use evidence_core::config::Settings;
use evidence_core::traits::{Embedder, NoopGenerator, TextGenerator, TokenStream, VectorSearch};
use evidence_core::types::{ComparativeOutcome, ComparativeResult, MergedEvidenceSet, RawHit, RetrievalQuery};
use evidence_core::{Error, Result};
use evidence_embed::QueryEmbedder;
use evidence_knowledge::{
    is_comparative, known_entities, load_tables, CategoryStats, EntityResolver, KnowledgeAugmenter, KnowledgeStats,
    QueryExpander,
};
use evidence_vector::SearchCoordinator;
use futures::stream::{self, BoxStream, StreamExt};
use tracing::info;

pub mod comparative;
pub mod engine;
pub mod prompt;
pub mod rank;

pub use comparative::{plan_comparison, ComparisonPlan, ComparisonSide};
pub use engine::RetrievalEngine;
pub use prompt::{build_comparative_prompt, build_prompt, format_citation, SYSTEM_PROMPT};

/// Events of a streamed answer: the evidence first, then tokens, then the
/// full text once the generator is done.
#[derive(Debug, Clone)]
pub enum AnswerEvent {
    Evidence(Box<MergedEvidenceSet>),
    Token(String),
    Done(String),
}

pub type AnswerStream = BoxStream<'static, anyhow::Result<AnswerEvent>>;

pub struct EvidenceRetrieval {
    engine: RetrievalEngine,
    resolver: EntityResolver,
    generator: Arc<dyn TextGenerator>,
}

impl EvidenceRetrieval {
    pub fn new(engine: RetrievalEngine, resolver: EntityResolver) -> Self {
        Self { engine, resolver, generator: Arc::new(NoopGenerator) }
    }

    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = generator;
        self
    }

    /// Builds every component from settings. Static tables come from the
    /// configured paths, or the compiled-in tables when unset.
    pub fn from_settings(
        settings: &Settings,
        gateway: Arc<dyn VectorSearch>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        settings.validate()?;
        let registry = Arc::new(settings.registry()?);

        let (table, store) = load_tables(&settings.knowledge)?;
        let expander = Arc::new(QueryExpander::new(table).with_known_entities(known_entities(&store, &settings.knowledge)));
        let coordinator = SearchCoordinator::from_settings(gateway, &settings.retrieval);
        let embedder = QueryEmbedder::with_instruction(embedder, settings.embedding.query_instruction.clone());
        let engine = RetrievalEngine::new(
            registry,
            coordinator,
            embedder,
            expander,
            KnowledgeAugmenter::new(Arc::clone(&store)),
            settings.retrieval.clone(),
        );
        info!(
            collections = engine.registry().len(),
            expansion_categories = engine.expander().table().categories().len(),
            "evidence retrieval ready"
        );
        Ok(Self::new(engine, EntityResolver::new(store)?))
    }

    pub fn engine(&self) -> &RetrievalEngine {
        &self.engine
    }

    pub fn resolver(&self) -> &EntityResolver {
        &self.resolver
    }

    pub async fn retrieve(&self, query: &RetrievalQuery) -> Result<MergedEvidenceSet> {
        self.engine.retrieve(query).await
    }

    /// Two independent retrievals, one per compared entity. Questions that do
    /// not parse into two entities get a standard retrieval instead.
    pub async fn retrieve_comparative(&self, query: &RetrievalQuery) -> Result<ComparativeOutcome> {
        let started = Instant::now();
        let Some(plan) = plan_comparison(&self.resolver, query) else {
            info!(question = %query.question, "comparison not parsed, using standard retrieval");
            return Ok(ComparativeOutcome::Standard(self.engine.retrieve(query).await?));
        };
        let (evidence_a, evidence_b) =
            tokio::try_join!(self.engine.retrieve(&plan.a.query), self.engine.retrieve(&plan.b.query))?;
        let comparison_context = plan.context(&self.resolver);
        let total_search_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        info!(
            a = %plan.a.canonical,
            b = %plan.b.canonical,
            hits_a = evidence_a.hit_count(),
            hits_b = evidence_b.hit_count(),
            elapsed_ms = total_search_time_ms,
            "comparative retrieval complete"
        );
        Ok(ComparativeOutcome::Comparative(Box::new(ComparativeResult {
            query: query.question.clone(),
            entity_a: plan.a.canonical,
            entity_b: plan.b.canonical,
            evidence_a,
            evidence_b,
            comparison_context,
            total_search_time_ms,
        })))
    }

    pub async fn find_related(&self, entity: &str, top_k: usize) -> Result<BTreeMap<String, Vec<RawHit>>> {
        self.engine.find_related(entity, top_k).await
    }

    pub fn expansion_stats(&self) -> Vec<CategoryStats> {
        self.engine.expander().table().stats()
    }

    pub fn knowledge_stats(&self) -> KnowledgeStats {
        self.engine.augmenter().store().stats()
    }

    /// The prompt that would be sent to the generator for `query`.
    pub async fn prompt_for(&self, query: &RetrievalQuery) -> Result<String> {
        if is_comparative(&query.question) {
            return Ok(match self.retrieve_comparative(query).await? {
                ComparativeOutcome::Comparative(result) => build_comparative_prompt(&query.question, &result),
                ComparativeOutcome::Standard(evidence) => build_prompt(&query.question, &evidence),
            });
        }
        let evidence = self.retrieve(query).await?;
        Ok(build_prompt(&query.question, &evidence))
    }

    pub async fn answer(&self, query: &RetrievalQuery) -> Result<String> {
        let prompt = self.prompt_for(query).await?;
        self.generator
            .generate(&prompt, SYSTEM_PROMPT)
            .await
            .map_err(|e| Error::Operation(format!("generation failed: {}", e)))
    }

    pub async fn answer_stream(&self, query: &RetrievalQuery) -> Result<AnswerStream> {
        let evidence = self.retrieve(query).await?;
        let prompt = build_prompt(&query.question, &evidence);
        let tokens = self
            .generator
            .generate_stream(&prompt, SYSTEM_PROMPT)
            .await
            .map_err(|e| Error::Operation(format!("generation failed: {}", e)))?;
        Ok(answer_events(evidence, tokens))
    }
}

enum StreamPhase {
    Evidence(Box<MergedEvidenceSet>, TokenStream),
    Tokens(TokenStream, String),
    Finished,
}

fn answer_events(evidence: MergedEvidenceSet, tokens: TokenStream) -> AnswerStream {
    stream::unfold(StreamPhase::Evidence(Box::new(evidence), tokens), |phase| async move {
        match phase {
            StreamPhase::Evidence(evidence, tokens) => {
                Some((Ok(AnswerEvent::Evidence(evidence)), StreamPhase::Tokens(tokens, String::new())))
            }
            StreamPhase::Tokens(mut tokens, mut full) => match tokens.next().await {
                Some(Ok(token)) => {
                    full.push_str(&token);
                    Some((Ok(AnswerEvent::Token(token)), StreamPhase::Tokens(tokens, full)))
                }
                Some(Err(e)) => Some((Err(e), StreamPhase::Finished)),
                None => Some((Ok(AnswerEvent::Done(full)), StreamPhase::Finished)),
            },
            StreamPhase::Finished => None,
        }
    })
    .boxed()
}
