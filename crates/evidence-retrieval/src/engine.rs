//! Merge & Rank Engine: one full retrieval pass for a question.
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use evidence_core::config::RetrievalSettings;
use evidence_core::filter::FilterExpr;
use evidence_core::registry::{CollectionDescriptor, CollectionRegistry};
use evidence_core::types::{MergedEvidenceSet, RawHit, RetrievalQuery, SourceKind};
use evidence_core::{Error, Result};
use evidence_embed::QueryEmbedder;
use evidence_knowledge::{KnowledgeAugmenter, QueryExpander, TermKind};
use evidence_vector::{SearchCoordinator, SearchTarget};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::rank::{self, Pass};

/// A planned expansion search, built before any of them run.
struct ExpansionSearch {
    term: String,
    source: SourceKind,
    discount: f32,
    vector: Vec<f32>,
    targets: Vec<SearchTarget>,
    top_k: usize,
}

#[derive(Clone)]
pub struct RetrievalEngine {
    registry: Arc<CollectionRegistry>,
    coordinator: SearchCoordinator,
    embedder: QueryEmbedder,
    expander: Arc<QueryExpander>,
    augmenter: KnowledgeAugmenter,
    settings: RetrievalSettings,
}

impl RetrievalEngine {
    pub fn new(
        registry: Arc<CollectionRegistry>,
        coordinator: SearchCoordinator,
        embedder: QueryEmbedder,
        expander: Arc<QueryExpander>,
        augmenter: KnowledgeAugmenter,
        settings: RetrievalSettings,
    ) -> Self {
        Self { registry, coordinator, embedder, expander, augmenter, settings }
    }

    pub fn registry(&self) -> &CollectionRegistry {
        &self.registry
    }

    pub fn expander(&self) -> &QueryExpander {
        &self.expander
    }

    pub fn augmenter(&self) -> &KnowledgeAugmenter {
        &self.augmenter
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder
            .embed_query_async(text)
            .await
            .map_err(|e| Error::RetrievalUnavailable(e.to_string()))
    }

    fn filter_for(&self, desc: &CollectionDescriptor, entity: Option<&str>, query: &RetrievalQuery) -> Option<FilterExpr> {
        FilterExpr::for_collection(desc, &self.settings.entity_field, entity, query.year_min, query.year_max)
    }

    /// Direct search, expansion searches, merge and knowledge context.
    ///
    /// Only an embedding failure of the question itself is an error. Failed
    /// collections and failed expansion terms just contribute nothing.
    pub async fn retrieve(&self, query: &RetrievalQuery) -> Result<MergedEvidenceSet> {
        let started = Instant::now();
        let top_k = query.top_k.unwrap_or(self.settings.top_k_per_collection);

        let (selected, unknown) = self.registry.select(query.collections.as_deref());
        if !unknown.is_empty() {
            warn!(?unknown, "ignoring unknown collections");
        }

        let vector = self.embed(&query.search_text()).await?;

        let entity = query.entity_filter.as_deref();
        let direct: Vec<SearchTarget> = selected
            .iter()
            .map(|d| SearchTarget::new(d.name.clone(), self.filter_for(d, entity, query)))
            .collect();
        let mut passes = vec![Pass::direct(self.coordinator.search_targets(&vector, &direct, top_k).await)];
        passes.extend(self.expansion_passes(query, &selected, &vector, top_k).await);

        let hits = rank::merge(&selected, passes, &self.settings.tiers, self.settings.max_results);
        let knowledge_context = self.augmenter.context_for(&query.question);
        let search_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        info!(
            hits = hits.len(),
            collections = selected.len(),
            knowledge = !knowledge_context.is_empty(),
            elapsed_ms = search_time_ms,
            "retrieval complete"
        );

        Ok(MergedEvidenceSet {
            query: query.question.clone(),
            hits,
            collections_searched: selected.iter().map(|d| d.name.clone()).collect(),
            knowledge_context,
            search_time_ms,
        })
    }

    async fn plan_expansion(
        &self,
        query: &RetrievalQuery,
        selected: &[&CollectionDescriptor],
        vector: &[f32],
        top_k: usize,
    ) -> Vec<ExpansionSearch> {
        let terms: Vec<String> = self
            .expander
            .expand(&query.question)
            .into_iter()
            .take(self.settings.max_expansion_terms)
            .collect();
        if terms.is_empty() {
            return Vec::new();
        }
        debug!(?terms, "query expanded");

        let mut plans = Vec::with_capacity(terms.len());
        for term in terms {
            match self.expander.classify(&term) {
                TermKind::Entity(value) => {
                    // An explicit entity filter from the caller wins over expansion.
                    if query.entity_filter.as_deref().is_some_and(|e| e != value) {
                        debug!(term = %term, "entity term conflicts with caller filter");
                        continue;
                    }
                    let targets: Vec<SearchTarget> = selected
                        .iter()
                        .filter(|d| d.entity_filter)
                        .map(|d| SearchTarget::new(d.name.clone(), self.filter_for(d, Some(value.as_str()), query)))
                        .collect();
                    if targets.is_empty() {
                        continue;
                    }
                    plans.push(ExpansionSearch {
                        term,
                        source: SourceKind::EntityExpansion,
                        discount: self.settings.entity_discount,
                        vector: vector.to_vec(),
                        targets,
                        top_k: self.settings.entity_expansion_top_k.min(top_k),
                    });
                }
                TermKind::Semantic => {
                    let term_vector = match self.embedder.embed_query_async(&term).await {
                        Ok(v) => v,
                        Err(e) => {
                            warn!(term = %term, error = %e, "skipping expansion term");
                            continue;
                        }
                    };
                    let entity = query.entity_filter.as_deref();
                    let targets = selected
                        .iter()
                        .map(|d| SearchTarget::new(d.name.clone(), self.filter_for(d, entity, query)))
                        .collect();
                    plans.push(ExpansionSearch {
                        term,
                        source: SourceKind::SemanticExpansion,
                        discount: self.settings.semantic_discount,
                        vector: term_vector,
                        targets,
                        top_k: self.settings.semantic_expansion_top_k,
                    });
                }
            }
        }
        plans
    }

    async fn expansion_passes(
        &self,
        query: &RetrievalQuery,
        selected: &[&CollectionDescriptor],
        vector: &[f32],
        top_k: usize,
    ) -> Vec<Pass> {
        let plans = self.plan_expansion(query, selected, vector, top_k).await;
        let searches = plans
            .iter()
            .map(|p| self.coordinator.search_targets(&p.vector, &p.targets, p.top_k));
        let results = join_all(searches).await;
        plans
            .into_iter()
            .zip(results)
            .map(|(plan, hits)| {
                debug!(term = %plan.term, source = ?plan.source, hits = hits.values().map(Vec::len).sum::<usize>(), "expansion searched");
                Pass::expansion(plan.source, plan.discount, hits)
            })
            .collect()
    }

    /// One unfiltered search per collection for a literal entity string.
    /// No expansion or weighting; collections without hits are left out.
    pub async fn find_related(&self, entity: &str, top_k: usize) -> Result<BTreeMap<String, Vec<RawHit>>> {
        let vector = self.embed(entity).await?;
        let names = self.registry.names();
        let found = self.coordinator.search_all(&vector, &names, top_k, &Default::default()).await;
        Ok(found.into_iter().filter(|(_, hits)| !hits.is_empty()).collect())
    }
}
