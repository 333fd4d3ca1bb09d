//! Parallel Search Coordinator.
//!
//! One spawned task per collection, each bounded by its own timeout and by
//! the overall deadline of the fan-out. A collection that errors or runs out
//! of time contributes an empty list; nothing here fails the caller.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use evidence_core::config::RetrievalSettings;
use evidence_core::filter::FilterExpr;
use evidence_core::traits::VectorSearch;
use evidence_core::types::RawHit;
use futures::future::join_all;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

pub type CollectionHits = HashMap<String, Vec<RawHit>>;

/// A collection to search and the filter it can honour.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchTarget {
    pub collection: String,
    pub filter: Option<FilterExpr>,
}

impl SearchTarget {
    pub fn new(collection: impl Into<String>, filter: Option<FilterExpr>) -> Self {
        Self { collection: collection.into(), filter }
    }
}

#[derive(Clone)]
pub struct SearchCoordinator {
    gateway: Arc<dyn VectorSearch>,
    per_collection_timeout: Duration,
    overall_deadline: Duration,
    score_threshold: f32,
}

impl SearchCoordinator {
    pub fn new(gateway: Arc<dyn VectorSearch>) -> Self {
        Self::from_settings(gateway, &RetrievalSettings::default())
    }

    pub fn from_settings(gateway: Arc<dyn VectorSearch>, settings: &RetrievalSettings) -> Self {
        Self {
            gateway,
            per_collection_timeout: Duration::from_millis(settings.per_collection_timeout_ms),
            overall_deadline: Duration::from_millis(settings.overall_deadline_ms),
            score_threshold: settings.score_threshold,
        }
    }

    pub fn with_timeouts(mut self, per_collection: Duration, overall: Duration) -> Self {
        self.per_collection_timeout = per_collection;
        self.overall_deadline = overall;
        self
    }

    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = threshold;
        self
    }

    pub fn gateway(&self) -> &Arc<dyn VectorSearch> {
        &self.gateway
    }

    /// Searches every named collection with the same vector and `top_k`,
    /// applying the filter registered for that collection, if any.
    pub async fn search_all(
        &self,
        vector: &[f32],
        collections: &[String],
        top_k: usize,
        filters: &HashMap<String, FilterExpr>,
    ) -> CollectionHits {
        let targets: Vec<SearchTarget> = collections
            .iter()
            .map(|c| SearchTarget::new(c.clone(), filters.get(c).cloned()))
            .collect();
        self.search_targets(vector, &targets, top_k).await
    }

    pub async fn search_targets(&self, vector: &[f32], targets: &[SearchTarget], top_k: usize) -> CollectionHits {
        let started = Instant::now();
        let deadline = started + self.overall_deadline;
        let vector: Arc<[f32]> = Arc::from(vector);

        let tasks = targets.iter().map(|target| {
            let gateway = Arc::clone(&self.gateway);
            let vector = Arc::clone(&vector);
            let target = target.clone();
            let task_deadline = (started + self.per_collection_timeout).min(deadline);
            let threshold = self.score_threshold;
            tokio::spawn(async move {
                let call = gateway.search(&target.collection, &vector, top_k, target.filter.as_ref());
                let hits = match timeout_at(task_deadline, call).await {
                    Ok(Ok(hits)) => {
                        let returned = hits.len();
                        let kept: Vec<RawHit> = hits.into_iter().filter(|h| h.score >= threshold).collect();
                        debug!(collection = %target.collection, returned, kept = kept.len(), "collection searched");
                        kept
                    }
                    Ok(Err(e)) => {
                        warn!(collection = %target.collection, error = %e, "collection search failed");
                        Vec::new()
                    }
                    Err(_) => {
                        warn!(collection = %target.collection, "collection search timed out");
                        Vec::new()
                    }
                };
                (target.collection, hits)
            })
        });
        let joined = join_all(tasks).await;

        let mut out = CollectionHits::with_capacity(targets.len());
        for (target, res) in targets.iter().zip(joined) {
            match res {
                Ok((name, hits)) => {
                    out.insert(name, hits);
                }
                Err(e) => {
                    warn!(collection = %target.collection, error = %e, "search task aborted");
                    out.insert(target.collection.clone(), Vec::new());
                }
            }
        }
        let total: usize = out.values().map(Vec::len).sum();
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        info!(collections = targets.len(), hits = total, elapsed_ms, "parallel search complete");
        out
    }
}
