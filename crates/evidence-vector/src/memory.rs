//! In-process search gateway used by tests and offline tooling.
//!
//! Collections either hold embedded records (brute-force cosine) or a fixed
//! scripted hit list that is returned regardless of the query vector. A
//! collection can also be told to fail or to stall before answering.
use anyhow::{bail, Result};
use async_trait::async_trait;
use evidence_core::filter::FilterExpr;
use evidence_core::traits::VectorSearch;
use evidence_core::types::{Meta, RawHit};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use crate::writer::EvidenceRecord;

/// One observed call, for assertions about fan-out and filters.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCall {
    pub collection: String,
    pub top_k: usize,
    pub filter: Option<String>,
}

#[derive(Default)]
pub struct MemoryGateway {
    records: HashMap<String, Vec<EvidenceRecord>>,
    scripted: HashMap<String, Vec<RawHit>>,
    failing: HashSet<String>,
    stalls: HashMap<String, Duration>,
    calls: Mutex<Vec<SearchCall>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, collection: impl Into<String>, record: EvidenceRecord) -> Self {
        self.records.entry(collection.into()).or_default().push(record);
        self
    }

    /// Fixed answer for `collection`, filtered by metadata and cut to `top_k`.
    pub fn script(mut self, collection: impl Into<String>, hits: Vec<RawHit>) -> Self {
        self.scripted.insert(collection.into(), hits);
        self
    }

    pub fn fail(mut self, collection: impl Into<String>) -> Self {
        self.failing.insert(collection.into());
        self
    }

    pub fn stall(mut self, collection: impl Into<String>, delay: Duration) -> Self {
        self.stalls.insert(collection.into(), delay);
        self
    }

    pub fn calls(&self) -> Vec<SearchCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record_call(&self, collection: &str, top_k: usize, filter: Option<&FilterExpr>) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(SearchCall {
                collection: collection.to_string(),
                top_k,
                filter: filter.map(FilterExpr::to_sql),
            });
        }
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    (dot / (na * nb)).clamp(0.0, 1.0)
}

#[async_trait]
impl VectorSearch for MemoryGateway {
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&FilterExpr>,
    ) -> Result<Vec<RawHit>> {
        self.record_call(collection, top_k, filter);
        if let Some(delay) = self.stalls.get(collection) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(collection) {
            bail!("collection '{}' unavailable", collection);
        }
        let keep = |meta: &Meta| filter.map_or(true, |f| f.matches(meta));

        let mut hits: Vec<RawHit> = if let Some(fixed) = self.scripted.get(collection) {
            fixed.iter().filter(|h| keep(&h.metadata)).cloned().collect()
        } else if let Some(records) = self.records.get(collection) {
            records
                .iter()
                .filter(|r| keep(&r.metadata))
                .map(|r| RawHit {
                    id: r.id.clone(),
                    score: cosine(vector, &r.vector),
                    text: r.text.clone(),
                    metadata: r.metadata.clone(),
                })
                .collect()
        } else {
            bail!("collection '{}' not found", collection);
        };
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }
}
