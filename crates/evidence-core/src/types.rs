//! Domain types shared by the search gateway, the ranking engine and the facade.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type RecordId = String;
pub type Meta = BTreeMap<String, String>;

/// One record as returned by a vector search capability.
///
/// `score` is cosine similarity in `[0, 1]`; higher is better. `metadata`
/// carries the collection-specific fields of the stored record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawHit {
    pub id: RecordId,
    pub score: f32,
    pub text: String,
    pub metadata: Meta,
}

impl RawHit {
    pub fn new(id: impl Into<String>, score: f32, text: impl Into<String>) -> Self {
        Self { id: id.into(), score, text: text.into(), metadata: Meta::new() }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Indicates which retrieval attempt produced a hit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceKind {
    /// The embedded question itself.
    Direct,
    /// An expansion term used as an entity-equality filter.
    EntityExpansion,
    /// An expansion term re-embedded and searched on its own.
    SemanticExpansion,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RelevanceTier {
    High,
    Medium,
    Low,
}

impl RelevanceTier {
    pub fn as_str(self) -> &'static str {
        match self {
            RelevanceTier::High => "high",
            RelevanceTier::Medium => "medium",
            RelevanceTier::Low => "low",
        }
    }
}

impl fmt::Display for RelevanceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw-score cut-offs for citation tiers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TierThresholds {
    pub high: f32,
    pub medium: f32,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self { high: 0.75, medium: 0.60 }
    }
}

impl TierThresholds {
    pub fn classify(&self, raw_score: f32) -> RelevanceTier {
        if raw_score >= self.high {
            RelevanceTier::High
        } else if raw_score >= self.medium {
            RelevanceTier::Medium
        } else {
            RelevanceTier::Low
        }
    }
}

/// A ranked, weighted piece of evidence.
///
/// `record_id` is the deduplication key within one retrieval pass.
/// `raw_score` is the similarity after any expansion discount; the
/// weighted score is always `raw_score * (1 + collection weight)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceHit {
    pub collection: String,
    pub collection_label: String,
    pub record_id: RecordId,
    pub raw_score: f32,
    pub weighted_score: f32,
    pub relevance_tier: RelevanceTier,
    pub source: SourceKind,
    pub text: String,
    pub metadata: Meta,
}

/// Result of one retrieval pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MergedEvidenceSet {
    pub query: String,
    pub hits: Vec<EvidenceHit>,
    pub collections_searched: Vec<String>,
    pub knowledge_context: String,
    pub search_time_ms: f64,
}

impl MergedEvidenceSet {
    pub fn hit_count(&self) -> usize {
        self.hits.len()
    }

    /// Groups hits by collection label, keeping the order in which each
    /// label first appears in the ranking.
    pub fn hits_by_collection(&self) -> Vec<(&str, Vec<&EvidenceHit>)> {
        let mut groups: Vec<(&str, Vec<&EvidenceHit>)> = Vec::new();
        for hit in &self.hits {
            match groups.iter_mut().find(|(label, _)| *label == hit.collection_label) {
                Some((_, hits)) => hits.push(hit),
                None => groups.push((hit.collection_label.as_str(), vec![hit])),
            }
        }
        groups
    }
}

/// Two independent evidence sets for a two-entity comparison.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComparativeResult {
    pub query: String,
    pub entity_a: String,
    pub entity_b: String,
    pub evidence_a: MergedEvidenceSet,
    pub evidence_b: MergedEvidenceSet,
    pub comparison_context: String,
    pub total_search_time_ms: f64,
}

impl ComparativeResult {
    pub fn total_hits(&self) -> usize {
        self.evidence_a.hit_count() + self.evidence_b.hit_count()
    }
}

/// What a comparative request produced: a paired result, or the standard
/// evidence set when the two entities could not be parsed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ComparativeOutcome {
    Comparative(Box<ComparativeResult>),
    Standard(MergedEvidenceSet),
}

impl ComparativeOutcome {
    pub fn is_comparative(&self) -> bool {
        matches!(self, ComparativeOutcome::Comparative(_))
    }
}

/// A question plus the caller's optional narrowing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetrievalQuery {
    pub question: String,
    /// Entity-equality filter value (e.g. a target antigen).
    pub entity_filter: Option<String>,
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
    /// Restrict the search to these collection names.
    pub collections: Option<Vec<String>>,
    /// Prior conversation turns, prepended before embedding.
    pub conversation_context: Option<String>,
    pub top_k: Option<usize>,
}

impl RetrievalQuery {
    pub fn new(question: impl Into<String>) -> Self {
        Self { question: question.into(), ..Self::default() }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity_filter = Some(entity.into());
        self
    }

    pub fn with_years(mut self, year_min: Option<i32>, year_max: Option<i32>) -> Self {
        self.year_min = year_min;
        self.year_max = year_max;
        self
    }

    pub fn with_collections(mut self, collections: Vec<String>) -> Self {
        self.collections = Some(collections);
        self
    }

    pub fn with_conversation(mut self, context: impl Into<String>) -> Self {
        self.conversation_context = Some(context.into());
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Text that actually gets embedded: conversation context first, then the question.
    pub fn search_text(&self) -> String {
        match self.conversation_context.as_deref() {
            Some(ctx) if !ctx.trim().is_empty() => {
                format!("{}\n\nCurrent question: {}", ctx, self.question)
            }
            _ => self.question.clone(),
        }
    }
}
