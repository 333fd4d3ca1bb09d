//! Weighting, deduplication, tiering and capping of per-collection hits.
use std::collections::HashSet;

use evidence_core::registry::CollectionDescriptor;
use evidence_core::types::{EvidenceHit, SourceKind, TierThresholds};
use evidence_vector::CollectionHits;

/// Hits from one search attempt, with the factor applied to their raw
/// scores before weighting.
#[derive(Debug, Clone)]
pub struct Pass {
    pub source: SourceKind,
    pub discount: f32,
    pub hits: CollectionHits,
}

impl Pass {
    pub fn direct(hits: CollectionHits) -> Self {
        Self { source: SourceKind::Direct, discount: 1.0, hits }
    }

    pub fn expansion(source: SourceKind, discount: f32, hits: CollectionHits) -> Self {
        Self { source, discount, hits }
    }
}

/// Merges passes into one ranked list.
///
/// Passes are walked in the order given, collections in `collections` order
/// and hits in the order each collection returned them. The first occurrence
/// of a record id wins, so direct hits shadow expansion hits when the direct
/// pass comes first. The sort is stable, so equal weighted scores keep that
/// walk order and the result does not depend on search completion order.
pub fn merge(
    collections: &[&CollectionDescriptor],
    passes: Vec<Pass>,
    tiers: &TierThresholds,
    cap: usize,
) -> Vec<EvidenceHit> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::new();
    for mut pass in passes {
        for desc in collections {
            let Some(hits) = pass.hits.remove(&desc.name) else { continue };
            for hit in hits {
                if !seen.insert(hit.id.clone()) {
                    continue;
                }
                let raw_score = hit.score * pass.discount;
                merged.push(EvidenceHit {
                    collection: desc.name.clone(),
                    collection_label: desc.label.clone(),
                    record_id: hit.id,
                    raw_score,
                    weighted_score: raw_score * (1.0 + desc.weight),
                    relevance_tier: tiers.classify(raw_score),
                    source: pass.source,
                    text: hit.text,
                    metadata: hit.metadata,
                });
            }
        }
    }
    merged.sort_by(|a, b| b.weighted_score.total_cmp(&a.weighted_score));
    merged.truncate(cap);
    merged
}
