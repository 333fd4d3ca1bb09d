mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use evidence_core::config::RetrievalSettings;
use evidence_core::traits::{Embedder, TextGenerator, TokenStream};
use evidence_core::types::{RawHit, RelevanceTier, RetrievalQuery, SourceKind};
use evidence_core::Error;
use evidence_embed::FakeEmbedder;
use evidence_retrieval::AnswerEvent;
use evidence_vector::MemoryGateway;
use futures::StreamExt;

use common::{build, hit, small, small_registry, LIT, MFG, SMALL_EXPANSION, TRIALS};

struct BrokenEmbedder;

impl Embedder for BrokenEmbedder {
    fn dim(&self) -> usize {
        32
    }
    fn max_len(&self) -> usize {
        512
    }
    fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Err(anyhow!("model not loaded"))
    }
}

struct EchoGenerator;

#[async_trait]
impl TextGenerator for EchoGenerator {
    async fn generate(&self, prompt: &str, _system_prompt: &str) -> anyhow::Result<String> {
        Ok(format!("{} chars", prompt.len()))
    }

    async fn generate_stream(&self, _prompt: &str, _system_prompt: &str) -> anyhow::Result<TokenStream> {
        let tokens = vec![Ok("CD19 ".to_string()), Ok("works".to_string())];
        Ok(futures::stream::iter(tokens).boxed())
    }
}

fn weight_of(name: &str) -> f32 {
    small_registry().get(name).map(|c| c.weight).unwrap_or_default()
}

#[tokio::test]
async fn result_is_capped_and_ids_are_unique() {
    let many = |prefix: &str| -> Vec<RawHit> {
        (0..20).map(|i| hit(&format!("{}{}", prefix, i), 0.5 + i as f32 / 100.0)).collect()
    };
    let mut shared = many("shared-");
    shared.truncate(10);
    let gateway = Arc::new(
        MemoryGateway::new()
            .script(LIT, shared.clone().into_iter().chain(many("lit-")).collect())
            .script(TRIALS, many("trial-"))
            .script(MFG, shared.clone().into_iter().chain(many("mfg-")).collect()),
    );
    let facade = small(gateway);
    let query = RetrievalQuery::new("CRS in myeloma").with_top_k(20);
    let set = facade.retrieve(&query).await.expect("retrieve");

    assert_eq!(set.hit_count(), 30);
    let ids: HashSet<&str> = set.hits.iter().map(|h| h.record_id.as_str()).collect();
    assert_eq!(ids.len(), set.hits.len());
    assert!(set.hits.windows(2).all(|w| w[0].weighted_score >= w[1].weighted_score));
}

#[tokio::test]
async fn weighted_score_is_raw_times_one_plus_weight() {
    let gateway = Arc::new(
        MemoryGateway::new()
            .script(LIT, vec![hit("p1", 0.9), hit("p2", 0.45)])
            .script(TRIALS, vec![hit("NCT1", 0.8)])
            .script(MFG, vec![hit("m1", 0.7), hit("m2", 0.65)]),
    );
    let set = small(gateway).retrieve(&RetrievalQuery::new("CRS management")).await.expect("retrieve");
    assert!(!set.hits.is_empty());
    for h in &set.hits {
        assert_eq!(h.weighted_score, h.raw_score * (1.0 + weight_of(&h.collection)), "{}", h.record_id);
    }
}

#[tokio::test]
async fn tiers_follow_raw_score_boundaries() {
    let gateway = Arc::new(
        MemoryGateway::new()
            .script(LIT, vec![hit("a", 0.75), hit("b", 0.74), hit("c", 0.60), hit("d", 0.59)])
            .script(TRIALS, vec![])
            .script(MFG, vec![]),
    );
    let set = small(gateway).retrieve(&RetrievalQuery::new("plain question")).await.expect("retrieve");
    let tier = |id: &str| set.hits.iter().find(|h| h.record_id == id).map(|h| h.relevance_tier);
    assert_eq!(tier("a"), Some(RelevanceTier::High));
    assert_eq!(tier("b"), Some(RelevanceTier::Medium));
    assert_eq!(tier("c"), Some(RelevanceTier::Medium));
    assert_eq!(tier("d"), Some(RelevanceTier::Low));
}

#[tokio::test(start_paused = true)]
async fn ordering_does_not_depend_on_completion_order() {
    let gateway = || {
        MemoryGateway::new()
            .script(LIT, vec![hit("a", 0.8), hit("a2", 0.6)])
            .script(TRIALS, vec![hit("b", 0.8), hit("b2", 0.6)])
            .script(MFG, vec![hit("c", 0.9)])
    };
    let fast_lit = small(Arc::new(gateway().stall(TRIALS, Duration::from_millis(300))));
    let fast_trials = small(Arc::new(gateway().stall(LIT, Duration::from_millis(300))));
    let query = RetrievalQuery::new("crs after infusion");

    let first = fast_lit.retrieve(&query).await.expect("retrieve");
    let second = fast_trials.retrieve(&query).await.expect("retrieve");
    let again = fast_lit.retrieve(&query).await.expect("retrieve");
    assert_eq!(first.hits, second.hits);
    assert_eq!(first.hits, again.hits);
    assert_eq!(first.knowledge_context, second.knowledge_context);
}

#[tokio::test]
async fn failing_collection_only_loses_its_own_hits() {
    let gateway = Arc::new(
        MemoryGateway::new()
            .script(LIT, vec![hit("p1", 0.9)])
            .script(MFG, vec![hit("m1", 0.7)])
            .fail(TRIALS),
    );
    let set = small(gateway).retrieve(&RetrievalQuery::new("what is new")).await.expect("retrieve");
    assert_eq!(set.hit_count(), 2);
    assert!(set.hits.iter().all(|h| h.collection != TRIALS));
    assert_eq!(set.collections_searched, vec![LIT.to_string(), TRIALS.to_string(), MFG.to_string()]);
}

#[tokio::test]
async fn embedding_failure_is_retrieval_unavailable() {
    let gateway = Arc::new(MemoryGateway::new().script(LIT, vec![hit("p1", 0.9)]));
    let facade = build(gateway.clone(), Arc::new(BrokenEmbedder), SMALL_EXPANSION, RetrievalSettings::default());
    let err = facade.retrieve(&RetrievalQuery::new("anything")).await.unwrap_err();
    assert!(matches!(err, Error::RetrievalUnavailable(_)), "{err}");
    assert!(gateway.calls().is_empty());
    assert!(matches!(facade.find_related("Kymriah", 3).await, Err(Error::RetrievalUnavailable(_))));
}

#[tokio::test]
async fn semantic_expansion_never_outranks_equal_direct_hit() {
    let gateway = Arc::new(
        MemoryGateway::new()
            .script(LIT, vec![hit("direct", 0.8), hit("expanded", 0.8)])
            .script(TRIALS, vec![])
            .script(MFG, vec![]),
    );
    let facade = small(gateway.clone());
    let set = facade.retrieve(&RetrievalQuery::new("crs grading").with_top_k(1)).await.expect("retrieve");

    let ids: Vec<&str> = set.hits.iter().map(|h| h.record_id.as_str()).collect();
    assert_eq!(ids, vec!["direct", "expanded"]);
    assert_eq!(set.hits[0].source, SourceKind::Direct);
    assert_eq!(set.hits[1].source, SourceKind::SemanticExpansion);
    assert_eq!(set.hits[1].raw_score, 0.8_f32 * 0.7);
    // semantic terms are searched two per collection across every collection
    let semantic: Vec<_> = gateway.calls().into_iter().filter(|c| c.top_k == 2).collect();
    assert_eq!(semantic.len(), 3);
}

#[tokio::test]
async fn entity_expansion_filters_capable_collections_and_is_discounted() {
    let gateway = Arc::new(
        MemoryGateway::new()
            .script(LIT, vec![hit("direct", 0.8), hit("bcma", 0.8).with_meta("target_antigen", "BCMA")])
            .script(TRIALS, vec![])
            .script(MFG, vec![]),
    );
    let facade = small(gateway.clone());
    let set = facade.retrieve(&RetrievalQuery::new("relapsed myeloma").with_top_k(1)).await.expect("retrieve");

    let ids: Vec<&str> = set.hits.iter().map(|h| h.record_id.as_str()).collect();
    assert_eq!(ids, vec!["direct", "bcma"]);
    assert_eq!(set.hits[1].source, SourceKind::EntityExpansion);
    assert_eq!(set.hits[1].raw_score, 0.8_f32 * 0.8);

    let filtered: Vec<String> = gateway
        .calls()
        .into_iter()
        .filter(|c| c.filter.as_deref() == Some("target_antigen = 'BCMA'"))
        .map(|c| c.collection)
        .collect();
    assert_eq!(filtered.len(), 2);
    assert!(!filtered.contains(&MFG.to_string()));
}

#[tokio::test]
async fn entity_expansion_yields_to_a_different_caller_entity() {
    let gateway = Arc::new(
        MemoryGateway::new()
            .script(
                LIT,
                vec![
                    hit("cd19", 0.8).with_meta("target_antigen", "CD19"),
                    hit("bcma", 0.8).with_meta("target_antigen", "BCMA"),
                ],
            )
            .script(TRIALS, vec![])
            .script(MFG, vec![]),
    );
    let facade = small(gateway.clone());
    let set = facade
        .retrieve(&RetrievalQuery::new("relapsed myeloma").with_entity("CD19"))
        .await
        .expect("retrieve");

    let ids: Vec<&str> = set.hits.iter().map(|h| h.record_id.as_str()).collect();
    assert_eq!(ids, vec!["cd19"]);
    assert!(set.hits.iter().all(|h| h.source != SourceKind::EntityExpansion));
    assert!(gateway
        .calls()
        .iter()
        .all(|c| c.filter.as_deref() != Some("target_antigen = 'BCMA'")));
}

#[tokio::test]
async fn entity_expansion_runs_when_it_matches_the_caller_entity() {
    let gateway = Arc::new(MemoryGateway::new().script(LIT, vec![]).script(TRIALS, vec![]).script(MFG, vec![]));
    let facade = small(gateway.clone());
    facade
        .retrieve(&RetrievalQuery::new("relapsed myeloma").with_entity("BCMA"))
        .await
        .expect("retrieve");

    let bcma_calls: Vec<usize> = gateway
        .calls()
        .into_iter()
        .filter(|c| c.filter.as_deref() == Some("target_antigen = 'BCMA'"))
        .map(|c| c.top_k)
        .collect();
    // Direct search on both entity-capable collections, then the expansion pass.
    assert_eq!(bcma_calls.len(), 4);
    assert_eq!(bcma_calls.iter().filter(|k| **k == 3).count(), 2);
}

#[tokio::test]
async fn caller_filters_reach_the_right_fields() {
    let gateway = Arc::new(MemoryGateway::new().script(LIT, vec![]).script(TRIALS, vec![]).script(MFG, vec![]));
    let facade = small(gateway.clone());
    let query = RetrievalQuery::new("long-term outcomes").with_entity("CD19").with_years(Some(2020), Some(2024));
    facade.retrieve(&query).await.expect("retrieve");

    let calls = gateway.calls();
    let filter_for = |name: &str| calls.iter().find(|c| c.collection == name).and_then(|c| c.filter.clone());
    assert_eq!(filter_for(LIT).as_deref(), Some("target_antigen = 'CD19' AND year >= 2020 AND year <= 2024"));
    assert_eq!(
        filter_for(TRIALS).as_deref(),
        Some("target_antigen = 'CD19' AND start_year >= 2020 AND start_year <= 2024")
    );
    assert_eq!(filter_for(MFG), None);
}

#[tokio::test]
async fn empty_collection_selection_searches_everything() {
    let gateway = Arc::new(MemoryGateway::new().script(LIT, vec![]).script(TRIALS, vec![]).script(MFG, vec![]));
    let query = RetrievalQuery::new("vector copy number").with_collections(Vec::new());
    let set = small(gateway).retrieve(&query).await.expect("retrieve");
    assert_eq!(set.collections_searched, vec![LIT.to_string(), TRIALS.to_string(), MFG.to_string()]);
}

#[tokio::test]
async fn collection_selection_ignores_unknown_names() {
    let gateway = Arc::new(MemoryGateway::new().script(LIT, vec![hit("p1", 0.9)]).script(MFG, vec![hit("m1", 0.7)]));
    let query = RetrievalQuery::new("vector copy number")
        .with_collections(vec![MFG.to_string(), "cart_nonexistent".to_string()]);
    let set = small(gateway.clone()).retrieve(&query).await.expect("retrieve");
    assert_eq!(set.collections_searched, vec![MFG.to_string()]);
    assert_eq!(set.hits.len(), 1);
    assert!(gateway.calls().iter().all(|c| c.collection == MFG));
}

#[tokio::test]
async fn knowledge_context_comes_from_the_question() {
    let gateway = Arc::new(MemoryGateway::new().script(LIT, vec![]).script(TRIALS, vec![]).script(MFG, vec![]));
    let query = RetrievalQuery::new("Durability of CD19 responses").with_conversation("Earlier we talked about BCMA.");
    let set = small(gateway).retrieve(&query).await.expect("retrieve");
    assert!(set.hits.is_empty());
    assert!(set.knowledge_context.starts_with("## Target Antigen: CD19"));
    assert_eq!(set.query, "Durability of CD19 responses");
}

#[tokio::test]
async fn find_related_skips_expansion_and_empty_collections() {
    let gateway = Arc::new(
        MemoryGateway::new()
            .script(LIT, vec![hit("p1", 0.9), hit("p2", 0.3)])
            .script(TRIALS, vec![])
            .script(MFG, vec![hit("m1", 0.5)]),
    );
    let related = small(gateway.clone()).find_related("CRS myeloma", 5).await.expect("related");
    assert_eq!(related.keys().cloned().collect::<Vec<_>>(), vec![LIT.to_string(), MFG.to_string()]);
    assert_eq!(related[LIT].len(), 1);
    assert_eq!(gateway.calls().len(), 3);
}

#[tokio::test]
async fn answer_stream_emits_evidence_tokens_then_done() {
    let gateway = Arc::new(MemoryGateway::new().script(LIT, vec![hit("12345", 0.9)]).script(TRIALS, vec![]).script(MFG, vec![]));
    let facade = small(gateway).with_generator(Arc::new(EchoGenerator));
    let events: Vec<AnswerEvent> = facade
        .answer_stream(&RetrievalQuery::new("CD19 durability"))
        .await
        .expect("stream")
        .map(|e| e.expect("event"))
        .collect()
        .await;

    assert_eq!(events.len(), 4);
    assert!(matches!(&events[0], AnswerEvent::Evidence(set) if set.hit_count() == 1));
    assert!(matches!(&events[1], AnswerEvent::Token(t) if t == "CD19 "));
    assert!(matches!(&events[3], AnswerEvent::Done(full) if full == "CD19 works"));

    let answer = facade.answer(&RetrievalQuery::new("CD19 durability")).await.expect("answer");
    assert!(answer.ends_with(" chars"));
}

#[tokio::test]
async fn default_generator_produces_nothing() {
    let gateway = Arc::new(MemoryGateway::new().script(LIT, vec![]).script(TRIALS, vec![]).script(MFG, vec![]));
    let facade = build(gateway, Arc::new(FakeEmbedder::new(16)), SMALL_EXPANSION, RetrievalSettings::default());
    assert_eq!(facade.answer(&RetrievalQuery::new("anything")).await.expect("answer"), "");
}
