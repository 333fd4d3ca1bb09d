#![allow(dead_code)]

use std::sync::Arc;

use evidence_core::config::{Config, RetrievalSettings};
use evidence_core::registry::{CollectionDescriptor, CollectionRegistry};
use evidence_core::traits::Embedder;
use evidence_core::types::RawHit;
use evidence_embed::{FakeEmbedder, QueryEmbedder};
use evidence_knowledge::{EntityResolver, ExpansionTable, KnowledgeAugmenter, KnowledgeStore, KnownEntities, QueryExpander};
use evidence_retrieval::{EvidenceRetrieval, RetrievalEngine};
use evidence_vector::{MemoryGateway, SearchCoordinator};

pub const LIT: &str = "cart_literature";
pub const TRIALS: &str = "cart_trials";
pub const MFG: &str = "cart_manufacturing";

/// "myeloma" expands to the entity BCMA, "crs" to a semantic phrase.
pub const SMALL_EXPANSION: &str = r#"
[[category]]
name = "Disease"

[[category.keyword]]
match = "myeloma"
terms = ["BCMA"]

[[category]]
name = "Toxicity"

[[category.keyword]]
match = "crs"
terms = ["cytokine release syndrome"]
"#;

pub fn small_registry() -> CollectionRegistry {
    CollectionRegistry::new(vec![
        CollectionDescriptor {
            name: LIT.into(),
            label: "Literature".into(),
            weight: 0.20,
            entity_filter: true,
            year_field: Some("year".into()),
        },
        CollectionDescriptor {
            name: TRIALS.into(),
            label: "Trial".into(),
            weight: 0.16,
            entity_filter: true,
            year_field: Some("start_year".into()),
        },
        CollectionDescriptor {
            name: MFG.into(),
            label: "Manufacturing".into(),
            weight: 0.07,
            entity_filter: false,
            year_field: None,
        },
    ])
    .expect("registry")
}

pub fn builtin_store() -> Arc<KnowledgeStore> {
    Arc::new(KnowledgeStore::builtin().expect("knowledge table"))
}

pub fn build(
    gateway: Arc<MemoryGateway>,
    embedder: Arc<dyn Embedder>,
    expansion: &str,
    settings: RetrievalSettings,
) -> EvidenceRetrieval {
    let table = ExpansionTable::from_toml_str(expansion).expect("expansion table");
    let expander = QueryExpander::new(Arc::new(table)).with_known_entities(KnownEntities::new(["BCMA", "CD19"]));
    let store = builtin_store();
    let engine = RetrievalEngine::new(
        Arc::new(small_registry()),
        SearchCoordinator::from_settings(gateway, &settings),
        QueryEmbedder::new(embedder),
        Arc::new(expander),
        KnowledgeAugmenter::new(Arc::clone(&store)),
        settings,
    );
    EvidenceRetrieval::new(engine, EntityResolver::new(store).expect("resolver"))
}

pub fn small(gateway: Arc<MemoryGateway>) -> EvidenceRetrieval {
    build(gateway, Arc::new(FakeEmbedder::new(32)), SMALL_EXPANSION, RetrievalSettings::default())
}

/// Facade over the default configuration, with every configured collection
/// answering `hits`.
pub fn from_defaults(hits: Vec<RawHit>) -> (EvidenceRetrieval, Arc<MemoryGateway>) {
    let settings = Config::defaults().settings().expect("settings");
    let mut gateway = MemoryGateway::new();
    for c in &settings.collections {
        let prefixed = hits
            .iter()
            .map(|h| RawHit { id: format!("{}:{}", c.name, h.id), ..h.clone() })
            .collect();
        gateway = gateway.script(c.name.clone(), prefixed);
    }
    let gateway = Arc::new(gateway);
    let facade = EvidenceRetrieval::from_settings(&settings, gateway.clone(), Arc::new(FakeEmbedder::new(32)))
        .expect("facade");
    (facade, gateway)
}

pub fn hit(id: &str, score: f32) -> RawHit {
    RawHit::new(id, score, format!("evidence {}", id))
}
