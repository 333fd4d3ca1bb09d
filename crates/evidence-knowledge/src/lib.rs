//! Static lookup tables: query expansion, curated knowledge and entity
//! resolution. Everything here is loaded once and read-only afterwards.
use std::sync::Arc;

use evidence_core::config::{expand_path, KnowledgeSettings};
use evidence_core::Result;

pub mod augment;
pub mod expansion;
mod format;
pub mod resolve;
pub mod store;

pub use augment::KnowledgeAugmenter;
pub use expansion::{CategoryStats, ExpansionTable, KnownEntities, QueryExpander, TermKind};
pub use resolve::{is_comparative, ComparisonParser, ComparisonSpans, EntityResolver, ResolvedEntity};
pub use store::{Domain, EntityAlias, FieldValue, KnowledgeEntry, KnowledgeStats, KnowledgeStore};

/// Loads the expansion table and knowledge store named in `settings`,
/// falling back to the compiled-in tables for unset paths.
pub fn load_tables(settings: &KnowledgeSettings) -> Result<(Arc<ExpansionTable>, Arc<KnowledgeStore>)> {
    let table = match settings.expansion_table.as_deref() {
        Some(path) => ExpansionTable::from_path(&expand_path(path))?,
        None => ExpansionTable::builtin()?,
    };
    let store = match settings.knowledge_table.as_deref() {
        Some(path) => KnowledgeStore::from_path(&expand_path(path))?,
        None => KnowledgeStore::builtin()?,
    };
    Ok((Arc::new(table), Arc::new(store)))
}

/// Entity-filter values for expansion: every value the store carries plus
/// the configured extras.
pub fn known_entities(store: &KnowledgeStore, settings: &KnowledgeSettings) -> KnownEntities {
    KnownEntities::new(store.entity_values().into_iter().chain(settings.extra_entities.iter().cloned()))
}
