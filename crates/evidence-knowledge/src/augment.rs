use std::sync::Arc;

use tracing::debug;

use crate::format;
use crate::store::{Domain, KnowledgeStore};

/// Turns recognized entities in free text into formatted knowledge blocks.
#[derive(Debug, Clone)]
pub struct KnowledgeAugmenter {
    store: Arc<KnowledgeStore>,
}

impl KnowledgeAugmenter {
    pub fn new(store: Arc<KnowledgeStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }

    /// At most one block per domain, domains in priority order, separated by
    /// a blank line. Empty when nothing matches.
    pub fn context_for(&self, text: &str) -> String {
        let upper = text.to_uppercase();
        let mut blocks = Vec::new();
        for domain in Domain::PRIORITY {
            let hit = self
                .store
                .entries(domain)
                .iter()
                .find(|e| e.surfaces().iter().any(|s| upper.contains(s.as_str())));
            if let Some(entry) = hit {
                debug!(%domain, key = %entry.key, "knowledge context matched");
                blocks.push(format::render(domain, entry));
            }
        }
        blocks.join("\n\n")
    }
}
