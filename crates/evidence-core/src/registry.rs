//! Collection Registry: immutable per-collection capability descriptors.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Error, Result};

/// Static description of one searchable collection.
///
/// `weight` boosts the ranking score as `raw * (1 + weight)`.
/// `entity_filter` says whether records carry the entity field;
/// `year_field` names the numeric year column, if any.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionDescriptor {
    pub name: String,
    pub label: String,
    pub weight: f32,
    #[serde(default)]
    pub entity_filter: bool,
    #[serde(default)]
    pub year_field: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CollectionRegistry {
    collections: Vec<CollectionDescriptor>,
}

impl CollectionRegistry {
    /// Validates and freezes the descriptors. Order is preserved and is the
    /// order in which per-collection results are merged.
    pub fn new(collections: Vec<CollectionDescriptor>) -> Result<Self> {
        if collections.is_empty() {
            return Err(Error::InvalidConfig("no collections configured".into()));
        }
        let mut seen = HashSet::new();
        for c in &collections {
            if c.name.trim().is_empty() {
                return Err(Error::InvalidConfig("collection with empty name".into()));
            }
            if c.label.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("collection '{}' has no label", c.name)));
            }
            if !c.weight.is_finite() || c.weight <= 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "collection '{}' has invalid weight {}",
                    c.name, c.weight
                )));
            }
            if !seen.insert(c.name.as_str()) {
                return Err(Error::InvalidConfig(format!("duplicate collection '{}'", c.name)));
            }
        }
        Ok(Self { collections })
    }

    pub fn get(&self, name: &str) -> Option<&CollectionDescriptor> {
        self.collections.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollectionDescriptor> {
        self.collections.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.collections.iter().map(|c| c.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    pub fn total_weight(&self) -> f32 {
        self.collections.iter().map(|c| c.weight).sum()
    }

    /// Registry-ordered selection. `None` or an empty list selects
    /// everything; names not in the registry are returned separately so
    /// callers can report them.
    pub fn select<'a>(&'a self, wanted: Option<&[String]>) -> (Vec<&'a CollectionDescriptor>, Vec<String>) {
        match wanted {
            None | Some([]) => (self.collections.iter().collect(), Vec::new()),
            Some(names) => {
                let selected = self.collections.iter().filter(|c| names.iter().any(|n| n == &c.name)).collect();
                let unknown = names.iter().filter(|n| self.get(n).is_none()).cloned().collect();
                (selected, unknown)
            }
        }
    }
}
