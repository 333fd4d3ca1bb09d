//! Expansion Table and Query Expander.
//!
//! Keywords are matched by plain substring containment on the lowercased
//! question, so short acronyms such as `crs` also fire inside joined words.
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use evidence_core::{Error, Result};
use figment::{
    providers::{Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_EXPANSION_TABLE: &str = include_str!("../data/expansion.toml");

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpansionEntry {
    #[serde(rename = "match")]
    pub keyword: String,
    pub terms: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpansionCategory {
    pub name: String,
    #[serde(default, rename = "keyword")]
    pub entries: Vec<ExpansionEntry>,
}

#[derive(Debug, Deserialize)]
struct ExpansionFile {
    #[serde(default)]
    category: Vec<ExpansionCategory>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CategoryStats {
    pub category: String,
    pub keywords: usize,
    pub total_terms: usize,
}

/// Read-only keyword table grouped into named categories.
#[derive(Debug, Clone)]
pub struct ExpansionTable {
    categories: Vec<ExpansionCategory>,
}

impl ExpansionTable {
    /// The table compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(DEFAULT_EXPANSION_TABLE)
    }

    pub fn from_toml_str(src: &str) -> Result<Self> {
        Self::from_figment(Figment::from(Toml::string(src)))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(format!("expansion table {}", path.display())));
        }
        Self::from_figment(Figment::from(Toml::file(path)))
    }

    fn from_figment(figment: Figment) -> Result<Self> {
        let file: ExpansionFile = figment.extract()?;
        Self::new(file.category)
    }

    /// Keywords are lowercased here so matching never has to care. An empty
    /// keyword would match every question and is rejected.
    pub fn new(mut categories: Vec<ExpansionCategory>) -> Result<Self> {
        for cat in &mut categories {
            if cat.name.trim().is_empty() {
                return Err(Error::InvalidConfig("expansion category with empty name".into()));
            }
            for entry in &mut cat.entries {
                let keyword = entry.keyword.trim().to_lowercase();
                if keyword.is_empty() {
                    return Err(Error::InvalidConfig(format!(
                        "empty keyword in expansion category '{}'",
                        cat.name
                    )));
                }
                entry.keyword = keyword;
            }
        }
        Ok(Self { categories })
    }

    pub fn categories(&self) -> &[ExpansionCategory] {
        &self.categories
    }

    pub fn stats(&self) -> Vec<CategoryStats> {
        self.categories
            .iter()
            .map(|c| CategoryStats {
                category: c.name.clone(),
                keywords: c.entries.len(),
                total_terms: c.entries.iter().map(|e| e.terms.len()).sum(),
            })
            .collect()
    }
}

/// How an expansion term is searched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermKind {
    /// A known entity name; carries the canonical filter value.
    Entity(String),
    Semantic,
}

/// Names that can be used as entity-equality filter values.
///
/// Lookups ignore case, hyphens and spaces: `cd-19` resolves to `CD19`.
#[derive(Debug, Clone, Default)]
pub struct KnownEntities {
    by_norm: HashMap<String, String>,
}

impl KnownEntities {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut by_norm = HashMap::new();
        for name in names {
            let name = name.into();
            let norm = normalize_entity(&name);
            if !norm.is_empty() {
                by_norm.entry(norm).or_insert(name);
            }
        }
        Self { by_norm }
    }

    pub fn canonical(&self, term: &str) -> Option<&str> {
        self.by_norm.get(&normalize_entity(term)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_norm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_norm.is_empty()
    }
}

fn normalize_entity(s: &str) -> String {
    s.chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

#[derive(Debug, Clone)]
pub struct QueryExpander {
    table: Arc<ExpansionTable>,
    known: KnownEntities,
}

impl QueryExpander {
    pub fn new(table: Arc<ExpansionTable>) -> Self {
        Self { table, known: KnownEntities::default() }
    }

    pub fn with_known_entities(mut self, known: KnownEntities) -> Self {
        self.known = known;
        self
    }

    pub fn table(&self) -> &ExpansionTable {
        &self.table
    }

    /// Sorted, deduplicated related terms for every keyword found in `text`.
    pub fn expand(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let mut terms = BTreeSet::new();
        for (category, entry) in self.matches(&lowered) {
            debug!(category = %category.name, keyword = %entry.keyword, terms = entry.terms.len(), "expansion keyword matched");
            terms.extend(entry.terms.iter().cloned());
        }
        terms.into_iter().collect()
    }

    /// Same as [`expand`](Self::expand) but keeps the category each term came
    /// from. Categories without a match are absent.
    pub fn expand_by_category(&self, text: &str) -> BTreeMap<String, Vec<String>> {
        let lowered = text.to_lowercase();
        let mut grouped: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (category, entry) in self.matches(&lowered) {
            grouped
                .entry(category.name.clone())
                .or_default()
                .extend(entry.terms.iter().cloned());
        }
        grouped
            .into_iter()
            .map(|(k, v)| (k, v.into_iter().collect()))
            .collect()
    }

    pub fn classify(&self, term: &str) -> TermKind {
        match self.known.canonical(term) {
            Some(name) => TermKind::Entity(name.to_string()),
            None => TermKind::Semantic,
        }
    }

    fn matches<'a>(
        &'a self,
        lowered: &'a str,
    ) -> impl Iterator<Item = (&'a ExpansionCategory, &'a ExpansionEntry)> + 'a {
        self.table.categories.iter().flat_map(move |c| {
            c.entries
                .iter()
                .filter(move |e| lowered.contains(e.keyword.as_str()))
                .map(move |e| (c, e))
        })
    }
}
