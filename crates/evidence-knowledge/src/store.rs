//! Knowledge Store: curated fact records per domain plus the alias table.
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

use evidence_core::{Error, Result};
use figment::{
    providers::{Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::format;

pub const DEFAULT_KNOWLEDGE_TABLE: &str = include_str!("../data/knowledge.toml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Target,
    Regulatory,
    Costimulatory,
    Toxicity,
    Manufacturing,
    Biomarker,
    Immunogenicity,
}

impl Domain {
    /// Order used both when scanning free text and when resolving a
    /// comparison span. A surface form that exists in two domains resolves to
    /// the earlier one.
    pub const PRIORITY: [Domain; 7] = [
        Domain::Target,
        Domain::Regulatory,
        Domain::Costimulatory,
        Domain::Toxicity,
        Domain::Manufacturing,
        Domain::Biomarker,
        Domain::Immunogenicity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Target => "target",
            Domain::Regulatory => "regulatory",
            Domain::Costimulatory => "costimulatory",
            Domain::Toxicity => "toxicity",
            Domain::Manufacturing => "manufacturing",
            Domain::Biomarker => "biomarker",
            Domain::Immunogenicity => "immunogenicity",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A free-form attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::List(v) => v.is_empty(),
            FieldValue::Map(m) => m.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub key: String,
    /// Display name when it differs from the key, e.g. brand plus generic name.
    #[serde(default)]
    pub label: Option<String>,
    /// Entity-filter value this entry maps to, if any.
    #[serde(default)]
    pub entity: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
    /// Uppercased key, key with underscores as spaces, and aliases.
    #[serde(skip)]
    surfaces: Vec<String>,
}

impl KnowledgeEntry {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: None,
            entity: None,
            aliases: Vec::new(),
            fields: BTreeMap::new(),
            surfaces: Vec::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn canonical_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.key)
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name).filter(|v| !v.is_empty())
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.field(name) {
            Some(FieldValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Uppercased surface forms this entry is recognized by.
    pub fn surfaces(&self) -> &[String] {
        &self.surfaces
    }

    fn index_surfaces(&mut self) {
        let mut seen = HashSet::new();
        let spaced = self.key.replace('_', " ");
        let forms = std::iter::once(self.key.as_str())
            .chain(std::iter::once(spaced.as_str()))
            .chain(self.aliases.iter().map(String::as_str));
        let mut surfaces = Vec::new();
        for form in forms {
            let upper = form.trim().to_uppercase();
            if !upper.is_empty() && seen.insert(upper.clone()) {
                surfaces.push(upper);
            }
        }
        self.surfaces = surfaces;
    }
}

/// An alternate surface form pointing at a canonical key in one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityAlias {
    pub surface: String,
    pub domain: Domain,
    pub key: String,
}

#[derive(Debug, Default, Deserialize)]
struct KnowledgeFile {
    #[serde(default)]
    filter_values: Vec<String>,
    #[serde(default)]
    target: Vec<KnowledgeEntry>,
    #[serde(default)]
    regulatory: Vec<KnowledgeEntry>,
    #[serde(default)]
    costimulatory: Vec<KnowledgeEntry>,
    #[serde(default)]
    toxicity: Vec<KnowledgeEntry>,
    #[serde(default)]
    manufacturing: Vec<KnowledgeEntry>,
    #[serde(default)]
    biomarker: Vec<KnowledgeEntry>,
    #[serde(default)]
    immunogenicity: Vec<KnowledgeEntry>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct KnowledgeStats {
    pub domains: Vec<(Domain, usize)>,
    pub aliases: usize,
    pub targets_with_approved_products: usize,
}

#[derive(Debug, Clone)]
pub struct KnowledgeStore {
    domains: Vec<(Domain, Vec<KnowledgeEntry>)>,
    aliases: Vec<EntityAlias>,
    /// Entity-filter values known to the corpus without a curated entry.
    filter_values: Vec<String>,
}

impl KnowledgeStore {
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(DEFAULT_KNOWLEDGE_TABLE)
    }

    pub fn from_toml_str(src: &str) -> Result<Self> {
        Self::from_figment(Figment::from(Toml::string(src)))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(format!("knowledge table {}", path.display())));
        }
        Self::from_figment(Figment::from(Toml::file(path)))
    }

    fn from_figment(figment: Figment) -> Result<Self> {
        let f: KnowledgeFile = figment.extract()?;
        let store = Self::new(vec![
            (Domain::Target, f.target),
            (Domain::Regulatory, f.regulatory),
            (Domain::Costimulatory, f.costimulatory),
            (Domain::Toxicity, f.toxicity),
            (Domain::Manufacturing, f.manufacturing),
            (Domain::Biomarker, f.biomarker),
            (Domain::Immunogenicity, f.immunogenicity),
        ])?;
        Ok(store.with_filter_values(f.filter_values))
    }

    /// Builds the store from entries per domain. Domains are reordered into
    /// [`Domain::PRIORITY`]; entry order within a domain is kept.
    pub fn new(entries: Vec<(Domain, Vec<KnowledgeEntry>)>) -> Result<Self> {
        let mut by_domain: BTreeMap<Domain, Vec<KnowledgeEntry>> = BTreeMap::new();
        for (domain, list) in entries {
            by_domain.entry(domain).or_default().extend(list);
        }

        let mut domains = Vec::with_capacity(Domain::PRIORITY.len());
        let mut aliases = Vec::new();
        for domain in Domain::PRIORITY {
            let mut list = by_domain.remove(&domain).unwrap_or_default();
            let mut keys = HashSet::new();
            for entry in &mut list {
                if entry.key.trim().is_empty() {
                    return Err(Error::InvalidConfig(format!("{domain} entry with empty key")));
                }
                if !keys.insert(entry.key.to_uppercase()) {
                    return Err(Error::InvalidConfig(format!(
                        "duplicate {domain} entry '{}'",
                        entry.key
                    )));
                }
                entry.index_surfaces();
                for surface in entry.surfaces() {
                    aliases.push(EntityAlias {
                        surface: surface.clone(),
                        domain,
                        key: entry.key.clone(),
                    });
                }
            }
            domains.push((domain, list));
        }
        Ok(Self { domains, aliases, filter_values: Vec::new() })
    }

    pub fn with_filter_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter_values
            .extend(values.into_iter().map(Into::into).filter(|v: &String| !v.trim().is_empty()));
        self
    }

    pub fn entries(&self, domain: Domain) -> &[KnowledgeEntry] {
        self.domains
            .iter()
            .find(|(d, _)| *d == domain)
            .map(|(_, list)| list.as_slice())
            .unwrap_or(&[])
    }

    pub fn get(&self, domain: Domain, key: &str) -> Option<&KnowledgeEntry> {
        self.entries(domain).iter().find(|e| e.key.eq_ignore_ascii_case(key))
    }

    /// Every surface form in priority order, canonical keys included.
    pub fn aliases(&self) -> &[EntityAlias] {
        &self.aliases
    }

    /// First alias whose surface equals `text` (case-insensitive, trimmed).
    pub fn lookup(&self, text: &str) -> Option<&EntityAlias> {
        let wanted = text.trim().to_uppercase();
        if wanted.is_empty() {
            return None;
        }
        self.aliases.iter().find(|a| a.surface == wanted)
    }

    /// Distinct entity-filter values: those carried by entries first, then
    /// the table's standalone `filter_values`.
    pub fn entity_values(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.domains
            .iter()
            .flat_map(|(_, list)| list.iter())
            .filter_map(|e| e.entity.as_deref())
            .chain(self.filter_values.iter().map(String::as_str))
            .filter(|v| seen.insert(v.to_uppercase()))
            .map(str::to_string)
            .collect()
    }

    pub fn block(&self, domain: Domain, key: &str) -> Option<String> {
        self.get(domain, key).map(|e| format::render(domain, e))
    }

    pub fn stats(&self) -> KnowledgeStats {
        KnowledgeStats {
            domains: self.domains.iter().map(|(d, l)| (*d, l.len())).collect(),
            aliases: self.aliases.len(),
            targets_with_approved_products: self
                .entries(Domain::Target)
                .iter()
                .filter(|e| e.field("approved_products").is_some())
                .count(),
        }
    }
}
