//! Comparison detection, span parsing and entity resolution.
use std::sync::Arc;

use evidence_core::{Error, Result};
use regex::Regex;
use serde::Serialize;

use crate::store::{Domain, KnowledgeStore};

const COMPARISON_MARKERS: [&str; 4] = ["COMPARE", " VS ", "VERSUS", "COMPARING"];

/// Trailing phrases dropped from a parsed span, tried once each in order.
const TRAILING_QUALIFIERS: [&str; 16] = [
    "costimulatory domains",
    "costimulatory domain",
    "domains",
    "domain",
    "signaling",
    "resistance mechanisms",
    "resistance",
    "mechanisms",
    "for .*",
    "in .*",
    "differences",
    "comparison",
    "toxicity",
    "efficacy",
    "outcomes",
    "safety",
];

/// Case-insensitive substring test for comparison intent.
pub fn is_comparative(text: &str) -> bool {
    let upper = text.to_uppercase();
    COMPARISON_MARKERS.iter().any(|m| upper.contains(m))
}

/// The two raw entity spans of a comparison question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonSpans {
    pub a: String,
    pub b: String,
}

#[derive(Debug, Clone)]
pub struct ComparisonParser {
    versus: Regex,
    compare_prefix: Regex,
    compare_and: Regex,
    qualifiers: Vec<Regex>,
}

impl ComparisonParser {
    pub fn new() -> Result<Self> {
        let compile = |p: &str| {
            Regex::new(p).map_err(|e| Error::InvalidConfig(format!("comparison pattern {p}: {e}")))
        };
        let qualifiers = TRAILING_QUALIFIERS
            .iter()
            .map(|q| compile(&format!(r"(?i)\s+{q}$")))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            versus: compile(r"(?i)^(.+?)\s+(?:vs\.?|versus)\s+(.+)$")?,
            compare_prefix: compile(r"(?i)^(?:compare|comparing)\s+")?,
            compare_and: compile(
                r"(?i)(?:compare|comparing)\s+(.+?)\s+(?:and|with)\s+(.+?)(?:\s+(?:for|in)\b.*)?$",
            )?,
            qualifiers,
        })
    }

    /// `A vs B` / `A versus B` first, then `compare A and/with B`. `None` when
    /// neither yields two non-empty spans.
    pub fn parse(&self, text: &str) -> Option<ComparisonSpans> {
        let q = text.trim();
        let (a, b) = if let Some(c) = self.versus.captures(q) {
            let a = self.compare_prefix.replace(c[1].trim(), "").into_owned();
            (a, c[2].trim().to_string())
        } else if let Some(c) = self.compare_and.captures(q) {
            (c[1].trim().to_string(), c[2].trim().to_string())
        } else {
            return None;
        };
        let a = self.clean(&a);
        let b = self.clean(&b);
        if a.is_empty() || b.is_empty() {
            return None;
        }
        Some(ComparisonSpans { a, b })
    }

    fn clean(&self, span: &str) -> String {
        let mut s = span.trim_end_matches(['?', '.', ',', ';', ':']).to_string();
        for q in &self.qualifiers {
            s = q.replace(&s, "").into_owned();
        }
        s.trim().to_string()
    }
}

/// A comparison span matched to a knowledge entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedEntity {
    pub canonical: String,
    pub domain: Domain,
    pub key: String,
    /// Value for the entity-equality filter, e.g. a product's target antigen.
    pub entity_filter: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EntityResolver {
    store: Arc<KnowledgeStore>,
    parser: ComparisonParser,
}

impl EntityResolver {
    pub fn new(store: Arc<KnowledgeStore>) -> Result<Self> {
        Ok(Self { store, parser: ComparisonParser::new()? })
    }

    pub fn parser(&self) -> &ComparisonParser {
        &self.parser
    }

    /// Exact (case-insensitive) match on keys and aliases, domains in
    /// [`Domain::PRIORITY`] order.
    pub fn resolve(&self, span: &str) -> Option<ResolvedEntity> {
        let alias = self.store.lookup(span)?;
        let entry = self.store.get(alias.domain, &alias.key)?;
        Some(ResolvedEntity {
            canonical: entry.canonical_name().to_string(),
            domain: alias.domain,
            key: entry.key.clone(),
            entity_filter: entry.entity.clone(),
        })
    }

    /// Knowledge block for one resolved entity. Products fall back to their
    /// target's block, which carries the clinical profile.
    pub fn entity_block(&self, entity: &ResolvedEntity) -> Option<String> {
        if entity.domain == Domain::Regulatory {
            if let Some(target) = &entity.entity_filter {
                if let Some(block) = self.store.block(Domain::Target, target) {
                    return Some(block);
                }
            }
        }
        self.store.block(entity.domain, &entity.key)
    }

    /// `### <canonical>` sections for each side that has a block, separated
    /// by a horizontal rule.
    pub fn comparison_context(
        &self,
        a: Option<&ResolvedEntity>,
        b: Option<&ResolvedEntity>,
    ) -> String {
        [a, b]
            .into_iter()
            .flatten()
            .filter_map(|e| self.entity_block(e).map(|block| format!("### {}\n{}", e.canonical, block)))
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> ComparisonParser {
        ComparisonParser::new().unwrap()
    }

    #[test]
    fn markers() {
        assert!(is_comparative("Compare 4-1BB vs CD28"));
        assert!(is_comparative("cd19 VERSUS bcma"));
        assert!(!is_comparative("What is CD19?"));
        assert!(!is_comparative("canvas is not a marker"));
    }

    #[test]
    fn versus_with_qualifiers() {
        let spans = parser().parse("Compare 4-1BB vs CD28 costimulatory domains").unwrap();
        assert_eq!(spans, ComparisonSpans { a: "4-1BB".into(), b: "CD28".into() });

        let spans = parser().parse("Kymriah versus Yescarta for DLBCL?").unwrap();
        assert_eq!(spans, ComparisonSpans { a: "Kymriah".into(), b: "Yescarta".into() });
    }

    #[test]
    fn compare_and_with() {
        let spans = parser().parse("Comparing CRS and ICANS in pediatric patients").unwrap();
        assert_eq!(spans, ComparisonSpans { a: "CRS".into(), b: "ICANS".into() });
        let spans = parser().parse("compare lentiviral with retroviral.").unwrap();
        assert_eq!(spans, ComparisonSpans { a: "lentiviral".into(), b: "retroviral".into() });
    }

    #[test]
    fn unparseable_is_none() {
        assert_eq!(parser().parse("compare everything"), None);
        assert_eq!(parser().parse(""), None);
    }
}
