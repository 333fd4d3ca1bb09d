//! Boolean filter expressions pushed down to a vector search capability.
//!
//! A filter is a conjunction of clauses. It renders to the SQL predicate
//! dialect LanceDB accepts and can also be evaluated against record
//! metadata for in-memory backends.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::registry::CollectionDescriptor;
use crate::types::Meta;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Clause {
    Eq { field: String, value: String },
    Gte { field: String, value: i64 },
    Lte { field: String, value: i64 },
}

impl Clause {
    fn matches(&self, meta: &Meta) -> bool {
        match self {
            Clause::Eq { field, value } => meta.get(field).is_some_and(|v| v == value),
            Clause::Gte { field, value } => numeric(meta, field).is_some_and(|v| v >= *value),
            Clause::Lte { field, value } => numeric(meta, field).is_some_and(|v| v <= *value),
        }
    }
}

fn numeric(meta: &Meta, field: &str) -> Option<i64> {
    meta.get(field).and_then(|v| v.trim().parse::<i64>().ok())
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::Eq { field, value } => write!(f, "{} = '{}'", field, value.replace('\'', "''")),
            Clause::Gte { field, value } => write!(f, "{} >= {}", field, value),
            Clause::Lte { field, value } => write!(f, "{} <= {}", field, value),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilterExpr {
    clauses: Vec<Clause>,
}

impl FilterExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new().and(Clause::Eq { field: field.into(), value: value.into() })
    }

    pub fn and(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Builds the filter a collection can honour for the requested entity and
    /// year bounds. Clauses for fields the collection lacks are omitted;
    /// `None` when nothing applies.
    pub fn for_collection(
        desc: &CollectionDescriptor,
        entity_field: &str,
        entity: Option<&str>,
        year_min: Option<i32>,
        year_max: Option<i32>,
    ) -> Option<Self> {
        let mut filter = Self::new();
        if let Some(entity) = entity.filter(|e| !e.trim().is_empty()) {
            if desc.entity_filter {
                filter = filter.and(Clause::Eq { field: entity_field.to_string(), value: entity.to_string() });
            }
        }
        if let Some(year_field) = desc.year_field.as_deref() {
            if let Some(min) = year_min {
                filter = filter.and(Clause::Gte { field: year_field.to_string(), value: i64::from(min) });
            }
            if let Some(max) = year_max {
                filter = filter.and(Clause::Lte { field: year_field.to_string(), value: i64::from(max) });
            }
        }
        if filter.is_empty() { None } else { Some(filter) }
    }

    pub fn to_sql(&self) -> String {
        self.clauses.iter().map(ToString::to_string).collect::<Vec<_>>().join(" AND ")
    }

    /// Every clause must hold; an empty filter matches everything.
    pub fn matches(&self, meta: &Meta) -> bool {
        self.clauses.iter().all(|c| c.matches(meta))
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literature() -> CollectionDescriptor {
        CollectionDescriptor {
            name: "cart_literature".into(),
            label: "Literature".into(),
            weight: 0.2,
            entity_filter: true,
            year_field: Some("year".into()),
        }
    }

    fn manufacturing() -> CollectionDescriptor {
        CollectionDescriptor {
            name: "cart_manufacturing".into(),
            label: "Manufacturing".into(),
            weight: 0.07,
            entity_filter: false,
            year_field: None,
        }
    }

    #[test]
    fn builds_entity_and_year_clauses() {
        let f = FilterExpr::for_collection(&literature(), "target_antigen", Some("CD19"), Some(2018), Some(2024))
            .expect("filter");
        assert_eq!(f.to_sql(), "target_antigen = 'CD19' AND year >= 2018 AND year <= 2024");
    }

    #[test]
    fn omits_clauses_the_collection_cannot_honour() {
        assert!(FilterExpr::for_collection(&manufacturing(), "target_antigen", Some("CD19"), Some(2018), None).is_none());
        assert!(FilterExpr::for_collection(&literature(), "target_antigen", None, None, None).is_none());
    }

    #[test]
    fn evaluates_against_metadata() {
        let f = FilterExpr::eq("target_antigen", "BCMA").and(Clause::Gte { field: "year".into(), value: 2020 });
        let mut meta = Meta::new();
        meta.insert("target_antigen".into(), "BCMA".into());
        meta.insert("year".into(), "2021".into());
        assert!(f.matches(&meta));
        meta.insert("year".into(), "2019".into());
        assert!(!f.matches(&meta));
        meta.remove("year");
        assert!(!f.matches(&meta));
    }

    #[test]
    fn quotes_are_escaped() {
        assert_eq!(FilterExpr::eq("product", "O'Brien").to_sql(), "product = 'O''Brien'");
    }
}
