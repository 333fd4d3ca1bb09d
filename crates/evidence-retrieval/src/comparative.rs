//! Comparative Resolver: splits a two-entity question into two
//! independently filtered queries.
use evidence_core::types::RetrievalQuery;
use evidence_knowledge::{ComparisonSpans, EntityResolver, ResolvedEntity};
use tracing::debug;

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonSide {
    /// Canonical knowledge name, or the parsed text when nothing resolved.
    pub canonical: String,
    pub resolved: Option<ResolvedEntity>,
    pub query: RetrievalQuery,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonPlan {
    pub spans: ComparisonSpans,
    pub a: ComparisonSide,
    pub b: ComparisonSide,
}

impl ComparisonPlan {
    /// Knowledge blocks for the resolved sides, not a rescan of the question.
    pub fn context(&self, resolver: &EntityResolver) -> String {
        resolver.comparison_context(self.a.resolved.as_ref(), self.b.resolved.as_ref())
    }
}

/// `None` when the question does not split into two entities; callers then
/// fall back to a standard retrieval.
pub fn plan_comparison(resolver: &EntityResolver, base: &RetrievalQuery) -> Option<ComparisonPlan> {
    let spans = resolver.parser().parse(&base.question)?;
    let a = side(resolver, &spans.a, base);
    let b = side(resolver, &spans.b, base);
    debug!(a = %a.canonical, b = %b.canonical, a_resolved = a.resolved.is_some(), b_resolved = b.resolved.is_some(), "comparison planned");
    Some(ComparisonPlan { spans, a, b })
}

fn side(resolver: &EntityResolver, span: &str, base: &RetrievalQuery) -> ComparisonSide {
    let resolved = resolver.resolve(span);
    let canonical = resolved.as_ref().map_or_else(|| span.to_string(), |r| r.canonical.clone());
    // Each side searches for its own entity; the filter comes only from resolution.
    let query = RetrievalQuery {
        question: format!("{}: {}", canonical, base.question),
        entity_filter: resolved.as_ref().and_then(|r| r.entity_filter.clone()),
        ..base.clone()
    };
    ComparisonSide { canonical, resolved, query }
}
