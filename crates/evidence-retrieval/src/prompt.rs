//! Citation formatting and prompt assembly for the generation step.
use evidence_core::types::{ComparativeResult, EvidenceHit, MergedEvidenceSet};

pub const SYSTEM_PROMPT: &str = "You are a CAR-T cell therapy research assistant. \
Answer from the evidence provided: targets, CAR design, vectors, preclinical assays, clinical trials, \
manufacturing, safety, biomarkers, regulatory history and real-world outcomes. \
Cite sources with the markdown links given in the evidence. Sources without a link are cited as \
[Collection:record-id]. Say when the evidence is thin or conflicting.";

const EVIDENCE_PER_COLLECTION: usize = 5;
const EVIDENCE_CHARS: usize = 500;
const COMPARATIVE_PER_COLLECTION: usize = 4;
const COMPARATIVE_CHARS: usize = 400;

/// Literature records with numeric ids link to PubMed, trial records with
/// `NCT` ids to ClinicalTrials.gov. Everything else is `[Label:id]`.
pub fn format_citation(label: &str, record_id: &str) -> String {
    let numeric = !record_id.is_empty() && record_id.chars().all(|c| c.is_ascii_digit());
    if label == "Literature" && numeric {
        return format!("[Literature:PMID {id}](https://pubmed.ncbi.nlm.nih.gov/{id}/)", id = record_id);
    }
    if label == "Trial" && record_id.to_uppercase().starts_with("NCT") {
        return format!("[Trial:{id}](https://clinicaltrials.gov/study/{id})", id = record_id);
    }
    format!("[{}:{}]", label, record_id)
}

fn clip(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

fn evidence_line(n: usize, hit: &EvidenceHit, max_chars: usize, with_tier: bool) -> String {
    let citation = format_citation(&hit.collection_label, &hit.record_id);
    let tier = if with_tier { format!(" [{} relevance]", hit.relevance_tier) } else { String::new() };
    format!(
        "{}. {}{} (score={:.3}) {}",
        n,
        citation,
        tier,
        hit.raw_score,
        clip(&hit.text, max_chars)
    )
}

fn collection_sections(
    evidence: &MergedEvidenceSet,
    heading: &str,
    per_collection: usize,
    max_chars: usize,
    with_tier: bool,
) -> Vec<String> {
    evidence
        .hits_by_collection()
        .into_iter()
        .map(|(label, hits)| {
            let mut lines = vec![format!("{} {}", heading, label)];
            lines.extend(
                hits.iter()
                    .take(per_collection)
                    .enumerate()
                    .map(|(i, h)| evidence_line(i + 1, h, max_chars, with_tier)),
            );
            lines.join("\n")
        })
        .collect()
}

pub fn build_prompt(question: &str, evidence: &MergedEvidenceSet) -> String {
    let sections = collection_sections(evidence, "### Evidence from", EVIDENCE_PER_COLLECTION, EVIDENCE_CHARS, true);
    let evidence_text = if sections.is_empty() { "No evidence found.".to_string() } else { sections.join("\n\n") };
    let knowledge = if evidence.knowledge_context.is_empty() {
        String::new()
    } else {
        format!("\n\n### Knowledge Context\n{}", evidence.knowledge_context)
    };
    format!(
        "## Retrieved Evidence\n\n{evidence_text}{knowledge}\n\n---\n\n## Question\n\n{question}\n\n\
         Answer from the evidence above and cite it with the links provided. \
         Prefer [high relevance] citations."
    )
}

pub fn build_comparative_prompt(question: &str, result: &ComparativeResult) -> String {
    let side = |name: &str, evidence: &MergedEvidenceSet| {
        let sections = collection_sections(evidence, "####", COMPARATIVE_PER_COLLECTION, COMPARATIVE_CHARS, false);
        if sections.is_empty() {
            format!("### Evidence for {}\nNo evidence found.", name)
        } else {
            format!("### Evidence for {}\n\n{}", name, sections.join("\n\n"))
        }
    };
    let a = side(&result.entity_a, &result.evidence_a);
    let b = side(&result.entity_b, &result.evidence_b);
    let knowledge = if result.comparison_context.is_empty() {
        String::new()
    } else {
        format!("\n\n### Knowledge Comparison Data\n{}", result.comparison_context)
    };
    format!(
        "## Comparative Evidence\n\n{a}\n\n---\n\n{b}{knowledge}\n\n---\n\n## Question\n\n{question}\n\n\
         ## Instructions\n\nCompare **{ea}** and **{eb}**. Include a markdown table with one row per \
         dimension and one column per entity, the advantages and limitations of each, and when each \
         would be preferred clinically. Cite the evidence with the links provided.",
        ea = result.entity_a,
        eb = result.entity_b,
    )
}
