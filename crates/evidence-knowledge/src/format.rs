//! Per-domain block layouts.
use crate::store::{Domain, FieldValue, KnowledgeEntry};

#[derive(Clone, Copy)]
enum Render {
    /// `- **Label:** value`, list items joined by the separator.
    Inline(&'static str),
    /// `- **Label:**` followed by one indented bullet per item.
    Bullets,
    /// `- value` without a label.
    Bare,
}

struct Line {
    field: &'static str,
    label: &'static str,
    render: Render,
}

const fn line(field: &'static str, label: &'static str, render: Render) -> Line {
    Line { field, label, render }
}

const COMMA: Render = Render::Inline(", ");
const SEMI: Render = Render::Inline("; ");

const TARGET: &[Line] = &[
    line("protein", "Protein", COMMA),
    line("expression", "Expression", COMMA),
    line("diseases", "Diseases", COMMA),
    line("approved_products", "Approved Products", SEMI),
    line("key_trials", "Key Trials", COMMA),
    line("known_resistance", "Resistance Mechanisms", SEMI),
    line("toxicity_profile", "Toxicity Profile", COMMA),
    line("normal_tissue", "Normal Tissue Expression", COMMA),
];

const TOXICITY: &[Line] = &[
    line("mechanism", "Mechanism", COMMA),
    line("incidence", "Incidence", COMMA),
    line("timing", "Timing", COMMA),
    line("management", "Management", Render::Bullets),
    line("biomarkers", "Biomarkers", COMMA),
    line("risk_factors", "Risk Factors", SEMI),
];

const MANUFACTURING: &[Line] = &[
    line("description", "Description", COMMA),
    line("typical_efficiency", "Typical Efficiency", COMMA),
    line("target_vcn", "Target VCN", COMMA),
    line("target_dose", "Target Dose", COMMA),
    line("expansion_fold", "Expansion Fold", COMMA),
    line("duration", "Duration", COMMA),
    line("standard_regimen", "Standard Regimen", COMMA),
    line("critical_parameters", "Critical Parameters", Render::Bullets),
    line("failure_modes", "Failure Modes", Render::Bullets),
];

const BIOMARKER: &[Line] = &[
    line("type", "Type", COMMA),
    line("assay_method", "Assay Method", COMMA),
    line("clinical_cutoff", "Clinical Cutoff", COMMA),
    line("predictive_value", "Predictive Value", COMMA),
    line("associated_outcome", "Associated Outcome", COMMA),
    line("evidence_level", "Evidence Level", COMMA),
];

const REGULATORY: &[Line] = &[
    line("manufacturer", "Manufacturer", COMMA),
    line("initial_approval", "Initial FDA Approval", COMMA),
    line("initial_indication", "Initial Indication", COMMA),
    line("pivotal_trial", "Pivotal Trial", COMMA),
    line("designations", "Designations", COMMA),
    line("rems", "REMS", COMMA),
    line("subsequent_approvals", "Subsequent Approvals", Render::Bullets),
    line("ema_approval", "EMA Approval", COMMA),
];

const IMMUNOGENICITY: &[Line] = &[
    line("description", "", Render::Bare),
    line("ada_incidence", "ADA Incidence", COMMA),
    line("clinical_impact", "Clinical Impact", COMMA),
    line("management", "Management", COMMA),
    line("tradeoffs", "Tradeoffs", COMMA),
    line("fda_guidance", "FDA Guidance", COMMA),
];

const COSTIMULATORY: &[Line] = &[
    line("family", "Receptor Family", COMMA),
    line("signaling", "Signaling", COMMA),
    line("expansion_kinetics", "Expansion Kinetics", COMMA),
    line("persistence", "Persistence", COMMA),
    line("memory_phenotype", "Memory Phenotype", COMMA),
    line("metabolism", "Metabolism", COMMA),
    line("toxicity_profile", "Toxicity Profile", COMMA),
    line("approved_products", "Approved Products", SEMI),
];

fn layout(domain: Domain) -> &'static [Line] {
    match domain {
        Domain::Target => TARGET,
        Domain::Regulatory => REGULATORY,
        Domain::Costimulatory => COSTIMULATORY,
        Domain::Toxicity => TOXICITY,
        Domain::Manufacturing => MANUFACTURING,
        Domain::Biomarker => BIOMARKER,
        Domain::Immunogenicity => IMMUNOGENICITY,
    }
}

fn heading(domain: Domain, e: &KnowledgeEntry) -> String {
    let named = |field: &str| e.text(field).unwrap_or(e.canonical_name());
    match domain {
        Domain::Target => format!("## Target Antigen: {}", e.key),
        Domain::Toxicity => match e.text("full_name") {
            Some(full) => format!("## Toxicity: {full} ({})", e.key),
            None => format!("## Toxicity: {}", e.key),
        },
        Domain::Manufacturing => format!("## Manufacturing: {}", title_case(&e.key)),
        Domain::Biomarker => format!("## Biomarker: {}", named("full_name")),
        Domain::Regulatory => format!("## Regulatory Profile: {}", e.canonical_name()),
        Domain::Immunogenicity => format!("## Immunogenicity: {}", named("topic")),
        Domain::Costimulatory => format!("## Costimulatory Domain: {}", named("full_name")),
    }
}

fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn inline(value: &FieldValue, sep: &str) -> String {
    match value {
        FieldValue::Text(s) => s.clone(),
        FieldValue::List(items) => items.join(sep),
        FieldValue::Map(m) => m
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

/// Renders one entry as a markdown block: a heading and labeled bullets for
/// the fields present.
pub(crate) fn render(domain: Domain, entry: &KnowledgeEntry) -> String {
    let mut out = vec![heading(domain, entry)];
    for l in layout(domain) {
        let Some(value) = entry.field(l.field) else { continue };
        match l.render {
            Render::Inline(sep) => out.push(format!("- **{}:** {}", l.label, inline(value, sep))),
            Render::Bare => out.push(format!("- {}", inline(value, " "))),
            Render::Bullets => {
                out.push(format!("- **{}:**", l.label));
                match value {
                    FieldValue::List(items) => out.extend(items.iter().map(|i| format!("  - {i}"))),
                    other => out.push(format!("  - {}", inline(other, ", "))),
                }
            }
        }
    }
    out.join("\n")
}
