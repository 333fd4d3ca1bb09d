use std::env;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use evidence_core::config::{expand_path, Config, Settings};
use evidence_core::types::{ComparativeOutcome, MergedEvidenceSet, RetrievalQuery};
use evidence_embed::get_default_embedder;
use evidence_knowledge::{known_entities, load_tables, QueryExpander};
use evidence_retrieval::{build_comparative_prompt, build_prompt, format_citation, EvidenceRetrieval};
use evidence_vector::LanceGateway;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: evidence <command> [args...]

  query \"<question>\" [--entity CD19] [--years 2018:2024] [--collections a,b] [--top-k 5] [--prompt]
  compare \"<question>\" [--years 2018:2024] [--prompt]
  related \"<entity>\" [top_k]
  expand \"<text>\"
  stats";

#[derive(Default)]
struct QueryArgs {
    text: String,
    entity: Option<String>,
    years: (Option<i32>, Option<i32>),
    collections: Option<Vec<String>>,
    top_k: Option<usize>,
    prompt: bool,
}

impl QueryArgs {
    fn parse(args: &[String]) -> Result<Self> {
        let mut out = Self::default();
        let mut it = args.iter();
        while let Some(arg) = it.next() {
            let mut value = || it.next().cloned().ok_or_else(|| anyhow!("{} needs a value", arg));
            match arg.as_str() {
                "--entity" => out.entity = Some(value()?),
                "--years" => out.years = parse_years(&value()?)?,
                "--collections" => {
                    out.collections = Some(value()?.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                }
                "--top-k" => out.top_k = Some(value()?.parse()?),
                "--prompt" => out.prompt = true,
                flag if flag.starts_with("--") => bail!("unknown option {}", flag),
                text if out.text.is_empty() => out.text = text.to_string(),
                extra => bail!("unexpected argument {}", extra),
            }
        }
        if out.text.trim().is_empty() {
            bail!("missing question\n\n{}", USAGE);
        }
        Ok(out)
    }

    fn query(&self) -> RetrievalQuery {
        let mut q = RetrievalQuery::new(self.text.clone()).with_years(self.years.0, self.years.1);
        if let Some(e) = &self.entity {
            q = q.with_entity(e.clone());
        }
        if let Some(c) = &self.collections {
            q = q.with_collections(c.clone());
        }
        if let Some(k) = self.top_k {
            q = q.with_top_k(k);
        }
        q
    }
}

/// `2018:2024`, `2018:` or `:2024`.
fn parse_years(s: &str) -> Result<(Option<i32>, Option<i32>)> {
    let (min, max) = s.split_once(':').ok_or_else(|| anyhow!("years must look like 2018:2024"))?;
    let year = |v: &str| -> Result<Option<i32>> {
        if v.trim().is_empty() { Ok(None) } else { Ok(Some(v.trim().parse()?)) }
    };
    Ok((year(min)?, year(max)?))
}

async fn open_facade(settings: &Settings) -> Result<EvidenceRetrieval> {
    let uri = expand_path(&settings.store.uri);
    let gateway = LanceGateway::connect(&uri.to_string_lossy()).await?;
    let embedder = get_default_embedder(&settings.embedding)?;
    Ok(EvidenceRetrieval::from_settings(settings, Arc::new(gateway), embedder)?)
}

fn clip(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max { flat } else { format!("{}…", flat.chars().take(max).collect::<String>()) }
}

fn print_evidence(set: &MergedEvidenceSet) {
    println!(
        "🔍 {} hits from {} collections in {:.0} ms",
        set.hit_count(),
        set.collections_searched.len(),
        set.search_time_ms
    );
    for (label, hits) in set.hits_by_collection() {
        println!("\n  {}", label);
        for h in hits {
            println!(
                "    {} [{}] raw={:.3} weighted={:.3} {:?}",
                format_citation(&h.collection_label, &h.record_id),
                h.relevance_tier,
                h.raw_score,
                h.weighted_score,
                h.source
            );
            println!("      {}", clip(&h.text, 160));
        }
    }
    if !set.knowledge_context.is_empty() {
        println!("\n📚 Knowledge context\n{}", set.knowledge_context);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }
    let cmd = args.remove(0);
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let settings = config.settings()?;

    match cmd.as_str() {
        "query" => {
            let qa = QueryArgs::parse(&args)?;
            let facade = open_facade(&settings).await?;
            let query = qa.query();
            if qa.prompt {
                println!("{}", facade.prompt_for(&query).await?);
            } else {
                print_evidence(&facade.retrieve(&query).await?);
            }
        }
        "compare" => {
            let qa = QueryArgs::parse(&args)?;
            let facade = open_facade(&settings).await?;
            let query = qa.query();
            match facade.retrieve_comparative(&query).await? {
                ComparativeOutcome::Comparative(result) if qa.prompt => {
                    println!("{}", build_comparative_prompt(&query.question, &result));
                }
                ComparativeOutcome::Comparative(result) => {
                    println!("⚖️  {} vs {}", result.entity_a, result.entity_b);
                    println!("\n=== {} ===", result.entity_a);
                    print_evidence(&result.evidence_a);
                    println!("\n=== {} ===", result.entity_b);
                    print_evidence(&result.evidence_b);
                    if !result.comparison_context.is_empty() {
                        println!("\n📚 Comparison context\n{}", result.comparison_context);
                    }
                }
                ComparativeOutcome::Standard(set) if qa.prompt => println!("{}", build_prompt(&query.question, &set)),
                ComparativeOutcome::Standard(set) => {
                    println!("Could not split the question into two entities; standard retrieval:");
                    print_evidence(&set);
                }
            }
        }
        "related" => {
            let entity = args.first().cloned().ok_or_else(|| anyhow!("Usage: evidence related \"<entity>\" [top_k]"))?;
            let top_k = match args.get(1) {
                Some(k) => k.parse()?,
                None => settings.retrieval.top_k_per_collection,
            };
            let facade = open_facade(&settings).await?;
            let related = facade.find_related(&entity, top_k).await?;
            println!("🔗 '{}' found in {} collections", entity, related.len());
            for (collection, hits) in &related {
                let label = facade.engine().registry().get(collection).map_or(collection.as_str(), |c| c.label.as_str());
                println!("\n  {} ({})", label, hits.len());
                for h in hits {
                    println!("    {} score={:.3} {}", format_citation(label, &h.id), h.score, clip(&h.text, 120));
                }
            }
        }
        "expand" => {
            let text = args.join(" ");
            let (table, store) = load_tables(&settings.knowledge)?;
            let expander = QueryExpander::new(table).with_known_entities(known_entities(&store, &settings.knowledge));
            for (category, terms) in expander.expand_by_category(&text) {
                println!("{}:", category);
                for term in terms {
                    println!("  {} ({:?})", term, expander.classify(&term));
                }
            }
            let terms = expander.expand(&text);
            let used = terms.len().min(settings.retrieval.max_expansion_terms);
            println!("\n{} terms, first {} searched: {:?}", terms.len(), used, &terms[..used]);
        }
        "stats" => {
            let (table, store) = load_tables(&settings.knowledge)?;
            println!("Collections:");
            for c in settings.registry()?.iter() {
                let mut caps = Vec::new();
                if c.entity_filter {
                    caps.push(settings.retrieval.entity_field.clone());
                }
                if let Some(y) = &c.year_field {
                    caps.push(format!("{} range", y));
                }
                println!("  {:<20} {:<14} weight={:.2} filters=[{}]", c.name, c.label, c.weight, caps.join(", "));
            }
            println!("\nExpansion table:");
            for s in table.stats() {
                println!("  {:<16} {:>3} keywords {:>4} terms", s.category, s.keywords, s.total_terms);
            }
            let ks = store.stats();
            println!("\nKnowledge store ({} aliases, {} targets with approved products):", ks.aliases, ks.targets_with_approved_products);
            for (domain, n) in ks.domains {
                println!("  {:<16} {:>3} entries", domain, n);
            }
        }
        _ => {
            eprintln!("Unknown command: {}\n\n{}", cmd, USAGE);
            std::process::exit(1);
        }
    }
    Ok(())
}
