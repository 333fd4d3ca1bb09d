//! Loads pre-chunked records from a JSON-lines file into one collection.
//!
//! Each line is an object with `id` and `text`; every other scalar field
//! becomes a metadata column. Passages are embedded as-is, without the query
//! instruction.
use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader};

use anyhow::{anyhow, bail, Context, Result};
use evidence_core::config::{expand_path, Config};
use evidence_embed::get_default_embedder;
use evidence_vector::{open_db, write_records, EvidenceRecord};
use serde_json::{Map, Value};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const BATCH: usize = 64;

fn record_from_json(line_no: usize, obj: Map<String, Value>) -> Result<(String, String, Vec<(String, String)>)> {
    let mut id = None;
    let mut text = None;
    let mut meta = Vec::new();
    for (k, v) in obj {
        let scalar = match v {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => continue,
            _ => {
                warn!(line = line_no, field = %k, "skipping non-scalar field");
                continue;
            }
        };
        match k.as_str() {
            "id" => id = Some(scalar),
            "text" => text = Some(scalar),
            _ => meta.push((k, scalar)),
        }
    }
    let id = id.ok_or_else(|| anyhow!("line {}: missing id", line_no))?;
    let text = text.ok_or_else(|| anyhow!("line {}: missing text", line_no))?;
    Ok((id, text, meta))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <collection> <records.jsonl>", args[0]);
        std::process::exit(1);
    }
    let (collection, path) = (&args[1], &args[2]);

    let settings = Config::load()?.settings()?;
    if settings.registry()?.get(collection).is_none() {
        bail!("collection '{}' is not configured", collection);
    }
    let embedder = get_default_embedder(&settings.embedding)?;
    let db = open_db(&expand_path(&settings.store.uri).to_string_lossy()).await?;

    let reader = BufReader::new(File::open(path).with_context(|| format!("opening {}", path))?);
    let mut parsed = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let obj: Map<String, Value> = serde_json::from_str(&line).with_context(|| format!("line {}", i + 1))?;
        parsed.push(record_from_json(i + 1, obj)?);
    }

    // One write per file so every row shares the inferred column types.
    let mut records = Vec::with_capacity(parsed.len());
    for chunk in parsed.chunks(BATCH) {
        let texts: Vec<String> = chunk.iter().map(|(_, t, _)| t.clone()).collect();
        let vectors = embedder.embed_batch(&texts)?;
        for ((id, text, meta), vector) in chunk.iter().cloned().zip(vectors) {
            records.push(meta.into_iter().fold(EvidenceRecord::new(id, text, vector), |r, (k, v)| r.with_meta(k, v)));
        }
    }
    let written = write_records(&db, collection, &records, embedder.dim()).await?;
    info!(collection = %collection, written, "load complete");
    println!("✅ Loaded {} records into {}", written, collection);
    Ok(())
}
