use anyhow::{bail, Result};
use arrow_array::{FixedSizeListArray, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_array::types::Float32Type;
use arrow_array::ArrayRef;
use evidence_core::types::Meta;
use lancedb::Connection;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::schema::{build_collection_schema, is_reserved, MetaKind};

/// A pre-embedded record ready to be written to a collection table.
#[derive(Debug, Clone)]
pub struct EvidenceRecord {
    pub id: String,
    pub text: String,
    pub vector: Vec<f32>,
    pub metadata: Meta,
}

impl EvidenceRecord {
    pub fn new(id: impl Into<String>, text: impl Into<String>, vector: Vec<f32>) -> Self {
        Self { id: id.into(), text: text.into(), vector, metadata: Meta::new() }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A metadata column is numeric when every present value parses as an integer,
/// so year range filters compare numbers rather than strings.
fn infer_meta_columns(records: &[EvidenceRecord]) -> Vec<(String, MetaKind)> {
    let mut kinds: BTreeMap<String, MetaKind> = BTreeMap::new();
    for r in records {
        for (k, v) in &r.metadata {
            if is_reserved(k) {
                continue;
            }
            let numeric = v.trim().parse::<i64>().is_ok();
            let kind = kinds.entry(k.clone()).or_insert(if numeric { MetaKind::Integer } else { MetaKind::Text });
            if !numeric {
                *kind = MetaKind::Text;
            }
        }
    }
    kinds.into_iter().collect()
}

fn records_to_batch(records: &[EvidenceRecord], dim: usize) -> Result<RecordBatch> {
    let dim_i32 = i32::try_from(dim)?;
    let meta = infer_meta_columns(records);
    let schema = build_collection_schema(dim_i32, &meta);

    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(records.iter().map(|r| r.id.clone()).collect::<Vec<_>>())),
        Arc::new(StringArray::from(records.iter().map(|r| r.text.clone()).collect::<Vec<_>>())),
    ];
    for (name, kind) in &meta {
        let values = records.iter().map(|r| r.metadata.get(name));
        let col: ArrayRef = match kind {
            MetaKind::Text => Arc::new(StringArray::from(values.map(|v| v.cloned()).collect::<Vec<_>>())),
            MetaKind::Integer => Arc::new(Int64Array::from(
                values.map(|v| v.and_then(|s| s.trim().parse::<i64>().ok())).collect::<Vec<_>>(),
            )),
        };
        columns.push(col);
    }
    let vectors = records.iter().map(|r| Some(r.vector.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
    columns.push(Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, dim_i32)));

    Ok(RecordBatch::try_new(schema, columns)?)
}

/// Appends records to `table`, creating it from the first batch's schema when
/// missing. Every vector must have `dim` components.
pub async fn write_records(db: &Connection, table: &str, records: &[EvidenceRecord], dim: usize) -> Result<usize> {
    if records.is_empty() {
        return Ok(0);
    }
    if let Some(bad) = records.iter().find(|r| r.vector.len() != dim) {
        bail!("record '{}' has {} dims, expected {}", bad.id, bad.vector.len(), dim);
    }
    let batch = records_to_batch(records, dim)?;
    let schema = batch.schema();
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
    if db.table_names().execute().await?.iter().any(|n| n == table) {
        db.open_table(table).execute().await?.add(reader).execute().await?;
    } else {
        db.create_table(table, reader).execute().await?;
    }
    info!(table, rows = records.len(), "records written");
    Ok(records.len())
}
