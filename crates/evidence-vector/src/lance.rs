//! LanceDB-backed search gateway.
use anyhow::{anyhow, Result};
use arrow_array::{
    Array, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array, LargeStringArray,
    RecordBatch, StringArray,
};
use arrow_schema::DataType;
use async_trait::async_trait;
use evidence_core::filter::FilterExpr;
use evidence_core::traits::VectorSearch;
use evidence_core::types::{Meta, RawHit};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType};
use tracing::debug;

use crate::schema::{is_reserved, DISTANCE_COLUMN, ID_COLUMN, TEXT_COLUMN};

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

/// One table per collection; the table name is the collection name.
#[derive(Clone)]
pub struct LanceGateway {
    db: Connection,
}

impl LanceGateway {
    pub async fn connect(uri: &str) -> Result<Self> {
        Ok(Self { db: open_db(uri).await? })
    }

    pub fn from_connection(db: Connection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &Connection {
        &self.db
    }

    pub async fn table_names(&self) -> Result<Vec<String>> {
        Ok(self.db.table_names().execute().await?)
    }
}

#[async_trait]
impl VectorSearch for LanceGateway {
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&FilterExpr>,
    ) -> Result<Vec<RawHit>> {
        let table = self.db.open_table(collection).execute().await?;
        let mut query = table
            .vector_search(vector.to_vec())?
            .distance_type(DistanceType::Cosine)
            .limit(top_k);
        if let Some(f) = filter.filter(|f| !f.is_empty()) {
            debug!(collection, filter = %f, "filtered vector search");
            query = query.only_if(f.to_sql());
        }
        let mut stream = query.execute().await?;
        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await? {
            hits.extend(batch_to_hits(&batch)?);
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow!("column '{}' missing or not utf8", name))
}

/// Cosine distance in `[0, 2]` mapped to a similarity in `[0, 1]`.
fn similarity(distance: f32) -> f32 {
    (1.0 - distance).clamp(0.0, 1.0)
}

fn cell_to_string(col: &dyn Array, i: usize) -> Option<String> {
    if col.is_null(i) {
        return None;
    }
    let any = col.as_any();
    match col.data_type() {
        DataType::Utf8 => any.downcast_ref::<StringArray>().map(|a| a.value(i).to_string()),
        DataType::LargeUtf8 => any.downcast_ref::<LargeStringArray>().map(|a| a.value(i).to_string()),
        DataType::Int32 => any.downcast_ref::<Int32Array>().map(|a| a.value(i).to_string()),
        DataType::Int64 => any.downcast_ref::<Int64Array>().map(|a| a.value(i).to_string()),
        DataType::Float32 => any.downcast_ref::<Float32Array>().map(|a| a.value(i).to_string()),
        DataType::Float64 => any.downcast_ref::<Float64Array>().map(|a| a.value(i).to_string()),
        DataType::Boolean => any.downcast_ref::<BooleanArray>().map(|a| a.value(i).to_string()),
        _ => None,
    }
}

fn batch_to_hits(batch: &RecordBatch) -> Result<Vec<RawHit>> {
    let ids = string_column(batch, ID_COLUMN)?;
    let texts = batch
        .column_by_name(TEXT_COLUMN)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>());
    let distances = batch
        .column_by_name(DISTANCE_COLUMN)
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| anyhow!("search result has no {} column", DISTANCE_COLUMN))?;
    let schema = batch.schema();
    let meta_columns: Vec<_> = schema
        .fields()
        .iter()
        .zip(batch.columns())
        .filter(|(f, _)| !is_reserved(f.name()))
        .collect();

    let mut hits = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let mut metadata = Meta::new();
        for (field, col) in &meta_columns {
            if let Some(v) = cell_to_string(col.as_ref(), i) {
                metadata.insert(field.name().clone(), v);
            }
        }
        hits.push(RawHit {
            id: ids.value(i).to_string(),
            score: similarity(distances.value(i)),
            text: texts.map(|t| t.value(i).to_string()).unwrap_or_default(),
            metadata,
        });
    }
    Ok(hits)
}
