//! Column layout shared by every evidence collection table.
//!
//! Only `id`, `text` and `vector` are fixed. Any other column is
//! collection-specific and surfaces as hit metadata.
use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const ID_COLUMN: &str = "id";
pub const TEXT_COLUMN: &str = "text";
pub const VECTOR_COLUMN: &str = "vector";
/// Added by LanceDB to vector search results.
pub const DISTANCE_COLUMN: &str = "_distance";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaKind {
    Text,
    Integer,
}

impl MetaKind {
    fn data_type(self) -> DataType {
        match self {
            MetaKind::Text => DataType::Utf8,
            MetaKind::Integer => DataType::Int64,
        }
    }
}

pub fn is_reserved(column: &str) -> bool {
    matches!(column, ID_COLUMN | TEXT_COLUMN | VECTOR_COLUMN | DISTANCE_COLUMN)
}

pub fn build_collection_schema(dim: i32, meta: &[(String, MetaKind)]) -> Arc<Schema> {
    let mut fields = vec![
        Field::new(ID_COLUMN, DataType::Utf8, false),
        Field::new(TEXT_COLUMN, DataType::Utf8, false),
    ];
    fields.extend(meta.iter().map(|(name, kind)| Field::new(name, kind.data_type(), true)));
    fields.push(Field::new(
        VECTOR_COLUMN,
        DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim),
        true,
    ));
    Arc::new(Schema::new(fields))
}
