//! A single OGC collection: one PostGIS table with a geometry column.

use serde::Serialize;

/// `collection_id` is always `{schema}.{table}`.
#[derive(Debug, Clone, Serialize)]
pub struct Collection {
    pub schema: String,
    pub table: String,
    pub geometry_column: String,
    pub srid: i32,
    pub id_column: String,
    pub properties: Vec<String>,
}

impl Collection {
    pub fn id(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}
