//! The published collection set and the introspection query that builds
//! it (C5's `load`).

use std::collections::BTreeMap;

use deadpool_postgres::Pool;
use tracing::warn;

use crate::collection::Collection;
use crate::error::Result;

/// An immutable snapshot of the OGC collections currently exposed.
///
/// Collections are keyed by `schema.table` in a `BTreeMap`, which gives
/// alphabetical iteration order for free — no separate sort step needed
/// before handing the list to a request handler.
#[derive(Debug, Default)]
pub struct Catalog {
    collections: BTreeMap<String, Collection>,
}

impl Catalog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Collection> {
        self.collections.get(id)
    }

    pub fn list(&self) -> impl Iterator<Item = &Collection> {
        self.collections.values()
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}

/// Introspect `schemas` through `pool` and build a [`Catalog`].
///
/// A failure reading one table's primary key or column list is logged and
/// that table is skipped; it does not fail the whole load. A failure
/// reaching the database at all is fatal to the call (returns `Err`) —
/// the caller keeps whatever catalog was previously published.
pub async fn load(pool: &Pool, schemas: &[String]) -> Result<Catalog> {
    if schemas.is_empty() {
        return Ok(Catalog::empty());
    }

    let client = pool
        .get()
        .await
        .map_err(|e| crate::error::Error::Pool(e.to_string()))?;

    let geometry_rows = client
        .query(
            "SELECT f_table_schema, f_table_name, f_geometry_column, srid \
             FROM geometry_columns \
             WHERE f_table_schema = ANY($1) \
             ORDER BY f_table_schema, f_table_name",
            &[&schemas],
        )
        .await
        .map_err(|e| crate::error::Error::Query(format!("listing geometry_columns: {e}")))?;

    let mut collections = BTreeMap::new();

    for row in geometry_rows {
        let schema: String = row.get("f_table_schema");
        let table: String = row.get("f_table_name");
        let geometry_column: String = row.get("f_geometry_column");
        let srid: i32 = row.get("srid");

        let id_column = match primary_key_column(&client, &schema, &table).await {
            Ok(Some(col)) => col,
            Ok(None) => {
                warn!(schema, table, "no primary key found, skipping table");
                continue;
            }
            Err(e) => {
                warn!(schema, table, error = %e, "failed to read primary key, skipping table");
                continue;
            }
        };

        let properties = match other_columns(&client, &schema, &table, &geometry_column).await {
            Ok(cols) => cols,
            Err(e) => {
                warn!(schema, table, error = %e, "failed to read columns, skipping table");
                continue;
            }
        };

        let collection = Collection {
            schema: schema.clone(),
            table: table.clone(),
            geometry_column,
            srid,
            id_column,
            properties,
        };
        collections.insert(collection.id(), collection);
    }

    Ok(Catalog { collections })
}

async fn primary_key_column(
    client: &deadpool_postgres::Client,
    schema: &str,
    table: &str,
) -> std::result::Result<Option<String>, tokio_postgres::Error> {
    let rows = client
        .query(
            "SELECT kcu.column_name \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name \
              AND tc.table_schema = kcu.table_schema \
             WHERE tc.constraint_type = 'PRIMARY KEY' \
               AND tc.table_schema = $1 \
               AND tc.table_name = $2 \
             ORDER BY kcu.ordinal_position \
             LIMIT 1",
            &[&schema, &table],
        )
        .await?;
    Ok(rows.first().map(|r| r.get("column_name")))
}

async fn other_columns(
    client: &deadpool_postgres::Client,
    schema: &str,
    table: &str,
    geometry_column: &str,
) -> std::result::Result<Vec<String>, tokio_postgres::Error> {
    let rows = client
        .query(
            "SELECT column_name FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 AND column_name <> $3 \
             ORDER BY ordinal_position",
            &[&schema, &table, &geometry_column],
        )
        .await?;
    Ok(rows.into_iter().map(|r| r.get("column_name")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_id_is_schema_dot_table() {
        let collection = Collection {
            schema: "public".into(),
            table: "parcels".into(),
            geometry_column: "geom".into(),
            srid: 4326,
            id_column: "id".into(),
            properties: vec!["owner".into()],
        };
        assert_eq!(collection.id(), "public.parcels");
    }

    #[test]
    fn empty_catalog_has_no_collections() {
        let catalog = Catalog::empty();
        assert_eq!(catalog.len(), 0);
        assert!(catalog.is_empty());
        assert!(catalog.get("public.parcels").is_none());
    }

    #[tokio::test]
    async fn load_with_no_schemas_returns_empty_catalog() {
        // No pool needed: the empty-schemas short-circuit never touches
        // the database, mirroring the "tolerates partial startup failure"
        // posture when vector API access is configured with zero schemas.
        let catalog = load(&test_pool_placeholder(), &[]).await.unwrap();
        assert!(catalog.is_empty());
    }

    fn test_pool_placeholder() -> Pool {
        // A pool with no reachable backend is fine here: `load` never
        // calls `pool.get()` when `schemas` is empty.
        let cfg = deadpool_postgres::Config {
            host: Some("127.0.0.1".into()),
            port: Some(1),
            dbname: Some("placeholder".into()),
            user: Some("placeholder".into()),
            ..Default::default()
        };
        cfg.create_pool(Some(deadpool_postgres::Runtime::Tokio1), tokio_postgres::NoTls)
            .expect("pool config is syntactically valid")
    }
}
