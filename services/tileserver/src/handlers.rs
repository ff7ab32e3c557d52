//! Tile/metadata handlers. Per the Non-goals these are external-collaborator
//! stubs — no raster decode, no vector-tile encoding — but each still
//! exercises the control plane around it (C3's credential context, C4's
//! pool, C5's catalog) so the binary is exercisable end to end.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde_json::{Value, json};

use reader_context::RequestCredential;

use crate::error::{Error, Result};
use crate::state::AppState;

/// `GET /cog/info?url=...` — requires a storage credential via C3; returns a
/// placeholder descriptor rather than actually opening the COG.
pub async fn cog_info(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let url = params.get("url").cloned().unwrap_or_default();
    let credential = RequestCredential::current();
    Json(json!({
        "url": url,
        "storage_account": credential.as_ref().map(|c| c.storage_account.clone()),
        "credential_present": credential.is_some(),
        "width": Value::Null,
        "height": Value::Null,
        "bands": Value::Array(Vec::new()),
    }))
}

/// `GET /vector/collections` — reads C5's currently published catalog.
pub async fn list_collections(State(state): State<AppState>) -> Json<Value> {
    let catalog = state.catalog_service.current();
    let collections: Vec<Value> = catalog
        .list()
        .map(|c| {
            json!({
                "id": c.id(),
                "srid": c.srid,
                "geometry_column": c.geometry_column,
            })
        })
        .collect();
    Json(json!({ "collections": collections }))
}

/// `GET /vector/collections/{id}`.
pub async fn get_collection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let catalog = state.catalog_service.current();
    let collection = catalog
        .get(&id)
        .ok_or_else(|| Error::CollectionNotFound(id.clone()))?;
    Ok(Json(json!({
        "id": collection.id(),
        "schema": collection.schema,
        "table": collection.table,
        "geometry_column": collection.geometry_column,
        "srid": collection.srid,
        "id_column": collection.id_column,
        "properties": collection.properties,
    })))
}

/// Bound on the `SELECT ... LIMIT` run against the backing table — this
/// route returns raw rows as GeoJSON features, not an encoded vector tile
/// (encoding itself is the named non-goal).
const ITEMS_LIMIT: i64 = 100;

/// `GET /vector/collections/{id}/items`.
pub async fn collection_items(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let collection = {
        let catalog = state.catalog_service.current();
        catalog
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::CollectionNotFound(id.clone()))?
    };

    let pool = state.pool_manager.get_async().await?;
    let client = pool.get().await.map_err(|e| Error::Query(e.to_string()))?;

    let query = format!(
        "SELECT {id_col}::text AS id_value, ST_AsGeoJSON({geom}) AS geom FROM {schema}.{table} LIMIT {limit}",
        id_col = quote_ident(&collection.id_column),
        geom = quote_ident(&collection.geometry_column),
        schema = quote_ident(&collection.schema),
        table = quote_ident(&collection.table),
        limit = ITEMS_LIMIT,
    );

    let rows = client
        .query(&query, &[])
        .await
        .map_err(|e| Error::Query(e.to_string()))?;

    let features: Vec<Value> = rows
        .iter()
        .map(|row| {
            let id_value: String = row.get("id_value");
            let geometry: String = row.get("geom");
            json!({
                "type": "Feature",
                "id": id_value,
                "geometry": serde_json::from_str::<Value>(&geometry).unwrap_or(Value::Null),
            })
        })
        .collect();

    Ok(Json(json!({
        "type": "FeatureCollection",
        "collection": collection.id(),
        "features": features,
    })))
}

pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
