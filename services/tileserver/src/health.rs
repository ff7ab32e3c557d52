//! Health/readiness reporter (C7): liveness, readiness, structured
//! diagnostics, and a thin HTML dashboard, all built from the same
//! component-status aggregate.

use std::collections::BTreeMap;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json};
use serde::Serialize;
use serde_json::{Value, json};

use crate::handlers::quote_ident;
use crate::state::AppState;

/// Overall deadline for the diagnostics aggregate, including every named
/// database probe (§5: "DB query during diagnostics... 30 s total").
const DIAGNOSTICS_DEADLINE: Duration = Duration::from_secs(30);

/// Per-query deadline for each named database probe (§5: "5 s per query").
const DB_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize)]
pub struct ComponentStatus {
    pub state: &'static str,
    pub last_error: Option<String>,
    pub details: Value,
}

impl ComponentStatus {
    fn healthy(details: Value) -> Self {
        Self {
            state: "healthy",
            last_error: None,
            details,
        }
    }

    fn disabled() -> Self {
        Self {
            state: "disabled",
            last_error: None,
            details: json!({}),
        }
    }

    fn degraded(reason: impl Into<String>) -> Self {
        Self {
            state: "degraded",
            last_error: Some(reason.into()),
            details: json!({}),
        }
    }

    fn is_healthy(&self) -> bool {
        self.state == "healthy"
    }
}

#[derive(Debug, Serialize)]
pub struct Diagnostics {
    pub version: &'static str,
    pub hostname: String,
    pub uptime_seconds: u64,
    pub components: BTreeMap<String, ComponentStatus>,
    pub timed_out: bool,
}

pub async fn livez() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "alive" })))
}

pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let diag = diagnostics(&state).await;
    let ready = is_ready(&state, &diag);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "ready": ready,
            "issues": not_ready_issues(&diag),
            "components": diag.components,
        })),
    )
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(diagnostics(&state).await)
}

pub async fn dashboard(State(state): State<AppState>) -> impl IntoResponse {
    Html(render_dashboard(&diagnostics(&state).await))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics_handle.render()
}

async fn diagnostics(state: &AppState) -> Diagnostics {
    let probes = async {
        tokio::join!(
            storage_status(state),
            database_status(state),
            pool_status(state),
            catalog_status(state),
        )
    };

    let (timed_out, storage, database, pool, catalog) =
        match tokio::time::timeout(DIAGNOSTICS_DEADLINE, probes).await {
            Ok((storage, database, pool, catalog)) => (false, storage, database, pool, catalog),
            Err(_) => {
                let timeout = ComponentStatus::degraded("diagnostics probe exceeded deadline");
                (
                    true,
                    timeout.clone(),
                    timeout.clone(),
                    timeout.clone(),
                    timeout,
                )
            }
        };

    let mut components = BTreeMap::new();
    components.insert("storage".to_string(), storage);
    components.insert("database".to_string(), database);
    components.insert("pool".to_string(), pool);
    components.insert("catalog".to_string(), catalog);

    Diagnostics {
        version: env!("CARGO_PKG_VERSION"),
        hostname: state.hostname.to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        components,
        timed_out,
    }
}

/// `{last_success_seconds_ago, last_error}` common to both credential
/// providers (§4.7: "last-success and last-error timestamps per provider").
fn provider_timestamps(
    last_success_at: Option<std::time::Instant>,
    last_error: Option<(String, std::time::Instant)>,
) -> Value {
    json!({
        "last_success_seconds_ago": last_success_at.map(|t| t.elapsed().as_secs()),
        "last_error": last_error.map(|(message, at)| json!({
            "message": message,
            "seconds_ago": at.elapsed().as_secs(),
        })),
    })
}

/// Merge two JSON objects, `extra`'s keys winning on overlap.
fn merge_objects(mut base: Value, extra: Value) -> Value {
    if let (Value::Object(base_map), Value::Object(extra_map)) = (&mut base, extra) {
        base_map.extend(extra_map);
    }
    base
}

async fn storage_status(state: &AppState) -> ComponentStatus {
    match state.storage_provider.as_ref() {
        None => ComponentStatus::disabled(),
        Some(provider) => {
            let timestamps =
                provider_timestamps(provider.last_success_at().await, provider.last_error().await);
            match provider.ttl().await {
                Some(ttl) => ComponentStatus::healthy(merge_objects(
                    json!({ "ttl_seconds": ttl.as_secs() }),
                    timestamps,
                )),
                None => {
                    let mut status = ComponentStatus::degraded("no cached storage credential");
                    status.details = timestamps;
                    status
                }
            }
        }
    }
}

async fn database_status(state: &AppState) -> ComponentStatus {
    let timestamps = provider_timestamps(
        state.database_provider.last_success_at().await,
        state.database_provider.last_error().await,
    );
    match state.database_provider.ttl().await {
        Some(ttl) => {
            ComponentStatus::healthy(merge_objects(json!({ "ttl_seconds": ttl.as_secs() }), timestamps))
        }
        None => {
            let mut status = ComponentStatus::degraded("no cached database credential");
            status.details = timestamps;
            status
        }
    }
}

async fn pool_status(state: &AppState) -> ComponentStatus {
    let status = state.pool_manager.status().await;
    if !status.initialized {
        return ComponentStatus::degraded("pool not initialized");
    }

    let queries = run_db_probes(state).await;
    ComponentStatus::healthy(json!({
        "sync_connections": status.sync_connections,
        "sync_idle": status.sync_idle,
        "async_size": status.async_size,
        "async_available": status.async_available,
        "queries": queries,
    }))
}

/// Runs the bounded set of named introspection probes §4.7 requires: a
/// basic liveness query plus one row-count query per published collection.
/// Each probe returns a `{name, result, error}` object — never both absent
/// (P6) — and a failure on one probe never aborts the others (Scenario 5).
async fn run_db_probes(state: &AppState) -> Vec<Value> {
    let pool = match state.pool_manager.get_async().await {
        Ok(pool) => pool,
        Err(e) => return vec![named_query_error("postgis_version", e.to_string())],
    };
    let client = match pool.get().await {
        Ok(client) => client,
        Err(e) => return vec![named_query_error("postgis_version", e.to_string())],
    };

    let mut probes = vec![
        match tokio::time::timeout(DB_QUERY_TIMEOUT, client.query_one("SELECT postgis_version()", &[]))
            .await
        {
            Ok(Ok(row)) => {
                let version: String = row.get(0);
                named_query_ok("postgis_version", json!(version))
            }
            Ok(Err(e)) => named_query_error("postgis_version", e.to_string()),
            Err(_) => named_query_timeout("postgis_version"),
        },
    ];

    let catalog = state.catalog_service.current();
    for collection in catalog.list() {
        let name = format!("table_counts:{}", collection.id());
        let sql = format!(
            "SELECT count(*) FROM {}.{}",
            quote_ident(&collection.schema),
            quote_ident(&collection.table),
        );
        let probe = match tokio::time::timeout(DB_QUERY_TIMEOUT, client.query_one(&sql, &[])).await {
            Ok(Ok(row)) => {
                let count: i64 = row.get(0);
                named_query_ok(&name, json!(count))
            }
            Ok(Err(e)) => named_query_error(&name, e.to_string()),
            Err(_) => named_query_timeout(&name),
        };
        probes.push(probe);
    }

    probes
}

fn named_query_ok(name: &str, result: Value) -> Value {
    json!({ "name": name, "result": result, "error": Value::Null })
}

fn named_query_error(name: &str, error: String) -> Value {
    json!({ "name": name, "result": Value::Null, "error": error })
}

fn named_query_timeout(name: &str) -> Value {
    named_query_error(name, format!("query exceeded {DB_QUERY_TIMEOUT:?}"))
}

async fn catalog_status(state: &AppState) -> ComponentStatus {
    if !state.config.vector.enable_vector_api {
        return ComponentStatus::disabled();
    }
    let catalog = state.catalog_service.current();
    ComponentStatus::healthy(json!({ "collections": catalog.len() }))
}

/// Ready iff both pools are healthy, or the process runs DB-optional and
/// storage is healthy with at least `readyz_min_token_ttl_sec` remaining
/// (§4.7, §6A).
fn is_ready(state: &AppState, diag: &Diagnostics) -> bool {
    let pool_healthy = diag.components.get("pool").is_some_and(ComponentStatus::is_healthy);
    if pool_healthy {
        return true;
    }

    if state.config.database.db_required {
        return false;
    }

    match state.storage_provider.as_ref() {
        None => true,
        Some(_) => diag.components.get("storage").is_some_and(|s| {
            s.is_healthy()
                && s.details
                    .get("ttl_seconds")
                    .and_then(Value::as_u64)
                    .is_some_and(|ttl| ttl >= state.config.refresh.readyz_min_token_ttl_sec)
        }),
    }
}

/// The per-component reasons a not-ready response is not-ready, named
/// `{component}_oauth:{reason}` for the credential-backed components and
/// `postgres_pool:{reason}` for the pool itself — e.g. cold start with no
/// cached token for either credential yields
/// `["storage_oauth:no_token", "postgres_oauth:no_token"]` (Scenario 1).
fn not_ready_issues(diag: &Diagnostics) -> Vec<String> {
    let mut issues = Vec::new();

    if let Some(status) = diag.components.get("storage") {
        if let Some(issue) = credential_issue(status, "storage_oauth") {
            issues.push(issue);
        }
    }
    if let Some(status) = diag.components.get("database") {
        if let Some(issue) = credential_issue(status, "postgres_oauth") {
            issues.push(issue);
        }
    }
    if diag
        .components
        .get("pool")
        .is_some_and(|s| s.state == "degraded")
    {
        issues.push("postgres_pool:not_initialized".to_string());
    }

    issues
}

/// `no_token` when nothing has ever been cached, `refresh_failed` when a
/// previously cached credential's background refresh has since failed.
fn credential_issue(status: &ComponentStatus, prefix: &str) -> Option<String> {
    if status.state != "degraded" {
        return None;
    }
    let reason = if status
        .details
        .get("last_success_seconds_ago")
        .is_some_and(|v| !v.is_null())
    {
        "refresh_failed"
    } else {
        "no_token"
    };
    Some(format!("{prefix}:{reason}"))
}

fn render_dashboard(diag: &Diagnostics) -> String {
    let mut rows = String::new();
    for (name, status) in &diag.components {
        rows.push_str(&format!(
            "<tr><td>{name}</td><td>{}</td><td>{}</td></tr>\n",
            status.state,
            status.last_error.as_deref().unwrap_or("-"),
        ));
    }
    format!(
        "<html><head><title>tileserver</title></head><body>\
         <h1>tileserver</h1>\
         <p>version {} &middot; uptime {}s &middot; host {}</p>\
         <table border=\"1\"><tr><th>component</th><th>state</th><th>last error</th></tr>\n{rows}</table>\
         </body></html>",
        diag.version, diag.uptime_seconds, diag.hostname,
    )
}
