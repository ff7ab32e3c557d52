//! Auth middleware (C3): acquires the current storage bearer credential and
//! scopes it into the per-request reader context before the handler runs.

use std::time::Duration;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use reader_context::{RequestCredential, StorageCredential};
use tracing::warn;

use crate::state::AppState;

/// Floor below which the middleware treats the cached token as unusable and
/// acquires a fresh one, per §4.3 step 1.
const MIN_TTL: Duration = Duration::from_secs(60);

/// Never returns an error: on acquisition failure the request proceeds
/// without a credential, and any downstream reader error surfaces as a 5xx
/// from the handler that actually needed the credential.
pub async fn inject_storage_credential(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(provider) = state.storage_provider.as_ref() else {
        return next.run(request).await;
    };

    match provider.acquire_async(MIN_TTL).await {
        Ok(token) => {
            let credential =
                StorageCredential::new(state.config.storage.storage_account.clone(), token.value());
            RequestCredential::scope(credential, next.run(request)).await
        }
        Err(e) => {
            warn!(error = %e, "storage credential acquisition failed, request proceeds without credential");
            next.run(request).await
        }
    }
}
