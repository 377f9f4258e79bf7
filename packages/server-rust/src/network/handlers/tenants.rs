//! Paged listing of the tenants in the active snapshot.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::AppState;

/// Page size when `take` is not given.
pub const DEFAULT_TAKE: usize = 50;

#[derive(Debug, Default, Deserialize)]
pub struct Paging {
    pub take: Option<usize>,
    pub skip: Option<usize>,
}

/// `GET /tenants?take&skip` -- identifiers in the store's stable order.
pub async fn tenants_handler(
    State(state): State<AppState>,
    Query(paging): Query<Paging>,
) -> Json<serde_json::Value> {
    let take = paging.take.unwrap_or(DEFAULT_TAKE);
    let skip = paging.skip.unwrap_or(0);
    let identifiers = state.directory.identifiers(take, skip);

    Json(json!({
        "snapshot_version": state.directory.version(),
        "total": state.directory.tenant_count(),
        "take": take,
        "skip": skip,
        "identifiers": identifiers,
    }))
}
