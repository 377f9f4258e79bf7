//! Health, liveness, and readiness endpoint handlers.
//!
//! Health reports the state of the tenant store: the active snapshot
//! version, how many tenants it holds, and the last reload failure.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::AppState;

/// Returns detailed health information as JSON.
///
/// Always returns 200; `state` is `"degraded"` while the last reload
/// failed and the server keeps serving the previous snapshot.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let last_error = state.directory.last_reload_error();
    let health = if last_error.is_some() { "degraded" } else { "ok" };

    Json(json!({
        "state": health,
        "snapshot_version": state.directory.version(),
        "tenants": state.directory.tenant_count(),
        "last_reload_error": last_error,
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Liveness probe -- always returns 200 OK.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe -- 200 once a snapshot with at least one tenant is
/// published, 503 otherwise.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.directory.tenant_count() > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::network::NetworkConfig;
    use crate::store::ConfigurationStore;

    fn test_state(tree: &serde_json::Value) -> (AppState, Arc<ConfigurationStore<serde_json::Value>>) {
        let store = Arc::new(ConfigurationStore::from_tree(tree).unwrap());
        let state = AppState::new(Arc::clone(&store) as Arc<dyn crate::traits::TenantDirectory>, NetworkConfig::default());
        (state, store)
    }

    fn one_tenant() -> serde_json::Value {
        json!({ "Tenants": { "9446": { "Environments": { "xyz": {
            "Gemeenten": { "0599": {} }
        } } } } })
    }

    #[tokio::test]
    async fn health_handler_returns_json_with_all_fields() {
        let (state, _store) = test_state(&one_tenant());

        let json = health_handler(State(state)).await.0;
        assert_eq!(json["state"], "ok");
        assert_eq!(json["snapshot_version"], 1);
        assert_eq!(json["tenants"], 1);
        assert!(json["last_reload_error"].is_null());
        assert!(json["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn failed_reload_reports_degraded() {
        let (state, store) = test_state(&one_tenant());
        assert!(store.reload(&json!({ "Tenants": "nope" })).is_err());

        let json = health_handler(State(state)).await.0;
        assert_eq!(json["state"], "degraded");
        assert_eq!(json["tenants"], 1);
        assert!(json["last_reload_error"].is_string());
    }

    #[tokio::test]
    async fn readiness_follows_tenant_count() {
        let (ready, _) = test_state(&one_tenant());
        assert_eq!(readiness_handler(State(ready)).await, StatusCode::OK);

        let (empty, _) = test_state(&json!({}));
        assert_eq!(
            readiness_handler(State(empty)).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(liveness_handler().await, StatusCode::OK);
    }
}
