//! Tenant resolution for HTTP requests.
//!
//! [`resolve_tenant`] is an axum middleware (attach with
//! `axum::middleware::from_fn_with_state`) that resolves the tenant from
//! the request headers, then runs the rest of the request inside the flow.
//! Handlers read the tenant with the [`Tenant`] extractor or through
//! `flow::current_tenant`.

use std::ops::Deref;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tenancy_core::TenantContext;

use crate::flow;
use crate::resolution::{ResolutionError, TenantResolution};

/// Resolves the request's tenant; unresolvable requests never reach the
/// handler.
pub async fn resolve_tenant<O>(
    State(resolution): State<TenantResolution<O>>,
    mut request: Request,
    next: Next,
) -> Response
where
    O: Send + Sync + 'static,
{
    match resolution.resolve(request.headers()) {
        Ok(resolved) => {
            request.extensions_mut().insert(resolved.tenant().clone());
            resolved.run(next.run(request)).await
        }
        Err(e) => e.into_response(),
    }
}

impl IntoResponse for ResolutionError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::TenantNotFound { .. } => StatusCode::NOT_FOUND,
            Self::MissingHeader(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Tenant extractor
// ---------------------------------------------------------------------------

/// The tenant bound to the current request.
///
/// Rejects with 500 when the route is not behind [`resolve_tenant`] for the
/// same options type.
#[derive(Debug, Clone)]
pub struct Tenant<O>(pub TenantContext<O>);

impl<O> Deref for Tenant<O> {
    type Target = TenantContext<O>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<O, S> FromRequestParts<S> for Tenant<O>
where
    O: Send + Sync + 'static,
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantContext<O>>()
            .cloned()
            .or_else(flow::current_tenant::<O>)
            .map(Tenant)
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "no tenant bound to request"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::routing::get;
    use axum::Router;
    use tenancy_core::headers::{ENVIRONMENT_NAME, GEMEENTE_CODE, TENANT_CODE};
    use tower::ServiceExt;

    use super::*;
    use crate::store::ConfigurationStore;

    fn resolution() -> TenantResolution<serde_json::Value> {
        let tree = json!({
            "Tenants": { "9446": { "Environments": { "xyz": {
                "Gemeenten": { "0599": { "Hoofdgemeente": "H0599" } }
            } } } }
        });
        TenantResolution::http(Arc::new(ConfigurationStore::from_tree(&tree).unwrap()))
    }

    async fn whoami(Tenant(tenant): Tenant<serde_json::Value>) -> String {
        let from_flow = flow::current_coordinates().map(|c| c.gemeente_code);
        format!(
            "{} {} {}",
            tenant.identifier(),
            tenant.options["Hoofdgemeente"].as_str().unwrap_or_default(),
            from_flow.unwrap_or_default()
        )
    }

    fn app() -> Router {
        let resolution = resolution();
        Router::new()
            .route("/whoami", get(whoami))
            .layer(axum::middleware::from_fn_with_state(
                resolution,
                resolve_tenant::<serde_json::Value>,
            ))
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn request_runs_inside_the_tenant_flow() {
        let request = Request::builder()
            .uri("/whoami")
            .header(TENANT_CODE, "9446")
            .header(ENVIRONMENT_NAME, "XYZ")
            .header(GEMEENTE_CODE, "0599")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "9446-xyz-0599 H0599 0599");
    }

    #[tokio::test]
    async fn unknown_tenant_is_404_with_json_error() {
        let request = Request::builder()
            .uri("/whoami")
            .header(TENANT_CODE, "9446")
            .header(ENVIRONMENT_NAME, "xyz")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["error"], "tenant 9446-xyz- not found");
    }

    #[tokio::test]
    async fn repeated_tenant_header_binds_and_captures_the_first_value() {
        async fn gemeente(Tenant(tenant): Tenant<serde_json::Value>) -> String {
            format!(
                "{} {}",
                tenant.coordinates().gemeente_code,
                flow::try_get_header(GEMEENTE_CODE).unwrap_or_default()
            )
        }

        let router = Router::new()
            .route("/gemeente", get(gemeente))
            .layer(axum::middleware::from_fn_with_state(
                resolution(),
                resolve_tenant::<serde_json::Value>,
            ));
        let request = Request::builder()
            .uri("/gemeente")
            .header(TENANT_CODE, "9446")
            .header(ENVIRONMENT_NAME, "xyz")
            .header(GEMEENTE_CODE, "0599")
            .header(GEMEENTE_CODE, "0518")
            .body(Body::empty())
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "0599 0599");
    }

    #[test]
    fn missing_header_maps_to_bad_request() {
        let err = ResolutionError::MissingHeader(tenancy_core::ResolveError::MissingHeader {
            name: GEMEENTE_CODE,
        });
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn extractor_rejects_outside_resolution() {
        let router: Router = Router::new().route("/whoami", get(whoami));
        let request = Request::builder().uri("/whoami").body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
