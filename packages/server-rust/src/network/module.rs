//! Network module with deferred startup lifecycle.
//!
//! Implements the deferred startup pattern: `new()` holds configuration,
//! `start()` binds the TCP listener, and `serve()` starts accepting
//! connections. Between `start()` and `serve()` the caller learns the bound
//! port and finishes wiring the store, reload worker and router.

use std::future::Future;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use super::config::NetworkConfig;
use super::handlers::{
    health_handler, liveness_handler, readiness_handler, tenants_handler, AppState,
};
use super::middleware::build_http_layers;
use super::tenant::resolve_tenant;
use crate::resolution::TenantResolution;

/// Assembles the full HTTP router.
///
/// Routes:
/// - `GET /health` -- store health JSON
/// - `GET /health/live` -- liveness probe
/// - `GET /health/ready` -- readiness probe
/// - `GET /tenants` -- paged tenant identifiers
/// - everything in `app`, behind tenant resolution
///
/// Operational routes do not require tenant headers.
pub fn build_router<O>(state: AppState, resolution: TenantResolution<O>, app: Router) -> Router
where
    O: Send + Sync + 'static,
{
    let layers = build_http_layers(&state.config);

    let tenant_routes = app.layer(axum::middleware::from_fn_with_state(
        resolution,
        resolve_tenant::<O>,
    ));

    let operational = Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .route("/tenants", get(tenants_handler))
        .with_state(state);

    operational.merge(tenant_routes).layer(layers)
}

/// Manages the HTTP server lifecycle.
///
/// 1. `new()` -- stores configuration
/// 2. `start()` -- binds TCP listener to the configured address
/// 3. `serve()` -- serves a router until shutdown is signalled
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            listener: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!(host = %self.config.host, port, "TCP listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves `router` until the shutdown signal fires, then lets in-flight
    /// requests finish.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or the server
    /// hits a fatal I/O error.
    pub async fn serve(
        self,
        router: Router,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;

        info!("serving HTTP connections");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("HTTP server stopped");
        Ok(())
    }
}
