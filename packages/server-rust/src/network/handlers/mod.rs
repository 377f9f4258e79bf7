//! Operational HTTP handlers for the tenancy server.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for convenient access
//! when building the router.

pub mod health;
pub mod tenants;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use tenants::tenants_handler;

use std::sync::Arc;
use std::time::Instant;

use super::NetworkConfig;
use crate::traits::TenantDirectory;

/// Shared state of the operational routes.
///
/// Holds `Arc` references so cloning is cheap. The store is type-erased so
/// these routes do not depend on the tenant options type.
#[derive(Clone)]
pub struct AppState {
    /// The tenant store being served.
    pub directory: Arc<dyn TenantDirectory>,
    /// Network configuration (bind address, CORS, timeouts).
    pub config: Arc<NetworkConfig>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(directory: Arc<dyn TenantDirectory>, config: NetworkConfig) -> Self {
        Self {
            directory,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }
}
