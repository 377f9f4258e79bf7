//! HTTP surface: configuration, middleware, tenant resolution, and the
//! operational handlers.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod tenant;

pub use config::NetworkConfig;
pub use handlers::AppState;
pub use module::{build_router, NetworkModule};
pub use tenant::{resolve_tenant, Tenant};
