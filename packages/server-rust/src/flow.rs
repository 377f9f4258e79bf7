//! Flow-scoped context: forwardable headers and the bound tenant.
//!
//! A *flow* is one inbound unit of work plus everything it causes. Each flow
//! owns a [`FlowContext`] stored in a tokio task-local, so two flows running
//! concurrently (even on the same worker thread) never see each other's
//! state, and nothing survives past the end of [`scope`].
//!
//! Futures awaited or joined inside the scope see the context directly.
//! Work handed to `tokio::spawn` does not; use [`spawn`] to carry the
//! current flow into the new task. Sub-tasks share the flow's header set,
//! which is a concurrent map.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tenancy_core::headers::canonical_name;
use tenancy_core::{
    HeaderConvention, HeaderSource, TenantContext, TenantCoordinates, TenantIdentifier,
};
use uuid::Uuid;

tokio::task_local! {
    static FLOW: Arc<FlowContext>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("no active flow")]
    NoActiveFlow,
    #[error("no tenant bound to the current flow")]
    NoTenantBound,
    #[error("a tenant is already bound to flow {flow_id}")]
    AlreadyBound { flow_id: Uuid },
}

// ---------------------------------------------------------------------------
// FlowContext
// ---------------------------------------------------------------------------

struct BoundTenant {
    identifier: TenantIdentifier,
    coordinates: TenantCoordinates,
    /// Holds the typed `TenantContext<O>`.
    typed: http::Extensions,
}

impl BoundTenant {
    fn new<O: Send + Sync + 'static>(tenant: TenantContext<O>) -> Self {
        let identifier = tenant.identifier().clone();
        let coordinates = tenant.coordinates().clone();
        let mut typed = http::Extensions::new();
        typed.insert(tenant);
        Self {
            identifier,
            coordinates,
            typed,
        }
    }
}

/// State of one flow.
pub struct FlowContext {
    id: Uuid,
    /// Forwardable headers of the inbound unit of work, as received.
    inbound: Vec<(String, String)>,
    /// Lowercase name -> (name, value).
    headers: DashMap<String, (String, String)>,
    tenant: OnceLock<BoundTenant>,
}

impl FlowContext {
    /// An empty flow.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            inbound: Vec::new(),
            headers: DashMap::new(),
            tenant: OnceLock::new(),
        }
    }

    /// A flow seeded with the forwardable headers of an inbound unit of work.
    #[must_use]
    pub fn from_inbound<H: HeaderSource + ?Sized>(convention: &HeaderConvention, source: &H) -> Self {
        let inbound = convention.forwardable(source);
        let headers = DashMap::with_capacity(inbound.len());
        for (name, value) in &inbound {
            headers.insert(name.to_lowercase(), (name.clone(), value.clone()));
        }
        Self {
            id: Uuid::new_v4(),
            inbound,
            headers,
            tenant: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Forwardable headers captured from the inbound unit of work.
    #[must_use]
    pub fn inbound_headers(&self) -> &[(String, String)] {
        &self.inbound
    }

    pub fn set_header(&self, key: &str, value: impl Into<String>) {
        let name = canonical_name(key).to_string();
        self.headers.insert(key.to_lowercase(), (name, value.into()));
    }

    /// Case-insensitive lookup.
    #[must_use]
    pub fn header(&self, key: &str) -> Option<String> {
        self.headers
            .get(&key.to_lowercase())
            .map(|entry| entry.value().1.clone())
    }

    /// Copy of the current header set.
    #[must_use]
    pub fn headers(&self) -> HashMap<String, String> {
        self.headers
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn clear(&self) {
        self.headers.clear();
    }

    /// This flow bound to `tenant`, replacing any earlier binding.
    ///
    /// Used while the flow is still owned by its resolver; shared flows go
    /// through [`FlowContext::bind`].
    #[must_use]
    pub fn with_tenant<O: Send + Sync + 'static>(mut self, tenant: TenantContext<O>) -> Self {
        self.tenant = OnceLock::from(BoundTenant::new(tenant));
        self
    }

    /// Attach the resolved tenant. A flow is bound at most once.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::AlreadyBound`] if a tenant is already attached.
    pub fn bind<O: Send + Sync + 'static>(&self, tenant: TenantContext<O>) -> Result<(), FlowError> {
        self.tenant
            .set(BoundTenant::new(tenant))
            .map_err(|_| FlowError::AlreadyBound { flow_id: self.id })
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.tenant.get().is_some()
    }

    /// The bound tenant, if one of type `TenantContext<O>` is attached.
    #[must_use]
    pub fn tenant<O: Send + Sync + 'static>(&self) -> Option<TenantContext<O>> {
        self.tenant
            .get()
            .and_then(|bound| bound.typed.get::<TenantContext<O>>())
            .cloned()
    }

    #[must_use]
    pub fn tenant_identifier(&self) -> Option<TenantIdentifier> {
        self.tenant.get().map(|bound| bound.identifier.clone())
    }

    #[must_use]
    pub fn coordinates(&self) -> Option<TenantCoordinates> {
        self.tenant.get().map(|bound| bound.coordinates.clone())
    }
}

impl Default for FlowContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FlowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowContext")
            .field("id", &self.id)
            .field("headers", &self.headers.len())
            .field("tenant", &self.tenant_identifier())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Scope and propagation
// ---------------------------------------------------------------------------

/// Runs `fut` as the flow `ctx`. The context is gone once `fut` completes.
pub async fn scope<F: Future>(ctx: Arc<FlowContext>, fut: F) -> F::Output {
    FLOW.scope(ctx, fut).await
}

/// Runs the synchronous `f` as the flow `ctx`.
///
/// Used where a service builds its future eagerly in `call`.
pub fn sync_scope<R>(ctx: Arc<FlowContext>, f: impl FnOnce() -> R) -> R {
    FLOW.sync_scope(ctx, f)
}

/// The current flow, if any.
#[must_use]
pub fn current() -> Option<Arc<FlowContext>> {
    FLOW.try_with(Arc::clone).ok()
}

/// `tokio::spawn` that carries the current flow into the new task.
///
/// Outside a flow this is a plain spawn.
pub fn spawn<F>(fut: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match current() {
        Some(ctx) => tokio::spawn(FLOW.scope(ctx, fut)),
        None => tokio::spawn(fut),
    }
}

// ---------------------------------------------------------------------------
// Header context of the current flow
// ---------------------------------------------------------------------------

/// Sets a header for the current flow only.
///
/// # Errors
///
/// Returns [`FlowError::NoActiveFlow`] outside a flow.
pub fn set_header(key: &str, value: impl Into<String>) -> Result<(), FlowError> {
    let ctx = current().ok_or(FlowError::NoActiveFlow)?;
    ctx.set_header(key, value);
    Ok(())
}

/// Header set of the current flow; empty outside a flow.
#[must_use]
pub fn headers() -> HashMap<String, String> {
    current().map(|ctx| ctx.headers()).unwrap_or_default()
}

#[must_use]
pub fn try_get_header(key: &str) -> Option<String> {
    current().and_then(|ctx| ctx.header(key))
}

/// Empties the current flow's header set. No-op outside a flow.
pub fn clear() {
    if let Some(ctx) = current() {
        ctx.clear();
    }
}

/// Typed tenant bound to the current flow.
#[must_use]
pub fn current_tenant<O: Send + Sync + 'static>() -> Option<TenantContext<O>> {
    current().and_then(|ctx| ctx.tenant::<O>())
}

#[must_use]
pub fn current_coordinates() -> Option<TenantCoordinates> {
    current().and_then(|ctx| ctx.coordinates())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
