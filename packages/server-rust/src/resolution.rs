//! Per-unit-of-work tenant resolution.
//!
//! [`TenantResolution::resolve`] walks one inbound unit of work through
//! `Received -> HeadersCaptured -> Resolving -> Bound | Failed` and, on
//! success, returns a [`ResolvedFlow`] whose [`ResolvedFlow::run`] executes
//! downstream code inside the new flow. On failure nothing downstream runs.
//!
//! Transport adapters live in `network::tenant` (HTTP) and
//! `service::middleware::resolution` (messages).

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tenancy_core::{
    HeaderConvention, HeaderSource, LenientResolver, ResolveError, StrictResolver,
    TenantContext, TenantIdentifierResolver, Transport,
};
use tracing::debug;

use crate::flow::{self, FlowContext};
use crate::store::ConfigurationStore;

/// Callback run after a tenant is bound and before downstream code runs.
pub type ResolvedHook<O> = Arc<dyn Fn(&TenantContext<O>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    Received,
    HeadersCaptured,
    Resolving,
    Bound,
    Failed,
}

impl ResolutionState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::HeadersCaptured => "headers_captured",
            Self::Resolving => "resolving",
            Self::Bound => "bound",
            Self::Failed => "failed",
        }
    }
}

/// Why a unit of work could not be bound to a tenant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    #[error("tenant {identifier} not found")]
    TenantNotFound { identifier: String },
    #[error(transparent)]
    MissingHeader(#[from] ResolveError),
}

// ---------------------------------------------------------------------------
// TenantResolution
// ---------------------------------------------------------------------------

/// Resolves inbound units of work against a [`ConfigurationStore`].
pub struct TenantResolution<O> {
    store: Arc<ConfigurationStore<O>>,
    resolver: Arc<dyn TenantIdentifierResolver>,
    transport: Transport,
    convention: HeaderConvention,
    on_resolved: Option<ResolvedHook<O>>,
}

impl<O> Clone for TenantResolution<O> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            resolver: Arc::clone(&self.resolver),
            transport: self.transport,
            convention: self.convention.clone(),
            on_resolved: self.on_resolved.clone(),
        }
    }
}

impl<O> fmt::Debug for TenantResolution<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantResolution")
            .field("transport", &self.transport)
            .field("convention", &self.convention)
            .field("on_resolved", &self.on_resolved.is_some())
            .finish_non_exhaustive()
    }
}

impl<O: Send + Sync + 'static> TenantResolution<O> {
    /// HTTP flavour: missing headers become empty identifier segments.
    #[must_use]
    pub fn http(store: Arc<ConfigurationStore<O>>) -> Self {
        Self::new(store, Arc::new(LenientResolver), Transport::Http)
    }

    /// Message flavour: a missing header fails the unit of work.
    #[must_use]
    pub fn message(store: Arc<ConfigurationStore<O>>) -> Self {
        Self::new(store, Arc::new(StrictResolver), Transport::Message)
    }

    #[must_use]
    pub fn new(
        store: Arc<ConfigurationStore<O>>,
        resolver: Arc<dyn TenantIdentifierResolver>,
        transport: Transport,
    ) -> Self {
        Self {
            store,
            resolver,
            transport,
            convention: HeaderConvention::default(),
            on_resolved: None,
        }
    }

    #[must_use]
    pub fn with_convention(mut self, convention: HeaderConvention) -> Self {
        self.convention = convention;
        self
    }

    #[must_use]
    pub fn on_resolved(mut self, hook: impl Fn(&TenantContext<O>) + Send + Sync + 'static) -> Self {
        self.on_resolved = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<ConfigurationStore<O>> {
        &self.store
    }

    #[must_use]
    pub fn transport(&self) -> Transport {
        self.transport
    }

    #[must_use]
    pub fn convention(&self) -> &HeaderConvention {
        &self.convention
    }

    /// Resolves the tenant for one inbound unit of work.
    ///
    /// # Errors
    ///
    /// [`ResolutionError::MissingHeader`] when the resolver rejects the
    /// header set, [`ResolutionError::TenantNotFound`] when the identifier
    /// is not in the active snapshot.
    pub fn resolve(&self, headers: &dyn HeaderSource) -> Result<ResolvedFlow<O>, ResolutionError> {
        let transport = self.transport.as_str();
        trace_state(ResolutionState::Received, transport);

        let flow = FlowContext::from_inbound(&self.convention, headers);
        trace_state(ResolutionState::HeadersCaptured, transport);

        trace_state(ResolutionState::Resolving, transport);
        let result = self.lookup(headers);

        match result {
            Ok(tenant) => {
                let flow = Arc::new(flow.with_tenant(tenant.clone()));
                if let Some(hook) = &self.on_resolved {
                    hook(&tenant);
                }
                debug!(
                    state = ResolutionState::Bound.as_str(),
                    transport,
                    flow_id = %flow.id(),
                    tenant = %tenant.identifier(),
                    snapshot_version = tenant.snapshot_version,
                    "tenant bound"
                );
                metrics::counter!(
                    "tenancy_resolutions_total",
                    "transport" => transport,
                    "outcome" => "bound"
                )
                .increment(1);
                Ok(ResolvedFlow { flow, tenant })
            }
            Err(e) => {
                debug!(
                    state = ResolutionState::Failed.as_str(),
                    transport,
                    flow_id = %flow.id(),
                    error = %e,
                    "tenant resolution failed"
                );
                metrics::counter!(
                    "tenancy_resolutions_total",
                    "transport" => transport,
                    "outcome" => "failed"
                )
                .increment(1);
                Err(e)
            }
        }
    }

    fn lookup(&self, headers: &dyn HeaderSource) -> Result<TenantContext<O>, ResolutionError> {
        let identifier = self.resolver.resolve(headers)?;
        let snapshot = self.store.snapshot();
        let record = snapshot
            .get(identifier.as_str())
            .cloned()
            .ok_or_else(|| ResolutionError::TenantNotFound {
                identifier: identifier.to_string(),
            })?;
        Ok(TenantContext::new(record, snapshot.version(), self.transport))
    }
}

fn trace_state(state: ResolutionState, transport: &'static str) {
    debug!(state = state.as_str(), transport, "tenant resolution");
}

// ---------------------------------------------------------------------------
// ResolvedFlow
// ---------------------------------------------------------------------------

/// A flow bound to its tenant, ready to run downstream code.
pub struct ResolvedFlow<O> {
    flow: Arc<FlowContext>,
    tenant: TenantContext<O>,
}

impl<O> ResolvedFlow<O> {
    #[must_use]
    pub fn tenant(&self) -> &TenantContext<O> {
        &self.tenant
    }

    #[must_use]
    pub fn flow(&self) -> &Arc<FlowContext> {
        &self.flow
    }

    /// Runs `fut` inside the flow; the flow ends when `fut` completes.
    pub async fn run<F: Future>(self, fut: F) -> F::Output {
        flow::scope(self.flow, fut).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
