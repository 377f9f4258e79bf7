//! Per-tenant option projection.
//!
//! An [`OptionsProjector`] turns the record of the tenant bound to the
//! current flow into an application settings object. Projections are cached
//! per tenant and snapshot version; publishing a newer snapshot evicts the
//! older entries.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tenancy_core::{TenantContext, TenantRecord};

use crate::flow::{self, FlowError};

/// The built-in projection: the tenant's coordinates and identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TenantOptions {
    pub identifier: String,
    pub tenant_code: String,
    pub environment_name: String,
    pub gemeente_code: String,
}

impl TenantOptions {
    #[must_use]
    pub fn from_record<O>(record: &TenantRecord<O>) -> Self {
        Self {
            identifier: record.identifier.to_string(),
            tenant_code: record.tenant_code().to_string(),
            environment_name: record.environment_name().to_string(),
            gemeente_code: record.gemeente_code().to_string(),
        }
    }
}

type Projection<O, T> = dyn Fn(&TenantRecord<O>) -> T + Send + Sync;

/// Projects tenant records into `T`, caching one value per tenant.
pub struct OptionsProjector<O, T> {
    project: Arc<Projection<O, T>>,
    /// (snapshot version, lowercase identifier) -> projection.
    cache: DashMap<(u64, String), Arc<T>>,
    latest_version: AtomicU64,
}

impl<O, T> OptionsProjector<O, T>
where
    O: Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    #[must_use]
    pub fn new(project: impl Fn(&TenantRecord<O>) -> T + Send + Sync + 'static) -> Self {
        Self {
            project: Arc::new(project),
            cache: DashMap::new(),
            latest_version: AtomicU64::new(0),
        }
    }

    /// Projection for an explicit tenant.
    pub fn get(&self, tenant: &TenantContext<O>) -> Arc<T> {
        let version = tenant.snapshot_version;
        let previous = self.latest_version.fetch_max(version, Ordering::AcqRel);
        if version > previous {
            self.cache.retain(|(v, _), _| *v >= version);
        } else if version < previous {
            // Flow still running on an older snapshot.
            return Arc::new((self.project)(tenant.record()));
        }

        let key = (version, tenant.identifier().key());
        Arc::clone(
            self.cache
                .entry(key)
                .or_insert_with(|| Arc::new((self.project)(tenant.record())))
                .value(),
        )
    }

    /// Projection for the tenant bound to the current flow.
    ///
    /// # Errors
    ///
    /// [`FlowError::NoActiveFlow`] outside a flow,
    /// [`FlowError::NoTenantBound`] when the flow has no tenant of type `O`.
    pub fn current(&self) -> Result<Arc<T>, FlowError> {
        let ctx = flow::current().ok_or(FlowError::NoActiveFlow)?;
        let tenant = ctx.tenant::<O>().ok_or(FlowError::NoTenantBound)?;
        Ok(self.get(&tenant))
    }

    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

impl<O> OptionsProjector<O, TenantOptions>
where
    O: Send + Sync + 'static,
{
    /// Projector for [`TenantOptions`].
    #[must_use]
    pub fn coordinates() -> Self {
        Self::new(TenantOptions::from_record)
    }
}

impl<O, T> fmt::Debug for OptionsProjector<O, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionsProjector")
            .field("cached", &self.cache.len())
            .field("latest_version", &self.latest_version.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
