//! Live tenant store backed by an atomically swapped [`TenantMap`].
//!
//! Rebuilds happen off to the side; the finished map is published with a
//! single `ArcSwap::store`. Readers never block and never observe a
//! half-built map. A failed rebuild leaves the previous map active.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::{Mutex, MutexGuard};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tenancy_core::{
    ConfigError, StoreError, TenantIdentifier, TenantMap, TenantRecord, TenantStore,
};
use tracing::{info, warn};

use crate::traits::{ConfigSource, TenantDirectory};

/// Tenant store built from a configuration tree, reloadable at runtime.
pub struct ConfigurationStore<O> {
    current: ArcSwap<TenantMap<O>>,
    /// Serializes rebuilds so versions are published in order and without
    /// gaps.
    reload_lock: Mutex<()>,
    /// Tree behind the active snapshot, for change detection.
    applied: Mutex<Value>,
    last_error: Mutex<Option<String>>,
}

impl<O> ConfigurationStore<O>
where
    O: DeserializeOwned + Send + Sync + 'static,
{
    /// Builds the first snapshot (version 1).
    ///
    /// # Errors
    ///
    /// Returns the build error; there is no previous snapshot to fall back
    /// to, so callers should treat this as a startup failure.
    pub fn from_tree(tree: &Value) -> Result<Self, ConfigError> {
        let map = TenantMap::build(tree, 1)?;
        info!(version = 1, tenants = map.len(), "tenant store initialized");
        Ok(Self {
            current: ArcSwap::from_pointee(map),
            reload_lock: Mutex::new(()),
            applied: Mutex::new(tree.clone()),
            last_error: Mutex::new(None),
        })
    }

    /// Loads the source once and builds the first snapshot.
    ///
    /// # Errors
    ///
    /// Returns the source or build error.
    pub async fn from_source(source: &dyn ConfigSource) -> Result<Self, ConfigError> {
        let tree = source.load().await?;
        Self::from_tree(&tree)
    }

    /// Rebuilds from `tree` and publishes the result.
    ///
    /// Returns the version of the newly published snapshot.
    ///
    /// # Errors
    ///
    /// Returns the build error; the previously published snapshot stays
    /// active.
    pub fn reload(&self, tree: &Value) -> Result<u64, ConfigError> {
        let guard = self.reload_lock.lock();
        self.rebuild(tree, &guard)
    }

    /// Like [`ConfigurationStore::reload`], but does nothing when `tree`
    /// equals the tree behind the active snapshot.
    ///
    /// Returns `Ok(None)` when nothing changed.
    ///
    /// # Errors
    ///
    /// Returns the build error; the previously published snapshot stays
    /// active.
    pub fn reload_if_changed(&self, tree: &Value) -> Result<Option<u64>, ConfigError> {
        let guard = self.reload_lock.lock();
        if *self.applied.lock() == *tree {
            return Ok(None);
        }
        self.rebuild(tree, &guard).map(Some)
    }

    /// Caller holds `reload_lock`; the version is only consumed on success.
    fn rebuild(&self, tree: &Value, _guard: &MutexGuard<'_, ()>) -> Result<u64, ConfigError> {
        let version = self.version() + 1;

        match TenantMap::build(tree, version) {
            Ok(map) => {
                let tenants = map.len();
                self.current.store(Arc::new(map));
                *self.applied.lock() = tree.clone();
                *self.last_error.lock() = None;
                metrics::counter!("tenancy_reloads_total", "outcome" => "ok").increment(1);
                info!(version, tenants, "tenant store reloaded");
                Ok(version)
            }
            Err(e) => {
                *self.last_error.lock() = Some(e.to_string());
                metrics::counter!("tenancy_reloads_total", "outcome" => "error").increment(1);
                warn!(
                    error = %e,
                    active_version = self.version(),
                    "tenant store reload failed; keeping previous snapshot"
                );
                Err(e)
            }
        }
    }
}

impl<O> ConfigurationStore<O> {
    /// The active snapshot. Holding it pins that version for the caller.
    #[must_use]
    pub fn snapshot(&self) -> Arc<TenantMap<O>> {
        self.current.load_full()
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.current.load().version()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }

    /// Error of the most recent reload, cleared by the next successful one.
    #[must_use]
    pub fn last_reload_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }
}

impl<O: Send + Sync> TenantStore<O> for ConfigurationStore<O> {
    fn get_by_identifier(&self, identifier: &str) -> Option<Arc<TenantRecord<O>>> {
        self.current.load().get(identifier).cloned()
    }

    fn get_all(&self) -> Vec<Arc<TenantRecord<O>>> {
        self.current.load().iter().cloned().collect()
    }

    fn get_all_paged(&self, take: usize, skip: usize) -> Vec<Arc<TenantRecord<O>>> {
        self.current.load().page(take, skip).cloned().collect()
    }

    fn add(&self, _record: TenantRecord<O>) -> Result<(), StoreError> {
        Err(StoreError::NotSupported { operation: "add" })
    }

    fn update(&self, _record: TenantRecord<O>) -> Result<(), StoreError> {
        Err(StoreError::NotSupported { operation: "update" })
    }

    fn remove(&self, _identifier: &TenantIdentifier) -> Result<(), StoreError> {
        Err(StoreError::NotSupported { operation: "remove" })
    }
}

impl<O: Send + Sync> TenantDirectory for ConfigurationStore<O> {
    fn version(&self) -> u64 {
        ConfigurationStore::version(self)
    }

    fn tenant_count(&self) -> usize {
        self.len()
    }

    fn last_reload_error(&self) -> Option<String> {
        ConfigurationStore::last_reload_error(self)
    }

    fn identifiers(&self, take: usize, skip: usize) -> Vec<String> {
        self.current
            .load()
            .page(take, skip)
            .map(|record| record.identifier.to_string())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
