use std::sync::Arc;

use crate::error::StoreError;
use crate::types::{TenantIdentifier, TenantRecord};

/// Read access to a set of tenant records.
///
/// Configuration-backed stores are read-only: `add`, `update` and `remove`
/// exist for interface compatibility and always fail with
/// [`StoreError::NotSupported`].
pub trait TenantStore<O>: Send + Sync {
    /// Case-insensitive lookup; `None` when absent.
    fn get_by_identifier(&self, identifier: &str) -> Option<Arc<TenantRecord<O>>>;

    /// Same as [`TenantStore::get_by_identifier`]: the identifier is the id.
    fn get_by_id(&self, id: &str) -> Option<Arc<TenantRecord<O>>> {
        self.get_by_identifier(id)
    }

    /// All records in a stable order.
    fn get_all(&self) -> Vec<Arc<TenantRecord<O>>>;

    /// Offset/limit window over the order of [`TenantStore::get_all`].
    fn get_all_paged(&self, take: usize, skip: usize) -> Vec<Arc<TenantRecord<O>>>;

    /// # Errors
    ///
    /// Always [`StoreError::NotSupported`] for configuration-backed stores.
    fn add(&self, record: TenantRecord<O>) -> Result<(), StoreError>;

    /// # Errors
    ///
    /// Always [`StoreError::NotSupported`] for configuration-backed stores.
    fn update(&self, record: TenantRecord<O>) -> Result<(), StoreError>;

    /// # Errors
    ///
    /// Always [`StoreError::NotSupported`] for configuration-backed stores.
    fn remove(&self, identifier: &TenantIdentifier) -> Result<(), StoreError>;
}
