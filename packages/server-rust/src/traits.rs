use async_trait::async_trait;
use serde_json::Value;
use tenancy_core::{ConfigError, OutgoingMessage};

/// Produces the full configuration tree the tenant store is built from.
///
/// Implementations: JSON file, environment variables, flat key/value
/// pairs, in-memory (tests), and a layered combination of those.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Load a complete tree. Every call returns a full snapshot, never a
    /// delta.
    async fn load(&self) -> Result<Value, ConfigError>;
}

/// Mutates a message produced during a flow, before it is dispatched.
///
/// Used as `Arc<dyn OutgoingMutator>`; mutators run in registration order.
pub trait OutgoingMutator: Send + Sync {
    fn mutate(&self, message: &mut OutgoingMessage);
}

/// Type-erased view of a tenant store for operational endpoints.
pub trait TenantDirectory: Send + Sync {
    /// Version of the active snapshot.
    fn version(&self) -> u64;

    fn tenant_count(&self) -> usize;

    fn last_reload_error(&self) -> Option<String>;

    /// Identifiers in the store's stable order, paged.
    fn identifiers(&self, take: usize, skip: usize) -> Vec<String>;
}
