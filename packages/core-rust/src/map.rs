//! Immutable identifier-keyed tenant map built from a configuration tree.
//!
//! Layout of the tree (section names are case-insensitive):
//!
//! ```text
//! Tenants/{tenantCode}/Environments/{environmentName}/Defaults/*
//! Tenants/{tenantCode}/Environments/{environmentName}/Gemeenten/{gemeenteCode}/*
//! ```
//!
//! Every `(tenant, environment, gemeente)` triple becomes one record whose
//! payload is `Defaults` with the gemeente subtree merged on top.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ConfigError, StoreError};
use crate::traits::TenantStore;
use crate::tree;
use crate::types::{TenantCoordinates, TenantIdentifier, TenantRecord};

pub const TENANTS_SECTION: &str = "Tenants";
pub const ENVIRONMENTS_SECTION: &str = "Environments";
pub const DEFAULTS_SECTION: &str = "Defaults";
pub const GEMEENTEN_SECTION: &str = "Gemeenten";
pub const CONNECTION_STRING_KEY: &str = "ConnectionString";

// ---------------------------------------------------------------------------
// TenantMap
// ---------------------------------------------------------------------------

/// One published version of the tenant configuration.
///
/// Keys are lowercase identifiers; iteration order (ascending key) is the
/// stable order used by [`TenantStore::get_all`] and pagination.
#[derive(Debug)]
pub struct TenantMap<O> {
    version: u64,
    records: BTreeMap<String, Arc<TenantRecord<O>>>,
}

impl<O> TenantMap<O> {
    #[must_use]
    pub fn empty(version: u64) -> Self {
        Self {
            version,
            records: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Case-insensitive lookup.
    #[must_use]
    pub fn get(&self, identifier: &str) -> Option<&Arc<TenantRecord<O>>> {
        self.records.get(&identifier.to_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<TenantRecord<O>>> {
        self.records.values()
    }

    /// Offset/limit window over the stable order.
    pub fn page(&self, take: usize, skip: usize) -> impl Iterator<Item = &Arc<TenantRecord<O>>> {
        self.records.values().skip(skip).take(take)
    }
}

impl<O: DeserializeOwned> TenantMap<O> {
    /// Builds a map from a configuration tree.
    ///
    /// A tree without a `Tenants` section yields an empty map.
    ///
    /// # Errors
    ///
    /// Fails as a whole when the tree is malformed, when any tenant lacks an
    /// identifier, when two tenants share an identifier (case-insensitively)
    /// or when a payload does not deserialize into `O`.
    pub fn build(tree: &Value, version: u64) -> Result<Self, ConfigError> {
        let mut records = BTreeMap::new();

        let Some(tenants) = tree::child(tree, TENANTS_SECTION) else {
            return Ok(Self::empty(version));
        };

        for (tenant_code, tenant) in object(tenants, TENANTS_SECTION)? {
            let tenant_path = format!("{TENANTS_SECTION}:{tenant_code}");
            let Some(environments) = tree::child(tenant, ENVIRONMENTS_SECTION) else {
                continue;
            };
            let environments_path = format!("{tenant_path}:{ENVIRONMENTS_SECTION}");

            for (environment_name, environment) in object(environments, &environments_path)? {
                let environment_path = format!("{environments_path}:{environment_name}");
                let defaults = tree::child(environment, DEFAULTS_SECTION)
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Map::new()));
                let Some(gemeenten) = tree::child(environment, GEMEENTEN_SECTION) else {
                    continue;
                };
                let gemeenten_path = format!("{environment_path}:{GEMEENTEN_SECTION}");

                for (gemeente_code, overrides) in object(gemeenten, &gemeenten_path)? {
                    let coordinates =
                        TenantCoordinates::new(tenant_code, environment_name, gemeente_code);
                    let record = build_record(
                        coordinates,
                        &defaults,
                        overrides,
                        &format!("{gemeenten_path}:{gemeente_code}"),
                    )?;

                    let key = record.identifier.key();
                    if records.contains_key(&key) {
                        return Err(ConfigError::DuplicateIdentifier {
                            identifier: record.identifier.to_string(),
                        });
                    }
                    records.insert(key, Arc::new(record));
                }
            }
        }

        debug!(version, tenants = records.len(), "tenant map built");
        Ok(Self { version, records })
    }
}

fn build_record<O: DeserializeOwned>(
    coordinates: TenantCoordinates,
    defaults: &Value,
    overrides: &Value,
    path: &str,
) -> Result<TenantRecord<O>, ConfigError> {
    if !coordinates.is_complete() {
        return Err(ConfigError::MissingIdentifier {
            path: path.to_string(),
        });
    }
    let identifier = coordinates.identifier();

    let mut payload = defaults.clone();
    tree::merge(&mut payload, overrides);

    let connection_string = tree::string_child(&payload, CONNECTION_STRING_KEY);
    let options = O::deserialize(&payload).map_err(|source| ConfigError::InvalidTenant {
        identifier: identifier.to_string(),
        source,
    })?;

    Ok(TenantRecord {
        identifier,
        coordinates,
        connection_string,
        options,
    })
}

fn object<'a>(node: &'a Value, path: &str) -> Result<&'a Map<String, Value>, ConfigError> {
    node.as_object().ok_or_else(|| ConfigError::InvalidTree {
        path: path.to_string(),
        reason: "expected a section".to_string(),
    })
}

// ---------------------------------------------------------------------------
// TenantStore impl
// ---------------------------------------------------------------------------

impl<O: Send + Sync> TenantStore<O> for TenantMap<O> {
    fn get_by_identifier(&self, identifier: &str) -> Option<Arc<TenantRecord<O>>> {
        self.get(identifier).cloned()
    }

    fn get_all(&self) -> Vec<Arc<TenantRecord<O>>> {
        self.iter().cloned().collect()
    }

    fn get_all_paged(&self, take: usize, skip: usize) -> Vec<Arc<TenantRecord<O>>> {
        self.page(take, skip).cloned().collect()
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
