//! Error types shared by the tenancy crates.

/// Errors raised while building a tenant map from a configuration tree.
///
/// Any of these aborts the whole build: a partially built map is never
/// published.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("duplicate tenant identifier: {identifier}")]
    DuplicateIdentifier { identifier: String },
    #[error("tenant at {path} has no identifier (empty coordinate)")]
    MissingIdentifier { path: String },
    #[error("invalid configuration tree at {path}: {reason}")]
    InvalidTree { path: String, reason: String },
    #[error("tenant {identifier} has an invalid configuration: {source}")]
    InvalidTenant {
        identifier: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("configuration source {name} failed: {reason}")]
    Source { name: String, reason: String },
}

/// Errors returned by tenant store mutation operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{operation} is not supported by a configuration-backed tenant store")]
    NotSupported { operation: &'static str },
}

/// Errors raised while deriving a tenant identifier from headers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("required header {name} is missing")]
    MissingHeader { name: &'static str },
}
