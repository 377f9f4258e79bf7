//! Configuration sources for the tenant store.
//!
//! Flat sources (`FlatSource`, `EnvSource`) only produce string leaves; use
//! the `tenancy_core::lenient` helpers for non-string option fields.

use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tenancy_core::{tree, ConfigError};

use crate::traits::ConfigSource;

/// Separator between path segments in environment variable names.
pub const ENV_SEPARATOR: &str = "__";

// ---------------------------------------------------------------------------
// JsonFileSource
// ---------------------------------------------------------------------------

/// Reads a JSON document from disk on every load.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
    name: String,
    optional: bool,
}

impl JsonFileSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self {
            path,
            name,
            optional: false,
        }
    }

    /// A missing file loads as an empty tree instead of failing.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

#[async_trait]
impl ConfigSource for JsonFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<Value, ConfigError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if self.optional && e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Value::Object(Map::new()));
            }
            Err(e) => return Err(source_error(&self.name, e)),
        };
        serde_json::from_str(&text).map_err(|e| source_error(&self.name, e))
    }
}

// ---------------------------------------------------------------------------
// EnvSource
// ---------------------------------------------------------------------------

/// Reads `PREFIX` + `__`-separated paths from the process environment, e.g.
/// `TENANCY_CFG_TENANTS__9446__ENVIRONMENTS__DEV__DEFAULTS__NAME=x`.
#[derive(Debug, Clone)]
pub struct EnvSource {
    prefix: String,
}

impl EnvSource {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl ConfigSource for EnvSource {
    fn name(&self) -> &str {
        "environment"
    }

    async fn load(&self) -> Result<Value, ConfigError> {
        Ok(tree_from_env(&self.prefix, std::env::vars()))
    }
}

/// Builds a tree from environment-style variables. Variables without the
/// prefix are ignored; the prefix match is case-insensitive.
pub fn tree_from_env<I>(prefix: &str, vars: I) -> Value
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut root = Value::Object(Map::new());
    for (name, value) in vars {
        if name.len() <= prefix.len() || !name.is_char_boundary(prefix.len()) {
            continue;
        }
        let (head, rest) = name.split_at(prefix.len());
        if !head.eq_ignore_ascii_case(prefix) {
            continue;
        }
        let segments: Vec<&str> = rest.split(ENV_SEPARATOR).filter(|s| !s.is_empty()).collect();
        tree::insert_path(&mut root, &segments, Value::String(value));
    }
    root
}

// ---------------------------------------------------------------------------
// FlatSource / InMemorySource
// ---------------------------------------------------------------------------

/// Fixed `a:b:c = value` pairs.
#[derive(Debug, Clone, Default)]
pub struct FlatSource {
    pairs: Vec<(String, String)>,
}

impl FlatSource {
    #[must_use]
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl ConfigSource for FlatSource {
    fn name(&self) -> &str {
        "flat"
    }

    async fn load(&self) -> Result<Value, ConfigError> {
        Ok(tree::from_pairs(
            self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        ))
    }
}

/// A tree held in memory that can be replaced at runtime.
#[derive(Debug, Default)]
pub struct InMemorySource {
    tree: RwLock<Value>,
}

impl InMemorySource {
    #[must_use]
    pub fn new(tree: Value) -> Self {
        Self {
            tree: RwLock::new(tree),
        }
    }

    pub fn replace(&self, tree: Value) {
        *self.tree.write() = tree;
    }
}

#[async_trait]
impl ConfigSource for InMemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self) -> Result<Value, ConfigError> {
        Ok(self.tree.read().clone())
    }
}

// ---------------------------------------------------------------------------
// LayeredSource
// ---------------------------------------------------------------------------

/// Merges several sources in order; later layers win field by field.
#[derive(Default)]
pub struct LayeredSource {
    layers: Vec<Box<dyn ConfigSource>>,
}

impl LayeredSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, layer: impl ConfigSource + 'static) -> Self {
        self.layers.push(Box::new(layer));
        self
    }
}

#[async_trait]
impl ConfigSource for LayeredSource {
    fn name(&self) -> &str {
        "layered"
    }

    async fn load(&self) -> Result<Value, ConfigError> {
        let mut merged = Value::Object(Map::new());
        for layer in &self.layers {
            let tree = layer.load().await?;
            tree::merge(&mut merged, &tree);
        }
        Ok(merged)
    }
}

fn source_error(name: &str, e: impl std::fmt::Display) -> ConfigError {
    ConfigError::Source {
        name: name.to_string(),
        reason: e.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
