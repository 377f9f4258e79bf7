use std::fmt;

use serde::{Deserialize, Serialize};

/// The three-part code that locates a tenant: tenant code, environment
/// name and gemeente (municipality) code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantCoordinates {
    pub tenant_code: String,
    pub environment_name: String,
    pub gemeente_code: String,
}

impl TenantCoordinates {
    #[must_use]
    pub fn new(
        tenant_code: impl Into<String>,
        environment_name: impl Into<String>,
        gemeente_code: impl Into<String>,
    ) -> Self {
        Self {
            tenant_code: tenant_code.into(),
            environment_name: environment_name.into(),
            gemeente_code: gemeente_code.into(),
        }
    }

    /// True when every coordinate is non-empty.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.tenant_code.is_empty()
            && !self.environment_name.is_empty()
            && !self.gemeente_code.is_empty()
    }

    /// Composite identifier `"{tenant}-{environment}-{gemeente}"`.
    #[must_use]
    pub fn identifier(&self) -> TenantIdentifier {
        TenantIdentifier::new(format!(
            "{}-{}-{}",
            self.tenant_code, self.environment_name, self.gemeente_code
        ))
    }
}

/// Composite tenant identifier.
///
/// Keeps the spelling it was created with for display and logging.
/// Equality and lookups go through [`TenantIdentifier::key`], which is
/// lowercase, so `9446-XYZ-0599` and `9446-xyz-0599` name the same tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantIdentifier(String);

impl TenantIdentifier {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase lookup key.
    #[must_use]
    pub fn key(&self) -> String {
        self.0.to_lowercase()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for TenantIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for TenantIdentifier {}

impl fmt::Display for TenantIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantIdentifier {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// One fully resolved tenant configuration.
///
/// `O` is the per-tenant settings structure chosen by the application; it
/// is deserialized from the merged `Defaults` + gemeente subtree. The
/// coordinates always come from the configuration path, never from the
/// payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TenantRecord<O> {
    pub identifier: TenantIdentifier,
    pub coordinates: TenantCoordinates,
    pub connection_string: Option<String>,
    pub options: O,
}

impl<O> TenantRecord<O> {
    #[must_use]
    pub fn tenant_code(&self) -> &str {
        &self.coordinates.tenant_code
    }

    #[must_use]
    pub fn environment_name(&self) -> &str {
        &self.coordinates.environment_name
    }

    #[must_use]
    pub fn gemeente_code(&self) -> &str {
        &self.coordinates.gemeente_code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_joins_coordinates_with_dashes() {
        let coords = TenantCoordinates::new("9446", "0518pr1", "0001");
        assert_eq!(coords.identifier().as_str(), "9446-0518pr1-0001");
    }

    #[test]
    fn identifier_equality_ignores_case() {
        assert_eq!(
            TenantIdentifier::new("9446-XYZ-0599"),
            TenantIdentifier::new("9446-xyz-0599")
        );
        assert_eq!(TenantIdentifier::new("9446-XYZ-0599").key(), "9446-xyz-0599");
    }

    #[test]
    fn incomplete_coordinates_are_detected() {
        assert!(TenantCoordinates::new("9446", "xyz", "0599").is_complete());
        assert!(!TenantCoordinates::new("", "xyz", "0599").is_complete());
        assert!(!TenantCoordinates::new("9446", "xyz", "").is_complete());
    }
}
