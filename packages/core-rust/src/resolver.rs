//! Derivation of the composite tenant identifier from inbound headers.
//!
//! Both resolvers produce `"{tenantCode}-{environmentName}-{gemeenteCode}"`.
//! They differ only in how an absent header is treated:
//!
//! - [`LenientResolver`] (HTTP) substitutes an empty segment, so the
//!   request fails later with "tenant not found".
//! - [`StrictResolver`] (messages) fails immediately with
//!   [`ResolveError::MissingHeader`].
//!
//! A header that is present with an empty value yields an empty segment in
//! both.

use crate::error::ResolveError;
use crate::headers::{HeaderSource, ENVIRONMENT_NAME, GEMEENTE_CODE, TENANT_CODE};
use crate::types::TenantIdentifier;

/// Computes a tenant identifier from a header set. Pure; no I/O.
pub trait TenantIdentifierResolver: Send + Sync + 'static {
    /// # Errors
    ///
    /// Implementations may reject header sets they cannot resolve.
    fn resolve(&self, headers: &dyn HeaderSource) -> Result<TenantIdentifier, ResolveError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LenientResolver;

impl TenantIdentifierResolver for LenientResolver {
    fn resolve(&self, headers: &dyn HeaderSource) -> Result<TenantIdentifier, ResolveError> {
        let segment = |name| headers.header(name).unwrap_or_default();
        Ok(join(
            segment(TENANT_CODE),
            segment(ENVIRONMENT_NAME),
            segment(GEMEENTE_CODE),
        ))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StrictResolver;

impl TenantIdentifierResolver for StrictResolver {
    fn resolve(&self, headers: &dyn HeaderSource) -> Result<TenantIdentifier, ResolveError> {
        let segment = |name: &'static str| {
            headers
                .header(name)
                .ok_or(ResolveError::MissingHeader { name })
        };
        Ok(join(
            segment(TENANT_CODE)?,
            segment(ENVIRONMENT_NAME)?,
            segment(GEMEENTE_CODE)?,
        ))
    }
}

fn join(tenant: &str, environment: &str, gemeente: &str) -> TenantIdentifier {
    TenantIdentifier::new(format!("{tenant}-{environment}-{gemeente}"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn lenient_resolves_full_header_set() {
        for (tenant, env, gemeente, expected) in [
            ("9446", "0518pr1", "0001", "9446-0518pr1-0001"),
            ("0518", "0363ac2", "0002", "0518-0363ac2-0002"),
            ("9446", "xyz", "0599", "9446-xyz-0599"),
        ] {
            let set = headers(&[
                (TENANT_CODE, tenant),
                (ENVIRONMENT_NAME, env),
                (GEMEENTE_CODE, gemeente),
            ]);
            assert_eq!(LenientResolver.resolve(&set).unwrap().as_str(), expected);
        }
    }

    #[test]
    fn lenient_substitutes_empty_segment_for_missing_header() {
        let set = headers(&[(ENVIRONMENT_NAME, "0518pr1"), (GEMEENTE_CODE, "0001")]);
        assert_eq!(
            LenientResolver.resolve(&set).unwrap().as_str(),
            "-0518pr1-0001"
        );
    }

    #[test]
    fn lenient_resolves_empty_header_set_to_separators() {
        let set = HashMap::new();
        assert_eq!(LenientResolver.resolve(&set).unwrap().as_str(), "--");
    }

    #[test]
    fn strict_fails_on_first_missing_header() {
        let set = headers(&[(TENANT_CODE, "9446"), (GEMEENTE_CODE, "0001")]);
        assert_eq!(
            StrictResolver.resolve(&set),
            Err(ResolveError::MissingHeader {
                name: ENVIRONMENT_NAME
            })
        );
    }

    #[test]
    fn strict_keeps_present_but_empty_values() {
        let set = headers(&[
            (TENANT_CODE, "9446"),
            (ENVIRONMENT_NAME, ""),
            (GEMEENTE_CODE, "0001"),
        ]);
        assert_eq!(StrictResolver.resolve(&set).unwrap().as_str(), "9446--0001");
    }

    #[test]
    fn both_resolvers_ignore_header_name_case() {
        let set = headers(&[
            ("wigo4it.wegwijzer.tenantcode.forwardable", "9446"),
            ("WIGO4IT.WEGWIJZER.ENVIRONMENTNAME.FORWARDABLE", "xyz"),
            ("wigo4it.socrates.gemeentecode.forwardable", "0599"),
        ]);
        assert_eq!(StrictResolver.resolve(&set).unwrap().as_str(), "9446-xyz-0599");
        assert_eq!(LenientResolver.resolve(&set).unwrap().as_str(), "9446-xyz-0599");
    }
}
