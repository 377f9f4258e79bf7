//! Header names and the forwardable-header convention.
//!
//! Tenant identity travels between hops in three headers. A header is
//! *forwardable* when its name starts with the namespace prefix and ends
//! with the marker suffix; forwardable headers are copied from an inbound
//! unit of work onto every message it sends.

use std::collections::{BTreeMap, HashMap};

/// Header carrying the tenant code.
pub const TENANT_CODE: &str = "Wigo4it.Wegwijzer.TenantCode.Forwardable";
/// Header carrying the environment name.
pub const ENVIRONMENT_NAME: &str = "Wigo4it.Wegwijzer.EnvironmentName.Forwardable";
/// Header carrying the gemeente (municipality) code.
pub const GEMEENTE_CODE: &str = "Wigo4it.Socrates.GemeenteCode.Forwardable";

/// All tenant coordinate headers, in identifier order.
pub const TENANT_HEADERS: [&str; 3] = [TENANT_CODE, ENVIRONMENT_NAME, GEMEENTE_CODE];

pub const DEFAULT_NAMESPACE: &str = "Wigo4it";
pub const DEFAULT_MARKER: &str = "Forwardable";

// ---------------------------------------------------------------------------
// HeaderConvention
// ---------------------------------------------------------------------------

/// Namespace prefix and marker suffix that make a header forwardable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderConvention {
    pub namespace: String,
    pub marker: String,
}

impl Default for HeaderConvention {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            marker: DEFAULT_MARKER.to_string(),
        }
    }
}

impl HeaderConvention {
    #[must_use]
    pub fn new(namespace: impl Into<String>, marker: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            marker: marker.into(),
        }
    }

    /// Case-insensitive prefix/suffix match on the header name.
    #[must_use]
    pub fn is_forwardable(&self, key: &str) -> bool {
        starts_with_ignore_case(key, &self.namespace) && ends_with_ignore_case(key, &self.marker)
    }

    /// Forwardable headers of `source`, with tenant header names
    /// canonicalized. Names are unique case-insensitively; the first value
    /// seen for a name wins.
    #[must_use]
    pub fn forwardable<H: HeaderSource + ?Sized>(&self, source: &H) -> Vec<(String, String)> {
        let mut captured: Vec<(String, String)> = Vec::new();
        for (name, value) in source.header_pairs() {
            if !self.is_forwardable(name)
                || captured.iter().any(|(seen, _)| seen.eq_ignore_ascii_case(name))
            {
                continue;
            }
            captured.push((canonical_name(name).to_string(), value.to_string()));
        }
        captured
    }
}

/// [`HeaderConvention::is_forwardable`] with the default convention.
#[must_use]
pub fn is_forwardable(key: &str) -> bool {
    starts_with_ignore_case(key, DEFAULT_NAMESPACE) && ends_with_ignore_case(key, DEFAULT_MARKER)
}

/// Maps a header name to the canonical spelling of the tenant header it
/// matches case-insensitively. Other names are returned unchanged.
///
/// HTTP stacks lowercase header names; messages keep them as sent. Going
/// through this keeps the tenant headers recognizable across both.
#[must_use]
pub fn canonical_name(name: &str) -> &str {
    TENANT_HEADERS
        .iter()
        .find(|known| known.eq_ignore_ascii_case(name))
        .copied()
        .unwrap_or(name)
}

fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value.len() >= prefix.len()
        && value.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

fn ends_with_ignore_case(value: &str, suffix: &str) -> bool {
    value.len() >= suffix.len()
        && value.as_bytes()[value.len() - suffix.len()..].eq_ignore_ascii_case(suffix.as_bytes())
}

// ---------------------------------------------------------------------------
// HeaderSource
// ---------------------------------------------------------------------------

/// Read access to the headers of an inbound unit of work.
///
/// Lookups are case-insensitive on every transport.
pub trait HeaderSource {
    fn header(&self, name: &str) -> Option<&str>;

    fn header_pairs(&self) -> Box<dyn Iterator<Item = (&str, &str)> + '_>;
}

impl HeaderSource for HashMap<String, String> {
    fn header(&self, name: &str) -> Option<&str> {
        self.get(name)
            .or_else(|| {
                self.iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value)
            })
            .map(String::as_str)
    }

    fn header_pairs(&self) -> Box<dyn Iterator<Item = (&str, &str)> + '_> {
        Box::new(self.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }
}

impl HeaderSource for BTreeMap<String, String> {
    fn header(&self, name: &str) -> Option<&str> {
        self.get(name)
            .or_else(|| {
                self.iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value)
            })
            .map(String::as_str)
    }

    fn header_pairs(&self) -> Box<dyn Iterator<Item = (&str, &str)> + '_> {
        Box::new(self.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }
}

impl HeaderSource for http::HeaderMap {
    fn header(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|value| value.to_str().ok())
    }

    // First value per name, as `get` returns it. Values that are not visible
    // ASCII are skipped.
    fn header_pairs(&self) -> Box<dyn Iterator<Item = (&str, &str)> + '_> {
        Box::new(
            self.keys()
                .filter_map(|name| Some((name.as_str(), self.get(name)?.to_str().ok()?))),
        )
    }
}
