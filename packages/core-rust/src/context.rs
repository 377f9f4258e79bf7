use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::types::{TenantCoordinates, TenantIdentifier, TenantRecord};

/// Transport that carried the inbound unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Http,
    Message,
}

impl Transport {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Message => "message",
        }
    }
}

/// The tenant bound to one flow.
///
/// Holds the record from the snapshot that was active when the flow was
/// resolved; a reload during the flow does not change what the flow sees.
pub struct TenantContext<O> {
    record: Arc<TenantRecord<O>>,
    /// Version of the tenant map the record came from.
    pub snapshot_version: u64,
    pub transport: Transport,
}

impl<O> TenantContext<O> {
    #[must_use]
    pub fn new(record: Arc<TenantRecord<O>>, snapshot_version: u64, transport: Transport) -> Self {
        Self {
            record,
            snapshot_version,
            transport,
        }
    }

    #[must_use]
    pub fn record(&self) -> &Arc<TenantRecord<O>> {
        &self.record
    }

    #[must_use]
    pub fn identifier(&self) -> &TenantIdentifier {
        &self.record.identifier
    }

    #[must_use]
    pub fn coordinates(&self) -> &TenantCoordinates {
        &self.record.coordinates
    }
}

// Manual impl: cloning shares the record and must not require `O: Clone`.
impl<O> Clone for TenantContext<O> {
    fn clone(&self) -> Self {
        Self {
            record: Arc::clone(&self.record),
            snapshot_version: self.snapshot_version,
            transport: self.transport,
        }
    }
}

impl<O> Deref for TenantContext<O> {
    type Target = TenantRecord<O>;

    fn deref(&self) -> &Self::Target {
        &self.record
    }
}

impl<O> fmt::Debug for TenantContext<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantContext")
            .field("identifier", &self.record.identifier)
            .field("snapshot_version", &self.snapshot_version)
            .field("transport", &self.transport)
            .finish()
    }
}
