//! Outgoing message mutators.
//!
//! [`HeaderForwarder`] carries forwardable headers from the current flow onto
//! every message the flow sends. [`TenantHeaderStamper`] writes the bound
//! tenant's coordinates. Neither overwrites a header the sender already set.

use std::sync::Arc;

use tenancy_core::headers::{ENVIRONMENT_NAME, GEMEENTE_CODE, TENANT_CODE};
use tenancy_core::{HeaderConvention, OutgoingMessage};
use tracing::trace;

use crate::flow::{self, FlowContext};
use crate::traits::OutgoingMutator;

// ---------------------------------------------------------------------------
// HeaderForwarder
// ---------------------------------------------------------------------------

/// Copies forwardable headers of the inbound unit of work and of the flow's
/// header set onto outgoing messages.
///
/// Inbound values are applied first, so they win over a flow-context value
/// for the same name. Headers already present on the message are kept.
#[derive(Debug, Clone, Default)]
pub struct HeaderForwarder {
    convention: HeaderConvention,
}

impl HeaderForwarder {
    #[must_use]
    pub fn new(convention: HeaderConvention) -> Self {
        Self { convention }
    }

    /// Applies the forwarding rule for an explicit flow.
    pub fn forward(&self, ctx: &FlowContext, message: &mut OutgoingMessage) {
        let inbound = ctx
            .inbound_headers()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()));
        let mut flow_headers: Vec<(String, String)> = ctx.headers().into_iter().collect();
        flow_headers.sort();

        for (name, value) in inbound.chain(flow_headers) {
            if self.convention.is_forwardable(&name) && message.insert_if_absent(&name, &value) {
                trace!(header = %name, destination = %message.destination, "forwarded header");
            }
        }
    }
}

impl OutgoingMutator for HeaderForwarder {
    fn mutate(&self, message: &mut OutgoingMessage) {
        if let Some(ctx) = flow::current() {
            self.forward(&ctx, message);
        }
    }
}

// ---------------------------------------------------------------------------
// TenantHeaderStamper
// ---------------------------------------------------------------------------

/// Writes the bound tenant's coordinate headers when they are absent.
///
/// Covers flows whose inbound unit of work did not carry the headers, such as
/// an HTTP request resolved by other means.
#[derive(Debug, Clone, Copy, Default)]
pub struct TenantHeaderStamper;

impl OutgoingMutator for TenantHeaderStamper {
    fn mutate(&self, message: &mut OutgoingMessage) {
        let Some(coordinates) = flow::current_coordinates() else {
            return;
        };
        message.insert_if_absent(TENANT_CODE, &coordinates.tenant_code);
        message.insert_if_absent(ENVIRONMENT_NAME, &coordinates.environment_name);
        message.insert_if_absent(GEMEENTE_CODE, &coordinates.gemeente_code);
    }
}

// ---------------------------------------------------------------------------
// CompositeMutator
// ---------------------------------------------------------------------------

/// Runs a list of mutators in registration order.
#[derive(Default, Clone)]
pub struct CompositeMutator {
    mutators: Vec<Arc<dyn OutgoingMutator>>,
}

impl CompositeMutator {
    #[must_use]
    pub fn new(mutators: Vec<Arc<dyn OutgoingMutator>>) -> Self {
        Self { mutators }
    }

    /// Header forwarding followed by tenant stamping.
    #[must_use]
    pub fn tenant_defaults(convention: HeaderConvention) -> Self {
        Self::new(vec![
            Arc::new(HeaderForwarder::new(convention)),
            Arc::new(TenantHeaderStamper),
        ])
    }

    pub fn add(&mut self, mutator: Arc<dyn OutgoingMutator>) {
        self.mutators.push(mutator);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mutators.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mutators.is_empty()
    }
}

impl OutgoingMutator for CompositeMutator {
    fn mutate(&self, message: &mut OutgoingMessage) {
        for mutator in &self.mutators {
            mutator.mutate(message);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
