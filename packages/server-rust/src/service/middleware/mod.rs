//! Tower middleware layers for the inbound message pipeline.
//!
//! - [`metrics`]: Message timing and outcome counting
//! - [`resolution`]: Tenant resolution and flow scoping
//! - [`pipeline`]: Composes all layers into a single service stack

pub mod metrics;
pub mod pipeline;
pub mod resolution;

pub use metrics::MetricsLayer;
pub use pipeline::{build_message_pipeline, MessagePipeline};
pub use resolution::TenantResolutionLayer;
