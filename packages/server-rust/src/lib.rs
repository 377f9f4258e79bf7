//! Tenancy Server: live-reloading tenant store, flow-scoped header
//! context, and the HTTP and message adapters that bind each unit of work
//! to its tenant.

pub mod flow;
pub mod logging;
pub mod network;
pub mod options;
pub mod outbound;
pub mod resolution;
pub mod sample;
pub mod service;
pub mod store;
pub mod traits;
pub mod transport;

pub use flow::{FlowContext, FlowError};
pub use options::{OptionsProjector, TenantOptions};
pub use outbound::{CompositeMutator, HeaderForwarder, TenantHeaderStamper};
pub use resolution::{ResolutionError, ResolvedFlow, TenantResolution};
pub use service::{build_message_pipeline, MessageHandler, PipelineError};
pub use store::{ConfigurationStore, ReloadWorker};
pub use traits::{ConfigSource, OutgoingMutator, TenantDirectory};
pub use transport::{LocalTransport, MessageSession};
