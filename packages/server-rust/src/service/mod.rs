//! Inbound message pipeline.
//!
//! 1. **Handlers** (`handler`): application code behind the `MessageHandler` trait
//! 2. **Middleware** (`middleware`): Tower layers (metrics, tenant resolution)
//! 3. **Errors** (`error`): what the pipeline hands back to the transport

pub mod error;
pub mod handler;
pub mod middleware;

pub use error::PipelineError;
pub use handler::{HandlerService, MessageHandler};
pub use middleware::{build_message_pipeline, MessagePipeline};
