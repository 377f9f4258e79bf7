//! Application message handlers and their `tower::Service` adapter.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tenancy_core::IncomingMessage;
use tower::Service;

use super::error::PipelineError;

/// Handles one inbound message.
///
/// Runs inside the message's flow: tenant-scoped lookups
/// (`flow::current_tenant`, `OptionsProjector::current`) and messages sent
/// through a `MessageSession` all see the resolved tenant.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, message: IncomingMessage) -> anyhow::Result<()>;
}

/// `tower::Service` wrapper around a shared [`MessageHandler`].
pub struct HandlerService<H> {
    handler: Arc<H>,
}

impl<H> HandlerService<H> {
    #[must_use]
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }
}

impl<H> Clone for HandlerService<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<H> fmt::Debug for HandlerService<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerService").finish_non_exhaustive()
    }
}

impl<H: MessageHandler> Service<IncomingMessage> for HandlerService<H> {
    type Response = ();
    type Error = PipelineError;
    type Future = Pin<Box<dyn Future<Output = Result<(), PipelineError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, message: IncomingMessage) -> Self::Future {
        let handler = Arc::clone(&self.handler);
        Box::pin(async move { handler.handle(message).await.map_err(PipelineError::from) })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;

    struct Failing;

    #[async_trait]
    impl MessageHandler for Failing {
        async fn handle(&self, message: IncomingMessage) -> anyhow::Result<()> {
            anyhow::bail!("cannot handle {}", message.message_id)
        }
    }

    #[tokio::test]
    async fn handler_errors_surface_as_pipeline_errors() {
        let svc = HandlerService::new(Arc::new(Failing));
        let err = svc
            .oneshot(IncomingMessage::new("m-1", json!(null)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "handler");
        assert!(err.to_string().contains("m-1"));
    }
}
