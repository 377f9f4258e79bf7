//! Tenant resolution middleware for inbound messages.
//!
//! Resolves the tenant from the message headers (strict: a missing tenant
//! header fails the message), then calls the inner service inside the new
//! flow. When resolution fails the inner service is never called and the
//! error goes back to the transport.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tenancy_core::IncomingMessage;
use tower::{Layer, Service};

use crate::flow;
use crate::resolution::TenantResolution;
use crate::service::error::PipelineError;

// ---------------------------------------------------------------------------
// TenantResolutionLayer
// ---------------------------------------------------------------------------

/// Tower layer binding each message to its tenant.
#[derive(Debug)]
pub struct TenantResolutionLayer<O> {
    resolution: TenantResolution<O>,
}

impl<O> TenantResolutionLayer<O> {
    #[must_use]
    pub fn new(resolution: TenantResolution<O>) -> Self {
        Self { resolution }
    }
}

impl<O> Clone for TenantResolutionLayer<O> {
    fn clone(&self) -> Self {
        Self {
            resolution: self.resolution.clone(),
        }
    }
}

impl<S, O> Layer<S> for TenantResolutionLayer<O> {
    type Service = TenantResolutionService<S, O>;

    fn layer(&self, inner: S) -> Self::Service {
        TenantResolutionService {
            inner,
            resolution: self.resolution.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// TenantResolutionService
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct TenantResolutionService<S, O> {
    inner: S,
    resolution: TenantResolution<O>,
}

impl<S: Clone, O> Clone for TenantResolutionService<S, O> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            resolution: self.resolution.clone(),
        }
    }
}

impl<S, O> Service<IncomingMessage> for TenantResolutionService<S, O>
where
    S: Service<IncomingMessage, Error = PipelineError> + Send,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    O: Send + Sync + 'static,
{
    type Response = S::Response;
    type Error = PipelineError;
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, PipelineError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, message: IncomingMessage) -> Self::Future {
        let resolved = match self.resolution.resolve(&message) {
            Ok(resolved) => resolved,
            Err(e) => return Box::pin(async move { Err(e.into()) }),
        };

        let fut = flow::sync_scope(Arc::clone(resolved.flow()), || self.inner.call(message));
        Box::pin(resolved.run(fut))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use tenancy_core::headers::{ENVIRONMENT_NAME, GEMEENTE_CODE, TENANT_CODE};
    use tower::ServiceExt;

    use super::*;
    use crate::resolution::ResolutionError;
    use crate::store::ConfigurationStore;

    /// Records the tenant visible when the inner service runs.
    #[derive(Clone)]
    struct Probe {
        calls: Arc<AtomicUsize>,
    }

    impl Service<IncomingMessage> for Probe {
        type Response = Option<String>;
        type Error = PipelineError;
        type Future = Pin<Box<dyn Future<Output = Result<Option<String>, PipelineError>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _message: IncomingMessage) -> Self::Future {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let at_call = flow::current_coordinates().map(|c| c.gemeente_code);
            Box::pin(async move {
                let in_future = flow::current_coordinates().map(|c| c.gemeente_code);
                assert_eq!(at_call, in_future);
                Ok(in_future)
            })
        }
    }

    fn resolution() -> TenantResolution<serde_json::Value> {
        let tree = json!({
            "Tenants": { "9446": { "Environments": { "xyz": {
                "Gemeenten": { "0599": {}, "0518": {} }
            } } } }
        });
        TenantResolution::message(Arc::new(ConfigurationStore::from_tree(&tree).unwrap()))
    }

    fn message(gemeente: Option<&str>) -> IncomingMessage {
        let msg = IncomingMessage::new("m", json!({}))
            .with_header(TENANT_CODE, "9446")
            .with_header(ENVIRONMENT_NAME, "xyz");
        match gemeente {
            Some(g) => msg.with_header(GEMEENTE_CODE, g),
            None => msg,
        }
    }

    #[tokio::test]
    async fn inner_service_runs_inside_the_bound_flow() {
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = TenantResolutionLayer::new(resolution()).layer(Probe {
            calls: Arc::clone(&calls),
        });

        let seen = svc.oneshot(message(Some("0518"))).await.unwrap();
        assert_eq!(seen.as_deref(), Some("0518"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(flow::current().is_none());
    }

    #[tokio::test]
    async fn failed_resolution_never_reaches_inner_service() {
        let calls = Arc::new(AtomicUsize::new(0));
        let layer = TenantResolutionLayer::new(resolution());

        let unknown = layer
            .layer(Probe { calls: Arc::clone(&calls) })
            .oneshot(message(Some("9999")))
            .await
            .unwrap_err();
        assert!(matches!(
            unknown,
            PipelineError::Resolution(ResolutionError::TenantNotFound { .. })
        ));

        let missing = layer
            .layer(Probe { calls: Arc::clone(&calls) })
            .oneshot(message(None))
            .await
            .unwrap_err();
        assert!(matches!(
            missing,
            PipelineError::Resolution(ResolutionError::MissingHeader(_))
        ));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
