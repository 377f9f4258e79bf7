//! Metrics middleware for inbound messages.
//!
//! Wraps each message in an `info` span carrying its id, duration and
//! outcome, and counts outcomes in `tenancy_messages_total`.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use tenancy_core::IncomingMessage;
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::service::error::PipelineError;

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments messages with timing and counting.
#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<IncomingMessage> for MetricsService<S>
where
    S: Service<IncomingMessage, Error = PipelineError> + Send,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
{
    type Response = S::Response;
    type Error = PipelineError;
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, PipelineError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, message: IncomingMessage) -> Self::Future {
        let message_id = message.message_id.clone();

        let span = info_span!(
            "message",
            message_id = %message_id,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = span.in_scope(|| self.inner.call(message));

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;

                let outcome = match &result {
                    Ok(_) => "ok",
                    Err(e) => e.kind(),
                };

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = start.elapsed().as_millis() as u64;
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                tracing::info!(
                    message_id = %message_id,
                    duration_ms,
                    outcome,
                    "message handled"
                );
                metrics::counter!("tenancy_messages_total", "outcome" => outcome).increment(1);

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;

    /// Echoes the message id back.
    struct EchoService;

    impl Service<IncomingMessage> for EchoService {
        type Response = String;
        type Error = PipelineError;
        type Future = Pin<Box<dyn Future<Output = Result<String, PipelineError>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, message: IncomingMessage) -> Self::Future {
            Box::pin(async move { Ok(message.message_id) })
        }
    }

    #[tokio::test]
    async fn metrics_layer_passes_through_response() {
        let svc = MetricsLayer.layer(EchoService);
        let resp = svc
            .oneshot(IncomingMessage::new("m-42", json!({})))
            .await
            .unwrap();
        assert_eq!(resp, "m-42");
    }
}
