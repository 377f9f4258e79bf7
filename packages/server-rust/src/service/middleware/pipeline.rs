//! Pipeline composition: combines the message layers into a single service stack.

use std::sync::Arc;

use tower::ServiceBuilder;

use super::metrics::{MetricsLayer, MetricsService};
use super::resolution::{TenantResolutionLayer, TenantResolutionService};
use crate::resolution::TenantResolution;
use crate::service::handler::{HandlerService, MessageHandler};

/// The full inbound stack for handler `H` over tenant options `O`.
pub type MessagePipeline<H, O> = MetricsService<TenantResolutionService<HandlerService<H>, O>>;

/// Build the message pipeline by wrapping the handler with middleware layers.
///
/// Layer order (outermost to innermost):
/// 1. `MetricsLayer` -- span and outcome counter, including failed resolutions
/// 2. `TenantResolutionLayer` -- bind the message to its tenant and open the flow
///
/// The returned service implements `tower::Service<IncomingMessage>` and is
/// cheap to clone.
#[must_use]
pub fn build_message_pipeline<H, O>(
    handler: Arc<H>,
    resolution: TenantResolution<O>,
) -> MessagePipeline<H, O>
where
    H: MessageHandler,
    O: Send + Sync + 'static,
{
    ServiceBuilder::new()
        .layer(MetricsLayer)
        .layer(TenantResolutionLayer::new(resolution))
        .service(HandlerService::new(handler))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;
    use tenancy_core::headers::{ENVIRONMENT_NAME, GEMEENTE_CODE, TENANT_CODE};
    use tenancy_core::{IncomingMessage, TenantRecord};
    use tower::ServiceExt;

    use super::*;
    use crate::options::OptionsProjector;
    use crate::store::ConfigurationStore;

    #[derive(Debug, Default, Deserialize)]
    #[serde(default, rename_all = "PascalCase")]
    struct Options {
        hoofdgemeente: String,
    }

    /// Compares the projected option against the value the sender expects.
    struct Checker {
        projector: OptionsProjector<Options, String>,
        handled: AtomicUsize,
        mismatches: AtomicUsize,
    }

    #[async_trait]
    impl MessageHandler for Checker {
        async fn handle(&self, message: IncomingMessage) -> anyhow::Result<()> {
            let expected = message.body["expected"].as_str().unwrap_or_default().to_string();
            tokio::task::yield_now().await;
            let seen = self.projector.current()?;
            tokio::task::yield_now().await;
            if *seen != expected {
                self.mismatches.fetch_add(1, Ordering::SeqCst);
            }
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn resolution() -> TenantResolution<Options> {
        let tree = json!({
            "Tenants": { "9446": { "Environments": { "xyz": {
                "Gemeenten": {
                    "0599": { "Hoofdgemeente": "H0599" },
                    "0518": { "Hoofdgemeente": "H0518" }
                }
            } } } }
        });
        TenantResolution::message(Arc::new(ConfigurationStore::from_tree(&tree).unwrap()))
    }

    fn message(i: usize, gemeente: &str) -> IncomingMessage {
        IncomingMessage::new(format!("m-{i}"), json!({ "expected": format!("H{gemeente}") }))
            .with_header(TENANT_CODE, "9446")
            .with_header(ENVIRONMENT_NAME, "xyz")
            .with_header(GEMEENTE_CODE, gemeente)
    }

    fn checker() -> Arc<Checker> {
        Arc::new(Checker {
            projector: OptionsProjector::new(|record: &TenantRecord<Options>| {
                record.options.hoofdgemeente.clone()
            }),
            handled: AtomicUsize::new(0),
            mismatches: AtomicUsize::new(0),
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_messages_see_only_their_own_tenant() {
        let handler = checker();
        let pipeline = build_message_pipeline(Arc::clone(&handler), resolution());

        let mut tasks = Vec::new();
        for i in 0..128 {
            let gemeente = if i % 2 == 0 { "0599" } else { "0518" };
            let svc = pipeline.clone();
            tasks.push(tokio::spawn(svc.oneshot(message(i, gemeente))));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(handler.handled.load(Ordering::SeqCst), 128);
        assert_eq!(handler.mismatches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unresolvable_message_is_rejected_before_the_handler() {
        let handler = checker();
        let pipeline = build_message_pipeline(Arc::clone(&handler), resolution());

        let err = pipeline
            .oneshot(message(0, "9999"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "resolution");
        assert_eq!(handler.handled.load(Ordering::SeqCst), 0);
    }
}
