//! Named in-memory endpoints backed by bounded mpsc channels.
//!
//! Each endpoint owns one receiver; [`LocalTransport::run_endpoint`] drains
//! it and drives every message through a `tower::Service` in its own task,
//! so every message starts its own flow. Failures are logged and moved to
//! the bounded dead-letter channel; when nobody drains it, letters beyond
//! its capacity are dropped.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tenancy_core::{IncomingMessage, OutgoingMessage};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower::{Service, ServiceExt};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::outbound::CompositeMutator;
use crate::service::PipelineError;
use crate::traits::OutgoingMutator;

/// Default capacity of an endpoint's inbound queue.
pub const DEFAULT_ENDPOINT_CAPACITY: usize = 256;
/// Default capacity of the dead-letter queue.
pub const DEFAULT_DEAD_LETTER_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("unknown endpoint {0}")]
    UnknownEndpoint(String),
    #[error("endpoint {0} is closed")]
    EndpointClosed(String),
    #[error("endpoint {0} is already running")]
    AlreadyRunning(String),
}

/// A message the pipeline rejected.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub endpoint: String,
    pub message: IncomingMessage,
    /// `PipelineError::kind` of the failure.
    pub kind: &'static str,
    pub error: String,
}

struct Endpoint {
    tx: mpsc::Sender<IncomingMessage>,
    rx: Option<mpsc::Receiver<IncomingMessage>>,
}

// ---------------------------------------------------------------------------
// LocalTransport
// ---------------------------------------------------------------------------

pub struct LocalTransport {
    endpoints: DashMap<String, Endpoint>,
    capacity: usize,
    dead_tx: mpsc::Sender<DeadLetter>,
    dead_rx: Mutex<Option<mpsc::Receiver<DeadLetter>>>,
}

impl LocalTransport {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_capacity(DEFAULT_ENDPOINT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        Self::with_capacities(capacity, DEFAULT_DEAD_LETTER_CAPACITY)
    }

    #[must_use]
    pub fn with_capacities(capacity: usize, dead_letter_capacity: usize) -> Arc<Self> {
        let (dead_tx, dead_rx) = mpsc::channel(dead_letter_capacity.max(1));
        Arc::new(Self {
            endpoints: DashMap::new(),
            capacity: capacity.max(1),
            dead_tx,
            dead_rx: Mutex::new(Some(dead_rx)),
        })
    }

    /// Declares an endpoint. Declaring an existing endpoint is a no-op.
    pub fn declare(&self, name: &str) {
        self.endpoints.entry(name.to_string()).or_insert_with(|| {
            let (tx, rx) = mpsc::channel(self.capacity);
            Endpoint { tx, rx: Some(rx) }
        });
    }

    /// Removes an endpoint; its consumer stops once the queue is drained.
    pub fn close(&self, name: &str) -> bool {
        self.endpoints.remove(name).is_some()
    }

    #[must_use]
    pub fn endpoint_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.endpoints.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// The dead-letter receiver. Only the first caller gets it.
    pub fn dead_letters(&self) -> Option<mpsc::Receiver<DeadLetter>> {
        self.dead_rx.lock().take()
    }

    /// Sending side bound to this transport, applying `mutator` to every
    /// message before dispatch.
    #[must_use]
    pub fn session(self: &Arc<Self>, mutator: Arc<dyn OutgoingMutator>) -> MessageSession {
        MessageSession {
            transport: Arc::clone(self),
            mutator,
        }
    }

    /// Session with header forwarding and tenant stamping.
    #[must_use]
    pub fn default_session(self: &Arc<Self>) -> MessageSession {
        self.session(Arc::new(CompositeMutator::tenant_defaults(
            tenancy_core::HeaderConvention::default(),
        )))
    }

    /// Enqueues an already-mutated message.
    ///
    /// # Errors
    ///
    /// [`TransportError::UnknownEndpoint`] if `message.destination` was
    /// never declared, [`TransportError::EndpointClosed`] if its consumer
    /// is gone.
    pub async fn deliver(&self, message: OutgoingMessage) -> Result<String, TransportError> {
        let destination = message.destination.clone();
        let tx = self
            .endpoints
            .get(&destination)
            .map(|e| e.tx.clone())
            .ok_or_else(|| TransportError::UnknownEndpoint(destination.clone()))?;

        let message_id = Uuid::new_v4().to_string();
        tx.send(message.into_incoming(message_id.clone()))
            .await
            .map_err(|_| TransportError::EndpointClosed(destination.clone()))?;
        debug!(endpoint = %destination, message_id = %message_id, "message enqueued");
        Ok(message_id)
    }

    /// Spawns the consumer loop of endpoint `name`.
    ///
    /// # Errors
    ///
    /// [`TransportError::UnknownEndpoint`] if `name` was never declared,
    /// [`TransportError::AlreadyRunning`] if a consumer already owns it.
    pub fn run_endpoint<S>(self: &Arc<Self>, name: &str, service: S) -> Result<JoinHandle<()>, TransportError>
    where
        S: Service<IncomingMessage, Error = PipelineError> + Clone + Send + 'static,
        S::Future: Send + 'static,
        S::Response: Send + 'static,
    {
        let mut rx = {
            let mut endpoint = self
                .endpoints
                .get_mut(name)
                .ok_or_else(|| TransportError::UnknownEndpoint(name.to_string()))?;
            endpoint
                .rx
                .take()
                .ok_or_else(|| TransportError::AlreadyRunning(name.to_string()))?
        };

        let endpoint = name.to_string();
        let dead_tx = self.dead_tx.clone();
        Ok(tokio::spawn(async move {
            debug!(endpoint = %endpoint, "endpoint started");
            while let Some(message) = rx.recv().await {
                let svc = service.clone();
                let dead_tx = dead_tx.clone();
                let endpoint = endpoint.clone();
                // Plain spawn: every message is its own flow.
                tokio::spawn(async move {
                    let copy = message.clone();
                    if let Err(e) = svc.oneshot(message).await {
                        warn!(
                            endpoint = %endpoint,
                            message_id = %copy.message_id,
                            kind = e.kind(),
                            error = %e,
                            "message moved to dead letters"
                        );
                        let letter = DeadLetter {
                            endpoint,
                            message: copy,
                            kind: e.kind(),
                            error: e.to_string(),
                        };
                        if let Err(mpsc::error::TrySendError::Full(letter)) = dead_tx.try_send(letter) {
                            warn!(
                                endpoint = %letter.endpoint,
                                message_id = %letter.message.message_id,
                                "dead-letter queue full; letter dropped"
                            );
                        }
                    }
                });
            }
            debug!(endpoint = %endpoint, "endpoint stopped");
        }))
    }
}

impl fmt::Debug for LocalTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTransport")
            .field("endpoints", &self.endpoint_names())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// MessageSession
// ---------------------------------------------------------------------------

/// Sends messages on behalf of the current flow.
#[derive(Clone)]
pub struct MessageSession {
    transport: Arc<LocalTransport>,
    mutator: Arc<dyn OutgoingMutator>,
}

impl MessageSession {
    /// Runs the mutators in the caller's flow, then delivers.
    ///
    /// # Errors
    ///
    /// See [`LocalTransport::deliver`].
    pub async fn send(&self, mut message: OutgoingMessage) -> Result<String, TransportError> {
        self.mutator.mutate(&mut message);
        self.transport.deliver(message).await
    }
}

impl fmt::Debug for MessageSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageSession").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tenancy_core::headers::{ENVIRONMENT_NAME, GEMEENTE_CODE, TENANT_CODE};
    use tenancy_core::TenantCoordinates;

    use super::*;
    use crate::flow;
    use crate::resolution::TenantResolution;
    use crate::service::{build_message_pipeline, MessageHandler};
    use crate::store::ConfigurationStore;

    const TRACE: &str = "Wigo4it.Trace.Forwardable";

    fn resolution() -> TenantResolution<Value> {
        let tree = json!({
            "Tenants": { "9446": { "Environments": { "xyz": {
                "Gemeenten": { "0599": {}, "0518": {} }
            } } } }
        });
        TenantResolution::message(Arc::new(ConfigurationStore::from_tree(&tree).unwrap()))
    }

    /// First hop: sets a flow header and sends on to `second`.
    struct Relay {
        session: MessageSession,
    }

    #[async_trait]
    impl MessageHandler for Relay {
        async fn handle(&self, _message: IncomingMessage) -> anyhow::Result<()> {
            flow::set_header(TRACE, "relay")?;
            self.session
                .send(OutgoingMessage::new("second", json!({})))
                .await?;
            Ok(())
        }
    }

    /// Second hop: reports what its flow sees.
    struct Report {
        tx: mpsc::UnboundedSender<(Option<TenantCoordinates>, Option<String>)>,
    }

    #[async_trait]
    impl MessageHandler for Report {
        async fn handle(&self, _message: IncomingMessage) -> anyhow::Result<()> {
            let seen = (flow::current_coordinates(), flow::try_get_header(TRACE));
            self.tx.send(seen)?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn tenant_identity_survives_a_message_hop() {
        let transport = LocalTransport::new();
        transport.declare("first");
        transport.declare("second");

        let relay = Arc::new(Relay {
            session: transport.default_session(),
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let report = Arc::new(Report { tx });

        transport
            .run_endpoint("first", build_message_pipeline(relay, resolution()))
            .unwrap();
        transport
            .run_endpoint("second", build_message_pipeline(report, resolution()))
            .unwrap();

        let outgoing = OutgoingMessage::new("first", json!({}))
            .with_header(TENANT_CODE, "9446")
            .with_header(ENVIRONMENT_NAME, "xyz")
            .with_header(GEMEENTE_CODE, "0518");
        transport.deliver(outgoing).await.unwrap();

        let (coordinates, trace) = rx.recv().await.unwrap();
        assert_eq!(coordinates, Some(TenantCoordinates::new("9446", "xyz", "0518")));
        assert_eq!(trace.as_deref(), Some("relay"));
    }

    #[tokio::test]
    async fn missing_tenant_header_goes_to_dead_letters() {
        let transport = LocalTransport::new();
        transport.declare("inbox");
        let mut dead = transport.dead_letters().unwrap();
        assert!(transport.dead_letters().is_none());

        let (tx, mut reports) = mpsc::unbounded_channel();
        transport
            .run_endpoint("inbox", build_message_pipeline(Arc::new(Report { tx }), resolution()))
            .unwrap();

        let outgoing = OutgoingMessage::new("inbox", json!({ "n": 1 }))
            .with_header(TENANT_CODE, "9446")
            .with_header(ENVIRONMENT_NAME, "xyz");
        let id = transport.default_session().send(outgoing).await.unwrap();

        let letter = dead.recv().await.unwrap();
        assert_eq!(letter.endpoint, "inbox");
        assert_eq!(letter.message.message_id, id);
        assert_eq!(letter.kind, "resolution");
        assert!(reports.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_dead_letter_queue_drops_further_letters() {
        let transport = LocalTransport::with_capacities(8, 1);
        transport.declare("inbox");
        let mut dead = transport.dead_letters().unwrap();

        let (tx, _reports) = mpsc::unbounded_channel();
        transport
            .run_endpoint("inbox", build_message_pipeline(Arc::new(Report { tx }), resolution()))
            .unwrap();

        for n in 0..3 {
            transport
                .deliver(OutgoingMessage::new("inbox", json!({ "n": n })))
                .await
                .unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(dead.recv().await.unwrap().kind, "resolution");
        assert!(dead.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_and_busy_endpoints_are_rejected() {
        let transport = LocalTransport::new();
        let err = transport
            .deliver(OutgoingMessage::new("nowhere", json!(null)))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::UnknownEndpoint("nowhere".to_string()));

        transport.declare("busy");
        let (tx, _rx) = mpsc::unbounded_channel();
        let pipeline = build_message_pipeline(Arc::new(Report { tx }), resolution());
        transport.run_endpoint("busy", pipeline.clone()).unwrap();
        assert_eq!(
            transport.run_endpoint("busy", pipeline).unwrap_err(),
            TransportError::AlreadyRunning("busy".to_string())
        );
    }
}
