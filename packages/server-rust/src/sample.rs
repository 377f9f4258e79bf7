//! Sample application: an HTTP endpoint that sends a message to a local
//! endpoint, whose handler logs the tenant and its options.
//!
//! Shows the full hop: `POST /send` resolves the tenant from the request
//! headers, the outgoing message picks up the tenant headers through the
//! session's mutators, and the handler runs in a new flow bound to the
//! same tenant.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use clap::Parser;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tenancy_core::{lenient, IncomingMessage, OutgoingMessage, TenantRecord};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::flow;
use crate::network::{build_router, AppState, NetworkConfig, Tenant};
use crate::options::OptionsProjector;
use crate::resolution::TenantResolution;
use crate::service::{build_message_pipeline, MessageHandler};
use crate::store::ConfigurationStore;
use crate::traits::TenantDirectory;
use crate::transport::{DeadLetter, LocalTransport, MessageSession, TransportError};

/// Endpoint the sample handler listens on.
pub const SAMPLE_ENDPOINT: &str = "sample.inbox";

/// Per-tenant settings of the sample.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct SampleOptions {
    pub custom_setting: Option<String>,
    #[serde(deserialize_with = "lenient::bool")]
    pub verbose: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleMessage {
    pub content: String,
}

/// What the handler saw for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handled {
    pub content: String,
    pub custom_setting: Option<String>,
}

// ---------------------------------------------------------------------------
// SampleHandler
// ---------------------------------------------------------------------------

pub struct SampleHandler {
    projector: OptionsProjector<SampleOptions, SampleOptions>,
    /// Tenant identifier -> messages handled for it.
    handled: DashMap<String, Vec<Handled>>,
}

impl SampleHandler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            projector: OptionsProjector::new(|record: &TenantRecord<SampleOptions>| {
                record.options.clone()
            }),
            handled: DashMap::new(),
        }
    }

    #[must_use]
    pub fn handled_for(&self, identifier: &str) -> Vec<Handled> {
        self.handled
            .get(&identifier.to_lowercase())
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }
}

impl Default for SampleHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageHandler for SampleHandler {
    async fn handle(&self, message: IncomingMessage) -> anyhow::Result<()> {
        let body: SampleMessage = serde_json::from_value(message.body)?;
        let tenant = flow::current_tenant::<SampleOptions>()
            .ok_or_else(|| anyhow::anyhow!("message handled outside a tenant flow"))?;
        let options = self.projector.current()?;

        info!(
            content = %body.content,
            tenant = %tenant.identifier(),
            custom_setting = options.custom_setting.as_deref().unwrap_or("<not set>"),
            "handled sample message"
        );
        if options.verbose {
            info!(headers = ?flow::headers(), "flow headers");
        }

        self.handled
            .entry(tenant.identifier().key())
            .or_default()
            .push(Handled {
                content: body.content,
                custom_setting: options.custom_setting.clone(),
            });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// HTTP routes
// ---------------------------------------------------------------------------

async fn send(
    State(session): State<MessageSession>,
    Tenant(tenant): Tenant<SampleOptions>,
) -> Result<StatusCode, (StatusCode, Json<serde_json::Value>)> {
    let message = SampleMessage {
        content: format!("Sample message for {}", tenant.identifier()),
    };
    let body = serde_json::to_value(&message)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))))?;

    session
        .send(OutgoingMessage::new(SAMPLE_ENDPOINT, body))
        .await
        .map_err(|e: TransportError| {
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": e.to_string() })))
        })?;
    Ok(StatusCode::ACCEPTED)
}

/// Application routes of the sample; tenant resolution is added by
/// [`build_router`].
pub fn sample_routes(session: MessageSession) -> Router {
    Router::new()
        .route("/send", post(send))
        .with_state(session)
}

// ---------------------------------------------------------------------------
// SampleConfig
// ---------------------------------------------------------------------------

/// Command line and environment configuration of the sample server.
#[derive(Debug, Clone, Parser)]
#[command(name = "sample-server")]
#[command(about = "Multi-tenant sample: HTTP to local message endpoint")]
pub struct SampleConfig {
    /// Host address to bind to.
    #[arg(long, env = "TENANCY_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, env = "TENANCY_PORT", default_value = "8080")]
    pub port: u16,

    /// JSON configuration file holding the `Tenants` section.
    #[arg(short, long, env = "TENANCY_CONFIG", default_value = "appsettings.json")]
    pub config: PathBuf,

    /// Prefix of environment variables layered over the file. Kept apart
    /// from the `TENANCY_` settings above so they stay out of the tree.
    #[arg(long, env = "TENANCY_ENV_PREFIX", default_value = "TENANCY_CFG_")]
    pub env_prefix: String,

    /// Seconds between configuration polls.
    #[arg(long, env = "TENANCY_RELOAD_INTERVAL", default_value = "5")]
    pub reload_interval: u64,

    /// Request timeout in seconds.
    #[arg(long, env = "TENANCY_REQUEST_TIMEOUT", default_value = "30")]
    pub request_timeout: u64,

    /// Allowed CORS origins (comma-separated, or * for all).
    #[arg(long, env = "TENANCY_CORS_ORIGINS", default_value = "*")]
    pub cors_origins: String,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "TENANCY_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON.
    #[arg(long, env = "TENANCY_LOG_JSON", default_value = "false")]
    pub log_json: bool,
}

impl SampleConfig {
    #[must_use]
    pub fn network(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            cors_origins: self
                .cors_origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect(),
            request_timeout: Duration::from_secs(self.request_timeout),
        }
    }

    #[must_use]
    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_interval.max(1))
    }
}

// ---------------------------------------------------------------------------
// SampleHost
// ---------------------------------------------------------------------------

/// Everything the sample server runs, wired together.
pub struct SampleHost {
    pub router: Router,
    pub transport: Arc<LocalTransport>,
    pub handler: Arc<SampleHandler>,
    pub endpoint: JoinHandle<()>,
    /// Logs and discards rejected messages.
    pub dead_letters: JoinHandle<()>,
}

impl SampleHost {
    /// Wires the transport, the message endpoint and the HTTP router around
    /// `store`. Must run inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails when the sample endpoint cannot be started or the transport's
    /// dead letters were already taken.
    pub fn build(
        store: Arc<ConfigurationStore<SampleOptions>>,
        config: NetworkConfig,
    ) -> anyhow::Result<Self> {
        let transport = LocalTransport::new();
        transport.declare(SAMPLE_ENDPOINT);

        let handler = Arc::new(SampleHandler::new());
        let pipeline = build_message_pipeline(
            Arc::clone(&handler),
            TenantResolution::message(Arc::clone(&store)),
        );
        let endpoint = transport.run_endpoint(SAMPLE_ENDPOINT, pipeline)?;

        let mut rejected = transport
            .dead_letters()
            .ok_or_else(|| anyhow::anyhow!("dead letters of the sample transport already taken"))?;
        let dead_letters = tokio::spawn(async move {
            while let Some(letter) = rejected.recv().await {
                log_dead_letter(&letter);
            }
        });

        let state = AppState::new(Arc::clone(&store) as Arc<dyn TenantDirectory>, config);
        let router = build_router(
            state,
            TenantResolution::http(store),
            sample_routes(transport.default_session()),
        );

        Ok(Self {
            router,
            transport,
            handler,
            endpoint,
            dead_letters,
        })
    }
}

fn log_dead_letter(letter: &DeadLetter) {
    warn!(
        endpoint = %letter.endpoint,
        message_id = %letter.message.message_id,
        kind = letter.kind,
        error = %letter.error,
        "discarding dead letter"
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tenancy_core::headers::{ENVIRONMENT_NAME, GEMEENTE_CODE, TENANT_CODE};
    use tower::ServiceExt;

    use super::*;

    fn store() -> Arc<ConfigurationStore<SampleOptions>> {
        let tree = json!({
            "Tenants": { "9446": { "Environments": { "xyz": {
                "Defaults": { "CustomSetting": "default", "Verbose": "false" },
                "Gemeenten": {
                    "0599": { "CustomSetting": "rotterdam" },
                    "0518": {}
                }
            } } } }
        });
        Arc::new(ConfigurationStore::from_tree(&tree).unwrap())
    }

    fn send_request(gemeente: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/send")
            .header(TENANT_CODE, "9446")
            .header(ENVIRONMENT_NAME, "xyz")
            .header(GEMEENTE_CODE, gemeente)
            .body(Body::empty())
            .unwrap()
    }

    async fn wait_for(handler: &SampleHandler, identifier: &str) -> Vec<Handled> {
        for _ in 0..200 {
            let handled = handler.handled_for(identifier);
            if !handled.is_empty() {
                return handled;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Vec::new()
    }

    #[tokio::test]
    async fn http_request_reaches_the_handler_with_its_tenant() {
        let host = SampleHost::build(store(), NetworkConfig::default()).unwrap();

        let response = host.router.clone().oneshot(send_request("0599")).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let response = host.router.clone().oneshot(send_request("0518")).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let rotterdam = wait_for(&host.handler, "9446-xyz-0599").await;
        assert_eq!(
            rotterdam,
            vec![Handled {
                content: "Sample message for 9446-xyz-0599".to_string(),
                custom_setting: Some("rotterdam".to_string()),
            }]
        );

        let other = wait_for(&host.handler, "9446-xyz-0518").await;
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].custom_setting.as_deref(), Some("default"));
    }

    #[test]
    fn config_maps_to_network_settings() {
        let config = SampleConfig::try_parse_from([
            "sample-server",
            "--port",
            "9000",
            "--cors-origins",
            "http://a.test, http://b.test",
            "--reload-interval",
            "0",
        ])
        .unwrap();
        let network = config.network();
        assert_eq!(network.port, 9000);
        assert_eq!(network.cors_origins, vec!["http://a.test", "http://b.test"]);
        assert_eq!(config.reload_interval(), Duration::from_secs(1));
    }

    #[test]
    fn env_tree_leaves_out_server_settings() {
        let config = SampleConfig::try_parse_from(["sample-server"]).unwrap();
        let vars = [
            ("TENANCY_PORT", "9000"),
            ("TENANCY_HOST", "0.0.0.0"),
            ("TENANCY_CFG_TENANTS__9446__ENVIRONMENTS__XYZ__GEMEENTEN__0599__VERBOSE", "true"),
        ]
        .map(|(k, v)| (k.to_string(), v.to_string()));

        let tree = crate::store::sources::tree_from_env(&config.env_prefix, vars);
        let keys: Vec<&String> = tree.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["TENANTS"]);
    }

    #[tokio::test]
    async fn host_drains_rejected_messages() {
        let host = SampleHost::build(store(), NetworkConfig::default()).unwrap();
        assert!(host.transport.dead_letters().is_none());

        host.transport
            .deliver(OutgoingMessage::new(SAMPLE_ENDPOINT, json!({ "content": "x" })))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!host.dead_letters.is_finished());
    }

    #[tokio::test]
    async fn unknown_tenant_is_rejected_before_sending() {
        let host = SampleHost::build(store(), NetworkConfig::default()).unwrap();

        let response = host.router.clone().oneshot(send_request("9999")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(host.handler.handled_for("9446-xyz-9999").is_empty());
    }
}
