//! Multi-tenant sample server.
//!
//! Loads tenants from a JSON file layered with `TENANCY_CFG_*` environment
//! variables, polls both for changes, and serves `POST /send` plus the
//! operational routes until Ctrl-C. Rejected messages are logged and
//! discarded.

use std::sync::Arc;

use clap::Parser;
use tenancy_server::logging::init_tracing;
use tenancy_server::network::NetworkModule;
use tenancy_server::sample::{SampleConfig, SampleHost, SampleOptions};
use tenancy_server::store::{ConfigurationStore, EnvSource, JsonFileSource, LayeredSource, ReloadWorker};
use tenancy_server::traits::ConfigSource;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SampleConfig::parse();
    init_tracing(&config.log_level, config.log_json)?;

    let source: Arc<dyn ConfigSource> = Arc::new(
        LayeredSource::new()
            .with(JsonFileSource::new(config.config.clone()).optional())
            .with(EnvSource::new(config.env_prefix.clone())),
    );

    let store: Arc<ConfigurationStore<SampleOptions>> =
        Arc::new(ConfigurationStore::from_source(source.as_ref()).await?);
    info!(
        tenants = store.len(),
        config = %config.config.display(),
        "Starting sample server"
    );

    let mut reload = ReloadWorker::start(Arc::clone(&store), source, config.reload_interval());

    let mut network = NetworkModule::new(config.network());
    let port = network.start().await?;
    let host = SampleHost::build(store, network.config().clone())?;
    info!(host = %config.host, port, "Server listening");

    network
        .serve(host.router, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    reload.stop().await;
    Ok(())
}
