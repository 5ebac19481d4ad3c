//! The vigilante daemon watches Bitcoin for BTC staking misbehavior and reports it to the App
//! chain.

use std::{fs, path::Path, sync::Arc};

use anyhow::Context;
use btc_notify::{notifier::PollingNotifier, rpc::BitcoinRpcClient};
use clap::Parser;
use config::Config;
use constants::{DEFAULT_THREAD_COUNT, SERVICE_NAME};
use prometheus::Registry;
use serde::de::DeserializeOwned;
use tokio::{runtime, signal, time};
use tracing::{debug, error, info, trace, warn};
use vigilante_app_chain::client::AppChainRpcClient;
use vigilante_common::{logging, logging::LoggerConfig};
use vigilante_staking_tracker::BtcStakingTracker;

mod args;
mod config;
mod constants;

fn main() -> anyhow::Result<()> {
    let cli = args::Cli::parse();
    let config = parse_toml::<Config>(&cli.config)?;

    let runtime = runtime::Builder::new_multi_thread()
        .worker_threads(config.num_threads.unwrap_or(DEFAULT_THREAD_COUNT).into())
        .enable_all()
        .build()
        .context("could not create runtime")?;

    // the OTLP exporter connects from within the runtime
    let _guard = runtime.enter();
    logging::init(LoggerConfig::from_env(SERVICE_NAME)).context("could not start logging")?;
    info!(config = %cli.config.display(), "starting vigilante");

    let res = runtime.block_on(run(config));
    if let Err(err) = &res {
        error!(?err, "vigilante crashed");
    }

    res
}

async fn run(config: Config) -> anyhow::Result<()> {
    let shutdown_timeout = config.shutdown_timeout;

    let btc = Arc::new(
        BitcoinRpcClient::from_config(&config.btc).context("could not create bitcoind client")?,
    );
    let notifier = PollingNotifier::start(btc.clone(), config.btc.notifier_config())
        .await
        .context("could not start chain notifier")?;
    let app = AppChainRpcClient::new(config.app_chain).context("could not create app client")?;

    let registry = Registry::new();
    let mut tracker = BtcStakingTracker::new(
        config.btc_staking_tracker,
        btc,
        Arc::new(notifier),
        Arc::new(app),
        &registry,
    )
    .context("could not create btc staking tracker")?;

    if let Err(err) = tracker.bootstrap().await {
        warn!(%err, "bootstrap did not complete, some evidences were not enforced");
    }
    tracker
        .start()
        .await
        .context("could not start btc staking tracker")?;

    signal::ctrl_c()
        .await
        .context("could not listen for shutdown signal")?;
    info!(?shutdown_timeout, "shutting down");

    if time::timeout(shutdown_timeout, tracker.stop()).await.is_err() {
        warn!(?shutdown_timeout, "tracker did not stop in time");
    }

    info!("vigilante shutdown complete");
    Ok(())
}

/// Reads and parses a TOML file from the given path into the given type `T`.
fn parse_toml<T>(path: impl AsRef<Path>) -> anyhow::Result<T>
where
    T: std::fmt::Debug + DeserializeOwned,
{
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read TOML file {}", path.display()))?;
    trace!(?raw, "read file");

    let parsed = toml::from_str::<T>(&raw)
        .with_context(|| format!("failed to parse TOML file {}", path.display()))?;
    debug!(?parsed, "parsed TOML file");

    Ok(parsed)
}
