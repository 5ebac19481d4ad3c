//! # `vigilante-staking-tracker`
//!
//! The BTC staking tracker keeps the App chain's view of BTC staking honest. It runs three
//! components over a Bitcoin node, a chain notifier and an App-chain client:
//!
//! - the equivocation slasher broadcasts the slashing transactions of every delegation to a
//!   finality provider whose key leaked through an equivocation,
//! - the atomic slasher watches Bitcoin for slashing transactions, recovers the key of the
//!   provider that completed them from the covenant adaptor signatures and reports it, so the
//!   provider's other delegations get slashed too,
//! - the unbonding watcher reports early unbondings it sees on Bitcoin.
//!
//! [`BtcStakingTracker`] wires them together.

// This cfg_attr is needed so that we can disable coverage in parts of the code that we don't want
// polluting coverage analysis. Removing this will cause this module to fail to compile.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

mod atomic;
pub mod config;
pub mod constants;
mod context;
mod equivocation;
pub mod errors;
pub mod index;
pub mod metrics;
mod params;
pub mod traits;
mod unbonding;

#[cfg(test)]
mod test_utils;

use std::sync::Arc;

use btc_notify::traits::ChainNotifier;
use prometheus::Registry;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vigilante_app_chain::traits::AppChainClient;

use crate::{
    atomic::AtomicSlasher,
    config::BtcStakingTrackerConfig,
    context::Context,
    equivocation::EquivocationSlasher,
    errors::TrackerError,
    index::BtcDelegationIndex,
    metrics::TrackerMetrics,
    traits::BtcNode,
    unbonding::UnbondingWatcher,
};

/// The equivocation slasher, the atomic slasher and the unbonding watcher, sharing one shutdown
/// signal.
#[derive(Debug)]
pub struct BtcStakingTracker {
    cancel: CancellationToken,
    metrics: TrackerMetrics,
    index: Arc<BtcDelegationIndex>,
    slashing_start_height: u64,
    equivocation: EquivocationSlasher,
    atomic: AtomicSlasher,
    unbonding: UnbondingWatcher,
}

impl BtcStakingTracker {
    /// Creates a tracker and registers its metrics in `registry`.
    ///
    /// Nothing runs until [`BtcStakingTracker::start`].
    pub fn new(
        cfg: BtcStakingTrackerConfig,
        btc: Arc<dyn BtcNode>,
        notifier: Arc<dyn ChainNotifier>,
        app: Arc<dyn AppChainClient>,
        registry: &Registry,
    ) -> Result<Self, TrackerError> {
        cfg.validate()?;
        let metrics = TrackerMetrics::new(registry)?;
        let slashing_start_height = cfg.slashing_start_height;

        let cancel = CancellationToken::new();
        let ctx = Context::new(cfg, btc, notifier, app, metrics.clone(), cancel.clone());
        let index = Arc::new(BtcDelegationIndex::new());

        let equivocation = EquivocationSlasher::new(ctx.clone());
        let atomic = AtomicSlasher::new(
            ctx.clone(),
            index.clone(),
            equivocation.recovered_key_sender(),
        );
        let unbonding = UnbondingWatcher::new(ctx);

        Ok(Self {
            cancel,
            metrics,
            index,
            slashing_start_height,
            equivocation,
            atomic,
            unbonding,
        })
    }

    /// Slashes the delegations of every provider that equivocated since the configured
    /// `slashing_start_height`, skipping staking outputs that are already spent.
    ///
    /// Failures on individual evidences or delegations are collected, the replay goes on.
    pub async fn bootstrap(&self) -> Result<(), TrackerError> {
        self.equivocation
            .bootstrap(self.slashing_start_height)
            .await
            .map_err(TrackerError::Bootstrap)
    }

    /// Starts the unbonding watcher, the atomic slasher and the equivocation slasher.
    pub async fn start(&mut self) -> Result<(), TrackerError> {
        self.unbonding.start().await?;
        self.atomic.start().await?;
        self.equivocation.start().await?;

        info!("btc staking tracker started");
        Ok(())
    }

    /// Requests shutdown and waits for every routine to exit.
    pub async fn stop(&mut self) {
        self.cancel.cancel();

        self.unbonding.stop().await;
        self.atomic.stop().await;
        self.equivocation.stop().await;

        info!("btc staking tracker stopped");
    }

    /// The tracker's metrics.
    pub const fn metrics(&self) -> &TrackerMetrics {
        &self.metrics
    }

    /// The delegations the atomic slasher watches for slashing transactions.
    pub fn index(&self) -> &BtcDelegationIndex {
        &self.index
    }
}

impl Drop for BtcStakingTracker {
    fn drop(&mut self) {
        if !self.cancel.is_cancelled() {
            warn!("btc staking tracker dropped without being stopped");
            self.cancel.cancel();
        }
    }
}
