use std::time::Duration;

use btc_notify::config::BtcConfig;
use serde::{Deserialize, Serialize};
use vigilante_app_chain::config::AppChainConfig;
use vigilante_staking_tracker::config::BtcStakingTrackerConfig;

use crate::constants::DEFAULT_SHUTDOWN_TIMEOUT;

/// The configuration of the vigilante daemon.
///
/// None of these values are consensus-critical: two trackers configured differently still report
/// the same misbehavior, only at different paces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Config {
    /// Number of worker threads of the runtime.
    ///
    /// Default is [`DEFAULT_THREAD_COUNT`](crate::constants::DEFAULT_THREAD_COUNT).
    pub num_threads: Option<u8>,

    /// How long to wait for the tracker's routines to exit on shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: Duration,

    /// The connection to `bitcoind`.
    pub btc: BtcConfig,

    /// The connection to the App-chain gateway.
    pub app_chain: AppChainConfig,

    /// The tracker itself.
    #[serde(default)]
    pub btc_staking_tracker: BtcStakingTrackerConfig,
}

const fn default_shutdown_timeout() -> Duration {
    DEFAULT_SHUTDOWN_TIMEOUT
}
