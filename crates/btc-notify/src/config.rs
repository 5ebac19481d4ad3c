//! Configuration of the Bitcoin adapters.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_CONFIRMATION_DEPTH, DEFAULT_POLL_INTERVAL};

/// Connection settings for `bitcoind`, as read from the `[btc]` table of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtcConfig {
    /// JSON-RPC endpoint of the node.
    pub rpc_url: String,

    /// RPC user.
    pub rpc_user: String,

    /// RPC password.
    pub rpc_password: String,

    /// Timeout of a single RPC request.
    pub request_timeout: Duration,

    /// Interval between two polls of the best block.
    pub poll_interval: Duration,

    /// Number of blocks built on top of a block before it is surfaced.
    #[serde(default = "default_confirmation_depth")]
    pub confirmation_depth: u32,
}

const fn default_confirmation_depth() -> u32 {
    DEFAULT_CONFIRMATION_DEPTH
}

impl BtcConfig {
    /// The notifier settings contained in this config.
    pub const fn notifier_config(&self) -> NotifierConfig {
        NotifierConfig {
            poll_interval: self.poll_interval,
            confirmation_depth: self.confirmation_depth,
        }
    }
}

/// NotifierConfig configures a [`crate::notifier::PollingNotifier`].
///
/// You should construct a NotifierConfig with [`Default::default`] and modify it with the member
/// methods on this struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifierConfig {
    /// Interval between two polls, defaults to [`DEFAULT_POLL_INTERVAL`].
    pub(crate) poll_interval: Duration,

    /// Depth at which a block is surfaced, defaults to [`DEFAULT_CONFIRMATION_DEPTH`].
    pub(crate) confirmation_depth: u32,
}

impl NotifierConfig {
    /// Updates the NotifierConfig with a new poll interval and returns the updated config.
    ///
    /// Useful for a builder pattern with dotchaining.
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Updates the NotifierConfig with a new confirmation depth and returns the updated config.
    ///
    /// Useful for a builder pattern with dotchaining.
    ///
    /// Note, this is the number of blocks that must be built on top of a given block before that
    /// block is surfaced. A depth of 0 surfaces a block as soon as it is the best block.
    pub const fn with_confirmation_depth(mut self, n: u32) -> Self {
        self.confirmation_depth = n;
        self
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        NotifierConfig {
            poll_interval: DEFAULT_POLL_INTERVAL,
            confirmation_depth: DEFAULT_CONFIRMATION_DEPTH,
        }
    }
}
