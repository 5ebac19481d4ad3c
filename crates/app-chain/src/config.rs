//! Configuration of the App-chain client.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection settings for the App-chain gateway, as read from the `[app_chain]` table of the
/// config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppChainConfig {
    /// JSON-RPC HTTP endpoint used for queries and transaction submission.
    pub rpc_url: String,

    /// JSON-RPC WebSocket endpoint used for event subscriptions.
    pub ws_url: String,

    /// Address the submitted messages are signed by.
    pub signer: String,

    /// Timeout of a single request.
    pub request_timeout: Duration,

    /// Initial delay between two submission attempts.
    pub retry_sleep_time: Duration,

    /// Upper bound of the delay between two submission attempts.
    pub max_retry_sleep_time: Duration,
}
