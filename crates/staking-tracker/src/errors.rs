//! Error types of the staking tracker.

use std::time::Duration;

use bitcoin::{Txid, XOnlyPublicKey};
use btc_notify::errors::{BtcRpcError, NotifierError};
use thiserror::Error;
use vigilante_app_chain::errors::AppChainError;
use vigilante_common::errors::MultiError;
use vigilante_primitives::errors::{DecodeError, EotsError, ScriptError, WitnessError};

/// Errors of the equivocation and atomic slashers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlasherError {
    /// An App-chain query or submission failed.
    #[error("app chain: {0}")]
    AppChain(#[from] AppChainError),

    /// A Bitcoin RPC failed.
    #[error("bitcoin rpc: {0}")]
    BtcRpc(#[from] BtcRpcError),

    /// A notifier registration failed.
    #[error("notifier: {0}")]
    Notifier(#[from] NotifierError),

    /// A slashing witness could not be built or parsed.
    #[error("witness: {0}")]
    Witness(#[from] WitnessError),

    /// The staking scripts of a delegation could not be rebuilt.
    #[error("script: {0}")]
    Script(#[from] ScriptError),

    /// A delegation carries inconsistent data.
    #[error("decode: {0}")]
    Decode(#[from] DecodeError),

    /// The key could not be extracted from an evidence.
    #[error("eots: {0}")]
    Eots(#[from] EotsError),

    /// The provider that signed the slashing transaction does not secure the delegation.
    #[error("{fp_pk} signed the slashing tx of {staking_tx_hash} but does not secure it")]
    UnknownFinalityProvider {
        /// The slashed delegation.
        staking_tx_hash: Txid,

        /// The provider found in the witness.
        fp_pk: XOnlyPublicKey,
    },

    /// No covenant signature in the slashing transaction revealed the provider's key.
    #[error("could not recover the key of {fp_pk} from slashing tx of {staking_tx_hash}")]
    KeyRecoveryFailed {
        /// The slashed delegation.
        staking_tx_hash: Txid,

        /// The provider that signed the slashing transaction.
        fp_pk: XOnlyPublicKey,
    },

    /// `start` was called twice.
    #[error("already started")]
    AlreadyStarted,

    /// The tracker is shutting down.
    #[error("shutting down")]
    Shutdown,
}

/// Errors of the unbonding watcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnbondingWatcherError {
    /// The spending transaction does not pay to the unbonding output.
    #[error("{0} is not the unbonding transaction")]
    NotUnbonding(Txid),

    /// The spending input's witness is too short to hold a staker signature.
    #[error("witness of {txid} has {len} elements, need at least 4")]
    WitnessTooShort {
        /// The spending transaction.
        txid: Txid,

        /// Number of witness elements found.
        len: usize,
    },

    /// The staker signature slot does not hold a BIP340 signature.
    #[error("invalid staker signature in {0}")]
    InvalidStakerSignature(Txid),

    /// An App-chain query or submission failed.
    #[error("app chain: {0}")]
    AppChain(#[from] AppChainError),

    /// A Bitcoin RPC failed.
    #[error("bitcoin rpc: {0}")]
    BtcRpc(#[from] BtcRpcError),

    /// A notifier registration failed.
    #[error("notifier: {0}")]
    Notifier(#[from] NotifierError),

    /// `start` was called twice.
    #[error("already started")]
    AlreadyStarted,

    /// The tracker is shutting down.
    #[error("shutting down")]
    Shutdown,
}

/// Invalid `[btc_staking_tracker]` settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The batch size is zero or above the App chain's page limit.
    #[error("new_delegations_batch_size must be in 1..=10000, got {0}")]
    BatchSize(u64),

    /// A setting that must be positive is zero.
    #[error("{0} must not be zero")]
    Zero(&'static str),

    /// The backoff upper bound is below its first delay.
    #[error("max_retry_sleep_time {max:?} is below retry_sleep_time {min:?}")]
    InvertedRetryBounds {
        /// `retry_sleep_time`.
        min: Duration,

        /// `max_retry_sleep_time`.
        max: Duration,
    },
}

/// Errors of the [`crate::BtcStakingTracker`] as a whole.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The configuration is invalid.
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),

    /// The metrics could not be registered.
    #[error("metrics: {0}")]
    Metrics(#[from] prometheus::Error),

    /// A slasher failed to start.
    #[error("slasher: {0}")]
    Slasher(#[from] SlasherError),

    /// The unbonding watcher failed to start.
    #[error("unbonding watcher: {0}")]
    UnbondingWatcher(#[from] UnbondingWatcherError),

    /// Replaying the recorded evidences failed for some of them.
    #[error("bootstrap: {0}")]
    Bootstrap(MultiError<SlasherError>),
}
