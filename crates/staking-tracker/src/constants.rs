//! Constants used throughout the staking tracker.

use std::time::Duration;

use vigilante_app_chain::errors::{
    ERR_DELEGATION_ALREADY_UNBONDED, ERR_DELEGATION_NOT_FOUND, ERR_FP_ALREADY_SLASHED,
    ERR_FP_NOT_FOUND,
};

/// Name under which the equivocation tracker subscribes to App-chain events.
pub(crate) const EQUIVOCATION_SUBSCRIBER: &str = "vigilante-equivocation-tracker";

/// Transactions carrying finality votes, the only ones that can reveal an equivocation.
pub(crate) const FINALITY_SIG_QUERY: &str =
    "tm.event='Tx' AND message.action='/babylon.finality.v1.MsgAddFinalitySig'";

/// Capacity of the channel from the equivocation tracker to the slashing enforcer.
pub(crate) const EQUIVOCATION_CHANNEL_CAPACITY: usize = 1;

/// Capacity of the channel carrying keys recovered by the atomic slasher to the enforcer.
pub(crate) const RECOVERED_KEY_CHANNEL_CAPACITY: usize = 100;

/// Capacity of the channel carrying spent delegations back to the unbonding watcher's tracker.
pub(crate) const INACTIVE_DELEGATION_CHANNEL_CAPACITY: usize = 100;

/// Multiplier of the exponential backoff used when querying either chain.
pub(crate) const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Errors meaning the selective slashing evidence has already been accepted.
pub(crate) const SELECTIVE_SLASHING_EXPECTED_ERRORS: &[&str] = &[ERR_FP_ALREADY_SLASHED];

/// Errors meaning the selective slashing evidence can never be accepted.
pub(crate) const SELECTIVE_SLASHING_UNRECOVERABLE_ERRORS: &[&str] =
    &[ERR_DELEGATION_NOT_FOUND, ERR_FP_NOT_FOUND];

/// Errors meaning the unbonding has already been reported.
pub(crate) const UNBONDING_EXPECTED_ERRORS: &[&str] = &[ERR_DELEGATION_ALREADY_UNBONDED];

/// Errors meaning the unbonding report can never be accepted.
pub(crate) const UNBONDING_UNRECOVERABLE_ERRORS: &[&str] = &[ERR_DELEGATION_NOT_FOUND];

/// Largest accepted `new_delegations_batch_size`.
pub const MAX_NEW_DELEGATIONS_BATCH_SIZE: u64 = 10_000;

/// Default interval between two sweeps of the App-chain delegations.
pub const DEFAULT_CHECK_DELEGATIONS_INTERVAL: Duration = Duration::from_secs(60);

/// Default number of delegations fetched per page.
pub const DEFAULT_NEW_DELEGATIONS_BATCH_SIZE: u64 = 100;

/// Default interval between two activity checks of a delegation spent by an unknown transaction.
pub const DEFAULT_CHECK_DELEGATION_ACTIVE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default interval between two unbonding report attempts.
pub const DEFAULT_RETRY_SUBMIT_UNBONDING_TX_INTERVAL: Duration = Duration::from_secs(60);

/// Default upper bound of the random delay added to an unbonding report retry.
pub const DEFAULT_RETRY_JITTER: Duration = Duration::from_secs(30);

/// Default first delay of the query backoff.
pub const DEFAULT_RETRY_SLEEP_TIME: Duration = Duration::from_secs(5);

/// Default upper bound of the query backoff.
pub const DEFAULT_MAX_RETRY_SLEEP_TIME: Duration = Duration::from_secs(5 * 60);

/// Default number of evidences fetched per page during bootstrap.
pub const DEFAULT_EVIDENCES_PAGE_SIZE: u64 = 100;

/// Default capacity of the queue between the slashing transaction tracker and the reporter.
pub const DEFAULT_SLASHING_QUEUE_CAPACITY: usize = 100;
