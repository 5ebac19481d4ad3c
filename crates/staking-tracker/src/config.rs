//! Configuration of the staking tracker, read from the `[btc_staking_tracker]` table.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    constants::{
        DEFAULT_CHECK_DELEGATIONS_INTERVAL, DEFAULT_CHECK_DELEGATION_ACTIVE_INTERVAL,
        DEFAULT_EVIDENCES_PAGE_SIZE, DEFAULT_MAX_RETRY_SLEEP_TIME,
        DEFAULT_NEW_DELEGATIONS_BATCH_SIZE, DEFAULT_RETRY_JITTER,
        DEFAULT_RETRY_SLEEP_TIME, DEFAULT_RETRY_SUBMIT_UNBONDING_TX_INTERVAL,
        DEFAULT_SLASHING_QUEUE_CAPACITY, MAX_NEW_DELEGATIONS_BATCH_SIZE,
    },
    errors::ConfigError,
};

/// Settings of the [`crate::BtcStakingTracker`].
///
/// Every field has a default, so the table may be partial or absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BtcStakingTrackerConfig {
    /// Interval between two sweeps of the App-chain delegations.
    pub check_delegations_interval: Duration,

    /// Number of delegations fetched per page, at most
    /// [`MAX_NEW_DELEGATIONS_BATCH_SIZE`].
    pub new_delegations_batch_size: u64,

    /// Interval between two activity checks of a delegation whose staking output was spent by a
    /// transaction other than its unbonding transaction.
    pub check_delegation_active_interval: Duration,

    /// Interval between two attempts at reporting an unbonding.
    pub retry_submit_unbonding_tx_interval: Duration,

    /// Upper bound of the random delay added to [`Self::retry_submit_unbonding_tx_interval`].
    pub retry_jitter: Duration,

    /// First delay of the backoff applied to failed queries and submissions.
    pub retry_sleep_time: Duration,

    /// Upper bound of that backoff.
    pub max_retry_sleep_time: Duration,

    /// App-chain height from which equivocation evidences are replayed at bootstrap.
    pub slashing_start_height: u64,

    /// Number of evidences fetched per page at bootstrap.
    pub evidences_page_size: u64,

    /// Capacity of the queue of observed slashing transactions.
    pub slashing_queue_capacity: usize,
}

impl Default for BtcStakingTrackerConfig {
    fn default() -> Self {
        Self {
            check_delegations_interval: DEFAULT_CHECK_DELEGATIONS_INTERVAL,
            new_delegations_batch_size: DEFAULT_NEW_DELEGATIONS_BATCH_SIZE,
            check_delegation_active_interval: DEFAULT_CHECK_DELEGATION_ACTIVE_INTERVAL,
            retry_submit_unbonding_tx_interval: DEFAULT_RETRY_SUBMIT_UNBONDING_TX_INTERVAL,
            retry_jitter: DEFAULT_RETRY_JITTER,
            retry_sleep_time: DEFAULT_RETRY_SLEEP_TIME,
            max_retry_sleep_time: DEFAULT_MAX_RETRY_SLEEP_TIME,
            slashing_start_height: 0,
            evidences_page_size: DEFAULT_EVIDENCES_PAGE_SIZE,
            slashing_queue_capacity: DEFAULT_SLASHING_QUEUE_CAPACITY,
        }
    }
}

impl BtcStakingTrackerConfig {
    /// Checks the settings are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.new_delegations_batch_size == 0
            || self.new_delegations_batch_size > MAX_NEW_DELEGATIONS_BATCH_SIZE
        {
            return Err(ConfigError::BatchSize(self.new_delegations_batch_size));
        }

        let intervals = [
            ("check_delegations_interval", self.check_delegations_interval),
            (
                "check_delegation_active_interval",
                self.check_delegation_active_interval,
            ),
            (
                "retry_submit_unbonding_tx_interval",
                self.retry_submit_unbonding_tx_interval,
            ),
            ("retry_sleep_time", self.retry_sleep_time),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::Zero(*name));
        }

        if self.max_retry_sleep_time < self.retry_sleep_time {
            return Err(ConfigError::InvertedRetryBounds {
                min: self.retry_sleep_time,
                max: self.max_retry_sleep_time,
            });
        }

        if self.evidences_page_size == 0 {
            return Err(ConfigError::Zero("evidences_page_size"));
        }

        if self.slashing_queue_capacity == 0 {
            return Err(ConfigError::Zero("slashing_queue_capacity"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(BtcStakingTrackerConfig::default().validate(), Ok(()));
    }

    #[test]
    fn partial_table_falls_back_to_defaults() {
        let cfg: BtcStakingTrackerConfig = toml::from_str(
            r#"
            new_delegations_batch_size = 500
            slashing_start_height = 42

            [check_delegations_interval]
            secs = 10
            nanos = 0
            "#,
        )
        .unwrap();

        assert_eq!(cfg.new_delegations_batch_size, 500);
        assert_eq!(cfg.slashing_start_height, 42);
        assert_eq!(cfg.check_delegations_interval, Duration::from_secs(10));
        assert_eq!(cfg.retry_jitter, DEFAULT_RETRY_JITTER);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let cfg = BtcStakingTrackerConfig {
            new_delegations_batch_size: MAX_NEW_DELEGATIONS_BATCH_SIZE + 1,
            ..Default::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::BatchSize(MAX_NEW_DELEGATIONS_BATCH_SIZE + 1))
        );

        let cfg = BtcStakingTrackerConfig {
            check_delegations_interval: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::Zero("check_delegations_interval"))
        );

        let cfg = BtcStakingTrackerConfig {
            retry_sleep_time: Duration::from_secs(10),
            max_retry_sleep_time: Duration::from_secs(1),
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvertedRetryBounds { .. })
        ));
    }
}
