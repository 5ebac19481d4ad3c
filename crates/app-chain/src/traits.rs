//! Capabilities the rest of the workspace requires from the App chain.

use async_trait::async_trait;
use bitcoin::{Txid, XOnlyPublicKey};
use vigilante_primitives::{
    delegation::{BtcDelegation, DelegationStatus},
    finality::{Evidence, FinalityProvider},
    msgs::AppMsg,
    params::StakingParams,
};

use crate::{
    errors::AppChainError,
    pagination::{Page, PageRequest},
    subscription::Subscription,
    types::{TxEvent, TxResponse},
};

/// Access to the App chain.
#[async_trait]
pub trait AppChainClient: Send + Sync {
    /// Current BTC staking parameters.
    async fn btc_staking_params(&self) -> Result<StakingParams, AppChainError>;

    /// BTC staking parameters of a given version.
    async fn btc_staking_params_by_version(
        &self,
        version: u32,
    ) -> Result<StakingParams, AppChainError>;

    /// One page of the delegations with `status`.
    async fn btc_delegations(
        &self,
        status: DelegationStatus,
        page: PageRequest,
    ) -> Result<Page<BtcDelegation>, AppChainError>;

    /// A delegation by staking transaction hash.
    async fn btc_delegation(&self, staking_tx_hash: &Txid) -> Result<BtcDelegation, AppChainError>;

    /// One page of the delegations to `fp_pk`.
    async fn finality_provider_delegations(
        &self,
        fp_pk: &XOnlyPublicKey,
        page: PageRequest,
    ) -> Result<Page<BtcDelegation>, AppChainError>;

    /// A finality provider by key.
    async fn finality_provider(
        &self,
        fp_pk: &XOnlyPublicKey,
    ) -> Result<FinalityProvider, AppChainError>;

    /// One page of the equivocation evidences recorded from `start_height` on.
    async fn list_evidences(
        &self,
        start_height: u64,
        page: PageRequest,
    ) -> Result<Page<Evidence>, AppChainError>;

    /// Subscribes `subscriber` to the transactions matching `query`.
    async fn subscribe(
        &self,
        subscriber: &str,
        query: &str,
    ) -> Result<Subscription<TxEvent>, AppChainError>;

    /// Cancels a subscription created with [`AppChainClient::subscribe`].
    async fn unsubscribe(&self, subscriber: &str, query: &str) -> Result<(), AppChainError>;

    /// Submits `msg`, retrying transient failures.
    ///
    /// An error containing any of `expected` is logged and reported as `Ok(None)`. An error
    /// containing any of `unrecoverable` is returned immediately. Other errors are retried with
    /// exponential backoff until the submission succeeds; cancel by dropping the future.
    async fn reliably_send_msg(
        &self,
        msg: AppMsg,
        expected: &[&str],
        unrecoverable: &[&str],
    ) -> Result<Option<TxResponse>, AppChainError>;

    /// Address the messages are submitted by.
    fn must_get_addr(&self) -> String;

    /// Height of the tip of the App chain's Bitcoin light client.
    async fn btc_client_tip_height(&self) -> Result<u32, AppChainError>;
}
