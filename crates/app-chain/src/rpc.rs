//! JSON-RPC API of the App-chain gateway.

use jsonrpsee::{core::RpcResult, proc_macros::rpc};
use vigilante_primitives::msgs::AppMsg;

use crate::{
    pagination::{Page, PageRequest},
    types::{
        RpcBtcDelegation, RpcEvidence, RpcFinalityProvider, RpcStakingParams, TxResponse,
    },
};

/// Method name of the transaction event subscription.
pub const SUBSCRIBE_TX_EVENTS: &str = "babylon_subscribeTxEvents";

/// Method name cancelling a transaction event subscription.
pub const UNSUBSCRIBE_TX_EVENTS: &str = "babylon_unsubscribeTxEvents";

/// Queries of the BTC staking and finality modules.
#[rpc(client, namespace = "babylon")]
pub trait AppChainQueryApi {
    /// Current BTC staking parameters.
    #[method(name = "btcStakingParams")]
    async fn btc_staking_params(&self) -> RpcResult<RpcStakingParams>;

    /// BTC staking parameters of a given version.
    #[method(name = "btcStakingParamsByVersion")]
    async fn btc_staking_params_by_version(&self, version: u32) -> RpcResult<RpcStakingParams>;

    /// Delegations with the given status, `"ANY"` for all of them.
    #[method(name = "btcDelegations")]
    async fn btc_delegations(
        &self,
        status: String,
        page: PageRequest,
    ) -> RpcResult<Page<RpcBtcDelegation>>;

    /// A delegation by staking transaction hash.
    #[method(name = "btcDelegation")]
    async fn btc_delegation(&self, staking_tx_hash: String) -> RpcResult<RpcBtcDelegation>;

    /// Delegations to a finality provider.
    #[method(name = "finalityProviderDelegations")]
    async fn finality_provider_delegations(
        &self,
        fp_btc_pk: String,
        page: PageRequest,
    ) -> RpcResult<Page<RpcBtcDelegation>>;

    /// A finality provider by BIP340 key.
    #[method(name = "finalityProvider")]
    async fn finality_provider(&self, fp_btc_pk: String) -> RpcResult<RpcFinalityProvider>;

    /// Equivocation evidences recorded from `start_height` on.
    #[method(name = "listEvidences")]
    async fn list_evidences(
        &self,
        start_height: u64,
        page: PageRequest,
    ) -> RpcResult<Page<RpcEvidence>>;

    /// Height of the tip of the App chain's Bitcoin light client.
    #[method(name = "btcTipHeight")]
    async fn btc_tip_height(&self) -> RpcResult<u32>;
}

/// Transaction submission.
#[rpc(client, namespace = "babylon")]
pub trait AppChainTxApi {
    /// Signs `msg` as `signer` and broadcasts it, waiting for its inclusion.
    #[method(name = "broadcastMsg")]
    async fn broadcast_msg(&self, signer: String, msg: AppMsg) -> RpcResult<TxResponse>;
}
