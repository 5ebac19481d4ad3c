//! Capabilities the rest of the workspace requires from Bitcoin.

use async_trait::async_trait;
use bitcoin::{Block, BlockHash, OutPoint, ScriptBuf, Transaction, TxOut, Txid};

use crate::{
    errors::{BtcRpcError, NotifierError},
    event::{BlockEpoch, SpendDetail},
    subscription::Subscription,
};

/// Read access to a Bitcoin node.
#[async_trait]
pub trait Reader: Send + Sync {
    /// Hash and height of the best block.
    async fn get_best_block(&self) -> Result<(BlockHash, u32), BtcRpcError>;

    /// Hash of the best-chain block at `height`.
    async fn get_block_hash(&self, height: u32) -> Result<BlockHash, BtcRpcError>;

    /// The block with the given hash.
    async fn get_block_by_hash(&self, hash: &BlockHash) -> Result<Block, BtcRpcError>;

    /// The transaction with the given hash, `None` if the node does not know it.
    async fn get_raw_transaction(&self, txid: &Txid) -> Result<Option<Transaction>, BtcRpcError>;

    /// The unspent output at `(txid, vout)`, `None` if it is spent or unknown.
    async fn get_tx_out(
        &self,
        txid: &Txid,
        vout: u32,
        include_mempool: bool,
    ) -> Result<Option<TxOut>, BtcRpcError>;
}

/// Broadcast access to a Bitcoin node.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Submits `tx` to the node's mempool and returns its hash.
    ///
    /// With `allow_high_fees` the node's maximum fee rate check is disabled.
    async fn send_raw_transaction(
        &self,
        tx: &Transaction,
        allow_high_fees: bool,
    ) -> Result<Txid, BtcRpcError>;
}

/// Block and spend notifications.
#[async_trait]
pub trait ChainNotifier: Send + Sync {
    /// Subscribes to every block connected from now on, in chain order.
    async fn register_block_epoch(&self) -> Result<Subscription<BlockEpoch>, NotifierError>;

    /// Subscribes to the spend of `outpoint`, locked by `pk_script`.
    ///
    /// The subscription yields at most one item. Blocks from `height_hint` on are scanned for a
    /// spend that already happened.
    async fn register_spend(
        &self,
        outpoint: OutPoint,
        pk_script: ScriptBuf,
        height_hint: u32,
    ) -> Result<Subscription<SpendDetail>, NotifierError>;
}
