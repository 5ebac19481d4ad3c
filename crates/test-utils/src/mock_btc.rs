//! An in-memory Bitcoin node.
//!
//! [`MockBtc`] keeps a chain of blocks and a mempool. Blocks are only ever added through
//! [`MockBtc::mine`], which also delivers block epochs and spend notifications synchronously, so
//! tests control exactly when the vigilante observes what.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bitcoin::{
    block::{Header, Version as BlockVersion},
    hashes::Hash,
    Block, BlockHash, CompactTarget, OutPoint, ScriptBuf, Transaction, TxMerkleNode, TxOut, Txid,
};
use btc_notify::{
    errors::{BtcRpcError, NotifierError},
    event::{BlockEpoch, SpendDetail},
    subscription::Subscription,
    traits::{Broadcaster, ChainNotifier, Reader},
};
use tokio::sync::mpsc::UnboundedSender;

const RPC_INVALID_ADDRESS_OR_KEY: i32 = -5;
const RPC_VERIFY_REJECTED: i32 = -26;
const RPC_VERIFY_ALREADY_IN_CHAIN: i32 = -27;

#[derive(Debug)]
struct SpendRegistration {
    outpoint: OutPoint,
    outbox: UnboundedSender<SpendDetail>,
}

#[derive(Debug, Default)]
struct State {
    chain: Vec<Block>,
    mempool: Vec<Transaction>,
    broadcasts: Vec<Transaction>,
    block_subs: Vec<UnboundedSender<BlockEpoch>>,
    spend_subs: Vec<SpendRegistration>,
}

impl State {
    fn tip_height(&self) -> u32 {
        self.chain.len() as u32 - 1
    }

    fn mined_tx(&self, txid: &Txid) -> Option<(u32, &Transaction)> {
        self.chain.iter().enumerate().find_map(|(height, block)| {
            block
                .txdata
                .iter()
                .find(|tx| tx.compute_txid() == *txid)
                .map(|tx| (height as u32, tx))
        })
    }

    fn mempool_tx(&self, txid: &Txid) -> Option<&Transaction> {
        self.mempool.iter().find(|tx| tx.compute_txid() == *txid)
    }

    /// The mined spend of `outpoint`, with its height and input index.
    fn mined_spend(&self, outpoint: &OutPoint) -> Option<SpendDetail> {
        self.chain.iter().enumerate().find_map(|(height, block)| {
            block
                .txdata
                .iter()
                .find_map(|tx| spend_detail(tx, outpoint, height as u32))
        })
    }

    fn is_spent(&self, outpoint: &OutPoint, include_mempool: bool) -> bool {
        let spends = |tx: &Transaction| tx.input.iter().any(|i| i.previous_output == *outpoint);
        self.chain.iter().flat_map(|b| b.txdata.iter()).any(spends)
            || (include_mempool && self.mempool.iter().any(spends))
    }

    fn push_block(&mut self, txdata: Vec<Transaction>) -> Block {
        let prev_blockhash = self
            .chain
            .last()
            .map(Block::block_hash)
            .unwrap_or_else(BlockHash::all_zeros);
        let block = Block {
            header: Header {
                version: BlockVersion::ONE,
                prev_blockhash,
                merkle_root: TxMerkleNode::all_zeros(),
                time: self.chain.len() as u32,
                bits: CompactTarget::from_consensus(0x207f_ffff),
                nonce: 0,
            },
            txdata,
        };
        self.chain.push(block.clone());
        block
    }
}

fn spend_detail(tx: &Transaction, outpoint: &OutPoint, height: u32) -> Option<SpendDetail> {
    tx.input
        .iter()
        .position(|i| i.previous_output == *outpoint)
        .map(|idx| SpendDetail {
            spent_outpoint: *outpoint,
            spender_txid: tx.compute_txid(),
            spending_tx: tx.clone(),
            spender_input_index: idx as u32,
            spending_height: height,
        })
}

/// An in-memory [`Reader`], [`Broadcaster`] and [`ChainNotifier`].
///
/// Broadcast transactions land in the mempool; they are only mined by [`MockBtc::mine`] or
/// [`MockBtc::mine_mempool`].
#[derive(Debug)]
pub struct MockBtc {
    state: Mutex<State>,
}

impl Default for MockBtc {
    fn default() -> Self {
        Self::with_height(0)
    }
}

impl MockBtc {
    /// Creates a chain of empty blocks whose tip is at `height`.
    pub fn with_height(height: u32) -> Self {
        let mut state = State::default();
        for _ in 0..=height {
            state.push_block(Vec::new());
        }

        Self {
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("mock state is never poisoned")
    }

    /// Height of the best block.
    pub fn height(&self) -> u32 {
        self.state().tip_height()
    }

    /// Mines a block containing `txs` and notifies every subscriber.
    ///
    /// Mined transactions leave the mempool.
    pub fn mine(&self, txs: Vec<Transaction>) -> BlockHash {
        let mut state = self.state();
        let mined = txs.iter().map(Transaction::compute_txid).collect::<Vec<_>>();
        state
            .mempool
            .retain(|tx| !mined.contains(&tx.compute_txid()));

        let block = state.push_block(txs);
        let height = state.tip_height();
        let epoch = BlockEpoch {
            hash: block.block_hash(),
            height,
            header: block.header,
        };
        state
            .block_subs
            .retain(|outbox| outbox.send(epoch.clone()).is_ok());

        state.spend_subs.retain(|reg| {
            let detail = block
                .txdata
                .iter()
                .find_map(|tx| spend_detail(tx, &reg.outpoint, height));
            match detail {
                Some(detail) => {
                    let _ = reg.outbox.send(detail);
                    false
                }
                None => !reg.outbox.is_closed(),
            }
        });

        epoch.hash
    }

    /// Mines every transaction currently in the mempool.
    pub fn mine_mempool(&self) -> BlockHash {
        let txs = self.state().mempool.clone();
        self.mine(txs)
    }

    /// Mines `count` empty blocks.
    pub fn mine_empty(&self, count: u32) {
        for _ in 0..count {
            self.mine(Vec::new());
        }
    }

    /// Every transaction accepted by [`Broadcaster::send_raw_transaction`], in order.
    pub fn broadcasts(&self) -> Vec<Transaction> {
        self.state().broadcasts.clone()
    }

    /// Transactions waiting to be mined.
    pub fn mempool(&self) -> Vec<Transaction> {
        self.state().mempool.clone()
    }

    /// Number of live block epoch subscriptions.
    pub fn num_block_subscribers(&self) -> usize {
        self.state().block_subs.len()
    }

    /// Number of pending spend registrations.
    pub fn num_spend_registrations(&self) -> usize {
        let mut state = self.state();
        state.spend_subs.retain(|reg| !reg.outbox.is_closed());
        state.spend_subs.len()
    }
}

#[async_trait]
impl Reader for MockBtc {
    async fn get_best_block(&self) -> Result<(BlockHash, u32), BtcRpcError> {
        let state = self.state();
        let tip = state.chain.last().map(Block::block_hash);
        Ok((tip.unwrap_or_else(BlockHash::all_zeros), state.tip_height()))
    }

    async fn get_block_hash(&self, height: u32) -> Result<BlockHash, BtcRpcError> {
        self.state()
            .chain
            .get(height as usize)
            .map(Block::block_hash)
            .ok_or(BtcRpcError::Rpc {
                code: -8,
                message: "Block height out of range".into(),
            })
    }

    async fn get_block_by_hash(&self, hash: &BlockHash) -> Result<Block, BtcRpcError> {
        self.state()
            .chain
            .iter()
            .find(|b| b.block_hash() == *hash)
            .cloned()
            .ok_or(BtcRpcError::Rpc {
                code: RPC_INVALID_ADDRESS_OR_KEY,
                message: "Block not found".into(),
            })
    }

    async fn get_raw_transaction(&self, txid: &Txid) -> Result<Option<Transaction>, BtcRpcError> {
        let state = self.state();
        Ok(state
            .mined_tx(txid)
            .map(|(_, tx)| tx)
            .or_else(|| state.mempool_tx(txid))
            .cloned())
    }

    async fn get_tx_out(
        &self,
        txid: &Txid,
        vout: u32,
        include_mempool: bool,
    ) -> Result<Option<TxOut>, BtcRpcError> {
        let state = self.state();
        let tx = match state.mined_tx(txid) {
            Some((_, tx)) => Some(tx),
            None if include_mempool => state.mempool_tx(txid),
            None => None,
        };
        let Some(out) = tx.and_then(|tx| tx.output.get(vout as usize)) else {
            return Ok(None);
        };

        if state.is_spent(&OutPoint::new(*txid, vout), include_mempool) {
            return Ok(None);
        }

        Ok(Some(out.clone()))
    }
}

#[async_trait]
impl Broadcaster for MockBtc {
    async fn send_raw_transaction(
        &self,
        tx: &Transaction,
        _allow_high_fees: bool,
    ) -> Result<Txid, BtcRpcError> {
        let mut state = self.state();
        let txid = tx.compute_txid();

        if state.mined_tx(&txid).is_some() {
            return Err(BtcRpcError::Rpc {
                code: RPC_VERIFY_ALREADY_IN_CHAIN,
                message: "Transaction already in block chain".into(),
            });
        }

        if state.mempool_tx(&txid).is_none() {
            let conflict = tx
                .input
                .iter()
                .any(|input| state.is_spent(&input.previous_output, true));
            if conflict {
                return Err(BtcRpcError::Rpc {
                    code: RPC_VERIFY_REJECTED,
                    message: "txn-mempool-conflict".into(),
                });
            }
            state.mempool.push(tx.clone());
        }

        state.broadcasts.push(tx.clone());
        Ok(txid)
    }
}

#[async_trait]
impl ChainNotifier for MockBtc {
    async fn register_block_epoch(&self) -> Result<Subscription<BlockEpoch>, NotifierError> {
        let (outbox, sub) = Subscription::channel();
        self.state().block_subs.push(outbox);
        Ok(sub)
    }

    async fn register_spend(
        &self,
        outpoint: OutPoint,
        pk_script: ScriptBuf,
        _height_hint: u32,
    ) -> Result<Subscription<SpendDetail>, NotifierError> {
        let mut state = self.state();
        let known = state
            .mined_tx(&outpoint.txid)
            .and_then(|(_, tx)| tx.output.get(outpoint.vout as usize));
        if let Some(out) = known {
            if out.script_pubkey != pk_script {
                return Err(NotifierError::PkScriptMismatch(outpoint));
            }
        }

        let (outbox, sub) = Subscription::channel();
        match state.mined_spend(&outpoint) {
            Some(detail) => {
                let _ = outbox.send(detail);
            }
            None => state.spend_subs.push(SpendRegistration { outpoint, outbox }),
        }

        Ok(sub)
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::Amount;
    use futures::StreamExt;

    use super::*;
    use crate::bitcoin::{create_tx, generate_outpoint, spending_tx};

    fn funding_tx(value: Amount) -> Transaction {
        create_tx(
            &[generate_outpoint()],
            vec![TxOut {
                value,
                script_pubkey: ScriptBuf::from_bytes(vec![0x51]),
            }],
        )
    }

    #[tokio::test]
    async fn mining_notifies_block_subscribers() {
        let btc = MockBtc::with_height(10);
        let mut sub = btc.register_block_epoch().await.unwrap();

        let hash = btc.mine(Vec::new());
        let epoch = sub.next().await.unwrap();

        assert_eq!(epoch.height, 11);
        assert_eq!(epoch.hash, hash);
        assert_eq!(btc.get_best_block().await.unwrap(), (hash, 11));
    }

    #[tokio::test]
    async fn tx_out_tracks_spentness() {
        let btc = MockBtc::default();
        let funding = funding_tx(Amount::from_sat(10_000));
        let txid = funding.compute_txid();
        btc.mine(vec![funding]);
        assert!(btc.get_tx_out(&txid, 0, true).await.unwrap().is_some());

        let spend = spending_tx(OutPoint::new(txid, 0), Amount::from_sat(9_000));
        btc.send_raw_transaction(&spend, false).await.unwrap();
        assert!(btc.get_tx_out(&txid, 0, false).await.unwrap().is_some());
        assert!(btc.get_tx_out(&txid, 0, true).await.unwrap().is_none());

        btc.mine_mempool();
        assert!(btc.get_tx_out(&txid, 0, false).await.unwrap().is_none());
        assert!(btc.mempool().is_empty());
    }

    #[tokio::test]
    async fn conflicting_and_mined_broadcasts_fail() {
        let btc = MockBtc::default();
        let funding = funding_tx(Amount::from_sat(10_000));
        let outpoint = OutPoint::new(funding.compute_txid(), 0);
        btc.mine(vec![funding]);

        let first = spending_tx(outpoint, Amount::from_sat(9_000));
        let second = spending_tx(outpoint, Amount::from_sat(8_000));
        btc.send_raw_transaction(&first, false).await.unwrap();

        let err = btc.send_raw_transaction(&second, false).await.unwrap_err();
        assert!(matches!(err, BtcRpcError::Rpc { code: -26, .. }));

        btc.mine_mempool();
        let err = btc.send_raw_transaction(&first, false).await.unwrap_err();
        assert!(err.is_already_in_chain());
        assert_eq!(btc.broadcasts(), vec![first]);
    }

    #[tokio::test]
    async fn spend_registration_is_one_shot() {
        let btc = MockBtc::default();
        let funding = funding_tx(Amount::from_sat(10_000));
        let outpoint = OutPoint::new(funding.compute_txid(), 0);
        let script = funding.output[0].script_pubkey.clone();
        btc.mine(vec![funding]);

        let mut sub = btc.register_spend(outpoint, script, 0).await.unwrap();
        assert_eq!(btc.num_spend_registrations(), 1);

        let spend = spending_tx(outpoint, Amount::from_sat(9_000));
        btc.mine(vec![spend.clone()]);

        let detail = sub.next().await.unwrap();
        assert_eq!(detail.spender_txid, spend.compute_txid());
        assert_eq!(detail.spending_height, 2);
        assert_eq!(btc.num_spend_registrations(), 0);
    }

    #[tokio::test]
    async fn historical_spend_is_delivered_on_registration() {
        let btc = MockBtc::default();
        let funding = funding_tx(Amount::from_sat(10_000));
        let outpoint = OutPoint::new(funding.compute_txid(), 0);
        let script = funding.output[0].script_pubkey.clone();
        let spend = spending_tx(outpoint, Amount::from_sat(9_000));
        btc.mine(vec![funding]);
        btc.mine(vec![spend.clone()]);

        let mut sub = btc.register_spend(outpoint, script, 0).await.unwrap();
        assert_eq!(sub.next().await.unwrap().spending_tx, spend);

        let err = btc
            .register_spend(outpoint, ScriptBuf::new(), 0)
            .await
            .unwrap_err();
        assert_eq!(err, NotifierError::PkScriptMismatch(outpoint));
    }
}
