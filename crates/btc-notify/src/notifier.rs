//! This module contains the [`PollingNotifier`], the [`ChainNotifier`] implementation backed by a
//! [`Reader`].
//!
//! The notifier polls the best block every `poll_interval` and surfaces every block that reached
//! the configured confirmation depth, in chain order. Blocks are found by walking back from the
//! new target through parent hashes until a block the notifier already surfaced is reached. When
//! that block is below the cached tip the chain was reorganized below the confirmation depth, and
//! every block of the replacement branch is surfaced again in order.
use std::{collections::BTreeMap, fmt, sync::Arc};

use async_trait::async_trait;
use bitcoin::{Block, BlockHash, OutPoint, ScriptBuf};
use tokio::{
    sync::{mpsc, Mutex},
    task::{self, JoinHandle},
    time,
};
use tracing::{debug, info, trace, warn};

use crate::{
    config::NotifierConfig,
    constants::MAX_CATCHUP_BLOCKS,
    errors::NotifierError,
    event::{BlockEpoch, SpendDetail},
    subscription::Subscription,
    traits::{ChainNotifier, Reader},
};

#[derive(Debug)]
struct SpendRegistration {
    outpoint: OutPoint,
    outbox: mpsc::UnboundedSender<SpendDetail>,
}

#[derive(Debug)]
struct NotifierState {
    tip_hash: BlockHash,
    tip_height: u32,
    /// Hashes of the last surfaced blocks by height, the tip included.
    surfaced: BTreeMap<u32, BlockHash>,
    block_subs: Vec<mpsc::UnboundedSender<BlockEpoch>>,
    spend_subs: Vec<SpendRegistration>,
}

impl NotifierState {
    fn new(tip_hash: BlockHash, tip_height: u32) -> Self {
        NotifierState {
            tip_hash,
            tip_height,
            surfaced: BTreeMap::from([(tip_height, tip_hash)]),
            block_subs: Vec::new(),
            spend_subs: Vec::new(),
        }
    }

    /// Moves the tip without surfacing anything, forgetting every surfaced block.
    fn reset(&mut self, tip_hash: BlockHash, tip_height: u32) {
        self.tip_hash = tip_hash;
        self.tip_height = tip_height;
        self.surfaced = BTreeMap::from([(tip_height, tip_hash)]);
    }

    /// Rolls the tip back to the surfaced block at `height`.
    fn rewind(&mut self, height: u32) {
        self.surfaced.split_off(&(height + 1));
        if let Some((&height, &hash)) = self.surfaced.last_key_value() {
            self.tip_hash = hash;
            self.tip_height = height;
        }
    }

    /// Delivers a newly connected block to every subscriber.
    fn surface(&mut self, height: u32, block: &Block) {
        let epoch = BlockEpoch {
            hash: block.block_hash(),
            height,
            header: block.header,
        };
        trace!(hash = %epoch.hash, %height, "surfacing block");

        self.tip_hash = epoch.hash;
        self.tip_height = height;
        self.surfaced.insert(height, epoch.hash);
        while self.surfaced.len() > MAX_CATCHUP_BLOCKS as usize {
            self.surfaced.pop_first();
        }

        // A failed send means the subscription was dropped.
        self.block_subs.retain(|sub| sub.send(epoch.clone()).is_ok());

        for detail in find_spends(block, height, |outpoint| {
            self.spend_subs.iter().any(|reg| reg.outpoint == *outpoint)
        }) {
            info!(outpoint = %detail.spent_outpoint, spender = %detail.spender_txid, %height, "registered outpoint spent");
            self.spend_subs.retain(|reg| {
                if reg.outpoint != detail.spent_outpoint {
                    return !reg.outbox.is_closed();
                }

                // Spend registrations are one-shot.
                let _ = reg.outbox.send(detail.clone());
                false
            });
        }
    }
}

/// Collects the inputs of `block` spending an outpoint accepted by `is_watched`.
fn find_spends(
    block: &Block,
    height: u32,
    is_watched: impl Fn(&OutPoint) -> bool,
) -> Vec<SpendDetail> {
    let mut spends = Vec::new();

    for tx in &block.txdata {
        for (idx, input) in tx.input.iter().enumerate() {
            if is_watched(&input.previous_output) {
                spends.push(SpendDetail {
                    spent_outpoint: input.previous_output,
                    spender_txid: tx.compute_txid(),
                    spending_tx: tx.clone(),
                    spender_input_index: idx as u32,
                    spending_height: height,
                });
            }
        }
    }

    spends
}

struct Inner {
    reader: Arc<dyn Reader>,
    confirmation_depth: u32,
    state: Mutex<NotifierState>,
}

// Coverage is disabled because when tests pass, most Debug impls will never be invoked.
#[cfg_attr(coverage_nightly, coverage(off))]
impl fmt::Debug for Inner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inner")
            .field("reader", &format!("{:?}", Arc::as_ptr(&self.reader)))
            .field("confirmation_depth", &self.confirmation_depth)
            .field("state", &self.state)
            .finish()
    }
}

impl Inner {
    async fn bootstrap(
        reader: Arc<dyn Reader>,
        confirmation_depth: u32,
    ) -> Result<Self, NotifierError> {
        let (tip_hash, tip_height) = target_block(reader.as_ref(), confirmation_depth).await?;
        info!(%tip_hash, %tip_height, "notifier bootstrapped");

        Ok(Inner {
            reader,
            confirmation_depth,
            state: Mutex::new(NotifierState::new(tip_hash, tip_height)),
        })
    }

    async fn poll(&self) -> Result<(), NotifierError> {
        let (target_hash, target_height) =
            target_block(self.reader.as_ref(), self.confirmation_depth).await?;

        let mut state = self.state.lock().await;
        if target_hash == state.tip_hash {
            return Ok(());
        }

        let gap = target_height.saturating_sub(state.tip_height);
        if gap > MAX_CATCHUP_BLOCKS {
            warn!(%gap, "too many blocks behind, re-bootstrapping");
            state.reset(target_hash, target_height);
            return Ok(());
        }

        // Walk back from the target until a surfaced block is found, that block is the fork point.
        let oldest = state.surfaced.first_key_value().map_or(0, |(&h, _)| h);
        let mut branch = Vec::new();
        let mut cursor = target_hash;
        let mut height = target_height;
        let fork_point = loop {
            if state.surfaced.get(&height) == Some(&cursor) {
                break Some(height);
            }
            if height < oldest {
                break None;
            }

            let block = self.reader.get_block_by_hash(&cursor).await?;
            cursor = block.header.prev_blockhash;
            branch.push((height, block));

            match height.checked_sub(1) {
                Some(parent) => height = parent,
                None => break None,
            }
        };

        match fork_point {
            Some(fork_height) if fork_height < state.tip_height => {
                warn!(
                    old_tip = %state.tip_hash,
                    new_tip = %target_hash,
                    %fork_height,
                    depth = state.tip_height - fork_height,
                    "chain reorganized"
                );
                state.rewind(fork_height);
            }
            Some(_) => {}
            None if branch.is_empty() => {
                warn!(old_tip = %state.tip_hash, new_tip = %target_hash, "best chain shrank below the surfaced history, re-bootstrapping");
                state.reset(target_hash, target_height);
                return Ok(());
            }
            None => {
                warn!(
                    old_tip = %state.tip_hash,
                    new_tip = %target_hash,
                    %oldest,
                    "fork point is older than the surfaced history, surfacing the new branch"
                );
                state.surfaced.clear();
            }
        }

        for (height, block) in branch.iter().rev() {
            state.surface(*height, block);
        }

        Ok(())
    }

    async fn register_spend(
        &self,
        outpoint: OutPoint,
        pk_script: ScriptBuf,
        height_hint: u32,
    ) -> Result<Subscription<SpendDetail>, NotifierError> {
        let mut state = self.state.lock().await;

        if let Some(tx) = self.reader.get_raw_transaction(&outpoint.txid).await? {
            let matches = tx
                .output
                .get(outpoint.vout as usize)
                .is_some_and(|out| out.script_pubkey == pk_script);
            if !matches {
                return Err(NotifierError::PkScriptMismatch(outpoint));
            }
        }

        let (outbox, sub) = Subscription::channel();

        if height_hint <= state.tip_height
            && self
                .reader
                .get_tx_out(&outpoint.txid, outpoint.vout, false)
                .await?
                .is_none()
        {
            debug!(%outpoint, %height_hint, tip = %state.tip_height, "outpoint not in utxo set, rescanning");

            for height in height_hint..=state.tip_height {
                let hash = self.reader.get_block_hash(height).await?;
                let block = self.reader.get_block_by_hash(&hash).await?;

                if let Some(detail) = find_spends(&block, height, |op| *op == outpoint)
                    .into_iter()
                    .next()
                {
                    info!(%outpoint, spender = %detail.spender_txid, %height, "found historical spend");
                    let _ = outbox.send(detail);
                    return Ok(sub);
                }
            }
        }

        trace!(%outpoint, "registering spend");
        state.spend_subs.push(SpendRegistration { outpoint, outbox });

        Ok(sub)
    }
}

async fn target_block(
    reader: &dyn Reader,
    confirmation_depth: u32,
) -> Result<(BlockHash, u32), NotifierError> {
    let (best_hash, best_height) = reader.get_best_block().await?;
    if confirmation_depth == 0 {
        return Ok((best_hash, best_height));
    }

    let height = best_height.saturating_sub(confirmation_depth);
    let hash = reader.get_block_hash(height).await?;

    Ok((hash, height))
}

/// A [`ChainNotifier`] that polls a [`Reader`].
///
/// After construction, this object must be kept around for the polling process to continue.
/// Dropping this object will abort the polling task.
#[derive(Debug)]
pub struct PollingNotifier {
    inner: Arc<Inner>,
    poll_handle: JoinHandle<()>,
}

impl Drop for PollingNotifier {
    fn drop(&mut self) {
        self.poll_handle.abort();
    }
}

impl PollingNotifier {
    /// Primary constructor for [`PollingNotifier`].
    ///
    /// Bootstraps the tip from `reader` and spawns the polling task.
    pub async fn start(reader: Arc<dyn Reader>, cfg: NotifierConfig) -> Result<Self, NotifierError> {
        trace!(?cfg, "starting polling notifier");
        let inner = Arc::new(Inner::bootstrap(reader, cfg.confirmation_depth).await?);

        let inner_thread = inner.clone();
        let poll_handle = task::spawn(async move {
            let mut interval = time::interval(cfg.poll_interval);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

            // This loop has no break condition. It is only aborted when the notifier is dropped.
            loop {
                interval.tick().await;
                if let Err(err) = inner_thread.poll().await {
                    warn!(%err, "could not poll bitcoind");
                }
            }
        });

        Ok(PollingNotifier { inner, poll_handle })
    }

    /// Hash and height of the last surfaced block.
    pub async fn tip(&self) -> (BlockHash, u32) {
        let state = self.inner.state.lock().await;
        (state.tip_hash, state.tip_height)
    }

    /// Returns the number of pending spend registrations.
    pub async fn num_spend_registrations(&self) -> usize {
        self.inner.state.lock().await.spend_subs.len()
    }
}

#[async_trait]
impl ChainNotifier for PollingNotifier {
    async fn register_block_epoch(&self) -> Result<Subscription<BlockEpoch>, NotifierError> {
        if self.poll_handle.is_finished() {
            return Err(NotifierError::Shutdown);
        }

        trace!("subscribing to block epochs");
        let (outbox, sub) = Subscription::channel();
        self.inner.state.lock().await.block_subs.push(outbox);

        Ok(sub)
    }

    async fn register_spend(
        &self,
        outpoint: OutPoint,
        pk_script: ScriptBuf,
        height_hint: u32,
    ) -> Result<Subscription<SpendDetail>, NotifierError> {
        if self.poll_handle.is_finished() {
            return Err(NotifierError::Shutdown);
        }

        self.inner
            .register_spend(outpoint, pk_script, height_hint)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex as StdMutex, time::Duration};

    use bitcoin::{
        absolute::LockTime,
        block::{Header, Version as BlockVersion},
        hashes::Hash,
        transaction::Version,
        Amount, CompactTarget, Sequence, Transaction, TxIn, TxMerkleNode, TxOut, Txid, Witness,
    };
    use futures::StreamExt;

    use super::*;
    use crate::errors::BtcRpcError;

    #[derive(Debug, Default)]
    struct MockReader {
        chain: StdMutex<Vec<Block>>,
    }

    impl MockReader {
        fn with_height(height: u32) -> Self {
            let reader = MockReader::default();
            for _ in 0..=height {
                reader.mine(Vec::new());
            }
            reader
        }

        fn mine(&self, txdata: Vec<Transaction>) -> BlockHash {
            let mut chain = self.chain.lock().unwrap();
            let prev_blockhash = chain
                .last()
                .map(Block::block_hash)
                .unwrap_or_else(BlockHash::all_zeros);
            let block = Block {
                header: Header {
                    version: BlockVersion::ONE,
                    prev_blockhash,
                    merkle_root: TxMerkleNode::all_zeros(),
                    time: chain.len() as u32,
                    bits: CompactTarget::from_consensus(0x207f_ffff),
                    nonce: 0,
                },
                txdata,
            };
            let hash = block.block_hash();
            chain.push(block);
            hash
        }

        /// Replaces the tip by a sibling block carrying `txdata`.
        fn replace_tip(&self, txdata: Vec<Transaction>) -> BlockHash {
            let mut chain = self.chain.lock().unwrap();
            let tip = chain.last_mut().expect("chain is never empty");
            tip.header.nonce += 1;
            tip.txdata = txdata;
            tip.block_hash()
        }

        /// Replaces every block above `height` by a fresh branch of the same length.
        fn reorg_above(&self, height: u32) {
            let mut chain = self.chain.lock().unwrap();
            let mut prev = chain[height as usize].block_hash();
            for block in chain.iter_mut().skip(height as usize + 1) {
                block.header.prev_blockhash = prev;
                block.header.nonce += 1;
                prev = block.block_hash();
            }
        }
    }

    #[async_trait]
    impl Reader for MockReader {
        async fn get_best_block(&self) -> Result<(BlockHash, u32), BtcRpcError> {
            let chain = self.chain.lock().unwrap();
            let tip = chain.last().expect("chain is never empty");
            Ok((tip.block_hash(), chain.len() as u32 - 1))
        }

        async fn get_block_hash(&self, height: u32) -> Result<BlockHash, BtcRpcError> {
            self.chain
                .lock()
                .unwrap()
                .get(height as usize)
                .map(Block::block_hash)
                .ok_or(BtcRpcError::Rpc {
                    code: -8,
                    message: "Block height out of range".into(),
                })
        }

        async fn get_block_by_hash(&self, hash: &BlockHash) -> Result<Block, BtcRpcError> {
            self.chain
                .lock()
                .unwrap()
                .iter()
                .find(|b| b.block_hash() == *hash)
                .cloned()
                .ok_or(BtcRpcError::Rpc {
                    code: -5,
                    message: "Block not found".into(),
                })
        }

        async fn get_raw_transaction(
            &self,
            txid: &Txid,
        ) -> Result<Option<Transaction>, BtcRpcError> {
            Ok(self
                .chain
                .lock()
                .unwrap()
                .iter()
                .flat_map(|b| b.txdata.iter())
                .find(|tx| tx.compute_txid() == *txid)
                .cloned())
        }

        async fn get_tx_out(
            &self,
            txid: &Txid,
            vout: u32,
            _include_mempool: bool,
        ) -> Result<Option<TxOut>, BtcRpcError> {
            let chain = self.chain.lock().unwrap();
            let txs = chain.iter().flat_map(|b| b.txdata.iter());
            let spent = txs
                .clone()
                .flat_map(|tx| tx.input.iter())
                .any(|input| input.previous_output == OutPoint::new(*txid, vout));
            if spent {
                return Ok(None);
            }

            Ok(txs
                .clone()
                .find(|tx| tx.compute_txid() == *txid)
                .and_then(|tx| tx.output.get(vout as usize).cloned()))
        }
    }

    fn funding_tx(script: ScriptBuf) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::new(Txid::all_zeros(), 7),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: Amount::from_sat(100_000),
                script_pubkey: script,
            }],
        }
    }

    fn spending_tx(outpoint: OutPoint) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: outpoint,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::from_slice(&[[1u8; 64].as_slice()]),
            }],
            output: vec![TxOut {
                value: Amount::from_sat(90_000),
                script_pubkey: ScriptBuf::new(),
            }],
        }
    }

    fn script() -> ScriptBuf {
        ScriptBuf::from_bytes(vec![0x51, 0x20, 0xab])
    }

    #[tokio::test]
    async fn surfaces_every_block_in_order() {
        let reader = Arc::new(MockReader::with_height(10));
        let inner = Inner::bootstrap(reader.clone(), 0).await.unwrap();

        let (outbox, mut sub) = Subscription::channel();
        inner.state.lock().await.block_subs.push(outbox);

        let hashes: Vec<_> = (0..3).map(|_| reader.mine(Vec::new())).collect();
        inner.poll().await.unwrap();

        for (i, hash) in hashes.into_iter().enumerate() {
            let epoch = sub.next().await.unwrap();
            assert_eq!(epoch.hash, hash);
            assert_eq!(epoch.height, 11 + i as u32);
        }

        let state = inner.state.lock().await;
        assert_eq!(state.tip_height, 13);
    }

    #[tokio::test]
    async fn respects_confirmation_depth() {
        let reader = Arc::new(MockReader::with_height(10));
        let inner = Inner::bootstrap(reader.clone(), 2).await.unwrap();
        assert_eq!(inner.state.lock().await.tip_height, 8);

        let (outbox, mut sub) = Subscription::channel();
        inner.state.lock().await.block_subs.push(outbox);

        reader.mine(Vec::new());
        inner.poll().await.unwrap();

        let epoch = sub.next().await.unwrap();
        assert_eq!(epoch.height, 9);
        assert_eq!(inner.state.lock().await.tip_height, 9);
    }

    #[tokio::test]
    async fn reorg_surfaces_the_new_branch() {
        let reader = Arc::new(MockReader::with_height(7));
        let inner = Inner::bootstrap(reader.clone(), 0).await.unwrap();
        for _ in 0..3 {
            reader.mine(Vec::new());
        }
        inner.poll().await.unwrap();
        let old_tip = inner.state.lock().await.tip_hash;

        let (outbox, mut sub) = Subscription::channel();
        inner.state.lock().await.block_subs.push(outbox);

        reader.reorg_above(8);
        let new_tip = reader.mine(Vec::new());
        inner.poll().await.unwrap();

        for height in 9..=11 {
            let epoch = sub.next().await.unwrap();
            assert_eq!(epoch.height, height);
            assert_eq!(epoch.hash, reader.get_block_hash(height).await.unwrap());
        }
        assert_ne!(reader.get_block_hash(10).await.unwrap(), old_tip);

        let state = inner.state.lock().await;
        assert_eq!(state.tip_hash, new_tip);
        assert_eq!(state.tip_height, 11);
        assert_eq!(state.surfaced.get(&9), Some(&reader.get_block_hash(9).await.unwrap()));
    }

    #[tokio::test]
    async fn sibling_of_the_tip_is_surfaced_with_its_spends() {
        let reader = Arc::new(MockReader::with_height(5));
        let funding = funding_tx(script());
        reader.mine(vec![funding.clone()]);
        let inner = Inner::bootstrap(reader.clone(), 0).await.unwrap();

        let outpoint = OutPoint::new(funding.compute_txid(), 0);
        let mut spend = inner.register_spend(outpoint, script(), 6).await.unwrap();
        let (outbox, mut blocks) = Subscription::channel();
        inner.state.lock().await.block_subs.push(outbox);

        let stale = reader.mine(Vec::new());
        inner.poll().await.unwrap();
        assert_eq!(blocks.next().await.unwrap().hash, stale);

        let spender = spending_tx(outpoint);
        let replacement = reader.replace_tip(vec![spender.clone()]);
        inner.poll().await.unwrap();

        let epoch = blocks.next().await.unwrap();
        assert_eq!(epoch.hash, replacement);
        assert_eq!(epoch.height, 7);

        let detail = spend.next().await.unwrap();
        assert_eq!(detail.spender_txid, spender.compute_txid());
        assert_eq!(detail.spending_height, 7);
        assert_eq!(inner.state.lock().await.tip_hash, replacement);
    }

    #[tokio::test]
    async fn shrunk_chain_rewinds_to_the_surfaced_ancestor() {
        let reader = Arc::new(MockReader::with_height(4));
        let inner = Inner::bootstrap(reader.clone(), 0).await.unwrap();
        reader.mine(Vec::new());
        inner.poll().await.unwrap();

        reader.chain.lock().unwrap().pop();
        inner.poll().await.unwrap();

        let state = inner.state.lock().await;
        assert_eq!(state.tip_height, 4);
        assert_eq!(state.tip_hash, reader.get_block_hash(4).await.unwrap());
        assert!(!state.surfaced.contains_key(&5));
    }

    #[tokio::test]
    async fn spend_is_delivered_once() {
        let reader = Arc::new(MockReader::with_height(5));
        let funding = funding_tx(script());
        reader.mine(vec![funding.clone()]);
        let inner = Inner::bootstrap(reader.clone(), 0).await.unwrap();

        let outpoint = OutPoint::new(funding.compute_txid(), 0);
        let mut sub = inner.register_spend(outpoint, script(), 6).await.unwrap();
        assert_eq!(inner.state.lock().await.spend_subs.len(), 1);

        let spender = spending_tx(outpoint);
        reader.mine(vec![spender.clone()]);
        inner.poll().await.unwrap();

        let detail = sub.next().await.unwrap();
        assert_eq!(detail.spent_outpoint, outpoint);
        assert_eq!(detail.spender_txid, spender.compute_txid());
        assert_eq!(detail.spender_input_index, 0);
        assert_eq!(detail.spending_height, 7);

        assert!(inner.state.lock().await.spend_subs.is_empty());
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn historical_spend_is_found_by_rescan() {
        let reader = Arc::new(MockReader::with_height(5));
        let funding = funding_tx(script());
        reader.mine(vec![funding.clone()]);
        let outpoint = OutPoint::new(funding.compute_txid(), 0);
        reader.mine(Vec::new());
        reader.mine(vec![spending_tx(outpoint)]);
        let inner = Inner::bootstrap(reader.clone(), 0).await.unwrap();

        let mut sub = inner.register_spend(outpoint, script(), 6).await.unwrap();

        let detail = sub.next().await.unwrap();
        assert_eq!(detail.spending_height, 8);
        assert!(inner.state.lock().await.spend_subs.is_empty());
    }

    #[tokio::test]
    async fn mismatched_pk_script_is_rejected() {
        let reader = Arc::new(MockReader::with_height(5));
        let funding = funding_tx(script());
        reader.mine(vec![funding.clone()]);
        let inner = Inner::bootstrap(reader.clone(), 0).await.unwrap();

        let outpoint = OutPoint::new(funding.compute_txid(), 0);
        let res = inner.register_spend(outpoint, ScriptBuf::new(), 6).await;

        assert_eq!(res.unwrap_err(), NotifierError::PkScriptMismatch(outpoint));
    }

    #[tokio::test]
    async fn dropped_block_subscription_is_forgotten() {
        let reader = Arc::new(MockReader::with_height(3));
        let inner = Inner::bootstrap(reader.clone(), 0).await.unwrap();

        let (outbox, sub) = Subscription::<BlockEpoch>::channel();
        inner.state.lock().await.block_subs.push(outbox);
        drop(sub);

        reader.mine(Vec::new());
        inner.poll().await.unwrap();

        assert!(inner.state.lock().await.block_subs.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn polling_task_delivers_blocks() {
        let reader = Arc::new(MockReader::with_height(2));
        let cfg = NotifierConfig::default().with_poll_interval(Duration::from_secs(1));
        let notifier = PollingNotifier::start(reader.clone(), cfg).await.unwrap();

        let mut sub = notifier.register_block_epoch().await.unwrap();
        let confirmed = reader.get_block_hash(2).await.unwrap();
        reader.mine(Vec::new());

        let epoch = time::timeout(Duration::from_secs(10), sub.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(epoch.hash, confirmed);
        assert_eq!(notifier.tip().await, (confirmed, 2));
    }
}
