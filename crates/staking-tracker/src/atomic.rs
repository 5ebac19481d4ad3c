//! The atomic slasher.
//!
//! A slashing transaction can only be completed with the signature of one of the delegation's
//! finality providers. Covenant members sign it with adaptor signatures encrypted under each
//! provider's key, so a slashing transaction found on Bitcoin reveals the key of the provider
//! that completed it. That key slashes the provider's other delegations too, which is what
//! keeps the slashing atomic.

use std::sync::Arc;

use btc_notify::{event::BlockEpoch, subscription::Subscription};
use futures::StreamExt;
use secp256k1::SecretKey;
use tokio::{sync::mpsc, task::JoinSet};
use tracing::{debug, error, info, warn};
use vigilante_app_chain::pagination::PageRequest;
use vigilante_primitives::{
    delegation::{BtcDelegation, DelegationStatus, SlashingPath, SlashingTxInfo},
    msgs::MsgSelectiveSlashingEvidence,
    secp::pk_hex,
    witness::{parse_slashing_witness, ParsedSlashingWitness},
};

use crate::{
    constants::{SELECTIVE_SLASHING_EXPECTED_ERRORS, SELECTIVE_SLASHING_UNRECOVERABLE_ERRORS},
    context::{join_all, Context, Halted},
    errors::SlasherError,
    index::BtcDelegationIndex,
};

/// Watches Bitcoin for slashing transactions and reports the providers that completed them.
#[derive(Debug)]
pub(crate) struct AtomicSlasher {
    ctx: Context,
    index: Arc<BtcDelegationIndex>,
    recovered_keys: mpsc::Sender<SecretKey>,
    tasks: JoinSet<()>,
    started: bool,
}

impl AtomicSlasher {
    /// Recovered keys are handed to `recovered_keys`.
    pub(crate) fn new(
        ctx: Context,
        index: Arc<BtcDelegationIndex>,
        recovered_keys: mpsc::Sender<SecretKey>,
    ) -> Self {
        Self {
            ctx,
            index,
            recovered_keys,
            tasks: JoinSet::new(),
            started: false,
        }
    }

    pub(crate) async fn start(&mut self) -> Result<(), SlasherError> {
        if self.started {
            return Err(SlasherError::AlreadyStarted);
        }

        let blocks = self.ctx.notifier.register_block_epoch().await?;
        let (queue_tx, queue_rx) = mpsc::channel(self.ctx.cfg.slashing_queue_capacity);

        self.tasks
            .spawn(track_delegations(self.ctx.clone(), self.index.clone()));
        self.tasks.spawn(track_slashing_txs(
            self.ctx.clone(),
            self.index.clone(),
            blocks,
            queue_tx,
        ));
        self.tasks.spawn(report_selective_slashing(
            self.ctx.clone(),
            self.index.clone(),
            queue_rx,
            self.recovered_keys.clone(),
        ));

        self.started = true;
        info!("atomic slasher started");
        Ok(())
    }

    /// Waits for the routines to exit. Shutdown must have been requested on the context.
    pub(crate) async fn stop(&mut self) {
        join_all("atomic slasher", &mut self.tasks).await;
        info!("atomic slasher stopped");
    }
}

/// Periodically adds every delegation known to the App chain to the index.
async fn track_delegations(ctx: Context, index: Arc<BtcDelegationIndex>) {
    let mut interval = tokio::time::interval(ctx.cfg.check_delegations_interval);

    loop {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let Some(added) = sync_index(&ctx, &index).await else {
            break;
        };
        if added > 0 {
            debug!(%added, tracked = index.len(), "indexed new delegations");
        }
    }
}

/// Returns the number of delegations added, or `None` on shutdown.
async fn sync_index(ctx: &Context, index: &BtcDelegationIndex) -> Option<usize> {
    let mut added = 0;

    let mut next = Some(PageRequest::first(ctx.cfg.new_delegations_batch_size));
    while let Some(req) = next.take() {
        let page = match ctx
            .retry("btc_delegations", || {
                ctx.app.btc_delegations(DelegationStatus::Any, req.clone())
            })
            .await
        {
            Ok(page) => page,
            Err(Halted::Shutdown) => return None,
            // the cursor is lost with the page, the next sweep starts over
            Err(Halted::Permanent(_)) => break,
        };
        next = page.next_request(&req);

        for del in &page.items {
            match del.tracked() {
                Ok(tracked) => {
                    if index.add(tracked) {
                        added += 1;
                    }
                }
                Err(err) => {
                    warn!(
                        staking_tx_hash = %del.staking_tx_hash(),
                        %err,
                        "skipping malformed delegation"
                    );
                }
            }
        }
    }

    ctx.metrics.tracked_delegations.set(index.len() as i64);
    Some(added)
}

/// Looks every transaction of every new block up in the index and queues the slashing ones.
///
/// Blocks the block stream while the queue is full rather than drop a slashing transaction.
async fn track_slashing_txs(
    ctx: Context,
    index: Arc<BtcDelegationIndex>,
    mut blocks: Subscription<BlockEpoch>,
    queue: mpsc::Sender<SlashingTxInfo>,
) {
    loop {
        let epoch = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            epoch = blocks.next() => match epoch {
                Some(epoch) => epoch,
                None => {
                    warn!("block epoch stream closed");
                    break;
                }
            },
        };

        let block = match ctx
            .retry("get_block_by_hash", || ctx.btc.get_block_by_hash(&epoch.hash))
            .await
        {
            Ok(block) => block,
            Err(Halted::Shutdown) => break,
            Err(Halted::Permanent(_)) => {
                error!(height = epoch.height, hash = %epoch.hash, "skipping undecodable block");
                continue;
            }
        };

        for tx in block.txdata {
            let txid = tx.compute_txid();
            let Some((del, path)) = index.find_by_spend(&txid) else {
                continue;
            };

            info!(
                %txid,
                staking_tx_hash = %del.staking_tx_hash,
                ?path,
                height = epoch.height,
                "slashing tx found on bitcoin"
            );
            let info = SlashingTxInfo {
                path,
                staking_tx_hash: del.staking_tx_hash,
                tx,
            };

            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return,
                res = queue.send(info) => if res.is_err() {
                    return;
                },
            }
        }
    }
}

/// Reports every queued slashing transaction as selective slashing evidence.
async fn report_selective_slashing(
    ctx: Context,
    index: Arc<BtcDelegationIndex>,
    mut queue: mpsc::Receiver<SlashingTxInfo>,
    recovered_keys: mpsc::Sender<SecretKey>,
) {
    loop {
        let info = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            info = queue.recv() => match info {
                Some(info) => info,
                None => break,
            },
        };

        let staking_tx_hash = info.staking_tx_hash;
        match handle_slashing_tx(&ctx, &info).await {
            Ok(Some(fp_sk)) => {
                tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => break,
                    res = recovered_keys.send(fp_sk) => if res.is_err() {
                        warn!(%staking_tx_hash, "slashing enforcer is gone");
                    },
                }
            }
            Ok(None) => {}
            Err(SlasherError::Shutdown) => break,
            Err(err) => {
                error!(%staking_tx_hash, path = ?info.path, %err, "could not handle slashing tx");
            }
        }

        // the output is spent for good
        index.remove(&staking_tx_hash);
        ctx.metrics.tracked_delegations.set(index.len() as i64);
    }
}

/// Recovers the key of the provider that completed `info.tx` and reports it.
///
/// Returns the key to slash the provider's other delegations with, or `None` if the provider is
/// already slashed.
async fn handle_slashing_tx(
    ctx: &Context,
    info: &SlashingTxInfo,
) -> Result<Option<SecretKey>, SlasherError> {
    let staking_tx_hash = info.staking_tx_hash;

    let del = ctx
        .retry("btc_delegation", || ctx.app.btc_delegation(&staking_tx_hash))
        .await
        .map_err(|halt| halt.into_error(SlasherError::Shutdown))?;
    let params = ctx
        .staking_params(del.params_version)
        .await
        .map_err(|halt| halt.into_error(SlasherError::Shutdown))?;

    let parsed = parse_slashing_witness(&info.tx, &params.covenant_pks, &del.fp_pks)?;
    let fp_pk = parsed.fp_pk;

    let fp = ctx
        .retry("finality_provider", || ctx.app.finality_provider(&fp_pk))
        .await
        .map_err(|halt| halt.into_error(SlasherError::Shutdown))?;
    if fp.is_slashed() {
        info!(%fp_pk, %staking_tx_hash, "finality provider already slashed");
        return Ok(None);
    }

    let fp_sk = recover_fp_sk(&del, info.path, &parsed)?;
    info!(%fp_pk, %staking_tx_hash, "recovered key of selectively slashing finality provider");

    let msg = MsgSelectiveSlashingEvidence::new(ctx.app.must_get_addr(), staking_tx_hash, &fp_sk);
    let res = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return Err(SlasherError::Shutdown),
        res = ctx.app.reliably_send_msg(
            msg.into(),
            SELECTIVE_SLASHING_EXPECTED_ERRORS,
            SELECTIVE_SLASHING_UNRECOVERABLE_ERRORS,
        ) => res?,
    };

    match res {
        Some(resp) => info!(
            %fp_pk,
            %staking_tx_hash,
            tx_hash = %resp.tx_hash,
            "reported selective slashing"
        ),
        None => info!(%fp_pk, %staking_tx_hash, "selective slashing already reported"),
    }

    Ok(Some(fp_sk))
}

/// Recovers the provider's key from the first covenant member whose decrypted signature appears
/// in the witness.
///
/// A slashing transaction that carries a quorum of covenant signatures none of which opens an
/// adaptor signature was not built from the delegation's pre-signed slashing transaction.
pub(crate) fn recover_fp_sk(
    del: &BtcDelegation,
    path: SlashingPath,
    parsed: &ParsedSlashingWitness,
) -> Result<SecretKey, SlasherError> {
    let staking_tx_hash = del.staking_tx_hash();
    let fp_pk = parsed.fp_pk;
    let fp_del_idx = del
        .fp_index(&fp_pk)
        .ok_or(SlasherError::UnknownFinalityProvider {
            staking_tx_hash,
            fp_pk,
        })?;

    let adaptor_sigs = del.covenant_adaptor_sigs(path);
    let recovered = adaptor_sigs.iter().find_map(|cov| {
        let sig = parsed.covenant_sigs.get(&pk_hex(&cov.cov_pk))?;
        let adaptor_sig = cov.adaptor_sigs.get(fp_del_idx)?;
        adaptor_sig.recover(sig, &fp_pk).ok()
    });

    recovered.ok_or_else(|| {
        let signers: Vec<_> = parsed.covenant_sigs.keys().collect();
        error!(
            %staking_tx_hash,
            %fp_pk,
            ?path,
            %fp_del_idx,
            ?signers,
            covenant_members = adaptor_sigs.len(),
            "no covenant signature in the slashing tx opens an adaptor signature"
        );
        SlasherError::KeyRecoveryFailed {
            staking_tx_hash,
            fp_pk,
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use secp256k1::SECP256K1;
    use vigilante_primitives::msgs::AppMsg;
    use vigilante_test_utils::{bitcoin::generate_keypairs, fixtures::Covenant};

    use super::*;
    use crate::test_utils::{wait_until, TestEnv};

    fn x_only(sk: &SecretKey) -> bitcoin::XOnlyPublicKey {
        sk.x_only_public_key(SECP256K1).0
    }

    #[test]
    fn key_is_recovered_from_either_path() {
        let env = TestEnv::new(100);
        let covenant = Covenant::new(1, 5, 3);
        let (fp_sks, _) = generate_keypairs(3);
        let fixture = env.active_delegation(&covenant, &fp_sks);
        let del = &fixture.delegation;

        for path in [SlashingPath::Staking, SlashingPath::Unbonding] {
            for fp_idx in 0..fp_sks.len() {
                let tx = fixture.signed_slashing_tx(path, fp_idx);
                let parsed =
                    parse_slashing_witness(&tx, &covenant.params.covenant_pks, &del.fp_pks)
                        .unwrap();
                assert_eq!(parsed.fp_pk, x_only(&fp_sks[fp_idx]));

                let sk = recover_fp_sk(del, path, &parsed).unwrap();
                assert_eq!(x_only(&sk), x_only(&fp_sks[fp_idx]));
            }
        }
    }

    #[test]
    fn no_key_without_matching_covenant_signature() {
        let env = TestEnv::new(100);
        let covenant = Covenant::new(1, 3, 2);
        let (fp_sks, _) = generate_keypairs(1);
        let fixture = env.active_delegation(&covenant, &fp_sks);
        let del = &fixture.delegation;

        let tx = fixture.signed_slashing_tx(SlashingPath::Staking, 0);
        let mut parsed =
            parse_slashing_witness(&tx, &covenant.params.covenant_pks, &del.fp_pks).unwrap();

        let failed = SlasherError::KeyRecoveryFailed {
            staking_tx_hash: del.staking_tx_hash(),
            fp_pk: x_only(&fp_sks[0]),
        };

        // signatures from the staking path cannot open the unbonding path's adaptor signatures
        assert_eq!(
            recover_fp_sk(del, SlashingPath::Unbonding, &parsed).unwrap_err(),
            failed
        );

        parsed.covenant_sigs.clear();
        assert_eq!(
            recover_fp_sk(del, SlashingPath::Staking, &parsed).unwrap_err(),
            failed
        );
    }

    #[test]
    fn provider_outside_the_delegation_is_told_apart() {
        let env = TestEnv::new(100);
        let covenant = Covenant::new(1, 3, 2);
        let (fp_sks, _) = generate_keypairs(2);
        let fixture = env.active_delegation(&covenant, &fp_sks[..1]);
        let del = &fixture.delegation;

        let tx = fixture.signed_slashing_tx(SlashingPath::Staking, 0);
        let mut parsed =
            parse_slashing_witness(&tx, &covenant.params.covenant_pks, &del.fp_pks).unwrap();
        parsed.fp_pk = x_only(&fp_sks[1]);

        assert_eq!(
            recover_fp_sk(del, SlashingPath::Staking, &parsed).unwrap_err(),
            SlasherError::UnknownFinalityProvider {
                staking_tx_hash: del.staking_tx_hash(),
                fp_pk: x_only(&fp_sks[1]),
            }
        );
    }

    #[tokio::test]
    async fn slashing_tx_on_bitcoin_reveals_the_provider() {
        let mut env = TestEnv::new(100);
        // a single sweep, so the handled delegation is not indexed again
        env.cfg.check_delegations_interval = Duration::from_secs(3600);
        let covenant = Covenant::new(1, 3, 2);
        let (fp_sks, _) = generate_keypairs(2);
        let fixture = env.active_delegation(&covenant, &fp_sks);
        let other = env.active_delegation(&covenant, &fp_sks[1..]);

        let ctx = env.context();
        let index = Arc::new(BtcDelegationIndex::new());
        let (keys_tx, mut keys_rx) = mpsc::channel(1);
        let mut slasher = AtomicSlasher::new(ctx.clone(), index.clone(), keys_tx);
        slasher.start().await.unwrap();
        assert_eq!(slasher.start().await, Err(SlasherError::AlreadyStarted));

        wait_until(|| index.len() == 2).await;
        assert_eq!(ctx.metrics.tracked_delegations.get(), 2);

        env.btc
            .mine(vec![fixture.signed_slashing_tx(SlashingPath::Staking, 1)]);

        let sk = tokio::time::timeout(Duration::from_secs(5), keys_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(x_only(&sk), x_only(&fp_sks[1]));

        let sent = env.app.sent_msgs();
        assert_eq!(sent.len(), 1);
        let AppMsg::SelectiveSlashingEvidence(msg) = &sent[0] else {
            panic!("unexpected message {:?}", sent[0]);
        };
        assert_eq!(msg.staking_tx_hash, fixture.staking_tx_hash().to_string());
        assert!(env.app.is_slashed(&x_only(&fp_sks[1])));

        wait_until(|| index.get(&fixture.staking_tx_hash()).is_none()).await;
        assert!(index.get(&other.staking_tx_hash()).is_some());

        ctx.cancel.cancel();
        slasher.stop().await;
    }

    #[tokio::test]
    async fn unbonding_slashing_tx_is_detected() {
        let env = TestEnv::new(100);
        let covenant = Covenant::new(1, 3, 2);
        let (fp_sks, _) = generate_keypairs(1);
        let fixture = env.active_delegation(&covenant, &fp_sks);

        let ctx = env.context();
        let index = Arc::new(BtcDelegationIndex::new());
        let (keys_tx, mut keys_rx) = mpsc::channel(1);
        let mut slasher = AtomicSlasher::new(ctx.clone(), index.clone(), keys_tx);
        slasher.start().await.unwrap();
        wait_until(|| index.len() == 1).await;

        env.btc.mine(vec![fixture.signed_unbonding_tx()]);
        env.btc
            .mine(vec![fixture.signed_slashing_tx(SlashingPath::Unbonding, 0)]);

        let sk = tokio::time::timeout(Duration::from_secs(5), keys_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(x_only(&sk), x_only(&fp_sks[0]));
        assert_eq!(env.app.sent_msgs().len(), 1);

        ctx.cancel.cancel();
        slasher.stop().await;
    }

    #[tokio::test]
    async fn already_slashed_provider_is_not_reported() {
        let mut env = TestEnv::new(100);
        env.cfg.check_delegations_interval = Duration::from_secs(3600);
        let covenant = Covenant::new(1, 3, 2);
        let (fp_sks, _) = generate_keypairs(1);
        let fixture = env.active_delegation(&covenant, &fp_sks);
        env.app.slash_finality_provider(&x_only(&fp_sks[0]), 7);

        let ctx = env.context();
        let index = Arc::new(BtcDelegationIndex::new());
        let (keys_tx, mut keys_rx) = mpsc::channel(1);
        let mut slasher = AtomicSlasher::new(ctx.clone(), index.clone(), keys_tx);
        slasher.start().await.unwrap();
        wait_until(|| index.len() == 1).await;

        env.btc
            .mine(vec![fixture.signed_slashing_tx(SlashingPath::Staking, 0)]);
        wait_until(|| index.is_empty()).await;

        assert!(env.app.sent_msgs().is_empty());
        assert!(keys_rx.try_recv().is_err());

        ctx.cancel.cancel();
        slasher.stop().await;
    }
}
