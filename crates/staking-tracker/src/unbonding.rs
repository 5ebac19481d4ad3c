//! The unbonding watcher.
//!
//! Stakers may unbond early by broadcasting the pre-signed unbonding transaction themselves. The
//! watcher follows the staking output of every ACTIVE delegation and, when the unbonding
//! transaction spends it, reports the staker's signature so the App chain stops counting the
//! delegation's voting power.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use bitcoin::{secp256k1::schnorr::Signature, Txid};
use btc_notify::{
    event::{BlockEpoch, SpendDetail},
    subscription::Subscription,
};
use futures::StreamExt;
use tokio::{sync::mpsc, task::JoinSet};
use tracing::{debug, error, info, warn};
use vigilante_app_chain::{errors::AppChainError, pagination::PageRequest};
use vigilante_common::retry::{RetryAction, Strategy};
use vigilante_primitives::{
    delegation::{DelegationStatus, TrackedDelegation},
    msgs::MsgBtcUndelegate,
};

use crate::{
    constants::{
        INACTIVE_DELEGATION_CHANNEL_CAPACITY, UNBONDING_EXPECTED_ERRORS,
        UNBONDING_UNRECOVERABLE_ERRORS,
    },
    context::{join_all, Context, Halted},
    errors::UnbondingWatcherError,
};

/// Delegations whose staking output is being watched.
#[derive(Debug, Default)]
struct Watched {
    delegations: Mutex<HashMap<Txid, TrackedDelegation>>,
}

impl Watched {
    fn delegations(&self) -> MutexGuard<'_, HashMap<Txid, TrackedDelegation>> {
        self.delegations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn contains(&self, staking_tx_hash: &Txid) -> bool {
        self.delegations().contains_key(staking_tx_hash)
    }

    /// Returns `false` if the delegation was already watched.
    fn insert(&self, del: TrackedDelegation) -> bool {
        let mut delegations = self.delegations();
        if delegations.contains_key(&del.staking_tx_hash) {
            return false;
        }
        delegations.insert(del.staking_tx_hash, del);

        true
    }

    fn remove(&self, staking_tx_hash: &Txid) {
        self.delegations().remove(staking_tx_hash);
    }

    fn len(&self) -> usize {
        self.delegations().len()
    }
}

/// Reports early unbondings of ACTIVE delegations.
#[derive(Debug)]
pub(crate) struct UnbondingWatcher {
    ctx: Context,
    watched: Arc<Watched>,
    best_height: Arc<AtomicU32>,
    tasks: JoinSet<()>,
    started: bool,
}

impl UnbondingWatcher {
    pub(crate) fn new(ctx: Context) -> Self {
        Self {
            ctx,
            watched: Arc::new(Watched::default()),
            best_height: Arc::new(AtomicU32::new(0)),
            tasks: JoinSet::new(),
            started: false,
        }
    }

    pub(crate) async fn start(&mut self) -> Result<(), UnbondingWatcherError> {
        if self.started {
            return Err(UnbondingWatcherError::AlreadyStarted);
        }

        let (_, height) = self.ctx.btc.get_best_block().await?;
        self.best_height.store(height, Ordering::Release);
        let blocks = self.ctx.notifier.register_block_epoch().await?;

        let (new_tx, new_rx) = mpsc::channel(self.ctx.cfg.new_delegations_batch_size as usize);
        let (inactive_tx, inactive_rx) = mpsc::channel(INACTIVE_DELEGATION_CHANNEL_CAPACITY);

        self.tasks.spawn(handle_new_blocks(
            self.ctx.clone(),
            self.best_height.clone(),
            blocks,
        ));
        self.tasks.spawn(fetch_delegations(
            self.ctx.clone(),
            self.watched.clone(),
            self.best_height.clone(),
            new_tx,
        ));
        self.tasks.spawn(handle_delegations(
            self.ctx.clone(),
            self.watched.clone(),
            new_rx,
            inactive_tx,
            inactive_rx,
        ));

        self.started = true;
        info!(%height, "unbonding watcher started");
        Ok(())
    }

    /// Waits for the routines to exit. Shutdown must have been requested on the context.
    pub(crate) async fn stop(&mut self) {
        join_all("unbonding watcher", &mut self.tasks).await;
        info!("unbonding watcher stopped");
    }
}

async fn handle_new_blocks(
    ctx: Context,
    best_height: Arc<AtomicU32>,
    mut blocks: Subscription<BlockEpoch>,
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

        best_height.store(epoch.height, Ordering::Release);
        debug!(height = epoch.height, hash = %epoch.hash, "new best block");
    }
}

/// Periodically pushes the ACTIVE delegations that are not watched yet.
///
/// Sweeps are skipped while the Bitcoin node lags the App chain's light client, since the
/// staking transactions of the newest delegations may not be known to it.
async fn fetch_delegations(
    ctx: Context,
    watched: Arc<Watched>,
    best_height: Arc<AtomicU32>,
    new_delegations: mpsc::Sender<TrackedDelegation>,
) {
    let mut interval = tokio::time::interval(ctx.cfg.check_delegations_interval);

    loop {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let light_client_tip = match ctx
            .retry("btc_client_tip_height", || ctx.app.btc_client_tip_height())
            .await
        {
            Ok(tip) => tip,
            Err(Halted::Shutdown) => break,
            Err(Halted::Permanent(_)) => continue,
        };
        let best = best_height.load(Ordering::Acquire);
        if best < light_client_tip {
            debug!(%best, %light_client_tip, "bitcoin node is behind the light client, skipping");
            continue;
        }

        let mut next = Some(PageRequest::first(ctx.cfg.new_delegations_batch_size));
        while let Some(req) = next.take() {
            let page = match ctx
                .retry("btc_delegations", || {
                    ctx.app.btc_delegations(DelegationStatus::Active, req.clone())
                })
                .await
            {
                Ok(page) => page,
                Err(Halted::Shutdown) => return,
                // the cursor is lost with the page, the next sweep starts over
                Err(Halted::Permanent(_)) => break,
            };
            next = page.next_request(&req);

            for del in page.items {
                let staking_tx_hash = del.staking_tx_hash();
                if watched.contains(&staking_tx_hash) {
                    continue;
                }

                let tracked = match del.tracked() {
                    Ok(tracked) => tracked,
                    Err(err) => {
                        warn!(%staking_tx_hash, %err, "skipping malformed delegation");
                        continue;
                    }
                };

                tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => return,
                    res = new_delegations.send(tracked) => if res.is_err() {
                        return;
                    },
                }
            }
        }
    }
}

/// Starts watching new delegations and forgets the ones that became inactive.
async fn handle_delegations(
    ctx: Context,
    watched: Arc<Watched>,
    mut new_delegations: mpsc::Receiver<TrackedDelegation>,
    inactive_tx: mpsc::Sender<Txid>,
    mut inactive_rx: mpsc::Receiver<Txid>,
) {
    let mut watchers = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            Some(del) = new_delegations.recv() => {
                let staking_tx_hash = del.staking_tx_hash;
                if !watched.insert(del.clone()) {
                    continue;
                }

                let spend = match ctx
                    .notifier
                    .register_spend(
                        del.staking_outpoint,
                        del.staking_pk_script.clone(),
                        del.start_height,
                    )
                    .await
                {
                    Ok(spend) => spend,
                    Err(err) => {
                        // retried on the next sweep
                        warn!(%staking_tx_hash, %err, "could not watch staking output");
                        watched.remove(&staking_tx_hash);
                        continue;
                    }
                };

                debug!(%staking_tx_hash, watched = watched.len(), "watching staking output");
                watchers.spawn(watch_for_spend(ctx.clone(), del, spend, inactive_tx.clone()));
            }
            Some(staking_tx_hash) = inactive_rx.recv() => {
                watched.remove(&staking_tx_hash);
                debug!(%staking_tx_hash, watched = watched.len(), "delegation no longer watched");
            }
            Some(res) = watchers.join_next(), if !watchers.is_empty() => {
                if let Err(err) = res {
                    if err.is_panic() {
                        error!(%err, "spend watcher panicked");
                    }
                }
            }
            else => break,
        }
    }

    watchers.shutdown().await;
}

/// Waits for the staking output to be spent, reports the spend if it is the unbonding
/// transaction, then hands the delegation back as inactive.
async fn watch_for_spend(
    ctx: Context,
    del: TrackedDelegation,
    mut spend: Subscription<SpendDetail>,
    inactive: mpsc::Sender<Txid>,
) {
    let staking_tx_hash = del.staking_tx_hash;

    let detail = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return,
        detail = spend.next() => match detail {
            Some(detail) => detail,
            None => {
                warn!(%staking_tx_hash, "spend notification dropped");
                return;
            }
        },
    };

    match parse_staker_signature(&detail, &del) {
        Ok(sig) => {
            info!(
                %staking_tx_hash,
                unbonding_txid = %detail.spender_txid,
                height = detail.spending_height,
                "staker unbonded early"
            );
            report_unbonding(&ctx, staking_tx_hash, &sig).await;
        }
        Err(err) => {
            info!(
                %staking_tx_hash,
                spender_txid = %detail.spender_txid,
                %err,
                "staking output spent by another transaction"
            );
            wait_until_inactive(&ctx, staking_tx_hash).await;
        }
    }

    if ctx.cancel.is_cancelled() {
        return;
    }

    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => {}
        _ = inactive.send(staking_tx_hash) => {}
    }
}

/// Extracts the staker's signature from the transaction that spent the staking output, provided
/// it is the delegation's unbonding transaction.
///
/// The unbonding transaction has a single output equal to the delegation's unbonding output. The
/// unbonding leaf is spent with the covenant signatures, the staker signature, the script and the
/// control block, so the staker signature is the third element from the end of the witness.
pub(crate) fn parse_staker_signature(
    detail: &SpendDetail,
    del: &TrackedDelegation,
) -> Result<Signature, UnbondingWatcherError> {
    let txid = detail.spender_txid;
    let tx = &detail.spending_tx;

    match tx.output.as_slice() {
        [output] if *output == del.unbonding_output => {}
        _ => return Err(UnbondingWatcherError::NotUnbonding(txid)),
    }

    let witness = &tx
        .input
        .get(detail.spender_input_index as usize)
        .ok_or(UnbondingWatcherError::NotUnbonding(txid))?
        .witness;
    let len = witness.len();
    if len < 4 {
        return Err(UnbondingWatcherError::WitnessTooShort { txid, len });
    }

    let element = witness
        .nth(len - 3)
        .ok_or(UnbondingWatcherError::WitnessTooShort { txid, len })?;

    Signature::from_slice(element).map_err(|_| UnbondingWatcherError::InvalidStakerSignature(txid))
}

/// Whether the App chain still counts the delegation's voting power.
async fn is_delegation_active(
    ctx: &Context,
    staking_tx_hash: Txid,
) -> Result<bool, Halted<AppChainError>> {
    let del = ctx
        .retry("btc_delegation", || ctx.app.btc_delegation(&staking_tx_hash))
        .await?;
    let params = ctx.staking_params(del.params_version).await?;
    let btc_tip = ctx
        .retry("btc_client_tip_height", || ctx.app.btc_client_tip_height())
        .await?;

    Ok(del.status(btc_tip, params.finalization_timeout, params.covenant_quorum)
        == DelegationStatus::Active)
}

async fn wait_until_inactive(ctx: &Context, staking_tx_hash: Txid) {
    loop {
        match is_delegation_active(ctx, staking_tx_hash).await {
            Ok(true) => {}
            Ok(false) | Err(_) => return,
        }

        if !ctx.sleep(ctx.cfg.check_delegation_active_interval).await {
            return;
        }
    }
}

/// Reports the unbonding until the App chain accepts it or stops counting the delegation as
/// ACTIVE.
async fn report_unbonding(ctx: &Context, staking_tx_hash: Txid, sig: &Signature) {
    let strategy = Strategy::<AppChainError>::fixed_delay(ctx.cfg.retry_submit_unbonding_tx_interval)
        .with_jitter(ctx.cfg.retry_jitter);
    let mut attempt = 0;

    loop {
        match is_delegation_active(ctx, staking_tx_hash).await {
            Err(Halted::Shutdown) => return,
            Err(Halted::Permanent(err)) => {
                error!(%staking_tx_hash, %err, "cannot tell whether the delegation is active, giving up");
                return;
            }
            Ok(false) => {
                info!(%staking_tx_hash, "delegation no longer active, unbonding report not needed");
                return;
            }
            Ok(true) => {}
        }

        let msg = MsgBtcUndelegate::new(ctx.app.must_get_addr(), staking_tx_hash, sig);
        let res = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return,
            res = ctx.app.reliably_send_msg(
                msg.into(),
                UNBONDING_EXPECTED_ERRORS,
                UNBONDING_UNRECOVERABLE_ERRORS,
            ) => res,
        };

        let err = match res {
            Ok(resp) => {
                ctx.metrics.reported_unbondings.inc();
                info!(
                    %staking_tx_hash,
                    tx_hash = resp.as_ref().map(|r| r.tx_hash.as_str()).unwrap_or("none"),
                    "reported unbonding"
                );
                return;
            }
            Err(err) => err,
        };

        ctx.metrics.failed_unbonding_reports.inc();
        let RetryAction::Retry(delay) = strategy.next_action(&err, attempt) else {
            return;
        };
        warn!(%staking_tx_hash, %err, ?delay, "failed to report unbonding, retrying");
        attempt += 1;

        if !ctx.sleep(delay).await {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bitcoin::{Amount, ScriptBuf, TxOut, Witness};
    use vigilante_primitives::{delegation::SlashingPath, msgs::AppMsg};
    use vigilante_test_utils::{
        bitcoin::generate_keypairs,
        fixtures::{Covenant, DelegationFixture},
    };

    use super::*;
    use crate::test_utils::{wait_until, TestEnv};

    fn spend_of(fixture: &DelegationFixture, tx: bitcoin::Transaction) -> SpendDetail {
        SpendDetail {
            spent_outpoint: fixture.delegation.staking_outpoint(),
            spender_txid: tx.compute_txid(),
            spending_tx: tx,
            spender_input_index: 0,
            spending_height: 200,
        }
    }

    fn unbonding_fixture() -> DelegationFixture {
        let covenant = Covenant::new(1, 3, 2);
        let (fp_sks, _) = generate_keypairs(1);
        DelegationFixture::new(&covenant, &fp_sks, 100)
    }

    #[test]
    fn staker_signature_is_read_from_unbonding_witness() {
        let fixture = unbonding_fixture();
        let del = fixture.delegation.tracked().unwrap();

        let detail = spend_of(&fixture, fixture.signed_unbonding_tx());
        assert_eq!(
            parse_staker_signature(&detail, &del),
            Ok(fixture.staker_unbonding_sig())
        );
    }

    #[test]
    fn other_spends_are_not_unbondings() {
        let fixture = unbonding_fixture();
        let del = fixture.delegation.tracked().unwrap();

        let slashing = spend_of(
            &fixture,
            fixture.signed_slashing_tx(SlashingPath::Staking, 0),
        );
        assert_eq!(
            parse_staker_signature(&slashing, &del),
            Err(UnbondingWatcherError::NotUnbonding(slashing.spender_txid))
        );

        // same shape, different amount
        let mut tx = fixture.signed_unbonding_tx();
        tx.output[0].value = tx.output[0].value - Amount::from_sat(1);
        let detail = spend_of(&fixture, tx);
        assert_eq!(
            parse_staker_signature(&detail, &del),
            Err(UnbondingWatcherError::NotUnbonding(detail.spender_txid))
        );

        let mut tx = fixture.signed_unbonding_tx();
        tx.output.push(TxOut {
            value: Amount::from_sat(1_000),
            script_pubkey: ScriptBuf::new(),
        });
        let detail = spend_of(&fixture, tx);
        assert!(matches!(
            parse_staker_signature(&detail, &del),
            Err(UnbondingWatcherError::NotUnbonding(_))
        ));
    }

    #[test]
    fn malformed_unbonding_witness_is_rejected() {
        let fixture = unbonding_fixture();
        let del = fixture.delegation.tracked().unwrap();

        let mut tx = fixture.signed_unbonding_tx();
        tx.input[0].witness = Witness::from_slice(&[[1u8; 64], [2u8; 64], [3u8; 64]]);
        let detail = spend_of(&fixture, tx);
        assert_eq!(
            parse_staker_signature(&detail, &del),
            Err(UnbondingWatcherError::WitnessTooShort {
                txid: detail.spender_txid,
                len: 3
            })
        );

        let mut tx = fixture.signed_unbonding_tx();
        tx.input[0].witness = Witness::from_slice(&[vec![0u8; 64], vec![7u8; 10], vec![1], vec![2]]);
        let detail = spend_of(&fixture, tx);
        assert_eq!(
            parse_staker_signature(&detail, &del),
            Err(UnbondingWatcherError::InvalidStakerSignature(
                detail.spender_txid
            ))
        );
    }

    #[tokio::test]
    async fn early_unbonding_is_reported() {
        let env = TestEnv::new(100);
        let covenant = Covenant::new(1, 3, 2);
        let (fp_sks, _) = generate_keypairs(1);
        let fixture = env.active_delegation(&covenant, &fp_sks);

        let ctx = env.context();
        let mut watcher = UnbondingWatcher::new(ctx.clone());
        watcher.start().await.unwrap();
        assert_eq!(
            watcher.start().await,
            Err(UnbondingWatcherError::AlreadyStarted)
        );

        wait_until(|| env.btc.num_spend_registrations() == 1).await;
        env.btc.mine(vec![fixture.signed_unbonding_tx()]);

        wait_until(|| ctx.metrics.reported_unbondings.get() == 1).await;
        let sent = env.app.sent_msgs();
        assert_eq!(sent.len(), 1);
        let AppMsg::BtcUndelegate(msg) = &sent[0] else {
            panic!("unexpected message {:?}", sent[0]);
        };
        assert_eq!(msg.staking_tx_hash, fixture.staking_tx_hash().to_string());
        assert_eq!(
            msg.unbonding_tx_sig,
            fixture.staker_unbonding_sig().serialize().to_vec()
        );
        assert!(env
            .app
            .delegation(&fixture.staking_tx_hash())
            .unwrap()
            .is_unbonded_early());

        // no longer ACTIVE, so not picked up again
        wait_until(|| watcher.watched.len() == 0).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(watcher.watched.len(), 0);
        assert_eq!(env.app.sent_msgs().len(), 1);

        ctx.cancel.cancel();
        watcher.stop().await;
    }

    #[tokio::test]
    async fn failed_reports_are_retried() {
        let env = TestEnv::new(100);
        let covenant = Covenant::new(1, 3, 2);
        let (fp_sks, _) = generate_keypairs(1);
        let fixture = env.active_delegation(&covenant, &fp_sks);
        env.app.fail_next_sends([AppChainError::TxFailed {
            tx_hash: String::new(),
            code: 5,
            log: vigilante_app_chain::errors::ERR_DELEGATION_NOT_FOUND.to_string(),
        }]);

        let ctx = env.context();
        let mut watcher = UnbondingWatcher::new(ctx.clone());
        watcher.start().await.unwrap();

        wait_until(|| env.btc.num_spend_registrations() == 1).await;
        env.btc.mine(vec![fixture.signed_unbonding_tx()]);

        wait_until(|| ctx.metrics.reported_unbondings.get() == 1).await;
        assert_eq!(ctx.metrics.failed_unbonding_reports.get(), 1);
        assert_eq!(env.app.send_attempts(), 2);
        assert_eq!(env.app.sent_msgs().len(), 1);

        ctx.cancel.cancel();
        watcher.stop().await;
    }

    #[tokio::test]
    async fn non_unbonding_spend_is_never_reported() {
        let env = TestEnv::new(100);
        let covenant = Covenant::new(1, 3, 2);
        let (fp_sks, _) = generate_keypairs(1);
        let fixture = env.active_delegation(&covenant, &fp_sks);

        let ctx = env.context();
        let mut watcher = UnbondingWatcher::new(ctx.clone());
        watcher.start().await.unwrap();

        wait_until(|| env.btc.num_spend_registrations() == 1).await;
        env.btc
            .mine(vec![fixture.signed_slashing_tx(SlashingPath::Staking, 0)]);
        wait_until(|| env.btc.num_spend_registrations() == 0).await;

        // still ACTIVE on the App chain: polled, kept, never reported
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(watcher.watched.len(), 1);

        let mut del = fixture.delegation.clone();
        del.end_height = env.btc.height();
        env.app.set_delegation(del);

        wait_until(|| watcher.watched.len() == 0).await;
        assert!(env.app.sent_msgs().is_empty());
        assert_eq!(env.app.send_attempts(), 0);

        ctx.cancel.cancel();
        watcher.stop().await;
    }

    #[tokio::test]
    async fn sweeps_wait_for_the_node_to_catch_up() {
        let env = TestEnv::new(100);
        let covenant = Covenant::new(1, 3, 2);
        let (fp_sks, _) = generate_keypairs(1);
        env.active_delegation(&covenant, &fp_sks);
        env.app.set_btc_tip(env.btc.height() + 3);

        let ctx = env.context();
        let mut watcher = UnbondingWatcher::new(ctx.clone());
        watcher.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(env.btc.num_spend_registrations(), 0);

        env.btc.mine_empty(3);
        wait_until(|| env.btc.num_spend_registrations() == 1).await;
        assert_eq!(watcher.watched.len(), 1);

        ctx.cancel.cancel();
        watcher.stop().await;
    }
}
