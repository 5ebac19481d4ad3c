//! The equivocation slasher.
//!
//! Once the key of a finality provider is known, either extracted from an equivocation evidence
//! or recovered by the atomic slasher, every delegation to that provider that can still be slashed
//! gets its slashing transaction completed and broadcast.

use bitcoin::{Transaction, TxOut, Txid};
use futures::StreamExt;
use secp256k1::{SecretKey, SECP256K1};
use tokio::{sync::mpsc, task::JoinSet};
use tracing::{debug, error, info, warn};
use vigilante_app_chain::{pagination::PageRequest, subscription::Subscription, types::TxEvent};
use vigilante_common::errors::MultiError;
use vigilante_primitives::{
    delegation::{BtcDelegation, DelegationStatus, SlashingPath},
    errors::WitnessError,
    params::StakingParams,
    scripts::taproot::LeafSpend,
    witness::{build_slashing_witness, sign_slashing_tx, slashing_sighash, SlashingWitnessInputs},
};

use crate::{
    constants::{
        EQUIVOCATION_CHANNEL_CAPACITY, EQUIVOCATION_SUBSCRIBER, FINALITY_SIG_QUERY,
        RECOVERED_KEY_CHANNEL_CAPACITY,
    },
    context::{join_all, Context, Halted},
    errors::SlasherError,
};

/// Slashes every delegation of finality providers whose key leaked.
#[derive(Debug)]
pub(crate) struct EquivocationSlasher {
    ctx: Context,
    recovered_tx: mpsc::Sender<SecretKey>,
    recovered_rx: Option<mpsc::Receiver<SecretKey>>,
    tasks: JoinSet<()>,
}

impl EquivocationSlasher {
    pub(crate) fn new(ctx: Context) -> Self {
        let (recovered_tx, recovered_rx) = mpsc::channel(RECOVERED_KEY_CHANNEL_CAPACITY);

        Self {
            ctx,
            recovered_tx,
            recovered_rx: Some(recovered_rx),
            tasks: JoinSet::new(),
        }
    }

    /// Where the atomic slasher hands over the keys it recovers.
    pub(crate) fn recovered_key_sender(&self) -> mpsc::Sender<SecretKey> {
        self.recovered_tx.clone()
    }

    /// Replays every evidence recorded from `start_height` on.
    ///
    /// The staking outputs are checked on Bitcoin first, since most of them were slashed or spent
    /// while the tracker was not running.
    pub(crate) async fn bootstrap(&self, start_height: u64) -> Result<(), MultiError<SlasherError>> {
        let ctx = &self.ctx;
        let mut errors = MultiError::new();
        let mut replayed = 0usize;

        let mut next = Some(PageRequest::first(ctx.cfg.evidences_page_size));
        while let Some(req) = next.take() {
            let page = match ctx
                .retry("list_evidences", || {
                    ctx.app.list_evidences(start_height, req.clone())
                })
                .await
            {
                Ok(page) => page,
                Err(halt) => {
                    errors.push(halt.into_error(SlasherError::Shutdown));
                    break;
                }
            };
            next = page.next_request(&req);

            for evidence in page.items {
                let fp_pk = evidence.fp_btc_pk;
                let fp_sk = match evidence.extract_sk() {
                    Ok(sk) => sk,
                    Err(err) => {
                        warn!(%fp_pk, height = evidence.block_height, %err, "unusable evidence");
                        errors.push(err.into());
                        continue;
                    }
                };

                replayed += 1;
                if let Err(errs) = slash_fp(ctx, &fp_sk, true).await {
                    errors.extend(errs);
                }
            }
        }

        info!(%start_height, %replayed, failures = errors.len(), "replayed equivocation evidences");
        errors.into_result()
    }

    /// Subscribes to equivocation events and spawns the tracking and enforcing routines.
    pub(crate) async fn start(&mut self) -> Result<(), SlasherError> {
        let recovered_rx = self.recovered_rx.take().ok_or(SlasherError::AlreadyStarted)?;

        let events = self
            .ctx
            .app
            .subscribe(EQUIVOCATION_SUBSCRIBER, FINALITY_SIG_QUERY)
            .await?;
        let (equivocation_tx, equivocation_rx) = mpsc::channel(EQUIVOCATION_CHANNEL_CAPACITY);

        self.tasks
            .spawn(track_equivocations(self.ctx.clone(), events, equivocation_tx));
        self.tasks.spawn(enforce_slashing(
            self.ctx.clone(),
            equivocation_rx,
            recovered_rx,
        ));

        info!("equivocation slasher started");
        Ok(())
    }

    /// Waits for the routines to exit. Shutdown must have been requested on the context.
    pub(crate) async fn stop(&mut self) {
        join_all("equivocation slasher", &mut self.tasks).await;
        info!("equivocation slasher stopped");
    }
}

/// Forwards the key of every provider slashed for equivocation to the enforcer.
async fn track_equivocations(
    ctx: Context,
    mut events: Subscription<TxEvent>,
    equivocations: mpsc::Sender<SecretKey>,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            event = events.next() => match event {
                Some(event) => event,
                None => {
                    warn!("equivocation event stream closed");
                    break;
                }
            },
        };

        let evidence = match event.slashed_fp_evidence() {
            None => continue,
            Some(Ok(evidence)) => evidence,
            Some(Err(err)) => {
                warn!(tx_hash = %event.tx_hash, %err, "skipping undecodable evidence");
                continue;
            }
        };

        let fp_pk = evidence.fp_btc_pk;
        let fp_sk = match evidence.extract_sk() {
            Ok(sk) => sk,
            Err(err) => {
                warn!(%fp_pk, tx_hash = %event.tx_hash, %err, "could not extract key from evidence");
                continue;
            }
        };
        info!(%fp_pk, height = evidence.block_height, "finality provider equivocated");

        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            res = equivocations.send(fp_sk) => if res.is_err() {
                break;
            },
        }
    }

    if let Err(err) = ctx
        .app
        .unsubscribe(EQUIVOCATION_SUBSCRIBER, FINALITY_SIG_QUERY)
        .await
    {
        warn!(%err, "could not unsubscribe from equivocation events");
    }
}

/// Slashes the providers behind the keys coming from either source, one at a time.
async fn enforce_slashing(
    ctx: Context,
    mut equivocations: mpsc::Receiver<SecretKey>,
    mut recovered: mpsc::Receiver<SecretKey>,
) {
    loop {
        let (fp_sk, source) = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            Some(sk) = equivocations.recv() => (sk, "equivocation"),
            Some(sk) = recovered.recv() => (sk, "selective slashing"),
            else => break,
        };

        let fp_pk = fp_sk.x_only_public_key(SECP256K1).0;
        match slash_fp(&ctx, &fp_sk, false).await {
            Ok(()) => info!(%fp_pk, %source, "slashed finality provider"),
            Err(errs) => error!(%fp_pk, %source, %errs, "failed to slash some delegations"),
        }
    }
}

/// Slashes every ACTIVE delegation of the provider through its staking output, and every
/// UNBONDED one the covenant signed the unbonding slashing transaction of through its unbonding
/// output.
///
/// With `check_btc`, staking outputs that are already spent are skipped without broadcasting.
/// A failure on one delegation does not stop the sweep.
pub(crate) async fn slash_fp(
    ctx: &Context,
    fp_sk: &SecretKey,
    check_btc: bool,
) -> Result<(), MultiError<SlasherError>> {
    let fp_pk = fp_sk.x_only_public_key(SECP256K1).0;
    let mut errors = MultiError::new();

    let btc_tip = match ctx
        .retry("btc_client_tip_height", || ctx.app.btc_client_tip_height())
        .await
    {
        Ok(tip) => tip,
        Err(halt) => {
            errors.push(halt.into_error(SlasherError::Shutdown));
            return errors.into_result();
        }
    };

    let mut broadcast = 0usize;
    let mut next = Some(PageRequest::first(ctx.cfg.new_delegations_batch_size));
    while let Some(req) = next.take() {
        let page = match ctx
            .retry("finality_provider_delegations", || {
                ctx.app.finality_provider_delegations(&fp_pk, req.clone())
            })
            .await
        {
            Ok(page) => page,
            Err(Halted::Shutdown) => {
                errors.push(SlasherError::Shutdown);
                return errors.into_result();
            }
            Err(Halted::Permanent(err)) => {
                errors.push(err.into());
                break;
            }
        };
        next = page.next_request(&req);

        for del in &page.items {
            let params = match ctx.staking_params(del.params_version).await {
                Ok(params) => params,
                Err(Halted::Shutdown) => {
                    errors.push(SlasherError::Shutdown);
                    return errors.into_result();
                }
                Err(Halted::Permanent(err)) => {
                    errors.push(err.into());
                    continue;
                }
            };

            let staking_tx_hash = del.staking_tx_hash();
            let res = match del.status(
                btc_tip,
                params.finalization_timeout,
                params.covenant_quorum,
            ) {
                DelegationStatus::Active => {
                    slash_delegation(ctx, fp_sk, del, &params, check_btc).await
                }
                DelegationStatus::Unbonded
                    if del.is_slashable_via_unbonding(params.covenant_quorum) =>
                {
                    slash_unbonding(ctx, fp_sk, del, &params).await
                }
                status => {
                    debug!(%staking_tx_hash, %status, "delegation is not slashable");
                    continue;
                }
            };

            match res {
                Ok(Some(_)) => broadcast += 1,
                Ok(None) => {}
                Err(err) => {
                    warn!(%fp_pk, %staking_tx_hash, %err, "failed to slash delegation");
                    errors.push(err);
                }
            }
        }
    }

    // a sweep that only failed leaves the provider unslashed
    if broadcast > 0 || errors.is_empty() {
        ctx.metrics.slashed_fps.inc();
    }
    info!(%fp_pk, %btc_tip, %broadcast, failures = errors.len(), "swept delegations of finality provider");

    errors.into_result()
}

/// Broadcasts the staking slashing transaction of `del`.
///
/// Returns `None` if nothing was broadcast because the output is already spent or the slashing
/// transaction is already on chain.
async fn slash_delegation(
    ctx: &Context,
    fp_sk: &SecretKey,
    del: &BtcDelegation,
    params: &StakingParams,
    check_btc: bool,
) -> Result<Option<Txid>, SlasherError> {
    if check_btc {
        let outpoint = del.staking_outpoint();
        if ctx
            .btc
            .get_tx_out(&outpoint.txid, outpoint.vout, true)
            .await?
            .is_none()
        {
            debug!(staking_tx_hash = %outpoint.txid, "staking output already spent");
            return Ok(None);
        }
    }

    let leaf = del.staking_output(params)?.slashing_path()?;
    let tx = build_signed_slashing_tx(
        fp_sk,
        del,
        params,
        SlashingPath::Staking,
        del.staking_tx_out()?,
        &leaf,
    )?;

    broadcast_slashing_tx(ctx, del, SlashingPath::Staking, &tx).await
}

/// Broadcasts the unbonding slashing transaction of `del`.
///
/// If Bitcoin does not know the unbonding transaction, the staking output is still locked and
/// gets slashed instead.
async fn slash_unbonding(
    ctx: &Context,
    fp_sk: &SecretKey,
    del: &BtcDelegation,
    params: &StakingParams,
) -> Result<Option<Txid>, SlasherError> {
    let outpoint = del.unbonding_outpoint();
    if ctx.btc.get_raw_transaction(&outpoint.txid).await?.is_none() {
        debug!(
            staking_tx_hash = %del.staking_tx_hash(),
            unbonding_txid = %outpoint.txid,
            "unbonding tx not on bitcoin, slashing the staking output"
        );
        return slash_delegation(ctx, fp_sk, del, params, true).await;
    }

    if ctx
        .btc
        .get_tx_out(&outpoint.txid, outpoint.vout, true)
        .await?
        .is_none()
    {
        debug!(unbonding_txid = %outpoint.txid, "unbonding output already spent");
        return Ok(None);
    }

    let leaf = del.unbonding_output(params)?.slashing_path()?;
    let tx = build_signed_slashing_tx(
        fp_sk,
        del,
        params,
        SlashingPath::Unbonding,
        del.unbonding_tx_out()?,
        &leaf,
    )?;

    broadcast_slashing_tx(ctx, del, SlashingPath::Unbonding, &tx).await
}

async fn broadcast_slashing_tx(
    ctx: &Context,
    del: &BtcDelegation,
    path: SlashingPath,
    tx: &Transaction,
) -> Result<Option<Txid>, SlasherError> {
    let staking_tx_hash = del.staking_tx_hash();

    match ctx.btc.send_raw_transaction(tx, true).await {
        Ok(txid) => {
            ctx.metrics.slashed_delegations.inc();
            info!(%staking_tx_hash, %txid, ?path, "broadcast slashing tx");
            Ok(Some(txid))
        }
        Err(err) if err.is_already_in_chain() => {
            debug!(%staking_tx_hash, ?path, "slashing tx already on chain");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

/// Completes the slashing transaction of `path` with the covenant signatures decrypted by
/// `fp_sk`, the provider's own signature and the staker's pre-signature.
pub(crate) fn build_signed_slashing_tx(
    fp_sk: &SecretKey,
    del: &BtcDelegation,
    params: &StakingParams,
    path: SlashingPath,
    prevout: &TxOut,
    leaf: &LeafSpend,
) -> Result<Transaction, SlasherError> {
    let mut tx = del.slashing_tx(path).clone();
    let sighash = slashing_sighash(&tx, prevout, leaf)?;
    let fp_sig = sign_slashing_tx(&sighash, fp_sk);

    let inputs = SlashingWitnessInputs {
        covenant_pks: &params.covenant_pks,
        covenant_quorum: params.covenant_quorum,
        covenant_adaptor_sigs: del.covenant_adaptor_sigs(path),
        fp_pks: &del.fp_pks,
        delegator_sig: del.delegator_slashing_sig(path),
        leaf,
    };
    let witness = build_slashing_witness(&inputs, fp_sk, &fp_sig)?;

    let txid = tx.compute_txid();
    let input = tx.input.first_mut().ok_or(WitnessError::NoInputs(txid))?;
    input.witness = witness;

    Ok(tx)
}
