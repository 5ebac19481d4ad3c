//! An in-memory App chain.
//!
//! [`MockAppChain`] serves delegations, finality providers, evidences and parameters from memory
//! and applies the effect of the submitted messages the way the App chain does: an unbonding
//! report records the staker signature, selective slashing evidence slashes the provider.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    future,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use bitcoin::{
    secp256k1::{schnorr::Signature, SecretKey, SECP256K1},
    Txid, XOnlyPublicKey,
};
use tokio::sync::mpsc;
use vigilante_app_chain::{
    envelope::{reliably_send, RetryBounds},
    errors::{
        AppChainError, ERR_DELEGATION_ALREADY_UNBONDED, ERR_DELEGATION_NOT_FOUND,
        ERR_FP_ALREADY_SLASHED, ERR_FP_NOT_FOUND,
    },
    pagination::{Page, PageRequest},
    subscription::Subscription,
    traits::AppChainClient,
    types::{
        AbciEvent, EventAttribute, RpcEvidence, TxEvent, TxResponse,
        EVENT_SLASHED_FINALITY_PROVIDER, EVIDENCE_ATTRIBUTE,
    },
};
use vigilante_primitives::{
    delegation::{BtcDelegation, DelegationStatus},
    finality::{Evidence, FinalityProvider},
    msgs::AppMsg,
    params::StakingParams,
};

/// Signer address reported by [`MockAppChain::must_get_addr`].
pub const MOCK_SIGNER: &str = "bbn1vigilantemock";

/// Backoff bounds of the mock's reliably-send envelope.
const RETRY_BOUNDS: RetryBounds = RetryBounds {
    initial: Duration::from_millis(1),
    max: Duration::from_millis(10),
};

/// Buffer of every subscription.
const SUBSCRIPTION_BUFFER: usize = 100;

/// JSON-RPC error code used for unknown objects.
const NOT_FOUND_CODE: i32 = -32_004;

/// Builds the transaction event the App chain emits when it slashes a provider for equivocation.
pub fn slashed_fp_event(evidence: &Evidence, height: u64) -> TxEvent {
    let value = serde_json::to_string(&RpcEvidence::from(evidence))
        .expect("evidence always serializes");

    TxEvent {
        tx_hash: format!("{:064X}", height),
        height,
        events: vec![AbciEvent {
            kind: EVENT_SLASHED_FINALITY_PROVIDER.into(),
            attributes: vec![EventAttribute {
                key: EVIDENCE_ATTRIBUTE.into(),
                value,
            }],
        }],
    }
}

fn not_found(message: &str) -> AppChainError {
    AppChainError::Rpc {
        code: NOT_FOUND_CODE,
        message: message.to_string(),
    }
}

fn tx_failed(log: &str) -> AppChainError {
    AppChainError::TxFailed {
        tx_hash: String::new(),
        code: 1,
        log: log.to_string(),
    }
}

/// Serves `items[offset..offset + limit]`, the cursor being the decimal offset.
fn paginate<T: Clone>(items: Vec<T>, page: &PageRequest) -> Page<T> {
    let offset = page
        .key
        .as_deref()
        .and_then(|key| key.parse::<usize>().ok())
        .unwrap_or(0);
    let limit = (page.limit as usize).max(1);
    let end = (offset + limit).min(items.len());

    Page {
        items: items.get(offset..end).map(<[T]>::to_vec).unwrap_or_default(),
        next_key: (end < items.len()).then(|| end.to_string()),
    }
}

#[derive(Debug, Default)]
struct State {
    params: BTreeMap<u32, StakingParams>,
    delegations: Vec<BtcDelegation>,
    fps: HashMap<XOnlyPublicKey, FinalityProvider>,
    evidences: Vec<Evidence>,
    btc_tip: u32,
    height: u64,
    sent: Vec<AppMsg>,
    attempts: usize,
    failures: VecDeque<AppChainError>,
    subscribers: HashMap<(String, String), mpsc::Sender<TxEvent>>,
}

impl State {
    fn params_of(&self, del: &BtcDelegation) -> Option<&StakingParams> {
        self.params.get(&del.params_version)
    }

    fn status_of(&self, del: &BtcDelegation) -> Option<DelegationStatus> {
        self.params_of(del)
            .map(|p| del.status(self.btc_tip, p.finalization_timeout, p.covenant_quorum))
    }

    fn delegation_mut(&mut self, staking_tx_hash: &str) -> Result<&mut BtcDelegation, AppChainError> {
        self.delegations
            .iter_mut()
            .find(|del| del.staking_tx_hash().to_string() == staking_tx_hash)
            .ok_or_else(|| tx_failed(ERR_DELEGATION_NOT_FOUND))
    }

    fn apply(&mut self, msg: &AppMsg) -> Result<TxResponse, AppChainError> {
        self.attempts += 1;
        if let Some(err) = self.failures.pop_front() {
            return Err(err);
        }

        match msg {
            AppMsg::BtcUndelegate(undelegate) => {
                let sig = Signature::from_slice(&undelegate.unbonding_tx_sig)
                    .map_err(|e| tx_failed(&e.to_string()))?;
                let del = self.delegation_mut(&undelegate.staking_tx_hash)?;
                if del.is_unbonded_early() {
                    return Err(tx_failed(ERR_DELEGATION_ALREADY_UNBONDED));
                }
                del.btc_undelegation.delegator_unbonding_sig = Some(sig);
            }
            AppMsg::SelectiveSlashingEvidence(evidence) => {
                self.delegation_mut(&evidence.staking_tx_hash)?;
                let sk = SecretKey::from_slice(&evidence.recovered_fp_btc_sk)
                    .map_err(|e| tx_failed(&e.to_string()))?;
                let fp_pk = sk.x_only_public_key(SECP256K1).0;
                let (height, btc_tip) = (self.height, self.btc_tip);
                let fp = self
                    .fps
                    .get_mut(&fp_pk)
                    .ok_or_else(|| tx_failed(ERR_FP_NOT_FOUND))?;
                if fp.is_slashed() {
                    return Err(tx_failed(ERR_FP_ALREADY_SLASHED));
                }
                fp.slashed_height = height.max(1);
                fp.slashed_btc_height = btc_tip;
            }
        }

        self.height += 1;
        self.sent.push(msg.clone());
        Ok(TxResponse {
            tx_hash: format!("{:064X}", self.height),
            code: 0,
            raw_log: String::new(),
        })
    }
}

/// An in-memory [`AppChainClient`].
#[derive(Debug, Default)]
pub struct MockAppChain {
    state: Mutex<State>,
}

impl MockAppChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("mock state is never poisoned")
    }

    /// Registers staking parameters. The latest version is the current one.
    pub fn add_params(&self, params: StakingParams) {
        self.state().params.insert(params.version, params);
    }

    /// Adds a delegation, or replaces the one with the same staking transaction.
    pub fn set_delegation(&self, del: BtcDelegation) {
        let mut state = self.state();
        let hash = del.staking_tx_hash();
        match state
            .delegations
            .iter()
            .position(|d| d.staking_tx_hash() == hash)
        {
            Some(idx) => state.delegations[idx] = del,
            None => state.delegations.push(del),
        }
    }

    /// Registers an unslashed finality provider.
    pub fn add_finality_provider(&self, btc_pk: XOnlyPublicKey) {
        self.state().fps.insert(
            btc_pk,
            FinalityProvider {
                btc_pk,
                slashed_height: 0,
                slashed_btc_height: 0,
            },
        );
    }

    /// Marks a provider slashed at App-chain height `height`.
    pub fn slash_finality_provider(&self, btc_pk: &XOnlyPublicKey, height: u64) {
        let mut state = self.state();
        let btc_tip = state.btc_tip;
        if let Some(fp) = state.fps.get_mut(btc_pk) {
            fp.slashed_height = height.max(1);
            fp.slashed_btc_height = btc_tip;
        }
    }

    /// Records an equivocation evidence.
    pub fn add_evidence(&self, evidence: Evidence) {
        self.state().evidences.push(evidence);
    }

    /// Sets the tip of the App chain's Bitcoin light client.
    pub fn set_btc_tip(&self, height: u32) {
        self.state().btc_tip = height;
    }

    /// The delegation with the given staking transaction hash.
    pub fn delegation(&self, staking_tx_hash: &Txid) -> Option<BtcDelegation> {
        self.state()
            .delegations
            .iter()
            .find(|del| del.staking_tx_hash() == *staking_tx_hash)
            .cloned()
    }

    /// Whether the provider has been slashed.
    pub fn is_slashed(&self, btc_pk: &XOnlyPublicKey) -> bool {
        self.state().fps.get(btc_pk).is_some_and(FinalityProvider::is_slashed)
    }

    /// Every message accepted so far, in order.
    pub fn sent_msgs(&self) -> Vec<AppMsg> {
        self.state().sent.clone()
    }

    /// Number of submission attempts, failed ones included.
    pub fn send_attempts(&self) -> usize {
        self.state().attempts
    }

    /// Makes the next submission attempts fail with `errors`, in order.
    pub fn fail_next_sends(&self, errors: impl IntoIterator<Item = AppChainError>) {
        self.state().failures.extend(errors);
    }

    /// Number of live subscriptions.
    pub fn num_subscribers(&self) -> usize {
        let mut state = self.state();
        state.subscribers.retain(|_, outbox| !outbox.is_closed());
        state.subscribers.len()
    }

    /// Delivers `event` to every subscriber.
    pub async fn emit(&self, event: TxEvent) {
        let outboxes = self
            .state()
            .subscribers
            .values()
            .cloned()
            .collect::<Vec<_>>();

        for outbox in outboxes {
            let _ = outbox.send(event.clone()).await;
        }
    }
}

#[async_trait]
impl AppChainClient for MockAppChain {
    async fn btc_staking_params(&self) -> Result<StakingParams, AppChainError> {
        self.state()
            .params
            .last_key_value()
            .map(|(_, params)| params.clone())
            .ok_or_else(|| not_found("no staking parameters"))
    }

    async fn btc_staking_params_by_version(
        &self,
        version: u32,
    ) -> Result<StakingParams, AppChainError> {
        self.state()
            .params
            .get(&version)
            .cloned()
            .ok_or_else(|| not_found("staking parameters not found"))
    }

    async fn btc_delegations(
        &self,
        status: DelegationStatus,
        page: PageRequest,
    ) -> Result<Page<BtcDelegation>, AppChainError> {
        let state = self.state();
        let matching = state
            .delegations
            .iter()
            .filter(|del| status == DelegationStatus::Any || state.status_of(del) == Some(status))
            .cloned()
            .collect();

        Ok(paginate(matching, &page))
    }

    async fn btc_delegation(&self, staking_tx_hash: &Txid) -> Result<BtcDelegation, AppChainError> {
        self.delegation(staking_tx_hash)
            .ok_or_else(|| not_found(ERR_DELEGATION_NOT_FOUND))
    }

    async fn finality_provider_delegations(
        &self,
        fp_pk: &XOnlyPublicKey,
        page: PageRequest,
    ) -> Result<Page<BtcDelegation>, AppChainError> {
        let matching = self
            .state()
            .delegations
            .iter()
            .filter(|del| del.fp_pks.contains(fp_pk))
            .cloned()
            .collect();

        Ok(paginate(matching, &page))
    }

    async fn finality_provider(
        &self,
        fp_pk: &XOnlyPublicKey,
    ) -> Result<FinalityProvider, AppChainError> {
        self.state()
            .fps
            .get(fp_pk)
            .cloned()
            .ok_or_else(|| not_found(ERR_FP_NOT_FOUND))
    }

    async fn list_evidences(
        &self,
        start_height: u64,
        page: PageRequest,
    ) -> Result<Page<Evidence>, AppChainError> {
        let matching = self
            .state()
            .evidences
            .iter()
            .filter(|ev| ev.block_height >= start_height)
            .cloned()
            .collect();

        Ok(paginate(matching, &page))
    }

    async fn subscribe(
        &self,
        subscriber: &str,
        query: &str,
    ) -> Result<Subscription<TxEvent>, AppChainError> {
        let (outbox, sub) = Subscription::channel(SUBSCRIPTION_BUFFER);
        self.state()
            .subscribers
            .insert((subscriber.to_string(), query.to_string()), outbox);

        Ok(sub)
    }

    async fn unsubscribe(&self, subscriber: &str, query: &str) -> Result<(), AppChainError> {
        self.state()
            .subscribers
            .remove(&(subscriber.to_string(), query.to_string()));

        Ok(())
    }

    async fn reliably_send_msg(
        &self,
        msg: AppMsg,
        expected: &[&str],
        unrecoverable: &[&str],
    ) -> Result<Option<TxResponse>, AppChainError> {
        reliably_send(RETRY_BOUNDS, expected, unrecoverable, || {
            future::ready(self.state().apply(&msg))
        })
        .await
    }

    fn must_get_addr(&self) -> String {
        MOCK_SIGNER.to_string()
    }

    async fn btc_client_tip_height(&self) -> Result<u32, AppChainError> {
        Ok(self.state().btc_tip)
    }
}
