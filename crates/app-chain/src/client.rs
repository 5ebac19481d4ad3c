//! This module contains the [`AppChainRpcClient`], the [`AppChainClient`] implementation talking
//! to the App-chain JSON-RPC gateway.
//!
//! Queries and transaction submission go over HTTP. Subscriptions share one WebSocket
//! connection, opened on the first subscription and reopened when it was lost. Every
//! subscription is pumped into a bounded [`Subscription`] by its own task.
use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bitcoin::{Txid, XOnlyPublicKey};
use futures::StreamExt;
use jsonrpsee::{
    core::client::SubscriptionClientT,
    http_client::{HttpClient, HttpClientBuilder},
    rpc_params,
    ws_client::{WsClient, WsClientBuilder},
};
use tokio::{
    sync::Mutex,
    task::{self, JoinHandle},
};
use tracing::{debug, info, trace, warn};
use vigilante_primitives::{
    delegation::{BtcDelegation, DelegationStatus},
    errors::DecodeError,
    finality::{Evidence, FinalityProvider},
    msgs::AppMsg,
    params::StakingParams,
};

use crate::{
    config::AppChainConfig,
    envelope::{reliably_send, RetryBounds},
    errors::AppChainError,
    pagination::{Page, PageRequest},
    rpc::{
        AppChainQueryApiClient, AppChainTxApiClient, SUBSCRIBE_TX_EVENTS, UNSUBSCRIBE_TX_EVENTS,
    },
    subscription::Subscription,
    traits::AppChainClient,
    types::{TxEvent, TxResponse},
};

/// Number of events buffered per subscription before the pump waits for the consumer.
const SUBSCRIPTION_BUFFER: usize = 100;

/// Decodes the items of a listing one by one. Items that do not decode are logged and left out,
/// the rest of the page and its cursor are kept.
fn decode_page<R, T>(what: &'static str, page: Page<R>) -> Page<T>
where
    T: TryFrom<R, Error = DecodeError>,
{
    page.filter_convert(T::try_from, |idx, err| {
        warn!(%what, %idx, %err, "skipping undecodable item");
    })
}

type SubscriptionKey = (String, String);

/// An [`AppChainClient`] backed by the App-chain JSON-RPC gateway.
///
/// Dropping this object cancels every subscription it created.
#[derive(Debug)]
pub struct AppChainRpcClient {
    cfg: AppChainConfig,
    http: HttpClient,
    ws: Mutex<Option<Arc<WsClient>>>,
    subscriptions: Mutex<HashMap<SubscriptionKey, JoinHandle<()>>>,
}

impl Drop for AppChainRpcClient {
    fn drop(&mut self) {
        for (_, handle) in self.subscriptions.get_mut().drain() {
            handle.abort();
        }
    }
}

impl AppChainRpcClient {
    /// Primary constructor for [`AppChainRpcClient`].
    ///
    /// Only the HTTP client is created here; the WebSocket connection is opened by the first
    /// subscription.
    pub fn new(cfg: AppChainConfig) -> Result<Self, AppChainError> {
        if cfg.signer.is_empty() {
            return Err(AppChainError::Config("signer address is empty".into()));
        }

        let http = HttpClientBuilder::default()
            .request_timeout(cfg.request_timeout)
            .build(&cfg.rpc_url)
            .map_err(|e| AppChainError::Config(e.to_string()))?;

        Ok(AppChainRpcClient {
            cfg,
            http,
            ws: Mutex::new(None),
            subscriptions: Mutex::new(HashMap::new()),
        })
    }

    const fn retry_bounds(&self) -> RetryBounds {
        RetryBounds {
            initial: self.cfg.retry_sleep_time,
            max: self.cfg.max_retry_sleep_time,
        }
    }

    async fn ws(&self) -> Result<Arc<WsClient>, AppChainError> {
        let mut ws = self.ws.lock().await;
        if let Some(client) = ws.as_ref().filter(|client| client.is_connected()) {
            return Ok(client.clone());
        }

        info!(url = %self.cfg.ws_url, "connecting to app chain websocket");
        let client = Arc::new(
            WsClientBuilder::default()
                .request_timeout(self.cfg.request_timeout)
                .build(&self.cfg.ws_url)
                .await?,
        );
        *ws = Some(client.clone());

        Ok(client)
    }
}

#[async_trait]
impl AppChainClient for AppChainRpcClient {
    async fn btc_staking_params(&self) -> Result<StakingParams, AppChainError> {
        Ok(self.http.btc_staking_params().await?.try_into()?)
    }

    async fn btc_staking_params_by_version(
        &self,
        version: u32,
    ) -> Result<StakingParams, AppChainError> {
        Ok(self
            .http
            .btc_staking_params_by_version(version)
            .await?
            .try_into()?)
    }

    async fn btc_delegations(
        &self,
        status: DelegationStatus,
        page: PageRequest,
    ) -> Result<Page<BtcDelegation>, AppChainError> {
        Ok(self
            .http
            .btc_delegations(status.to_string(), page)
            .await
            .map(|page| decode_page("delegations", page))?)
    }

    async fn btc_delegation(&self, staking_tx_hash: &Txid) -> Result<BtcDelegation, AppChainError> {
        Ok(self
            .http
            .btc_delegation(staking_tx_hash.to_string())
            .await?
            .try_into()?)
    }

    async fn finality_provider_delegations(
        &self,
        fp_pk: &XOnlyPublicKey,
        page: PageRequest,
    ) -> Result<Page<BtcDelegation>, AppChainError> {
        Ok(self
            .http
            .finality_provider_delegations(fp_pk.to_string(), page)
            .await
            .map(|page| decode_page("delegations", page))?)
    }

    async fn finality_provider(
        &self,
        fp_pk: &XOnlyPublicKey,
    ) -> Result<FinalityProvider, AppChainError> {
        Ok(self
            .http
            .finality_provider(fp_pk.to_string())
            .await?
            .try_into()?)
    }

    async fn list_evidences(
        &self,
        start_height: u64,
        page: PageRequest,
    ) -> Result<Page<Evidence>, AppChainError> {
        Ok(self
            .http
            .list_evidences(start_height, page)
            .await
            .map(|page| decode_page("evidences", page))?)
    }

    async fn subscribe(
        &self,
        subscriber: &str,
        query: &str,
    ) -> Result<Subscription<TxEvent>, AppChainError> {
        let ws = self.ws().await?;
        let mut stream = ws
            .subscribe::<TxEvent, _>(SUBSCRIBE_TX_EVENTS, rpc_params![query], UNSUBSCRIBE_TX_EVENTS)
            .await?;

        let (outbox, sub) = Subscription::channel(SUBSCRIPTION_BUFFER);
        let name = subscriber.to_string();
        let handle = task::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(event) => {
                        trace!(subscriber = %name, tx_hash = %event.tx_hash, "received tx event");
                        if outbox.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!(subscriber = %name, %err, "could not decode tx event"),
                }
            }

            debug!(subscriber = %name, "tx event subscription closed");
        });

        info!(%subscriber, %query, "subscribed to tx events");
        let key = (subscriber.to_string(), query.to_string());
        if let Some(previous) = self.subscriptions.lock().await.insert(key, handle) {
            previous.abort();
        }

        Ok(sub)
    }

    async fn unsubscribe(&self, subscriber: &str, query: &str) -> Result<(), AppChainError> {
        let key = (subscriber.to_string(), query.to_string());
        // Dropping the stream inside the aborted task sends the unsubscribe request.
        if let Some(handle) = self.subscriptions.lock().await.remove(&key) {
            handle.abort();
            info!(%subscriber, %query, "unsubscribed from tx events");
        }

        Ok(())
    }

    async fn reliably_send_msg(
        &self,
        msg: AppMsg,
        expected: &[&str],
        unrecoverable: &[&str],
    ) -> Result<Option<TxResponse>, AppChainError> {
        let signer = self.must_get_addr();
        debug!(staking_tx_hash = %msg.staking_tx_hash(), "submitting message");

        reliably_send(self.retry_bounds(), expected, unrecoverable, || {
            let signer = signer.clone();
            let msg = msg.clone();
            async move {
                let resp = self
                    .http
                    .broadcast_msg(signer, msg)
                    .await
                    .map_err(AppChainError::from)?;

                if resp.code != 0 {
                    return Err(AppChainError::TxFailed {
                        tx_hash: resp.tx_hash,
                        code: resp.code,
                        log: resp.raw_log,
                    });
                }

                Ok(resp)
            }
        })
        .await
    }

    fn must_get_addr(&self) -> String {
        self.cfg.signer.clone()
    }

    async fn btc_client_tip_height(&self) -> Result<u32, AppChainError> {
        Ok(self.http.btc_tip_height().await?)
    }
}
