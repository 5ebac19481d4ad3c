//! `bitcoind` JSON-RPC client.
//!
//! Talks JSON-RPC 2.0 over HTTP with basic authentication, which requires Bitcoin Core 28 or
//! newer.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bitcoin::{
    consensus::encode::{deserialize_hex, serialize_hex},
    Amount, Block, BlockHash, ScriptBuf, Transaction, TxOut, Txid,
};
use jsonrpsee::{
    core::{client::ClientT, params::ArrayParams},
    http_client::{HeaderMap, HeaderValue, HttpClient, HttpClientBuilder},
    rpc_params,
};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::{debug, trace};

use crate::{
    config::BtcConfig,
    errors::BtcRpcError,
    traits::{Broadcaster, Reader},
};

#[derive(Debug, Deserialize)]
struct BlockchainInfo {
    blocks: u32,
    bestblockhash: BlockHash,
}

#[derive(Debug, Deserialize)]
struct ScriptPubKey {
    hex: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetTxOut {
    value: f64,
    script_pub_key: ScriptPubKey,
}

/// A [`Reader`] and [`Broadcaster`] backed by `bitcoind`.
#[derive(Debug, Clone)]
pub struct BitcoinRpcClient {
    client: HttpClient,
}

impl BitcoinRpcClient {
    /// Creates a client for the node at `url`.
    pub fn new(
        url: &str,
        user: &str,
        password: &str,
        request_timeout: Duration,
    ) -> Result<Self, BtcRpcError> {
        let credentials = BASE64.encode(format!("{user}:{password}"));
        let auth = HeaderValue::from_str(&format!("Basic {credentials}"))
            .map_err(|e| BtcRpcError::Config(e.to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert("Authorization", auth);

        let client = HttpClientBuilder::default()
            .set_headers(headers)
            .request_timeout(request_timeout)
            .build(url)
            .map_err(|e| BtcRpcError::Config(e.to_string()))?;

        Ok(Self { client })
    }

    /// Creates a client from the `[btc]` config table.
    pub fn from_config(cfg: &BtcConfig) -> Result<Self, BtcRpcError> {
        Self::new(
            &cfg.rpc_url,
            &cfg.rpc_user,
            &cfg.rpc_password,
            cfg.request_timeout,
        )
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: ArrayParams,
    ) -> Result<T, BtcRpcError> {
        trace!(%method, "calling bitcoind");
        Ok(self.client.request(method, params).await?)
    }
}

fn decode_hex<T: bitcoin::consensus::Decodable>(
    what: &'static str,
    hex: &str,
) -> Result<T, BtcRpcError> {
    deserialize_hex(hex).map_err(|e| BtcRpcError::Decode {
        what,
        reason: e.to_string(),
    })
}

#[async_trait]
impl Reader for BitcoinRpcClient {
    async fn get_best_block(&self) -> Result<(BlockHash, u32), BtcRpcError> {
        let info: BlockchainInfo = self.call("getblockchaininfo", rpc_params![]).await?;
        Ok((info.bestblockhash, info.blocks))
    }

    async fn get_block_hash(&self, height: u32) -> Result<BlockHash, BtcRpcError> {
        self.call("getblockhash", rpc_params![height]).await
    }

    async fn get_block_by_hash(&self, hash: &BlockHash) -> Result<Block, BtcRpcError> {
        let raw: String = self.call("getblock", rpc_params![hash, 0]).await?;
        decode_hex("block", &raw)
    }

    async fn get_raw_transaction(&self, txid: &Txid) -> Result<Option<Transaction>, BtcRpcError> {
        match self
            .call::<String>("getrawtransaction", rpc_params![txid, false])
            .await
        {
            Ok(raw) => decode_hex("transaction", &raw).map(Some),
            Err(e) if e.is_not_found() => {
                debug!(%txid, "transaction unknown to bitcoind");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn get_tx_out(
        &self,
        txid: &Txid,
        vout: u32,
        include_mempool: bool,
    ) -> Result<Option<TxOut>, BtcRpcError> {
        let res: Option<GetTxOut> = self
            .call("gettxout", rpc_params![txid, vout, include_mempool])
            .await?;

        res.map(|out| {
            let value = Amount::from_btc(out.value).map_err(|e| BtcRpcError::Decode {
                what: "txout value",
                reason: e.to_string(),
            })?;
            let script_pubkey =
                ScriptBuf::from_hex(&out.script_pub_key.hex).map_err(|e| BtcRpcError::Decode {
                    what: "txout script",
                    reason: e.to_string(),
                })?;

            Ok(TxOut {
                value,
                script_pubkey,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl Broadcaster for BitcoinRpcClient {
    async fn send_raw_transaction(
        &self,
        tx: &Transaction,
        allow_high_fees: bool,
    ) -> Result<Txid, BtcRpcError> {
        let raw = serialize_hex(tx);
        let params = if allow_high_fees {
            rpc_params![raw, 0]
        } else {
            rpc_params![raw]
        };

        self.call("sendrawtransaction", params).await
    }
}
