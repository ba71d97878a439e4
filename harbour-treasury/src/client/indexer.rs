use std::time::Duration;

use async_trait::async_trait;
use bitcoin::{ScriptBuf, Txid};
use jsonrpsee::{
    core::client::ClientT,
    http_client::{HttpClient, HttpClientBuilder},
    rpc_params,
};
use log::debug;
use serde::Deserialize;
use tokio::time::{sleep, Instant};

use crate::{amount::parse_decimal_amount, model::UnspentOutput, Error, Result};

const CONFIRMATION_POLL_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct IndexerUnspent {
    txid: String,
    vout: u32,
    script: String,
    /// Decimal coin amount, e.g. "20000.00000000".
    amount: String,
    #[serde(default)]
    token: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexerTx {
    pub txid: String,
    pub height: Option<u64>,
    pub confirmations: u64,
}

/// Read seam over the indexer. The ledger and tests consume this trait; the
/// HTTP client below is the production implementation.
#[async_trait]
pub trait UtxoSource: Send + Sync {
    async fn current_height(&self) -> Result<u64>;
    async fn list_unspent(&self, address: &str) -> Result<Vec<UnspentOutput>>;
}

/// Read-oriented client for the platform indexer: fast unspent/balance/tx
/// lookups that never touch wallet state.
pub struct IndexerClient {
    endpoint: String,
    inner: HttpClient,
}

impl IndexerClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let inner = HttpClientBuilder::default()
            .request_timeout(timeout)
            .build(endpoint)?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            inner,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn balance(&self, address: &str) -> Result<i64> {
        let raw: String = self
            .inner
            .request("indexer_getBalance", rpc_params![address])
            .await?;
        parse_decimal_amount(&raw)
    }

    pub async fn transaction(&self, txid: &Txid) -> Result<Option<IndexerTx>> {
        Ok(self
            .inner
            .request("indexer_getTransaction", rpc_params![txid.to_string()])
            .await?)
    }

    /// Polls until the transaction reaches one confirmation or the deadline
    /// passes. A timeout here means "unknown", not "failed"; the caller must
    /// re-validate before reusing anything the transaction consumed.
    pub async fn wait_for_confirmation(&self, txid: &Txid, timeout: Duration) -> Result<IndexerTx> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(tx) = self.transaction(txid).await? {
                if tx.confirmations > 0 {
                    debug!("[IndexerClient] {txid} confirmed at {:?}", tx.height);
                    return Ok(tx);
                }
            }
            if Instant::now() + CONFIRMATION_POLL_INTERVAL > deadline {
                return Err(Error::Timeout(timeout));
            }
            sleep(CONFIRMATION_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl UtxoSource for IndexerClient {
    async fn current_height(&self) -> Result<u64> {
        Ok(self
            .inner
            .request("indexer_getBlockHeight", rpc_params![])
            .await?)
    }

    async fn list_unspent(&self, address: &str) -> Result<Vec<UnspentOutput>> {
        let raw: Vec<IndexerUnspent> = self
            .inner
            .request("indexer_listUnspent", rpc_params![address])
            .await?;

        raw.into_iter()
            .map(|u| {
                Ok(UnspentOutput {
                    txid: u
                        .txid
                        .parse()
                        .map_err(|_| Error::Conflict(format!("bad txid: {}", u.txid)))?,
                    vout: u.vout,
                    script: ScriptBuf::from_hex(&u.script)
                        .map_err(|_| Error::Conflict(format!("bad script: {}", u.script)))?,
                    value: parse_decimal_amount(&u.amount)?,
                    token_id: u.token,
                })
            })
            .collect()
    }
}
