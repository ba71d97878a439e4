use std::{collections::HashMap, time::Duration};

use bitcoin::Txid;
use jsonrpsee::{
    core::{client::ClientT, params::ArrayParams, Error as RpcError},
    http_client::{HttpClient, HttpClientBuilder},
    rpc_params,
};
use log::debug;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

use crate::{amount::parse_decimal_amount, Error, Result};

#[derive(Debug, Deserialize)]
pub struct BlockchainInfo {
    pub chain: String,
    pub blocks: u64,
    pub headers: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasternodeInfo {
    pub owner_auth_address: String,
    pub operator_auth_address: String,
    pub state: String,
    #[serde(default)]
    pub target_multipliers: Option<Vec<u32>>,
}

#[derive(Debug, Deserialize)]
pub struct WalletTxInfo {
    pub confirmations: i64,
    #[serde(default)]
    pub blockhash: Option<String>,
}

/// Typed wrapper over one node's JSON-RPC endpoint. Callers reach it through
/// the role queue, so calls against shared wallet state never interleave.
pub struct NodeClient {
    endpoint: String,
    inner: HttpClient,
}

impl NodeClient {
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

    pub async fn get_blockchain_info(&self) -> Result<BlockchainInfo> {
        Ok(self.inner.request("getblockchaininfo", rpc_params![]).await?)
    }

    /// Spendable wallet balance in satoshis.
    pub async fn get_balance(&self) -> Result<i64> {
        let raw: Value = self.inner.request("getbalance", rpc_params![]).await?;
        balance_to_sats(&raw)
    }

    pub async fn get_transaction(&self, txid: &Txid) -> Result<WalletTxInfo> {
        Ok(self
            .inner
            .request("gettransaction", rpc_params![txid.to_string()])
            .await?)
    }

    pub async fn get_masternode(&self, id: &str) -> Result<Option<MasternodeInfo>> {
        let result: HashMap<String, MasternodeInfo> = match self
            .inner
            .request("getmasternode", rpc_params![id])
            .await
        {
            Ok(map) => map,
            Err(RpcError::Call(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(result.into_values().next())
    }

    pub async fn list_masternodes(&self) -> Result<HashMap<String, MasternodeInfo>> {
        Ok(self.inner.request("listmasternodes", rpc_params![]).await?)
    }

    pub async fn wallet_passphrase(&self, passphrase: &str, timeout_secs: u64) -> Result<()> {
        let _: Option<Value> = self
            .inner
            .request("walletpassphrase", rpc_params![passphrase, timeout_secs])
            .await?;
        Ok(())
    }

    pub async fn send_raw_transaction(&self, hex: &str) -> Result<Txid> {
        debug!("[NodeClient] sendrawtransaction via {}", self.endpoint);
        let txid: String = self
            .inner
            .request("sendrawtransaction", rpc_params![hex])
            .await
            .map_err(|e| match e {
                // A call error is the chain rejecting the transaction, not
                // the transport failing; it must never be resubmitted.
                RpcError::Call(e) => Error::Broadcast(e.to_string()),
                other => other.into(),
            })?;
        Ok(txid.parse().map_err(|_| Error::Broadcast(txid))?)
    }

    /// Raw passthrough for calls without a typed wrapper.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        let mut array = ArrayParams::new();
        for param in params {
            array
                .insert(param)
                .map_err(|e| Error::Conflict(format!("bad rpc param: {e}")))?;
        }
        Ok(self.inner.request(method, array).await?)
    }
}

fn balance_to_sats(raw: &Value) -> Result<i64> {
    match raw {
        Value::String(s) => parse_decimal_amount(s),
        Value::Number(n) => {
            // Core emits amounts as JSON numbers; go through the decimal
            // text to stay off binary float rounding.
            parse_decimal_amount(&format!("{n}"))
        }
        other => Err(Error::Conflict(format!("unexpected balance: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_parses_from_number_and_string() {
        let n: Value = serde_json::from_str("20000.5").unwrap();
        assert_eq!(balance_to_sats(&n).unwrap(), 2_000_050_000_000);

        let s = Value::String("0.00000001".to_string());
        assert_eq!(balance_to_sats(&s).unwrap(), 1);

        assert!(balance_to_sats(&Value::Null).is_err());
    }
}
