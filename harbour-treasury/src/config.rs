use std::path::PathBuf;

use serde::Deserialize;

use crate::network::Network;

#[derive(Clone, Debug, Deserialize)]
pub struct NodeEndpoints {
    pub primary: String,
    pub secondary: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: Network,
    /// Wallet node pair used for treasury operations.
    pub treasury_nodes: NodeEndpoints,
    /// Node pair reserved for the payout pipeline.
    pub payout_nodes: NodeEndpoints,
    pub indexer_url: String,
    pub store_path: PathBuf,
    /// Funding address the liquidity loop manages.
    pub treasury_address: String,
    /// Acceptable treasury balance range, in satoshis.
    pub liquidity_min: i64,
    pub liquidity_max: i64,
    pub health_check_interval_secs: u64,
    pub liquidity_interval_secs: u64,
    pub sweep_interval_secs: u64,
    pub reconcile_interval_secs: u64,
    pub reservation_ttl_secs: u64,
    /// Servers whose operator lists are reconciled into masternode records.
    pub masternode_servers: Vec<String>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            network: Network::Mainnet,
            treasury_nodes: NodeEndpoints {
                primary: "http://127.0.0.1:8554".to_string(),
                secondary: "http://127.0.0.1:8556".to_string(),
            },
            payout_nodes: NodeEndpoints {
                primary: "http://127.0.0.1:8558".to_string(),
                secondary: "http://127.0.0.1:8560".to_string(),
            },
            indexer_url: "http://127.0.0.1:3000".to_string(),
            store_path: PathBuf::from("data"),
            treasury_address: String::new(),
            liquidity_min: 0,
            liquidity_max: 0,
            health_check_interval_secs: 60,
            liquidity_interval_secs: 300,
            sweep_interval_secs: 300,
            reconcile_interval_secs: 86_400,
            reservation_ttl_secs: 900,
            masternode_servers: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_json(raw: &str) -> crate::Result<Config> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = Config::from_json(
            r#"{"network": "regtest", "liquidity_min": 100, "liquidity_max": 200}"#,
        )
        .unwrap();
        assert_eq!(config.network, Network::Regtest);
        assert_eq!(config.liquidity_min, 100);
        assert_eq!(config.health_check_interval_secs, 60);
    }
}
