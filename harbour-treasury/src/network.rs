use std::fmt;

use harbour_dftx::COIN;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
    Devnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
            Network::Devnet => "devnet",
        }
    }

    pub fn params(&self) -> ChainParams {
        match self {
            Network::Mainnet | Network::Testnet | Network::Devnet => ChainParams {
                masternode_collateral: 20_000 * COIN,
                masternode_creation_fee: 10 * COIN,
                fee_per_byte: 1,
                min_output_value: 10_000,
                max_inputs: 500,
                fee_buffer: COIN / 10,
            },
            Network::Regtest => ChainParams {
                masternode_collateral: 2 * COIN,
                masternode_creation_fee: COIN,
                fee_per_byte: 1,
                min_output_value: 10_000,
                max_inputs: 500,
                fee_buffer: COIN / 10,
            },
        }
    }
}

impl std::str::FromStr for Network {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            "regtest" => Ok(Network::Regtest),
            "devnet" => Ok(Network::Devnet),
            _ => Err("invalid network"),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Chain constants the assembler and liquidity loop work against. All values
/// in satoshis.
#[derive(Debug, Clone, Copy)]
pub struct ChainParams {
    pub masternode_collateral: i64,
    pub masternode_creation_fee: i64,
    pub fee_per_byte: i64,
    /// Smallest value a non-carrier output may hold after fee deduction.
    pub min_output_value: i64,
    /// Protocol cap on transaction inputs.
    pub max_inputs: usize,
    /// Headroom accumulated on top of a selection target to cover the fee.
    pub fee_buffer: i64,
}

impl ChainParams {
    pub fn masternode_unit_cost(&self) -> i64 {
        self.masternode_collateral + self.masternode_creation_fee + self.fee_buffer
    }
}
