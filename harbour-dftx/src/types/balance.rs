use bitcoin::{ScriptBuf};
use std::io;
use harbour_macros::ConsensusEncoding;

use super::common::{CompactVec, VarInt};

// CBalances
#[derive(ConsensusEncoding, Debug, Clone, PartialEq, Eq)]
pub struct TokenBalanceUInt32 {
    pub token: u32,
    pub amount: i64,
}

#[derive(ConsensusEncoding, Debug, Clone, PartialEq, Eq)]
pub struct ScriptBalances {
    pub script: ScriptBuf,
    pub balances: CompactVec<TokenBalanceUInt32>,
}

// CTokenAmount
#[derive(ConsensusEncoding, Debug, Clone, PartialEq, Eq)]
pub struct TokenBalanceVarInt {
    pub token: VarInt,
    pub amount: i64,
}
