use bitcoin::{ScriptBuf, Txid};
use std::io;
use harbour_macros::ConsensusEncoding;

use super::{balance::TokenBalanceUInt32, common::CompactVec};

#[derive(ConsensusEncoding, Debug, Clone, PartialEq, Eq)]
pub struct TakeLoan {
    pub vault_id: Txid,
    pub to: ScriptBuf,
    pub token_amounts: CompactVec<TokenBalanceUInt32>,
}

#[derive(ConsensusEncoding, Debug, Clone, PartialEq, Eq)]
pub struct PaybackLoan {
    pub vault_id: Txid,
    pub from: ScriptBuf,
    pub token_amounts: CompactVec<TokenBalanceUInt32>,
}
