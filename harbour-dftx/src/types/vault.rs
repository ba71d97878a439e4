use bitcoin::{ScriptBuf, Txid};
use std::io;
use harbour_macros::ConsensusEncoding;

use super::balance::TokenBalanceVarInt;

#[derive(ConsensusEncoding, Debug, Clone, PartialEq, Eq)]
pub struct CreateVault {
    pub owner_address: ScriptBuf,
    pub scheme_id: String,
}

#[derive(ConsensusEncoding, Debug, Clone, PartialEq, Eq)]
pub struct DepositToVault {
    pub vault_id: Txid,
    pub from: ScriptBuf,
    pub token_amount: TokenBalanceVarInt,
}

#[derive(ConsensusEncoding, Debug, Clone, PartialEq, Eq)]
pub struct WithdrawFromVault {
    pub vault_id: Txid,
    pub to: ScriptBuf,
    pub token_amount: TokenBalanceVarInt,
}
