use bitcoin::{ScriptBuf};
use std::io;
use harbour_macros::ConsensusEncoding;

use super::{
    balance::{ScriptBalances, TokenBalanceUInt32},
    common::{CompactVec, VarInt},
};

#[derive(ConsensusEncoding, Debug, Clone, PartialEq, Eq)]
pub struct UtxosToAccount {
    pub to: CompactVec<ScriptBalances>,
}

#[derive(ConsensusEncoding, Debug, Clone, PartialEq, Eq)]
pub struct AccountToUtxos {
    pub from: ScriptBuf,
    pub balances: CompactVec<TokenBalanceUInt32>,
    pub minting_outputs_start: VarInt,
}

#[derive(ConsensusEncoding, Debug, Clone, PartialEq, Eq)]
pub struct AccountToAccount {
    pub from: ScriptBuf,
    pub to: CompactVec<ScriptBalances>,
}
