use bitcoin::{ScriptBuf};
use std::io;
use harbour_macros::ConsensusEncoding;

use super::{
    balance::{ScriptBalances, TokenBalanceVarInt},
    common::{CompactVec, VarInt},
};

#[derive(ConsensusEncoding, Debug, Clone, PartialEq, Eq)]
pub struct MaxPrice {
    pub integer: i64,
    pub fraction: i64,
}

#[derive(ConsensusEncoding, Debug, Clone, PartialEq, Eq)]
pub struct PoolSwap {
    pub from_script: ScriptBuf,
    pub from_token_id: VarInt,
    pub from_amount: i64,
    pub to_script: ScriptBuf,
    pub to_token_id: VarInt,
    pub max_price: MaxPrice,
}

#[derive(ConsensusEncoding, Debug, Clone, PartialEq, Eq)]
pub struct PoolId {
    pub id: VarInt,
}

#[derive(ConsensusEncoding, Debug, Clone, PartialEq, Eq)]
pub struct CompositeSwap {
    pub pool_swap: PoolSwap,
    pub pools: CompactVec<PoolId>,
}

#[derive(ConsensusEncoding, Debug, Clone, PartialEq, Eq)]
pub struct PoolAddLiquidity {
    pub from: CompactVec<ScriptBalances>,
    pub share_address: ScriptBuf,
}

#[derive(ConsensusEncoding, Debug, Clone, PartialEq, Eq)]
pub struct PoolRemoveLiquidity {
    pub script: ScriptBuf,
    pub amount: TokenBalanceVarInt,
}
