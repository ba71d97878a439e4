use bitcoin::{ScriptBuf, Txid};
use serde::{Deserialize, Serialize};

use super::OutputRef;

/// A fully built transaction waiting for signatures. Immutable; consumed
/// exactly once by the broadcaster. On a failed send `consumed` is what gets
/// released back to the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledTransaction {
    pub txid: Txid,
    pub hex: String,
    pub funding_script: ScriptBuf,
    /// Address whose reservations back `consumed`.
    pub address: String,
    pub consumed: Vec<OutputRef>,
}
