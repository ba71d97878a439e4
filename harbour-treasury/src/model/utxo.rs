use bitcoin::{ScriptBuf, Txid};
use serde::{Deserialize, Serialize};

/// Composite id of an on-chain output. The chain owns the output; everything
/// here only references it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputRef {
    pub txid: Txid,
    pub vout: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnspentOutput {
    pub txid: Txid,
    pub vout: u32,
    pub script: ScriptBuf,
    /// Satoshis.
    pub value: i64,
    pub token_id: u32,
}

impl UnspentOutput {
    pub fn output_ref(&self) -> OutputRef {
        OutputRef {
            txid: self.txid,
            vout: self.vout,
        }
    }
}

/// Outputs handed to a caller under a live reservation.
#[derive(Debug, Clone)]
pub struct ReservedOutputs {
    pub address: String,
    pub outputs: Vec<UnspentOutput>,
}

impl ReservedOutputs {
    pub fn total_value(&self) -> i64 {
        self.outputs.iter().map(|o| o.value).sum()
    }

    pub fn refs(&self) -> Vec<OutputRef> {
        self.outputs.iter().map(UnspentOutput::output_ref).collect()
    }
}
