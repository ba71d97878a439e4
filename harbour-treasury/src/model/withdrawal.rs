use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WithdrawalStatus {
    Pending,
    Payable,
}

/// A queued customer withdrawal waiting for the liquidity loop to mark it
/// payable. `version` backs the conditional-update loop on status changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingWithdrawal {
    pub id: u64,
    pub account: String,
    /// Satoshis.
    pub amount: i64,
    pub status: WithdrawalStatus,
    pub requested_at: u64,
    pub version: u32,
}
