use bitcoin::Txid;
use serde::{Deserialize, Serialize};

use super::OutputRef;

/// Durable key: (address, txid, vout).
pub type ReservationKey = (String, Txid, u32);

/// A lock on one output for one pending operation. Lives in the durable
/// store and the in-memory mirror; outlives a crash and is recovered by the
/// expiry sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reservation {
    pub address: String,
    pub output: OutputRef,
    pub value: i64,
    /// Unix seconds.
    pub expires_at: u64,
}

impl Reservation {
    pub fn key(&self) -> ReservationKey {
        (self.address.clone(), self.output.txid, self.output.vout)
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at <= now
    }
}
