mod masternode;
mod reservation;
mod transaction;
mod utxo;
mod withdrawal;

pub use masternode::*;
pub use reservation::*;
pub use transaction::*;
pub use utxo::*;
pub use withdrawal::*;

pub(crate) fn unix_time_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
