use std::sync::Arc;

use harbour_db::LedgerColumn;
use harbour_macros::Repository;
use parking_lot::Mutex;

use super::RepositoryOps;
use crate::{
    model::PendingWithdrawal,
    storage::{columns, SortOrder, TreasuryStore},
    Error, Result,
};

const UPDATE_ATTEMPTS: usize = 5;

#[derive(Repository)]
#[repository(K = "u64", V = "PendingWithdrawal")]
pub struct WithdrawalRepository {
    pub store: Arc<TreasuryStore>,
    col: LedgerColumn<columns::Withdrawal>,
    write_gate: Mutex<()>,
}

impl WithdrawalRepository {
    pub fn new(store: Arc<TreasuryStore>) -> Self {
        let col = store.column();
        Self {
            store,
            col,
            write_gate: Mutex::new(()),
        }
    }

    pub fn all(&self) -> Result<Vec<PendingWithdrawal>> {
        self.list(None, SortOrder::Ascending)?
            .map(|item| {
                let (_, withdrawal) = item?;
                Ok(withdrawal)
            })
            .collect()
    }

    /// Version-checked update. Re-reads the row, applies `mutate`, and only
    /// writes if the version is unchanged since the read. Bounded retries;
    /// exhaustion surfaces as `Conflict` instead of silently giving up.
    pub fn update_checked<F>(&self, id: u64, mutate: F) -> Result<PendingWithdrawal>
    where
        F: Fn(&mut PendingWithdrawal),
    {
        for _ in 0..UPDATE_ATTEMPTS {
            let current = self
                .get(&id)?
                .ok_or_else(|| Error::Conflict(format!("withdrawal {id} disappeared")))?;
            let expected_version = current.version;

            let mut next = current;
            mutate(&mut next);
            next.version = expected_version + 1;

            let gate = self.write_gate.lock();
            let reread = self
                .get(&id)?
                .ok_or_else(|| Error::Conflict(format!("withdrawal {id} disappeared")))?;
            if reread.version == expected_version {
                self.put(&id, &next)?;
                drop(gate);
                return Ok(next);
            }
            drop(gate);
        }

        Err(Error::Conflict(format!(
            "withdrawal {id}: update contention persisted after {UPDATE_ATTEMPTS} attempts"
        )))
    }
}
