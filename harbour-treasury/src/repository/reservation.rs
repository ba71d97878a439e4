use std::sync::Arc;

use harbour_db::LedgerColumn;
use harbour_macros::Repository;

use super::RepositoryOps;
use crate::{
    model::{Reservation, ReservationKey},
    storage::{columns, SortOrder, TreasuryStore},
    Result,
};

#[derive(Repository)]
#[repository(K = "ReservationKey", V = "Reservation")]
pub struct ReservationRepository {
    pub store: Arc<TreasuryStore>,
    col: LedgerColumn<columns::Reservation>,
}

impl ReservationRepository {
    pub fn new(store: Arc<TreasuryStore>) -> Self {
        let col = store.column();
        Self { store, col }
    }

    pub fn all(&self) -> Result<Vec<Reservation>> {
        self.list(None, SortOrder::Ascending)?
            .map(|item| {
                let (_, reservation) = item?;
                Ok(reservation)
            })
            .collect()
    }

    pub fn by_address(&self, address: &str) -> Result<Vec<Reservation>> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|r| r.address == address)
            .collect())
    }
}
