use std::sync::Arc;

use harbour_db::LedgerColumn;
use harbour_macros::Repository;

use super::RepositoryOps;
use crate::{
    model::Masternode,
    storage::{columns, SortOrder, TreasuryStore},
    Result,
};

#[derive(Repository)]
#[repository(K = "String", V = "Masternode")]
pub struct MasternodeRepository {
    pub store: Arc<TreasuryStore>,
    col: LedgerColumn<columns::Masternode>,
}

impl MasternodeRepository {
    pub fn new(store: Arc<TreasuryStore>) -> Self {
        let col = store.column();
        Self { store, col }
    }

    pub fn all(&self) -> Result<Vec<Masternode>> {
        self.list(None, SortOrder::Ascending)?
            .map(|item| {
                let (_, node) = item?;
                Ok(node)
            })
            .collect()
    }
}
