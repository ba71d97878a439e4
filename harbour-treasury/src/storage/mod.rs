pub mod columns;

use std::{fs, marker::PhantomData, path::Path, sync::Arc};

use harbour_db::{Column, ColumnName, LedgerColumn, Rocks};
pub use harbour_db::SortOrder;

use crate::Result;

#[derive(Debug, Clone)]
pub struct TreasuryStore(Arc<Rocks>);

impl TreasuryStore {
    pub fn new(path: &Path) -> Result<Self> {
        let path = path.join("treasury");
        fs::create_dir_all(&path)?;
        let backend = Arc::new(Rocks::open(&path, &columns::COLUMN_NAMES)?);

        Ok(Self(backend))
    }

    pub fn column<C>(&self) -> LedgerColumn<C>
    where
        C: Column + ColumnName,
    {
        LedgerColumn {
            backend: Arc::clone(&self.0),
            column: PhantomData,
        }
    }
}
