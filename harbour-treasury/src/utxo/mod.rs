mod ledger;
mod selector;

pub use ledger::*;
pub use selector::*;
