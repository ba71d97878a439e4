mod indexer;
mod node;

pub use indexer::*;
pub use node::*;
