pub mod amount;
mod assembler;
mod broadcast;
pub mod client;
pub mod config;
pub mod error;
mod liquidity;
mod masternode;
pub mod model;
mod network;
mod nodepool;
mod queue;
mod repository;
mod storage;
mod traits;
mod treasury;
mod utxo;

pub use assembler::Assembler;
pub use broadcast::Broadcaster;
pub use config::Config;
pub use error::{Error, Result};
pub use liquidity::{CycleReport, LiquidityController};
pub use masternode::{resignation_order, LifecycleManager, ResignationCandidate};
pub use network::{ChainParams, Network};
pub use nodepool::{NodeHandle, NodeMode, NodePool};
pub use queue::{NodeRole, OpClass, RoleQueue};
pub use traits::{LogNotifier, NotificationSink, OperatorRegistry, Severity, Signer};
pub use treasury::{FundingNeed, OperationRequest, Treasury};
pub use utxo::{
    select_count, select_exact, select_until_amount, SelectionPolicy, UtxoLedger,
};
