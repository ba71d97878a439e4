use serde::{Deserialize, Serialize};

/// Strictly forward lifecycle. `rank` gives the machine its ordering; a
/// transition to an equal or lower rank is a conflict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MasternodeState {
    Idle,
    Enabling,
    PreEnabled,
    Enabled,
    Resigning,
    PreResigned,
    MovingCollateral,
    Resigned,
}

impl MasternodeState {
    pub fn rank(&self) -> u8 {
        match self {
            MasternodeState::Idle => 0,
            MasternodeState::Enabling => 1,
            MasternodeState::PreEnabled => 2,
            MasternodeState::Enabled => 3,
            MasternodeState::Resigning => 4,
            MasternodeState::PreResigned => 5,
            MasternodeState::MovingCollateral => 6,
            MasternodeState::Resigned => 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Masternode {
    pub id: String,
    /// Hosting server the operator runs on.
    pub server: String,
    pub operator_id: String,
    pub owner_address: String,
    pub owner_wallet: String,
    pub account_index: u32,
    pub timelock: u16,
    pub creation_tx: Option<String>,
    pub creation_date: Option<u64>,
    pub resign_tx: Option<String>,
    pub resign_date: Option<u64>,
    /// Signed authorization handed to the hosting server when the liquidity
    /// loop requests a resignation.
    pub resign_authorization: Option<String>,
    pub state: MasternodeState,
    pub creation_fee_paid: bool,
}

impl Masternode {
    pub fn idle(id: &str, server: &str, operator_id: &str) -> Self {
        Masternode {
            id: id.to_string(),
            server: server.to_string(),
            operator_id: operator_id.to_string(),
            owner_address: String::new(),
            owner_wallet: String::new(),
            account_index: 0,
            timelock: 0,
            creation_tx: None,
            creation_date: None,
            resign_tx: None,
            resign_date: None,
            resign_authorization: None,
            state: MasternodeState::Idle,
            creation_fee_paid: false,
        }
    }

    /// Collateral still owed back to the treasury while a resignation is in
    /// flight.
    pub fn is_returning_collateral(&self) -> bool {
        matches!(
            self.state,
            MasternodeState::Resigning
                | MasternodeState::PreResigned
                | MasternodeState::MovingCollateral
        )
    }
}
