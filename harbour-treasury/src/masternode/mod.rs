use std::{collections::HashMap, sync::Arc, time::Duration};

use log::{debug, info, warn};
use tokio::task::JoinHandle;

use crate::{
    client::MasternodeInfo,
    model::{unix_time_now, Masternode, MasternodeState},
    repository::{MasternodeRepository, RepositoryOps},
    traits::{NotificationSink, OperatorRegistry, Severity},
    Error, Result,
};

/// A masternode candidate for resignation together with its chain-reported
/// reward score.
#[derive(Debug, Clone)]
pub struct ResignationCandidate {
    pub node: Masternode,
    pub target_multiplier: u32,
}

/// Orders enabled masternodes for decommissioning: drain the
/// lightest-loaded server first, break ties on server name, and inside one
/// server give up the lowest reward score first so the remaining fleet keeps
/// its yield.
pub fn resignation_order(mut candidates: Vec<ResignationCandidate>) -> Vec<ResignationCandidate> {
    let mut per_server: HashMap<String, usize> = HashMap::new();
    for candidate in &candidates {
        *per_server.entry(candidate.node.server.clone()).or_default() += 1;
    }

    candidates.sort_by(|a, b| {
        per_server[&a.node.server]
            .cmp(&per_server[&b.node.server])
            .then_with(|| a.node.server.cmp(&b.node.server))
            .then_with(|| a.target_multiplier.cmp(&b.target_multiplier))
            .then_with(|| a.node.id.cmp(&b.node.id))
    });
    candidates
}

/// Guarded, strictly forward state machine over the durable masternode
/// records, plus the daily reconciliation against the operator registry.
pub struct LifecycleManager {
    repo: MasternodeRepository,
    registry: Arc<dyn OperatorRegistry>,
    notifier: Arc<dyn NotificationSink>,
}

impl LifecycleManager {
    pub fn new(
        repo: MasternodeRepository,
        registry: Arc<dyn OperatorRegistry>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            repo,
            registry,
            notifier,
        }
    }

    pub fn get(&self, id: &str) -> Result<Option<Masternode>> {
        self.repo.get(&id.to_string())
    }

    pub fn all(&self) -> Result<Vec<Masternode>> {
        self.repo.all()
    }

    pub fn in_state(&self, state: MasternodeState) -> Result<Vec<Masternode>> {
        Ok(self
            .repo
            .all()?
            .into_iter()
            .filter(|n| n.state == state)
            .collect())
    }

    fn load(&self, id: &str) -> Result<Masternode> {
        self.repo
            .get(&id.to_string())?
            .ok_or_else(|| Error::Conflict(format!("unknown masternode {id}")))
    }

    /// Strict forward check shared by every transition.
    fn advance(&self, node: &mut Masternode, next: MasternodeState) -> Result<()> {
        if next.rank() <= node.state.rank() {
            return Err(Error::Conflict(format!(
                "masternode {}: illegal transition {:?} -> {next:?}",
                node.id, node.state
            )));
        }
        debug!(
            "[LifecycleManager] {} {:?} -> {next:?}",
            node.id, node.state
        );
        node.state = next;
        Ok(())
    }

    /// Funding for the creation transaction has been dispatched.
    pub fn enabling(&self, id: &str, owner_address: &str, owner_wallet: &str) -> Result<Masternode> {
        let mut node = self.load(id)?;
        self.advance(&mut node, MasternodeState::Enabling)?;
        node.owner_address = owner_address.to_string();
        node.owner_wallet = owner_wallet.to_string();
        self.repo.put(&node.id.clone(), &node)?;
        Ok(node)
    }

    /// Creation transaction accepted; records its hash exactly once.
    pub fn pre_enabled(&self, id: &str, creation_tx: &str) -> Result<Masternode> {
        let mut node = self.load(id)?;
        if node.creation_tx.is_some() {
            return Err(Error::Conflict(format!(
                "masternode {id} already has creation tx"
            )));
        }
        self.advance(&mut node, MasternodeState::PreEnabled)?;
        node.creation_tx = Some(creation_tx.to_string());
        node.creation_date = Some(unix_time_now());
        node.creation_fee_paid = true;
        self.repo.put(&node.id.clone(), &node)?;
        Ok(node)
    }

    pub fn enabled(&self, id: &str) -> Result<Masternode> {
        let mut node = self.load(id)?;
        self.advance(&mut node, MasternodeState::Enabled)?;
        self.repo.put(&node.id.clone(), &node)?;
        Ok(node)
    }

    /// A resignation may only be requested for a node the chain is actually
    /// running.
    pub fn resigning(&self, id: &str, authorization: &str) -> Result<Masternode> {
        let mut node = self.load(id)?;
        if node.state != MasternodeState::Enabled {
            return Err(Error::Conflict(format!(
                "masternode {id}: resignation requires Enabled, is {:?}",
                node.state
            )));
        }
        self.advance(&mut node, MasternodeState::Resigning)?;
        node.resign_authorization = Some(authorization.to_string());
        self.repo.put(&node.id.clone(), &node)?;
        Ok(node)
    }

    /// Resignation transaction observed; requires a recorded creation and no
    /// earlier resignation hash.
    pub fn pre_resigned(&self, id: &str, resign_tx: &str) -> Result<Masternode> {
        let mut node = self.load(id)?;
        if node.creation_tx.is_none() {
            return Err(Error::Conflict(format!(
                "masternode {id} has no creation tx to resign"
            )));
        }
        if node.resign_tx.is_some() {
            return Err(Error::Conflict(format!(
                "masternode {id} already has resign tx"
            )));
        }
        self.advance(&mut node, MasternodeState::PreResigned)?;
        node.resign_tx = Some(resign_tx.to_string());
        node.resign_date = Some(unix_time_now());
        self.repo.put(&node.id.clone(), &node)?;
        Ok(node)
    }

    pub fn moving_collateral(&self, id: &str) -> Result<Masternode> {
        let mut node = self.load(id)?;
        self.advance(&mut node, MasternodeState::MovingCollateral)?;
        self.repo.put(&node.id.clone(), &node)?;
        Ok(node)
    }

    pub fn resigned(&self, id: &str) -> Result<Masternode> {
        let mut node = self.load(id)?;
        self.advance(&mut node, MasternodeState::Resigned)?;
        self.repo.put(&node.id.clone(), &node)?;
        Ok(node)
    }

    /// Folds the chain's view into local records: nodes the chain reports
    /// ENABLED move forward out of PreEnabled, freshly resigned ones move
    /// into PreResigned territory. Chain states never move a record
    /// backwards.
    pub fn sync_from_chain(&self, infos: &HashMap<String, MasternodeInfo>) -> Result<()> {
        for (id, info) in infos {
            let Some(node) = self.repo.get(id)? else {
                continue;
            };
            match (info.state.as_str(), node.state) {
                ("ENABLED", MasternodeState::PreEnabled) => {
                    self.enabled(id)?;
                }
                ("PRE_RESIGNED", MasternodeState::Resigning) => {
                    // The resign tx hash comes from the issuing path; only
                    // advance if it was recorded there.
                    debug!("[LifecycleManager] chain reports {id} PRE_RESIGNED");
                }
                ("RESIGNED", MasternodeState::PreResigned) => {
                    self.moving_collateral(id)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Daily reconciliation: every operator the registry lists gets an Idle
    /// record; Idle records whose operator disappeared are deleted. Records
    /// past Idle are never touched here: their operator leaving the
    /// registry while collateral is bound is an alert, not a delete.
    pub async fn reconcile(&self, servers: &[String]) -> Result<()> {
        for server in servers {
            let operators = self.registry.list_operators(server).await?;
            let known: Vec<Masternode> = self
                .repo
                .all()?
                .into_iter()
                .filter(|n| &n.server == server)
                .collect();

            for operator in &operators {
                if !known.iter().any(|n| &n.operator_id == operator) {
                    let id = format!("{server}/{operator}");
                    info!("[LifecycleManager] new operator {operator} on {server}");
                    self.repo
                        .put(&id.clone(), &Masternode::idle(&id, server, operator))?;
                }
            }

            for node in known {
                if operators.contains(&node.operator_id) {
                    continue;
                }
                if node.state == MasternodeState::Idle {
                    info!(
                        "[LifecycleManager] operator {} gone, deleting idle record {}",
                        node.operator_id, node.id
                    );
                    self.repo.delete(&node.id)?;
                } else {
                    warn!(
                        "[LifecycleManager] operator {} gone but {} is {:?}",
                        node.operator_id, node.id, node.state
                    );
                    self.notifier
                        .notify(
                            Severity::Warning,
                            &format!(
                                "operator {} disappeared while masternode {} is {:?}",
                                node.operator_id, node.id, node.state
                            ),
                        )
                        .await;
                }
            }
        }
        Ok(())
    }

    pub fn spawn_reconciler(
        self: &Arc<Self>,
        servers: Vec<String>,
        period: Duration,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = manager.reconcile(&servers).await {
                    log::error!("[LifecycleManager] reconcile failed: {e}");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tempfile::tempdir;

    use super::*;
    use crate::storage::TreasuryStore;

    struct NullSink;

    #[async_trait]
    impl NotificationSink for NullSink {
        async fn notify(&self, _severity: Severity, _message: &str) {}
    }

    struct FixedRegistry(Mutex<Vec<String>>);

    #[async_trait]
    impl OperatorRegistry for FixedRegistry {
        async fn list_operators(&self, _server: &str) -> Result<Vec<String>> {
            Ok(self.0.lock().clone())
        }
    }

    fn manager(operators: Vec<&str>) -> LifecycleManager {
        let dir = tempdir().unwrap();
        let store = Arc::new(TreasuryStore::new(dir.path()).unwrap());
        std::mem::forget(dir);
        LifecycleManager::new(
            MasternodeRepository::new(store),
            Arc::new(FixedRegistry(Mutex::new(
                operators.into_iter().map(String::from).collect(),
            ))),
            Arc::new(NullSink),
        )
    }

    fn seed(manager: &LifecycleManager, id: &str, server: &str) {
        manager
            .repo
            .put(&id.to_string(), &Masternode::idle(id, server, "op"))
            .unwrap();
    }

    fn candidate(id: &str, server: &str, multiplier: u32) -> ResignationCandidate {
        ResignationCandidate {
            node: Masternode::idle(id, server, "op"),
            target_multiplier: multiplier,
        }
    }

    #[test]
    fn resignation_drains_lightest_server_and_lowest_multiplier_first() {
        let ordered = resignation_order(vec![
            candidate("a5", "serverA", 5),
            candidate("a1", "serverA", 1),
            candidate("b0", "serverB", 0),
        ]);
        assert_eq!(
            ordered.iter().map(|c| c.node.id.as_str()).collect::<Vec<_>>(),
            vec!["b0", "a1", "a5"]
        );
    }

    #[test]
    fn full_forward_walk_succeeds() {
        let manager = manager(vec![]);
        seed(&manager, "mn1", "serverA");

        manager.enabling("mn1", "owner-addr", "wallet-1").unwrap();
        manager.pre_enabled("mn1", "txa").unwrap();
        manager.enabled("mn1").unwrap();
        manager.resigning("mn1", "sig").unwrap();
        manager.pre_resigned("mn1", "txb").unwrap();
        manager.moving_collateral("mn1").unwrap();
        let node = manager.resigned("mn1").unwrap();
        assert_eq!(node.state, MasternodeState::Resigned);
        assert_eq!(node.creation_tx.as_deref(), Some("txa"));
        assert_eq!(node.resign_tx.as_deref(), Some("txb"));
    }

    #[test]
    fn pre_enabled_twice_is_a_conflict() {
        let manager = manager(vec![]);
        seed(&manager, "mn1", "serverA");
        manager.enabling("mn1", "owner", "wallet").unwrap();
        manager.pre_enabled("mn1", "txa").unwrap();
        assert!(matches!(
            manager.pre_enabled("mn1", "txb"),
            Err(Error::Conflict(_))
        ));
    }

    #[test]
    fn resigning_requires_enabled() {
        let manager = manager(vec![]);
        seed(&manager, "mn1", "serverA");
        manager.enabling("mn1", "owner", "wallet").unwrap();
        assert!(matches!(
            manager.resigning("mn1", "sig"),
            Err(Error::Conflict(_))
        ));
    }

    #[test]
    fn pre_resigned_requires_creation_and_no_resign_tx() {
        let manager = manager(vec![]);
        seed(&manager, "mn1", "serverA");
        manager.enabling("mn1", "owner", "wallet").unwrap();
        // No creation tx recorded yet.
        assert!(matches!(
            manager.pre_resigned("mn1", "txb"),
            Err(Error::Conflict(_))
        ));
    }

    #[test]
    fn states_never_move_backwards() {
        let manager = manager(vec![]);
        seed(&manager, "mn1", "serverA");
        manager.enabling("mn1", "owner", "wallet").unwrap();
        manager.pre_enabled("mn1", "txa").unwrap();
        manager.enabled("mn1").unwrap();
        assert!(matches!(
            manager.enabling("mn1", "owner", "wallet"),
            Err(Error::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn reconcile_creates_idle_and_deletes_departed() {
        let registry = Arc::new(FixedRegistry(Mutex::new(vec![
            "op-a".to_string(),
            "op-b".to_string(),
        ])));
        let dir = tempdir().unwrap();
        let store = Arc::new(TreasuryStore::new(dir.path()).unwrap());
        let manager = LifecycleManager::new(
            MasternodeRepository::new(store),
            registry.clone(),
            Arc::new(NullSink),
        );

        let servers = vec!["serverA".to_string()];
        manager.reconcile(&servers).await.unwrap();
        assert_eq!(manager.all().unwrap().len(), 2);

        // op-b disappears; its idle record goes with it.
        *registry.0.lock() = vec!["op-a".to_string()];
        manager.reconcile(&servers).await.unwrap();
        let left = manager.all().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].operator_id, "op-a");
    }

    #[tokio::test]
    async fn reconcile_keeps_non_idle_records_of_departed_operators() {
        let registry = Arc::new(FixedRegistry(Mutex::new(vec!["op-a".to_string()])));
        let dir = tempdir().unwrap();
        let store = Arc::new(TreasuryStore::new(dir.path()).unwrap());
        let manager = LifecycleManager::new(
            MasternodeRepository::new(store),
            registry.clone(),
            Arc::new(NullSink),
        );

        let servers = vec!["serverA".to_string()];
        manager.reconcile(&servers).await.unwrap();
        let id = manager.all().unwrap()[0].id.clone();
        manager.enabling(&id, "owner", "wallet").unwrap();

        *registry.0.lock() = Vec::new();
        manager.reconcile(&servers).await.unwrap();
        // Collateral is bound: the record survives with a warning instead of
        // being deleted.
        assert_eq!(manager.all().unwrap().len(), 1);
    }
}
