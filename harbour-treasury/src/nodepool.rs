use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use log::{debug, info, warn};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::{
    client::NodeClient,
    model::unix_time_now,
    queue::NodeRole,
    traits::{NotificationSink, Severity},
    Error, Result,
};

/// A connection unhealthy this long gets one out-of-band restart request.
const RESTART_AFTER: Duration = Duration::from_secs(30 * 60);
/// A node keeping up within this many blocks of its headers counts healthy.
const SYNC_LAG_TOLERANCE: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeMode {
    Active,
    Passive,
}

/// Read-only snapshot for monitoring/display consumers.
#[derive(Debug, Clone, Serialize)]
pub struct NodeHandle {
    pub role: String,
    pub mode: NodeMode,
    pub endpoint: String,
    pub healthy: bool,
    pub last_checked: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Swapped { from: usize, to: usize },
    RestartRequested(usize),
    BothUnhealthy,
    Recovered(usize),
}

#[derive(Debug)]
struct SlotHealth {
    healthy: bool,
    unhealthy_since: Option<Instant>,
    restart_requested: bool,
    last_checked: u64,
}

struct NodeSlot {
    client: Arc<NodeClient>,
    health: RwLock<SlotHealth>,
}

/// Owns the redundant connection pair for one role. Consumers always go
/// through `active()` per use, so a swap is observed on the next call rather
/// than through a cached stale reference.
pub struct NodePool {
    role: NodeRole,
    slots: [NodeSlot; 2],
    active_idx: RwLock<usize>,
    notifier: Arc<dyn NotificationSink>,
}

impl NodePool {
    pub fn new(
        role: NodeRole,
        primary: NodeClient,
        secondary: NodeClient,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let slot = |client: NodeClient| NodeSlot {
            client: Arc::new(client),
            health: RwLock::new(SlotHealth {
                healthy: true,
                unhealthy_since: None,
                restart_requested: false,
                last_checked: 0,
            }),
        };
        Self {
            role,
            slots: [slot(primary), slot(secondary)],
            active_idx: RwLock::new(0),
            notifier,
        }
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn active(&self) -> Arc<NodeClient> {
        let idx = *self.active_idx.read();
        Arc::clone(&self.slots[idx].client)
    }

    pub fn handle(&self) -> NodeHandle {
        let idx = *self.active_idx.read();
        let health = self.slots[idx].health.read();
        NodeHandle {
            role: self.role.to_string(),
            mode: NodeMode::Active,
            endpoint: self.slots[idx].client.endpoint().to_string(),
            healthy: health.healthy,
            last_checked: health.last_checked,
        }
    }

    /// Polls both connections and applies the transition rules. Runs from the
    /// monitor task every minute; read-only RPC, safe alongside queue work.
    pub async fn check_health(&self) -> Vec<Transition> {
        let mut results = [false, false];
        for (idx, slot) in self.slots.iter().enumerate() {
            results[idx] = match slot.client.get_blockchain_info().await {
                Ok(info) => info.blocks + SYNC_LAG_TOLERANCE >= info.headers,
                Err(e) => {
                    debug!("[NodePool] {} node {idx} unreachable: {e}", self.role);
                    false
                }
            };
        }
        let transitions = self.apply_health(results, Instant::now());
        self.report(&transitions).await;
        transitions
    }

    /// Pure-state part of the health cycle, separated so the transition rules
    /// are testable without a node.
    fn apply_health(&self, results: [bool; 2], now: Instant) -> Vec<Transition> {
        let mut transitions = Vec::new();

        for (idx, healthy) in results.into_iter().enumerate() {
            let mut health = self.slots[idx].health.write();
            let was_healthy = health.healthy;
            health.healthy = healthy;
            health.last_checked = unix_time_now();

            if healthy {
                if !was_healthy {
                    transitions.push(Transition::Recovered(idx));
                }
                health.unhealthy_since = None;
                health.restart_requested = false;
            } else {
                let since = *health.unhealthy_since.get_or_insert(now);
                if now.duration_since(since) >= RESTART_AFTER && !health.restart_requested {
                    health.restart_requested = true;
                    transitions.push(Transition::RestartRequested(idx));
                }
            }
        }

        let active = *self.active_idx.read();
        let standby = 1 - active;
        if !results[active] && results[standby] {
            *self.active_idx.write() = standby;
            transitions.push(Transition::Swapped {
                from: active,
                to: standby,
            });
        } else if !results[0] && !results[1] {
            transitions.push(Transition::BothUnhealthy);
        }

        transitions
    }

    /// Failover path for a transport error observed mid-operation. Swaps only
    /// if the standby was healthy at its last poll.
    pub fn try_failover(&self) -> Result<Arc<NodeClient>> {
        let active = *self.active_idx.read();
        let standby = 1 - active;
        if self.slots[standby].health.read().healthy {
            *self.active_idx.write() = standby;
            info!("[NodePool] {} failover to node {standby}", self.role);
            return Ok(Arc::clone(&self.slots[standby].client));
        }
        Err(Error::NodeUnavailable(self.role.to_string()))
    }

    async fn report(&self, transitions: &[Transition]) {
        for transition in transitions {
            match transition {
                Transition::Swapped { from, to } => {
                    self.notifier
                        .notify(
                            Severity::Warning,
                            &format!(
                                "{} pool: swapped active node {from} -> {to} ({})",
                                self.role,
                                self.slots[*to].client.endpoint()
                            ),
                        )
                        .await;
                }
                Transition::RestartRequested(idx) => {
                    self.notifier
                        .notify(
                            Severity::Critical,
                            &format!(
                                "{} pool: node {idx} ({}) unhealthy for 30m, restart requested",
                                self.role,
                                self.slots[*idx].client.endpoint()
                            ),
                        )
                        .await;
                }
                Transition::BothUnhealthy => {
                    self.notifier
                        .notify(
                            Severity::Critical,
                            &format!("{} pool: both nodes unhealthy", self.role),
                        )
                        .await;
                }
                Transition::Recovered(idx) => {
                    self.notifier
                        .notify(
                            Severity::Info,
                            &format!("{} pool: node {idx} recovered", self.role),
                        )
                        .await;
                }
            }
        }
        if transitions.is_empty() {
            debug!("[NodePool] {} healthy, no transitions", self.role);
        }
    }

    pub fn spawn_monitor(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let transitions = pool.check_health().await;
                if !transitions.is_empty() {
                    warn!("[NodePool] {} transitions: {transitions:?}", pool.role);
                }
            }
        })
    }
}
