use std::{fmt, future::Future, time::Duration};

use futures::future::BoxFuture;
use log::{debug, warn};
use tokio::sync::{mpsc, oneshot};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    Treasury,
    Payout,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Treasury => write!(f, "treasury"),
            NodeRole::Payout => write!(f, "payout"),
        }
    }
}

/// Wait classes for queued items. Wallet-state operations give up after a
/// minute; operations that ride out a confirmation get fifteen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    Wallet,
    Confirmation,
}

impl OpClass {
    pub fn limit(&self) -> Duration {
        match self {
            OpClass::Wallet => Duration::from_secs(65),
            OpClass::Confirmation => Duration::from_secs(15 * 60),
        }
    }
}

type Job = BoxFuture<'static, ()>;

/// Single-flight queue for one node role. Items run strictly one at a time
/// in submission order on a dedicated task; this is what makes the
/// snapshot-read-then-reserve pattern safe without row locks. A timed-out
/// item keeps running in the background; its outcome is unknown to the
/// caller, never rolled back here.
pub struct RoleQueue {
    role: NodeRole,
    tx: mpsc::UnboundedSender<Job>,
}

impl RoleQueue {
    pub fn new(role: NodeRole) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job.await;
            }
            debug!("[RoleQueue] {role} queue drained and closed");
        });
        Self { role, tx }
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub async fn run<T, F, Fut>(&self, class: OpClass, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let _ = done_tx.send(op().await);
        });
        self.tx
            .send(job)
            .map_err(|_| Error::NodeUnavailable(self.role.to_string()))?;

        let limit = class.limit();
        match tokio::time::timeout(limit, done_rx).await {
            Err(_) => {
                warn!(
                    "[RoleQueue] {} item exceeded {limit:?}; outcome unknown",
                    self.role
                );
                Err(Error::Timeout(limit))
            }
            Ok(Err(_)) => Err(Error::NodeUnavailable(self.role.to_string())),
            Ok(Ok(result)) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[tokio::test]
    async fn items_run_in_submission_order() {
        let queue = Arc::new(RoleQueue::new(NodeRole::Treasury));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..8u32 {
            let queue = Arc::clone(&queue);
            let seen = Arc::clone(&seen);
            handles.push(tokio::spawn(async move {
                queue
                    .run(OpClass::Wallet, move || async move {
                        seen.lock().push(i);
                        Ok(i)
                    })
                    .await
            }));
            // Submission order is only defined once the send happened; yield
            // so each spawned task enqueues before the next one starts.
            tokio::task::yield_now().await;
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(*seen.lock(), (0..8).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_item_times_out_but_still_completes() {
        let queue = Arc::new(RoleQueue::new(NodeRole::Treasury));
        let finished = Arc::new(Mutex::new(false));

        let marker = Arc::clone(&finished);
        let result = queue
            .run(OpClass::Wallet, move || async move {
                tokio::time::sleep(Duration::from_secs(120)).await;
                *marker.lock() = true;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::Timeout(_))));

        // The queue keeps draining; the item finishes in the background.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(*finished.lock());
    }
}
