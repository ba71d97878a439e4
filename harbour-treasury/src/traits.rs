use async_trait::async_trait;
use log::{error, info, warn};

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Alert delivery is someone else's job; the core only reports. Every node
/// pool transition and liquidity decision goes through here.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, severity: Severity, message: &str);
}

/// External signing service. The core never holds wallet keys; it hands over
/// the serialized transaction and gets back the witness stack authorizing
/// its inputs (identical per input, since they share the funding script).
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, payload: &[u8]) -> Result<Vec<Vec<u8>>>;
}

/// Source of truth for which operators exist per hosting server, polled
/// daily to reconcile masternode records.
#[async_trait]
pub trait OperatorRegistry: Send + Sync {
    async fn list_operators(&self, server: &str) -> Result<Vec<String>>;
}

/// Default sink that folds notifications into the log stream.
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Info => info!("[notify] {message}"),
            Severity::Warning => warn!("[notify] {message}"),
            Severity::Critical => error!("[notify] {message}"),
        }
    }
}
