use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use log::{debug, info};
use parking_lot::RwLock;
use tokio::task::JoinHandle;

use crate::{
    client::UtxoSource,
    model::{unix_time_now, OutputRef, Reservation, UnspentOutput},
    repository::{RepositoryOps, ReservationRepository},
    Result,
};

#[derive(Debug, Clone)]
struct CacheEntry {
    height: u64,
    outputs: Vec<UnspentOutput>,
}

/// Per-address unspent cache plus the reservation ledger over it.
///
/// The cache is only ever one block stale: every read path compares the
/// stored height against the chain tip first. Reservations live in the
/// durable store and an in-memory mirror; the mirror reloads lazily per
/// address after a restart. Mutual exclusion between "read spendable" and
/// "reserve" for one operation comes from the role queue, not from locks
/// here.
pub struct UtxoLedger {
    source: Arc<dyn UtxoSource>,
    reservations: ReservationRepository,
    cache: RwLock<HashMap<String, CacheEntry>>,
    mirror: RwLock<HashMap<String, HashMap<OutputRef, Reservation>>>,
    loaded: RwLock<HashSet<String>>,
}

impl UtxoLedger {
    pub fn new(source: Arc<dyn UtxoSource>, reservations: ReservationRepository) -> Self {
        Self {
            source,
            reservations,
            cache: RwLock::new(HashMap::new()),
            mirror: RwLock::new(HashMap::new()),
            loaded: RwLock::new(HashSet::new()),
        }
    }

    fn ensure_loaded(&self, address: &str) -> Result<()> {
        if self.loaded.read().contains(address) {
            return Ok(());
        }
        let rows = self.reservations.by_address(address)?;
        let mut mirror = self.mirror.write();
        let entry = mirror.entry(address.to_string()).or_default();
        for row in rows {
            entry.insert(row.output, row);
        }
        self.loaded.write().insert(address.to_string());
        Ok(())
    }

    /// Unspent set minus live reservations.
    pub async fn spendable(&self, address: &str) -> Result<Vec<UnspentOutput>> {
        self.refresh_if_stale(address).await?;

        let now = unix_time_now();
        let mirror = self.mirror.read();
        let reserved = mirror.get(address);
        let cache = self.cache.read();
        let outputs = cache.get(address).map(|e| e.outputs.clone()).unwrap_or_default();

        Ok(outputs
            .into_iter()
            .filter(|o| {
                reserved
                    .and_then(|r| r.get(&o.output_ref()))
                    .map_or(true, |r| r.is_expired(now))
            })
            .collect())
    }

    /// Refetches the address when the chain tip moved. Reservations whose
    /// backing output vanished from the unspent set are dropped; spent and
    /// consumed-by-a-failed-tx look identical from here and are handled the
    /// same way.
    pub async fn refresh_if_stale(&self, address: &str) -> Result<()> {
        self.ensure_loaded(address)?;

        let height = self.source.current_height().await?;
        if self
            .cache
            .read()
            .get(address)
            .is_some_and(|e| e.height == height)
        {
            return Ok(());
        }

        let outputs = self.source.list_unspent(address).await?;
        debug!(
            "[UtxoLedger] refreshed {address} at height {height}: {} outputs",
            outputs.len()
        );

        let live: HashSet<OutputRef> = outputs.iter().map(UnspentOutput::output_ref).collect();
        let stale: Vec<Reservation> = {
            let mirror = self.mirror.read();
            mirror
                .get(address)
                .map(|reserved| {
                    reserved
                        .values()
                        .filter(|r| !live.contains(&r.output))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };
        for reservation in stale {
            info!(
                "[UtxoLedger] dropping reservation on consumed output {:?}",
                reservation.output
            );
            self.reservations.delete(&reservation.key())?;
            if let Some(reserved) = self.mirror.write().get_mut(address) {
                reserved.remove(&reservation.output);
            }
        }

        self.cache
            .write()
            .insert(address.to_string(), CacheEntry { height, outputs });
        Ok(())
    }

    pub fn reserve(&self, address: &str, outputs: &[UnspentOutput], ttl: Duration) -> Result<()> {
        self.ensure_loaded(address)?;
        let expires_at = unix_time_now() + ttl.as_secs();
        let mut mirror = self.mirror.write();
        let entry = mirror.entry(address.to_string()).or_default();
        for output in outputs {
            let reservation = Reservation {
                address: address.to_string(),
                output: output.output_ref(),
                value: output.value,
                expires_at,
            };
            self.reservations.put(&reservation.key(), &reservation)?;
            entry.insert(reservation.output, reservation);
        }
        Ok(())
    }

    pub fn release(&self, address: &str, refs: &[OutputRef]) -> Result<()> {
        self.ensure_loaded(address)?;
        let mut mirror = self.mirror.write();
        let entry = mirror.entry(address.to_string()).or_default();
        for output in refs {
            self.reservations
                .delete(&(address.to_string(), output.txid, output.vout))?;
            entry.remove(output);
        }
        Ok(())
    }

    /// Drops reservations whose holder never came back: crashed processes,
    /// abandoned operations. Runs every five minutes from the sweeper task.
    pub fn sweep_expired(&self) -> Result<usize> {
        let now = unix_time_now();
        let mut swept = 0;
        for reservation in self.reservations.all()? {
            if reservation.is_expired(now) {
                self.reservations.delete(&reservation.key())?;
                if let Some(reserved) = self.mirror.write().get_mut(&reservation.address) {
                    reserved.remove(&reservation.output);
                }
                swept += 1;
            }
        }
        if swept > 0 {
            info!("[UtxoLedger] swept {swept} expired reservations");
        }
        Ok(swept)
    }

    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let ledger = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = ledger.sweep_expired() {
                    log::error!("[UtxoLedger] sweep failed: {e}");
                }
            }
        })
    }
}
