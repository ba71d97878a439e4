use std::sync::Arc;

use bitcoin::{
    consensus::{deserialize, encode::serialize_hex},
    Transaction, Txid, Witness,
};
use log::{info, warn};

use crate::{
    model::AssembledTransaction,
    nodepool::NodePool,
    traits::Signer,
    utxo::UtxoLedger,
    Error, Result,
};

/// Terminal stage of every operation: obtain signatures, inject them, submit
/// to the active node. Owns the unlock-on-failure discipline: a reservation
/// that survives a failed send starves the pool for every later caller.
pub struct Broadcaster {
    pool: Arc<NodePool>,
    signer: Arc<dyn Signer>,
    ledger: Arc<UtxoLedger>,
}

fn inject_witness(tx: &mut Transaction, stack: &[Vec<u8>]) {
    let witness = Witness::from_slice(stack);
    for input in &mut tx.input {
        input.witness = witness.clone();
    }
}

impl Broadcaster {
    pub fn new(pool: Arc<NodePool>, signer: Arc<dyn Signer>, ledger: Arc<UtxoLedger>) -> Self {
        Self {
            pool,
            signer,
            ledger,
        }
    }

    pub async fn sign_and_send(&self, assembled: &AssembledTransaction) -> Result<Txid> {
        let raw = hex::decode(&assembled.hex)?;
        let mut tx: Transaction = deserialize(&raw)?;

        let stack = match self.signer.sign(&raw).await {
            Ok(stack) => stack,
            Err(e) => {
                self.release(assembled)?;
                return Err(e);
            }
        };
        inject_witness(&mut tx, &stack);
        let signed_hex = serialize_hex(&tx);

        match self.send(&signed_hex).await {
            Ok(txid) => {
                // Consumption removes the reservation; the outputs are spent
                // and the next refresh would drop them anyway.
                self.release(assembled)?;
                info!("[Broadcaster] sent {txid}");
                Ok(txid)
            }
            Err(e) if e.is_ambiguous_timeout() => {
                // Outcome unknown: the transaction may be in a mempool. The
                // reservation stays; expiry or a later refresh resolves it.
                warn!("[Broadcaster] send outcome unknown for {}", assembled.txid);
                Err(e)
            }
            Err(e) => {
                self.release(assembled)?;
                Err(e)
            }
        }
    }

    /// One transparent retry against the standby when the active node is
    /// unreachable. Chain-level rejections are final: the transaction is
    /// known invalid and must never be resubmitted.
    async fn send(&self, signed_hex: &str) -> Result<Txid> {
        match self.pool.active().send_raw_transaction(signed_hex).await {
            Ok(txid) => Ok(txid),
            Err(e) if e.is_transport() => {
                warn!("[Broadcaster] active node unreachable, trying failover: {e}");
                let standby = self.pool.try_failover()?;
                standby.send_raw_transaction(signed_hex).await
            }
            Err(e) => Err(e),
        }
    }

    fn release(&self, assembled: &AssembledTransaction) -> Result<()> {
        self.ledger.release(&assembled.address, &assembled.consumed)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use bitcoin::ScriptBuf;
    use parking_lot::Mutex;
    use tempfile::tempdir;

    use super::*;
    use crate::{
        client::{NodeClient, UtxoSource},
        model::UnspentOutput,
        queue::NodeRole,
        repository::ReservationRepository,
        storage::TreasuryStore,
        traits::{NotificationSink, Severity},
    };

    struct NullSink;

    #[async_trait]
    impl NotificationSink for NullSink {
        async fn notify(&self, _severity: Severity, _message: &str) {}
    }

    struct FailingSigner;

    #[async_trait]
    impl Signer for FailingSigner {
        async fn sign(&self, _payload: &[u8]) -> Result<Vec<Vec<u8>>> {
            Err(Error::Conflict("signer offline".to_string()))
        }
    }

    struct StaticSource(Vec<UnspentOutput>);

    #[async_trait]
    impl UtxoSource for StaticSource {
        async fn current_height(&self) -> Result<u64> {
            Ok(7)
        }
        async fn list_unspent(&self, _address: &str) -> Result<Vec<UnspentOutput>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn witness_injection_covers_every_input() {
        use bitcoin::hashes::Hash;
        let funding = (0..3)
            .map(|i| UnspentOutput {
                txid: bitcoin::Txid::from_byte_array([i; 32]),
                vout: 0,
                script: ScriptBuf::from(vec![0x00, 0x14, i]),
                value: 100_000_000,
                token_id: 0,
            })
            .collect::<Vec<_>>();
        let assembled = crate::assembler::Assembler::new(crate::network::Network::Mainnet.params())
            .build_transfer(
                "addr",
                &funding,
                ScriptBuf::from(vec![0x00, 0x14, 0xaa]),
                100_000_000,
                true,
            )
            .unwrap();

        let mut tx: Transaction = deserialize(&hex::decode(&assembled.hex).unwrap()).unwrap();
        inject_witness(&mut tx, &[vec![1u8; 64], vec![2u8; 33]]);
        assert!(tx
            .input
            .iter()
            .all(|i| i.witness.iter().map(|w| w.to_vec()).collect::<Vec<_>>()
                == vec![vec![1u8; 64], vec![2u8; 33]]));
    }

    #[tokio::test]
    async fn failed_signing_releases_the_reservation() {
        use bitcoin::hashes::Hash;
        let output = UnspentOutput {
            txid: bitcoin::Txid::from_byte_array([9; 32]),
            vout: 0,
            script: ScriptBuf::from(vec![0x00, 0x14, 0x09]),
            value: 500_000_000,
            token_id: 0,
        };

        let dir = tempdir().unwrap();
        let store = Arc::new(TreasuryStore::new(dir.path()).unwrap());
        let ledger = Arc::new(UtxoLedger::new(
            Arc::new(StaticSource(vec![output.clone()])),
            ReservationRepository::new(store),
        ));

        let spendable = ledger.spendable("addr").await.unwrap();
        ledger
            .reserve("addr", &spendable, Duration::from_secs(600))
            .unwrap();
        assert!(ledger.spendable("addr").await.unwrap().is_empty());

        let assembled = crate::assembler::Assembler::new(crate::network::Network::Mainnet.params())
            .build_transfer(
                "addr",
                &spendable,
                ScriptBuf::from(vec![0x00, 0x14, 0xaa]),
                100_000_000,
                true,
            )
            .unwrap();

        let pool = Arc::new(NodePool::new(
            NodeRole::Treasury,
            NodeClient::new("http://127.0.0.1:18554", Duration::from_secs(1)).unwrap(),
            NodeClient::new("http://127.0.0.1:18556", Duration::from_secs(1)).unwrap(),
            Arc::new(NullSink),
        ));
        let broadcaster = Broadcaster::new(pool, Arc::new(FailingSigner), Arc::clone(&ledger));

        let result = broadcaster.sign_and_send(&assembled).await;
        assert!(matches!(result, Err(Error::Conflict(_))));

        // The round trip left no leaked reservation behind.
        assert_eq!(ledger.spendable("addr").await.unwrap(), vec![output]);
    }
}
