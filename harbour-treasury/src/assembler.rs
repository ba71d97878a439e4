use bitcoin::{
    absolute::LockTime, consensus::encode::serialize_hex, transaction::Version, Amount, OutPoint,
    ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness,
};
use harbour_dftx::{embed_dftx, DfTx};
use log::debug;

use crate::{
    model::{AssembledTransaction, UnspentOutput},
    network::ChainParams,
    Error, Result,
};

/// Chain transaction version carrying the account-extension payloads.
const TX_VERSION: i32 = 4;

/// Witness placeholder sizes used for fee measurement before the external
/// signer is involved. Signature size varies by one or two bytes; the
/// per-byte rate makes that difference irrelevant.
const PLACEHOLDER_SIG_LEN: usize = 72;
const PLACEHOLDER_KEY_LEN: usize = 33;

/// Builds complete unsigned transactions. Pure per call: all chain state
/// comes in as arguments, nothing is cached.
///
/// The skeleton is built first with placeholder witnesses, measured, and only
/// then mutated: the fee comes out of the LAST output's value rather than
/// being added as an extra output.
pub struct Assembler {
    params: ChainParams,
}

impl Assembler {
    pub fn new(params: ChainParams) -> Self {
        Self { params }
    }

    /// Plain value transfer. With `with_change` the primary output carries
    /// exactly `amount` and the remainder returns to the funding script;
    /// without it the caller has selected exact funding and the primary
    /// output absorbs everything.
    pub fn build_transfer(
        &self,
        address: &str,
        funding: &[UnspentOutput],
        to: ScriptBuf,
        amount: i64,
        with_change: bool,
    ) -> Result<AssembledTransaction> {
        let funding_script = self.funding_script(address, funding)?;
        let total: i64 = funding.iter().map(|o| o.value).sum();
        if total < amount {
            return Err(Error::InsufficientFunds {
                address: address.to_string(),
                needed: amount,
                available: total,
            });
        }

        let mut outputs = vec![(to, if with_change { amount } else { total })];
        if with_change {
            outputs.push((funding_script.clone(), total - amount));
        }

        self.assemble(address, funding_script, funding, outputs, 0)
    }

    /// Operation transaction: OP_RETURN carrier output first (optionally
    /// burning a protocol fee), then an optional input-funded primary output,
    /// then outputs minted from account balance (not backed by inputs; the
    /// account extension covers them), then change back to the funding
    /// script.
    pub fn build_operation(
        &self,
        address: &str,
        funding: &[UnspentOutput],
        dftx: &DfTx,
        carrier_value: i64,
        primary: Option<(ScriptBuf, i64)>,
        minted: Option<(ScriptBuf, i64)>,
    ) -> Result<AssembledTransaction> {
        let funding_script = self.funding_script(address, funding)?;
        let carrier = embed_dftx(dftx)
            .map_err(|e| Error::Conflict(format!("payload exceeds push limit: {e}")))?;

        let total: i64 = funding.iter().map(|o| o.value).sum();
        let committed = carrier_value + primary.as_ref().map_or(0, |(_, v)| *v);
        if total < committed {
            return Err(Error::InsufficientFunds {
                address: address.to_string(),
                needed: committed,
                available: total,
            });
        }

        let mut outputs = vec![(carrier, carrier_value)];
        if let Some((script, value)) = primary {
            outputs.push((script, value));
        }
        if let Some((script, value)) = minted {
            outputs.push((script, value));
        }
        outputs.push((funding_script.clone(), total - committed));

        self.assemble(address, funding_script, funding, outputs, 0)
    }

    fn funding_script(&self, address: &str, funding: &[UnspentOutput]) -> Result<ScriptBuf> {
        funding
            .first()
            .map(|o| o.script.clone())
            .ok_or_else(|| Error::InsufficientFunds {
                address: address.to_string(),
                needed: 0,
                available: 0,
            })
    }

    fn assemble(
        &self,
        address: &str,
        funding_script: ScriptBuf,
        funding: &[UnspentOutput],
        outputs: Vec<(ScriptBuf, i64)>,
        extra_fee: i64,
    ) -> Result<AssembledTransaction> {
        let placeholder = Witness::from_slice(&[
            vec![0u8; PLACEHOLDER_SIG_LEN],
            vec![0u8; PLACEHOLDER_KEY_LEN],
        ]);

        let mut tx = Transaction {
            version: Version(TX_VERSION),
            lock_time: LockTime::ZERO,
            input: funding
                .iter()
                .map(|o| TxIn {
                    previous_output: OutPoint {
                        txid: o.txid,
                        vout: o.vout,
                    },
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::MAX,
                    witness: placeholder.clone(),
                })
                .collect(),
            output: outputs
                .iter()
                .map(|(script, value)| {
                    Ok(TxOut {
                        value: Amount::from_sat(u64::try_from(*value).map_err(|_| {
                            Error::Conflict(format!("negative output value: {value}"))
                        })?),
                        script_pubkey: script.clone(),
                    })
                })
                .collect::<Result<Vec<_>>>()?,
        };

        self.deduct_fee(address, &mut tx, extra_fee)?;

        debug!(
            "[Assembler] built tx {} with {} inputs, {} outputs",
            tx.txid(),
            tx.input.len(),
            tx.output.len()
        );

        Ok(AssembledTransaction {
            txid: tx.txid(),
            hex: serialize_hex(&tx),
            funding_script,
            address: address.to_string(),
            consumed: funding.iter().map(UnspentOutput::output_ref).collect(),
        })
    }

    /// Measures the skeleton and subtracts the network fee (plus any fixed
    /// protocol fee) from the last output. An output that cannot absorb the
    /// fee and stay above the protocol minimum fails here instead of leaving
    /// as a sub-minimum or negative output.
    fn deduct_fee(&self, address: &str, tx: &mut Transaction, extra_fee: i64) -> Result<()> {
        let size = bitcoin::consensus::serialize(tx).len() as i64;
        let fee = size * self.params.fee_per_byte + extra_fee;

        let last = tx
            .output
            .last_mut()
            .ok_or_else(|| Error::Conflict("transaction with no outputs".to_string()))?;
        let current = last.value.to_sat() as i64;
        let remaining = current - fee;

        let floor = if last.script_pubkey.is_op_return() {
            0
        } else {
            self.params.min_output_value
        };
        if remaining < floor {
            return Err(Error::InsufficientFunds {
                address: address.to_string(),
                needed: fee + floor,
                available: current,
            });
        }

        last.value = Amount::from_sat(remaining as u64);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::{consensus::deserialize, hashes::Hash, Txid};
    use harbour_dftx::{
        extract_dftx,
        types::{common::Maybe, masternode::CreateMasternode},
        COIN,
    };

    use super::*;
    use crate::network::Network;

    fn utxo(tag: u8, value: i64) -> UnspentOutput {
        UnspentOutput {
            txid: Txid::from_byte_array([tag; 32]),
            vout: 0,
            script: ScriptBuf::from(vec![0x00, 0x14, tag]),
            value,
            token_id: 0,
        }
    }

    fn assembler() -> Assembler {
        Assembler::new(Network::Mainnet.params())
    }

    fn decode(assembled: &AssembledTransaction) -> Transaction {
        deserialize(&hex::decode(&assembled.hex).unwrap()).unwrap()
    }

    #[test]
    fn transfer_fee_comes_out_of_the_change_output() {
        let funding = vec![utxo(1, 5 * COIN)];
        let assembled = assembler()
            .build_transfer(
                "addr",
                &funding,
                ScriptBuf::from(vec![0x00, 0x14, 0xaa]),
                2 * COIN,
                true,
            )
            .unwrap();

        let tx = decode(&assembled);
        assert_eq!(tx.output.len(), 2);
        assert_eq!(tx.output[0].value.to_sat() as i64, 2 * COIN);

        let size = bitcoin::consensus::serialize(&tx).len() as i64;
        assert_eq!(tx.output[1].value.to_sat() as i64, 3 * COIN - size);
        assert_eq!(assembled.consumed, vec![funding[0].output_ref()]);
    }

    #[test]
    fn transfer_without_change_absorbs_everything_minus_fee() {
        let funding = vec![utxo(1, COIN), utxo(2, COIN)];
        let assembled = assembler()
            .build_transfer(
                "addr",
                &funding,
                ScriptBuf::from(vec![0x00, 0x14, 0xaa]),
                2 * COIN,
                false,
            )
            .unwrap();

        let tx = decode(&assembled);
        assert_eq!(tx.input.len(), 2);
        assert_eq!(tx.output.len(), 1);
        let size = bitcoin::consensus::serialize(&tx).len() as i64;
        assert_eq!(tx.output[0].value.to_sat() as i64, 2 * COIN - size);
    }

    #[test]
    fn underfunded_last_output_fails_instead_of_going_negative() {
        let funding = vec![utxo(1, COIN + 500)];
        // Change output would hold 500 sat, below the fee + minimum.
        let result = assembler().build_transfer(
            "addr",
            &funding,
            ScriptBuf::from(vec![0x00, 0x14, 0xaa]),
            COIN,
            true,
        );
        assert!(matches!(result, Err(Error::InsufficientFunds { .. })));
    }

    #[test]
    fn operation_carries_payload_and_burn_in_the_first_output() {
        let params = Network::Mainnet.params();
        let funding = vec![utxo(1, 20_011 * COIN)];
        let owner = ScriptBuf::from(vec![0x00, 0x14, 0xbb]);
        let dftx = DfTx::CreateMasternode(CreateMasternode {
            operator_type: 1,
            operator_pub_key_hash: bitcoin::PubkeyHash::from_byte_array([5u8; 20]),
            timelock: Maybe(None),
        });

        let assembled = assembler()
            .build_operation(
                "addr",
                &funding,
                &dftx,
                params.masternode_creation_fee,
                Some((owner.clone(), params.masternode_collateral)),
                None,
            )
            .unwrap();

        let tx = decode(&assembled);
        assert_eq!(tx.output.len(), 3);
        assert!(tx.output[0].script_pubkey.is_op_return());
        assert_eq!(extract_dftx(&tx.output[0].script_pubkey), Some(dftx));
        assert_eq!(
            tx.output[0].value.to_sat() as i64,
            params.masternode_creation_fee
        );
        assert_eq!(
            tx.output[1].value.to_sat() as i64,
            params.masternode_collateral
        );
        assert_eq!(tx.output[1].script_pubkey, owner);

        // Change: total - burn - collateral - fee.
        let size = bitcoin::consensus::serialize(&tx).len() as i64;
        assert_eq!(tx.output[2].value.to_sat() as i64, COIN - size);
    }

    #[test]
    fn every_input_gets_a_witness_slot() {
        let funding = vec![utxo(1, COIN), utxo(2, COIN), utxo(3, COIN)];
        let assembled = assembler()
            .build_transfer(
                "addr",
                &funding,
                ScriptBuf::from(vec![0x00, 0x14, 0xaa]),
                COIN,
                true,
            )
            .unwrap();
        let tx = decode(&assembled);
        assert_eq!(tx.input.len(), 3);
        assert!(tx.input.iter().all(|i| i.witness.len() == 2));
    }
}
