use bitcoin::{
    consensus::{deserialize_partial, serialize},
    opcodes::all::OP_RETURN,
    script::{Builder, PushBytesBuf},
    Script, ScriptBuf,
};

use crate::types::DfTx;

/// Wraps a payload into the OP_RETURN carrier script. The push builder picks
/// the pushdata prefix width for us; payloads above the 520-byte push limit
/// are rejected by the consensus rules, so they are rejected here too.
pub fn embed_dftx(dftx: &DfTx) -> Result<ScriptBuf, bitcoin::script::PushBytesError> {
    let bytes = serialize(dftx);
    let data = PushBytesBuf::try_from(bytes)?;
    Ok(Builder::new()
        .push_opcode(OP_RETURN)
        .push_slice(data)
        .into_script())
}

/// Extracts the payload from an OP_RETURN carrier script, skipping the
/// 1/2/4-byte pushdata prefixes. Returns `None` for scripts that do not carry
/// a decodable payload.
pub fn extract_dftx(script: &Script) -> Option<DfTx> {
    let bytes = script.as_bytes();
    if bytes.len() <= 2 || bytes[0] != 0x6a || bytes[1] > 0x4e {
        return None;
    }
    let offset = 1 + match bytes[1] {
        0x4c => 2,
        0x4d => 3,
        0x4e => 5,
        _ => 1,
    };
    if bytes.len() <= offset {
        return None;
    }

    deserialize_partial::<DfTx>(&bytes[offset..])
        .map(|(dftx, _)| dftx)
        .ok()
}

#[cfg(test)]
mod tests {
    use bitcoin::{hashes::Hash, PubkeyHash, ScriptBuf, Txid};

    use super::*;
    use crate::types::{
        balance::{ScriptBalances, TokenBalanceUInt32},
        common::Maybe,
        masternode::CreateMasternode,
        account::AccountToAccount,
    };

    #[test]
    fn embed_extract_round_trips_short_payload() {
        let dftx = DfTx::CreateMasternode(CreateMasternode {
            operator_type: 1,
            operator_pub_key_hash: PubkeyHash::from_byte_array([1u8; 20]),
            timelock: Maybe(None),
        });
        let script = embed_dftx(&dftx).unwrap();
        assert!(script.is_op_return());
        assert_eq!(extract_dftx(&script), Some(dftx));
    }

    #[test]
    fn embed_extract_round_trips_pushdata1_payload() {
        // Four balance entries push the payload past the 75-byte direct-push
        // limit, forcing an OP_PUSHDATA1 prefix.
        let to = (0..4)
            .map(|i| ScriptBalances {
                script: ScriptBuf::from(vec![0x76, 0xa9, 0x14, i]),
                balances: vec![TokenBalanceUInt32 {
                    token: 0,
                    amount: 100_000_000 * i64::from(i),
                }]
                .into(),
            })
            .collect::<Vec<_>>();
        let dftx = DfTx::AccountToAccount(AccountToAccount {
            from: ScriptBuf::from(vec![0x76, 0xa9, 0x14, 0xff]),
            to: to.into(),
        });

        let script = embed_dftx(&dftx).unwrap();
        assert_eq!(script.as_bytes()[1], 0x4c);
        assert_eq!(extract_dftx(&script), Some(dftx));
    }

    #[test]
    fn non_carrier_scripts_yield_none() {
        assert_eq!(extract_dftx(&ScriptBuf::new()), None);

        let p2pkh = ScriptBuf::from(vec![0x76, 0xa9, 0x14, 0x00]);
        assert_eq!(extract_dftx(&p2pkh), None);

        // OP_RETURN carrying arbitrary non-payload bytes.
        let trx = DfTx::ResignMasternode(crate::types::masternode::ResignMasternode {
            node_id: Txid::from_byte_array([2u8; 32]),
        });
        let mut raw = embed_dftx(&trx).unwrap().to_bytes();
        raw[2] = b'X'; // corrupt the marker
        assert_eq!(extract_dftx(Script::from_bytes(&raw)), None);
    }
}
