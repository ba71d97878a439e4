pub mod account;
pub mod balance;
pub mod common;
pub mod loans;
pub mod masternode;
pub mod pool;
pub mod vault;

use bitcoin::consensus::{Decodable, Encodable};
use std::io;

use self::{account::*, loans::*, masternode::*, pool::*, vault::*};

/// Closed set of operation payloads this platform issues or inspects.
/// Classification of a decoded transaction is a match on this enum, never on
/// type-name strings. Foreign payload tags decode to `Other` and are carried
/// as non-actionable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DfTx {
    AccountToAccount(AccountToAccount),
    AccountToUtxos(AccountToUtxos),
    CompositeSwap(CompositeSwap),
    CreateMasternode(CreateMasternode),
    CreateVault(CreateVault),
    DepositToVault(DepositToVault),
    PaybackLoan(PaybackLoan),
    PoolAddLiquidity(PoolAddLiquidity),
    PoolRemoveLiquidity(PoolRemoveLiquidity),
    PoolSwap(PoolSwap),
    ResignMasternode(ResignMasternode),
    TakeLoan(TakeLoan),
    UtxosToAccount(UtxosToAccount),
    WithdrawFromVault(WithdrawFromVault),
    Other(u8),
}

impl DfTx {
    fn to_u8(&self) -> u8 {
        match self {
            DfTx::AccountToAccount(_) => b'B',
            DfTx::AccountToUtxos(_) => b'b',
            DfTx::CompositeSwap(_) => b'i',
            DfTx::CreateMasternode(_) => b'C',
            DfTx::CreateVault(_) => b'V',
            DfTx::DepositToVault(_) => b'S',
            DfTx::PaybackLoan(_) => b'H',
            DfTx::PoolAddLiquidity(_) => b'l',
            DfTx::PoolRemoveLiquidity(_) => b'r',
            DfTx::PoolSwap(_) => b's',
            DfTx::ResignMasternode(_) => b'R',
            DfTx::TakeLoan(_) => b'X',
            DfTx::UtxosToAccount(_) => b'U',
            DfTx::WithdrawFromVault(_) => b'J',
            DfTx::Other(tag) => *tag,
        }
    }
}

pub const DFTX_MARKER: [u8; 4] = *b"DfTx";

impl Decodable for DfTx {
    fn consensus_decode<R: io::Read + ?Sized>(
        r: &mut R,
    ) -> Result<Self, bitcoin::consensus::encode::Error> {
        let signature = <[u8; 4]>::consensus_decode(r)?;
        if signature != DFTX_MARKER {
            return Err(bitcoin::consensus::encode::Error::ParseFailed(
                "Invalid marker",
            ));
        }

        let r#type = u8::consensus_decode(r)?;
        let message = match r#type {
            b'B' => DfTx::AccountToAccount(AccountToAccount::consensus_decode(r)?),
            b'b' => DfTx::AccountToUtxos(AccountToUtxos::consensus_decode(r)?),
            b'i' => DfTx::CompositeSwap(CompositeSwap::consensus_decode(r)?),
            b'C' => DfTx::CreateMasternode(CreateMasternode::consensus_decode(r)?),
            b'V' => DfTx::CreateVault(CreateVault::consensus_decode(r)?),
            b'S' => DfTx::DepositToVault(DepositToVault::consensus_decode(r)?),
            b'H' => DfTx::PaybackLoan(PaybackLoan::consensus_decode(r)?),
            b'l' => DfTx::PoolAddLiquidity(PoolAddLiquidity::consensus_decode(r)?),
            b'r' => DfTx::PoolRemoveLiquidity(PoolRemoveLiquidity::consensus_decode(r)?),
            b's' => DfTx::PoolSwap(PoolSwap::consensus_decode(r)?),
            b'R' => DfTx::ResignMasternode(ResignMasternode::consensus_decode(r)?),
            b'X' => DfTx::TakeLoan(TakeLoan::consensus_decode(r)?),
            b'U' => DfTx::UtxosToAccount(UtxosToAccount::consensus_decode(r)?),
            b'J' => DfTx::WithdrawFromVault(WithdrawFromVault::consensus_decode(r)?),
            tag => DfTx::Other(tag),
        };

        Ok(message)
    }
}

impl Encodable for DfTx {
    fn consensus_encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        let mut len = DFTX_MARKER.consensus_encode(w)?;

        let r#type = self.to_u8();
        len += r#type.consensus_encode(w)?;
        len += match self {
            DfTx::AccountToAccount(data) => data.consensus_encode(w),
            DfTx::AccountToUtxos(data) => data.consensus_encode(w),
            DfTx::CompositeSwap(data) => data.consensus_encode(w),
            DfTx::CreateMasternode(data) => data.consensus_encode(w),
            DfTx::CreateVault(data) => data.consensus_encode(w),
            DfTx::DepositToVault(data) => data.consensus_encode(w),
            DfTx::PaybackLoan(data) => data.consensus_encode(w),
            DfTx::PoolAddLiquidity(data) => data.consensus_encode(w),
            DfTx::PoolRemoveLiquidity(data) => data.consensus_encode(w),
            DfTx::PoolSwap(data) => data.consensus_encode(w),
            DfTx::ResignMasternode(data) => data.consensus_encode(w),
            DfTx::TakeLoan(data) => data.consensus_encode(w),
            DfTx::UtxosToAccount(data) => data.consensus_encode(w),
            DfTx::WithdrawFromVault(data) => data.consensus_encode(w),
            DfTx::Other(_) => Ok(0),
        }?;
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::{
        consensus::{deserialize, serialize},
        hashes::Hash,
        PubkeyHash, ScriptBuf, Txid,
    };

    use super::{common::Maybe, *};

    #[test]
    fn create_masternode_round_trips() {
        let payload = DfTx::CreateMasternode(CreateMasternode {
            operator_type: 1,
            operator_pub_key_hash: PubkeyHash::from_byte_array([7u8; 20]),
            timelock: Maybe(Some(520)),
        });
        let bytes = serialize(&payload);
        assert_eq!(&bytes[..4], b"DfTx");
        assert_eq!(bytes[4], b'C');
        assert_eq!(deserialize::<DfTx>(&bytes).unwrap(), payload);
    }

    #[test]
    fn create_masternode_without_timelock_round_trips() {
        let payload = DfTx::CreateMasternode(CreateMasternode {
            operator_type: 1,
            operator_pub_key_hash: PubkeyHash::from_byte_array([9u8; 20]),
            timelock: Maybe(None),
        });
        let bytes = serialize(&payload);
        assert_eq!(deserialize::<DfTx>(&bytes).unwrap(), payload);
    }

    #[test]
    fn resign_masternode_round_trips() {
        let payload = DfTx::ResignMasternode(ResignMasternode {
            node_id: Txid::from_byte_array([3u8; 32]),
        });
        let bytes = serialize(&payload);
        assert_eq!(bytes[4], b'R');
        assert_eq!(deserialize::<DfTx>(&bytes).unwrap(), payload);
    }

    #[test]
    fn account_to_utxos_round_trips() {
        let payload = DfTx::AccountToUtxos(AccountToUtxos {
            from: ScriptBuf::from(vec![0x76, 0xa9]),
            balances: vec![balance::TokenBalanceUInt32 {
                token: 0,
                amount: 12_500_000_000,
            }]
            .into(),
            minting_outputs_start: common::VarInt(1),
        });
        let bytes = serialize(&payload);
        assert_eq!(deserialize::<DfTx>(&bytes).unwrap(), payload);
    }

    #[test]
    fn unknown_tag_decodes_to_other() {
        let mut bytes = DFTX_MARKER.to_vec();
        bytes.push(b'Z');
        assert_eq!(deserialize::<DfTx>(&bytes).unwrap(), DfTx::Other(b'Z'));
    }

    #[test]
    fn bad_marker_is_rejected() {
        let bytes = b"Nope\x43".to_vec();
        assert!(deserialize::<DfTx>(&bytes).is_err());
    }
}
