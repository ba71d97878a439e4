use bitcoin::{
    consensus::{Decodable, Encodable},
    hashes::Hash,
    PubkeyHash, Txid,
};
use harbour_macros::ConsensusEncoding;
use std::io;

use super::common::Maybe;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateMasternode {
    pub operator_type: u8,
    pub operator_pub_key_hash: PubkeyHash,
    pub timelock: Maybe<u16>,
}

// Hand-rolled: the key hash goes on the wire as its raw 20 bytes, which the
// generic field encoding cannot express.
impl Encodable for CreateMasternode {
    fn consensus_encode<W: io::Write + ?Sized>(&self, writer: &mut W) -> Result<usize, io::Error> {
        let mut len = self.operator_type.consensus_encode(writer)?;
        len += writer.write(&self.operator_pub_key_hash.to_byte_array())?;
        len += self.timelock.consensus_encode(writer)?;
        Ok(len)
    }
}

impl Decodable for CreateMasternode {
    fn consensus_decode<R: io::Read + ?Sized>(
        reader: &mut R,
    ) -> Result<Self, bitcoin::consensus::encode::Error> {
        let operator_type = u8::consensus_decode(reader)?;
        let mut hash = [0u8; 20];
        reader.read_exact(&mut hash)?;
        let timelock = Maybe::consensus_decode(reader)?;
        Ok(CreateMasternode {
            operator_type,
            operator_pub_key_hash: PubkeyHash::from_byte_array(hash),
            timelock,
        })
    }
}

#[derive(ConsensusEncoding, Debug, Clone, PartialEq, Eq)]
pub struct ResignMasternode {
    pub node_id: Txid,
}
