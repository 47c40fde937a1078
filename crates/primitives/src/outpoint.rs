//! Transaction outpoint type.
//!
//! Every input declares the value of the output it spends, so fees can be
//! computed from a transaction alone; validation checks the declared value
//! against the coin view.

use faid_consensus::money::Amount;
use faid_consensus::Hash256;

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct OutPoint {
    pub hash: Hash256,
    pub index: u32,
    pub value: Amount,
}

impl OutPoint {
    pub fn new(hash: Hash256, index: u32, value: Amount) -> Self {
        Self { hash, index, value }
    }

    /// Coinbase marker: no previous transaction, `index` holds the block height.
    pub fn coinbase_marker(height: u32, reward: Amount) -> Self {
        Self {
            hash: [0u8; 32],
            index: height,
            value: reward,
        }
    }

    pub fn is_null(&self) -> bool {
        self.hash == [0u8; 32]
    }
}

impl Encodable for OutPoint {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_hash_le(&self.hash);
        encoder.write_u32_le(self.index);
        encoder.write_i64_le(self.value);
    }
}

impl Decodable for OutPoint {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let hash = decoder.read_hash_le()?;
        let index = decoder.read_u32_le()?;
        let value = decoder.read_i64_le()?;
        Ok(Self { hash, index, value })
    }
}
