//! Transaction types and serialization.
//!
//! Wire layout: `version:i32 | vin | vout`. Each input carries the value of
//! the output it spends and each output carries its own maturity lock, so a
//! transaction has no transaction-level lock time.

use faid_consensus::constants::LOCKTIME_THRESHOLD;
use faid_consensus::money::{money_range, Amount};
use faid_consensus::Hash256;

use crate::encoding::{varint_len, Decodable, DecodeError, Decoder, Encodable, Encoder};
use crate::hash::sha256d;
use crate::outpoint::OutPoint;

pub const CURRENT_VERSION: i32 = 1;

/// Fixed bytes per input besides the script: outpoint (32 + 4 + 8) + sequence.
const TXIN_FIXED_SIZE: usize = 48;
/// Fixed bytes per output besides the scripts: value + lock time.
const TXOUT_FIXED_SIZE: usize = 12;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

impl TxIn {
    pub fn new(prevout: OutPoint, script_sig: Vec<u8>) -> Self {
        Self {
            prevout,
            script_sig,
            sequence: u32::MAX,
        }
    }

    fn serialized_size(&self) -> usize {
        TXIN_FIXED_SIZE + varint_len(self.script_sig.len() as u64) + self.script_sig.len()
    }
}

impl Encodable for TxIn {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        self.prevout.consensus_encode(encoder);
        encoder.write_var_bytes(&self.script_sig);
        encoder.write_u32_le(self.sequence);
    }
}

impl Decodable for TxIn {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let prevout = OutPoint::consensus_decode(decoder)?;
        let script_sig = decoder.read_var_bytes()?;
        let sequence = decoder.read_u32_le()?;
        Ok(Self {
            prevout,
            script_sig,
            sequence,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxOut {
    pub value: Amount,
    pub script_pubkey: Vec<u8>,
    pub content: Vec<u8>,
    pub lock_time: u32,
}

impl TxOut {
    pub fn new(value: Amount, script_pubkey: Vec<u8>) -> Self {
        Self {
            value,
            script_pubkey,
            content: Vec::new(),
            lock_time: 0,
        }
    }

    /// True when `lock_time` is a unix timestamp rather than a height.
    pub fn lock_is_time(&self) -> bool {
        self.lock_time >= LOCKTIME_THRESHOLD
    }

    fn serialized_size(&self) -> usize {
        TXOUT_FIXED_SIZE
            + varint_len(self.script_pubkey.len() as u64)
            + self.script_pubkey.len()
            + varint_len(self.content.len() as u64)
            + self.content.len()
    }
}

impl Encodable for TxOut {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_i64_le(self.value);
        encoder.write_var_bytes(&self.script_pubkey);
        encoder.write_var_bytes(&self.content);
        encoder.write_u32_le(self.lock_time);
    }
}

impl Decodable for TxOut {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let value = decoder.read_i64_le()?;
        let script_pubkey = decoder.read_var_bytes()?;
        let content = decoder.read_var_bytes()?;
        let lock_time = decoder.read_u32_le()?;
        Ok(Self {
            value,
            script_pubkey,
            content,
            lock_time,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueRangeError {
    InputOutOfRange { index: usize, value: Amount },
    OutputOutOfRange { index: usize, value: Amount },
    TotalOutOfRange,
}

impl std::fmt::Display for ValueRangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueRangeError::InputOutOfRange { index, value } => {
                write!(f, "input {index} value {value} out of range")
            }
            ValueRangeError::OutputOutOfRange { index, value } => {
                write!(f, "output {index} value {value} out of range")
            }
            ValueRangeError::TotalOutOfRange => write!(f, "value total out of range"),
        }
    }
}

impl std::error::Error for ValueRangeError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
}

impl Default for Transaction {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            vin: Vec::new(),
            vout: Vec::new(),
        }
    }
}

impl Transaction {
    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].prevout.is_null()
    }

    pub fn consensus_encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::with_capacity(self.serialized_size());
        self.consensus_encode_into(&mut encoder);
        encoder.into_inner()
    }

    pub(crate) fn consensus_encode_into(&self, encoder: &mut Encoder) {
        encoder.write_i32_le(self.version);
        encoder.write_varint(self.vin.len() as u64);
        for input in &self.vin {
            input.consensus_encode(encoder);
        }
        encoder.write_varint(self.vout.len() as u64);
        for output in &self.vout {
            output.consensus_encode(encoder);
        }
    }

    pub fn consensus_decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let tx = Self::decode_from(&mut decoder)?;
        if !decoder.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(tx)
    }

    pub(crate) fn decode_from(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let version = decoder.read_i32_le()?;
        let vin_count = decoder.read_varint()? as usize;
        let mut vin = Vec::with_capacity(vin_count.min(decoder.remaining() / TXIN_FIXED_SIZE));
        for _ in 0..vin_count {
            vin.push(TxIn::consensus_decode(decoder)?);
        }
        let vout_count = decoder.read_varint()? as usize;
        let mut vout =
            Vec::with_capacity(vout_count.min(decoder.remaining() / TXOUT_FIXED_SIZE));
        for _ in 0..vout_count {
            vout.push(TxOut::consensus_decode(decoder)?);
        }
        Ok(Self { version, vin, vout })
    }

    /// Encoded length in bytes, computed without encoding.
    pub fn serialized_size(&self) -> usize {
        4 + varint_len(self.vin.len() as u64)
            + self.vin.iter().map(TxIn::serialized_size).sum::<usize>()
            + varint_len(self.vout.len() as u64)
            + self.vout.iter().map(TxOut::serialized_size).sum::<usize>()
    }

    pub fn txid(&self) -> Hash256 {
        sha256d(&self.consensus_encode())
    }

    pub fn value_in(&self) -> Result<Amount, ValueRangeError> {
        let mut total: Amount = 0;
        for (index, input) in self.vin.iter().enumerate() {
            let value = input.prevout.value;
            if !money_range(value) {
                return Err(ValueRangeError::InputOutOfRange { index, value });
            }
            total += value;
            if !money_range(total) {
                return Err(ValueRangeError::TotalOutOfRange);
            }
        }
        Ok(total)
    }

    pub fn value_out(&self) -> Result<Amount, ValueRangeError> {
        let mut total: Amount = 0;
        for (index, output) in self.vout.iter().enumerate() {
            let value = output.value;
            if !money_range(value) {
                return Err(ValueRangeError::OutputOutOfRange { index, value });
            }
            total += value;
            if !money_range(total) {
                return Err(ValueRangeError::TotalOutOfRange);
            }
        }
        Ok(total)
    }

    /// `value_in - value_out`. For a coinbase this is the relay fee it paid.
    pub fn fee(&self) -> Result<Amount, ValueRangeError> {
        Ok(self.value_in()? - self.value_out()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transaction {
        Transaction {
            version: CURRENT_VERSION,
            vin: vec![TxIn::new(OutPoint::new([7u8; 32], 1, 5_000), vec![0x51; 3])],
            vout: vec![
                TxOut::new(3_000, vec![0x76, 0xa9]),
                TxOut {
                    value: 1_500,
                    script_pubkey: vec![0xac; 300],
                    content: b"memo".to_vec(),
                    lock_time: 120,
                },
            ],
        }
    }

    #[test]
    fn size_matches_encoding() {
        let tx = sample();
        assert_eq!(tx.serialized_size(), tx.consensus_encode().len());
    }

    #[test]
    fn fee_is_input_minus_output() {
        assert_eq!(sample().fee(), Ok(500));
    }

    #[test]
    fn negative_output_rejected() {
        let mut tx = sample();
        tx.vout[1].value = -1;
        assert_eq!(
            tx.value_out(),
            Err(ValueRangeError::OutputOutOfRange { index: 1, value: -1 })
        );
    }

    #[test]
    fn coinbase_marker_detected() {
        let tx = Transaction {
            vin: vec![TxIn::new(OutPoint::coinbase_marker(12, 50), Vec::new())],
            ..Transaction::default()
        };
        assert!(tx.is_coinbase());
        assert!(!sample().is_coinbase());
    }
}
