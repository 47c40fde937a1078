//! Coinbase construction and reward arithmetic.

use faid_consensus::constants::{
    dust_threshold, COINBASE_FEE_SIZE_PADDING, COINBASE_MATURITY,
};
use faid_consensus::{block_value, Amount, ChainParams};
use faid_primitives::outpoint::OutPoint;
use faid_primitives::transaction::{Transaction, TxIn, TxOut, CURRENT_VERSION};

use crate::error::MinerError;

/// Breakdown of the coinbase value for one candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoinbaseReward {
    /// Subsidy plus collected fees plus the previous coinbase fee.
    pub input: Amount,
    /// Relay fee the coinbase pays for its own size.
    pub relay_fee: Amount,
    pub output: Amount,
}

/// Coinbase paying `script_pubkey`, its input carrying the height marker.
///
/// The output locks until `height + COINBASE_MATURITY`.
pub fn coinbase_template(height: u32, script_pubkey: &[u8]) -> Transaction {
    Transaction {
        version: CURRENT_VERSION,
        vin: vec![TxIn::new(OutPoint::coinbase_marker(height, 0), vec![0x00])],
        vout: vec![TxOut {
            value: 0,
            script_pubkey: script_pubkey.to_vec(),
            content: Vec::new(),
            lock_time: height.saturating_add(COINBASE_MATURITY),
        }],
    }
}

/// Fills in the reward of `coinbase` and returns the breakdown.
///
/// With `check_dust`, an output at or below the dust threshold fails the
/// build and `coinbase` is left untouched.
pub fn finalize_coinbase(
    coinbase: &mut Transaction,
    height: u32,
    fees: Amount,
    prev_coinbase_fee: Amount,
    params: &ChainParams,
    check_dust: bool,
) -> Result<CoinbaseReward, MinerError> {
    let input = block_value(height, fees, &params.consensus) + prev_coinbase_fee;
    let relay_fee = params
        .default_tx_fee
        .fee(coinbase.serialized_size() + COINBASE_FEE_SIZE_PADDING);
    let output = input - relay_fee;

    if check_dust {
        let threshold = dust_threshold(params.min_relay_tx_fee);
        if output <= threshold {
            return Err(MinerError::DustCoinbase { output, threshold });
        }
    }

    coinbase.vin[0].prevout.value = input;
    coinbase.vout[0].value = output;
    Ok(CoinbaseReward {
        input,
        relay_fee,
        output,
    })
}
