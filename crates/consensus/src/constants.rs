//! Consensus-wide and block-assembly constants.

use crate::money::{Amount, FeeRate, COIN};

/// The maximum allowed size for a serialized block, in bytes (network rule).
pub const MAX_BLOCK_SIZE: u32 = 1_000_000;
/// The maximum allowed number of signature check operations in a block (network rule).
pub const MAX_BLOCK_SIGOPS: u32 = MAX_BLOCK_SIZE / 50;
/// Coinbase transaction outputs can only be spent after this number of new blocks.
pub const COINBASE_MATURITY: u32 = 100;
/// Output lock times below this value are heights, at or above it unix times.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;
/// Serialized byte size used when pricing the dust floor.
pub const DUST_THRESHOLD: usize = 546;

/// Default for `-blockmaxsize`, the largest candidate the miner assembles.
pub const DEFAULT_BLOCK_MAX_SIZE: u32 = 750_000;
/// Default for `-blockprioritysize`, bytes reserved for high-priority transactions.
pub const DEFAULT_BLOCK_PRIORITY_SIZE: u32 = 50_000;
/// Default for `-blockminsize`, bytes filled with free transactions.
pub const DEFAULT_BLOCK_MIN_SIZE: u32 = 0;
/// Bytes reserved in every candidate for the header and coinbase.
pub const BLOCK_RESERVED_SIZE: u32 = 1_000;
/// Signature operations reserved in every candidate for the coinbase.
pub const BLOCK_RESERVED_SIGOPS: u32 = 100;
/// Smallest transaction worth scanning for once the candidate is nearly full.
pub const MIN_VIABLE_TX_SIZE: u32 = 200;
/// Extra bytes added to the coinbase size when estimating its relay fee.
pub const COINBASE_FEE_SIZE_PADDING: usize = 10;

/// Fee rate paid by transactions this node creates, including the coinbase.
pub const DEFAULT_TRANSACTION_FEE: FeeRate = FeeRate::new(10);
/// Fee rate below which transactions are considered free for relay and mining.
pub const DEFAULT_MIN_RELAY_TX_FEE: FeeRate = FeeRate::new(1);

/// Priority at or above which a transaction may be mined without fee.
pub fn allow_free_threshold() -> f64 {
    (COIN as f64) * 144.0 / 250.0
}

pub fn allow_free(priority: f64) -> bool {
    priority > allow_free_threshold()
}

/// Value at or below which an output is considered dust.
pub fn dust_threshold(min_relay_fee: FeeRate) -> Amount {
    min_relay_fee.fee(DUST_THRESHOLD)
}
