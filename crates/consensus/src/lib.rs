//! Consensus constants, monetary units, chain parameters, and subsidy schedule.

pub mod constants;
pub mod money;
pub mod params;
pub mod rewards;

pub use money::{Amount, FeeRate};
pub use params::{chain_params, consensus_params, ChainParams, ConsensusParams, Network};
pub use rewards::{block_subsidy, block_value};

/// A 256-bit hash stored in little-endian (internal) byte order.
pub type Hash256 = [u8; 32];
