//! Consensus and chain parameter definitions.

use crate::money::{Amount, FeeRate, COIN};
use crate::constants::{DEFAULT_MIN_RELAY_TX_FEE, DEFAULT_TRANSACTION_FEE};
use crate::Hash256;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    pub fn as_str(self) -> &'static str {
        match self {
            Network::Mainnet => "main",
            Network::Testnet => "test",
            Network::Regtest => "regtest",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConsensusParams {
    pub network: Network,
    pub genesis_time: u32,
    pub genesis_bits: u32,
    pub genesis_nonce: u64,
    pub pow_limit: Hash256,
    pub initial_subsidy: Amount,
    pub subsidy_halving_interval: u32,
    pub pow_target_spacing: i64,
    pub pow_target_timespan: i64,
    /// Testnet-style rule: a block more than two spacings late may use the pow limit.
    pub pow_allow_min_difficulty_blocks: bool,
    pub pow_no_retargeting: bool,
}

impl ConsensusParams {
    pub fn difficulty_adjustment_interval(&self) -> i64 {
        if self.pow_target_spacing <= 0 {
            return 1;
        }
        (self.pow_target_timespan / self.pow_target_spacing).max(1)
    }
}

#[derive(Clone, Debug)]
pub struct ChainParams {
    pub network: Network,
    pub consensus: ConsensusParams,
    pub message_start: [u8; 4],
    pub default_port: u16,
    /// Mining waits for at least one connected peer before building candidates.
    pub mining_requires_peers: bool,
    /// Blocks are produced on request (regtest); a miner stops after one solution.
    pub mine_blocks_on_demand: bool,
    /// Miner threads used when none are configured; 0 means hardware concurrency.
    pub default_miner_threads: usize,
    pub default_tx_fee: FeeRate,
    pub min_relay_tx_fee: FeeRate,
}

#[derive(Debug)]
pub enum HexError {
    InvalidLength,
    InvalidHex,
}

impl std::fmt::Display for HexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HexError::InvalidLength => write!(f, "hash hex has invalid length"),
            HexError::InvalidHex => write!(f, "hash hex has invalid characters"),
        }
    }
}

impl std::error::Error for HexError {}

/// Parse a big-endian display hex string into an internal little-endian hash.
pub fn hash256_from_hex(input: &str) -> Result<Hash256, HexError> {
    let mut hex = input.trim();
    if let Some(stripped) = hex.strip_prefix("0x").or_else(|| hex.strip_prefix("0X")) {
        hex = stripped;
    }
    if hex.is_empty() || hex.len() > 64 {
        return Err(HexError::InvalidLength);
    }

    let padded = format!("{hex:0>64}");
    let mut bytes = [0u8; 32];
    for (i, byte_out) in bytes.iter_mut().enumerate() {
        let start = i * 2;
        *byte_out = u8::from_str_radix(&padded[start..start + 2], 16)
            .map_err(|_| HexError::InvalidHex)?;
    }
    bytes.reverse();
    Ok(bytes)
}

/// Render an internal little-endian hash in big-endian display order.
pub fn hash256_to_hex(hash: &Hash256) -> String {
    let mut out = String::with_capacity(64);
    for byte in hash.iter().rev() {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

pub fn consensus_params(network: Network) -> ConsensusParams {
    match network {
        Network::Mainnet => mainnet_consensus_params(),
        Network::Testnet => testnet_consensus_params(),
        Network::Regtest => regtest_consensus_params(),
    }
}

pub fn chain_params(network: Network) -> ChainParams {
    match network {
        Network::Mainnet => ChainParams {
            network,
            consensus: mainnet_consensus_params(),
            message_start: [0xec, 0xe0, 0xdd, 0xde],
            default_port: 7333,
            mining_requires_peers: true,
            mine_blocks_on_demand: false,
            default_miner_threads: 0,
            default_tx_fee: DEFAULT_TRANSACTION_FEE,
            min_relay_tx_fee: DEFAULT_MIN_RELAY_TX_FEE,
        },
        Network::Testnet => ChainParams {
            network,
            consensus: testnet_consensus_params(),
            message_start: [0xec, 0xe0, 0xdd, 0xde],
            default_port: 17333,
            mining_requires_peers: true,
            mine_blocks_on_demand: false,
            default_miner_threads: 0,
            default_tx_fee: DEFAULT_TRANSACTION_FEE,
            min_relay_tx_fee: DEFAULT_MIN_RELAY_TX_FEE,
        },
        Network::Regtest => ChainParams {
            network,
            consensus: regtest_consensus_params(),
            message_start: [0xec, 0xe0, 0xdd, 0xde],
            default_port: 19444,
            mining_requires_peers: false,
            mine_blocks_on_demand: true,
            default_miner_threads: 1,
            default_tx_fee: DEFAULT_TRANSACTION_FEE,
            min_relay_tx_fee: DEFAULT_MIN_RELAY_TX_FEE,
        },
    }
}

fn mainnet_consensus_params() -> ConsensusParams {
    ConsensusParams {
        network: Network::Mainnet,
        genesis_time: 1_437_548_320,
        genesis_bits: 0x2000_ffff,
        genesis_nonce: 917_120,
        pow_limit: hash256_from_hex(
            "00ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        )
        .expect("mainnet pow limit"),
        initial_subsidy: 50 * COIN,
        subsidy_halving_interval: 480,
        pow_target_spacing: 3 * 60,
        pow_target_timespan: 12 * 60 * 60,
        pow_allow_min_difficulty_blocks: false,
        pow_no_retargeting: false,
    }
}

fn testnet_consensus_params() -> ConsensusParams {
    ConsensusParams {
        network: Network::Testnet,
        genesis_time: 1_427_227_400,
        pow_target_spacing: 150,
        pow_target_timespan: 302_400,
        pow_allow_min_difficulty_blocks: true,
        genesis_nonce: 607_439,
        ..mainnet_consensus_params()
    }
}

fn regtest_consensus_params() -> ConsensusParams {
    ConsensusParams {
        network: Network::Regtest,
        genesis_time: 1_296_688_602,
        genesis_bits: 0x207f_ffff,
        genesis_nonce: 607_439,
        pow_limit: hash256_from_hex(
            "7fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        )
        .expect("regtest pow limit"),
        subsidy_halving_interval: 150,
        pow_target_spacing: 150,
        pow_target_timespan: 302_400,
        pow_allow_min_difficulty_blocks: true,
        pow_no_retargeting: true,
        ..mainnet_consensus_params()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip_reverses_byte_order() {
        let hash = hash256_from_hex("0x01").expect("hash");
        assert_eq!(hash[0], 0x01);
        assert!(hash[1..].iter().all(|b| *b == 0));
        assert_eq!(
            hash256_to_hex(&hash),
            "0000000000000000000000000000000000000000000000000000000000000001"
        );
    }

    #[test]
    fn hex_rejects_garbage() {
        assert!(hash256_from_hex("").is_err());
        assert!(hash256_from_hex("zz").is_err());
        assert!(hash256_from_hex(&"f".repeat(65)).is_err());
    }

    #[test]
    fn regtest_flags() {
        let params = chain_params(Network::Regtest);
        assert!(params.mine_blocks_on_demand);
        assert!(!params.mining_requires_peers);
        assert_eq!(params.default_miner_threads, 1);
        assert!(params.consensus.pow_allow_min_difficulty_blocks);
    }

    #[test]
    fn mainnet_interval() {
        let params = consensus_params(Network::Mainnet);
        assert_eq!(params.difficulty_adjustment_interval(), 240);
    }
}
