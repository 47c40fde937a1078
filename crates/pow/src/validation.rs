use faid_consensus::{ConsensusParams, Hash256};
use faid_primitives::block::BlockHeader;
use primitive_types::U256;

use crate::difficulty::{compact_to_u256, CompactError};
use crate::mixhash::mix_hash;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowError {
    InvalidBits(&'static str),
    HashAboveTarget,
    Compact(CompactError),
}

impl std::fmt::Display for PowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowError::InvalidBits(message) => write!(f, "{message}"),
            PowError::HashAboveTarget => write!(f, "pow hash does not meet target"),
            PowError::Compact(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for PowError {}

impl From<CompactError> for PowError {
    fn from(err: CompactError) -> Self {
        PowError::Compact(err)
    }
}

/// Proof-of-work hash of a header: the base hash mixed at the header height.
pub fn pow_hash(header: &BlockHeader) -> Hash256 {
    mix_hash(&header.hash(), header.height)
}

/// Target decoded from `bits`, rejected when zero or above the pow limit.
pub fn checked_target(bits: u32, params: &ConsensusParams) -> Result<U256, PowError> {
    let target = compact_to_u256(bits)?;
    if target.is_zero() {
        return Err(PowError::InvalidBits("pow target is zero"));
    }
    let pow_limit = U256::from_little_endian(&params.pow_limit);
    if target > pow_limit {
        return Err(PowError::InvalidBits("pow target above limit"));
    }
    Ok(target)
}

pub fn check_proof_of_work(header: &BlockHeader, params: &ConsensusParams) -> Result<(), PowError> {
    let target = checked_target(header.bits, params)?;
    let hash = pow_hash(header);
    if U256::from_little_endian(&hash) > target {
        return Err(PowError::HashAboveTarget);
    }
    Ok(())
}
