//! Difficulty and compact target utilities.

use faid_consensus::{ConsensusParams, Hash256};
use primitive_types::U256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactError {
    Negative,
    Overflow,
}

impl std::fmt::Display for CompactError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompactError::Negative => write!(f, "compact target has negative sign bit"),
            CompactError::Overflow => write!(f, "compact target overflows 256-bit range"),
        }
    }
}

impl std::error::Error for CompactError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DifficultyError {
    NonContiguous,
    MissingAncestor(i64),
    Compact(CompactError),
}

impl std::fmt::Display for DifficultyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DifficultyError::NonContiguous => write!(f, "header list must be contiguous by height"),
            DifficultyError::MissingAncestor(height) => {
                write!(f, "retarget needs header at height {height}")
            }
            DifficultyError::Compact(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for DifficultyError {}

impl From<CompactError> for DifficultyError {
    fn from(err: CompactError) -> Self {
        DifficultyError::Compact(err)
    }
}

/// Height, time and bits of one ancestor, oldest first in a chain slice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeaderInfo {
    pub height: i64,
    pub time: i64,
    pub bits: u32,
}

pub fn compact_to_u256(bits: u32) -> Result<U256, CompactError> {
    let size = bits >> 24;
    let mut word = bits & 0x007f_ffff;
    let negative = (bits & 0x0080_0000) != 0;

    if negative {
        return Err(CompactError::Negative);
    }

    let value = if size <= 3 {
        let shift = 8 * (3 - size);
        word >>= shift;
        U256::from(word)
    } else {
        let shift = 8 * (size - 3);
        U256::from(word) << shift
    };

    if word != 0 {
        let overflow = size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32);
        if overflow {
            return Err(CompactError::Overflow);
        }
    }

    Ok(value)
}

pub fn u256_to_compact(value: U256) -> u32 {
    if value.is_zero() {
        return 0;
    }

    let mut size = value.bits().div_ceil(8) as u32;
    let mut compact: u32;

    if size <= 3 {
        compact = value.low_u32() << (8 * (3 - size));
    } else {
        let shift = 8 * (size - 3);
        compact = (value >> shift).low_u32();
    }

    if (compact & 0x0080_0000) != 0 {
        compact >>= 8;
        size += 1;
    }

    (size << 24) | (compact & 0x007f_ffff)
}

pub fn compact_to_target(bits: u32) -> Result<Hash256, CompactError> {
    let value = compact_to_u256(bits)?;
    Ok(u256_to_hash(value))
}

pub fn target_to_compact(target: &Hash256) -> u32 {
    let value = U256::from_little_endian(target);
    u256_to_compact(value)
}

pub fn hash_meets_target(hash: &Hash256, target: &Hash256) -> bool {
    let hash_value = U256::from_little_endian(hash);
    let target_value = U256::from_little_endian(target);
    hash_value <= target_value
}

/// Bits required for the block after the last entry of `chain`.
///
/// Targets are retargeted every `difficulty_adjustment_interval` blocks from
/// the time the interval took, clamped to a factor of four. Between
/// retargets the previous bits carry over, except on networks allowing
/// minimum-difficulty blocks: a block more than two spacings late may use the
/// pow limit, and otherwise the last bits in the interval that were not the
/// pow limit apply.
pub fn get_next_work_required(
    chain: &[HeaderInfo],
    next_block_time: Option<i64>,
    params: &ConsensusParams,
) -> Result<u32, DifficultyError> {
    let pow_limit_bits = target_to_compact(&params.pow_limit);
    let Some(last) = chain.last() else {
        return Ok(pow_limit_bits);
    };
    ensure_contiguous(chain)?;

    let interval = params.difficulty_adjustment_interval();
    if (last.height + 1) % interval != 0 {
        if params.pow_allow_min_difficulty_blocks {
            if let Some(next_time) = next_block_time {
                if next_time > last.time + params.pow_target_spacing * 2 {
                    return Ok(pow_limit_bits);
                }
            }
            let mut bits = last.bits;
            for header in chain.iter().rev() {
                bits = header.bits;
                if header.height % interval == 0 || header.bits != pow_limit_bits {
                    break;
                }
            }
            return Ok(bits);
        }
        return Ok(last.bits);
    }

    let first_height = last.height - (interval - 1);
    let base_height = chain[0].height;
    if first_height < base_height {
        return Err(DifficultyError::MissingAncestor(first_height.max(0)));
    }
    let first = chain[(first_height - base_height) as usize];
    calculate_next_work_required(last, first.time, params)
}

/// Interval retarget from the time the last interval took.
pub fn calculate_next_work_required(
    last: &HeaderInfo,
    first_block_time: i64,
    params: &ConsensusParams,
) -> Result<u32, DifficultyError> {
    if params.pow_no_retargeting {
        return Ok(last.bits);
    }

    let timespan = params.pow_target_timespan;
    let actual_timespan = (last.time - first_block_time).clamp(timespan / 4, timespan * 4);

    let pow_limit = U256::from_little_endian(&params.pow_limit);
    let mut next = compact_to_u256(last.bits)?;
    next = next.saturating_mul(U256::from(actual_timespan as u64));
    next /= U256::from(timespan as u64);
    if next > pow_limit {
        next = pow_limit;
    }
    Ok(u256_to_compact(next))
}

fn u256_to_hash(value: U256) -> Hash256 {
    value.to_little_endian()
}

fn ensure_contiguous(chain: &[HeaderInfo]) -> Result<(), DifficultyError> {
    let base = chain[0].height;
    for (idx, header) in chain.iter().enumerate() {
        if header.height != base + idx as i64 {
            return Err(DifficultyError::NonContiguous);
        }
    }
    Ok(())
}
