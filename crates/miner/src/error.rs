use faid_consensus::Amount;
use faid_pow::difficulty::{CompactError, DifficultyError};
use faid_pow::PowError;
use faid_primitives::transaction::ValueRangeError;

/// Failures that abort a candidate build or a search.
///
/// Per-transaction rejects during selection never surface here; they are
/// tallied in the selection stats instead.
#[derive(Debug, Clone, PartialEq)]
pub enum MinerError {
    Chain(String),
    EmptyChain,
    DustCoinbase { output: Amount, threshold: Amount },
    InvalidCandidate(String),
    Invariant(String),
    KeyPoolExhausted,
    Pow(PowError),
    Difficulty(DifficultyError),
    Value(ValueRangeError),
    Spawn(String),
}

impl std::fmt::Display for MinerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MinerError::Chain(message) => write!(f, "chain: {message}"),
            MinerError::EmptyChain => write!(f, "active chain has no tip"),
            MinerError::DustCoinbase { output, threshold } => write!(
                f,
                "coinbase output {output} is at or below dust threshold {threshold}"
            ),
            MinerError::InvalidCandidate(message) => {
                write!(f, "candidate failed validity check: {message}")
            }
            MinerError::Invariant(message) => write!(f, "invariant violated: {message}"),
            MinerError::KeyPoolExhausted => {
                write!(f, "keypool ran out, refill it before restarting the miner")
            }
            MinerError::Pow(err) => write!(f, "{err}"),
            MinerError::Difficulty(err) => write!(f, "{err}"),
            MinerError::Value(err) => write!(f, "{err}"),
            MinerError::Spawn(message) => write!(f, "failed to spawn miner thread: {message}"),
        }
    }
}

impl std::error::Error for MinerError {}

impl From<PowError> for MinerError {
    fn from(err: PowError) -> Self {
        MinerError::Pow(err)
    }
}

impl From<CompactError> for MinerError {
    fn from(err: CompactError) -> Self {
        MinerError::Pow(PowError::Compact(err))
    }
}

impl From<DifficultyError> for MinerError {
    fn from(err: DifficultyError) -> Self {
        MinerError::Difficulty(err)
    }
}

impl From<ValueRangeError> for MinerError {
    fn from(err: ValueRangeError) -> Self {
        MinerError::Value(err)
    }
}
