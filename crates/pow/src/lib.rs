//! Compact difficulty, retargeting, and the height-scaled MixHash proof of work.

pub mod difficulty;
pub mod mixhash;
pub mod validation;

pub use mixhash::{mix_hash, mix_rounds};
pub use validation::{check_proof_of_work, pow_hash, PowError};
