//! Candidate block assembly and MixHash proof-of-work search.
//!
//! The builder packs mempool transactions into a candidate under size and
//! sigop budgets, attaches a coinbase paying subsidy plus collected fees plus
//! the previous block's coinbase fee, and hands the result to either the solo
//! miner (continuous, one candidate per worker) or the pool search (one fixed
//! header, a nonce range split across workers).

pub mod builder;
pub mod cancel;
pub mod cli;
pub mod coinbase;
pub mod coins;
pub mod config;
pub mod error;
pub mod hashmeter;
pub mod interfaces;
pub mod memory;
pub mod pool;
pub mod selector;
pub mod solo;

pub use builder::{build_candidate, update_time, BuildTarget, CandidateBlock, ExtraNonce};
pub use cancel::CancelToken;
pub use config::{ConfigError, MinerConfig};
pub use error::MinerError;
pub use interfaces::{ChainTip, NodeHandles};
pub use pool::{partition_range, pool_search, pool_search_with_budget, search_ranges, PoolEvent};
pub use selector::{select_transactions, Selection, SelectionBudget};
pub use solo::SoloMiner;
