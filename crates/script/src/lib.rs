//! Standard script templates and signature-operation counting.

pub mod opcodes;
pub mod sigops;
pub mod standard;

pub use sigops::{count_sigops, legacy_sigop_count, p2sh_sigop_count};
pub use standard::{classify_script_pubkey, p2pkh_script, p2sh_script, ScriptType};
