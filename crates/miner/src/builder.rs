//! Candidate block assembly.

use faid_consensus::constants::MAX_BLOCK_SIGOPS;
use faid_consensus::money::format_money;
use faid_consensus::{Amount, ChainParams, Hash256};
use faid_log::{log_debug, log_info};
use faid_pow::difficulty::get_next_work_required;
use faid_pow::mix_rounds;
use faid_primitives::block::{Block, BlockHeader, CURRENT_VERSION};
use faid_script::sigops::legacy_sigop_count;

use crate::coinbase::{coinbase_template, finalize_coinbase, CoinbaseReward};
use crate::coins::CoinsViewCache;
use crate::config::MinerConfig;
use crate::error::MinerError;
use crate::interfaces::{ChainTip, ChainView, NodeHandles};
use crate::selector::{select_transactions, Selection, SelectionBudget, SelectionContext};

/// Which block a candidate extends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildTarget {
    /// The active tip, with transaction selection and all checks.
    Tip,
    /// Height `h` on top of the active block `h - 1`: coinbase only, no dust
    /// check and no validity check.
    AtHeight(u32),
}

/// A block template plus per-slot fee and sigop records.
///
/// `fees`, `sigops` and `block.transactions` are indexed identically; slot 0
/// is the coinbase, whose fee entry is the negated total of collected fees.
#[derive(Clone, Debug)]
pub struct CandidateBlock {
    pub block: Block,
    pub fees: Vec<Amount>,
    pub sigops: Vec<u32>,
    pub prev: ChainTip,
    pub reward: CoinbaseReward,
    pub selection: Selection,
}

impl CandidateBlock {
    pub fn height(&self) -> u32 {
        self.block.header.height
    }

    pub fn total_fees(&self) -> Amount {
        self.selection.total_fees
    }
}

impl SelectionBudget {
    pub fn from_config(config: &MinerConfig, params: &ChainParams) -> Self {
        Self {
            max_size: config.block_max_size,
            priority_size: config.block_priority_size,
            min_size: config.block_min_size,
            max_sigops: MAX_BLOCK_SIGOPS,
            sort_by_fee: config.sort_by_fee,
            release_orphans: config.release_orphans,
            min_relay_fee: params.min_relay_tx_fee,
        }
    }
}

fn candidate_time(prev: &ChainTip, chain: &dyn ChainView) -> i64 {
    (prev.median_time_past + 1).max(chain.adjusted_time())
}

fn next_bits(
    prev: &ChainTip,
    time: i64,
    chain: &dyn ChainView,
    params: &ChainParams,
) -> Result<u32, MinerError> {
    let interval = params.consensus.difficulty_adjustment_interval();
    let window = chain.header_window(prev.height, interval as usize);
    Ok(get_next_work_required(&window, Some(time), &params.consensus)?)
}

/// Refreshes the header time; on minimum-difficulty networks the bits follow.
pub fn update_time(
    header: &mut BlockHeader,
    prev: &ChainTip,
    chain: &dyn ChainView,
    params: &ChainParams,
) -> Result<(), MinerError> {
    let time = candidate_time(prev, chain);
    header.time = u32::try_from(time).unwrap_or(u32::MAX);
    if params.consensus.pow_allow_min_difficulty_blocks {
        header.bits = next_bits(prev, time, chain, params)?;
    }
    Ok(())
}

/// Builds a candidate paying `script_pubkey`.
///
/// Any failure leaves nothing behind; callers retry with fresh inputs.
pub fn build_candidate(
    node: &NodeHandles,
    params: &ChainParams,
    config: &MinerConfig,
    script_pubkey: &[u8],
    target: BuildTarget,
) -> Result<CandidateBlock, MinerError> {
    let _main = node
        .main_lock
        .lock()
        .map_err(|_| MinerError::Chain("main lock poisoned".to_string()))?;
    let chain = node.chain.as_ref();

    let (prev, full) = match target {
        BuildTarget::Tip => (chain.tip().ok_or(MinerError::EmptyChain)?, true),
        BuildTarget::AtHeight(height) => {
            let prev_height = height
                .checked_sub(1)
                .ok_or_else(|| MinerError::Chain("cannot build on top of nothing".to_string()))?;
            let prev = chain
                .block_at(prev_height)
                .ok_or_else(|| MinerError::Chain(format!("no active block at {prev_height}")))?;
            (prev, false)
        }
    };
    let height = prev.height + 1;

    let time = candidate_time(&prev, chain);
    let mut header = BlockHeader {
        version: CURRENT_VERSION,
        prev_block: prev.hash,
        merkle_root: [0u8; 32],
        time: u32::try_from(time).unwrap_or(u32::MAX),
        bits: prev.bits,
        nonce: 0,
        height,
    };
    if params.mine_blocks_on_demand {
        if let Some(version) = config.block_version {
            header.version = version;
        }
    }

    let mut coinbase = coinbase_template(height, script_pubkey);

    let selection = if full {
        let ctx = SelectionContext {
            height,
            lock_time_cutoff: i64::from(prev.time).min(time),
        };
        let budget = SelectionBudget::from_config(config, params);
        let entries = node.mempool.entries();
        let mut view = CoinsViewCache::new(node.coins.as_ref());
        select_transactions(&entries, &mut view, node.validator.as_ref(), &budget, &ctx)?
    } else {
        Selection::empty()
    };

    let prev_coinbase_fee = chain
        .coinbase_fee(prev.height)
        .map_err(MinerError::Chain)?;
    let reward = finalize_coinbase(
        &mut coinbase,
        height,
        selection.total_fees,
        prev_coinbase_fee,
        params,
        full,
    )?;

    let mut transactions = Vec::with_capacity(selection.tx_count() + 1);
    let mut fees = Vec::with_capacity(selection.tx_count() + 1);
    let mut sigops = Vec::with_capacity(selection.tx_count() + 1);
    fees.push(-selection.total_fees);
    sigops.push(legacy_sigop_count(&coinbase));
    transactions.push(coinbase);
    for selected in &selection.selected {
        transactions.push(selected.tx.clone());
        fees.push(selected.fee);
        sigops.push(selected.sigops);
    }

    header.bits = next_bits(&prev, time, chain, params)?;
    let mut block = Block {
        header,
        transactions,
    };
    block.header.merkle_root = block.compute_merkle_root();

    if full {
        node.validator
            .test_block_validity(&block, &prev)
            .map_err(|err| {
                log_debug!("candidate at height {height} failed validity check: {err}");
                MinerError::InvalidCandidate(err)
            })?;
    }

    log_info!(
        "candidate at height {} with {} transactions ({} bytes), reward {}, {} mix rounds",
        height,
        block.transactions.len(),
        block.serialized_size(),
        format_money(reward.output),
        mix_rounds(height)
    );

    Ok(CandidateBlock {
        block,
        fees,
        sigops,
        prev,
        reward,
        selection,
    })
}

/// Per-worker extra nonce written into the coinbase output content.
#[derive(Clone, Debug, Default)]
pub struct ExtraNonce {
    prev_block: Hash256,
    counter: u32,
}

impl ExtraNonce {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Bumps the counter, restarting it when the candidate's parent changes,
    /// and rebuilds the merkle root.
    pub fn increment(&mut self, block: &mut Block) {
        if self.prev_block != block.header.prev_block {
            self.counter = 0;
            self.prev_block = block.header.prev_block;
        }
        self.counter = self.counter.wrapping_add(1);
        if let Some(output) = block
            .transactions
            .first_mut()
            .and_then(|coinbase| coinbase.vout.first_mut())
        {
            output.content = self.counter.to_string().into_bytes();
        }
        block.header.merkle_root = block.compute_merkle_root();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extra_nonce_resets_on_new_parent() {
        let mut block = Block {
            header: BlockHeader {
                prev_block: [1u8; 32],
                ..BlockHeader::default()
            },
            transactions: vec![coinbase_template(3, &[0x51])],
        };
        let mut extra = ExtraNonce::new();
        extra.increment(&mut block);
        extra.increment(&mut block);
        assert_eq!(extra.counter(), 2);
        assert_eq!(block.transactions[0].vout[0].content, b"2".to_vec());
        assert_eq!(block.header.merkle_root, block.compute_merkle_root());

        block.header.prev_block = [2u8; 32];
        extra.increment(&mut block);
        assert_eq!(extra.counter(), 1);
        assert_eq!(block.transactions[0].vout[0].content, b"1".to_vec());
    }
}
