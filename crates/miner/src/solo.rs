//! Solo mining: each worker builds its own candidate and searches its nonce
//! space until the candidate goes stale.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use faid_consensus::params::hash256_to_hex;
use faid_consensus::ChainParams;
use faid_log::{log_debug, log_error, log_info, log_warn};
use faid_pow::difficulty::compact_to_u256;
use faid_pow::pow_hash;
use faid_primitives::block::Block;

use crate::builder::{build_candidate, update_time, BuildTarget, CandidateBlock, ExtraNonce};
use crate::cancel::CancelToken;
use crate::config::MinerConfig;
use crate::error::MinerError;
use crate::hashmeter::HashMeter;
use crate::interfaces::{NodeHandles, ReservedKey};
use crate::pool::{header_meets_target, NONCE_BATCH};

/// Nonces at or above this are left for the extra nonce.
pub const NONCE_EXHAUSTION: u64 = 0xffff_0000_0000_0000;

const PEER_WAIT: Duration = Duration::from_secs(1);
const BUILD_RETRY: Duration = Duration::from_millis(100);

/// Why a search over one candidate ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SearchOutcome {
    Found,
    Cancelled,
    PeersLost,
    RangeExhausted,
    MempoolChanged,
    TipMoved,
}

#[derive(Debug, Default)]
struct MinerStats {
    meter: HashMeter,
    blocks_found: AtomicU64,
    running: AtomicUsize,
}

struct Worker {
    index: usize,
    node: NodeHandles,
    params: ChainParams,
    config: MinerConfig,
    cancel: CancelToken,
    stats: Arc<MinerStats>,
}

struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Worker {
    fn run(self) -> Result<(), MinerError> {
        let _running = RunningGuard(&self.stats.running);
        log_info!("faid-miner-{} started", self.index);
        let mut key: Option<ReservedKey> = None;
        let result = self.mine(&mut key);
        if let Some(key) = key.take() {
            self.node.keys.return_key(key);
        }
        match &result {
            Ok(()) => log_info!("faid-miner-{} stopped", self.index),
            Err(err) => log_error!("faid-miner-{} stopped: {}", self.index, err),
        }
        result
    }

    fn wait_for_peers(&self) -> bool {
        if !self.params.mining_requires_peers {
            return true;
        }
        while self.node.peers.connected_peers() == 0 {
            if !self.cancel.sleep(PEER_WAIT) {
                return false;
            }
        }
        true
    }

    fn mine(&self, key: &mut Option<ReservedKey>) -> Result<(), MinerError> {
        let mut extra_nonce = ExtraNonce::new();
        loop {
            if self.cancel.is_cancelled() || !self.wait_for_peers() {
                return Ok(());
            }

            if key.is_none() {
                match self.node.keys.reserve_key() {
                    Ok(reserved) => *key = Some(reserved),
                    Err(err) => {
                        if self.node.keys.pool_size() == 0 {
                            return Err(MinerError::KeyPoolExhausted);
                        }
                        log_debug!("faid-miner-{}: reserve key failed: {}", self.index, err);
                        if !self.cancel.sleep(BUILD_RETRY) {
                            return Ok(());
                        }
                        continue;
                    }
                }
            }
            let Some(reserved) = key.as_ref() else {
                continue;
            };

            let updated_at_build = self.node.mempool.transactions_updated();
            let built_at = Instant::now();
            let mut candidate = match build_candidate(
                &self.node,
                &self.params,
                &self.config,
                &reserved.script_pubkey,
                BuildTarget::Tip,
            ) {
                Ok(candidate) => candidate,
                Err(err) => {
                    log_debug!("faid-miner-{}: build failed: {}", self.index, err);
                    if !self.cancel.sleep(BUILD_RETRY) {
                        return Ok(());
                    }
                    continue;
                }
            };
            extra_nonce.increment(&mut candidate.block);
            log_info!(
                "running miner with {} transactions in block ({} bytes)",
                candidate.block.transactions.len(),
                candidate.block.serialized_size()
            );

            let outcome = match self.search(&mut candidate, updated_at_build, built_at) {
                Ok(outcome) => outcome,
                Err(err) => {
                    log_debug!("faid-miner-{}: search failed: {}", self.index, err);
                    if !self.cancel.sleep(BUILD_RETRY) {
                        return Ok(());
                    }
                    continue;
                }
            };
            match outcome {
                SearchOutcome::Found => {
                    if self.process_block_found(&candidate.block, reserved) {
                        *key = None;
                        if self.params.mine_blocks_on_demand {
                            self.cancel.cancel();
                            return Ok(());
                        }
                    }
                }
                SearchOutcome::Cancelled => return Ok(()),
                outcome => {
                    log_debug!("faid-miner-{}: candidate retired: {:?}", self.index, outcome);
                }
            }
        }
    }

    fn search(
        &self,
        candidate: &mut CandidateBlock,
        updated_at_build: u64,
        built_at: Instant,
    ) -> Result<SearchOutcome, MinerError> {
        let chain = self.node.chain.as_ref();
        let prev = candidate.prev;
        let header = &mut candidate.block.header;
        let mut target = compact_to_u256(header.bits)?;
        loop {
            let mut hashed = 0u64;
            while hashed < NONCE_BATCH {
                hashed += 1;
                if header_meets_target(header, &target) {
                    self.stats.meter.record(hashed);
                    log_info!(
                        "proof-of-work found hash {} target {}",
                        hash256_to_hex(&pow_hash(header)),
                        hash256_to_hex(&target.to_little_endian())
                    );
                    return Ok(SearchOutcome::Found);
                }
                header.nonce = header.nonce.wrapping_add(1);
            }
            self.stats.meter.record(hashed);

            if self.cancel.is_cancelled() {
                return Ok(SearchOutcome::Cancelled);
            }
            if self.params.mining_requires_peers && self.node.peers.connected_peers() == 0 {
                return Ok(SearchOutcome::PeersLost);
            }
            if header.nonce >= NONCE_EXHAUSTION {
                return Ok(SearchOutcome::RangeExhausted);
            }
            if self.node.mempool.transactions_updated() != updated_at_build
                && built_at.elapsed() > self.config.mempool_refresh
            {
                return Ok(SearchOutcome::MempoolChanged);
            }
            if chain.tip().map(|tip| tip.hash) != Some(prev.hash) {
                return Ok(SearchOutcome::TipMoved);
            }

            update_time(header, &prev, chain, &self.params)?;
            if self.params.consensus.pow_allow_min_difficulty_blocks {
                target = compact_to_u256(header.bits)?;
            }
        }
    }

    /// Submits a solved block unless the tip has moved on since it was built.
    fn process_block_found(&self, block: &Block, key: &ReservedKey) -> bool {
        {
            let Ok(_main) = self.node.main_lock.lock() else {
                log_error!("main lock poisoned, dropping solution");
                return false;
            };
            let tip = self.node.chain.tip().map(|tip| tip.hash);
            if tip != Some(block.header.prev_block) {
                log_warn!("generated block is stale");
                return false;
            }
        }
        self.node.keys.keep_key(key);

        if let Err(err) = self.node.sink.process_new_block(block) {
            log_warn!("block {} not accepted: {}", hash256_to_hex(&block.hash()), err);
            return false;
        }
        let found = self.stats.blocks_found.fetch_add(1, Ordering::SeqCst) + 1;
        log_info!(
            "faid-miner-{} mined block {} at height {} ({} total)",
            self.index,
            hash256_to_hex(&block.hash()),
            block.header.height,
            found
        );
        true
    }
}

/// Handle over a set of solo mining threads.
///
/// Handles are independent: stopping one never touches another. Dropping a
/// handle stops and joins its workers.
pub struct SoloMiner {
    cancel: CancelToken,
    workers: Vec<JoinHandle<Result<(), MinerError>>>,
    stats: Arc<MinerStats>,
}

impl SoloMiner {
    /// Starts `config.worker_count(params)` workers; none when generation is off.
    pub fn start(
        node: NodeHandles,
        params: ChainParams,
        config: MinerConfig,
    ) -> Result<Self, MinerError> {
        let count = config.worker_count(&params);
        let mut miner = Self {
            cancel: CancelToken::new(),
            workers: Vec::with_capacity(count),
            stats: Arc::new(MinerStats::default()),
        };
        for index in 0..count {
            let worker = Worker {
                index,
                node: node.clone(),
                params: params.clone(),
                config: config.clone(),
                cancel: miner.cancel.clone(),
                stats: Arc::clone(&miner.stats),
            };
            miner.stats.running.fetch_add(1, Ordering::SeqCst);
            let spawned = thread::Builder::new()
                .name(format!("faid-miner-{index}"))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => miner.workers.push(handle),
                Err(err) => {
                    miner.stats.running.fetch_sub(1, Ordering::SeqCst);
                    miner.stop();
                    return Err(MinerError::Spawn(err.to_string()));
                }
            }
        }
        if count > 0 {
            log_info!("started {count} miner threads");
        }
        Ok(miner)
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Waits for every worker; the first worker error is returned.
    pub fn join(&mut self) -> Result<(), MinerError> {
        let mut first_err = None;
        for handle in self.workers.drain(..) {
            let result = handle.join().unwrap_or_else(|_| {
                Err(MinerError::Invariant("miner thread panicked".to_string()))
            });
            if let Err(err) = result {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    pub fn is_running(&self) -> bool {
        self.stats.running.load(Ordering::SeqCst) > 0
    }

    pub fn hashes_per_sec(&self) -> f64 {
        self.stats.meter.hashes_per_sec()
    }

    pub fn blocks_found(&self) -> u64 {
        self.stats.blocks_found.load(Ordering::SeqCst)
    }
}

impl Drop for SoloMiner {
    fn drop(&mut self) {
        self.stop();
        let _ = self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustion_threshold_keeps_high_bits_free() {
        assert_eq!(NONCE_EXHAUSTION >> 48, 0xffff);
        assert_eq!(NONCE_EXHAUSTION % NONCE_BATCH, 0);
    }

    #[test]
    fn outcome_debug_names() {
        assert_eq!(format!("{:?}", SearchOutcome::TipMoved), "TipMoved");
    }
}
