//! Pool search: one fixed header, a nonce range split across workers.
//!
//! Workers report over a bounded channel; the first solution to claim the
//! result slot wins and every sibling is cancelled.

use std::ops::Range;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::bounded;
use faid_consensus::params::hash256_to_hex;
use faid_log::{log_debug, log_info};
use faid_pow::difficulty::compact_to_u256;
use faid_pow::{pow_hash, PowError};
use faid_primitives::block::BlockHeader;
use primitive_types::U256;

use crate::cancel::CancelToken;
use crate::error::MinerError;
use crate::hashmeter::HashMeter;

/// Nonces hashed between cancellation and deadline checks.
pub const NONCE_BATCH: u64 = 256;

const DEFAULT_WORKER_BUDGET: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolEvent {
    Found { worker: usize, nonce: u64 },
    Exhausted { worker: usize },
}

/// Splits `[begin, end)` into `workers` contiguous slices of equal width.
///
/// The remainder past the last full slice is left unsearched. Fewer slices
/// come back when the range is narrower than the worker count.
pub fn partition_range(begin: u64, end: u64, workers: usize) -> Vec<Range<u64>> {
    if workers == 0 || end <= begin {
        return Vec::new();
    }
    let span = end - begin;
    let count = (workers as u64).min(span);
    let step = span / count;
    (0..count)
        .map(|idx| {
            let start = begin + idx * step;
            start..start + step
        })
        .collect()
}

pub(crate) fn header_meets_target(header: &BlockHeader, target: &U256) -> bool {
    U256::from_little_endian(&pow_hash(header)) <= *target
}

/// Searches `range` until a solution, exhaustion, the deadline or cancellation.
fn scan_range(
    header: &BlockHeader,
    range: Range<u64>,
    target: &U256,
    deadline: Instant,
    cancel: &CancelToken,
    meter: &HashMeter,
) -> Option<u64> {
    let mut work = header.clone();
    let mut nonce = range.start;
    while nonce < range.end {
        let batch_end = nonce.saturating_add(NONCE_BATCH).min(range.end);
        let batch_start = nonce;
        while nonce < batch_end {
            work.nonce = nonce;
            if header_meets_target(&work, target) {
                meter.record(nonce - batch_start + 1);
                return Some(nonce);
            }
            nonce += 1;
        }
        meter.record(batch_end - batch_start);
        if cancel.is_cancelled() || Instant::now() >= deadline {
            return None;
        }
    }
    None
}

/// Runs one worker per range and returns the first nonce to claim the slot.
///
/// `bits == 0` searches against the header's own bits. Each worker gives up
/// after `budget`.
pub fn search_ranges(
    header: &BlockHeader,
    ranges: &[Range<u64>],
    bits: u32,
    budget: Duration,
) -> Result<Option<u64>, MinerError> {
    if ranges.is_empty() {
        return Ok(None);
    }
    let bits = if bits == 0 { header.bits } else { bits };
    let target = compact_to_u256(bits)?;
    if target.is_zero() {
        return Err(PowError::InvalidBits("pow target is zero").into());
    }
    let deadline = Instant::now() + budget;
    let cancel = CancelToken::new();
    let meter = HashMeter::new();
    let slot: Mutex<Option<u64>> = Mutex::new(None);
    let (tx, rx) = bounded::<PoolEvent>(ranges.len());

    thread::scope(|scope| {
        let mut spawned = 0usize;
        for (worker, range) in ranges.iter().enumerate() {
            let tx = tx.clone();
            let worker_cancel = cancel.clone();
            let slot = &slot;
            let meter = &meter;
            let target = &target;
            let range = range.clone();
            let spawn = thread::Builder::new()
                .name(format!("faid-pool-{worker}"))
                .spawn_scoped(scope, move || {
                    let found = scan_range(header, range, target, deadline, &worker_cancel, meter);
                    let event = match found {
                        Some(nonce) => {
                            if let Ok(mut winner) = slot.lock() {
                                if winner.is_none() {
                                    *winner = Some(nonce);
                                }
                            }
                            worker_cancel.cancel();
                            PoolEvent::Found { worker, nonce }
                        }
                        None => PoolEvent::Exhausted { worker },
                    };
                    let _ = tx.send(event);
                });
            match spawn {
                Ok(_) => spawned += 1,
                Err(err) => {
                    cancel.cancel();
                    return Err(MinerError::Spawn(err.to_string()));
                }
            }
        }
        drop(tx);

        let mut finished = 0usize;
        while finished < spawned {
            match rx.recv() {
                Ok(PoolEvent::Found { worker, nonce }) => {
                    log_debug!("pool worker {worker} found nonce {nonce}");
                    cancel.cancel();
                    break;
                }
                Ok(PoolEvent::Exhausted { worker }) => {
                    log_debug!("pool worker {worker} finished without a solution");
                    finished += 1;
                }
                Err(_) => break,
            }
        }
        cancel.cancel();
        Ok(())
    })?;

    let winner = slot
        .lock()
        .map_err(|_| MinerError::Invariant("pool result slot poisoned".to_string()))?
        .take();
    if let Some(nonce) = winner {
        let mut solved = header.clone();
        solved.nonce = nonce;
        log_info!(
            "pool search found nonce {} hash {} target {:#010x} ({:.0} hash/s)",
            nonce,
            hash256_to_hex(&pow_hash(&solved)),
            bits,
            meter.hashes_per_sec()
        );
    }
    Ok(winner)
}

/// Searches `[begin, end)` with `workers` threads; 0 means no solution.
///
/// A solution at nonce 0 is indistinguishable from none.
pub fn pool_search(
    header: &BlockHeader,
    begin: u64,
    end: u64,
    workers: usize,
    bits: u32,
) -> Result<u64, MinerError> {
    pool_search_with_budget(header, begin, end, workers, bits, DEFAULT_WORKER_BUDGET)
}

pub fn pool_search_with_budget(
    header: &BlockHeader,
    begin: u64,
    end: u64,
    workers: usize,
    bits: u32,
    budget: Duration,
) -> Result<u64, MinerError> {
    let ranges = partition_range(begin, end, workers);
    Ok(search_ranges(header, &ranges, bits, budget)?.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_covers_range_in_order() {
        let ranges = partition_range(10, 110, 4);
        assert_eq!(ranges, vec![10..35, 35..60, 60..85, 85..110]);

        let ranges = partition_range(0, 10, 3);
        assert_eq!(ranges, vec![0..3, 3..6, 6..9]);
    }

    #[test]
    fn partition_degenerate_inputs() {
        assert!(partition_range(0, 10, 0).is_empty());
        assert!(partition_range(5, 5, 2).is_empty());
        assert_eq!(partition_range(0, 2, 8), vec![0..1, 1..2]);
    }

    #[test]
    fn easiest_target_solves_first_nonce() {
        let header = BlockHeader {
            bits: 0x207f_ffff,
            height: 1,
            ..BlockHeader::default()
        };
        let easiest = U256::max_value();
        let found = scan_range(
            &header,
            5..10,
            &easiest,
            Instant::now() + Duration::from_secs(5),
            &CancelToken::new(),
            &HashMeter::new(),
        );
        assert_eq!(found, Some(5));
    }

    #[test]
    fn cancelled_scan_stops_after_one_batch() {
        let header = BlockHeader {
            bits: 0x0300_0001,
            height: 1,
            ..BlockHeader::default()
        };
        let cancel = CancelToken::new();
        cancel.cancel();
        let found = scan_range(
            &header,
            0..u64::MAX,
            &U256::zero(),
            Instant::now() + Duration::from_secs(60),
            &cancel,
            &HashMeter::new(),
        );
        assert_eq!(found, None);
    }
}
