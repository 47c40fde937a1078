//! Greedy fee/priority transaction selection for one candidate.
//!
//! Transactions are ranked by priority first (coin age per byte) until the
//! priority area is full or priorities drop below the free threshold, then by
//! fee rate. Each accepted transaction is applied to the scratch coin overlay
//! so later transactions in the same pass may spend its outputs. A
//! transaction spending an unconfirmed parent that is not yet in the
//! candidate is parked as an orphan keyed by the parents it waits on.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use faid_consensus::constants::{
    allow_free, BLOCK_RESERVED_SIGOPS, BLOCK_RESERVED_SIZE, MIN_VIABLE_TX_SIZE,
};
use faid_consensus::{Amount, FeeRate, Hash256};
use faid_log::{log_debug, log_error, log_trace};
use faid_primitives::outpoint::OutPoint;
use faid_primitives::transaction::{Transaction, TxOut};
use faid_script::sigops::{legacy_sigop_count, p2sh_sigop_count};

use crate::coins::CoinsViewCache;
use crate::error::MinerError;
use crate::interfaces::{MempoolEntry, ValidationOracle};

/// Per-input overhead not charged against priority.
const PRIORITY_INPUT_BASE: usize = 41;
const PRIORITY_SCRIPT_SIG_CAP: usize = 110;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectionBudget {
    pub max_size: u32,
    pub priority_size: u32,
    pub min_size: u32,
    pub max_sigops: u32,
    pub sort_by_fee: bool,
    pub release_orphans: bool,
    pub min_relay_fee: FeeRate,
}

/// Candidate facts a selection pass checks transactions against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectionContext {
    pub height: u32,
    /// Output time locks at or beyond this unix time are not yet spendable.
    pub lock_time_cutoff: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RejectReason {
    Coinbase,
    NotFinal,
    MissingInputs,
    WaitingOnParent,
    ImmatureInput,
    BlockSize,
    BelowMinRelayFee,
    SigopLimit,
    InputsUnavailable,
    ValueOutOfRange,
    Validation,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectionStats {
    rejected: BTreeMap<RejectReason, usize>,
}

impl SelectionStats {
    fn record(&mut self, reason: RejectReason) {
        *self.rejected.entry(reason).or_insert(0) += 1;
    }

    pub fn count(&self, reason: RejectReason) -> usize {
        self.rejected.get(&reason).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.rejected.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RejectReason, usize)> + '_ {
        self.rejected.iter().map(|(reason, count)| (*reason, *count))
    }
}

#[derive(Clone, Debug)]
pub struct SelectedTx {
    pub txid: Hash256,
    pub tx: Transaction,
    pub size: usize,
    pub fee: Amount,
    pub sigops: u32,
    pub priority: f64,
    pub fee_rate: FeeRate,
}

#[derive(Clone, Debug)]
pub struct Selection {
    pub selected: Vec<SelectedTx>,
    pub total_fees: Amount,
    /// Running block size, reserved header and coinbase bytes included.
    pub block_size: u64,
    /// Running sigop count, the coinbase reservation included.
    pub block_sigops: u32,
    /// Orphans whose parents were all selected but which did not make it in.
    pub ready_orphans: Vec<Hash256>,
    pub stats: SelectionStats,
}

impl Selection {
    pub fn empty() -> Self {
        Self {
            selected: Vec::new(),
            total_fees: 0,
            block_size: BLOCK_RESERVED_SIZE as u64,
            block_sigops: BLOCK_RESERVED_SIGOPS,
            ready_orphans: Vec::new(),
            stats: SelectionStats::default(),
        }
    }

    pub fn tx_count(&self) -> usize {
        self.selected.len()
    }
}

#[derive(Clone, Copy, Debug)]
struct Ranked {
    priority: f64,
    fee_rate: FeeRate,
    slot: usize,
}

/// Total order on ranked entries; ties fall back to mempool queue position.
fn compare_ranked(a: &Ranked, b: &Ranked, by_fee: bool) -> Ordering {
    let by_priority = a.priority.total_cmp(&b.priority);
    let by_rate = a.fee_rate.cmp(&b.fee_rate);
    let primary = if by_fee {
        by_rate.then(by_priority)
    } else {
        by_priority.then(by_rate)
    };
    primary.then_with(|| b.slot.cmp(&a.slot))
}

/// Ascending queue; the best entry sits at the end.
struct RankQueue {
    items: Vec<Ranked>,
    by_fee: bool,
}

impl RankQueue {
    fn new(mut items: Vec<Ranked>, by_fee: bool) -> Self {
        items.sort_by(|a, b| compare_ranked(a, b, by_fee));
        Self { items, by_fee }
    }

    fn pop(&mut self) -> Option<Ranked> {
        self.items.pop()
    }

    fn push(&mut self, item: Ranked) {
        let by_fee = self.by_fee;
        let pos = self
            .items
            .partition_point(|queued| compare_ranked(queued, &item, by_fee) == Ordering::Less);
        self.items.insert(pos, item);
    }

    fn resort_by_fee(&mut self) {
        self.by_fee = true;
        self.items.sort_by(|a, b| compare_ranked(a, b, true));
    }
}

struct Orphan {
    ranked: Ranked,
    depends_on: HashSet<Hash256>,
}

/// Serialized size less per-input overhead, as used for priority.
pub fn modified_size(tx: &Transaction, size: usize) -> usize {
    let mut modified = size;
    for input in &tx.vin {
        let offset = PRIORITY_INPUT_BASE + input.script_sig.len().min(PRIORITY_SCRIPT_SIG_CAP);
        if modified > offset {
            modified -= offset;
        }
    }
    modified
}

fn output_is_mature(output: &TxOut, ctx: &SelectionContext) -> bool {
    let cutoff = if output.lock_is_time() {
        ctx.lock_time_cutoff
    } else {
        i64::from(ctx.height)
    };
    i64::from(output.lock_time) < cutoff
}

fn inputs_mature(view: &mut CoinsViewCache<'_>, tx: &Transaction, ctx: &SelectionContext) -> bool {
    tx.vin.iter().all(|input| {
        view.output(&input.prevout)
            .is_some_and(|output| output_is_mature(output, ctx))
    })
}

/// Runs one selection pass over `entries` in queue order.
pub fn select_transactions(
    entries: &[MempoolEntry],
    view: &mut CoinsViewCache<'_>,
    validator: &dyn ValidationOracle,
    budget: &SelectionBudget,
    ctx: &SelectionContext,
) -> Result<Selection, MinerError> {
    let mut selection = Selection::empty();
    let in_mempool: HashSet<Hash256> = entries.iter().map(|entry| entry.txid).collect();

    let mut ranked = Vec::with_capacity(entries.len());
    let mut orphans: HashMap<usize, Orphan> = HashMap::new();
    let mut dependers: HashMap<Hash256, Vec<usize>> = HashMap::new();

    for (slot, entry) in entries.iter().enumerate() {
        let tx = &entry.tx;
        if tx.is_coinbase() {
            selection.stats.record(RejectReason::Coinbase);
            continue;
        }
        if !validator.is_final_tx(tx, ctx.height, ctx.lock_time_cutoff) {
            selection.stats.record(RejectReason::NotFinal);
            continue;
        }

        let mut weighted_value = 0.0f64;
        let mut depends_on = HashSet::new();
        let mut reject = None;
        for input in &tx.vin {
            let prevout = &input.prevout;
            let Some(coins) = view.access_coins(&prevout.hash) else {
                if in_mempool.contains(&prevout.hash) {
                    depends_on.insert(prevout.hash);
                    continue;
                }
                reject = Some(RejectReason::MissingInputs);
                break;
            };
            let age = ctx.height.saturating_sub(coins.height);
            let Some(output) = coins.output(prevout.index) else {
                reject = Some(RejectReason::MissingInputs);
                break;
            };
            if !output_is_mature(output, ctx) {
                reject = Some(RejectReason::ImmatureInput);
                break;
            }
            weighted_value += output.value.max(0) as f64 * f64::from(age);
        }
        if let Some(reason) = reject {
            selection.stats.record(reason);
            continue;
        }

        let modified = modified_size(tx, entry.size);
        let mut priority = if modified == 0 {
            0.0
        } else {
            weighted_value / modified as f64
        };
        priority += entry.priority_delta;
        let item = Ranked {
            priority,
            fee_rate: FeeRate::from_paid(entry.modified_fee(), entry.size),
            slot,
        };

        if depends_on.is_empty() {
            ranked.push(item);
        } else {
            for parent in &depends_on {
                dependers.entry(*parent).or_default().push(slot);
            }
            orphans.insert(
                slot,
                Orphan {
                    ranked: item,
                    depends_on,
                },
            );
        }
    }

    let mut by_fee = budget.sort_by_fee || budget.priority_size == 0;
    let mut queue = RankQueue::new(ranked, by_fee);
    let mut released: Vec<usize> = Vec::new();
    let max_size = u64::from(budget.max_size);

    while let Some(item) = queue.pop() {
        let entry = &entries[item.slot];
        let tx = &entry.tx;
        let size = entry.size as u64;

        if selection.block_size + size >= max_size {
            selection.stats.record(RejectReason::BlockSize);
            continue;
        }

        if by_fee
            && item.fee_rate < budget.min_relay_fee
            && selection.block_size + size >= u64::from(budget.min_size)
        {
            log_trace!(
                "skipping {}: fee rate {} below {}",
                hex_id(&entry.txid),
                item.fee_rate,
                budget.min_relay_fee
            );
            selection.stats.record(RejectReason::BelowMinRelayFee);
            continue;
        }

        if !by_fee
            && (selection.block_size + size >= u64::from(budget.priority_size)
                || !allow_free(item.priority))
        {
            by_fee = true;
            queue.resort_by_fee();
        }

        let mut sigops = legacy_sigop_count(tx);
        if selection.block_sigops.saturating_add(sigops) >= budget.max_sigops {
            selection.stats.record(RejectReason::SigopLimit);
            continue;
        }

        if !view.have_inputs(tx) {
            selection.stats.record(RejectReason::InputsUnavailable);
            continue;
        }
        let fee = match tx.fee() {
            Ok(fee) if fee >= 0 => fee,
            _ => {
                selection.stats.record(RejectReason::ValueOutOfRange);
                continue;
            }
        };

        let mut spent_scripts: HashMap<OutPoint, Vec<u8>> = HashMap::new();
        for input in &tx.vin {
            let Some(output) = view.output(&input.prevout) else {
                let message = format!(
                    "input of {} vanished from the coin view after its inputs were checked",
                    hex_id(&entry.txid)
                );
                log_error!("{message}");
                return Err(MinerError::Invariant(message));
            };
            spent_scripts.insert(input.prevout.clone(), output.script_pubkey.clone());
        }
        sigops = sigops.saturating_add(p2sh_sigop_count(tx, |prevout| {
            spent_scripts.get(prevout).cloned()
        }));
        if selection.block_sigops.saturating_add(sigops) >= budget.max_sigops {
            selection.stats.record(RejectReason::SigopLimit);
            continue;
        }

        if let Err(err) = validator.check_inputs(tx, view, ctx.height) {
            log_debug!("skipping {}: {err}", hex_id(&entry.txid));
            selection.stats.record(RejectReason::Validation);
            continue;
        }

        view.apply_transaction(tx, ctx.height);
        selection.selected.push(SelectedTx {
            txid: entry.txid,
            tx: tx.clone(),
            size: entry.size,
            fee,
            sigops,
            priority: item.priority,
            fee_rate: item.fee_rate,
        });
        selection.block_size += size;
        selection.block_sigops += sigops;
        selection.total_fees += fee;

        if selection.block_size + u64::from(MIN_VIABLE_TX_SIZE) > max_size {
            break;
        }

        let Some(waiting) = dependers.remove(&entry.txid) else {
            continue;
        };
        for orphan_slot in waiting {
            let Some(orphan) = orphans.get_mut(&orphan_slot) else {
                continue;
            };
            orphan.depends_on.remove(&entry.txid);
            if !orphan.depends_on.is_empty() {
                continue;
            }
            let Some(orphan) = orphans.remove(&orphan_slot) else {
                continue;
            };
            released.push(orphan_slot);
            if !budget.release_orphans {
                continue;
            }
            if inputs_mature(view, &entries[orphan_slot].tx, ctx) {
                queue.push(orphan.ranked);
            } else {
                selection.stats.record(RejectReason::ImmatureInput);
            }
        }
    }

    for _ in orphans.values() {
        selection.stats.record(RejectReason::WaitingOnParent);
    }

    let selected: HashSet<Hash256> = selection.selected.iter().map(|tx| tx.txid).collect();
    selection.ready_orphans = released
        .into_iter()
        .map(|slot| entries[slot].txid)
        .filter(|txid| !selected.contains(txid))
        .collect();
    if !budget.release_orphans {
        for _ in &selection.ready_orphans {
            selection.stats.record(RejectReason::WaitingOnParent);
        }
    }

    Ok(selection)
}

fn hex_id(txid: &Hash256) -> String {
    faid_consensus::params::hash256_to_hex(txid)
}
