//! Collaborators the miner consumes: chain, coins, mempool, validation,
//! block submission, peers and keys.
//!
//! Collaborator failures are reported as `String` messages.

use std::sync::{Arc, Mutex};

use faid_consensus::{Amount, Hash256};
use faid_pow::difficulty::HeaderInfo;
use faid_primitives::block::Block;
use faid_primitives::transaction::{Transaction, TxOut};

use crate::coins::CoinsViewCache;

/// Unspent outputs of one transaction. Spent slots are `None`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Coins {
    pub outputs: Vec<Option<TxOut>>,
    pub height: u32,
    pub is_coinbase: bool,
}

impl Coins {
    pub fn from_tx(tx: &Transaction, height: u32) -> Self {
        Self {
            outputs: tx.vout.iter().cloned().map(Some).collect(),
            height,
            is_coinbase: tx.is_coinbase(),
        }
    }

    pub fn output(&self, index: u32) -> Option<&TxOut> {
        self.outputs.get(index as usize).and_then(Option::as_ref)
    }

    pub fn spend(&mut self, index: u32) -> Option<TxOut> {
        self.outputs.get_mut(index as usize).and_then(Option::take)
    }

    pub fn is_pruned(&self) -> bool {
        self.outputs.iter().all(Option::is_none)
    }
}

pub trait CoinView: Send + Sync {
    fn access_coins(&self, txid: &Hash256) -> Option<Coins>;

    fn have_coins(&self, txid: &Hash256) -> bool {
        self.access_coins(txid).is_some()
    }
}

/// One pending transaction as the mempool tracks it.
#[derive(Clone, Debug)]
pub struct MempoolEntry {
    pub txid: Hash256,
    pub tx: Transaction,
    pub size: usize,
    pub fee: Amount,
    /// Chain height when the entry was accepted.
    pub height: u32,
    pub fee_delta: Amount,
    pub priority_delta: f64,
}

impl MempoolEntry {
    pub fn modified_fee(&self) -> Amount {
        self.fee.saturating_add(self.fee_delta)
    }
}

pub trait MempoolSource: Send + Sync {
    /// Pending transactions in queue order.
    fn entries(&self) -> Vec<MempoolEntry>;

    /// Bumped whenever the contents change.
    fn transactions_updated(&self) -> u64;

    fn contains(&self, txid: &Hash256) -> bool;
}

/// Summary of a block on the active chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainTip {
    pub hash: Hash256,
    pub height: u32,
    pub time: u32,
    pub bits: u32,
    pub median_time_past: i64,
}

pub trait ChainView: Send + Sync {
    fn tip(&self) -> Option<ChainTip>;

    fn block_at(&self, height: u32) -> Option<ChainTip>;

    /// Up to `count` headers ending at `last_height`, oldest first.
    fn header_window(&self, last_height: u32, count: usize) -> Vec<HeaderInfo>;

    /// Fee paid by the coinbase of the block at `height`.
    fn coinbase_fee(&self, height: u32) -> Result<Amount, String>;

    /// Network-adjusted unix time.
    fn adjusted_time(&self) -> i64;
}

pub trait ValidationOracle: Send + Sync {
    fn is_final_tx(&self, tx: &Transaction, height: u32, cutoff_time: i64) -> bool;

    /// Script and consensus input checks against the candidate's coin overlay.
    fn check_inputs(
        &self,
        tx: &Transaction,
        view: &CoinsViewCache<'_>,
        height: u32,
    ) -> Result<(), String>;

    fn test_block_validity(&self, block: &Block, prev: &ChainTip) -> Result<(), String>;
}

pub trait BlockSink: Send + Sync {
    fn process_new_block(&self, block: &Block) -> Result<(), String>;
}

pub trait PeerStatus: Send + Sync {
    fn connected_peers(&self) -> usize;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReservedKey {
    pub index: u64,
    pub script_pubkey: Vec<u8>,
}

pub trait KeySource: Send + Sync {
    fn reserve_key(&self) -> Result<ReservedKey, String>;

    /// Removes a reserved key from the pool for good.
    fn keep_key(&self, key: &ReservedKey);

    fn return_key(&self, key: ReservedKey);

    fn pool_size(&self) -> usize;
}

/// Everything a builder or worker needs, shareable across threads.
///
/// `main_lock` is held for one selection pass so the tip, coins and mempool
/// read during it stay consistent.
#[derive(Clone)]
pub struct NodeHandles {
    pub chain: Arc<dyn ChainView>,
    pub coins: Arc<dyn CoinView>,
    pub mempool: Arc<dyn MempoolSource>,
    pub validator: Arc<dyn ValidationOracle>,
    pub sink: Arc<dyn BlockSink>,
    pub peers: Arc<dyn PeerStatus>,
    pub keys: Arc<dyn KeySource>,
    pub main_lock: Arc<Mutex<()>>,
}
