//! In-memory collaborators: a small chain with a coin set, a mempool, peers,
//! a key pool and validation oracles. Used by tests and the regtest CLI.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use faid_consensus::{block_subsidy, Amount, ChainParams, Hash256};
use faid_log::log_debug;
use faid_pow::check_proof_of_work;
use faid_pow::difficulty::HeaderInfo;
use faid_primitives::block::{Block, BlockHeader, CURRENT_VERSION};
use faid_primitives::hash::hash160;
use faid_primitives::transaction::Transaction;
use faid_script::standard::p2pkh_script;

use crate::coinbase::coinbase_template;
use crate::coins::CoinsViewCache;
use crate::interfaces::{
    BlockSink, ChainTip, ChainView, CoinView, Coins, KeySource, MempoolEntry, MempoolSource,
    NodeHandles, PeerStatus, ReservedKey, ValidationOracle,
};

const MEDIAN_TIME_SPAN: usize = 11;

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

/// Plain coin set keyed by txid.
#[derive(Debug, Default)]
pub struct MemoryCoinView {
    coins: RwLock<HashMap<Hash256, Coins>>,
}

impl MemoryCoinView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, txid: Hash256, coins: Coins) {
        if let Ok(mut map) = self.coins.write() {
            map.insert(txid, coins);
        }
    }

    pub fn add_transaction(&self, tx: &Transaction, height: u32) {
        self.insert(tx.txid(), Coins::from_tx(tx, height));
    }
}

impl CoinView for MemoryCoinView {
    fn access_coins(&self, txid: &Hash256) -> Option<Coins> {
        self.coins.read().ok()?.get(txid).cloned()
    }
}

#[derive(Debug)]
struct ChainState {
    blocks: Vec<Block>,
    tips: Vec<ChainTip>,
    coins: HashMap<Hash256, Coins>,
}

impl ChainState {
    fn median_time_past(&self, next_time: u32) -> i64 {
        let mut times: Vec<i64> = self
            .blocks
            .iter()
            .rev()
            .take(MEDIAN_TIME_SPAN - 1)
            .map(|block| i64::from(block.header.time))
            .collect();
        times.push(i64::from(next_time));
        times.sort_unstable();
        times[times.len() / 2]
    }

    fn connect(&mut self, block: &Block) -> Result<(), String> {
        let height = block.header.height;
        let mut spent = Vec::new();
        for tx in block.transactions.iter().filter(|tx| !tx.is_coinbase()) {
            for input in &tx.vin {
                let available = self
                    .coins
                    .get(&input.prevout.hash)
                    .and_then(|coins| coins.output(input.prevout.index))
                    .is_some_and(|output| output.value == input.prevout.value);
                if !available && !spent_in_block(block, &input.prevout.hash) {
                    return Err(format!("missing input for {}", hex(&tx.txid())));
                }
                spent.push(input.prevout.clone());
            }
        }

        for tx in &block.transactions {
            self.coins.insert(tx.txid(), Coins::from_tx(tx, height));
        }
        for outpoint in spent {
            let drained = match self.coins.get_mut(&outpoint.hash) {
                Some(coins) => {
                    coins.spend(outpoint.index);
                    coins.is_pruned()
                }
                None => false,
            };
            if drained {
                self.coins.remove(&outpoint.hash);
            }
        }

        let median_time_past = self.median_time_past(block.header.time);
        self.tips.push(ChainTip {
            hash: block.hash(),
            height,
            time: block.header.time,
            bits: block.header.bits,
            median_time_past,
        });
        self.blocks.push(block.clone());
        Ok(())
    }
}

fn spent_in_block(block: &Block, txid: &Hash256) -> bool {
    block.transactions.iter().any(|tx| tx.txid() == *txid)
}

fn hex(hash: &Hash256) -> String {
    faid_consensus::params::hash256_to_hex(hash)
}

/// Genesis for `params`: a coinbase paying the subsidy in full to OP_TRUE.
pub fn genesis_block(params: &ChainParams) -> Block {
    let mut coinbase = coinbase_template(0, &[0x51]);
    let subsidy = block_subsidy(0, &params.consensus);
    coinbase.vin[0].prevout.value = subsidy;
    coinbase.vout[0].value = subsidy;
    let mut block = Block {
        header: BlockHeader {
            version: CURRENT_VERSION,
            prev_block: [0u8; 32],
            merkle_root: [0u8; 32],
            time: params.consensus.genesis_time,
            bits: params.consensus.genesis_bits,
            nonce: params.consensus.genesis_nonce,
            height: 0,
        },
        transactions: vec![coinbase],
    };
    block.header.merkle_root = block.compute_merkle_root();
    block
}

/// Active chain kept in memory, with its own coin set.
///
/// Connecting a block takes the shared main lock so a selection pass never
/// observes a half-applied tip.
pub struct MemoryChain {
    params: ChainParams,
    state: RwLock<ChainState>,
    main_lock: Arc<Mutex<()>>,
    clock: Mutex<Option<i64>>,
    mempool: Option<Arc<MemoryMempool>>,
}

impl MemoryChain {
    pub fn new(params: ChainParams, main_lock: Arc<Mutex<()>>) -> Self {
        let genesis = genesis_block(&params);
        let mut state = ChainState {
            blocks: Vec::new(),
            tips: Vec::new(),
            coins: HashMap::new(),
        };
        // Genesis has no inputs to resolve.
        let _ = state.connect(&genesis);
        Self {
            params,
            state: RwLock::new(state),
            main_lock,
            clock: Mutex::new(None),
            mempool: None,
        }
    }

    /// Mined transactions are evicted from `mempool` on connect.
    pub fn with_mempool(mut self, mempool: Arc<MemoryMempool>) -> Self {
        self.mempool = Some(mempool);
        self
    }

    /// Pins the adjusted time; `None` follows the system clock.
    pub fn set_time(&self, time: Option<i64>) {
        if let Ok(mut clock) = self.clock.lock() {
            *clock = time;
        }
    }

    pub fn height(&self) -> u32 {
        self.tip().map(|tip| tip.height).unwrap_or(0)
    }

    pub fn block(&self, height: u32) -> Option<Block> {
        self.state.read().ok()?.blocks.get(height as usize).cloned()
    }

    /// Adds spendable coins outside of any block.
    pub fn seed_coins(&self, tx: &Transaction, height: u32) {
        if let Ok(mut state) = self.state.write() {
            state.coins.insert(tx.txid(), Coins::from_tx(tx, height));
        }
    }
}

impl ChainView for MemoryChain {
    fn tip(&self) -> Option<ChainTip> {
        self.state.read().ok()?.tips.last().copied()
    }

    fn block_at(&self, height: u32) -> Option<ChainTip> {
        self.state.read().ok()?.tips.get(height as usize).copied()
    }

    fn header_window(&self, last_height: u32, count: usize) -> Vec<HeaderInfo> {
        let Ok(state) = self.state.read() else {
            return Vec::new();
        };
        let end = (last_height as usize + 1).min(state.tips.len());
        let start = end.saturating_sub(count);
        state.tips[start..end]
            .iter()
            .map(|tip| HeaderInfo {
                height: i64::from(tip.height),
                time: i64::from(tip.time),
                bits: tip.bits,
            })
            .collect()
    }

    fn coinbase_fee(&self, height: u32) -> Result<Amount, String> {
        let state = self
            .state
            .read()
            .map_err(|_| "chain state poisoned".to_string())?;
        let block = state
            .blocks
            .get(height as usize)
            .ok_or_else(|| format!("no block at height {height}"))?;
        let coinbase = block
            .transactions
            .first()
            .ok_or_else(|| format!("block at height {height} has no coinbase"))?;
        coinbase.fee().map_err(|err| err.to_string())
    }

    fn adjusted_time(&self) -> i64 {
        self.clock
            .lock()
            .ok()
            .and_then(|clock| *clock)
            .unwrap_or_else(unix_now)
    }
}

impl CoinView for MemoryChain {
    fn access_coins(&self, txid: &Hash256) -> Option<Coins> {
        self.state.read().ok()?.coins.get(txid).cloned()
    }
}

impl BlockSink for MemoryChain {
    fn process_new_block(&self, block: &Block) -> Result<(), String> {
        let _main = self
            .main_lock
            .lock()
            .map_err(|_| "main lock poisoned".to_string())?;
        let tip = self.tip().ok_or_else(|| "chain has no tip".to_string())?;
        if block.header.prev_block != tip.hash {
            return Err("block does not extend the active tip".to_string());
        }
        if block.header.height != tip.height + 1 {
            return Err(format!("bad height {}", block.header.height));
        }
        if block.header.merkle_root != block.compute_merkle_root() {
            return Err("merkle root mismatch".to_string());
        }
        if !block.transactions.first().is_some_and(Transaction::is_coinbase) {
            return Err("first transaction is not a coinbase".to_string());
        }
        check_proof_of_work(&block.header, &self.params.consensus)
            .map_err(|err| err.to_string())?;

        self.state
            .write()
            .map_err(|_| "chain state poisoned".to_string())?
            .connect(block)?;

        if let Some(mempool) = &self.mempool {
            let mined: Vec<Hash256> = block.transactions.iter().map(Transaction::txid).collect();
            mempool.remove(&mined);
        }
        log_debug!("connected block {} at height {}", hex(&block.hash()), block.header.height);
        Ok(())
    }
}

/// Mempool in insertion order with a change counter.
#[derive(Debug, Default)]
pub struct MemoryMempool {
    entries: Mutex<Vec<MempoolEntry>>,
    updated: AtomicU64,
}

impl MemoryMempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry: MempoolEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|existing| existing.txid != entry.txid);
            entries.push(entry);
            self.updated.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Adds `tx` with the fee its declared input values imply.
    pub fn add_transaction(&self, tx: Transaction, height: u32) -> Result<Hash256, String> {
        let fee = tx.fee().map_err(|err| err.to_string())?;
        let txid = tx.txid();
        self.insert(MempoolEntry {
            txid,
            size: tx.serialized_size(),
            tx,
            fee,
            height,
            fee_delta: 0,
            priority_delta: 0.0,
        });
        Ok(txid)
    }

    pub fn remove(&self, txids: &[Hash256]) {
        let remove: HashSet<&Hash256> = txids.iter().collect();
        if let Ok(mut entries) = self.entries.lock() {
            let before = entries.len();
            entries.retain(|entry| !remove.contains(&entry.txid));
            if entries.len() != before {
                self.updated.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MempoolSource for MemoryMempool {
    fn entries(&self) -> Vec<MempoolEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    fn transactions_updated(&self) -> u64 {
        self.updated.load(Ordering::SeqCst)
    }

    fn contains(&self, txid: &Hash256) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.iter().any(|entry| entry.txid == *txid))
            .unwrap_or(false)
    }
}

#[derive(Debug, Default)]
pub struct MemoryPeers {
    connected: AtomicUsize,
}

impl MemoryPeers {
    pub fn new(connected: usize) -> Self {
        Self {
            connected: AtomicUsize::new(connected),
        }
    }

    pub fn set_connected(&self, connected: usize) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl PeerStatus for MemoryPeers {
    fn connected_peers(&self) -> usize {
        self.connected.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct KeyPool {
    available: VecDeque<ReservedKey>,
    next_index: u64,
    kept: Vec<u64>,
}

/// Key pool of p2pkh scripts, either fixed-size or refilled on demand.
#[derive(Debug)]
pub struct MemoryKeys {
    pool: Mutex<KeyPool>,
    refill: bool,
}

fn derive_key(index: u64) -> ReservedKey {
    ReservedKey {
        index,
        script_pubkey: p2pkh_script(&hash160(&index.to_le_bytes())),
    }
}

impl MemoryKeys {
    pub fn finite(count: usize) -> Self {
        let available = (0..count as u64).map(derive_key).collect();
        Self {
            pool: Mutex::new(KeyPool {
                available,
                next_index: count as u64,
                kept: Vec::new(),
            }),
            refill: false,
        }
    }

    pub fn unlimited() -> Self {
        Self {
            pool: Mutex::new(KeyPool::default()),
            refill: true,
        }
    }

    pub fn kept(&self) -> Vec<u64> {
        self.pool
            .lock()
            .map(|pool| pool.kept.clone())
            .unwrap_or_default()
    }
}

impl KeySource for MemoryKeys {
    fn reserve_key(&self) -> Result<ReservedKey, String> {
        let mut pool = self.pool.lock().map_err(|_| "key pool poisoned".to_string())?;
        if let Some(key) = pool.available.pop_front() {
            return Ok(key);
        }
        if !self.refill {
            return Err("keypool is empty".to_string());
        }
        let key = derive_key(pool.next_index);
        pool.next_index += 1;
        Ok(key)
    }

    fn keep_key(&self, key: &ReservedKey) {
        if let Ok(mut pool) = self.pool.lock() {
            pool.kept.push(key.index);
        }
    }

    fn return_key(&self, key: ReservedKey) {
        if let Ok(mut pool) = self.pool.lock() {
            pool.available.push_front(key);
        }
    }

    fn pool_size(&self) -> usize {
        let available = self
            .pool
            .lock()
            .map(|pool| pool.available.len())
            .unwrap_or(0);
        if self.refill {
            available.max(1)
        } else {
            available
        }
    }
}

/// Accepts everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissiveOracle;

impl ValidationOracle for PermissiveOracle {
    fn is_final_tx(&self, _tx: &Transaction, _height: u32, _cutoff_time: i64) -> bool {
        true
    }

    fn check_inputs(
        &self,
        _tx: &Transaction,
        _view: &CoinsViewCache<'_>,
        _height: u32,
    ) -> Result<(), String> {
        Ok(())
    }

    fn test_block_validity(&self, _block: &Block, _prev: &ChainTip) -> Result<(), String> {
        Ok(())
    }
}

/// Oracle with per-transaction verdicts set up front.
#[derive(Debug, Default, Clone)]
pub struct ScriptedOracle {
    non_final: HashSet<Hash256>,
    bad_inputs: HashMap<Hash256, String>,
    block_failure: Option<String>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn non_final(mut self, txid: Hash256) -> Self {
        self.non_final.insert(txid);
        self
    }

    pub fn reject_inputs(mut self, txid: Hash256, reason: impl Into<String>) -> Self {
        self.bad_inputs.insert(txid, reason.into());
        self
    }

    pub fn fail_blocks(mut self, reason: impl Into<String>) -> Self {
        self.block_failure = Some(reason.into());
        self
    }
}

impl ValidationOracle for ScriptedOracle {
    fn is_final_tx(&self, tx: &Transaction, _height: u32, _cutoff_time: i64) -> bool {
        !self.non_final.contains(&tx.txid())
    }

    fn check_inputs(
        &self,
        tx: &Transaction,
        _view: &CoinsViewCache<'_>,
        _height: u32,
    ) -> Result<(), String> {
        match self.bad_inputs.get(&tx.txid()) {
            Some(reason) => Err(reason.clone()),
            None => Ok(()),
        }
    }

    fn test_block_validity(&self, _block: &Block, _prev: &ChainTip) -> Result<(), String> {
        match &self.block_failure {
            Some(reason) => Err(reason.clone()),
            None => Ok(()),
        }
    }
}

/// A complete in-memory node sharing one main lock.
pub struct MemoryNode {
    pub chain: Arc<MemoryChain>,
    pub mempool: Arc<MemoryMempool>,
    pub peers: Arc<MemoryPeers>,
    pub keys: Arc<MemoryKeys>,
    pub validator: Arc<dyn ValidationOracle>,
    pub main_lock: Arc<Mutex<()>>,
}

impl MemoryNode {
    pub fn new(params: &ChainParams) -> Self {
        Self::with_parts(params, Arc::new(PermissiveOracle), MemoryKeys::unlimited())
    }

    pub fn with_parts(
        params: &ChainParams,
        validator: Arc<dyn ValidationOracle>,
        keys: MemoryKeys,
    ) -> Self {
        let main_lock = Arc::new(Mutex::new(()));
        let mempool = Arc::new(MemoryMempool::new());
        let chain = MemoryChain::new(params.clone(), Arc::clone(&main_lock))
            .with_mempool(Arc::clone(&mempool));
        Self {
            chain: Arc::new(chain),
            mempool,
            peers: Arc::new(MemoryPeers::new(0)),
            keys: Arc::new(keys),
            validator,
            main_lock,
        }
    }

    pub fn handles(&self) -> NodeHandles {
        NodeHandles {
            chain: self.chain.clone(),
            coins: self.chain.clone(),
            mempool: self.mempool.clone(),
            validator: Arc::clone(&self.validator),
            sink: self.chain.clone(),
            peers: self.peers.clone(),
            keys: self.keys.clone(),
            main_lock: Arc::clone(&self.main_lock),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faid_consensus::{chain_params, Network};

    #[test]
    fn genesis_is_tip_and_pays_no_fee() {
        let params = chain_params(Network::Regtest);
        let chain = MemoryChain::new(params.clone(), Arc::new(Mutex::new(())));
        let tip = chain.tip().expect("tip");
        assert_eq!(tip.height, 0);
        assert_eq!(tip.hash, genesis_block(&params).hash());
        assert_eq!(chain.coinbase_fee(0), Ok(0));
        assert_eq!(chain.header_window(0, 10).len(), 1);
    }

    #[test]
    fn finite_keys_run_out() {
        let keys = MemoryKeys::finite(1);
        let key = keys.reserve_key().expect("key");
        assert_eq!(keys.pool_size(), 0);
        assert!(keys.reserve_key().is_err());
        keys.return_key(key.clone());
        assert_eq!(keys.pool_size(), 1);
        keys.keep_key(&key);
        assert_eq!(keys.kept(), vec![key.index]);
    }

    #[test]
    fn mempool_counter_tracks_changes() {
        let mempool = MemoryMempool::new();
        let tx = coinbase_template(1, &[0x51]);
        let before = mempool.transactions_updated();
        mempool.insert(MempoolEntry {
            txid: tx.txid(),
            size: tx.serialized_size(),
            tx: tx.clone(),
            fee: 0,
            height: 1,
            fee_delta: 0,
            priority_delta: 0.0,
        });
        assert_eq!(mempool.transactions_updated(), before + 1);
        assert!(mempool.contains(&tx.txid()));
        mempool.remove(&[tx.txid()]);
        assert!(mempool.is_empty());
        assert_eq!(mempool.transactions_updated(), before + 2);
    }
}
