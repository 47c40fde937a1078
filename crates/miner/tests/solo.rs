use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use faid_consensus::money::{Amount, COIN};
use faid_consensus::{chain_params, Network};
use faid_miner::interfaces::{ChainTip, ChainView, MempoolSource};
use faid_miner::memory::{MemoryChain, MemoryKeys, MemoryNode, PermissiveOracle};
use faid_miner::{MinerConfig, MinerError, SoloMiner};
use faid_pow::check_proof_of_work;
use faid_pow::difficulty::HeaderInfo;
use faid_primitives::outpoint::OutPoint;
use faid_primitives::transaction::{Transaction, TxIn, TxOut};

fn regtest_config(threads: i32) -> MinerConfig {
    MinerConfig {
        generate: true,
        threads,
        ..MinerConfig::for_network(Network::Regtest)
    }
}

fn p2pkh_script(tag: u8) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.extend_from_slice(&[0x76, 0xa9, 0x14]);
    script.extend_from_slice(&[tag; 20]);
    script.extend_from_slice(&[0x88, 0xac]);
    script
}

#[test]
fn regtest_miner_stops_after_each_block() {
    faid_log::enable_capture(4096);
    let params = chain_params(Network::Regtest);
    let node = MemoryNode::new(&params);

    for expected_height in 1..=3u32 {
        let mut miner =
            SoloMiner::start(node.handles(), params.clone(), regtest_config(1)).expect("start");
        miner.join().expect("join");
        assert!(!miner.is_running());
        assert_eq!(miner.blocks_found(), 1);
        assert_eq!(node.chain.height(), expected_height);
    }

    for height in 1..=3u32 {
        let block = node.chain.block(height).expect("block");
        assert!(check_proof_of_work(&block.header, &params.consensus).is_ok());
        let coinbase = &block.transactions[0];
        assert!(!coinbase.vout[0].content.is_empty());
        assert_eq!(
            block.header.prev_block,
            node.chain.block(height - 1).expect("parent").hash()
        );
    }
    assert_eq!(node.keys.kept().len(), 3);
    assert!(!faid_log::captured_matching("proof-of-work found").is_empty());
}

#[test]
fn mined_block_carries_mempool_transaction() {
    let params = chain_params(Network::Regtest);
    let node = MemoryNode::new(&params);
    let funding = Transaction {
        version: 1,
        vin: vec![TxIn::new(OutPoint::new([9; 32], 0, COIN), vec![0x51])],
        vout: vec![TxOut::new(COIN, p2pkh_script(9))],
    };
    node.chain.seed_coins(&funding, 0);
    let spend = Transaction {
        version: 1,
        vin: vec![TxIn::new(OutPoint::new(funding.txid(), 0, COIN), vec![0x01, 0x01])],
        vout: vec![TxOut::new(COIN - 20_000, p2pkh_script(1))],
    };
    node.mempool.add_transaction(spend.clone(), 0).expect("mempool");

    let mut miner =
        SoloMiner::start(node.handles(), params.clone(), regtest_config(1)).expect("start");
    miner.join().expect("join");

    let block = node.chain.block(1).expect("block");
    assert_eq!(block.transactions.len(), 2);
    assert_eq!(block.transactions[1], spend);
    assert!(!node.mempool.contains(&spend.txid()));
    assert_eq!(node.chain.coinbase_fee(1).map(|fee| fee > 0), Ok(true));
}

#[test]
fn empty_key_pool_stops_worker() {
    let params = chain_params(Network::Regtest);
    let node = MemoryNode::with_parts(&params, Arc::new(PermissiveOracle), MemoryKeys::finite(0));
    let mut miner =
        SoloMiner::start(node.handles(), params.clone(), regtest_config(1)).expect("start");
    assert_eq!(miner.join(), Err(MinerError::KeyPoolExhausted));
    assert_eq!(node.chain.height(), 0);
}

#[test]
fn generation_off_starts_nothing() {
    let params = chain_params(Network::Regtest);
    let node = MemoryNode::new(&params);
    let config = MinerConfig {
        generate: false,
        ..regtest_config(4)
    };
    let mut miner = SoloMiner::start(node.handles(), params.clone(), config).expect("start");
    assert!(!miner.is_running());
    miner.join().expect("join");

    let mut idle = SoloMiner::start(node.handles(), params, regtest_config(0)).expect("start");
    assert!(!idle.is_running());
    idle.join().expect("join");
}

#[test]
fn workers_wait_for_peers_and_stop_on_request() {
    let params = chain_params(Network::Mainnet);
    let node = MemoryNode::new(&params);
    let config = MinerConfig {
        generate: true,
        threads: 2,
        ..MinerConfig::for_network(Network::Mainnet)
    };
    let mut miner = SoloMiner::start(node.handles(), params.clone(), config).expect("start");
    std::thread::sleep(Duration::from_millis(50));
    assert!(miner.is_running());
    assert_eq!(node.chain.tip().map(|tip| tip.height), Some(0));

    let other = SoloMiner::start(
        node.handles(),
        params.clone(),
        MinerConfig {
            generate: true,
            threads: 1,
            ..MinerConfig::for_network(Network::Mainnet)
        },
    )
    .expect("start");
    other.stop();
    std::thread::sleep(Duration::from_millis(50));
    assert!(miner.is_running());
    assert_eq!(miner.blocks_found(), 0);
    assert_eq!(node.chain.height(), 0);

    node.peers.set_connected(1);
    let deadline = Instant::now() + Duration::from_secs(30);
    while node.chain.height() == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(node.chain.height() >= 1);

    miner.stop();
    miner.join().expect("join");
    assert!(!miner.is_running());
    assert!(miner.blocks_found() >= 1);
}

/// Chain view whose second header window has a gap in it.
struct GappedOnce {
    inner: Arc<MemoryChain>,
    windows: AtomicUsize,
}

impl ChainView for GappedOnce {
    fn tip(&self) -> Option<ChainTip> {
        self.inner.tip()
    }

    fn block_at(&self, height: u32) -> Option<ChainTip> {
        self.inner.block_at(height)
    }

    fn header_window(&self, last_height: u32, count: usize) -> Vec<HeaderInfo> {
        let mut window = self.inner.header_window(last_height, count);
        if self.windows.fetch_add(1, Ordering::SeqCst) == 1 {
            if let Some(last) = window.last().copied() {
                window.push(HeaderInfo {
                    height: last.height + 2,
                    ..last
                });
            }
        }
        window
    }

    fn coinbase_fee(&self, height: u32) -> Result<Amount, String> {
        self.inner.coinbase_fee(height)
    }

    fn adjusted_time(&self) -> i64 {
        self.inner.adjusted_time()
    }
}

#[test]
fn worker_survives_a_broken_header_window() {
    let mut params = chain_params(Network::Regtest);
    // A target of 1 keeps the search running so the time refresh path is hit.
    let mut unreachable = [0u8; 32];
    unreachable[0] = 1;
    params.consensus.pow_limit = unreachable;
    let node = MemoryNode::new(&params);
    node.chain.set_time(Some(1_700_000_000));

    let chain = Arc::new(GappedOnce {
        inner: Arc::clone(&node.chain),
        windows: AtomicUsize::new(0),
    });
    let mut handles = node.handles();
    handles.chain = chain.clone();

    let mut miner = SoloMiner::start(handles, params, regtest_config(1)).expect("start");
    let deadline = Instant::now() + Duration::from_secs(30);
    while chain.windows.load(Ordering::SeqCst) < 4 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(chain.windows.load(Ordering::SeqCst) >= 4);
    assert!(miner.is_running());

    miner.stop();
    assert_eq!(miner.join(), Ok(()));
    assert_eq!(miner.blocks_found(), 0);
    assert_eq!(node.chain.height(), 0);
}
