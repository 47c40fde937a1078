//! Scratch coin overlay used during one selection pass.
//!
//! Reads fall through to the base view and are cached; spends and new
//! outputs only touch the overlay, never the base.

use std::collections::HashMap;

use faid_consensus::Hash256;
use faid_primitives::outpoint::OutPoint;
use faid_primitives::transaction::{Transaction, TxOut};

use crate::interfaces::{CoinView, Coins};

pub struct CoinsViewCache<'a> {
    base: &'a dyn CoinView,
    cache: HashMap<Hash256, Option<Coins>>,
}

impl<'a> CoinsViewCache<'a> {
    pub fn new(base: &'a dyn CoinView) -> Self {
        Self {
            base,
            cache: HashMap::new(),
        }
    }

    fn fetch(&mut self, txid: &Hash256) -> Option<&mut Coins> {
        if !self.cache.contains_key(txid) {
            let coins = self.base.access_coins(txid);
            self.cache.insert(*txid, coins);
        }
        self.cache.get_mut(txid).and_then(Option::as_mut)
    }

    pub fn have_coins(&mut self, txid: &Hash256) -> bool {
        self.fetch(txid).is_some()
    }

    pub fn access_coins(&mut self, txid: &Hash256) -> Option<&Coins> {
        self.fetch(txid).map(|coins| &*coins)
    }

    /// Cached lookup without consulting the base view.
    pub fn peek_coins(&self, txid: &Hash256) -> Option<&Coins> {
        self.cache.get(txid).and_then(Option::as_ref)
    }

    pub fn output(&mut self, outpoint: &OutPoint) -> Option<&TxOut> {
        self.fetch(&outpoint.hash)?.output(outpoint.index)
    }

    /// Every input refers to an unspent output whose value matches the
    /// value the input declares.
    pub fn have_inputs(&mut self, tx: &Transaction) -> bool {
        if tx.is_coinbase() {
            return true;
        }
        tx.vin.iter().all(|input| {
            self.output(&input.prevout)
                .is_some_and(|output| output.value == input.prevout.value)
        })
    }

    /// Spends the inputs of `tx` and adds its outputs at `height`.
    pub fn apply_transaction(&mut self, tx: &Transaction, height: u32) {
        if !tx.is_coinbase() {
            for input in &tx.vin {
                if let Some(coins) = self.fetch(&input.prevout.hash) {
                    coins.spend(input.prevout.index);
                }
            }
        }
        self.cache
            .insert(tx.txid(), Some(Coins::from_tx(tx, height)));
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faid_primitives::transaction::TxIn;
    use std::sync::Mutex;

    struct CountingView {
        coins: HashMap<Hash256, Coins>,
        reads: Mutex<usize>,
    }

    impl CoinView for CountingView {
        fn access_coins(&self, txid: &Hash256) -> Option<Coins> {
            *self.reads.lock().unwrap() += 1;
            self.coins.get(txid).cloned()
        }
    }

    fn funding() -> Transaction {
        Transaction {
            version: 1,
            vin: vec![TxIn::new(OutPoint::new([1u8; 32], 0, 900), Vec::new())],
            vout: vec![TxOut::new(500, vec![0x51]), TxOut::new(400, vec![0x51])],
        }
    }

    #[test]
    fn overlay_spends_without_touching_base() {
        let parent = funding();
        let parent_id = parent.txid();
        let base = CountingView {
            coins: HashMap::from([(parent_id, Coins::from_tx(&parent, 10))]),
            reads: Mutex::new(0),
        };
        let mut view = CoinsViewCache::new(&base);

        let child = Transaction {
            version: 1,
            vin: vec![TxIn::new(OutPoint::new(parent_id, 1, 400), Vec::new())],
            vout: vec![TxOut::new(350, vec![0x52])],
        };
        assert!(view.have_inputs(&child));
        view.apply_transaction(&child, 11);
        assert!(!view.have_inputs(&child));
        assert!(view.output(&OutPoint::new(parent_id, 0, 500)).is_some());
        assert!(view.have_coins(&child.txid()));

        assert!(base.coins[&parent_id].output(1).is_some());
        assert_eq!(*base.reads.lock().unwrap(), 1);
        assert_eq!(view.cached_len(), 2);
        assert!(view.peek_coins(&parent_id).is_some_and(|coins| coins.output(1).is_none()));
    }

    #[test]
    fn declared_value_must_match() {
        let parent = funding();
        let parent_id = parent.txid();
        let base = CountingView {
            coins: HashMap::from([(parent_id, Coins::from_tx(&parent, 10))]),
            reads: Mutex::new(0),
        };
        let mut view = CoinsViewCache::new(&base);
        let child = Transaction {
            version: 1,
            vin: vec![TxIn::new(OutPoint::new(parent_id, 0, 999), Vec::new())],
            vout: Vec::new(),
        };
        assert!(!view.have_inputs(&child));
    }
}
