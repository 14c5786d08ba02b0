//! Pending transactions of a single peer.

use crate::{ledger::Ledger, PeerId, Transaction, TransactionId};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Transactions a peer has seen, split into those waiting to be mined and those already
/// included in the peer's current longest chain.
#[derive(Default)]
pub struct Mempool {
    /// Every transaction ever received (never pruned, needed to restore abandoned branches).
    seen: BTreeMap<TransactionId, Transaction>,

    /// Seen transactions not yet included in the current longest chain.
    pending: BTreeSet<TransactionId>,

    /// Transactions included in the current longest chain.
    confirmed: HashSet<TransactionId>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a transaction.
    ///
    /// Returns `false` if it was seen before (in which case nothing changes).
    pub fn insert(&mut self, transaction: Transaction) -> bool {
        if self.seen.contains_key(&transaction.id) {
            return false;
        }
        if !self.confirmed.contains(&transaction.id) {
            self.pending.insert(transaction.id);
        }
        self.seen.insert(transaction.id, transaction);
        true
    }

    /// Returns `true` if the transaction has been received before.
    pub fn seen(&self, id: TransactionId) -> bool {
        self.seen.contains_key(&id)
    }

    /// Returns `true` if the transaction is waiting to be mined.
    pub fn contains(&self, id: TransactionId) -> bool {
        self.pending.contains(&id)
    }

    pub fn get(&self, id: TransactionId) -> Option<&Transaction> {
        self.seen.get(&id)
    }

    /// Number of transactions waiting to be mined.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Ids of the transactions waiting to be mined, in ascending order.
    pub fn pending(&self) -> impl Iterator<Item = TransactionId> + '_ {
        self.pending.iter().copied()
    }

    /// Select at most `max` pending transactions (oldest ids first) for a block on top of the
    /// block whose balances are `ledger`.
    ///
    /// Transactions whose sender cannot afford them, given the transactions already selected,
    /// are skipped and stay pending.
    pub fn select(&self, max: usize, ledger: &Ledger) -> Vec<Transaction> {
        let mut spent: BTreeMap<PeerId, u64> = BTreeMap::new();
        let mut selected = Vec::new();
        for transaction in self.pending.iter().filter_map(|id| self.seen.get(id)) {
            if selected.len() == max {
                break;
            }
            let total = spent.entry(transaction.sender).or_default();
            if !ledger.affords(transaction.sender, *total, transaction.amount) {
                continue;
            }
            *total += transaction.amount;
            selected.push(transaction.clone());
        }
        selected
    }

    /// Mark transactions as included in the current longest chain.
    pub fn confirm<I: IntoIterator<Item = TransactionId>>(&mut self, ids: I) {
        for id in ids {
            self.pending.remove(&id);
            self.confirmed.insert(id);
        }
    }

    /// Return transactions from an abandoned branch to the pending set.
    ///
    /// Transactions this peer never received on its own are skipped.
    pub fn restore<I: IntoIterator<Item = TransactionId>>(&mut self, ids: I) {
        for id in ids {
            self.confirmed.remove(&id);
            if self.seen.contains_key(&id) {
                self.pending.insert(id);
            }
        }
    }
}
