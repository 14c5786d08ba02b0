//! Balances implied by a chain of blocks.
//!
//! Every connected block in a [crate::chain::View] carries the ledger obtained by applying it on
//! top of its parent's ledger. A block is valid only if its coinbase pays the expected reward and
//! no sender spends more, across all of its transactions in the block, than its balance in the
//! parent's ledger.

use crate::{Block, Error, PeerId};
use std::collections::BTreeMap;

/// Balance of every peer after some block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ledger {
    balances: Vec<u64>,
}

impl Ledger {
    /// Ledger of the genesis block, where each of `peers` peers holds `initial`.
    pub fn new(peers: usize, initial: u64) -> Self {
        Self {
            balances: vec![initial; peers],
        }
    }

    /// Balance of `peer` (0 for unknown peers).
    pub fn balance(&self, peer: PeerId) -> u64 {
        self.balances.get(peer as usize).copied().unwrap_or(0)
    }

    pub fn balances(&self) -> &[u64] {
        &self.balances
    }

    /// Returns `true` if `sender` can spend `amount` after already spending `spent` in the same
    /// block.
    pub fn affords(&self, sender: PeerId, spent: u64, amount: u64) -> bool {
        spent
            .checked_add(amount)
            .is_some_and(|total| total <= self.balance(sender))
    }

    fn check(&self, peer: PeerId) -> Result<usize, Error> {
        let index = peer as usize;
        if index >= self.balances.len() {
            return Err(Error::UnknownPeer(peer));
        }
        Ok(index)
    }

    /// Ledger after `block`, which must extend the block this ledger belongs to.
    pub fn apply(&self, block: &Block, reward: u64) -> Result<Self, Error> {
        if block.reward != reward {
            return Err(Error::InvalidReward {
                block: block.id,
                expected: reward,
                actual: block.reward,
            });
        }

        // Senders are checked against the parent's balances, not a running total
        let mut spent: BTreeMap<PeerId, u64> = BTreeMap::new();
        for transaction in &block.transactions {
            self.check(transaction.sender)?;
            self.check(transaction.receiver)?;
            let total = spent.entry(transaction.sender).or_default();
            if !self.affords(transaction.sender, *total, transaction.amount) {
                return Err(Error::Overspend {
                    block: block.id,
                    peer: transaction.sender,
                    balance: self.balance(transaction.sender),
                });
            }
            *total += transaction.amount;
        }

        let mut next = self.clone();
        for (sender, amount) in spent {
            next.balances[sender as usize] -= amount;
        }
        for transaction in &block.transactions {
            let index = transaction.receiver as usize;
            next.balances[index] = next.balances[index].saturating_add(transaction.amount);
        }
        if let Some(creator) = block.creator {
            let index = self.check(creator)?;
            next.balances[index] = next.balances[index].saturating_add(reward);
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Transaction;
    use std::time::Duration;

    fn transfer(id: u64, sender: PeerId, receiver: PeerId, amount: u64) -> Transaction {
        Transaction {
            id,
            sender,
            receiver,
            amount,
            created: Duration::ZERO,
        }
    }

    fn block(creator: PeerId, transactions: Vec<Transaction>, reward: u64) -> Block {
        Block::child(1, &Block::genesis(), creator, Duration::ZERO, transactions, reward)
    }

    #[test]
    fn test_coinbase_credits_creator() {
        let ledger = Ledger::new(3, 10);
        let next = ledger.apply(&block(2, vec![], 50), 50).unwrap();
        assert_eq!(next.balances(), &[10, 10, 60]);

        // The parent's ledger is untouched
        assert_eq!(ledger.balances(), &[10, 10, 10]);
    }

    #[test]
    fn test_transfers() {
        let ledger = Ledger::new(3, 10);
        let transactions = vec![
            transfer(1, 0, 1, 4),
            transfer(2, 1, 2, 10),
            transfer(3, 0, 0, 6),
        ];
        let next = ledger.apply(&block(1, transactions, 5), 5).unwrap();
        assert_eq!(next.balances(), &[6, 9, 20]);
    }

    #[test]
    fn test_overspend_rejected() {
        let ledger = Ledger::new(2, 10);

        // Each transfer is affordable on its own, but not both together
        let transactions = vec![transfer(1, 0, 1, 6), transfer(2, 0, 1, 5)];
        assert!(matches!(
            ledger.apply(&block(1, transactions, 0), 0),
            Err(Error::Overspend {
                peer: 0,
                balance: 10,
                ..
            })
        ));

        // Funds received in the same block cannot be spent in it
        let transactions = vec![transfer(1, 0, 1, 10), transfer(2, 1, 0, 15)];
        assert!(matches!(
            ledger.apply(&block(0, transactions, 0), 0),
            Err(Error::Overspend { peer: 1, .. })
        ));
    }

    #[test]
    fn test_wrong_reward_rejected() {
        let ledger = Ledger::new(2, 0);
        assert!(matches!(
            ledger.apply(&block(0, vec![], 100), 50),
            Err(Error::InvalidReward {
                expected: 50,
                actual: 100,
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_peer_rejected() {
        let ledger = Ledger::new(2, 10);
        assert!(matches!(
            ledger.apply(&block(0, vec![transfer(1, 0, 7, 1)], 0), 0),
            Err(Error::UnknownPeer(7))
        ));
        assert!(matches!(
            ledger.apply(&block(9, vec![], 0), 0),
            Err(Error::UnknownPeer(9))
        ));
    }

    #[test]
    fn test_affords() {
        let ledger = Ledger::new(1, 10);
        assert!(ledger.affords(0, 4, 6));
        assert!(!ledger.affords(0, 5, 6));
        assert!(!ledger.affords(0, u64::MAX, 1));
        assert!(!ledger.affords(3, 0, 1));
    }
}
