//! A single peer's view of the block tree.
//!
//! Blocks reference their parent by id and are stored in a map owned by the view, so the tree
//! never needs back-pointers. The tip follows the longest-chain rule: a block replaces the tip
//! only if it is strictly higher, which means the first block seen at a given height wins ties.
//!
//! Blocks can arrive before their parent (they travel different paths through the network).
//! Such orphans are buffered and connected, in arrival order, as soon as their parent is.
//!
//! A block is connected only if it applies cleanly to its parent's [Ledger]. Otherwise it is
//! rejected, along with every buffered descendant and every descendant that arrives later.

use crate::{ledger::Ledger, Block, BlockId, Error, PeerId};
use std::{
    collections::{BTreeMap, HashSet, VecDeque},
    time::Duration,
};
use tracing::debug;

/// Blocks known to one peer and the tip of its longest chain.
pub struct View {
    /// Blocks connected to genesis.
    blocks: BTreeMap<BlockId, Block>,
    children: BTreeMap<BlockId, Vec<BlockId>>,

    /// Balances after each connected block.
    ledgers: BTreeMap<BlockId, Ledger>,

    /// Coinbase every valid block must pay.
    reward: u64,

    /// Blocks waiting for their parent, keyed by the missing parent.
    orphans: BTreeMap<BlockId, Vec<Block>>,
    orphaned: HashSet<BlockId>,

    rejected: HashSet<BlockId>,

    arrivals: BTreeMap<BlockId, Duration>,
    tip: BlockId,
}

impl View {
    /// Create a view that only knows `genesis`, whose balances are `ledger`.
    pub fn new(genesis: Block, ledger: Ledger, reward: u64) -> Self {
        let tip = genesis.id;
        let mut arrivals = BTreeMap::new();
        arrivals.insert(tip, genesis.created);
        let mut blocks = BTreeMap::new();
        blocks.insert(tip, genesis);
        let mut ledgers = BTreeMap::new();
        ledgers.insert(tip, ledger);
        Self {
            blocks,
            children: BTreeMap::new(),
            ledgers,
            reward,
            orphans: BTreeMap::new(),
            orphaned: HashSet::new(),
            rejected: HashSet::new(),
            arrivals,
            tip,
        }
    }

    /// Returns `true` if the block was received before (connected, orphaned or rejected).
    pub fn knows(&self, id: BlockId) -> bool {
        self.blocks.contains_key(&id) || self.orphaned.contains(&id) || self.rejected.contains(&id)
    }

    /// Returns `true` if the block (or one of its ancestors) failed validation.
    pub fn is_rejected(&self, id: BlockId) -> bool {
        self.rejected.contains(&id)
    }

    /// Number of rejected blocks.
    pub fn rejected(&self) -> usize {
        self.rejected.len()
    }

    /// Balances after a connected block.
    pub fn ledger(&self, id: BlockId) -> Option<&Ledger> {
        self.ledgers.get(&id)
    }

    /// Balances at the tip of the longest chain.
    pub fn tip_ledger(&self) -> &Ledger {
        &self.ledgers[&self.tip]
    }

    /// Balance of `peer` at the tip of the longest chain.
    pub fn balance(&self, peer: PeerId) -> u64 {
        self.tip_ledger().balance(peer)
    }

    /// Returns `true` if the block is connected to genesis.
    pub fn is_connected(&self, id: BlockId) -> bool {
        self.blocks.contains_key(&id)
    }

    /// Connected block with the given id.
    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(&id)
    }

    /// Tip of the longest chain.
    pub fn tip(&self) -> &Block {
        &self.blocks[&self.tip]
    }

    pub fn tip_height(&self) -> u64 {
        self.tip().height
    }

    /// Number of connected blocks (including genesis).
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always `false`, genesis is known from the start.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of blocks waiting for their parent.
    pub fn orphans(&self) -> usize {
        self.orphaned.len()
    }

    /// Simulated time at which the block was received.
    pub fn arrival(&self, id: BlockId) -> Option<Duration> {
        self.arrivals.get(&id).copied()
    }

    /// Connected blocks in id order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    /// Connected children of a block, in the order they were connected.
    pub fn children(&self, id: BlockId) -> &[BlockId] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of connected blocks with more than one child.
    pub fn forks(&self) -> usize {
        self.children.values().filter(|c| c.len() > 1).count()
    }

    /// Add a block received at `arrival`.
    ///
    /// Returns `true` if the tip changed (either to this block or to a buffered descendant that
    /// it connected). Blocks that are already known are ignored. Use [View::is_rejected] to tell
    /// whether the block was found invalid.
    pub fn add_block(&mut self, block: Block, arrival: Duration) -> bool {
        if self.knows(block.id) {
            return false;
        }
        self.arrivals.insert(block.id, arrival);
        let Some(parent) = block.parent else {
            // Only genesis has no parent, and every view starts with it
            return false;
        };
        if self.rejected.contains(&parent) {
            debug!(block = block.id, parent, "rejected descendant of invalid block");
            self.reject(block.id);
            return false;
        }
        if !self.blocks.contains_key(&parent) {
            self.orphaned.insert(block.id);
            self.orphans.entry(parent).or_default().push(block);
            return false;
        }

        let previous = self.tip;
        let mut ready = VecDeque::from([(parent, block)]);
        while let Some((parent, block)) = ready.pop_front() {
            let id = block.id;
            if let Err(err) = self.connect(parent, block) {
                debug!(block = id, error = %err, "rejected invalid block");
                self.reject(id);
                continue;
            }
            if let Some(waiting) = self.orphans.remove(&id) {
                for orphan in waiting {
                    self.orphaned.remove(&orphan.id);
                    ready.push_back((id, orphan));
                }
            }
        }
        self.tip != previous
    }

    fn connect(&mut self, parent: BlockId, block: Block) -> Result<(), Error> {
        let ledger = self.ledgers[&parent].apply(&block, self.reward)?;
        self.ledgers.insert(block.id, ledger);
        self.children.entry(parent).or_default().push(block.id);
        if block.height > self.tip_height() {
            self.tip = block.id;
        }
        self.blocks.insert(block.id, block);
        Ok(())
    }

    /// Mark a block and all of its buffered descendants as rejected.
    fn reject(&mut self, id: BlockId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            self.rejected.insert(id);
            for orphan in self.orphans.remove(&id).unwrap_or_default() {
                self.orphaned.remove(&orphan.id);
                stack.push(orphan.id);
            }
        }
    }

    /// Walk from `id` back to genesis (inclusive on both ends).
    pub fn ancestors(&self, id: BlockId) -> Ancestors<'_> {
        Ancestors {
            view: self,
            next: Some(id),
        }
    }

    /// Block at `height` on the chain ending at `id`.
    pub fn ancestor_at(&self, id: BlockId, height: u64) -> Option<&Block> {
        self.ancestors(id)
            .find(|block| block.height <= height)
            .filter(|block| block.height == height)
    }

    /// Ids of the longest chain, from genesis to the tip.
    pub fn longest_chain(&self) -> Vec<BlockId> {
        let mut chain: Vec<_> = self.ancestors(self.tip).map(|block| block.id).collect();
        chain.reverse();
        chain
    }

    /// Most recent block shared by the chains ending at `a` and `b`.
    pub fn common_ancestor(&self, a: BlockId, b: BlockId) -> Option<BlockId> {
        let mut a = self.blocks.get(&a)?;
        let mut b = self.blocks.get(&b)?;
        while a.height > b.height {
            a = self.blocks.get(&a.parent?)?;
        }
        while b.height > a.height {
            b = self.blocks.get(&b.parent?)?;
        }
        while a.id != b.id {
            a = self.blocks.get(&a.parent?)?;
            b = self.blocks.get(&b.parent?)?;
        }
        Some(a.id)
    }
}

/// Iterator over a block and its ancestors, see [View::ancestors].
pub struct Ancestors<'a> {
    view: &'a View,
    next: Option<BlockId>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a Block;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.view.blocks.get(&self.next?)?;
        self.next = block.parent;
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Transaction, GENESIS};

    fn at(secs: u64) -> Duration {
        Duration::from_secs(secs)
    }

    /// A view of three peers holding 100 each, where blocks pay no reward.
    fn new_view() -> View {
        View::new(Block::genesis(), Ledger::new(3, 100), 0)
    }

    /// Build a chain of `length` blocks on top of `parent`, numbering ids from `first`.
    fn extend(parent: &Block, first: BlockId, length: usize, creator: u32) -> Vec<Block> {
        let mut blocks = Vec::with_capacity(length);
        let mut parent = parent.clone();
        for i in 0..length {
            let block = Block::child(first + i as u64, &parent, creator, at(i as u64), vec![], 0);
            parent = block.clone();
            blocks.push(block);
        }
        blocks
    }

    #[test]
    fn test_genesis_only() {
        let view = new_view();
        assert!(view.knows(GENESIS));
        assert_eq!(view.tip().id, GENESIS);
        assert_eq!(view.tip_height(), 0);
        assert_eq!(view.len(), 1);
        assert_eq!(view.longest_chain(), vec![GENESIS]);
    }

    #[test]
    fn test_extend_tip() {
        let mut view = new_view();
        let block = Block::child(1, &Block::genesis(), 0, at(10), vec![], 0);
        assert!(view.add_block(block.clone(), at(10)));
        assert_eq!(view.tip().id, 1);
        assert_eq!(view.tip_height(), 1);
        assert_eq!(view.arrival(1), Some(at(10)));

        // Duplicates are ignored
        assert!(!view.add_block(block, at(11)));
        assert_eq!(view.arrival(1), Some(at(10)));
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn test_tie_keeps_first_seen() {
        let genesis = Block::genesis();
        let mut view = new_view();
        let first = extend(&genesis, 1, 5, 0);
        let second = extend(&genesis, 100, 5, 1);
        for block in first {
            view.add_block(block, at(1));
        }
        assert_eq!(view.tip().id, 5);
        assert_eq!(view.tip_height(), 5);

        for block in second {
            assert!(!view.add_block(block, at(2)));
        }
        assert_eq!(view.tip().id, 5);
        assert_eq!(view.forks(), 1);
    }

    #[test]
    fn test_longer_branch_wins() {
        let genesis = Block::genesis();
        let mut view = new_view();
        for block in extend(&genesis, 1, 3, 0) {
            view.add_block(block, at(1));
        }
        let branch = extend(&genesis, 10, 4, 1);
        for block in &branch[..3] {
            assert!(!view.add_block(block.clone(), at(2)));
        }
        assert_eq!(view.tip().id, 3);
        assert!(view.add_block(branch[3].clone(), at(3)));
        assert_eq!(view.tip().id, 13);
        assert_eq!(view.longest_chain(), vec![GENESIS, 10, 11, 12, 13]);
        assert_eq!(view.common_ancestor(3, 13), Some(GENESIS));
    }

    #[test]
    fn test_lower_block_never_moves_tip() {
        let genesis = Block::genesis();
        let mut view = new_view();
        let main = extend(&genesis, 1, 4, 0);
        for block in main.iter().cloned() {
            view.add_block(block, at(1));
        }
        let stale = Block::child(50, &main[1], 2, at(5), vec![], 0);
        assert!(!view.add_block(stale, at(5)));
        assert_eq!(view.tip().id, 4);
        assert_eq!(view.common_ancestor(4, 50), Some(2));
    }

    #[test]
    fn test_orphans_connect_when_parent_arrives() {
        let genesis = Block::genesis();
        let mut view = new_view();
        let chain = extend(&genesis, 1, 3, 0);

        // Deliver the chain backwards
        assert!(!view.add_block(chain[2].clone(), at(1)));
        assert!(!view.add_block(chain[1].clone(), at(2)));
        assert!(view.knows(3));
        assert!(!view.is_connected(3));
        assert_eq!(view.orphans(), 2);
        assert_eq!(view.tip().id, GENESIS);

        assert!(view.add_block(chain[0].clone(), at(3)));
        assert_eq!(view.orphans(), 0);
        assert_eq!(view.tip().id, 3);
        assert_eq!(view.longest_chain(), vec![GENESIS, 1, 2, 3]);
        assert_eq!(view.arrival(3), Some(at(1)));
    }

    #[test]
    fn test_orphans_respect_first_seen() {
        let genesis = Block::genesis();
        let mut view = new_view();
        let parent = Block::child(1, &genesis, 0, at(0), vec![], 0);
        let a = Block::child(2, &parent, 0, at(0), vec![], 0);
        let b = Block::child(3, &parent, 1, at(0), vec![], 0);

        view.add_block(b, at(1));
        view.add_block(a, at(2));
        assert!(view.add_block(parent, at(3)));

        // Both children have the same height, the one received first wins
        assert_eq!(view.tip().id, 3);
        assert_eq!(view.children(1), &[3, 2]);
    }

    #[test]
    fn test_ancestors() {
        let genesis = Block::genesis();
        let mut view = new_view();
        for block in extend(&genesis, 1, 3, 0) {
            view.add_block(block, at(1));
        }
        let ids: Vec<_> = view.ancestors(3).map(|block| block.id).collect();
        assert_eq!(ids, vec![3, 2, 1, GENESIS]);
        assert_eq!(view.ancestors(99).count(), 0);
        assert_eq!(view.ancestor_at(3, 1).map(|block| block.id), Some(1));
        assert_eq!(view.ancestor_at(3, 3).map(|block| block.id), Some(3));
        assert!(view.ancestor_at(2, 3).is_none());
    }

    fn transfer(id: u64, sender: PeerId, amount: u64) -> Transaction {
        Transaction {
            id,
            sender,
            receiver: 2,
            amount,
            created: Duration::ZERO,
        }
    }

    #[test]
    fn test_ledger_follows_chain() {
        let genesis = Block::genesis();
        let mut view = View::new(genesis.clone(), Ledger::new(3, 100), 50);
        let block = Block::child(1, &genesis, 1, at(1), vec![transfer(1, 0, 30)], 50);
        assert!(view.add_block(block, at(1)));
        assert_eq!(view.tip_ledger().balances(), &[70, 150, 130]);
        assert_eq!(view.balance(1), 150);
        assert_eq!(view.ledger(GENESIS).unwrap().balances(), &[100, 100, 100]);
    }

    #[test]
    fn test_invalid_block_rejected() {
        let genesis = Block::genesis();
        let mut view = new_view();
        let overspend = Block::child(1, &genesis, 0, at(1), vec![transfer(1, 0, 101)], 0);
        let child = Block::child(2, &overspend, 0, at(2), vec![], 0);
        let grandchild = Block::child(3, &child, 0, at(3), vec![], 0);

        // A descendant buffered before the invalid block arrives is rejected with it
        assert!(!view.add_block(child, at(1)));
        assert_eq!(view.orphans(), 1);
        assert!(!view.add_block(overspend.clone(), at(2)));
        assert!(view.is_rejected(1));
        assert!(view.is_rejected(2));
        assert_eq!(view.orphans(), 0);

        // So is a descendant arriving later, and a rejected block is never reconsidered
        assert!(!view.add_block(grandchild, at(3)));
        assert!(view.is_rejected(3));
        assert!(view.knows(3));
        assert!(!view.add_block(overspend, at(4)));
        assert_eq!(view.rejected(), 3);
        assert_eq!(view.tip().id, GENESIS);
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn test_wrong_reward_rejected() {
        let genesis = Block::genesis();
        let mut view = View::new(genesis.clone(), Ledger::new(3, 0), 50);
        assert!(!view.add_block(Block::child(1, &genesis, 0, at(1), vec![], 500), at(1)));
        assert!(view.is_rejected(1));
        assert!(view.add_block(Block::child(2, &genesis, 0, at(2), vec![], 50), at(2)));
        assert_eq!(view.balance(0), 50);
    }

    #[test]
    fn test_valid_sibling_of_rejected_orphan() {
        let genesis = Block::genesis();
        let mut view = new_view();
        let parent = Block::child(1, &genesis, 0, at(0), vec![], 0);
        let invalid = Block::child(2, &parent, 0, at(0), vec![transfer(1, 1, 500)], 0);
        let valid = Block::child(3, &parent, 1, at(0), vec![transfer(2, 1, 100)], 0);
        view.add_block(invalid, at(1));
        view.add_block(valid, at(2));

        assert!(view.add_block(parent, at(3)));
        assert!(view.is_rejected(2));
        assert_eq!(view.tip().id, 3);
        assert_eq!(view.balance(1), 0);
    }
}
