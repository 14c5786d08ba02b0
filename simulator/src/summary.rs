//! Per-peer statistics reported at the end of a run.

use crate::{peer::Peer, BlockId, PeerId, Speed, Tier};
use serde::Serialize;
use std::{collections::BTreeMap, time::Duration};

/// State of one peer when the run stopped.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PeerSummary {
    pub peer: PeerId,
    pub speed: Speed,
    pub tier: Tier,
    pub weight: f64,

    pub tip: BlockId,
    pub tip_height: u64,

    /// Blocks connected to genesis in this peer's view (genesis included).
    pub blocks_known: usize,

    /// Blocks still waiting for their parent.
    pub orphans: usize,

    /// Blocks that failed validation (or descend from one that did).
    pub blocks_rejected: usize,

    /// Blocks in the view with more than one child.
    pub forks: usize,

    /// Blocks on this peer's longest chain (genesis included).
    pub blocks_in_chain: u64,

    /// Blocks this peer created.
    pub blocks_mined: u64,

    /// Blocks created by this peer that are part of its own longest chain.
    pub mined_in_chain: u64,

    /// Transactions waiting to be mined.
    pub pending_transactions: usize,

    /// Balance of this peer at its own tip.
    pub balance: u64,
}

/// Outcome of a run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Summary {
    /// Simulated time of the last dispatched event.
    #[serde(serialize_with = "seconds")]
    pub time: Duration,

    /// Number of events dispatched.
    pub events: u64,

    pub peers: Vec<PeerSummary>,
}

impl Summary {
    pub(crate) fn collect(time: Duration, events: u64, peers: &[Peer]) -> Self {
        let peers = peers
            .iter()
            .map(|peer| {
                let view = &peer.view;
                let tip = view.tip();
                let mined_in_chain = view
                    .ancestors(tip.id)
                    .filter(|block| block.creator == Some(peer.id))
                    .count() as u64;
                PeerSummary {
                    peer: peer.id,
                    speed: peer.speed,
                    tier: peer.tier,
                    weight: peer.weight,
                    tip: tip.id,
                    tip_height: tip.height,
                    blocks_known: view.len(),
                    orphans: view.orphans(),
                    blocks_rejected: view.rejected(),
                    forks: view.forks(),
                    blocks_in_chain: tip.height + 1,
                    blocks_mined: peer.mined,
                    mined_in_chain,
                    pending_transactions: peer.mempool.len(),
                    balance: view.balance(peer.id),
                }
            })
            .collect();
        Self {
            time,
            events,
            peers,
        }
    }

    /// Highest tip among all peers.
    pub fn max_height(&self) -> u64 {
        self.peers
            .iter()
            .map(|peer| peer.tip_height)
            .max()
            .unwrap_or(0)
    }

    /// Total number of blocks created.
    pub fn blocks_mined(&self) -> u64 {
        self.peers.iter().map(|peer| peer.blocks_mined).sum()
    }

    /// Returns `true` if every peer has the same tip.
    pub fn converged(&self) -> bool {
        self.peers.windows(2).all(|pair| pair[0].tip == pair[1].tip)
    }

    /// Number of peers per tip.
    pub fn tips(&self) -> BTreeMap<BlockId, usize> {
        let mut tips = BTreeMap::new();
        for peer in &self.peers {
            *tips.entry(peer.tip).or_insert(0) += 1;
        }
        tips
    }
}

fn seconds<S: serde::Serializer>(time: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(time.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{chain::View, ledger::Ledger, Block, GENESIS};

    fn peer(id: PeerId, tier: Tier) -> Peer {
        let view = View::new(Block::genesis(), Ledger::new(2, 10), 5);
        Peer::new(id, Speed::Fast, tier, 0.5, view)
    }

    #[test]
    fn test_collect() {
        let genesis = Block::genesis();
        let mut a = peer(0, Tier::High);
        let mut b = peer(1, Tier::Low);

        let first = Block::child(1, &genesis, 0, Duration::from_secs(1), vec![], 5);
        let second = Block::child(2, &first, 1, Duration::from_secs(2), vec![], 5);
        let fork = Block::child(3, &genesis, 1, Duration::from_secs(2), vec![], 5);
        a.mined = 1;
        b.mined = 2;
        for block in [first.clone(), second.clone(), fork] {
            a.view.add_block(block.clone(), block.created);
            b.view.add_block(block.clone(), block.created);
        }

        let summary = Summary::collect(Duration::from_millis(2_500), 10, &[a, b]);
        assert_eq!(summary.events, 10);
        assert_eq!(summary.max_height(), 2);
        assert_eq!(summary.blocks_mined(), 3);
        assert!(summary.converged());
        assert_eq!(summary.tips(), BTreeMap::from([(2, 2)]));

        let a = &summary.peers[0];
        assert_eq!(a.tip, 2);
        assert_eq!(a.blocks_known, 4);
        assert_eq!(a.forks, 1);
        assert_eq!(a.blocks_in_chain, 3);
        assert_eq!(a.mined_in_chain, 1);
        assert_eq!(a.balance, 15);
        assert_eq!(a.blocks_rejected, 0);
        let b = &summary.peers[1];
        assert_eq!(b.mined_in_chain, 1);
        assert_eq!(b.balance, 15);
        assert_eq!(b.tier, Tier::Low);
    }

    #[test]
    fn test_diverged() {
        let genesis = Block::genesis();
        let mut a = peer(0, Tier::High);
        let b = peer(1, Tier::High);
        let block = Block::child(1, &genesis, 0, Duration::ZERO, vec![], 5);
        a.view.add_block(block, Duration::ZERO);
        let summary = Summary::collect(Duration::ZERO, 0, &[a, b]);
        assert!(!summary.converged());
        assert_eq!(summary.tips(), BTreeMap::from([(1, 1), (GENESIS, 1)]));
    }

    #[test]
    fn test_serialize() {
        let summary = Summary::collect(Duration::from_millis(1_500), 3, &[peer(0, Tier::Low)]);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["time"], 1.5);
        assert_eq!(json["events"], 3);
        assert_eq!(json["peers"][0]["speed"], "Fast");
        assert_eq!(json["peers"][0]["tier"], "Low");
        assert_eq!(json["peers"][0]["tip_height"], 0);
        assert_eq!(json["peers"][0]["balance"], 10);
    }
}
