//! Identifiers and immutable records shared by every peer.

use serde::Serialize;
use std::{fmt, time::Duration};

/// Index of a peer in the simulated network (dense, starting at 0).
pub type PeerId = u32;

/// Identifier of a block (unique for the duration of a run).
pub type BlockId = u64;

/// Identifier of a transaction (unique for the duration of a run).
pub type TransactionId = u64;

/// Identifier of the genesis block, known to every peer before the run starts.
pub const GENESIS: BlockId = 0;

/// Size of a transaction on the wire (8 kbit).
pub const TRANSACTION_SIZE_BITS: u64 = 8_000;

/// Network speed class of a peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Speed {
    Slow,
    Fast,
}

/// Compute tier of a peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Tier {
    Low,
    High,
}

impl Tier {
    /// Relative hashing power of the tier (before normalization across peers).
    pub const fn hash_power(&self) -> f64 {
        match self {
            Self::Low => 1.0,
            Self::High => 10.0,
        }
    }
}

/// A transfer created by one peer and flooded to the rest of the network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub id: TransactionId,
    pub sender: PeerId,
    pub receiver: PeerId,
    pub amount: u64,
    pub created: Duration,
}

impl Transaction {
    /// Size of the transaction on the wire.
    pub const fn size_bits(&self) -> u64 {
        TRANSACTION_SIZE_BITS
    }
}

/// A block mined by some peer on top of `parent`.
///
/// Blocks reference their parent by id. Each peer keeps its own copy of every block it
/// knows about, so there is never any shared mutable state between views.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub id: BlockId,

    /// `None` only for the genesis block.
    pub parent: Option<BlockId>,

    /// `None` only for the genesis block.
    pub creator: Option<PeerId>,

    pub created: Duration,
    pub height: u64,
    pub transactions: Vec<Transaction>,

    /// Coinbase amount credited to `creator` (0 for the genesis block).
    pub reward: u64,
}

impl Block {
    /// The genesis block shared (by value) by every peer.
    pub const fn genesis() -> Self {
        Self {
            id: GENESIS,
            parent: None,
            creator: None,
            created: Duration::ZERO,
            height: 0,
            transactions: Vec::new(),
            reward: 0,
        }
    }

    /// Create a block that extends `parent`.
    pub fn child(
        id: BlockId,
        parent: &Block,
        creator: PeerId,
        created: Duration,
        transactions: Vec<Transaction>,
        reward: u64,
    ) -> Self {
        Self {
            id,
            parent: Some(parent.id),
            creator: Some(creator),
            created,
            height: parent.height + 1,
            transactions,
            reward,
        }
    }

    /// Ids of the included transactions, in block order.
    pub fn transaction_ids(&self) -> impl Iterator<Item = TransactionId> + '_ {
        self.transactions.iter().map(|transaction| transaction.id)
    }

    /// Size of the block on the wire.
    ///
    /// Every block carries one slot of overhead (coinbase and header) in addition to its
    /// transactions.
    pub fn size_bits(&self) -> u64 {
        (self.transactions.len() as u64 + 1) * TRANSACTION_SIZE_BITS
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block({}@{})", self.id, self.height)
    }
}
