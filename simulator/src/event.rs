//! Events processed by the simulation.

use crate::{Block, BlockId, PeerId, Transaction};
use std::fmt;

/// Discriminant of an [Event], used for logging and metrics labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    GenerateBlock,
    PropagateBlock,
    GenerateTransaction,
    PropagateTransaction,
}

impl Kind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GenerateBlock => "generate_block",
            Self::PropagateBlock => "propagate_block",
            Self::GenerateTransaction => "generate_transaction",
            Self::PropagateTransaction => "propagate_transaction",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that happens at a peer at a given simulated time.
///
/// The time itself is tracked by the [crate::clock::Clock] entry holding the event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// A mining attempt on top of `parent` completes at `peer`.
    GenerateBlock { peer: PeerId, parent: BlockId },

    /// `block` arrives at `to` from its neighbor `from`.
    PropagateBlock {
        from: PeerId,
        to: PeerId,
        block: Block,
    },

    /// `peer` creates a new transaction.
    GenerateTransaction { peer: PeerId },

    /// `transaction` arrives at `to` from its neighbor `from`.
    PropagateTransaction {
        from: PeerId,
        to: PeerId,
        transaction: Transaction,
    },
}

impl Event {
    pub fn kind(&self) -> Kind {
        match self {
            Self::GenerateBlock { .. } => Kind::GenerateBlock,
            Self::PropagateBlock { .. } => Kind::PropagateBlock,
            Self::GenerateTransaction { .. } => Kind::GenerateTransaction,
            Self::PropagateTransaction { .. } => Kind::PropagateTransaction,
        }
    }

    /// Peer acting on or forwarding the payload.
    pub fn origin(&self) -> PeerId {
        match self {
            Self::GenerateBlock { peer, .. } | Self::GenerateTransaction { peer } => *peer,
            Self::PropagateBlock { from, .. } | Self::PropagateTransaction { from, .. } => *from,
        }
    }

    /// Peer processing the event (same as [Event::origin] for generate events).
    pub fn target(&self) -> PeerId {
        match self {
            Self::GenerateBlock { peer, .. } | Self::GenerateTransaction { peer } => *peer,
            Self::PropagateBlock { to, .. } | Self::PropagateTransaction { to, .. } => *to,
        }
    }

    /// Returns `true` for events that deliver a message between peers.
    pub fn is_propagation(&self) -> bool {
        matches!(
            self,
            Self::PropagateBlock { .. } | Self::PropagateTransaction { .. }
        )
    }
}
