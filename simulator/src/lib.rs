//! Simulate block and transaction propagation in a peer-to-peer cryptocurrency network.
//!
//! Peers are connected by a random (or provided) topology whose degrees lie in a configured
//! range. Each peer creates transactions, mines blocks with a delay proportional to its share of
//! the network's hashing power and floods everything it learns to its neighbors. Messages travel
//! over links with a fixed propagation delay, a transmission delay that depends on the speed of
//! both endpoints and a random queuing delay.
//!
//! Blocks move coins: each one pays its creator a fixed reward and may only include transfers
//! its senders can afford according to the [ledger::Ledger] of its parent. Blocks that break
//! this rule are rejected by every peer that receives them.
//!
//! The simulation runs on logical time: a single [clock::Clock] orders every pending event and
//! a single seeded random number generator drives every random choice, so a run is fully
//! reproducible from its [Config] and [topology::Topology].
//!
//! # Example
//!
//! ```rust
//! use chainsim_simulator::{Config, Limit, Simulation};
//! use std::time::Duration;
//!
//! let cfg = Config {
//!     seed: 42,
//!     block_interval: Duration::from_secs(60),
//!     ..Config::default()
//! };
//! let mut simulation = Simulation::generate(cfg, 10).unwrap();
//! let summary = simulation.run(Limit::Horizon(Duration::from_secs(600)));
//! assert_eq!(summary.peers.len(), 10);
//! ```

use thiserror::Error;

pub mod chain;
pub mod clock;
pub mod event;
pub mod latency;
pub mod ledger;
pub mod mempool;
pub mod metrics;
pub mod peer;
pub mod simulation;
pub mod summary;
pub mod topology;
mod types;

pub use simulation::{Config, Limit, Simulation};
pub use summary::{PeerSummary, Summary};
pub use types::*;

/// Errors that can occur when building a simulation or validating a block.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no valid topology for {peers} peers after {attempts} attempts")]
    GraphInfeasible { peers: usize, attempts: usize },
    #[error("unknown peer: {0}")]
    UnknownPeer(PeerId),
    #[error("peer linked to itself: {0}")]
    SelfLoop(PeerId),
    #[error("topology is not connected")]
    Disconnected,
    #[error("invalid degree bounds: [{0}, {1}]")]
    InvalidDegreeBounds(usize, usize),
    #[error("fraction must be in [0, 1]: {0}")]
    InvalidFraction(f64),
    #[error("{0} must be positive")]
    InvalidInterval(&'static str),
    #[error("invalid {0} range")]
    InvalidRange(&'static str),
    #[error("expected {expected} peers, got {actual}")]
    PeerCountMismatch { expected: usize, actual: usize },
    #[error("block {block} pays a reward of {actual}, expected {expected}")]
    InvalidReward {
        block: BlockId,
        expected: u64,
        actual: u64,
    },
    #[error("peer {peer} spends more than its balance of {balance} in block {block}")]
    Overspend {
        block: BlockId,
        peer: PeerId,
        balance: u64,
    },
}
