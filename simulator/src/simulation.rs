//! Dispatch events until the simulation reaches its limit.
//!
//! Every peer starts with one pending transaction and one pending mining attempt. Processing an
//! event may schedule more events (propagation to neighbors, the next transaction, the next
//! mining attempt). Nothing is ever removed from the clock: stale mining attempts and duplicate
//! deliveries are recognized when they are popped and ignored.
//!
//! Transaction amounts are bounded by the sender's balance at its own tip, and received blocks
//! that fail validation are dropped without being forwarded.

use crate::{
    chain::View,
    clock::{saturating_secs, Clock},
    event::{Event, Kind},
    latency::{self, Latency},
    ledger::Ledger,
    metrics::{self, Metrics},
    peer::{self, Peer},
    summary::Summary,
    topology::{self, Topology},
    Block, BlockId, Error, PeerId, Transaction, TransactionId,
};
use prometheus_client::{encoding::text::encode, registry::Registry};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::Exp1;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Configuration for a [Simulation].
#[derive(Clone, Debug)]
pub struct Config {
    /// Seed for the random number generator (the only source of randomness).
    pub seed: u64,

    /// Fraction of peers with a slow network connection.
    pub slow_fraction: f64,

    /// Fraction of peers with low hashing power.
    pub low_fraction: f64,

    /// Mean time between two transactions created by the same peer.
    pub transaction_interval: Duration,

    /// Mean time between two blocks across the whole network.
    ///
    /// Each peer mines with mean `block_interval / weight`, where the weights of all peers sum
    /// to 1.
    pub block_interval: Duration,

    /// Balance of every peer in the genesis block.
    pub initial_balance: u64,

    /// Coinbase paid to the creator of every block.
    pub mining_reward: u64,

    /// Maximum number of transactions included in a block.
    pub max_block_transactions: usize,

    /// Keep delivering in-flight blocks and transactions after the horizon is reached (new
    /// blocks and transactions are no longer generated).
    pub drain: bool,

    pub topology: topology::Config,
    pub latency: latency::Config,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed: 0,
            slow_fraction: 0.5,
            low_fraction: 0.5,
            transaction_interval: Duration::from_secs(10),
            block_interval: Duration::from_secs(600),
            initial_balance: 100,
            mining_reward: 50,
            max_block_transactions: 999,
            drain: true,
            topology: topology::Config::default(),
            latency: latency::Config::default(),
        }
    }
}

impl Config {
    fn validate(&self) -> Result<(), Error> {
        if self.transaction_interval.is_zero() {
            return Err(Error::InvalidInterval("transaction interval"));
        }
        if self.block_interval.is_zero() {
            return Err(Error::InvalidInterval("block interval"));
        }
        Ok(())
    }
}

/// When [Simulation::run] stops.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Limit {
    /// Dispatch every event scheduled at or before the given time.
    Horizon(Duration),

    /// Dispatch at most the given number of events.
    Events(usize),
}

/// Discrete-event simulation of a peer-to-peer cryptocurrency network.
pub struct Simulation {
    cfg: Config,
    rng: StdRng,
    topology: Topology,
    latency: Latency,
    peers: Vec<Peer>,
    clock: Clock<Event>,

    next_block: BlockId,
    next_transaction: TransactionId,
    processed: u64,

    registry: Registry,
    metrics: Metrics,
}

impl Simulation {
    /// Create a simulation over a given topology.
    pub fn new(cfg: Config, topology: Topology) -> Result<Self, Error> {
        let rng = StdRng::seed_from_u64(cfg.seed);
        Self::init(cfg, topology, rng)
    }

    /// Create a simulation over a randomly generated topology of `peers` peers.
    pub fn generate(cfg: Config, peers: usize) -> Result<Self, Error> {
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let topology = Topology::generate(&mut rng, peers, &cfg.topology)?;
        Self::init(cfg, topology, rng)
    }

    fn init(cfg: Config, topology: Topology, mut rng: StdRng) -> Result<Self, Error> {
        cfg.validate()?;
        let count = topology.peers();
        let classes = peer::classify(&mut rng, count, cfg.slow_fraction, cfg.low_fraction)?;
        let (speeds, tiers): (Vec<_>, Vec<_>) = classes.into_iter().unzip();
        let weights = peer::weights(&tiers);
        let latency = Latency::new(&mut rng, &topology, speeds.clone(), cfg.latency.clone())?;

        let genesis = Block::genesis();
        let ledger = Ledger::new(count, cfg.initial_balance);
        let peers = (0..count)
            .map(|i| {
                let view = View::new(genesis.clone(), ledger.clone(), cfg.mining_reward);
                Peer::new(i as PeerId, speeds[i], tiers[i], weights[i], view)
            })
            .collect();

        let mut registry = Registry::default();
        let metrics = Metrics::init(&mut registry);
        let mut simulation = Self {
            cfg,
            rng,
            topology,
            latency,
            peers,
            clock: Clock::new(),
            next_block: genesis.id + 1,
            next_transaction: 1,
            processed: 0,
            registry,
            metrics,
        };
        for peer in 0..count as PeerId {
            simulation.schedule_transaction(peer);
            simulation.schedule_mining(peer);
        }
        info!(
            peers = count,
            edges = simulation.topology.edges().len(),
            seed = simulation.cfg.seed,
            "initialized simulation"
        );
        Ok(simulation)
    }

    /// Dispatch events until `limit` is reached and summarize the state of every peer.
    ///
    /// With [Limit::Horizon] and draining enabled, all in-flight messages are delivered after
    /// the horizon and the clock is left empty (later calls have nothing left to dispatch).
    pub fn run(&mut self, limit: Limit) -> Summary {
        match limit {
            Limit::Events(budget) => {
                for _ in 0..budget {
                    if self.step().is_none() {
                        break;
                    }
                }
            }
            Limit::Horizon(horizon) => {
                while self.clock.peek_time().is_some_and(|time| time <= horizon) {
                    self.step();
                }
                if self.cfg.drain {
                    self.drain();
                }
            }
        }
        info!(
            now = ?self.clock.now(),
            processed = self.processed,
            pending = self.clock.len(),
            "simulation stopped"
        );
        self.summary()
    }

    /// Dispatch the next event, returning its time and kind.
    pub fn step(&mut self) -> Option<(Duration, Kind)> {
        let (now, event) = self.clock.next()?;
        let kind = event.kind();
        self.dispatch(now, event);
        Some((now, kind))
    }

    /// Deliver every pending message while discarding generate events.
    fn drain(&mut self) {
        while let Some((now, event)) = self.clock.next() {
            if event.is_propagation() {
                self.dispatch(now, event);
            } else {
                trace!(kind = %event.kind(), peer = event.target(), "discarding after horizon");
            }
        }
    }

    /// Insert an event into the clock.
    ///
    /// # Panics
    ///
    /// Panics if `time` is before [Simulation::now].
    pub fn schedule(&mut self, time: Duration, event: Event) {
        self.clock.schedule(time, event);
    }

    fn dispatch(&mut self, now: Duration, event: Event) {
        let kind = event.kind();
        let target = event.target();
        if target as usize >= self.peers.len() {
            warn!(%kind, target, "skipping event for unknown peer");
            self.metrics.events_skipped.inc();
            return;
        }
        self.processed += 1;
        self.metrics.events.get_or_create(&metrics::Event::new(kind)).inc();
        trace!(%kind, origin = event.origin(), target, ?now, "dispatching event");

        match event {
            Event::GenerateTransaction { peer } => self.generate_transaction(peer),
            Event::PropagateTransaction {
                from,
                to,
                transaction,
            } => self.receive_transaction(from, to, transaction),
            Event::GenerateBlock { peer, parent } => self.generate_block(peer, parent),
            Event::PropagateBlock { from, to, block } => self.receive_block(from, to, block),
        }
    }

    fn generate_transaction(&mut self, peer: PeerId) {
        let balance = self.peers[peer as usize].view.balance(peer);
        if balance == 0 {
            trace!(peer, "skipping transaction without balance");
            self.metrics.transactions_skipped.inc();
            self.schedule_transaction(peer);
            return;
        }

        let id = self.next_transaction;
        self.next_transaction += 1;
        let others = self.peers.len() as PeerId - 1;
        let receiver = if others == 0 {
            peer
        } else {
            let receiver = self.rng.gen_range(0..others);
            if receiver >= peer {
                receiver + 1
            } else {
                receiver
            }
        };
        let transaction = Transaction {
            id,
            sender: peer,
            receiver,
            amount: self.rng.gen_range(1..=balance),
            created: self.clock.now(),
        };
        trace!(peer, transaction = id, receiver, "generated transaction");
        self.metrics.transactions_generated.inc();
        self.peers[peer as usize].mempool.insert(transaction.clone());
        self.broadcast_transaction(peer, None, &transaction);
        self.schedule_transaction(peer);
    }

    fn receive_transaction(&mut self, from: PeerId, to: PeerId, transaction: Transaction) {
        if !self.peers[to as usize].mempool.insert(transaction.clone()) {
            trace!(peer = to, transaction = transaction.id, "ignoring seen transaction");
            self.metrics.transactions_duplicate.inc();
            return;
        }
        self.metrics.transactions_received.inc();
        self.broadcast_transaction(to, Some(from), &transaction);
    }

    fn generate_block(&mut self, peer: PeerId, parent: BlockId) {
        let state = &mut self.peers[peer as usize];
        if state.mining != Some(parent) {
            trace!(peer, parent, mining = ?state.mining, "discarding stale mining attempt");
            self.metrics.blocks_stale.inc();
            return;
        }

        let id = self.next_block;
        self.next_block += 1;
        let now = self.clock.now();
        let transactions = state
            .mempool
            .select(self.cfg.max_block_transactions, state.view.tip_ledger());
        let reward = self.cfg.mining_reward;
        let block = Block::child(id, state.view.tip(), peer, now, transactions, reward);
        if !state.view.add_block(block.clone(), now) {
            warn!(peer, block = id, "discarding block rejected by its creator");
            self.schedule_mining(peer);
            return;
        }
        state.mined += 1;
        debug!(
            peer,
            block = id,
            height = block.height,
            transactions = block.transactions.len(),
            "mined block"
        );
        self.metrics.blocks_mined.inc();
        self.reorganize(peer, parent);
        self.broadcast_block(peer, None, &block);
        self.schedule_mining(peer);
    }

    fn receive_block(&mut self, from: PeerId, to: PeerId, block: Block) {
        let state = &mut self.peers[to as usize];
        if state.view.knows(block.id) {
            trace!(peer = to, block = block.id, "ignoring known block");
            self.metrics.blocks_duplicate.inc();
            return;
        }
        let previous = state.view.tip().id;
        let orphaned = block
            .parent
            .is_some_and(|parent| !state.view.is_connected(parent));
        let moved = state.view.add_block(block.clone(), self.clock.now());
        if state.view.is_rejected(block.id) {
            debug!(peer = to, block = block.id, "dropping invalid block");
            self.metrics.blocks_invalid.inc();
            return;
        }
        self.metrics.blocks_received.inc();
        if orphaned {
            trace!(peer = to, block = block.id, "buffered orphan block");
            self.metrics.blocks_orphaned.inc();
        }
        if moved {
            let tip = state.view.tip();
            debug!(peer = to, tip = tip.id, height = tip.height, "adopted new tip");
            self.metrics.tip_changes.inc();
            self.reorganize(to, previous);
            self.schedule_mining(to);
        }
        self.broadcast_block(to, Some(from), &block);
    }

    /// Move transactions between the pending and confirmed sets after the tip of `peer`
    /// moved away from `previous`.
    fn reorganize(&mut self, peer: PeerId, previous: BlockId) {
        let Peer { view, mempool, .. } = &mut self.peers[peer as usize];
        let current = view.tip().id;
        let Some(ancestor) = view.common_ancestor(previous, current) else {
            return;
        };
        let collect = |from: BlockId| -> Vec<TransactionId> {
            view.ancestors(from)
                .take_while(|block| block.id != ancestor)
                .flat_map(Block::transaction_ids)
                .collect()
        };
        let abandoned = collect(previous);
        let adopted = collect(current);
        if !abandoned.is_empty() {
            debug!(peer, restored = abandoned.len(), "switched branch");
        }
        mempool.restore(abandoned);
        mempool.confirm(adopted);
    }

    /// Start a new mining attempt on the current tip of `peer`.
    fn schedule_mining(&mut self, peer: PeerId) {
        let state = &mut self.peers[peer as usize];
        let parent = state.view.tip().id;
        state.mining = Some(parent);
        let mean = self.cfg.block_interval.as_secs_f64() / state.weight;
        let delay = exponential(&mut self.rng, mean);
        self.clock
            .schedule_after(delay, Event::GenerateBlock { peer, parent });
    }

    fn schedule_transaction(&mut self, peer: PeerId) {
        let mean = self.cfg.transaction_interval.as_secs_f64();
        let delay = exponential(&mut self.rng, mean);
        self.clock
            .schedule_after(delay, Event::GenerateTransaction { peer });
    }

    fn broadcast_transaction(
        &mut self,
        peer: PeerId,
        skip: Option<PeerId>,
        transaction: &Transaction,
    ) {
        self.broadcast(peer, skip, transaction.size_bits(), |from, to| {
            Event::PropagateTransaction {
                from,
                to,
                transaction: transaction.clone(),
            }
        });
    }

    fn broadcast_block(&mut self, peer: PeerId, skip: Option<PeerId>, block: &Block) {
        self.broadcast(peer, skip, block.size_bits(), |from, to| Event::PropagateBlock {
            from,
            to,
            block: block.clone(),
        });
    }

    /// Schedule delivery of a message from `peer` to each of its neighbors except `skip`.
    fn broadcast<F>(&mut self, peer: PeerId, skip: Option<PeerId>, size_bits: u64, message: F)
    where
        F: Fn(PeerId, PeerId) -> Event,
    {
        let now = self.clock.now();
        for &neighbor in self.topology.neighbors(peer) {
            if Some(neighbor) == skip {
                continue;
            }
            let Some(delay) = self.latency.delay(&mut self.rng, peer, neighbor, size_bits) else {
                warn!(peer, neighbor, "missing link");
                continue;
            };
            self.clock
                .schedule(now.saturating_add(delay), message(peer, neighbor));
        }
    }

    /// Summarize the current state of every peer.
    pub fn summary(&self) -> Summary {
        Summary::collect(self.clock.now(), self.processed, &self.peers)
    }

    /// Current simulated time (timestamp of the last dispatched event).
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Number of events waiting in the clock.
    pub fn pending(&self) -> usize {
        self.clock.len()
    }

    /// Number of events dispatched so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn peer(&self, id: PeerId) -> Option<&Peer> {
        self.peers.get(id as usize)
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn latency(&self) -> &Latency {
        &self.latency
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Render all metrics in the Prometheus text format.
    pub fn encode_metrics(&self) -> String {
        let mut buffer = String::new();
        // Writing into a String cannot fail
        let _ = encode(&mut buffer, &self.registry);
        buffer
    }
}

/// Sample an exponentially distributed delay with the given mean (in seconds).
fn exponential<R: Rng>(rng: &mut R, mean: f64) -> Duration {
    let sample: f64 = rng.sample(Exp1);
    saturating_secs(mean * sample)
}
