//! Compute how long a message takes to cross a single link.
//!
//! The delay of a message from `i` to `j` is `p_ij + |m| / c_ij + d_ij` where:
//!
//! * `p_ij` is a propagation delay sampled once per ordered pair of neighbors,
//! * `|m| / c_ij` is the transmission time of the message over the link bandwidth (fast only
//!   when both endpoints are fast),
//! * `d_ij` is a queuing delay sampled for every message from an exponential distribution
//!   whose mean shrinks as the bandwidth grows.
//!
//! The result is only ever added to the current simulated time when scheduling a delivery.
//! Delays too large to represent saturate at [Duration::MAX].

use crate::{clock::saturating_secs, topology::Topology, Error, PeerId, Speed};
use rand::Rng;
use rand_distr::Exp1;
use std::{collections::BTreeMap, time::Duration};

/// Configuration for [Latency].
#[derive(Clone, Debug)]
pub struct Config {
    /// Lower bound of the per-link propagation delay.
    pub min_propagation: Duration,

    /// Upper bound of the per-link propagation delay.
    pub max_propagation: Duration,

    /// Bandwidth (bits per second) of a link between two fast peers.
    pub fast_bandwidth: u64,

    /// Bandwidth (bits per second) of any link with a slow endpoint.
    pub slow_bandwidth: u64,

    /// Mean queuing delay expressed as bits waiting ahead of a message (0 disables queuing).
    pub queuing_bits: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_propagation: Duration::from_millis(10),
            max_propagation: Duration::from_millis(500),
            fast_bandwidth: 100_000_000,
            slow_bandwidth: 5_000_000,
            queuing_bits: 96_000,
        }
    }
}

impl Config {
    /// Bandwidth of a link between peers of the given speeds (slow dominates).
    pub fn bandwidth(&self, sender: Speed, receiver: Speed) -> u64 {
        match (sender, receiver) {
            (Speed::Fast, Speed::Fast) => self.fast_bandwidth,
            _ => self.slow_bandwidth,
        }
    }

    fn validate(&self) -> Result<(), Error> {
        if self.min_propagation > self.max_propagation {
            return Err(Error::InvalidRange("propagation delay"));
        }
        if self.fast_bandwidth == 0 || self.slow_bandwidth == 0 {
            return Err(Error::InvalidRange("bandwidth"));
        }
        Ok(())
    }
}

/// Per-link delay model for a fixed topology.
pub struct Latency {
    cfg: Config,
    speeds: Vec<Speed>,
    propagation: BTreeMap<(PeerId, PeerId), Duration>,
}

impl Latency {
    /// Sample the propagation delay of every ordered pair of neighbors in `topology`.
    pub fn new<R: Rng>(
        rng: &mut R,
        topology: &Topology,
        speeds: Vec<Speed>,
        cfg: Config,
    ) -> Result<Self, Error> {
        cfg.validate()?;
        if speeds.len() != topology.peers() {
            return Err(Error::PeerCountMismatch {
                expected: topology.peers(),
                actual: speeds.len(),
            });
        }
        let mut propagation = BTreeMap::new();
        for (u, v) in topology.edges() {
            for pair in [(u, v), (v, u)] {
                let delay = rng.gen_range(cfg.min_propagation..=cfg.max_propagation);
                propagation.insert(pair, delay);
            }
        }
        Ok(Self {
            cfg,
            speeds,
            propagation,
        })
    }

    /// Fixed propagation delay from `from` to `to` (`None` if they are not neighbors).
    pub fn propagation(&self, from: PeerId, to: PeerId) -> Option<Duration> {
        self.propagation.get(&(from, to)).copied()
    }

    /// Bandwidth (bits per second) of the link between `from` and `to`.
    pub fn bandwidth(&self, from: PeerId, to: PeerId) -> Option<u64> {
        let sender = *self.speeds.get(from as usize)?;
        let receiver = *self.speeds.get(to as usize)?;
        Some(self.cfg.bandwidth(sender, receiver))
    }

    /// Time to push `size_bits` onto the link between `from` and `to`.
    pub fn transmission(&self, from: PeerId, to: PeerId, size_bits: u64) -> Option<Duration> {
        let bandwidth = self.bandwidth(from, to)?;
        Some(saturating_secs(size_bits as f64 / bandwidth as f64))
    }

    /// Sample the total delay of a `size_bits` message from `from` to `to`.
    ///
    /// Returns `None` if the peers are not neighbors.
    pub fn delay<R: Rng>(
        &self,
        rng: &mut R,
        from: PeerId,
        to: PeerId,
        size_bits: u64,
    ) -> Option<Duration> {
        let propagation = self.propagation(from, to)?;
        let bandwidth = self.bandwidth(from, to)?;
        let transmission = saturating_secs(size_bits as f64 / bandwidth as f64);
        let queuing = if self.cfg.queuing_bits == 0 {
            Duration::ZERO
        } else {
            let mean = self.cfg.queuing_bits as f64 / bandwidth as f64;
            let sample: f64 = rng.sample(Exp1);
            saturating_secs(mean * sample)
        };
        Some(
            propagation
                .saturating_add(transmission)
                .saturating_add(queuing),
        )
    }
}
