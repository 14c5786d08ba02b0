//! Generate a random connected network where every peer has a bounded number of neighbors.
//!
//! Generation repeatedly samples a degree for each peer, rejects sequences that no simple graph
//! can realize (Erdős–Gallai), realizes the remaining ones with Havel–Hakimi, scrambles the
//! result with degree-preserving edge swaps and finally keeps the graph only if it is connected.
//! The number of attempts is bounded so that infeasible requests fail instead of spinning.

use crate::{Error, PeerId};
use rand::Rng;
use std::collections::BTreeSet;
use tracing::{debug, trace};

/// Configuration for [Topology::generate].
#[derive(Clone, Debug)]
pub struct Config {
    /// Minimum number of neighbors of every peer.
    pub min_degree: usize,

    /// Maximum number of neighbors of every peer.
    ///
    /// Clamped to `peers - 1` for small networks.
    pub max_degree: usize,

    /// Number of degree sequences to try before giving up.
    pub max_attempts: usize,

    /// Number of double-edge swaps attempted per edge of the realized graph.
    pub swaps_per_edge: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_degree: 3,
            max_degree: 6,
            max_attempts: 1_000,
            swaps_per_edge: 10,
        }
    }
}

/// Undirected network graph stored as sorted adjacency lists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topology {
    neighbors: Vec<Vec<PeerId>>,
}

impl Topology {
    /// Generate a random connected topology over `peers` peers.
    pub fn generate<R: Rng>(rng: &mut R, peers: usize, cfg: &Config) -> Result<Self, Error> {
        if cfg.min_degree == 0 || cfg.min_degree > cfg.max_degree {
            return Err(Error::InvalidDegreeBounds(cfg.min_degree, cfg.max_degree));
        }
        if peers <= cfg.min_degree {
            return Err(Error::GraphInfeasible { peers, attempts: 0 });
        }
        let max_degree = cfg.max_degree.min(peers - 1);

        for attempt in 1..=cfg.max_attempts {
            let degrees: Vec<usize> = (0..peers)
                .map(|_| rng.gen_range(cfg.min_degree..=max_degree))
                .collect();
            if !erdos_gallai(&degrees) {
                trace!(attempt, "degree sequence is not graphical");
                continue;
            }
            let Some(mut adjacency) = havel_hakimi(&degrees) else {
                trace!(attempt, "failed to realize degree sequence");
                continue;
            };
            let edges = adjacency.iter().map(BTreeSet::len).sum::<usize>() / 2;
            scramble(rng, &mut adjacency, edges * cfg.swaps_per_edge);
            let topology = Self::from_adjacency(adjacency);
            if !topology.is_connected() {
                trace!(attempt, "topology is not connected");
                continue;
            }
            debug!(peers, attempt, edges, "generated topology");
            return Ok(topology);
        }
        Err(Error::GraphInfeasible {
            peers,
            attempts: cfg.max_attempts,
        })
    }

    /// Build a topology from an explicit list of undirected edges.
    ///
    /// Duplicate edges are merged. Degree bounds are not enforced, but the resulting graph
    /// must be connected.
    pub fn from_edges<I>(peers: usize, edges: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (PeerId, PeerId)>,
    {
        if peers == 0 {
            return Err(Error::GraphInfeasible { peers, attempts: 0 });
        }
        let mut adjacency = vec![BTreeSet::new(); peers];
        for (u, v) in edges {
            if u as usize >= peers {
                return Err(Error::UnknownPeer(u));
            }
            if v as usize >= peers {
                return Err(Error::UnknownPeer(v));
            }
            if u == v {
                return Err(Error::SelfLoop(u));
            }
            adjacency[u as usize].insert(v as usize);
            adjacency[v as usize].insert(u as usize);
        }
        let topology = Self::from_adjacency(adjacency);
        if !topology.is_connected() {
            return Err(Error::Disconnected);
        }
        Ok(topology)
    }

    fn from_adjacency(adjacency: Vec<BTreeSet<usize>>) -> Self {
        let neighbors = adjacency
            .into_iter()
            .map(|set| set.into_iter().map(|peer| peer as PeerId).collect())
            .collect();
        Self { neighbors }
    }

    /// Number of peers in the network.
    pub fn peers(&self) -> usize {
        self.neighbors.len()
    }

    /// Neighbors of `peer` in ascending order (empty if `peer` does not exist).
    pub fn neighbors(&self, peer: PeerId) -> &[PeerId] {
        self.neighbors
            .get(peer as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of neighbors of `peer`.
    pub fn degree(&self, peer: PeerId) -> usize {
        self.neighbors(peer).len()
    }

    /// Every undirected edge once, as `(u, v)` with `u < v`.
    pub fn edges(&self) -> Vec<(PeerId, PeerId)> {
        let mut edges = Vec::new();
        for (u, neighbors) in self.neighbors.iter().enumerate() {
            let u = u as PeerId;
            for &v in neighbors.iter().filter(|&&v| v > u) {
                edges.push((u, v));
            }
        }
        edges
    }

    /// Returns `true` if every peer can reach every other peer.
    ///
    /// Uses an explicit stack so large networks do not exhaust the call stack.
    pub fn is_connected(&self) -> bool {
        if self.neighbors.is_empty() {
            return false;
        }
        let mut visited = vec![false; self.neighbors.len()];
        let mut stack = vec![0usize];
        visited[0] = true;
        let mut reached = 1;
        while let Some(peer) = stack.pop() {
            for &neighbor in &self.neighbors[peer] {
                let neighbor = neighbor as usize;
                if !visited[neighbor] {
                    visited[neighbor] = true;
                    reached += 1;
                    stack.push(neighbor);
                }
            }
        }
        reached == self.neighbors.len()
    }
}

/// Returns `true` if some simple graph has exactly the given degree sequence.
///
/// For the sequence sorted in descending order, every prefix of length `k` must satisfy
/// `sum(d[..k]) <= k(k-1) + sum(min(d[i], k) for i >= k)` and the total must be even.
pub fn erdos_gallai(degrees: &[usize]) -> bool {
    let n = degrees.len();
    let mut sorted = degrees.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    if sorted.iter().sum::<usize>() % 2 != 0 {
        return false;
    }
    if sorted.first().is_some_and(|&max| max >= n) {
        return false;
    }

    // suffix[i] = sum(sorted[i..])
    let mut suffix = vec![0usize; n + 1];
    for i in (0..n).rev() {
        suffix[i] = suffix[i + 1] + sorted[i];
    }

    let mut prefix = 0;
    for k in 1..=n {
        prefix += sorted[k - 1];

        // Degrees are descending, so entries at or above `k` form a prefix of the tail
        let tail = &sorted[k..];
        let split = k + tail.partition_point(|&d| d >= k);
        let bound = k * (k - 1) + (split - k) * k + suffix[split];
        if prefix > bound {
            return false;
        }
    }
    true
}

/// Realize a degree sequence by repeatedly connecting the peer with the most remaining
/// stubs to the peers with the next most remaining stubs.
fn havel_hakimi(degrees: &[usize]) -> Option<Vec<BTreeSet<usize>>> {
    let mut adjacency = vec![BTreeSet::new(); degrees.len()];
    let mut remaining: Vec<(usize, usize)> = degrees
        .iter()
        .enumerate()
        .map(|(peer, &degree)| (degree, peer))
        .collect();
    loop {
        remaining.retain(|&(degree, _)| degree > 0);
        if remaining.is_empty() {
            return Some(adjacency);
        }
        remaining.sort_unstable_by(|a, b| b.cmp(a));
        let (degree, peer) = remaining[0];
        if degree >= remaining.len() {
            return None;
        }
        remaining[0].0 = 0;
        for entry in remaining.iter_mut().skip(1).take(degree) {
            entry.0 -= 1;
            adjacency[peer].insert(entry.1);
            adjacency[entry.1].insert(peer);
        }
    }
}

/// Randomize a simple graph with degree-preserving double-edge swaps.
///
/// Each attempt picks two edges `(a, b)` and `(c, d)` and rewires them to `(a, c), (b, d)` or
/// `(a, d), (b, c)`. Attempts that would create a self-loop or a duplicate edge are skipped.
fn scramble<R: Rng>(rng: &mut R, adjacency: &mut [BTreeSet<usize>], attempts: usize) {
    let mut edges: Vec<(usize, usize)> = adjacency
        .iter()
        .enumerate()
        .flat_map(|(u, neighbors)| {
            neighbors
                .iter()
                .filter(move |&&v| v > u)
                .map(move |&v| (u, v))
        })
        .collect();
    if edges.len() < 2 {
        return;
    }
    for _ in 0..attempts {
        let i = rng.gen_range(0..edges.len());
        let mut j = rng.gen_range(0..edges.len() - 1);
        if j >= i {
            j += 1;
        }
        let (a, b) = edges[i];
        let (mut c, mut d) = edges[j];
        if rng.gen_bool(0.5) {
            std::mem::swap(&mut c, &mut d);
        }
        if a == c || a == d || b == c || b == d {
            continue;
        }
        if adjacency[a].contains(&c) || adjacency[b].contains(&d) {
            continue;
        }
        adjacency[a].remove(&b);
        adjacency[b].remove(&a);
        adjacency[c].remove(&d);
        adjacency[d].remove(&c);
        adjacency[a].insert(c);
        adjacency[c].insert(a);
        adjacency[b].insert(d);
        adjacency[d].insert(b);
        edges[i] = (a.min(c), a.max(c));
        edges[j] = (b.min(d), b.max(d));
    }
}
