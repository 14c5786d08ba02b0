//! Participants of the simulated network.

use crate::{chain::View, mempool::Mempool, BlockId, Error, PeerId, Speed, Tier};
use rand::{seq::SliceRandom, Rng};

/// State of a single peer.
pub struct Peer {
    pub id: PeerId,
    pub speed: Speed,
    pub tier: Tier,

    /// Share of the total hashing power of the network (all weights sum to 1).
    pub weight: f64,

    pub view: View,
    pub mempool: Mempool,

    /// Tip the pending mining attempt builds on. An attempt completing on any other parent is
    /// stale.
    pub mining: Option<BlockId>,

    /// Number of blocks this peer created.
    pub mined: u64,
}

impl Peer {
    pub fn new(id: PeerId, speed: Speed, tier: Tier, weight: f64, view: View) -> Self {
        Self {
            id,
            speed,
            tier,
            weight,
            view,
            mempool: Mempool::new(),
            mining: None,
            mined: 0,
        }
    }
}

/// Randomly assign speeds and tiers so that `floor(slow * peers)` peers are slow and
/// `floor(low * peers)` peers are low tier.
pub fn classify<R: Rng>(
    rng: &mut R,
    peers: usize,
    slow: f64,
    low: f64,
) -> Result<Vec<(Speed, Tier)>, Error> {
    for fraction in [slow, low] {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(Error::InvalidFraction(fraction));
        }
    }
    let slow = (slow * peers as f64) as usize;
    let low = (low * peers as f64) as usize;

    let mut speeds: Vec<Speed> = (0..peers)
        .map(|i| if i < slow { Speed::Slow } else { Speed::Fast })
        .collect();
    speeds.shuffle(rng);
    let mut tiers: Vec<Tier> = (0..peers)
        .map(|i| if i < low { Tier::Low } else { Tier::High })
        .collect();
    tiers.shuffle(rng);
    Ok(speeds.into_iter().zip(tiers).collect())
}

/// Normalize the hashing power of each tier so the weights sum to 1.
pub fn weights(tiers: &[Tier]) -> Vec<f64> {
    let total: f64 = tiers.iter().map(Tier::hash_power).sum();
    tiers.iter().map(|tier| tier.hash_power() / total).collect()
}
