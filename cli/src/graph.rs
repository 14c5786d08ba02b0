//! Load a static topology from a file.
//!
//! The file starts with the number of peers, followed by pairs of peer ids (numbered from 1)
//! describing undirected edges. Tokens may be separated by any whitespace:
//!
//! ```text
//! 4
//! 1 2
//! 2 3
//! 3 4
//! 4 1
//! 1 3
//! 2 4
//! ```

use crate::Error;
use chainsim_simulator::{topology::Topology, PeerId};
use std::{fs, path::Path};
use tracing::debug;

/// Read the topology stored at `path`, which must describe exactly `peers` peers.
pub fn load(path: &Path, peers: usize) -> Result<Topology, Error> {
    let contents = fs::read_to_string(path).map_err(|source| Error::GraphFileUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let topology = parse(&contents, peers)?;
    debug!(path = %path.display(), peers, edges = topology.edges().len(), "loaded topology");
    Ok(topology)
}

/// Parse the contents of a topology file.
pub fn parse(contents: &str, peers: usize) -> Result<Topology, Error> {
    let mut tokens = contents.split_whitespace();
    let count = tokens
        .next()
        .ok_or_else(|| Error::MalformedGraphFile("missing peer count".into()))?;
    let count: usize = count
        .parse()
        .map_err(|_| Error::MalformedGraphFile(format!("invalid peer count: {count}")))?;
    if count != peers {
        return Err(Error::GraphFileMismatch {
            expected: peers,
            actual: count,
        });
    }

    let ids = tokens
        .map(|token| peer(token, peers))
        .collect::<Result<Vec<_>, _>>()?;
    if ids.len() % 2 != 0 {
        return Err(Error::MalformedGraphFile(format!(
            "edge list ends with a lone peer id: {}",
            ids[ids.len() - 1] + 1
        )));
    }
    let edges = ids.chunks_exact(2).map(|pair| (pair[0], pair[1]));
    Ok(Topology::from_edges(peers, edges)?)
}

/// Convert a 1-based peer id from the file into a [PeerId].
fn peer(token: &str, peers: usize) -> Result<PeerId, Error> {
    match token.parse::<PeerId>() {
        Ok(id) if id >= 1 && id as usize <= peers => Ok(id - 1),
        _ => Err(Error::MalformedGraphFile(format!("invalid peer id: {token}"))),
    }
}
