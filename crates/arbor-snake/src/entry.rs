//! Installed snake-entry table
//!
//! Each completed `Setup` hop installs one entry describing a segment of a
//! ring path through the local node. Entries are keyed by path id plus
//! direction since a single path id only ever has one entry per direction at
//! a given hop, and the two directions must be distinguishable for teardown
//! and for routing traffic moving the opposite way along the same path.

use std::time::Instant;

use dashmap::DashMap;

use arbor_core::PublicKey;
use arbor_switch::PortId;

use crate::ring;

pub type PathId = u64;

/// Which way a path segment was established relative to the node that
/// originated the bootstrap: `Ascending` if the originator's key is lower
/// than the destination's (the path climbs toward higher keys), `Descending`
/// otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    pub fn of(source_key: &PublicKey, destination_key: &PublicKey) -> Self {
        if source_key < destination_key {
            Direction::Ascending
        } else {
            Direction::Descending
        }
    }
}

/// One installed segment of a ring path through this node.
#[derive(Debug, Clone)]
pub struct SnakeEntry {
    pub source_key: PublicKey,
    pub destination_key: PublicKey,
    pub source_port: PortId,
    pub destination_port: PortId,
    pub path_id: PathId,
    pub last_seen: Instant,
}

/// The table of installed entries, keyed by `(path_id, direction)`.
#[derive(Default)]
pub struct SnakeTable {
    entries: DashMap<(PathId, Direction), SnakeEntry>,
}

impl SnakeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry: SnakeEntry) {
        let direction = Direction::of(&entry.source_key, &entry.destination_key);
        self.entries.insert((entry.path_id, direction), entry);
    }

    pub fn get(&self, path_id: PathId, direction: Direction) -> Option<SnakeEntry> {
        self.entries.get(&(path_id, direction)).map(|e| e.clone())
    }

    pub fn remove(&self, path_id: PathId, direction: Direction) -> Option<SnakeEntry> {
        self.entries.remove(&(path_id, direction)).map(|(_, e)| e)
    }

    /// Tear down every entry that routes through `port`, either as the
    /// inbound or outbound side, returning the removed entries so the
    /// caller can notify the other side of each torn-down path.
    pub fn remove_by_port(&self, port: PortId) -> Vec<SnakeEntry> {
        let doomed: Vec<_> = self
            .entries
            .iter()
            .filter(|kv| kv.value().source_port == port || kv.value().destination_port == port)
            .map(|kv| *kv.key())
            .collect();
        doomed
            .into_iter()
            .filter_map(|key| self.entries.remove(&key).map(|(_, e)| e))
            .collect()
    }

    /// The best installed route toward `destination`: among entries whose
    /// segment spans past `destination` in ring order, the outbound port of
    /// whichever entry's endpoint is ring-closest to it. Returns `None` when
    /// no entry can make progress.
    pub fn next_hop_toward(&self, destination: &PublicKey) -> Option<PortId> {
        let mut best: Option<(PublicKey, PortId)> = None;
        for kv in self.entries.iter() {
            let entry = kv.value();
            let endpoint = if entry.source_key == *destination || entry.destination_key == *destination {
                return Some(if entry.source_key == *destination {
                    entry.source_port
                } else {
                    entry.destination_port
                });
            } else {
                entry.destination_key
            };
            let current_best_key = best.as_ref().map(|(k, _)| k);
            if ring::is_closer_to_destination(destination, &endpoint, current_best_key) {
                best = Some((endpoint, entry.destination_port));
            }
        }
        best.map(|(_, port)| port)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
