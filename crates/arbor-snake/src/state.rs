//! Virtual-snake ring state machine
//!
//! Owns this node's predecessor/successor pointers and the installed snake
//! entry table, and decides what to do with each bootstrap/ack/setup frame.
//! Decisions are returned as plain data (mirroring a store-and-forward
//! routing decision) so the caller — which owns the actual peer I/O — can
//! carry them out without this crate depending on arbor-peer or arbor-router.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use arbor_core::PublicKey;
use arbor_switch::PortId;

use crate::entry::{Direction, PathId, SnakeEntry, SnakeTable};
use crate::ring;

/// Default period between self-bootstraps.
pub const DEFAULT_BOOTSTRAP_INTERVAL: Duration = Duration::from_secs(30);

/// What to do with an inbound `VirtualSnakeBootstrap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapDecision {
    /// This node is the tightest known successor candidate for the
    /// originator; the caller should answer with a `VirtualSnakeBootstrapAck`
    /// routed back toward the originator's coordinates.
    ClaimSuccessor,
    /// Not a match; the caller should forward the bootstrap on toward the
    /// root as usual.
    Forward,
}

/// Outcome of accepting a `VirtualSnakeBootstrapAck` as the original
/// bootstrap sender.
#[derive(Debug, Clone, Copy)]
pub struct AckAccepted {
    pub new_successor: PublicKey,
    pub path_id: PathId,
}

/// Outcome of handling one hop of a `VirtualSnakeSetup` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupOutcome {
    /// An entry was installed and the frame should keep travelling toward
    /// `destination_key`.
    Forwarded,
    /// This node is the destination: the entry was installed and the local
    /// predecessor pointer was updated to `source_key`.
    Delivered,
}

struct Inner {
    predecessor: Option<PublicKey>,
    predecessor_port: Option<PortId>,
    successor: Option<PublicKey>,
    successor_port: Option<PortId>,
    last_bootstrap_at: Option<Instant>,
}

/// The virtual-snake ring state for one node.
pub struct SnakeState {
    local_key: PublicKey,
    bootstrap_interval: Duration,
    inner: RwLock<Inner>,
    table: SnakeTable,
    next_path_id: AtomicU64,
}

impl SnakeState {
    pub fn new(local_key: PublicKey) -> Self {
        Self::with_interval(local_key, DEFAULT_BOOTSTRAP_INTERVAL)
    }

    pub fn with_interval(local_key: PublicKey, bootstrap_interval: Duration) -> Self {
        Self {
            local_key,
            bootstrap_interval,
            inner: RwLock::new(Inner {
                predecessor: None,
                predecessor_port: None,
                successor: None,
                successor_port: None,
                last_bootstrap_at: None,
            }),
            table: SnakeTable::new(),
            next_path_id: AtomicU64::new(rand::random()),
        }
    }

    pub fn local_key(&self) -> PublicKey {
        self.local_key
    }

    pub fn predecessor(&self) -> Option<PublicKey> {
        self.inner.read().predecessor
    }

    pub fn successor(&self) -> Option<PublicKey> {
        self.inner.read().successor
    }

    pub fn table(&self) -> &SnakeTable {
        &self.table
    }

    fn fresh_path_id(&self) -> PathId {
        self.next_path_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn should_bootstrap(&self, now: Instant) -> bool {
        match self.inner.read().last_bootstrap_at {
            None => true,
            Some(last) => now.duration_since(last) >= self.bootstrap_interval,
        }
    }

    pub fn mark_bootstrapped(&self, now: Instant) {
        self.inner.write().last_bootstrap_at = Some(now);
    }

    /// Decide whether this node should claim successor-hood for a bootstrap
    /// originated by `originator_key`: true when `originator_key` sits
    /// between this node's predecessor and this node itself in key order,
    /// i.e. this node is ring-closer to `originator_key` than its own
    /// predecessor is.
    pub fn evaluate_bootstrap(&self, originator_key: PublicKey) -> BootstrapDecision {
        if originator_key == self.local_key {
            return BootstrapDecision::Forward;
        }
        let predecessor = self.inner.read().predecessor;
        if ring::is_closer(&originator_key, &self.local_key, predecessor.as_ref()) {
            BootstrapDecision::ClaimSuccessor
        } else {
            BootstrapDecision::Forward
        }
    }

    /// Record the claimant named by an inbound `VirtualSnakeBootstrapAck` as
    /// this node's new successor and mint a path id for the setup that
    /// follows.
    pub fn accept_bootstrap_ack(&self, claimant_key: PublicKey, claimant_port: PortId) -> AckAccepted {
        let path_id = self.fresh_path_id();
        let mut inner = self.inner.write();
        inner.successor = Some(claimant_key);
        inner.successor_port = Some(claimant_port);
        AckAccepted {
            new_successor: claimant_key,
            path_id,
        }
    }

    /// Handle one hop of an inbound `VirtualSnakeSetup`, installing the
    /// entry it describes. `local_is_destination` tells the caller whether
    /// coordinate matching already determined this is the final hop.
    pub fn handle_setup_hop(
        &self,
        source_key: PublicKey,
        destination_key: PublicKey,
        inbound_port: PortId,
        outbound_port: PortId,
        path_id: PathId,
        local_is_destination: bool,
        now: Instant,
    ) -> SetupOutcome {
        self.table.insert(SnakeEntry {
            source_key,
            destination_key,
            source_port: inbound_port,
            destination_port: outbound_port,
            path_id,
            last_seen: now,
        });

        if local_is_destination {
            let mut inner = self.inner.write();
            inner.predecessor = Some(source_key);
            inner.predecessor_port = Some(inbound_port);
            SetupOutcome::Delivered
        } else {
            SetupOutcome::Forwarded
        }
    }

    /// Next hop for a `VirtualSnake`/`VirtualSnakePathfind` frame addressed
    /// to `destination_key`, or `None` if this node has no installed route
    /// that makes progress (and is not itself the destination).
    pub fn route_to_key(&self, destination_key: &PublicKey) -> Option<RouteDecision> {
        if *destination_key == self.local_key {
            return Some(RouteDecision::Local);
        }
        self.table
            .next_hop_toward(destination_key)
            .map(RouteDecision::NextHop)
    }

    /// Tear down every entry that routed through `port`, clearing the
    /// predecessor/successor pointer too if it pointed at that port.
    pub fn teardown_port(&self, port: PortId) -> Vec<SnakeEntry> {
        let removed = self.table.remove_by_port(port);
        let mut inner = self.inner.write();
        if inner.predecessor_port == Some(port) {
            inner.predecessor = None;
            inner.predecessor_port = None;
        }
        if inner.successor_port == Some(port) {
            inner.successor = None;
            inner.successor_port = None;
        }
        removed
    }

    pub fn direction_of(source_key: &PublicKey, destination_key: &PublicKey) -> Direction {
        Direction::of(source_key, destination_key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Local,
    NextHop(PortId),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> PublicKey {
        PublicKey::from_bytes([byte; 32]).unwrap()
    }

    #[test]
    fn claims_successor_when_closer_than_current() {
        let state = SnakeState::new(key(10));
        assert_eq!(state.evaluate_bootstrap(key(5)), BootstrapDecision::ClaimSuccessor);
    }

    #[test]
    fn forwards_when_self_is_the_originator() {
        let state = SnakeState::new(key(10));
        assert_eq!(state.evaluate_bootstrap(key(10)), BootstrapDecision::Forward);
    }

    #[test]
    fn forwards_when_originator_is_not_between_predecessor_and_self() {
        let state = SnakeState::new(key(10));
        // Predecessor is key 9: originator 5 is not between 9 and 10, so this
        // node is not the tightest successor candidate on this path.
        state.handle_setup_hop(key(9), key(10), 2, 0, 1, true, Instant::now());
        assert_eq!(state.evaluate_bootstrap(key(5)), BootstrapDecision::Forward);
    }

    #[test]
    fn claims_successor_when_originator_is_between_predecessor_and_self() {
        let state = SnakeState::new(key(10));
        // Predecessor is key 2: originator 5 sits between 2 and 10.
        state.handle_setup_hop(key(2), key(10), 2, 0, 1, true, Instant::now());
        assert_eq!(state.evaluate_bootstrap(key(5)), BootstrapDecision::ClaimSuccessor);
    }

    #[test]
    fn accept_ack_records_successor_and_mints_path_id() {
        let state = SnakeState::new(key(1));
        let first = state.accept_bootstrap_ack(key(2), 3);
        let second = state.accept_bootstrap_ack(key(2), 3);
        assert_eq!(state.successor(), Some(key(2)));
        assert_ne!(first.path_id, second.path_id);
    }

    #[test]
    fn setup_hop_installs_entry_and_reports_forwarded() {
        let state = SnakeState::new(key(1));
        let outcome = state.handle_setup_hop(key(5), key(9), 2, 3, 42, false, Instant::now());
        assert_eq!(outcome, SetupOutcome::Forwarded);
        assert_eq!(state.table().len(), 1);
        assert!(state.predecessor().is_none());
    }

    #[test]
    fn setup_hop_at_destination_updates_predecessor() {
        let state = SnakeState::new(key(9));
        let outcome = state.handle_setup_hop(key(5), key(9), 2, 0, 42, true, Instant::now());
        assert_eq!(outcome, SetupOutcome::Delivered);
        assert_eq!(state.predecessor(), Some(key(5)));
    }

    #[test]
    fn teardown_clears_predecessor_and_successor_pointers() {
        let state = SnakeState::new(key(9));
        state.handle_setup_hop(key(5), key(9), 2, 0, 42, true, Instant::now());
        state.accept_bootstrap_ack(key(20), 7);
        let removed = state.teardown_port(2);
        assert_eq!(removed.len(), 1);
        assert!(state.predecessor().is_none());
        assert_eq!(state.successor(), Some(key(20))); // different port, untouched

        let removed = state.teardown_port(7);
        assert!(removed.is_empty());
        assert!(state.successor().is_none());
    }

    #[test]
    fn route_to_key_reports_local_delivery() {
        let state = SnakeState::new(key(9));
        assert_eq!(state.route_to_key(&key(9)), Some(RouteDecision::Local));
    }

    #[test]
    fn route_to_key_falls_back_to_table_lookup() {
        let state = SnakeState::new(key(1));
        state.handle_setup_hop(key(1), key(9), 0, 4, 42, false, Instant::now());
        assert_eq!(state.route_to_key(&key(9)), Some(RouteDecision::NextHop(4)));
    }

    #[test]
    fn should_bootstrap_defaults_to_true_until_marked() {
        let state = SnakeState::with_interval(key(1), Duration::from_millis(10));
        let t0 = Instant::now();
        assert!(state.should_bootstrap(t0));
        state.mark_bootstrapped(t0);
        assert!(!state.should_bootstrap(t0 + Duration::from_millis(5)));
        assert!(state.should_bootstrap(t0 + Duration::from_millis(20)));
    }
}
