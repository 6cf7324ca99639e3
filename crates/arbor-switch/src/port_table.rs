//! Fixed-capacity switch-port table
//!
//! Port 0 is reserved for the local node and is never bound to a peer.
//! Binding, unbinding, and duplicate-key checks are all serialized through
//! a single `RwLock` over the slot vector — mutation is rare (peer
//! attach/detach) relative to lookups (every forwarding decision), so a
//! read-preferring lock fits better here than a `DashMap` keyed table.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use arbor_core::PublicKey;

use crate::error::SwitchError;
use crate::peer_type::PeerType;

pub type PortId = u32;

/// Port 0 always refers to the local node, never a remote peer.
pub const LOCAL_PORT: PortId = 0;

/// The port table must hold at least this many slots.
pub const MIN_CAPACITY: usize = 16;

/// Per-peer traffic counters, incremented from whichever task observes
/// the event (reader, writer, forwarding decision).
#[derive(Debug, Default)]
pub struct PeerCounters {
    tx_proto_sent: AtomicU64,
    tx_proto_dropped: AtomicU64,
    tx_traffic_sent: AtomicU64,
    tx_traffic_dropped: AtomicU64,
    rx_dropped_no_destination: AtomicU64,
}

impl PeerCounters {
    pub fn record_proto_sent(&self) {
        self.tx_proto_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_proto_dropped(&self) {
        self.tx_proto_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_traffic_sent(&self) {
        self.tx_traffic_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_traffic_dropped(&self) {
        self.tx_traffic_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_no_destination(&self) {
        self.rx_dropped_no_destination.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tx_proto_dropped(&self) -> u64 {
        self.tx_proto_dropped.load(Ordering::Relaxed)
    }

    pub fn tx_traffic_dropped(&self) -> u64 {
        self.tx_traffic_dropped.load(Ordering::Relaxed)
    }

    pub fn rx_dropped_no_destination(&self) -> u64 {
        self.rx_dropped_no_destination.load(Ordering::Relaxed)
    }
}

/// Tree coordinates: the sequence of port ids from the root to a node.
pub type Coordinates = Vec<PortId>;

/// Fields that change over a peer's lifetime, grouped so a single lock
/// covers all of them at once (coords and liveness are always read and
/// updated together by the tree subsystem).
#[derive(Debug, Clone, Default)]
pub struct PeerLiveState {
    pub coords: Coordinates,
    pub started: bool,
    pub alive: bool,
    pub last_announcement_at: Option<DateTime<Utc>>,
}

/// Metadata for one bound port. Connection handles, outbound queues, and
/// cancellation live in `arbor-peer`, which composes a peer task group
/// around the port id this record is keyed by.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    port: PortId,
    public_key: PublicKey,
    peer_type: PeerType,
    zone: String,
    counters: Arc<PeerCounters>,
    state: Arc<Mutex<PeerLiveState>>,
}

impl PeerRecord {
    pub fn port(&self) -> PortId {
        self.port
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    pub fn peer_type(&self) -> PeerType {
        self.peer_type
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    pub fn counters(&self) -> &Arc<PeerCounters> {
        &self.counters
    }

    pub fn coords(&self) -> Coordinates {
        self.state.lock().coords.clone()
    }

    pub fn is_alive(&self) -> bool {
        self.state.lock().alive
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    pub fn set_started(&self, started: bool) {
        self.state.lock().started = started;
    }

    /// Replace coordinates and mark the peer alive, recording the
    /// announcement arrival instant (monotonic clock reading is the tree
    /// subsystem's job; this just stores the wall-clock stamp used for
    /// the announcement-timeout check).
    pub fn accept_announcement(&self, coords: Coordinates, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        state.coords = coords;
        state.alive = true;
        state.last_announcement_at = Some(now);
    }

    pub fn mark_stale(&self) {
        self.state.lock().alive = false;
    }

    pub fn last_announcement_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().last_announcement_at
    }
}

struct Slot {
    record: PeerRecord,
}

/// A fixed-size array of peer slots.
pub struct PortTable {
    capacity: usize,
    slots: RwLock<Vec<Option<Slot>>>,
}

impl PortTable {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_CAPACITY);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            capacity,
            slots: RwLock::new(slots),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Attach a new peer to the first free non-zero port, refusing a
    /// second concurrent connection from the same public key.
    pub fn attach(
        &self,
        public_key: PublicKey,
        peer_type: PeerType,
        zone: String,
    ) -> Result<PeerRecord, SwitchError> {
        let mut slots = self.slots.write();

        if slots
            .iter()
            .flatten()
            .any(|slot| slot.record.public_key() == public_key)
        {
            return Err(SwitchError::DuplicateKey);
        }

        let free_index = slots
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, slot)| slot.is_none())
            .map(|(index, _)| index)
            .ok_or(SwitchError::PortTableFull)?;

        let record = PeerRecord {
            port: free_index as PortId,
            public_key,
            peer_type,
            zone,
            counters: Arc::new(PeerCounters::default()),
            state: Arc::new(Mutex::new(PeerLiveState::default())),
        };
        slots[free_index] = Some(Slot {
            record: record.clone(),
        });
        Ok(record)
    }

    pub fn detach(&self, port: PortId) -> Result<PeerRecord, SwitchError> {
        let mut slots = self.slots.write();
        let index = port as usize;
        let slot = slots
            .get_mut(index)
            .ok_or(SwitchError::NotBound(port))?
            .take()
            .ok_or(SwitchError::NotBound(port))?;
        Ok(slot.record)
    }

    pub fn get(&self, port: PortId) -> Option<PeerRecord> {
        self.slots
            .read()
            .get(port as usize)
            .and_then(|slot| slot.as_ref())
            .map(|slot| slot.record.clone())
    }

    pub fn find_by_key(&self, public_key: &PublicKey) -> Option<PeerRecord> {
        self.slots
            .read()
            .iter()
            .flatten()
            .find(|slot| slot.record.public_key() == *public_key)
            .map(|slot| slot.record.clone())
    }

    /// All currently bound peer records, in port-id order.
    pub fn bound_peers(&self) -> Vec<PeerRecord> {
        self.slots
            .read()
            .iter()
            .flatten()
            .map(|slot| slot.record.clone())
            .collect()
    }

    pub fn is_full(&self) -> bool {
        self.slots.read().iter().skip(1).all(|slot| slot.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> PublicKey {
        PublicKey::from_bytes([byte; 32]).unwrap()
    }

    #[test]
    fn attach_skips_reserved_local_port() {
        let table = PortTable::new(MIN_CAPACITY);
        let record = table.attach(key(1), PeerType::Remote, "zone-a".into()).unwrap();
        assert_ne!(record.port(), LOCAL_PORT);
    }

    #[test]
    fn duplicate_key_is_refused() {
        let table = PortTable::new(MIN_CAPACITY);
        table.attach(key(7), PeerType::Remote, "".into()).unwrap();
        let err = table.attach(key(7), PeerType::Remote, "".into()).unwrap_err();
        assert!(matches!(err, SwitchError::DuplicateKey));
    }

    #[test]
    fn table_full_is_reported() {
        let table = PortTable::new(MIN_CAPACITY);
        for i in 0..(MIN_CAPACITY as u8 - 1) {
            table.attach(key(i), PeerType::Remote, "".into()).unwrap();
        }
        let err = table.attach(key(200), PeerType::Remote, "".into()).unwrap_err();
        assert!(matches!(err, SwitchError::PortTableFull));
        assert!(table.is_full());
    }

    #[test]
    fn detach_frees_the_port_for_reuse() {
        let table = PortTable::new(MIN_CAPACITY);
        let record = table.attach(key(3), PeerType::Remote, "".into()).unwrap();
        let port = record.port();
        table.detach(port).unwrap();
        assert!(table.get(port).is_none());
        let second = table.attach(key(3), PeerType::Remote, "".into()).unwrap();
        assert_eq!(second.port(), port);
    }

    #[test]
    fn accept_announcement_marks_peer_alive() {
        let table = PortTable::new(MIN_CAPACITY);
        let record = table.attach(key(9), PeerType::Remote, "".into()).unwrap();
        assert!(!record.is_alive());
        record.accept_announcement(vec![1, 2], Utc::now());
        assert!(record.is_alive());
        assert_eq!(record.coords(), vec![1, 2]);
    }

    #[test]
    fn mark_stale_clears_alive_without_touching_started_or_coords() {
        let table = PortTable::new(MIN_CAPACITY);
        let record = table.attach(key(9), PeerType::Remote, "".into()).unwrap();
        record.set_started(true);
        record.accept_announcement(vec![1, 2], Utc::now());
        record.mark_stale();
        assert!(!record.is_alive());
        assert!(record.is_started());
        assert_eq!(record.coords(), vec![1, 2]);
    }
}
