//! Root election state machine
//!
//! Owns the currently chosen announcement, the parent port it arrived via,
//! and the most recent announcement seen on every peer (used to re-elect a
//! parent on timeout without waiting for fresh traffic). All mutation is
//! serialized through a single `RwLock`, keeping one logical owner for the
//! subsystem's state.

use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, instrument, warn};

use arbor_core::{PrivateKey, PublicKey};
use arbor_switch::{Coordinates, PortId};

use crate::announcement::Announcement;
use crate::error::TreeError;

/// Default announcement re-advertise interval.
pub const DEFAULT_ANNOUNCEMENT_INTERVAL: Duration = Duration::from_secs(30);
/// Default announcement expiry.
pub const DEFAULT_ANNOUNCEMENT_TIMEOUT: Duration = Duration::from_secs(45);

/// Outcome of offering a freshly received announcement to the tree state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// A new, better parent-announcement was adopted; coordinates changed
    /// and every other started peer should be told to re-advertise.
    AdoptedNewParent,
    /// The existing parent re-advertised with a refreshed sequence; no
    /// coordinate change, no fan-out needed.
    RefreshedParent,
    /// The announcement lost the comparison and was recorded only in the
    /// per-peer table, not adopted.
    KeptPerPeerOnly,
}

struct Inner {
    /// This node's currently chosen announcement, exactly as received (no
    /// self-signature appended) — `None` means the node currently considers
    /// itself the root.
    chosen: Option<Announcement>,
    /// Port the chosen announcement arrived on; `None` when self-rooted.
    parent_port: Option<PortId>,
    /// When the chosen announcement was (last) accepted or refreshed.
    chosen_at: Instant,
    /// Most recent per-peer announcement, used to re-elect on timeout.
    per_peer: std::collections::HashMap<PortId, (Announcement, Instant)>,
    /// Sequence number used while this node is acting as its own root.
    self_sequence: u64,
    /// Timestamp of the last time this node fired "advertise now".
    last_advertised_at: Option<Instant>,
}

/// Root election and coordinate derivation for one node.
pub struct TreeState {
    local_key: PublicKey,
    announcement_interval: Duration,
    announcement_timeout: Duration,
    inner: RwLock<Inner>,
}

impl TreeState {
    pub fn new(local_key: PublicKey, now: Instant) -> Self {
        Self::with_intervals(
            local_key,
            now,
            DEFAULT_ANNOUNCEMENT_INTERVAL,
            DEFAULT_ANNOUNCEMENT_TIMEOUT,
        )
    }

    pub fn with_intervals(
        local_key: PublicKey,
        now: Instant,
        announcement_interval: Duration,
        announcement_timeout: Duration,
    ) -> Self {
        Self {
            local_key,
            announcement_interval,
            announcement_timeout,
            inner: RwLock::new(Inner {
                chosen: None,
                parent_port: None,
                chosen_at: now,
                per_peer: std::collections::HashMap::new(),
                self_sequence: 0,
                last_advertised_at: None,
            }),
        }
    }

    pub fn local_public_key(&self) -> PublicKey {
        self.local_key
    }

    /// The announcement this node currently advertises about itself — its
    /// chosen parent-announcement, or a fresh self-rooted one if it
    /// currently believes itself to be the root. This is exactly what the
    /// announcer appends its own signature to before sending.
    pub fn own_announcement(&self) -> Announcement {
        let inner = self.inner.read();
        inner
            .chosen
            .clone()
            .unwrap_or_else(|| Announcement::self_rooted(self.local_key, inner.self_sequence))
    }

    pub fn root_public_key(&self) -> PublicKey {
        let inner = self.inner.read();
        inner
            .chosen
            .as_ref()
            .map(|a| a.root)
            .unwrap_or(self.local_key)
    }

    pub fn is_root(&self) -> bool {
        self.root_public_key() == self.local_key
    }

    pub fn local_coordinates(&self) -> Coordinates {
        self.inner
            .read()
            .chosen
            .as_ref()
            .map(Announcement::coordinates)
            .unwrap_or_default()
    }

    pub fn parent_port(&self) -> Option<PortId> {
        self.inner.read().parent_port
    }

    /// Offer a received announcement from peer `from_key` on port `from_port`.
    ///
    /// Signature verification, no repeat/self signer, and "last signer
    /// matches the sending peer" are rejection checks shared by every
    /// candidate; ranking then decides whether to adopt it as the chosen
    /// parent.
    #[instrument(skip(self, announcement), fields(from_port, root = %announcement.root, sequence = announcement.sequence))]
    pub fn accept_announcement(
        &self,
        from_port: PortId,
        from_key: PublicKey,
        announcement: Announcement,
        now: Instant,
    ) -> Result<AcceptOutcome, TreeError> {
        announcement.verify_chain()?;

        if announcement.already_signed_by(&self.local_key) {
            warn!("rejecting announcement that already carries our own signature");
            return Err(TreeError::AnnouncementLoop);
        }

        match announcement.signatures.last() {
            Some(last) if last.signer == from_key => {}
            Some(_) => return Err(TreeError::LastSignerMismatch),
            // A self-rooted announcement with zero signatures is only valid
            // coming directly from the root itself.
            None if announcement.root == from_key => {}
            None => return Err(TreeError::LastSignerMismatch),
        }

        let mut inner = self.inner.write();
        inner
            .per_peer
            .insert(from_port, (announcement.clone(), now));

        let current = inner
            .chosen
            .clone()
            .unwrap_or_else(|| Announcement::self_rooted(self.local_key, inner.self_sequence));

        if announcement.is_better_than(&current) {
            debug!(?from_port, "adopting new parent announcement");
            inner.chosen = Some(announcement);
            inner.parent_port = Some(from_port);
            inner.chosen_at = now;
            return Ok(AcceptOutcome::AdoptedNewParent);
        }

        if announcement.same_rank_root_and_sequence(&current) && inner.parent_port == Some(from_port)
        {
            inner.chosen = Some(announcement);
            inner.chosen_at = now;
            return Ok(AcceptOutcome::RefreshedParent);
        }

        Ok(AcceptOutcome::KeptPerPeerOnly)
    }

    /// Drop a peer's per-peer announcement record and, if it was our parent,
    /// re-elect immediately from whatever per-peer announcements remain:
    /// disconnecting the parent triggers a tree re-root.
    pub fn forget_peer(&self, port: PortId, now: Instant) -> bool {
        let mut inner = self.inner.write();
        inner.per_peer.remove(&port);
        if inner.parent_port == Some(port) {
            Self::reelect_locked(&mut inner, self.announcement_timeout, now);
            true
        } else {
            false
        }
    }

    /// Periodic tick: expire a stale chosen announcement and re-elect from
    /// the best remaining per-peer entry, or fall back to self-rooted.
    pub fn check_timeout(&self, now: Instant) -> bool {
        let mut inner = self.inner.write();
        if inner.chosen.is_none() {
            return false;
        }
        if now.duration_since(inner.chosen_at) < self.announcement_timeout {
            return false;
        }
        debug!("chosen announcement timed out, re-electing");
        Self::reelect_locked(&mut inner, self.announcement_timeout, now);
        true
    }

    /// Pick the best still-fresh per-peer announcement as the new parent,
    /// or fall back to self-rooted if none remain within the timeout window.
    fn reelect_locked(inner: &mut Inner, announcement_timeout: Duration, now: Instant) {
        let best = inner
            .per_peer
            .iter()
            .filter(|(_, (_, seen_at))| now.duration_since(*seen_at) < announcement_timeout)
            .max_by(|(_, (a, _)), (_, (b, _))| {
                if a.is_better_than(b) {
                    std::cmp::Ordering::Greater
                } else if b.is_better_than(a) {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .map(|(port, (ann, _))| (*port, ann.clone()));

        match best {
            Some((port, ann)) => {
                inner.chosen = Some(ann);
                inner.parent_port = Some(port);
            }
            None => {
                inner.chosen = None;
                inner.parent_port = None;
            }
        }
        inner.chosen_at = now;
    }

    /// Whether a periodic re-advertise should fire: the root re-emits every
    /// `announcement_interval` with `sequence + 1`; non-root nodes
    /// re-advertise whenever the interval elapses (coordinate-change
    /// fan-out is driven separately by [`AcceptOutcome::AdoptedNewParent`]).
    pub fn should_reannounce(&self, now: Instant) -> bool {
        let inner = self.inner.read();
        match inner.last_advertised_at {
            None => true,
            Some(last) => now.duration_since(last) >= self.announcement_interval,
        }
    }

    pub fn mark_advertised(&self, now: Instant) {
        self.inner.write().last_advertised_at = Some(now);
    }

    /// If this node is currently the root, bump its self-sequence number —
    /// called once per re-advertise interval tick.
    pub fn bump_self_sequence_if_root(&self) {
        let mut inner = self.inner.write();
        if inner.chosen.is_none() {
            inner.self_sequence += 1;
        }
    }

    /// Sign the node's own announcement for transmission on `out_port`,
    /// applying the announcer's loop guard.
    pub fn sign_for_port(
        &self,
        signing_key: &PrivateKey,
        out_port: PortId,
    ) -> Result<Announcement, TreeError> {
        let base = self.own_announcement();
        if base.already_signed_by(&self.local_key) {
            return Err(TreeError::AlreadySigned);
        }
        Ok(base.append_signed(signing_key, out_port))
    }
}
