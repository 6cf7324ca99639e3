//! Signed spanning-tree announcements
//!
//! An announcement is an append-only signature chain: the root starts it
//! with zero signatures, and every hop that forwards the announcement onward
//! to a specific peer appends one signature entry covering everything that
//! came before it plus the local port it is about to send on. This gives
//! both loop detection (a repeated signer is visible in the chain) and tamper
//! evidence (each signature commits to the entire prefix).

use std::cmp::Reverse;

use serde::{Deserialize, Serialize};

use arbor_core::{PrivateKey, PublicKey, Signature};
use arbor_switch::{Coordinates, PortId};

use crate::error::TreeError;

/// One hop's contribution to an announcement's signature chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEntry {
    /// The node that produced this signature.
    pub signer: PublicKey,
    /// The local port that `signer` used to forward the announcement onward
    /// when this entry was appended.
    pub destination_port: PortId,
    pub signature: Signature,
}

/// A signed spanning-tree announcement (wire payload of an `STP` frame).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub root: PublicKey,
    pub sequence: u64,
    pub signatures: Vec<SignatureEntry>,
}

impl Announcement {
    /// The trivial announcement a node advertises about itself when it
    /// believes it is the root: no hops yet, sequence starts at zero.
    pub fn self_rooted(root: PublicKey, sequence: u64) -> Self {
        Self {
            root,
            sequence,
            signatures: Vec::new(),
        }
    }

    /// Coordinates carried by this announcement: the destination-port
    /// sequence of every signature entry, in order. For a chain received by
    /// node N (whose immediate parent appended the last entry when
    /// forwarding to N specifically), this is exactly N's tree coordinates.
    ///
    /// Coordinates are the full, unmodified chain — nothing is stripped off
    /// the trailing entry before it is stored.
    pub fn coordinates(&self) -> Coordinates {
        self.signatures.iter().map(|s| s.destination_port).collect()
    }

    /// Number of hops recorded so far.
    pub fn chain_len(&self) -> usize {
        self.signatures.len()
    }

    /// Whether `key` already appears anywhere in the signature chain.
    pub fn already_signed_by(&self, key: &PublicKey) -> bool {
        self.signatures.iter().any(|s| &s.signer == key)
    }

    /// Canonical bytes committed to by the signature at chain position
    /// `upto` (i.e. signatures[0..upto] plus the new destination port),
    /// shared by both signing and verification so they can never diverge.
    fn signing_payload(&self, upto: usize, destination_port: PortId) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64 + upto * 68);
        buf.extend_from_slice(self.root.as_bytes());
        buf.extend_from_slice(&self.sequence.to_be_bytes());
        for entry in &self.signatures[..upto] {
            buf.extend_from_slice(entry.signer.as_bytes());
            buf.extend_from_slice(&entry.destination_port.to_be_bytes());
            buf.extend_from_slice(entry.signature.as_bytes());
        }
        buf.extend_from_slice(&destination_port.to_be_bytes());
        buf
    }

    /// Append a new signature entry, signing the announcement-up-to-this-point
    /// with `signing_key`, recording `destination_port` as the local port this
    /// node is about to forward the announcement through.
    ///
    /// Callers must check [`Self::already_signed_by`] first (the announcer's
    /// loop guard); appending twice for the same key is not itself rejected
    /// here since the resulting chain will simply fail verification.
    pub fn append_signed(&self, signing_key: &PrivateKey, destination_port: PortId) -> Self {
        let upto = self.signatures.len();
        let payload = self.signing_payload(upto, destination_port);
        let signature = signing_key.sign(&payload);
        let mut signatures = self.signatures.clone();
        signatures.push(SignatureEntry {
            signer: signing_key.public(),
            destination_port,
            signature,
        });
        Self {
            root: self.root,
            sequence: self.sequence,
            signatures,
        }
    }

    /// Full verification of the signature chain, except the "last signer
    /// equals sending peer" rule, which needs the inbound peer's key and is
    /// checked by the caller.
    pub fn verify_chain(&self) -> Result<(), TreeError> {
        if let Some(first) = self.signatures.first() {
            if first.signer != self.root {
                return Err(TreeError::RootMismatch);
            }
        }

        let mut seen = std::collections::HashSet::with_capacity(self.signatures.len());
        for (i, entry) in self.signatures.iter().enumerate() {
            if !seen.insert(entry.signer) {
                return Err(TreeError::AnnouncementLoop);
            }
            let payload = self.signing_payload(i, entry.destination_port);
            if !entry.signer.verify(&payload, &entry.signature) {
                return Err(TreeError::SignatureInvalid);
            }
        }
        Ok(())
    }

    /// Rank used to compare two announcements: higher root key wins, then
    /// higher sequence, then a shorter signature chain (closer to the root).
    /// A larger rank tuple is a "better" announcement.
    fn rank(&self) -> (PublicKey, u64, Reverse<usize>) {
        (self.root, self.sequence, Reverse(self.chain_len()))
    }

    /// Whether `self` would win a root-election comparison against `other`.
    pub fn is_better_than(&self, other: &Announcement) -> bool {
        self.rank() > other.rank()
    }

    /// Whether `self` and `other` carry the same `(root, sequence)` tuple
    /// (used for the "equal replaces only via current parent" rule). Chain
    /// length is not part of the equality check since re-advertisements of
    /// the same root/sequence should always refresh regardless of the
    /// resulting chain length.
    pub fn same_rank_root_and_sequence(&self, other: &Announcement) -> bool {
        self.root == other.root && self.sequence == other.sequence
    }
}
