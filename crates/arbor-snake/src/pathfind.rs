//! Virtual-snake pathfind signature chains
//!
//! Pathfind frames travel key-space routes the same way tree announcements
//! travel the spanning tree, and are signed the same way: each hop appends a
//! signature covering everything before it plus the port it forwards
//! through, giving the same loop-detection and tamper-evidence properties as
//! [`arbor_tree::Announcement`] without tying the chain to a root concept.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use arbor_core::{PrivateKey, PublicKey, Signature};
use arbor_switch::PortId;

use crate::error::SnakeError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathfindHop {
    pub signer: PublicKey,
    pub destination_port: PortId,
    pub signature: Signature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathfindChain {
    pub origin: PublicKey,
    pub hops: Vec<PathfindHop>,
}

impl PathfindChain {
    pub fn originate(origin: PublicKey) -> Self {
        Self {
            origin,
            hops: Vec::new(),
        }
    }

    pub fn already_visited(&self, key: &PublicKey) -> bool {
        self.hops.iter().any(|h| &h.signer == key)
    }

    fn signing_payload(&self, upto: usize, destination_port: PortId) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32 + upto * 68);
        buf.extend_from_slice(self.origin.as_bytes());
        for hop in &self.hops[..upto] {
            buf.extend_from_slice(hop.signer.as_bytes());
            buf.extend_from_slice(&hop.destination_port.to_be_bytes());
            buf.extend_from_slice(hop.signature.as_bytes());
        }
        buf.extend_from_slice(&destination_port.to_be_bytes());
        buf
    }

    pub fn append_signed(&self, signing_key: &PrivateKey, destination_port: PortId) -> Self {
        let upto = self.hops.len();
        let payload = self.signing_payload(upto, destination_port);
        let signature = signing_key.sign(&payload);
        let mut hops = self.hops.clone();
        hops.push(PathfindHop {
            signer: signing_key.public(),
            destination_port,
            signature,
        });
        Self {
            origin: self.origin,
            hops,
        }
    }

    pub fn verify(&self) -> Result<(), SnakeError> {
        let mut seen = HashSet::with_capacity(self.hops.len());
        for (i, hop) in self.hops.iter().enumerate() {
            if !seen.insert(hop.signer) {
                return Err(SnakeError::PathfindLoop);
            }
            let payload = self.signing_payload(i, hop.destination_port);
            if !hop.signer.verify(&payload, &hop.signature) {
                return Err(SnakeError::PathfindSignatureInvalid);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypair(seed: u8) -> PrivateKey {
        PrivateKey::from_bytes([seed; 32])
    }

    #[test]
    fn chain_of_two_hops_verifies() {
        let origin = keypair(1);
        let mid = keypair(2);
        let chain = PathfindChain::originate(origin.public());
        let at_mid = chain.append_signed(&origin, 3);
        let at_end = at_mid.append_signed(&mid, 4);
        at_end.verify().unwrap();
    }

    #[test]
    fn repeated_signer_is_detected_before_verification() {
        let origin = keypair(1);
        let chain = PathfindChain::originate(origin.public());
        let once = chain.append_signed(&origin, 1);
        assert!(once.already_visited(&origin.public()));
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let origin = keypair(1);
        let chain = PathfindChain::originate(origin.public());
        let mut signed = chain.append_signed(&origin, 1);
        signed.hops[0].destination_port = 99;
        assert!(matches!(signed.verify(), Err(SnakeError::PathfindSignatureInvalid)));
    }
}
