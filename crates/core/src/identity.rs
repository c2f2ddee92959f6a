//! Server identity, anytrust group membership, and the per-layer
//! bootstrap-key record (§3 of the data model).

use crate::POINT_SIZE;
use serde::{Deserialize, Serialize};

/// A server's stable integer id. Dense, starting at 0.
pub type ServerId = u32;

/// An anytrust group's stable integer id. `MASTER_GROUP` is distinguished
/// only for key-generation bootstrap.
pub type GroupId = u32;

pub const MASTER_GROUP: GroupId = 0;

/// A server's public identity as distributed out-of-band in a signed
/// configuration artifact (§6 server record).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerIdentity {
    pub id: ServerId,
    pub address: String,
    /// Ed25519 long-lived verification key used for link signatures.
    pub verification_key: [u8; POINT_SIZE],
    /// Edwards-curve DH public key used for authenticated encryption with
    /// clients and group members.
    pub public_key: [u8; POINT_SIZE],
}

/// An anytrust group: a set of server ids such that at least one is honest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnytrustGroup {
    pub gid: GroupId,
    pub servers: Vec<ServerId>,
}

impl AnytrustGroup {
    pub fn size(&self) -> usize {
        self.servers.len()
    }

    pub fn contains(&self, id: ServerId) -> bool {
        self.servers.contains(&id)
    }
}

/// The precomputed per-hop record binding a client's ephemeral verification
/// key to a shared AES key and the next-hop server, installed during path
/// establishment and consulted on every lightning-round onion parse.
///
/// `used` is a one-shot flag cleared at the start of each layer, asserted
/// on first use; reuse within the same layer is a `DuplicateError`.
#[derive(Debug, Clone)]
pub struct BootstrapKeyRecord {
    /// The client's ephemeral Ed25519 public key for signing messages
    /// arriving at this server on this layer; doubles as the forward
    /// lookup key.
    pub verification_key: [u8; POINT_SIZE],
    /// server_secret.diffie_hellman(verification_key).
    pub shared_key: [u8; 32],
    pub prev_server: ServerId,
    pub next_server: ServerId,
    /// The analogous pair for the link leaving this server, used when
    /// routing boomerangs / reverse traffic.
    pub outgoing_verification_key: [u8; POINT_SIZE],
    pub outgoing_shared_key: [u8; 32],
    pub used: bool,
}

impl BootstrapKeyRecord {
    pub fn new(
        verification_key: [u8; POINT_SIZE],
        shared_key: [u8; 32],
        prev_server: ServerId,
        next_server: ServerId,
        outgoing_verification_key: [u8; POINT_SIZE],
        outgoing_shared_key: [u8; 32],
    ) -> Self {
        Self {
            verification_key,
            shared_key,
            prev_server,
            next_server,
            outgoing_verification_key,
            outgoing_shared_key,
            used: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_contains_membership() {
        let g = AnytrustGroup {
            gid: 1,
            servers: vec![0, 3, 7],
        };
        assert!(g.contains(3));
        assert!(!g.contains(4));
        assert_eq!(g.size(), 3);
    }

    #[test]
    fn bootstrap_key_record_starts_unused() {
        let rec = BootstrapKeyRecord::new([1u8; 32], [2u8; 32], 0, 1, [3u8; 32], [4u8; 32]);
        assert!(!rec.used);
        assert_eq!(rec.prev_server, 0);
        assert_eq!(rec.next_server, 1);
    }

    #[test]
    fn server_identity_roundtrips_json() {
        let id = ServerIdentity {
            id: 2,
            address: "127.0.0.1:9000".into(),
            verification_key: [9u8; 32],
            public_key: [8u8; 32],
        };
        let json = serde_json::to_string(&id).unwrap();
        let back: ServerIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
