//! Capability contracts the round consumes.
//!
//! The round core never talks to sockets or databases. It is handed two
//! narrow trait objects at construction: a [`Host`] that moves envelope
//! bytes to the validator group, and an optional [`ChainReader`] that
//! answers "what is the current head?". Everything else (peer discovery,
//! connection management, block storage) lives behind these seams.

use {
    crate::{block::BlockHeader, roster::ValidatorId},
    meridian_bls::BlsPublicKey,
    serde::{Deserialize, Serialize},
    std::net::SocketAddr,
};

/// Broadcast target group. The round only ever addresses the validator
/// group of its roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupId {
    /// All validators in the current roster.
    Validators,
}

/// Identity and address of a peer on the consensus network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Roster position of this peer.
    pub validator_id: ValidatorId,
    /// The peer's consensus BLS public key.
    pub pubkey: BlsPublicKey,
    /// Network address the peer is reachable on.
    pub addr: SocketAddr,
}

/// Outbound side of the network layer, as seen by the round.
///
/// `broadcast` is fire-and-forget and must not block the round's task:
/// implementations hand the payload to a dedicated sender task.
pub trait Host: Send + Sync {
    /// Queue an envelope for delivery to every member of `group`.
    fn broadcast(&self, group: GroupId, payload: Vec<u8>);

    /// This node's own peer record.
    fn self_peer(&self) -> PeerInfo;
}

/// Read-only view of the local chain head.
pub trait ChainReader: Send + Sync {
    /// The current head header.
    fn current_header(&self) -> BlockHeader;
}
