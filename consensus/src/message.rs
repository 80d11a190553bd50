//! Wire messages and the signed envelope.
//!
//! Five inner message kinds travel between validators during a round:
//! announce, prepare, prepared, commit, committed. Every one of them is
//! wrapped in an [`Envelope`] whose BLS signature covers the canonical
//! preimage `kind ‖ view(le) ‖ inner_bytes`, so authenticity is checked
//! before any payload field can influence round state.
//!
//! Payloads are bincode-encoded. The commit phase signs the *prepared
//! evidence* (the sealed prepare aggregate concatenated with its bitmap)
//! rather than the block hash, which makes the final committed certificate
//! self-contained: it proves both the block and that a valid prepare
//! quorum was observed.

use {
    crate::{
        block::BlockHash,
        error::{ConsensusError, Result},
        roster::{Roster, ValidatorId},
    },
    meridian_bls::{sign, verify, BlsPublicKey, BlsSecretKey, BlsSignature},
    serde::{Deserialize, Serialize},
};

/// Discriminant of the inner message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Announce,
    Prepare,
    Prepared,
    Commit,
    Committed,
}

impl MessageKind {
    /// Wire tag of this kind.
    pub fn as_u8(self) -> u8 {
        match self {
            MessageKind::Announce => 0,
            MessageKind::Prepare => 1,
            MessageKind::Prepared => 2,
            MessageKind::Commit => 3,
            MessageKind::Committed => 4,
        }
    }

    /// Parse a wire tag.
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(MessageKind::Announce),
            1 => Some(MessageKind::Prepare),
            2 => Some(MessageKind::Prepared),
            3 => Some(MessageKind::Commit),
            4 => Some(MessageKind::Committed),
            _ => None,
        }
    }

    /// Human-readable tag for logging.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Announce => "announce",
            MessageKind::Prepare => "prepare",
            MessageKind::Prepared => "prepared",
            MessageKind::Commit => "commit",
            MessageKind::Committed => "committed",
        }
    }

    /// Whether only the view's leader may send this kind.
    pub fn leader_only(self) -> bool {
        matches!(
            self,
            MessageKind::Announce | MessageKind::Prepared | MessageKind::Committed
        )
    }
}

/// Inner payload of a consensus message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConsensusPayload {
    /// Leader proposes a block for the view.
    Announce {
        view: u64,
        block_hash: BlockHash,
        block: Vec<u8>,
    },
    /// Validator vote over the announced block hash.
    Prepare {
        view: u64,
        block_hash: BlockHash,
        validator_id: ValidatorId,
        signature: BlsSignature,
    },
    /// Leader's sealed prepare quorum: aggregate plus signer bitmap.
    Prepared {
        view: u64,
        block_hash: BlockHash,
        aggregate: BlsSignature,
        bitmap: Vec<u8>,
    },
    /// Validator vote over the prepared evidence (aggregate ‖ bitmap).
    Commit {
        view: u64,
        block_hash: BlockHash,
        validator_id: ValidatorId,
        signature: BlsSignature,
    },
    /// Leader's sealed commit quorum, embedding the prepared evidence it
    /// certifies.
    Committed {
        view: u64,
        block_hash: BlockHash,
        aggregate: BlsSignature,
        bitmap: Vec<u8>,
        prepared_evidence: Vec<u8>,
    },
}

impl ConsensusPayload {
    /// Kind discriminant of this payload.
    pub fn kind(&self) -> MessageKind {
        match self {
            ConsensusPayload::Announce { .. } => MessageKind::Announce,
            ConsensusPayload::Prepare { .. } => MessageKind::Prepare,
            ConsensusPayload::Prepared { .. } => MessageKind::Prepared,
            ConsensusPayload::Commit { .. } => MessageKind::Commit,
            ConsensusPayload::Committed { .. } => MessageKind::Committed,
        }
    }

    /// View id carried by this payload.
    pub fn view(&self) -> u64 {
        match self {
            ConsensusPayload::Announce { view, .. }
            | ConsensusPayload::Prepare { view, .. }
            | ConsensusPayload::Prepared { view, .. }
            | ConsensusPayload::Commit { view, .. }
            | ConsensusPayload::Committed { view, .. } => *view,
        }
    }

    /// Block hash referenced by this payload.
    pub fn block_hash(&self) -> BlockHash {
        match self {
            ConsensusPayload::Announce { block_hash, .. }
            | ConsensusPayload::Prepare { block_hash, .. }
            | ConsensusPayload::Prepared { block_hash, .. }
            | ConsensusPayload::Commit { block_hash, .. }
            | ConsensusPayload::Committed { block_hash, .. } => *block_hash,
        }
    }
}

/// The commit-phase signing payload: sealed prepare aggregate followed by
/// its serialized bitmap.
pub fn prepared_evidence(aggregate: &BlsSignature, bitmap_bytes: &[u8]) -> Vec<u8> {
    let mut evidence = Vec::with_capacity(bitmap_bytes.len().saturating_add(96));
    evidence.extend_from_slice(aggregate.as_bytes());
    evidence.extend_from_slice(bitmap_bytes);
    evidence
}

/// Outer wire record: every consensus message travels as one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Wire tag of the inner payload ([`MessageKind`]).
    pub kind: u8,
    /// View id, duplicated from the payload for pre-decode filtering.
    pub view: u64,
    /// Sender's BLS public key (48 bytes, G1 compressed).
    pub sender: BlsPublicKey,
    /// Bincode-encoded [`ConsensusPayload`].
    pub inner: Vec<u8>,
    /// Sender's signature over `kind ‖ view(le) ‖ inner`.
    pub signature: BlsSignature,
}

fn signing_preimage(kind: u8, view: u64, inner: &[u8]) -> Vec<u8> {
    let mut preimage = Vec::with_capacity(inner.len().saturating_add(9));
    preimage.push(kind);
    preimage.extend_from_slice(&view.to_le_bytes());
    preimage.extend_from_slice(inner);
    preimage
}

impl Envelope {
    /// Encode and sign a payload on behalf of `sk`'s key.
    pub fn seal(payload: &ConsensusPayload, sk: &BlsSecretKey) -> Result<Self> {
        let inner = bincode::serialize(payload)?;
        let kind = payload.kind().as_u8();
        let view = payload.view();
        let signature = sign(sk, &signing_preimage(kind, view, &inner));
        Ok(Self {
            kind,
            view,
            sender: sk.public_key(),
            inner,
            signature,
        })
    }

    /// Serialize the envelope for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode an envelope, authenticate it, and parse the inner payload.
    ///
    /// Validation order matters: sender roster membership and the envelope
    /// signature are checked before the inner payload is even decoded, so
    /// nothing unauthenticated reaches round state.
    pub fn open(bytes: &[u8], roster: &Roster) -> Result<(Envelope, ConsensusPayload)> {
        let envelope: Envelope = bincode::deserialize(bytes)
            .map_err(|e| ConsensusError::BadEnvelope(format!("undecodable envelope: {e}")))?;
        let Some(kind) = MessageKind::from_u8(envelope.kind) else {
            return Err(ConsensusError::BadEnvelope(format!(
                "unknown message kind {}",
                envelope.kind
            )));
        };
        if !roster.contains(&envelope.sender) {
            return Err(ConsensusError::BadSender(envelope.sender));
        }
        let preimage = signing_preimage(envelope.kind, envelope.view, &envelope.inner);
        if !verify(&envelope.sender, &preimage, &envelope.signature) {
            return Err(ConsensusError::BadEnvelope(
                "envelope signature verification failed".to_string(),
            ));
        }
        let payload: ConsensusPayload = bincode::deserialize(&envelope.inner)
            .map_err(|e| ConsensusError::BadEnvelope(format!("undecodable payload: {e}")))?;
        if payload.kind() != kind || payload.view() != envelope.view {
            return Err(ConsensusError::BadEnvelope(
                "envelope and payload disagree on kind or view".to_string(),
            ));
        }
        Ok((envelope, payload))
    }
}
