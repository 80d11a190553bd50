//! Error types for the consensus round.
//!
//! Every inbound message is validated before it can touch round state;
//! failures surface as one of these kinds. Almost all of them are recovered
//! locally by dropping the offending message. Only
//! [`InconsistentPreparedEvidence`](ConsensusError::InconsistentPreparedEvidence)
//! and [`Timeout`](ConsensusError::Timeout) abort the round.

use {
    crate::{roster::ValidatorId, round::Phase},
    meridian_bls::BlsPublicKey,
    thiserror::Error,
};

/// Errors raised while processing a consensus round.
#[derive(Error, Debug)]
pub enum ConsensusError {
    /// Envelope undecodable, signature invalid, or envelope/payload fields
    /// disagree.
    #[error("invalid envelope: {0}")]
    BadEnvelope(String),

    /// Envelope sender is not a roster member, or a leader-only message did
    /// not come from the view's leader.
    #[error("unauthorized sender {0:?}")]
    BadSender(BlsPublicKey),

    /// Message carries a view id other than the round's.
    #[error("wrong view: got {got}, expected {expected}")]
    WrongView { got: u64, expected: u64 },

    /// Message kind is not legal in the current phase (or for this role).
    #[error("{kind} not legal in phase {phase}")]
    WrongPhase { kind: &'static str, phase: Phase },

    /// Referenced block hash disagrees with the announced one.
    #[error("block hash mismatch")]
    HashMismatch,

    /// Bitmap population is below the quorum threshold.
    #[error("bitmap carries {count} signers, threshold is {threshold}")]
    ThresholdNotMet { count: usize, threshold: usize },

    /// BLS aggregate verification failed against the bitmap's key set.
    #[error("aggregate signature verification failed")]
    AggregateVerifyFailed,

    /// An individual vote signature failed verification.
    #[error("vote from validator {validator} failed verification")]
    VoteVerifyFailed { validator: ValidatorId },

    /// Referenced validator id is not in the roster.
    #[error("unknown validator id {0}")]
    UnknownValidator(ValidatorId),

    /// Bitmap bytes have the wrong width or nonzero trailing bits.
    #[error("invalid bitmap: {0}")]
    BadBitmap(String),

    /// Announced block exceeds the configured size bound.
    #[error("block too large: {size} bytes (max {max})")]
    BlockTooLarge { size: usize, max: usize },

    /// The prepared evidence embedded in a committed message differs from
    /// the evidence this node verified and signed. Fatal for the round.
    #[error("committed message carries inconsistent prepared evidence")]
    InconsistentPreparedEvidence,

    /// The view deadline expired before the round finished. Fatal for the
    /// round.
    #[error("view deadline expired")]
    Timeout,

    /// Failed to serialize an outbound message.
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// The inbound message channel closed while the round was running.
    #[error("inbound channel closed")]
    ChannelClosed,
}

impl ConsensusError {
    /// Whether this error aborts the round instead of just dropping the
    /// message that caused it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConsensusError::InconsistentPreparedEvidence | ConsensusError::Timeout
        )
    }
}

/// Convenience result type for consensus operations.
pub type Result<T> = std::result::Result<T, ConsensusError>;
