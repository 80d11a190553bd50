//! Per-round state: the phase ladder and the round context.
//!
//! [`RoundContext`] owns everything a single consensus attempt accumulates
//! (block, vote maps, sealed aggregates) and exposes it read-only.
//! Mutation happens exclusively through the state machine in
//! [`engine`](crate::engine), so external code can observe the round but
//! never push it through a phase.

use {
    crate::{
        bitmap::Bitmap,
        block::BlockHash,
        roster::ValidatorId,
        votes::VoteAccumulator,
    },
    meridian_bls::BlsSignature,
    std::fmt,
};

/// Whether this node leads the view or follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Leader,
    Validator,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Leader => write!(f, "leader"),
            Role::Validator => write!(f, "validator"),
        }
    }
}

/// Phase of a consensus round.
///
/// Rounds only move forward along
/// `Idle → AnnounceDone → PrepareDone → CommitDone → Finished`;
/// `Aborted` is the failure sink. `CommitDone` appears on the leader path
/// only, between sealing the commit quorum and emitting the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Round created, nothing processed yet.
    Idle,
    /// Announce handled (validator) or broadcast (leader).
    AnnounceDone,
    /// Prepare quorum sealed (leader) or verified (validator).
    PrepareDone,
    /// Commit quorum sealed; decision about to be emitted (leader only).
    CommitDone,
    /// Block decided; `on_consensus_done` fired.
    Finished,
    /// Round discarded: deadline expired or unrecoverable inconsistency.
    Aborted,
}

impl Phase {
    fn rank(self) -> u8 {
        match self {
            Phase::Idle => 0,
            Phase::AnnounceDone => 1,
            Phase::PrepareDone => 2,
            Phase::CommitDone => 3,
            Phase::Finished => 4,
            Phase::Aborted => 5,
        }
    }

    /// Whether the round is over in this phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Finished | Phase::Aborted)
    }
}

impl PartialOrd for Phase {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Phase {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "Idle"),
            Phase::AnnounceDone => write!(f, "AnnounceDone"),
            Phase::PrepareDone => write!(f, "PrepareDone"),
            Phase::CommitDone => write!(f, "CommitDone"),
            Phase::Finished => write!(f, "Finished"),
            Phase::Aborted => write!(f, "Aborted"),
        }
    }
}

/// Everything one consensus attempt owns. Created when the round starts,
/// dropped when it reaches `Finished` or `Aborted`.
pub struct RoundContext {
    pub(crate) role: Role,
    pub(crate) view: u64,
    pub(crate) leader: ValidatorId,
    pub(crate) self_id: ValidatorId,
    pub(crate) phase: Phase,
    pub(crate) block: Option<Vec<u8>>,
    pub(crate) block_hash: Option<BlockHash>,
    pub(crate) prepare_votes: Option<VoteAccumulator>,
    pub(crate) commit_votes: Option<VoteAccumulator>,
    /// Sealed or verified prepare quorum (A₁, M₁).
    pub(crate) prepared: Option<(BlsSignature, Bitmap)>,
    /// The exact bytes commit votes sign: A₁ ‖ M₁.
    pub(crate) prepared_evidence: Option<Vec<u8>>,
    /// Sealed or verified commit quorum (A₂, M₂).
    pub(crate) committed: Option<(BlsSignature, Bitmap)>,
}

impl RoundContext {
    pub(crate) fn new(role: Role, view: u64, leader: ValidatorId, self_id: ValidatorId) -> Self {
        Self {
            role,
            view,
            leader,
            self_id,
            phase: Phase::Idle,
            block: None,
            block_hash: None,
            prepare_votes: None,
            commit_votes: None,
            prepared: None,
            prepared_evidence: None,
            committed: None,
        }
    }

    /// This node's role in the view.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The round's view id.
    pub fn view(&self) -> u64 {
        self.view
    }

    /// Roster id of the view leader.
    pub fn leader(&self) -> ValidatorId {
        self.leader
    }

    /// This node's roster id.
    pub fn self_id(&self) -> ValidatorId {
        self.self_id
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The proposed block bytes, once known.
    pub fn block(&self) -> Option<&[u8]> {
        self.block.as_deref()
    }

    /// The announced block hash, once known.
    pub fn block_hash(&self) -> Option<BlockHash> {
        self.block_hash
    }

    /// The sealed/verified prepare quorum (A₁, M₁), once available.
    pub fn prepared(&self) -> Option<&(BlsSignature, Bitmap)> {
        self.prepared.as_ref()
    }

    /// The commit signing payload A₁ ‖ M₁, once available.
    pub fn prepared_evidence(&self) -> Option<&[u8]> {
        self.prepared_evidence.as_deref()
    }

    /// The sealed/verified commit quorum (A₂, M₂), once available.
    pub fn committed(&self) -> Option<&(BlsSignature, Bitmap)> {
        self.committed.as_ref()
    }

    /// Advance the phase. Transitions are monotonic; an attempt to move
    /// backwards is ignored (and logged), keeping the ladder observable
    /// only in one direction.
    pub(crate) fn advance(&mut self, next: Phase) {
        if next != Phase::Aborted && next <= self.phase {
            log::warn!(
                "round view={} ignoring backwards transition {} -> {}",
                self.view,
                self.phase,
                next
            );
            return;
        }
        log::info!(
            "round view={} {}: {} -> {}",
            self.view,
            self.role,
            self.phase,
            next
        );
        self.phase = next;
    }
}
