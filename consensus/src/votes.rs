//! Per-phase vote accumulation.
//!
//! A [`VoteAccumulator`] collects individual BLS signatures over one
//! phase's signing payload, enforcing one vote per validator. Once the
//! quorum threshold is reached it can be sealed into the immutable
//! (aggregate, bitmap) pair; anything arriving after the seal is ignored
//! as a duplicate.

use {
    crate::{
        bitmap::Bitmap,
        error::{ConsensusError, Result},
        roster::{Roster, ValidatorId},
    },
    meridian_bls::{aggregate, verify, BlsSignature},
    std::{collections::BTreeMap, sync::Arc},
};

/// Result of offering a vote to the accumulator.
#[derive(Debug)]
pub enum AddOutcome {
    /// The vote was new, verified, and counted.
    Accepted,
    /// The validator already voted in this phase, or the phase is sealed.
    Duplicate,
    /// The vote was invalid and discarded.
    Rejected(ConsensusError),
}

/// Collects one phase's individual signatures until quorum.
pub struct VoteAccumulator {
    roster: Arc<Roster>,
    /// The exact bytes every vote in this phase must sign.
    payload: Vec<u8>,
    votes: BTreeMap<ValidatorId, BlsSignature>,
    sealed: Option<(BlsSignature, Bitmap)>,
}

impl VoteAccumulator {
    /// Create an accumulator for a phase whose votes sign `payload`.
    pub fn new(roster: Arc<Roster>, payload: Vec<u8>) -> Self {
        Self {
            roster,
            payload,
            votes: BTreeMap::new(),
            sealed: None,
        }
    }

    /// Offer a vote. Verifies the signature against the phase payload under
    /// the validator's roster key before counting it.
    pub fn add(&mut self, validator: ValidatorId, signature: BlsSignature) -> AddOutcome {
        if self.sealed.is_some() {
            return AddOutcome::Duplicate;
        }
        let Some(pubkey) = self.roster.pubkey_of(validator) else {
            return AddOutcome::Rejected(ConsensusError::UnknownValidator(validator));
        };
        if self.votes.contains_key(&validator) {
            return AddOutcome::Duplicate;
        }
        if !verify(pubkey, &self.payload, &signature) {
            return AddOutcome::Rejected(ConsensusError::VoteVerifyFailed { validator });
        }
        self.votes.insert(validator, signature);
        AddOutcome::Accepted
    }

    /// Number of distinct votes collected.
    pub fn count(&self) -> usize {
        self.votes.len()
    }

    /// Quorum threshold for this roster.
    pub fn threshold(&self) -> usize {
        self.roster.threshold()
    }

    /// Whether enough votes are in to seal.
    pub fn has_quorum(&self) -> bool {
        self.votes.len() >= self.threshold()
    }

    /// Whether the phase has been sealed.
    pub fn is_sealed(&self) -> bool {
        self.sealed.is_some()
    }

    /// The bytes votes in this phase sign.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Seal the phase: aggregate the collected signatures and build the
    /// signer bitmap. Requires quorum; idempotent once sealed.
    pub fn seal(&mut self) -> Result<(BlsSignature, Bitmap)> {
        if let Some(sealed) = &self.sealed {
            return Ok(sealed.clone());
        }
        if !self.has_quorum() {
            return Err(ConsensusError::ThresholdNotMet {
                count: self.votes.len(),
                threshold: self.threshold(),
            });
        }
        let signatures: Vec<BlsSignature> = self.votes.values().copied().collect();
        let joint = aggregate(&signatures).map_err(|_| ConsensusError::AggregateVerifyFailed)?;
        let mut bitmap = Bitmap::new(self.roster.len());
        for validator in self.votes.keys() {
            bitmap.set(*validator as usize)?;
        }
        let sealed = (joint, bitmap);
        self.sealed = Some(sealed.clone());
        Ok(sealed)
    }

    /// The sealed (aggregate, bitmap) pair, if the phase is sealed.
    pub fn sealed(&self) -> Option<&(BlsSignature, Bitmap)> {
        self.sealed.as_ref()
    }
}
