//! The round state machine.
//!
//! One engine drives one consensus attempt, for both roles: the leader and
//! validator paths are two branches through the same phase ladder,
//! discriminated by [`Role`]. The engine is deterministic and does no I/O:
//! given the same envelopes in the same order it produces the same
//! transitions and the same [`RoundOutput`]s. Broadcasting the output and
//! pulling the inbound queue belong to the [`driver`](crate::driver).
//!
//! Validation happens strictly outside-in: envelope authenticity (codec),
//! then view, then leader-only sender checks, then phase legality, then the
//! payload's own proofs. A message that fails any step is dropped without
//! touching round state; only inconsistent prepared evidence and the view
//! deadline abort the round.

use {
    crate::{
        bitmap::Bitmap,
        block::{hash_block, BlockHash},
        config::RoundConfig,
        error::{ConsensusError, Result},
        host::ChainReader,
        message::{prepared_evidence, ConsensusPayload, Envelope, MessageKind},
        roster::{Roster, ValidatorId},
        round::{Phase, Role, RoundContext},
        votes::{AddOutcome, VoteAccumulator},
    },
    log::{debug, info, warn},
    meridian_bls::{sign, verify_aggregate, BlsPublicKey, BlsSecretKey, BlsSignature},
    std::sync::Arc,
};

/// Result of feeding one event to the engine.
#[derive(Debug, Default)]
pub struct RoundOutput {
    /// Envelopes to broadcast to the validator group.
    pub broadcasts: Vec<Envelope>,
    /// The decided block, present exactly once per successful round.
    pub decided: Option<Vec<u8>>,
}

impl RoundOutput {
    fn empty() -> Self {
        Self::default()
    }

    fn with_broadcast(envelope: Envelope) -> Self {
        Self {
            broadcasts: vec![envelope],
            decided: None,
        }
    }
}

/// State machine for a single consensus round.
pub struct RoundEngine {
    config: RoundConfig,
    roster: Arc<Roster>,
    secret_key: BlsSecretKey,
    chain: Option<Arc<dyn ChainReader>>,
    ctx: RoundContext,
}

impl RoundEngine {
    /// Create an engine for `view`. The role falls out of whether
    /// `self_id` equals `leader`.
    pub fn new(
        config: RoundConfig,
        roster: Arc<Roster>,
        self_id: ValidatorId,
        secret_key: BlsSecretKey,
        view: u64,
        leader: ValidatorId,
        chain: Option<Arc<dyn ChainReader>>,
    ) -> Result<Self> {
        let Some(self_pk) = roster.pubkey_of(self_id) else {
            return Err(ConsensusError::UnknownValidator(self_id));
        };
        if *self_pk != secret_key.public_key() {
            return Err(ConsensusError::BadSender(secret_key.public_key()));
        }
        if roster.pubkey_of(leader).is_none() {
            return Err(ConsensusError::UnknownValidator(leader));
        }
        let role = if self_id == leader {
            Role::Leader
        } else {
            Role::Validator
        };
        Ok(Self {
            config,
            roster,
            secret_key,
            chain,
            ctx: RoundContext::new(role, view, leader, self_id),
        })
    }

    /// Read-only view of the round's state.
    pub fn context(&self) -> &RoundContext {
        &self.ctx
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.ctx.phase()
    }

    /// The round configuration.
    pub fn config(&self) -> &RoundConfig {
        &self.config
    }

    // -- Leader entry point --

    /// Begin the round with a block proposal. Leader only, from `Idle`.
    ///
    /// The leader's own prepare signature enters the accumulator before the
    /// announce broadcast is queued, so a tiny roster can already have
    /// quorum when the announce leaves.
    pub fn start(&mut self, block: Vec<u8>) -> Result<RoundOutput> {
        if self.ctx.role() != Role::Leader || self.ctx.phase() != Phase::Idle {
            return Err(ConsensusError::WrongPhase {
                kind: MessageKind::Announce.as_str(),
                phase: self.ctx.phase(),
            });
        }
        if block.len() > self.config.max_block_size {
            return Err(ConsensusError::BlockTooLarge {
                size: block.len(),
                max: self.config.max_block_size,
            });
        }

        let block_hash = hash_block(&block);
        info!(
            "view {} leader announcing block {} ({} bytes)",
            self.ctx.view(),
            block_hash,
            block.len()
        );

        let mut votes =
            VoteAccumulator::new(self.roster.clone(), block_hash.as_bytes().to_vec());
        let own = sign(&self.secret_key, block_hash.as_bytes());
        if let AddOutcome::Rejected(e) = votes.add(self.ctx.self_id(), own) {
            return Err(e);
        }

        let envelope = Envelope::seal(
            &ConsensusPayload::Announce {
                view: self.ctx.view(),
                block_hash,
                block: block.clone(),
            },
            &self.secret_key,
        )?;

        self.ctx.block = Some(block);
        self.ctx.block_hash = Some(block_hash);
        self.ctx.prepare_votes = Some(votes);
        self.ctx.advance(Phase::AnnounceDone);

        let mut out = RoundOutput::with_broadcast(envelope);
        self.try_seal_prepare(&mut out)?;
        Ok(out)
    }

    // -- Inbound dispatch --

    /// Authenticate and process one inbound envelope.
    pub fn handle_envelope(&mut self, bytes: &[u8]) -> Result<RoundOutput> {
        let (envelope, payload) = Envelope::open(bytes, &self.roster)?;

        if envelope.view != self.ctx.view() {
            return Err(ConsensusError::WrongView {
                got: envelope.view,
                expected: self.ctx.view(),
            });
        }

        let kind = payload.kind();
        if kind.leader_only() && !self.is_leader_key(&envelope.sender) {
            return Err(ConsensusError::BadSender(envelope.sender));
        }
        if self.ctx.phase().is_terminal() {
            return Err(ConsensusError::WrongPhase {
                kind: kind.as_str(),
                phase: self.ctx.phase(),
            });
        }

        match (self.ctx.role(), payload) {
            (
                Role::Leader,
                ConsensusPayload::Prepare {
                    block_hash,
                    validator_id,
                    signature,
                    ..
                },
            ) => self.on_prepare(&envelope.sender, block_hash, validator_id, signature),
            (
                Role::Leader,
                ConsensusPayload::Commit {
                    block_hash,
                    validator_id,
                    signature,
                    ..
                },
            ) => self.on_commit(&envelope.sender, block_hash, validator_id, signature),
            (
                Role::Validator,
                ConsensusPayload::Announce {
                    block_hash, block, ..
                },
            ) => self.on_announce(block_hash, block),
            (
                Role::Validator,
                ConsensusPayload::Prepared {
                    block_hash,
                    aggregate,
                    bitmap,
                    ..
                },
            ) => self.on_prepared(block_hash, aggregate, bitmap),
            (
                Role::Validator,
                ConsensusPayload::Committed {
                    block_hash,
                    aggregate,
                    bitmap,
                    prepared_evidence,
                    ..
                },
            ) => self.on_committed(block_hash, aggregate, bitmap, prepared_evidence),
            _ => Err(ConsensusError::WrongPhase {
                kind: kind.as_str(),
                phase: self.ctx.phase(),
            }),
        }
    }

    /// The view deadline expired: abort the round.
    pub fn on_deadline(&mut self) {
        if !self.ctx.phase().is_terminal() {
            warn!(
                "view {} deadline expired in phase {}",
                self.ctx.view(),
                self.ctx.phase()
            );
            self.ctx.advance(Phase::Aborted);
        }
    }

    fn is_leader_key(&self, sender: &BlsPublicKey) -> bool {
        self.roster
            .pubkey_of(self.ctx.leader())
            .is_some_and(|pk| pk == sender)
    }

    fn check_block_hash(&self, block_hash: BlockHash) -> Result<()> {
        if self.ctx.block_hash() != Some(block_hash) {
            return Err(ConsensusError::HashMismatch);
        }
        Ok(())
    }

    /// The envelope signer must be the validator the vote claims to be
    /// from; otherwise a member could replay another member's vote under
    /// its own envelope.
    fn check_vote_sender(&self, sender: &BlsPublicKey, validator_id: ValidatorId) -> Result<()> {
        if self.roster.id_of(sender) != Some(validator_id) {
            return Err(ConsensusError::BadSender(*sender));
        }
        Ok(())
    }

    // -- Leader path --

    fn on_prepare(
        &mut self,
        sender: &BlsPublicKey,
        block_hash: BlockHash,
        validator_id: ValidatorId,
        signature: BlsSignature,
    ) -> Result<RoundOutput> {
        if !matches!(self.ctx.phase(), Phase::AnnounceDone | Phase::PrepareDone) {
            return Err(ConsensusError::WrongPhase {
                kind: MessageKind::Prepare.as_str(),
                phase: self.ctx.phase(),
            });
        }
        self.check_block_hash(block_hash)?;
        self.check_vote_sender(sender, validator_id)?;

        let outcome = match self.ctx.prepare_votes.as_mut() {
            Some(votes) => votes.add(validator_id, signature),
            None => {
                return Err(ConsensusError::WrongPhase {
                    kind: MessageKind::Prepare.as_str(),
                    phase: self.ctx.phase(),
                })
            }
        };
        match outcome {
            AddOutcome::Accepted => {
                debug!(
                    "view {} prepare vote from {} accepted",
                    self.ctx.view(),
                    validator_id
                );
                let mut out = RoundOutput::empty();
                self.try_seal_prepare(&mut out)?;
                Ok(out)
            }
            AddOutcome::Duplicate => {
                debug!(
                    "view {} duplicate prepare from {}",
                    self.ctx.view(),
                    validator_id
                );
                Ok(RoundOutput::empty())
            }
            AddOutcome::Rejected(e) => Err(e),
        }
    }

    fn try_seal_prepare(&mut self, out: &mut RoundOutput) -> Result<()> {
        let sealed = {
            let Some(votes) = self.ctx.prepare_votes.as_mut() else {
                return Ok(());
            };
            if votes.is_sealed() || !votes.has_quorum() {
                return Ok(());
            }
            votes.seal()?
        };
        let (aggregate, bitmap) = sealed;
        let Some(block_hash) = self.ctx.block_hash() else {
            return Ok(());
        };

        let bitmap_bytes = bitmap.to_bytes();
        let evidence = prepared_evidence(&aggregate, &bitmap_bytes);
        info!(
            "view {} prepare quorum sealed with {} signers",
            self.ctx.view(),
            bitmap.count()
        );

        let envelope = Envelope::seal(
            &ConsensusPayload::Prepared {
                view: self.ctx.view(),
                block_hash,
                aggregate,
                bitmap: bitmap_bytes,
            },
            &self.secret_key,
        )?;

        // Open the commit phase and vote in it before the prepared
        // broadcast is queued, mirroring the announce ordering.
        let mut commit_votes = VoteAccumulator::new(self.roster.clone(), evidence.clone());
        let own = sign(&self.secret_key, &evidence);
        if let AddOutcome::Rejected(e) = commit_votes.add(self.ctx.self_id(), own) {
            return Err(e);
        }

        self.ctx.prepared = Some((aggregate, bitmap));
        self.ctx.prepared_evidence = Some(evidence);
        self.ctx.commit_votes = Some(commit_votes);
        self.ctx.advance(Phase::PrepareDone);
        out.broadcasts.push(envelope);

        self.try_seal_commit(out)
    }

    fn on_commit(
        &mut self,
        sender: &BlsPublicKey,
        block_hash: BlockHash,
        validator_id: ValidatorId,
        signature: BlsSignature,
    ) -> Result<RoundOutput> {
        if self.ctx.phase() != Phase::PrepareDone {
            return Err(ConsensusError::WrongPhase {
                kind: MessageKind::Commit.as_str(),
                phase: self.ctx.phase(),
            });
        }
        self.check_block_hash(block_hash)?;
        self.check_vote_sender(sender, validator_id)?;

        let outcome = match self.ctx.commit_votes.as_mut() {
            Some(votes) => votes.add(validator_id, signature),
            None => {
                return Err(ConsensusError::WrongPhase {
                    kind: MessageKind::Commit.as_str(),
                    phase: self.ctx.phase(),
                })
            }
        };
        match outcome {
            AddOutcome::Accepted => {
                debug!(
                    "view {} commit vote from {} accepted",
                    self.ctx.view(),
                    validator_id
                );
                let mut out = RoundOutput::empty();
                self.try_seal_commit(&mut out)?;
                Ok(out)
            }
            AddOutcome::Duplicate => Ok(RoundOutput::empty()),
            AddOutcome::Rejected(e) => Err(e),
        }
    }

    fn try_seal_commit(&mut self, out: &mut RoundOutput) -> Result<()> {
        let sealed = {
            let Some(votes) = self.ctx.commit_votes.as_mut() else {
                return Ok(());
            };
            if votes.is_sealed() || !votes.has_quorum() {
                return Ok(());
            }
            votes.seal()?
        };
        let (aggregate, bitmap) = sealed;
        let (Some(block_hash), Some(evidence), Some(block)) = (
            self.ctx.block_hash(),
            self.ctx.prepared_evidence.clone(),
            self.ctx.block.clone(),
        ) else {
            return Ok(());
        };

        info!(
            "view {} commit quorum sealed with {} signers, block decided",
            self.ctx.view(),
            bitmap.count()
        );

        let envelope = Envelope::seal(
            &ConsensusPayload::Committed {
                view: self.ctx.view(),
                block_hash,
                aggregate,
                bitmap: bitmap.to_bytes(),
                prepared_evidence: evidence,
            },
            &self.secret_key,
        )?;

        self.ctx.committed = Some((aggregate, bitmap));
        self.ctx.advance(Phase::CommitDone);
        out.broadcasts.push(envelope);
        out.decided = Some(block);
        self.ctx.advance(Phase::Finished);
        Ok(())
    }

    // -- Validator path --

    fn on_announce(&mut self, block_hash: BlockHash, block: Vec<u8>) -> Result<RoundOutput> {
        if self.ctx.phase() != Phase::Idle {
            return Err(ConsensusError::WrongPhase {
                kind: MessageKind::Announce.as_str(),
                phase: self.ctx.phase(),
            });
        }
        if block.len() > self.config.max_block_size {
            return Err(ConsensusError::BlockTooLarge {
                size: block.len(),
                max: self.config.max_block_size,
            });
        }
        if hash_block(&block) != block_hash {
            return Err(ConsensusError::HashMismatch);
        }
        if let Some(chain) = &self.chain {
            let head = chain.current_header();
            if self.ctx.view() <= head.height {
                return Err(ConsensusError::WrongView {
                    got: self.ctx.view(),
                    expected: head.height.saturating_add(1),
                });
            }
        }

        info!(
            "view {} announce accepted, block {} ({} bytes)",
            self.ctx.view(),
            block_hash,
            block.len()
        );

        // Keep our own prepare signature on the books even though only the
        // leader tallies it; the context then records our full vote trail.
        let mut votes =
            VoteAccumulator::new(self.roster.clone(), block_hash.as_bytes().to_vec());
        let own = sign(&self.secret_key, block_hash.as_bytes());
        if let AddOutcome::Rejected(e) = votes.add(self.ctx.self_id(), own) {
            return Err(e);
        }

        let envelope = Envelope::seal(
            &ConsensusPayload::Prepare {
                view: self.ctx.view(),
                block_hash,
                validator_id: self.ctx.self_id(),
                signature: own,
            },
            &self.secret_key,
        )?;

        self.ctx.block = Some(block);
        self.ctx.block_hash = Some(block_hash);
        self.ctx.prepare_votes = Some(votes);
        self.ctx.advance(Phase::AnnounceDone);
        Ok(RoundOutput::with_broadcast(envelope))
    }

    fn on_prepared(
        &mut self,
        block_hash: BlockHash,
        aggregate: BlsSignature,
        bitmap_bytes: Vec<u8>,
    ) -> Result<RoundOutput> {
        if self.ctx.phase() != Phase::AnnounceDone {
            return Err(ConsensusError::WrongPhase {
                kind: MessageKind::Prepared.as_str(),
                phase: self.ctx.phase(),
            });
        }
        self.check_block_hash(block_hash)?;

        let bitmap = Bitmap::from_bytes(&bitmap_bytes, self.roster.len())?;
        if bitmap.count() < self.roster.threshold() {
            return Err(ConsensusError::ThresholdNotMet {
                count: bitmap.count(),
                threshold: self.roster.threshold(),
            });
        }
        let pubkeys = self.roster.pubkeys_from_bitmap(&bitmap)?;
        if !verify_aggregate(&aggregate, block_hash.as_bytes(), &pubkeys) {
            return Err(ConsensusError::AggregateVerifyFailed);
        }

        let evidence = prepared_evidence(&aggregate, &bitmap_bytes);
        let commit_sig = sign(&self.secret_key, &evidence);
        info!(
            "view {} prepared quorum verified ({} signers), committing",
            self.ctx.view(),
            bitmap.count()
        );

        let envelope = Envelope::seal(
            &ConsensusPayload::Commit {
                view: self.ctx.view(),
                block_hash,
                validator_id: self.ctx.self_id(),
                signature: commit_sig,
            },
            &self.secret_key,
        )?;

        self.ctx.prepared = Some((aggregate, bitmap));
        self.ctx.prepared_evidence = Some(evidence);
        self.ctx.advance(Phase::PrepareDone);
        Ok(RoundOutput::with_broadcast(envelope))
    }

    fn on_committed(
        &mut self,
        block_hash: BlockHash,
        aggregate: BlsSignature,
        bitmap_bytes: Vec<u8>,
        evidence: Vec<u8>,
    ) -> Result<RoundOutput> {
        if self.ctx.phase() != Phase::PrepareDone {
            return Err(ConsensusError::WrongPhase {
                kind: MessageKind::Committed.as_str(),
                phase: self.ctx.phase(),
            });
        }
        self.check_block_hash(block_hash)?;

        // The embedded evidence must be byte-identical to what we verified
        // and signed in the prepared step. A leader equivocating here is
        // unrecoverable for the round.
        if self.ctx.prepared_evidence() != Some(evidence.as_slice()) {
            self.ctx.advance(Phase::Aborted);
            return Err(ConsensusError::InconsistentPreparedEvidence);
        }

        let bitmap = Bitmap::from_bytes(&bitmap_bytes, self.roster.len())?;
        if bitmap.count() < self.roster.threshold() {
            return Err(ConsensusError::ThresholdNotMet {
                count: bitmap.count(),
                threshold: self.roster.threshold(),
            });
        }
        let pubkeys = self.roster.pubkeys_from_bitmap(&bitmap)?;
        if !verify_aggregate(&aggregate, &evidence, &pubkeys) {
            return Err(ConsensusError::AggregateVerifyFailed);
        }

        let Some(block) = self.ctx.block.clone() else {
            return Err(ConsensusError::WrongPhase {
                kind: MessageKind::Committed.as_str(),
                phase: self.ctx.phase(),
            });
        };

        info!(
            "view {} committed quorum verified ({} signers), block decided",
            self.ctx.view(),
            bitmap.count()
        );
        self.ctx.committed = Some((aggregate, bitmap));
        self.ctx.advance(Phase::Finished);
        Ok(RoundOutput {
            broadcasts: Vec::new(),
            decided: Some(block),
        })
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{block::BlockHeader, host::ChainReader},
        meridian_bls::aggregate,
    };

    fn make_keys(n: usize) -> (Vec<BlsSecretKey>, Arc<Roster>) {
        let keys: Vec<BlsSecretKey> = (0..n).map(|_| BlsSecretKey::random()).collect();
        let roster = Arc::new(Roster::new(keys.iter().map(|sk| sk.public_key()).collect()));
        (keys, roster)
    }

    fn make_engine(
        keys: &[BlsSecretKey],
        roster: &Arc<Roster>,
        self_id: ValidatorId,
        leader: ValidatorId,
        view: u64,
    ) -> RoundEngine {
        RoundEngine::new(
            RoundConfig::dev_default(),
            roster.clone(),
            self_id,
            keys[self_id as usize].clone(),
            view,
            leader,
            None,
        )
        .unwrap()
    }

    fn make_block() -> Vec<u8> {
        // The announce carries the full opaque block; 677 bytes matches a
        // realistic small header-only block.
        (0..677).map(|i| (i % 251) as u8).collect()
    }

    fn envelope_bytes(payload: &ConsensusPayload, sk: &BlsSecretKey) -> Vec<u8> {
        Envelope::seal(payload, sk).unwrap().to_bytes().unwrap()
    }

    fn prepare_bytes(
        sk: &BlsSecretKey,
        id: ValidatorId,
        view: u64,
        block_hash: BlockHash,
    ) -> Vec<u8> {
        envelope_bytes(
            &ConsensusPayload::Prepare {
                view,
                block_hash,
                validator_id: id,
                signature: sign(sk, block_hash.as_bytes()),
            },
            sk,
        )
    }

    fn commit_bytes(
        sk: &BlsSecretKey,
        id: ValidatorId,
        view: u64,
        block_hash: BlockHash,
        evidence: &[u8],
    ) -> Vec<u8> {
        envelope_bytes(
            &ConsensusPayload::Commit {
                view,
                block_hash,
                validator_id: id,
                signature: sign(sk, evidence),
            },
            sk,
        )
    }

    fn announce_bytes(sk: &BlsSecretKey, view: u64, block: &[u8]) -> Vec<u8> {
        envelope_bytes(
            &ConsensusPayload::Announce {
                view,
                block_hash: hash_block(block),
                block: block.to_vec(),
            },
            sk,
        )
    }

    /// Build a valid Prepared message over `signer_ids`' real signatures.
    fn prepared_bytes(
        leader_sk: &BlsSecretKey,
        keys: &[BlsSecretKey],
        signer_ids: &[usize],
        view: u64,
        block_hash: BlockHash,
        n: usize,
    ) -> Vec<u8> {
        let sigs: Vec<BlsSignature> = signer_ids
            .iter()
            .map(|id| sign(&keys[*id], block_hash.as_bytes()))
            .collect();
        let agg = aggregate(&sigs).unwrap();
        let mut bitmap = Bitmap::new(n);
        for id in signer_ids {
            bitmap.set(*id).unwrap();
        }
        envelope_bytes(
            &ConsensusPayload::Prepared {
                view,
                block_hash,
                aggregate: agg,
                bitmap: bitmap.to_bytes(),
            },
            leader_sk,
        )
    }

    // ============================
    // Seed scenario 1: happy leader path, N=4, T=3
    // ============================

    #[test]
    fn test_leader_happy_path() {
        let (keys, roster) = make_keys(4);
        let mut leader = make_engine(&keys, &roster, 0, 0, 1);
        let block = make_block();
        let block_hash = hash_block(&block);

        let out = leader.start(block.clone()).unwrap();
        assert_eq!(out.broadcasts.len(), 1);
        assert_eq!(out.broadcasts[0].kind, MessageKind::Announce.as_u8());
        assert_eq!(leader.phase(), Phase::AnnounceDone);

        // First remote prepare: 2 of 3 needed, nothing sealed yet.
        let out = leader
            .handle_envelope(&prepare_bytes(&keys[1], 1, 1, block_hash))
            .unwrap();
        assert!(out.broadcasts.is_empty());
        assert_eq!(leader.phase(), Phase::AnnounceDone);

        // Second remote prepare reaches T=3 (leader's own vote counts).
        let out = leader
            .handle_envelope(&prepare_bytes(&keys[2], 2, 1, block_hash))
            .unwrap();
        assert_eq!(out.broadcasts.len(), 1);
        assert_eq!(out.broadcasts[0].kind, MessageKind::Prepared.as_u8());
        assert_eq!(leader.phase(), Phase::PrepareDone);

        let (_, prepare_bitmap) = leader.context().prepared().unwrap();
        assert_eq!(prepare_bitmap.count(), 3);
        let evidence = leader.context().prepared_evidence().unwrap().to_vec();

        // Two remote commits complete the commit quorum.
        let out = leader
            .handle_envelope(&commit_bytes(&keys[1], 1, 1, block_hash, &evidence))
            .unwrap();
        assert!(out.decided.is_none());
        let out = leader
            .handle_envelope(&commit_bytes(&keys[2], 2, 1, block_hash, &evidence))
            .unwrap();
        assert_eq!(out.broadcasts.len(), 1);
        assert_eq!(out.broadcasts[0].kind, MessageKind::Committed.as_u8());
        assert_eq!(out.decided, Some(block));
        assert_eq!(leader.phase(), Phase::Finished);
    }

    // ============================
    // Seed scenario 2: happy validator path, against a real leader
    // ============================

    #[test]
    fn test_validator_happy_path() {
        let (keys, roster) = make_keys(4);
        let mut leader = make_engine(&keys, &roster, 0, 0, 1);
        let mut validator = make_engine(&keys, &roster, 1, 0, 1);
        let block = make_block();
        let block_hash = hash_block(&block);

        let announce = leader.start(block.clone()).unwrap().broadcasts.remove(0);

        // Validator answers the announce with its prepare.
        let out = validator
            .handle_envelope(&announce.to_bytes().unwrap())
            .unwrap();
        assert_eq!(validator.phase(), Phase::AnnounceDone);
        assert_eq!(out.broadcasts.len(), 1);
        let validator_prepare = out.broadcasts[0].to_bytes().unwrap();

        // Leader collects the validator's prepare plus one more.
        leader.handle_envelope(&validator_prepare).unwrap();
        let mut out = leader
            .handle_envelope(&prepare_bytes(&keys[2], 2, 1, block_hash))
            .unwrap();
        let prepared = out.broadcasts.remove(0);

        // Validator verifies the prepared quorum and emits its commit.
        let out = validator
            .handle_envelope(&prepared.to_bytes().unwrap())
            .unwrap();
        assert_eq!(validator.phase(), Phase::PrepareDone);
        assert_eq!(out.broadcasts.len(), 1);
        let validator_commit = out.broadcasts[0].to_bytes().unwrap();

        // Leader seals the commit quorum and broadcasts committed.
        let evidence = leader.context().prepared_evidence().unwrap().to_vec();
        leader.handle_envelope(&validator_commit).unwrap();
        let mut out = leader
            .handle_envelope(&commit_bytes(&keys[2], 2, 1, block_hash, &evidence))
            .unwrap();
        let committed = out.broadcasts.remove(0);

        // Validator verifies the committed certificate and decides.
        let out = validator
            .handle_envelope(&committed.to_bytes().unwrap())
            .unwrap();
        assert_eq!(validator.phase(), Phase::Finished);
        assert_eq!(out.decided, Some(block));
    }

    // ============================
    // Seed scenario 3: prepared with insufficient bitmap
    // ============================

    #[test]
    fn test_prepared_below_threshold_dropped() {
        let (keys, roster) = make_keys(4);
        let mut validator = make_engine(&keys, &roster, 1, 0, 1);
        let block = make_block();
        let block_hash = hash_block(&block);

        validator
            .handle_envelope(&announce_bytes(&keys[0], 1, &block))
            .unwrap();

        // Only 2 signers, below T=3.
        let prepared = prepared_bytes(&keys[0], &keys, &[0, 1], 1, block_hash, 4);
        let err = validator.handle_envelope(&prepared).unwrap_err();
        assert!(matches!(
            err,
            ConsensusError::ThresholdNotMet {
                count: 2,
                threshold: 3
            }
        ));
        assert_eq!(validator.phase(), Phase::AnnounceDone);
    }

    // ============================
    // Seed scenario 4: prepared with forged aggregate
    // ============================

    #[test]
    fn test_prepared_forged_aggregate_dropped() {
        let (keys, roster) = make_keys(4);
        let mut validator = make_engine(&keys, &roster, 1, 0, 1);
        let block = make_block();
        let block_hash = hash_block(&block);

        validator
            .handle_envelope(&announce_bytes(&keys[0], 1, &block))
            .unwrap();

        // Well-formed G2 point, but not an aggregate over the block hash.
        let forged = sign(&keys[0], b"not the block hash");
        let mut bitmap = Bitmap::new(4);
        for id in 0..3 {
            bitmap.set(id).unwrap();
        }
        let prepared = envelope_bytes(
            &ConsensusPayload::Prepared {
                view: 1,
                block_hash,
                aggregate: forged,
                bitmap: bitmap.to_bytes(),
            },
            &keys[0],
        );
        let err = validator.handle_envelope(&prepared).unwrap_err();
        assert!(matches!(err, ConsensusError::AggregateVerifyFailed));
        assert_eq!(validator.phase(), Phase::AnnounceDone);
    }

    // ============================
    // Seed scenario 5: committed with altered prepared evidence
    // ============================

    #[test]
    fn test_committed_altered_evidence_aborts() {
        let (keys, roster) = make_keys(4);
        let mut validator = make_engine(&keys, &roster, 1, 0, 1);
        let block = make_block();
        let block_hash = hash_block(&block);

        validator
            .handle_envelope(&announce_bytes(&keys[0], 1, &block))
            .unwrap();
        validator
            .handle_envelope(&prepared_bytes(&keys[0], &keys, &[0, 1, 2], 1, block_hash, 4))
            .unwrap();
        assert_eq!(validator.phase(), Phase::PrepareDone);

        // Tamper with the evidence the committed message embeds.
        let mut evidence = validator.context().prepared_evidence().unwrap().to_vec();
        evidence[0] ^= 0x01;
        let commit_sigs: Vec<BlsSignature> =
            (0..3).map(|id| sign(&keys[id], &evidence)).collect();
        let mut bitmap = Bitmap::new(4);
        for id in 0..3 {
            bitmap.set(id).unwrap();
        }
        let committed = envelope_bytes(
            &ConsensusPayload::Committed {
                view: 1,
                block_hash,
                aggregate: aggregate(&commit_sigs).unwrap(),
                bitmap: bitmap.to_bytes(),
                prepared_evidence: evidence,
            },
            &keys[0],
        );

        let err = validator.handle_envelope(&committed).unwrap_err();
        assert!(matches!(err, ConsensusError::InconsistentPreparedEvidence));
        assert!(err.is_fatal());
        assert_eq!(validator.phase(), Phase::Aborted);
    }

    // ============================
    // Seed scenario 6: duplicate prepare from the same validator
    // ============================

    #[test]
    fn test_duplicate_prepare_counted_once() {
        let (keys, roster) = make_keys(4);
        let mut leader = make_engine(&keys, &roster, 0, 0, 1);
        let block = make_block();
        let block_hash = hash_block(&block);
        leader.start(block).unwrap();

        let prepare = prepare_bytes(&keys[1], 1, 1, block_hash);
        leader.handle_envelope(&prepare).unwrap();
        let out = leader.handle_envelope(&prepare).unwrap();
        assert!(out.broadcasts.is_empty());
        // Still below quorum: self + validator 1 only.
        assert_eq!(leader.phase(), Phase::AnnounceDone);

        // A third distinct vote seals with exactly 3 contributors.
        leader
            .handle_envelope(&prepare_bytes(&keys[3], 3, 1, block_hash))
            .unwrap();
        let (_, bitmap) = leader.context().prepared().unwrap();
        assert_eq!(bitmap.count(), 3);
    }

    // ============================
    // Message ordering and authenticity edge cases
    // ============================

    #[test]
    fn test_wrong_view_dropped() {
        let (keys, roster) = make_keys(4);
        let mut validator = make_engine(&keys, &roster, 1, 0, 1);
        let block = make_block();

        // Past and future views are both dropped silently.
        for view in [0u64, 5] {
            let err = validator
                .handle_envelope(&announce_bytes(&keys[0], view, &block))
                .unwrap_err();
            assert!(matches!(err, ConsensusError::WrongView { .. }));
        }
        assert_eq!(validator.phase(), Phase::Idle);
    }

    #[test]
    fn test_wrong_phase_dropped() {
        let (keys, roster) = make_keys(4);
        let mut validator = make_engine(&keys, &roster, 1, 0, 1);
        let block_hash = hash_block(&make_block());

        // Prepared before any announce.
        let prepared = prepared_bytes(&keys[0], &keys, &[0, 1, 2], 1, block_hash, 4);
        let err = validator.handle_envelope(&prepared).unwrap_err();
        assert!(matches!(err, ConsensusError::WrongPhase { .. }));
        assert_eq!(validator.phase(), Phase::Idle);
    }

    #[test]
    fn test_announce_from_non_leader_rejected() {
        let (keys, roster) = make_keys(4);
        let mut validator = make_engine(&keys, &roster, 1, 0, 1);
        // Validator 2 fakes an announce; it is a roster member but not the
        // view leader.
        let err = validator
            .handle_envelope(&announce_bytes(&keys[2], 1, &make_block()))
            .unwrap_err();
        assert!(matches!(err, ConsensusError::BadSender(_)));
        assert_eq!(validator.phase(), Phase::Idle);
    }

    #[test]
    fn test_announce_hash_mismatch_rejected() {
        let (keys, roster) = make_keys(4);
        let mut validator = make_engine(&keys, &roster, 1, 0, 1);
        let block = make_block();
        let announce = envelope_bytes(
            &ConsensusPayload::Announce {
                view: 1,
                block_hash: hash_block(b"some other block"),
                block,
            },
            &keys[0],
        );
        let err = validator.handle_envelope(&announce).unwrap_err();
        assert!(matches!(err, ConsensusError::HashMismatch));
    }

    #[test]
    fn test_vote_with_mismatched_sender_rejected() {
        let (keys, roster) = make_keys(4);
        let mut leader = make_engine(&keys, &roster, 0, 0, 1);
        let block = make_block();
        let block_hash = hash_block(&block);
        leader.start(block).unwrap();

        // Validator 1 wraps a vote that claims to be from validator 2.
        let prepare = envelope_bytes(
            &ConsensusPayload::Prepare {
                view: 1,
                block_hash,
                validator_id: 2,
                signature: sign(&keys[2], block_hash.as_bytes()),
            },
            &keys[1],
        );
        let err = leader.handle_envelope(&prepare).unwrap_err();
        assert!(matches!(err, ConsensusError::BadSender(_)));
    }

    #[test]
    fn test_stale_view_with_chain_reader() {
        struct FixedHead(u64);
        impl ChainReader for FixedHead {
            fn current_header(&self) -> BlockHeader {
                BlockHeader {
                    hash: hash_block(b"head"),
                    height: self.0,
                }
            }
        }

        let (keys, roster) = make_keys(4);
        let mut validator = RoundEngine::new(
            RoundConfig::dev_default(),
            roster,
            1,
            keys[1].clone(),
            3,
            0,
            Some(Arc::new(FixedHead(5))),
        )
        .unwrap();

        let err = validator
            .handle_envelope(&announce_bytes(&keys[0], 3, &make_block()))
            .unwrap_err();
        assert!(matches!(err, ConsensusError::WrongView { got: 3, .. }));
        assert_eq!(validator.phase(), Phase::Idle);
    }

    #[test]
    fn test_messages_after_finish_dropped() {
        let (keys, roster) = make_keys(1);
        let mut leader = make_engine(&keys, &roster, 0, 0, 0);
        // Single-validator roster: T=1, the round completes on start.
        let out = leader.start(make_block()).unwrap();
        assert_eq!(leader.phase(), Phase::Finished);
        assert!(out.decided.is_some());
        // Announce, prepared, and committed all leave in one burst.
        assert_eq!(out.broadcasts.len(), 3);
    }

    #[test]
    fn test_deadline_aborts() {
        let (keys, roster) = make_keys(4);
        let mut validator = make_engine(&keys, &roster, 1, 0, 1);
        validator.on_deadline();
        assert_eq!(validator.phase(), Phase::Aborted);
        // Terminal: a valid announce no longer moves the round.
        let err = validator
            .handle_envelope(&announce_bytes(&keys[0], 1, &make_block()))
            .unwrap_err();
        assert!(matches!(err, ConsensusError::WrongPhase { .. }));
    }

    #[test]
    fn test_start_rejected_for_validator_role() {
        let (keys, roster) = make_keys(4);
        let mut validator = make_engine(&keys, &roster, 1, 0, 1);
        assert!(matches!(
            validator.start(make_block()),
            Err(ConsensusError::WrongPhase { .. })
        ));
    }

    #[test]
    fn test_oversized_block_rejected() {
        let (keys, roster) = make_keys(4);
        let mut leader = make_engine(&keys, &roster, 0, 0, 1);
        let max = leader.config().max_block_size;
        assert!(matches!(
            leader.start(vec![0u8; max.saturating_add(1)]),
            Err(ConsensusError::BlockTooLarge { .. })
        ));
    }

    #[test]
    fn test_engine_rejects_mismatched_identity() {
        let (keys, roster) = make_keys(4);
        // Claim id 0 but hold validator 1's key.
        let result = RoundEngine::new(
            RoundConfig::dev_default(),
            roster,
            0,
            keys[1].clone(),
            0,
            0,
            None,
        );
        assert!(matches!(result, Err(ConsensusError::BadSender(_))));
    }

    #[test]
    fn test_phase_monotonic_over_happy_path() {
        let (keys, roster) = make_keys(4);
        let mut leader = make_engine(&keys, &roster, 0, 0, 1);
        let block = make_block();
        let block_hash = hash_block(&block);

        let mut observed = vec![leader.phase()];
        leader.start(block).unwrap();
        observed.push(leader.phase());
        for id in [1u32, 2] {
            let _ = leader.handle_envelope(&prepare_bytes(
                &keys[id as usize],
                id,
                1,
                block_hash,
            ));
            observed.push(leader.phase());
        }
        let evidence = leader.context().prepared_evidence().unwrap().to_vec();
        for id in [1u32, 2] {
            let _ = leader.handle_envelope(&commit_bytes(
                &keys[id as usize],
                id,
                1,
                block_hash,
                &evidence,
            ));
            observed.push(leader.phase());
        }
        assert!(observed.windows(2).all(|w| w[0] <= w[1]), "{observed:?}");
        assert_eq!(*observed.last().unwrap(), Phase::Finished);
    }
}
