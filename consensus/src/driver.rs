//! The round driver: a single-task pull loop around the engine.
//!
//! The driver is the only place the round touches time or channels. It
//! pulls envelopes off the inbound queue one at a time, feeds them to the
//! deterministic engine, pushes the engine's broadcasts through the
//! [`Host`] contract (which hands them to a sender task), and fires
//! `on_consensus_done` exactly once if the round decides. The only other
//! suspension point is the view deadline, which aborts the round.

use {
    crate::{
        engine::{RoundEngine, RoundOutput},
        host::{GroupId, Host},
        round::Phase,
    },
    log::{debug, warn},
    std::sync::Arc,
    tokio::{sync::mpsc, time},
};

/// Callback invoked with the decided block's bytes.
pub type ConsensusDoneFn = Box<dyn FnOnce(Vec<u8>) + Send>;

/// Drives one consensus round to a terminal phase.
pub struct RoundDriver {
    engine: RoundEngine,
    host: Arc<dyn Host>,
    inbound: mpsc::Receiver<(GroupId, Vec<u8>)>,
    on_consensus_done: Option<ConsensusDoneFn>,
}

impl RoundDriver {
    /// Wire a driver around an engine. `inbound` is the lazy sequence of
    /// `(group, envelope_bytes)` produced by the network layer.
    pub fn new(
        engine: RoundEngine,
        host: Arc<dyn Host>,
        inbound: mpsc::Receiver<(GroupId, Vec<u8>)>,
        on_consensus_done: impl FnOnce(Vec<u8>) + Send + 'static,
    ) -> Self {
        Self {
            engine,
            host,
            inbound,
            on_consensus_done: Some(Box::new(on_consensus_done)),
        }
    }

    /// Read-only access to the engine.
    pub fn engine(&self) -> &RoundEngine {
        &self.engine
    }

    /// Leader entry point: propose `block` and broadcast the announce.
    /// Call before [`run`](Self::run).
    pub fn start_proposal(&mut self, block: Vec<u8>) -> crate::error::Result<()> {
        let out = self.engine.start(block)?;
        self.dispatch(out);
        Ok(())
    }

    /// Run the round to a terminal phase and return it.
    ///
    /// Messages are processed strictly in arrival order; no transition is
    /// interruptible mid-phase. On deadline the engine aborts and pending
    /// broadcasts already handed to the sender task may still go out.
    pub async fn run(mut self) -> Phase {
        let deadline = time::sleep(self.engine.config().view_deadline());
        tokio::pin!(deadline);

        while !self.engine.phase().is_terminal() {
            tokio::select! {
                _ = &mut deadline => {
                    self.engine.on_deadline();
                    break;
                }
                inbound = self.inbound.recv() => {
                    let Some((_group, bytes)) = inbound else {
                        warn!(
                            "view {} inbound channel closed, aborting round",
                            self.engine.context().view()
                        );
                        self.engine.on_deadline();
                        break;
                    };
                    match self.engine.handle_envelope(&bytes) {
                        Ok(out) => self.dispatch(out),
                        Err(e) if e.is_fatal() => {
                            warn!(
                                "view {} fatal error: {e}",
                                self.engine.context().view()
                            );
                            break;
                        }
                        Err(e) => {
                            debug!(
                                "view {} dropping message: {e}",
                                self.engine.context().view()
                            );
                        }
                    }
                }
            }
        }

        self.engine.phase()
    }

    fn dispatch(&mut self, out: RoundOutput) {
        for envelope in out.broadcasts {
            match envelope.to_bytes() {
                Ok(bytes) => self.host.broadcast(GroupId::Validators, bytes),
                Err(e) => warn!(
                    "view {} failed to encode outbound envelope: {e}",
                    self.engine.context().view()
                ),
            }
        }
        if let Some(block) = out.decided {
            if let Some(callback) = self.on_consensus_done.take() {
                callback(block);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            block::hash_block,
            config::RoundConfig,
            engine::RoundEngine,
            host::PeerInfo,
            roster::Roster,
        },
        meridian_bls::BlsSecretKey,
        std::sync::Mutex,
        tokio::sync::mpsc,
    };

    /// Host that fans broadcasts out to a set of inbound channels
    /// (excluding the sender's own).
    struct MeshHost {
        self_peer: PeerInfo,
        peers: Vec<mpsc::Sender<(GroupId, Vec<u8>)>>,
    }

    impl Host for MeshHost {
        fn broadcast(&self, group: GroupId, payload: Vec<u8>) {
            for peer in &self.peers {
                let _ = peer.try_send((group, payload.clone()));
            }
        }

        fn self_peer(&self) -> PeerInfo {
            self.self_peer.clone()
        }
    }

    fn make_cluster(
        n: usize,
    ) -> (
        Vec<BlsSecretKey>,
        Arc<Roster>,
        Vec<mpsc::Sender<(GroupId, Vec<u8>)>>,
        Vec<mpsc::Receiver<(GroupId, Vec<u8>)>>,
    ) {
        let keys: Vec<BlsSecretKey> = (0..n).map(|_| BlsSecretKey::random()).collect();
        let roster = Arc::new(Roster::new(keys.iter().map(|sk| sk.public_key()).collect()));
        let mut senders = Vec::new();
        let mut receivers = Vec::new();
        for _ in 0..n {
            let (tx, rx) = mpsc::channel(256);
            senders.push(tx);
            receivers.push(rx);
        }
        (keys, roster, senders, receivers)
    }

    fn peer_info(id: u32, sk: &BlsSecretKey) -> PeerInfo {
        PeerInfo {
            validator_id: id,
            pubkey: sk.public_key(),
            addr: "127.0.0.1:0".parse().unwrap(),
        }
    }

    /// Full in-memory mesh: a leader and three validators complete a
    /// round; every node finishes and every callback sees the block.
    #[tokio::test]
    async fn test_full_mesh_round() {
        let (keys, roster, senders, mut receivers) = make_cluster(4);
        let block = vec![0x5Au8; 677];
        let decided: Arc<Mutex<Vec<(u32, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for id in (0..4u32).rev() {
            let engine = RoundEngine::new(
                RoundConfig {
                    view_deadline_ms: 2_000,
                    ..RoundConfig::dev_default()
                },
                roster.clone(),
                id,
                keys[id as usize].clone(),
                1,
                0,
                None,
            )
            .unwrap();
            // Broadcasts reach every other node, not the sender itself.
            let peers: Vec<_> = senders
                .iter()
                .enumerate()
                .filter(|(peer_id, _)| *peer_id != id as usize)
                .map(|(_, tx)| tx.clone())
                .collect();
            let host = Arc::new(MeshHost {
                self_peer: peer_info(id, &keys[id as usize]),
                peers,
            });
            let inbound = receivers.pop().unwrap();
            let decided = decided.clone();
            let mut driver = RoundDriver::new(engine, host, inbound, move |block| {
                decided.lock().unwrap().push((id, block));
            });
            if id == 0 {
                driver.start_proposal(block.clone()).unwrap();
            }
            handles.push(tokio::spawn(driver.run()));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Phase::Finished);
        }
        let decided = decided.lock().unwrap();
        assert_eq!(decided.len(), 4);
        for (_, got) in decided.iter() {
            assert_eq!(*got, block);
        }
    }

    /// A validator whose queue stays empty aborts at the deadline without
    /// firing the callback.
    #[tokio::test]
    async fn test_deadline_aborts_round() {
        let (keys, roster, senders, mut receivers) = make_cluster(4);
        let engine = RoundEngine::new(
            RoundConfig {
                view_deadline_ms: 50,
                ..RoundConfig::dev_default()
            },
            roster,
            1,
            keys[1].clone(),
            1,
            0,
            None,
        )
        .unwrap();
        let host = Arc::new(MeshHost {
            self_peer: peer_info(1, &keys[1]),
            peers: Vec::new(),
        });
        let fired = Arc::new(Mutex::new(false));
        let fired_in_cb = fired.clone();
        let driver = RoundDriver::new(engine, host, receivers.remove(1), move |_| {
            *fired_in_cb.lock().unwrap() = true;
        });

        // Keep the senders alive so recv() pends rather than closing.
        let phase = driver.run().await;
        drop(senders);
        assert_eq!(phase, Phase::Aborted);
        assert!(!*fired.lock().unwrap());
    }

    /// Garbage on the queue is dropped; the round still makes progress on
    /// the real traffic behind it.
    #[tokio::test]
    async fn test_garbage_is_dropped() {
        use crate::message::{ConsensusPayload, Envelope};

        struct CollectHost {
            self_peer: PeerInfo,
            sent: Arc<Mutex<Vec<Vec<u8>>>>,
        }
        impl Host for CollectHost {
            fn broadcast(&self, _group: GroupId, payload: Vec<u8>) {
                self.sent.lock().unwrap().push(payload);
            }
            fn self_peer(&self) -> PeerInfo {
                self.self_peer.clone()
            }
        }

        let (keys, roster, senders, mut receivers) = make_cluster(4);
        let engine = RoundEngine::new(
            RoundConfig::dev_default(),
            roster,
            1,
            keys[1].clone(),
            1,
            0,
            None,
        )
        .unwrap();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let host = Arc::new(CollectHost {
            self_peer: peer_info(1, &keys[1]),
            sent: sent.clone(),
        });
        let driver = RoundDriver::new(engine, host, receivers.remove(1), |_| {});

        let block = vec![9u8; 32];
        let announce = Envelope::seal(
            &ConsensusPayload::Announce {
                view: 1,
                block_hash: hash_block(&block),
                block,
            },
            &keys[0],
        )
        .unwrap()
        .to_bytes()
        .unwrap();
        senders[1]
            .try_send((GroupId::Validators, b"garbage".to_vec()))
            .unwrap();
        senders[1].try_send((GroupId::Validators, announce)).unwrap();
        // Close the queue after the two frames: the round processes both,
        // then aborts on channel close.
        drop(senders);

        let phase = driver.run().await;
        assert_eq!(phase, Phase::Aborted);
        // The garbage was dropped; the announce still produced our prepare.
        assert_eq!(sent.lock().unwrap().len(), 1);
    }
}
