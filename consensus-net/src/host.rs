//! TCP-backed implementation of the round's [`Host`] contract.
//!
//! [`TcpHost::spawn`] starts a dedicated outbound sender task; the round's
//! `broadcast` calls only enqueue bytes onto its channel and never touch
//! the network on the round's own task. [`forward_inbound`] bridges a
//! [`TransportHandle`] into the `(group, bytes)` queue the round driver
//! consumes.

use {
    crate::{
        config::NetConfig,
        transport::{broadcast_frames, TransportHandle},
    },
    log::{debug, warn},
    meridian_consensus::host::{GroupId, Host, PeerInfo},
    std::net::SocketAddr,
    tokio::sync::mpsc,
};

/// Fire-and-forget broadcaster over per-send TCP connections.
pub struct TcpHost {
    self_peer: PeerInfo,
    outbound_tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl TcpHost {
    /// Start the outbound sender task and return the host handle.
    ///
    /// Must be called from within a Tokio runtime. `peer_addrs` is the
    /// validator group this host broadcasts to (excluding ourselves).
    pub fn spawn(config: NetConfig, self_peer: PeerInfo, peer_addrs: Vec<SocketAddr>) -> Self {
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let max_size = config.max_message_size;

        tokio::spawn(async move {
            while let Some(payload) = outbound_rx.recv().await {
                let failures = broadcast_frames(&peer_addrs, &payload, max_size).await;
                for (addr, e) in failures {
                    warn!("broadcast to {addr} failed: {e}");
                }
            }
            debug!("outbound sender task stopped");
        });

        Self {
            self_peer,
            outbound_tx,
        }
    }
}

impl Host for TcpHost {
    fn broadcast(&self, _group: GroupId, payload: Vec<u8>) {
        if self.outbound_tx.send(payload).is_err() {
            warn!("outbound sender task gone, dropping broadcast");
        }
    }

    fn self_peer(&self) -> PeerInfo {
        self.self_peer.clone()
    }
}

/// Pump frames from a transport listener into a round driver's inbound
/// queue. The task stops when either side goes away.
pub fn forward_inbound(
    handle: TransportHandle,
    driver_tx: mpsc::Sender<(GroupId, Vec<u8>)>,
) {
    let mut inbound_rx = handle.inbound_rx;
    tokio::spawn(async move {
        while let Some(frame) = inbound_rx.recv().await {
            if driver_tx
                .send((GroupId::Validators, frame.payload))
                .await
                .is_err()
            {
                debug!("round driver gone, stopping inbound forwarder");
                break;
            }
        }
    });
}
