//! TCP transport for consensus envelope delivery.
//!
//! Provides the low-level plumbing that moves framed envelope bytes
//! between validators. TCP keeps the initial implementation simple and
//! debuggable. Payloads are opaque here; authenticity is enforced by the
//! consensus codec when the envelope is opened.

use {
    crate::{
        config::NetConfig,
        error::{NetError, Result},
        frame::{frame, frame_len},
    },
    log::{debug, error, info, warn},
    std::net::SocketAddr,
    tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
        sync::mpsc,
    },
};

/// A received payload together with the address it came from.
#[derive(Debug)]
pub struct InboundFrame {
    /// The raw envelope bytes (deframed).
    pub payload: Vec<u8>,
    /// The remote socket address that sent it.
    pub from: SocketAddr,
}

/// Handle returned by [`TransportListener::start`] to control the listener.
pub struct TransportHandle {
    /// Channel that delivers every inbound frame to the round driver.
    pub inbound_rx: mpsc::Receiver<InboundFrame>,
    /// The local address the listener is bound to (useful when port = 0).
    pub local_addr: SocketAddr,
}

/// Listens for inbound TCP connections and delivers deframed payloads.
pub struct TransportListener {
    config: NetConfig,
}

impl TransportListener {
    /// Create a new transport listener with the given config.
    pub fn new(config: NetConfig) -> Self {
        Self { config }
    }

    /// Bind and start accepting connections.
    ///
    /// Returns a [`TransportHandle`] whose `inbound_rx` yields every frame
    /// that passes the size bound. Spawns a Tokio task per accepted
    /// connection.
    pub async fn start(self) -> Result<TransportHandle> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("consensus transport listening on {}", local_addr);

        let (tx, rx) = mpsc::channel::<InboundFrame>(self.config.channel_buffer_size);
        let max_frame = self.config.max_message_size;

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        debug!("accepted consensus connection from {}", addr);
                        let tx = tx.clone();
                        tokio::spawn(Self::handle_connection(stream, addr, tx, max_frame));
                    }
                    Err(e) => {
                        error!("accept error: {}", e);
                    }
                }
            }
        });

        Ok(TransportHandle {
            inbound_rx: rx,
            local_addr,
        })
    }

    /// Read length-prefixed frames from `stream` until EOF or error.
    async fn handle_connection(
        mut stream: TcpStream,
        addr: SocketAddr,
        tx: mpsc::Sender<InboundFrame>,
        max_frame: usize,
    ) {
        let mut header_buf = [0u8; 4];

        loop {
            if let Err(e) = stream.read_exact(&mut header_buf).await {
                if e.kind() != std::io::ErrorKind::UnexpectedEof {
                    warn!("header read error from {}: {}", addr, e);
                }
                break;
            }

            let len = frame_len(&header_buf);
            if len > max_frame {
                warn!(
                    "peer {} sent oversized frame ({} > {}), dropping connection",
                    addr, len, max_frame
                );
                break;
            }

            let mut payload = vec![0u8; len];
            if let Err(e) = stream.read_exact(&mut payload).await {
                warn!("payload read error from {}: {}", addr, e);
                break;
            }

            if tx.send(InboundFrame { payload, from: addr }).await.is_err() {
                // The driver dropped its end; shut down gracefully.
                info!("inbound channel closed, stopping reader for {}", addr);
                break;
            }
        }

        debug!("connection to {} closed", addr);
    }
}

// ── Outbound sending ────────────────────────────────────────────────────────

/// Send a single framed payload to the given address over a new TCP
/// connection.
///
/// For production use the caller should maintain persistent connections;
/// this helper is useful for one-shot sends and tests.
pub async fn send_frame(addr: SocketAddr, payload: &[u8], max_size: usize) -> Result<()> {
    let framed = frame(payload, max_size)?;
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(&framed).await?;
    stream.flush().await?;
    Ok(())
}

/// Broadcast a payload to multiple addresses concurrently.
///
/// Returns the list of addresses where sending failed.
pub async fn broadcast_frames(
    addrs: &[SocketAddr],
    payload: &[u8],
    max_size: usize,
) -> Vec<(SocketAddr, NetError)> {
    let framed = match frame(payload, max_size) {
        Ok(framed) => framed,
        Err(e) => {
            warn!("refusing to broadcast oversized payload: {e}");
            return addrs
                .iter()
                .map(|addr| {
                    (
                        *addr,
                        NetError::FrameTooLarge {
                            size: payload.len(),
                            max: max_size,
                        },
                    )
                })
                .collect();
        }
    };

    let mut handles = Vec::with_capacity(addrs.len());
    for &addr in addrs {
        let framed = framed.clone();
        handles.push(tokio::spawn(async move {
            let result = async {
                let mut stream = TcpStream::connect(addr).await?;
                stream.write_all(&framed).await?;
                stream.flush().await?;
                Ok::<(), std::io::Error>(())
            }
            .await;
            (addr, result)
        }));
    }

    let mut failures = Vec::new();
    for handle in handles {
        if let Ok((addr, Err(e))) = handle.await {
            failures.push((addr, NetError::Transport(e)));
        }
    }
    failures
}

// ── Tests ───────────────────────────────────────────────────────────────────
