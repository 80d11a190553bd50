//! Error types for the consensus networking layer.

use thiserror::Error;

/// Errors that can occur in the consensus networking layer.
#[derive(Error, Debug)]
pub enum NetError {
    /// A frame exceeds the maximum allowed size.
    #[error("frame too large: {size} bytes (max {max} bytes)")]
    FrameTooLarge {
        /// Actual payload size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Transport-level I/O error.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The channel delivering frames to the round driver is closed.
    #[error("inbound channel closed")]
    ChannelClosed,

    /// Connection to a peer was refused or dropped.
    #[error("connection failed to {0}: {1}")]
    ConnectionFailed(std::net::SocketAddr, String),
}

/// Convenience result type for networking operations.
pub type Result<T> = std::result::Result<T, NetError>;
