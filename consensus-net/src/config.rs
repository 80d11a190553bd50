//! Configuration for the consensus networking layer.

use std::net::SocketAddr;

/// Configuration for validator-to-validator message transport.
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Local address to bind the consensus listener on.
    /// Default: `0.0.0.0:9400`
    pub bind_addr: SocketAddr,

    /// Maximum size of a single framed payload in bytes. Consensus votes
    /// are small (~300 bytes) but the announce carries the full block.
    pub max_message_size: usize,

    /// Size of the internal channels between the transport tasks and the
    /// round driver.
    pub channel_buffer_size: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9400".parse().expect("valid default bind addr"),
            max_message_size: 1_572_864, // 1.5 MiB: block plus envelope overhead
            channel_buffer_size: 4_096,
        }
    }
}

impl NetConfig {
    /// Create a config suitable for local testing: ephemeral port, small
    /// buffers.
    #[cfg(any(test, feature = "dev-context-only-utils"))]
    pub fn dev_default() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".parse().expect("valid dev bind addr"),
            max_message_size: 1_572_864,
            channel_buffer_size: 256,
        }
    }
}
