//! Round configuration.

use std::time::Duration;

/// Configuration for a single consensus round.
#[derive(Debug, Clone)]
pub struct RoundConfig {
    /// Wall-clock budget for the whole round in milliseconds. When it
    /// expires the round aborts and its context is released.
    /// Default: 3000 (a few network round trips).
    pub view_deadline_ms: u64,

    /// Maximum accepted block size in bytes, bounding the announce
    /// payload. Default: 1 MiB.
    pub max_block_size: usize,

    /// Capacity of the inbound message channel feeding the round driver.
    pub channel_buffer_size: usize,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            view_deadline_ms: 3_000,
            max_block_size: 1_048_576,
            channel_buffer_size: 1_024,
        }
    }
}

impl RoundConfig {
    /// The round deadline as a [`Duration`].
    pub fn view_deadline(&self) -> Duration {
        Duration::from_millis(self.view_deadline_ms)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.view_deadline_ms == 0 {
            return Err(ConfigError::InvalidViewDeadline);
        }
        if self.max_block_size == 0 {
            return Err(ConfigError::InvalidMaxBlockSize);
        }
        if self.channel_buffer_size == 0 {
            return Err(ConfigError::InvalidChannelBuffer);
        }
        Ok(())
    }

    /// Config suitable for local testing: short deadline, small buffers.
    #[cfg(any(test, feature = "dev-context-only-utils"))]
    pub fn dev_default() -> Self {
        Self {
            view_deadline_ms: 250,
            max_block_size: 65_536,
            channel_buffer_size: 64,
        }
    }
}

/// Errors in round configuration.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("view_deadline_ms must be > 0")]
    InvalidViewDeadline,
    #[error("max_block_size must be > 0")]
    InvalidMaxBlockSize,
    #[error("channel_buffer_size must be > 0")]
    InvalidChannelBuffer,
}
