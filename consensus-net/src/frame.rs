//! Length-prefixed framing for envelope bytes.
//!
//! Every payload on the wire is framed as:
//!
//! ```text
//! [4 bytes: payload length (u32-le)] [N bytes: payload]
//! ```
//!
//! The transport reads the 4-byte header, validates the length against the
//! configured maximum, then reads exactly that many bytes. Payload content
//! is opaque here; envelope authenticity belongs to the consensus codec.

use crate::error::{NetError, Result};

/// Prepend the u32-le length prefix to a payload.
pub fn frame(payload: &[u8], max_size: usize) -> Result<Vec<u8>> {
    if payload.len() > max_size {
        return Err(NetError::FrameTooLarge {
            size: payload.len(),
            max: max_size,
        });
    }
    let len = payload.len() as u32;
    let mut buf = Vec::with_capacity(4usize.saturating_add(payload.len()));
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Read the payload length from a 4-byte frame header.
pub fn frame_len(header: &[u8; 4]) -> usize {
    u32::from_le_bytes(*header) as usize
}
