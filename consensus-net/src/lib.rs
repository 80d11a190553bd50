//! Meridian consensus networking layer.
//!
//! Moves signed consensus envelopes between validators for the round core
//! in `meridian-consensus`. The round never sees a socket: it broadcasts
//! through the [`Host`](meridian_consensus::host::Host) contract and pulls
//! opaque envelope bytes off an inbound queue. This crate supplies both
//! sides over TCP:
//!
//! - **Framing**: every payload travels as `[u32-le length][bytes]`,
//!   bounded by `max_message_size` ([`frame`]).
//! - **Inbound**: [`transport::TransportListener`] accepts connections,
//!   deframes, and hands payloads to a channel; [`host::forward_inbound`]
//!   bridges that channel into the round driver's queue.
//! - **Outbound**: [`host::TcpHost`] implements the `Host` contract with
//!   a dedicated sender task, so a round's `broadcast` never blocks on
//!   network I/O.
//!
//! Envelope authenticity is deliberately not checked here; the consensus
//! codec validates the BLS envelope signature before any payload field is
//! trusted, so the transport can stay byte-oriented.

pub mod config;
pub mod error;
pub mod frame;
pub mod host;
pub mod transport;

pub use config::NetConfig;
pub use error::{NetError, Result};
pub use frame::{frame, frame_len};
pub use host::{forward_inbound, TcpHost};
pub use transport::{InboundFrame, TransportHandle, TransportListener};
