//! Meridian leader-based BFT consensus round.
//!
//! This crate implements a single consensus attempt over a known validator
//! roster: the view leader announces an opaque block, validators vote in
//! two phases (prepare, then commit), and each phase closes by sealing a
//! threshold BLS aggregate signature paired with a bitmap of its signers.
//! The round decides when a commit quorum certifies the sealed prepare
//! evidence, at which point `on_consensus_done` fires with the block.
//!
//! # Protocol shape
//!
//! ```text
//!  leader                                validators
//!    │ announce(view, H, B) ──────────────────▶ │  verify H = keccak(B)
//!    │ ◀─────────────── prepare(H, id, sig(H)) │
//!    │ seal at T = ⌊2N/3⌋+1 → (A₁, M₁)         │
//!    │ prepared(H, A₁, M₁) ───────────────────▶ │  verify agg(A₁) over M₁
//!    │ ◀────────── commit(H, id, sig(A₁‖M₁))   │
//!    │ seal at T → (A₂, M₂)                    │
//!    │ committed(H, A₂, M₂, A₁‖M₁) ───────────▶ │  verify, decide B
//! ```
//!
//! The commit phase signs the *prepared evidence* `A₁‖M₁` rather than the
//! block hash, so the final certificate proves both the block and that a
//! valid prepare quorum was observed.
//!
//! # Key properties
//!
//! - **Deterministic core**: [`engine::RoundEngine`] is pure state-machine
//!   logic; the same envelopes in the same order always yield the same
//!   transitions and outputs. All I/O lives in [`driver::RoundDriver`] and
//!   behind the [`host::Host`] contract.
//! - **One vote per validator per phase**, enforced by the accumulator;
//!   duplicates are ignored, never errors.
//! - **Monotonic phases**: `Idle → AnnounceDone → PrepareDone →
//!   CommitDone → Finished`, with `Aborted` as the failure sink. Nothing
//!   moves a round backwards.
//! - **Authenticated input**: every envelope's BLS signature and roster
//!   membership are checked before any payload field is looked at.
//!
//! # Crate modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`bitmap`]  | Fixed-width signer bitmaps, MSB-first wire form |
//! | [`block`]   | Keccak-256 block hashing, head-header view |
//! | [`config`]  | `RoundConfig` and validation |
//! | [`driver`]  | Async pull loop, deadline, callback dispatch |
//! | [`engine`]  | The round state machine (leader + validator paths) |
//! | [`error`]   | Crate-wide error enum and recovery policy |
//! | [`host`]    | Capability contracts: `Host`, `ChainReader` |
//! | [`leader`]  | Deterministic leader schedule |
//! | [`message`] | Wire payloads and the signed envelope |
//! | [`roster`]  | Ordered validator set and quorum threshold |
//! | [`round`]   | Phase ladder and per-round context |
//! | [`votes`]   | Per-phase vote accumulation and sealing |

pub mod bitmap;
pub mod block;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod host;
pub mod leader;
pub mod message;
pub mod roster;
pub mod round;
pub mod votes;

// Re-exports for convenience
pub use bitmap::Bitmap;
pub use block::{hash_block, BlockHash, BlockHeader};
pub use config::{ConfigError, RoundConfig};
pub use driver::RoundDriver;
pub use engine::{RoundEngine, RoundOutput};
pub use error::{ConsensusError, Result};
pub use host::{ChainReader, GroupId, Host, PeerInfo};
pub use leader::{is_leader, leader_of_view};
pub use message::{ConsensusPayload, Envelope, MessageKind};
pub use roster::{Roster, ValidatorId};
pub use round::{Phase, Role, RoundContext};
pub use votes::{AddOutcome, VoteAccumulator};
