//! Leader selection.
//!
//! Every node must agree on which roster member leads a given view. The
//! schedule here is a plain round-robin over the roster order; the round
//! core only requires that the mapping is deterministic, so deployments
//! with richer schedules can compute the leader themselves and hand it to
//! the engine at construction.

use crate::roster::{Roster, ValidatorId};

/// Deterministic leader for the given view: round-robin over roster order.
/// An empty roster has no leader.
pub fn leader_of_view(roster: &Roster, view: u64) -> Option<ValidatorId> {
    view.checked_rem(roster.len() as u64)
        .map(|index| index as ValidatorId)
}

/// Check whether a specific validator leads the given view.
pub fn is_leader(roster: &Roster, id: ValidatorId, view: u64) -> bool {
    leader_of_view(roster, view) == Some(id)
}
