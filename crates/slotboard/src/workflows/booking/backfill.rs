use serde::Serialize;

use super::domain::{Candidate, CandidateId, ControllerRating, Position, Slot};
use super::store::EventState;

/// One entry in the eligible replacement pool for a vacated slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackfillCandidate {
    pub cid: CandidateId,
    pub display_name: String,
    pub rating: ControllerRating,
}

/// Filters the event's historical applicant pool down to candidates that
/// could take over a slot: rating at or above the position minimum, and no
/// holding application anywhere in the slot's block. Previously rejected
/// applicants stay in the pool on purpose.
pub fn eligible_candidates(
    state: &EventState,
    position: &Position,
    slot: &Slot,
    candidates: &[Candidate],
) -> Vec<BackfillCandidate> {
    let applicants = state.applicants();

    let mut eligible: Vec<BackfillCandidate> = candidates
        .iter()
        .filter(|candidate| applicants.contains(&candidate.cid))
        .filter(|candidate| candidate.rating >= position.min_rating)
        .filter(|candidate| {
            state
                .holding_in_block(candidate.cid, slot.block, None)
                .is_none()
        })
        .map(|candidate| BackfillCandidate {
            cid: candidate.cid,
            display_name: candidate.display_name.clone(),
            rating: candidate.rating,
        })
        .collect();

    // Highest rating first, then by name for a stable admin listing.
    eligible.sort_by(|a, b| {
        b.rating
            .cmp(&a.rating)
            .then_with(|| a.display_name.cmp(&b.display_name))
    });
    eligible
}
