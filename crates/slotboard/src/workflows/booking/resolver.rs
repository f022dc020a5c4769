use super::domain::{Application, ApplicationId, ApplicationStatus};
use super::store::EventState;

/// Applications swept into `Rejected` when a selection commits, split by
/// the predicate that matched them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct CascadeOutcome {
    /// Same candidate, other positions, same block.
    pub same_candidate: Vec<ApplicationId>,
    /// Other candidates, same slot.
    pub same_slot: Vec<ApplicationId>,
}

/// Computes the cascade for a committed selection as two disjoint filters
/// over the event's pending applications. The predicates cannot overlap:
/// the first requires a different slot, the second a different candidate.
pub(crate) fn cascade_rejections(state: &EventState, target: &Application) -> CascadeOutcome {
    let same_candidate = state
        .applications()
        .filter(|app| {
            app.id != target.id
                && app.status == ApplicationStatus::Pending
                && app.candidate == target.candidate
                && app.slot.block == target.slot.block
                && app.slot != target.slot
        })
        .map(|app| app.id)
        .collect();

    let same_slot = state
        .applications()
        .filter(|app| {
            app.id != target.id
                && app.status == ApplicationStatus::Pending
                && app.candidate != target.candidate
                && app.slot == target.slot
        })
        .map(|app| app.id)
        .collect();

    CascadeOutcome {
        same_candidate,
        same_slot,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::booking::domain::{
        ControllerRating, Event, EventId, EventStatus, Position, PositionId, Slot, TimeBlock,
    };
    use crate::workflows::booking::domain::{BlockId, CandidateId};
    use chrono::{Duration, Utc};

    fn state() -> EventState {
        let start = Utc::now();
        let event = Event {
            id: EventId(1),
            name: "Cross the Pond".to_string(),
            banner_url: String::new(),
            starts_at: start,
            ends_at: start + Duration::hours(2),
            status: EventStatus::Open,
            block_minutes: 60,
        };
        let positions = vec![
            Position {
                id: PositionId(1),
                icao: "SBGR".to_string(),
                designator: "TWR".to_string(),
                min_rating: ControllerRating::Student2,
            },
            Position {
                id: PositionId(2),
                icao: "SBGR".to_string(),
                designator: "GND".to_string(),
                min_rating: ControllerRating::Student1,
            },
        ];
        let blocks = vec![
            TimeBlock {
                id: BlockId(1),
                number: 1,
                starts_at: start,
                ends_at: start + Duration::hours(1),
            },
            TimeBlock {
                id: BlockId(2),
                number: 2,
                starts_at: start + Duration::hours(1),
                ends_at: start + Duration::hours(2),
            },
        ];
        EventState::new(event, positions, blocks)
    }

    #[test]
    fn cascade_predicates_are_disjoint_and_scoped() {
        let mut state = state();
        let now = Utc::now();
        let tower_b1 = Slot {
            position: PositionId(1),
            block: BlockId(1),
        };
        let ground_b1 = Slot {
            position: PositionId(2),
            block: BlockId(1),
        };
        let tower_b2 = Slot {
            position: PositionId(1),
            block: BlockId(2),
        };

        let target =
            state.insert_application(CandidateId(100), tower_b1, ApplicationStatus::Pending, now);
        // Same candidate, same block, other position: swept by predicate one.
        let own_overlap =
            state.insert_application(CandidateId(100), ground_b1, ApplicationStatus::Pending, now);
        // Same candidate, other block: untouched.
        let own_later =
            state.insert_application(CandidateId(100), tower_b2, ApplicationStatus::Pending, now);
        // Rival on the same slot: swept by predicate two.
        let rival =
            state.insert_application(CandidateId(200), tower_b1, ApplicationStatus::Pending, now);
        // Rival elsewhere: untouched.
        let rival_elsewhere =
            state.insert_application(CandidateId(200), ground_b1, ApplicationStatus::Pending, now);

        let target_app = state.application(target).expect("target present").clone();
        let cascade = cascade_rejections(&state, &target_app);

        assert_eq!(cascade.same_candidate, vec![own_overlap]);
        assert_eq!(cascade.same_slot, vec![rival]);
        assert!(!cascade.same_candidate.contains(&own_later));
        assert!(!cascade.same_slot.contains(&rival_elsewhere));
        assert!(cascade
            .same_candidate
            .iter()
            .all(|id| !cascade.same_slot.contains(id)));
    }
}
