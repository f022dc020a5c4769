use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::workflows::notify::{
    NotificationGateway, NotificationJob, NotificationPayload, Recipient,
};

use super::announcement::{AnnouncementError, AnnouncementSurface, AnnouncementView, SlotLine};
use super::backfill::{self, BackfillCandidate};
use super::domain::{
    AdminContact, Application, ApplicationId, ApplicationStatus, Candidate, CandidateId,
    ControllerRating, Event, EventId, EventStatus, MessageHandle, Position, Slot, TimeBlock,
};
use super::resolver::cascade_rejections;
use super::store::{BookingStore, CounterDelta, EventState, StoreError};

/// Error raised by the booking service. Eligibility and invariant errors
/// are synchronous and roll the triggering transition back entirely;
/// notification problems never appear here.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("event is {} and not accepting applications", .status.label())]
    SlotClosed { status: EventStatus },
    #[error("rating {actual} is below the {required} minimum for {callsign}")]
    RatingIneligible {
        callsign: String,
        required: ControllerRating,
        actual: ControllerRating,
    },
    #[error("candidate already holds {held} in this time block")]
    DuplicateBlock { held: String },
    #[error("an identical application already exists")]
    DuplicateApplication,
    #[error("{callsign} is already filled for this block")]
    SlotAlreadyFilled { callsign: String },
    #[error("application is {} and no longer actionable", .status.label())]
    ConcurrentModification { status: ApplicationStatus },
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Announcement(#[from] AnnouncementError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BookingError {
    /// Caller-fault input that will fail the same way on retry.
    pub fn is_eligibility(&self) -> bool {
        matches!(
            self,
            Self::SlotClosed { .. }
                | Self::RatingIneligible { .. }
                | Self::DuplicateBlock { .. }
                | Self::DuplicateApplication
        )
    }

    /// Commit-time invariant conflicts; the caller must re-observe state
    /// before deciding again.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::SlotAlreadyFilled { .. } | Self::ConcurrentModification { .. }
        )
    }
}

/// Sanitized representation of an application for API responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationView {
    pub id: ApplicationId,
    pub event: EventId,
    pub candidate: CandidateId,
    pub callsign: String,
    pub block_number: u32,
    pub block_label: String,
    pub status: ApplicationStatus,
}

impl ApplicationView {
    fn project(state: &EventState, app: &Application) -> Self {
        let callsign = state
            .position(app.slot.position)
            .map(Position::callsign)
            .unwrap_or_default();
        let (block_number, block_label) = state
            .block(app.slot.block)
            .map(|block| (block.number, block.label()))
            .unwrap_or((0, String::new()));
        Self {
            id: app.id,
            event: state.event().id,
            candidate: app.candidate,
            callsign,
            block_number,
            block_label,
            status: app.status,
        }
    }
}

/// Result of committing a selection, including the cascade tally.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionOutcome {
    pub application: ApplicationView,
    pub rejected_same_candidate: usize,
    pub rejected_same_slot: usize,
}

/// How a revocation resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationKind {
    /// Pending application deleted outright, no penalty.
    Withdrawn,
    /// Locked application cancelled, +1 cancellation.
    Cancelled,
    /// Confirmed allocation abandoned, +1 no-show, admins alerted.
    NoShow,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevocationOutcome {
    pub kind: RevocationKind,
    pub application: Option<ApplicationView>,
}

/// Breakdown of a whole-event revocation sweep.
#[derive(Debug, Clone, Serialize)]
pub struct RevokeAllOutcome {
    pub withdrawn: usize,
    pub cancelled: usize,
    pub no_shows: usize,
    pub no_show_positions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackfillOutcome {
    pub application: ApplicationView,
    pub replaced: Option<CandidateId>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub locked: usize,
    pub confirmed: usize,
    pub full_confirmed: usize,
    pub rejected: usize,
    pub cancelled: usize,
    pub no_shows: usize,
}

/// Aggregate view of one event for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct EventSummary {
    pub event: EventId,
    pub name: String,
    pub status: EventStatus,
    pub counts: StatusCounts,
    pub unique_applicants: usize,
    pub slots: Vec<SlotLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub event: EventId,
    pub slot: Slot,
    pub status: ApplicationStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateHistory {
    pub candidate: Candidate,
    pub applications: Vec<HistoryEntry>,
}

/// The booking allocation engine: every state-machine transition, the
/// conflict-resolution commit path, backfill, and the query surface.
/// Mutations run inside per-event serializable transactions; notification
/// jobs are handed to the gateway only after the transaction commits, and
/// announcement refreshes never fail a committed transition.
pub struct BookingService<S, N, P> {
    store: Arc<S>,
    notifier: Arc<N>,
    announcements: Arc<P>,
}

impl<S, N, P> BookingService<S, N, P>
where
    S: BookingStore + 'static,
    N: NotificationGateway + 'static,
    P: AnnouncementSurface + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, announcements: Arc<P>) -> Self {
        Self {
            store,
            notifier,
            announcements,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    // ── Registration ──────────────────────────────────────────────

    pub fn register_event(
        &self,
        event: Event,
        positions: Vec<Position>,
        blocks: Vec<TimeBlock>,
    ) -> Result<(), BookingError> {
        if event.name.trim().is_empty() {
            return Err(BookingError::Validation("event name is required".into()));
        }
        self.store
            .register_event(EventState::new(event, positions, blocks))?;
        Ok(())
    }

    pub fn register_candidate(&self, candidate: Candidate) -> Result<(), BookingError> {
        self.store.upsert_candidate(candidate)?;
        Ok(())
    }

    pub fn register_admin(&self, admin: AdminContact) -> Result<(), BookingError> {
        self.store.register_admin(admin)?;
        Ok(())
    }

    /// Draft -> Open. Requires at least one position and one block, so an
    /// announced event is actually bookable.
    pub fn open_bookings(&self, event: EventId) -> Result<(), BookingError> {
        self.store.transact(event, |state| {
            if state.event().status != EventStatus::Draft {
                return Err(BookingError::Validation(format!(
                    "event is {}, only drafts can be opened",
                    state.event().status.label()
                )));
            }
            if state.positions().next().is_none() {
                return Err(BookingError::Validation(
                    "event has no positions configured".into(),
                ));
            }
            if state.blocks().next().is_none() {
                return Err(BookingError::Validation(
                    "event has no time blocks configured".into(),
                ));
            }
            state.set_event_status(EventStatus::Open);
            Ok(())
        })
    }

    /// Locked -> Closed, once the event is over.
    pub fn close_event(&self, event: EventId) -> Result<(), BookingError> {
        self.store.transact(event, |state| {
            if state.event().status != EventStatus::Locked {
                return Err(BookingError::Validation(format!(
                    "event is {}, only locked events can be closed",
                    state.event().status.label()
                )));
            }
            state.set_event_status(EventStatus::Closed);
            Ok(())
        })
    }

    // ── State machine ─────────────────────────────────────────────

    /// Candidate requests a slot. Fails while the event is not open, below
    /// the position's rating floor, on an exact duplicate, on an already
    /// filled slot, or when the candidate already holds the block.
    pub fn create_application(
        &self,
        cid: CandidateId,
        event: EventId,
        slot: Slot,
    ) -> Result<ApplicationView, BookingError> {
        let candidate = self.candidate(cid)?;
        let now = Utc::now();

        let view = self.store.transact(event, |state| {
            if state.event().status != EventStatus::Open {
                return Err(BookingError::SlotClosed {
                    status: state.event().status,
                });
            }
            let position = state
                .position(slot.position)
                .ok_or(BookingError::NotFound("position"))?
                .clone();
            state
                .block(slot.block)
                .ok_or(BookingError::NotFound("time block"))?;

            if candidate.rating < position.min_rating {
                return Err(BookingError::RatingIneligible {
                    callsign: position.callsign(),
                    required: position.min_rating,
                    actual: candidate.rating,
                });
            }
            if state.existing_application(cid, &slot).is_some() {
                return Err(BookingError::DuplicateApplication);
            }
            if state.holder_of(&slot).is_some() {
                return Err(BookingError::SlotAlreadyFilled {
                    callsign: position.callsign(),
                });
            }
            if let Some(held) = state.holding_in_block(cid, slot.block, None) {
                let held = state
                    .position(held.slot.position)
                    .map(Position::callsign)
                    .unwrap_or_default();
                return Err(BookingError::DuplicateBlock { held });
            }

            let id = state.insert_application(cid, slot, ApplicationStatus::Pending, now);
            let app = state
                .application(id)
                .ok_or(BookingError::NotFound("application"))?;
            Ok(ApplicationView::project(state, app))
        })?;

        self.store.bump_counters(
            cid,
            CounterDelta {
                applications: 1,
                ..CounterDelta::default()
            },
        )?;
        Ok(view)
    }

    /// Admin commits a selection. Re-validates that the target is still
    /// pending, that the slot is unoccupied, and that the candidate holds
    /// nothing else in the block against committed state, then
    /// cascade-rejects the two disjoint conflict sets.
    pub fn select_candidate(
        &self,
        event: EventId,
        application: ApplicationId,
    ) -> Result<SelectionOutcome, BookingError> {
        let now = Utc::now();

        let (outcome, job) = self.store.transact(event, |state| {
            let target = state
                .application(application)
                .ok_or(BookingError::NotFound("application"))?
                .clone();
            if target.status != ApplicationStatus::Pending {
                return Err(BookingError::ConcurrentModification {
                    status: target.status,
                });
            }
            let position = state
                .position(target.slot.position)
                .ok_or(BookingError::NotFound("position"))?
                .clone();
            if state.holder_of(&target.slot).is_some() {
                return Err(BookingError::SlotAlreadyFilled {
                    callsign: position.callsign(),
                });
            }
            if let Some(held) = state.holding_in_block(target.candidate, target.slot.block, None) {
                let held = state
                    .position(held.slot.position)
                    .map(Position::callsign)
                    .unwrap_or_default();
                return Err(BookingError::DuplicateBlock { held });
            }

            let cascade = cascade_rejections(state, &target);
            for id in cascade
                .same_candidate
                .iter()
                .chain(cascade.same_slot.iter())
            {
                if let Some(app) = state.application_mut(*id) {
                    app.status = ApplicationStatus::Rejected;
                    app.updated_at = now;
                }
            }

            let locked = state
                .application_mut(application)
                .ok_or(BookingError::NotFound("application"))?;
            locked.status = ApplicationStatus::Locked;
            locked.updated_at = now;

            let candidate = self.store.candidate(target.candidate)?;
            let block_label = state
                .block(target.slot.block)
                .map(TimeBlock::label)
                .unwrap_or_default();
            let job = NotificationJob::new(
                Recipient {
                    user: candidate.chat_user.clone(),
                    display_name: candidate.display_name.clone(),
                },
                NotificationPayload::Selection {
                    event_name: state.event().name.clone(),
                    callsign: position.callsign(),
                    block_label,
                },
            );

            let app = state
                .application(application)
                .ok_or(BookingError::NotFound("application"))?;
            Ok((
                SelectionOutcome {
                    application: ApplicationView::project(state, app),
                    rejected_same_candidate: cascade.same_candidate.len(),
                    rejected_same_slot: cascade.same_slot.len(),
                },
                job,
            ))
        })?;

        self.notifier.enqueue(job);
        self.refresh_announcement(event);
        info!(
            event = event.0,
            application = application.0,
            rejected_same_candidate = outcome.rejected_same_candidate,
            rejected_same_slot = outcome.rejected_same_slot,
            "selection committed"
        );
        Ok(outcome)
    }

    /// Candidate acknowledges a selection: Locked -> Confirmed.
    pub fn confirm(
        &self,
        cid: CandidateId,
        event: EventId,
        application: ApplicationId,
    ) -> Result<ApplicationView, BookingError> {
        let view = self.transition_owned(
            cid,
            event,
            application,
            ApplicationStatus::Locked,
            ApplicationStatus::Confirmed,
        )?;
        let candidate = self.candidate(cid)?;
        self.notifier.confirm_received(&candidate.chat_user);
        self.refresh_announcement(event);
        Ok(view)
    }

    /// Candidate answers the reminder: Confirmed -> FullConfirmed.
    pub fn final_confirm(
        &self,
        cid: CandidateId,
        event: EventId,
        application: ApplicationId,
    ) -> Result<ApplicationView, BookingError> {
        let view = self.transition_owned(
            cid,
            event,
            application,
            ApplicationStatus::Confirmed,
            ApplicationStatus::FullConfirmed,
        )?;
        let candidate = self.candidate(cid)?;
        self.notifier.confirm_received(&candidate.chat_user);
        self.refresh_announcement(event);
        Ok(view)
    }

    /// Admin nudges a confirmed candidate for the final confirmation. The
    /// application state never changes; each call enqueues one reminder.
    pub fn remind(
        &self,
        event: EventId,
        application: ApplicationId,
    ) -> Result<ApplicationView, BookingError> {
        let (view, job) = self.store.transact(event, |state| {
            let app = state
                .application(application)
                .ok_or(BookingError::NotFound("application"))?;
            if app.status != ApplicationStatus::Confirmed {
                return Err(BookingError::ConcurrentModification { status: app.status });
            }
            let candidate = self.store.candidate(app.candidate)?;
            let position = state
                .position(app.slot.position)
                .ok_or(BookingError::NotFound("position"))?;
            let block_label = state
                .block(app.slot.block)
                .map(TimeBlock::label)
                .unwrap_or_default();
            let job = NotificationJob::new(
                Recipient {
                    user: candidate.chat_user.clone(),
                    display_name: candidate.display_name.clone(),
                },
                NotificationPayload::Reminder {
                    event_name: state.event().name.clone(),
                    callsign: position.callsign(),
                    icao: position.icao.clone(),
                    block_label,
                },
            );
            Ok((ApplicationView::project(state, app), job))
        })?;

        self.notifier.enqueue(job);
        Ok(view)
    }

    /// Candidate withdraws one application. Pending requests are deleted
    /// without penalty; abandoning a locked slot costs a cancellation;
    /// abandoning a confirmed slot is a no-show and alerts every admin.
    pub fn revoke(
        &self,
        cid: CandidateId,
        event: EventId,
        application: ApplicationId,
    ) -> Result<RevocationOutcome, BookingError> {
        let candidate = self.candidate(cid)?;
        let now = Utc::now();

        let (outcome, freed, no_show_position) = self.store.transact(event, |state| {
            let app = state
                .application(application)
                .ok_or(BookingError::NotFound("application"))?
                .clone();
            if app.candidate != cid {
                return Err(BookingError::Validation(
                    "application belongs to another candidate".into(),
                ));
            }

            match app.status {
                ApplicationStatus::Pending => {
                    state.remove_application(application);
                    Ok((
                        RevocationOutcome {
                            kind: RevocationKind::Withdrawn,
                            application: None,
                        },
                        false,
                        None,
                    ))
                }
                ApplicationStatus::Locked => {
                    let view = Self::transition(state, application, ApplicationStatus::Cancelled, now)?;
                    Ok((
                        RevocationOutcome {
                            kind: RevocationKind::Cancelled,
                            application: Some(view),
                        },
                        true,
                        None,
                    ))
                }
                ApplicationStatus::Confirmed | ApplicationStatus::FullConfirmed => {
                    let position = state
                        .position(app.slot.position)
                        .map(Position::callsign)
                        .unwrap_or_default();
                    let block_label = state
                        .block(app.slot.block)
                        .map(TimeBlock::label)
                        .unwrap_or_default();
                    let view = Self::transition(state, application, ApplicationStatus::NoShow, now)?;
                    Ok((
                        RevocationOutcome {
                            kind: RevocationKind::NoShow,
                            application: Some(view),
                        },
                        true,
                        Some(format!("{position} - {block_label}")),
                    ))
                }
                status => Err(BookingError::ConcurrentModification { status }),
            }
        })?;

        match outcome.kind {
            RevocationKind::Withdrawn => {}
            RevocationKind::Cancelled => {
                self.store.bump_counters(
                    cid,
                    CounterDelta {
                        cancellations: 1,
                        ..CounterDelta::default()
                    },
                )?;
            }
            RevocationKind::NoShow => {
                self.store.bump_counters(
                    cid,
                    CounterDelta {
                        no_shows: 1,
                        ..CounterDelta::default()
                    },
                )?;
                let positions = no_show_position.into_iter().collect::<Vec<_>>();
                self.alert_admins_no_show(event, &candidate, positions)?;
            }
        }
        if freed {
            self.refresh_announcement(event);
        }
        Ok(outcome)
    }

    /// Sweeps every application the candidate holds in an event through the
    /// per-state revocation rules.
    pub fn revoke_all(
        &self,
        cid: CandidateId,
        event: EventId,
    ) -> Result<RevokeAllOutcome, BookingError> {
        let candidate = self.candidate(cid)?;
        let now = Utc::now();

        let outcome = self.store.transact(event, |state| {
            let owned: Vec<Application> = state
                .applications()
                .filter(|app| app.candidate == cid)
                .cloned()
                .collect();

            let mut outcome = RevokeAllOutcome {
                withdrawn: 0,
                cancelled: 0,
                no_shows: 0,
                no_show_positions: Vec::new(),
            };
            for app in owned {
                match app.status {
                    ApplicationStatus::Pending => {
                        state.remove_application(app.id);
                        outcome.withdrawn += 1;
                    }
                    ApplicationStatus::Locked => {
                        Self::transition(state, app.id, ApplicationStatus::Cancelled, now)?;
                        outcome.cancelled += 1;
                    }
                    ApplicationStatus::Confirmed | ApplicationStatus::FullConfirmed => {
                        let position = state
                            .position(app.slot.position)
                            .map(Position::callsign)
                            .unwrap_or_default();
                        let block_label = state
                            .block(app.slot.block)
                            .map(TimeBlock::label)
                            .unwrap_or_default();
                        Self::transition(state, app.id, ApplicationStatus::NoShow, now)?;
                        outcome.no_shows += 1;
                        outcome
                            .no_show_positions
                            .push(format!("{position} - {block_label}"));
                    }
                    _ => {}
                }
            }
            Ok::<_, BookingError>(outcome)
        })?;

        self.store.bump_counters(
            cid,
            CounterDelta {
                cancellations: outcome.cancelled as u32,
                no_shows: outcome.no_shows as u32,
                ..CounterDelta::default()
            },
        )?;
        if outcome.no_shows > 0 {
            self.alert_admins_no_show(event, &candidate, outcome.no_show_positions.clone())?;
        }
        if outcome.cancelled > 0 || outcome.no_shows > 0 {
            self.refresh_announcement(event);
        }
        Ok(outcome)
    }

    /// Admin freezes the event: every remaining pending application is
    /// rejected and the event stops accepting candidate requests.
    pub fn close_bookings(&self, event: EventId) -> Result<usize, BookingError> {
        let now = Utc::now();
        let rejected = self.store.transact(event, |state| {
            let pending: Vec<ApplicationId> = state
                .applications()
                .filter(|app| app.status == ApplicationStatus::Pending)
                .map(|app| app.id)
                .collect();
            for id in &pending {
                if let Some(app) = state.application_mut(*id) {
                    app.status = ApplicationStatus::Rejected;
                    app.updated_at = now;
                }
            }
            state.set_event_status(EventStatus::Locked);
            Ok::<_, BookingError>(pending.len())
        })?;

        self.refresh_announcement(event);
        info!(event = event.0, rejected, "bookings closed");
        Ok(rejected)
    }

    /// One rejection notice per candidate that applied and ended up holding
    /// nothing in the event. Candidates selected elsewhere in the event are
    /// skipped so they are not confused by a rejection.
    pub fn reject_unselected(&self, event: EventId) -> Result<usize, BookingError> {
        let (event_name, unselected) = self.store.read(event, |state| {
            let unselected: Vec<CandidateId> = state
                .applicants()
                .into_iter()
                .filter(|cid| {
                    !state
                        .applications()
                        .any(|app| app.candidate == *cid && app.status.is_holding())
                })
                .collect();
            Ok::<_, BookingError>((state.event().name.clone(), unselected))
        })?;

        let mut notified = 0;
        for cid in unselected {
            let candidate = self.candidate(cid)?;
            self.notifier.enqueue(NotificationJob::new(
                Recipient {
                    user: candidate.chat_user.clone(),
                    display_name: candidate.display_name.clone(),
                },
                NotificationPayload::Rejection {
                    event_name: event_name.clone(),
                },
            ));
            notified += 1;
        }
        Ok(notified)
    }

    // ── Backfill ──────────────────────────────────────────────────

    /// Eligible replacements for a slot, drawn from everyone that ever
    /// applied to the event.
    pub fn backfill_candidates(
        &self,
        event: EventId,
        slot: Slot,
    ) -> Result<Vec<BackfillCandidate>, BookingError> {
        self.store.read(event, |state| {
            let position = state
                .position(slot.position)
                .ok_or(BookingError::NotFound("position"))?;
            state
                .block(slot.block)
                .ok_or(BookingError::NotFound("time block"))?;

            let mut candidates = Vec::new();
            for cid in state.applicants() {
                candidates.push(self.store.candidate(cid)?);
            }
            Ok(backfill::eligible_candidates(
                state, position, &slot, &candidates,
            ))
        })
    }

    /// Admin slots a replacement in. Any previous occupant is rejected with
    /// a cancellation penalty; the new candidate is locked through the same
    /// commit path as a regular selection, restricted to their own cascade.
    pub fn select_backfill(
        &self,
        event: EventId,
        cid: CandidateId,
        slot: Slot,
    ) -> Result<BackfillOutcome, BookingError> {
        let candidate = self.candidate(cid)?;
        let now = Utc::now();

        let (outcome, job) = self.store.transact(event, |state| {
            let position = state
                .position(slot.position)
                .ok_or(BookingError::NotFound("position"))?
                .clone();
            let block_label = state
                .block(slot.block)
                .map(TimeBlock::label)
                .ok_or(BookingError::NotFound("time block"))?;

            if candidate.rating < position.min_rating {
                return Err(BookingError::RatingIneligible {
                    callsign: position.callsign(),
                    required: position.min_rating,
                    actual: candidate.rating,
                });
            }
            if let Some(held) = state.holding_in_block(cid, slot.block, None) {
                let held = state
                    .position(held.slot.position)
                    .map(Position::callsign)
                    .unwrap_or_default();
                return Err(BookingError::DuplicateBlock { held });
            }

            let replaced = match state.holder_of(&slot).map(|app| (app.id, app.candidate)) {
                Some((previous_id, previous_cid)) => {
                    Self::transition(state, previous_id, ApplicationStatus::Rejected, now)?;
                    Some(previous_cid)
                }
                None => None,
            };

            let id = match state.existing_application(cid, &slot).map(|app| app.id) {
                Some(id) => {
                    Self::transition(state, id, ApplicationStatus::Locked, now)?;
                    id
                }
                None => state.insert_application(cid, slot, ApplicationStatus::Locked, now),
            };

            // Cascade restricted to the new candidate's own pending apps.
            let target = state
                .application(id)
                .ok_or(BookingError::NotFound("application"))?
                .clone();
            let cascade = cascade_rejections(state, &target);
            for reject in cascade.same_candidate {
                if let Some(app) = state.application_mut(reject) {
                    app.status = ApplicationStatus::Rejected;
                    app.updated_at = now;
                }
            }

            let job = NotificationJob::new(
                Recipient {
                    user: candidate.chat_user.clone(),
                    display_name: candidate.display_name.clone(),
                },
                NotificationPayload::Selection {
                    event_name: state.event().name.clone(),
                    callsign: position.callsign(),
                    block_label,
                },
            );
            let app = state
                .application(id)
                .ok_or(BookingError::NotFound("application"))?;
            Ok((
                BackfillOutcome {
                    application: ApplicationView::project(state, app),
                    replaced,
                },
                job,
            ))
        })?;

        if let Some(previous) = outcome.replaced {
            self.store.bump_counters(
                previous,
                CounterDelta {
                    cancellations: 1,
                    ..CounterDelta::default()
                },
            )?;
        }
        self.notifier.enqueue(job);
        self.refresh_announcement(event);
        Ok(outcome)
    }

    // ── Announcements ─────────────────────────────────────────────

    /// Publishes the event to the public announcement surface and remembers
    /// the message handle for later refreshes.
    pub fn announce(&self, event: EventId) -> Result<MessageHandle, BookingError> {
        let view = self
            .store
            .read(event, |state| Ok::<_, BookingError>(AnnouncementView::project(state)))?;
        let handle = self.announcements.publish(event, &view)?;
        let stored = handle.clone();
        self.store.transact(event, move |state| {
            state.set_announcement(stored);
            Ok::<_, BookingError>(())
        })?;
        Ok(handle)
    }

    /// Re-renders the live announcement after an occupancy change. Failures
    /// are logged and never propagate: the allocation is already committed.
    fn refresh_announcement(&self, event: EventId) {
        let snapshot = self.store.read(event, |state| {
            Ok::<_, BookingError>((
                state.announcement().cloned(),
                AnnouncementView::project(state),
            ))
        });
        match snapshot {
            Ok((Some(handle), view)) => {
                if let Err(error) = self.announcements.update(&handle, &view) {
                    warn!(event = event.0, %error, "announcement refresh failed");
                }
            }
            Ok((None, _)) => {}
            Err(error) => warn!(event = event.0, %error, "announcement snapshot failed"),
        }
    }

    // ── Queries ───────────────────────────────────────────────────

    pub fn event_summary(&self, event: EventId) -> Result<EventSummary, BookingError> {
        self.store.read(event, |state| {
            let mut counts = StatusCounts::default();
            for app in state.applications() {
                match app.status {
                    ApplicationStatus::Pending => counts.pending += 1,
                    ApplicationStatus::Locked => counts.locked += 1,
                    ApplicationStatus::Confirmed => counts.confirmed += 1,
                    ApplicationStatus::FullConfirmed => counts.full_confirmed += 1,
                    ApplicationStatus::Rejected => counts.rejected += 1,
                    ApplicationStatus::Cancelled => counts.cancelled += 1,
                    ApplicationStatus::NoShow => counts.no_shows += 1,
                }
            }
            Ok(EventSummary {
                event: state.event().id,
                name: state.event().name.clone(),
                status: state.event().status,
                counts,
                unique_applicants: state.applicants().len(),
                slots: AnnouncementView::project(state).slots,
            })
        })
    }

    /// Summaries for every registered event, newest external id first.
    pub fn list_events(&self) -> Result<Vec<EventSummary>, BookingError> {
        let mut summaries = Vec::new();
        for event in self.store.event_ids()? {
            summaries.push(self.event_summary(event)?);
        }
        summaries.reverse();
        Ok(summaries)
    }

    pub fn candidate_history(&self, cid: CandidateId) -> Result<CandidateHistory, BookingError> {
        let candidate = self.candidate(cid)?;
        let applications = self
            .store
            .candidate_applications(cid)?
            .into_iter()
            .map(|(event, app)| HistoryEntry {
                event,
                slot: app.slot,
                status: app.status,
            })
            .collect();
        Ok(CandidateHistory {
            candidate,
            applications,
        })
    }

    pub fn application(
        &self,
        event: EventId,
        application: ApplicationId,
    ) -> Result<ApplicationView, BookingError> {
        self.store.read(event, |state| {
            let app = state
                .application(application)
                .ok_or(BookingError::NotFound("application"))?;
            Ok(ApplicationView::project(state, app))
        })
    }

    // ── Internals ─────────────────────────────────────────────────

    fn candidate(&self, cid: CandidateId) -> Result<Candidate, BookingError> {
        self.store.candidate(cid).map_err(|error| match error {
            StoreError::CandidateNotFound => BookingError::NotFound("candidate"),
            other => BookingError::Store(other),
        })
    }

    fn transition(
        state: &mut EventState,
        application: ApplicationId,
        to: ApplicationStatus,
        now: chrono::DateTime<Utc>,
    ) -> Result<ApplicationView, BookingError> {
        let app = state
            .application_mut(application)
            .ok_or(BookingError::NotFound("application"))?;
        app.status = to;
        app.updated_at = now;
        let app = state
            .application(application)
            .ok_or(BookingError::NotFound("application"))?;
        Ok(ApplicationView::project(state, app))
    }

    fn transition_owned(
        &self,
        cid: CandidateId,
        event: EventId,
        application: ApplicationId,
        from: ApplicationStatus,
        to: ApplicationStatus,
    ) -> Result<ApplicationView, BookingError> {
        let now = Utc::now();
        self.store.transact(event, |state| {
            let app = state
                .application(application)
                .ok_or(BookingError::NotFound("application"))?;
            if app.candidate != cid {
                return Err(BookingError::Validation(
                    "application belongs to another candidate".into(),
                ));
            }
            if app.status != from {
                return Err(BookingError::ConcurrentModification { status: app.status });
            }
            Self::transition(state, application, to, now)
        })
    }

    fn alert_admins_no_show(
        &self,
        event: EventId,
        candidate: &Candidate,
        positions: Vec<String>,
    ) -> Result<(), BookingError> {
        let event_name =
            self.store
                .read(event, |state| Ok::<_, BookingError>(state.event().name.clone()))?;
        for admin in self.store.admins()? {
            self.notifier.enqueue(NotificationJob::new(
                Recipient {
                    user: admin.chat_user.clone(),
                    display_name: admin.display_name.clone(),
                },
                NotificationPayload::NoShowAlert {
                    event_name: event_name.clone(),
                    candidate_name: candidate.display_name.clone(),
                    cid: candidate.cid,
                    positions: positions.clone(),
                },
            ));
        }
        Ok(())
    }
}
