//! Booking allocation core: the slot model, the application state machine,
//! the conflict-resolution commit path, backfill, and the announcement
//! projection.

pub mod announcement;
pub mod backfill;
pub mod domain;
mod resolver;
pub mod router;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use announcement::{AnnouncementError, AnnouncementSurface, AnnouncementView, Occupancy, SlotLine};
pub use backfill::BackfillCandidate;
pub use domain::{
    AdminContact, Application, ApplicationId, ApplicationStatus, BlockId, Candidate, CandidateId,
    ChatUserId, ControllerRating, Event, EventId, EventStatus, MessageHandle, Position, PositionId,
    Slot, TimeBlock,
};
pub use router::booking_router;
pub use service::{
    ApplicationView, BackfillOutcome, BookingError, BookingService, CandidateHistory, EventSummary,
    HistoryEntry, RevocationKind, RevocationOutcome, RevokeAllOutcome, SelectionOutcome,
    StatusCounts,
};
pub use store::{BookingStore, CounterDelta, EventState, MemoryBookingStore, StoreError};
