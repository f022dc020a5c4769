use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};

use super::domain::{
    AdminContact, Application, ApplicationId, ApplicationStatus, BlockId, Candidate, CandidateId,
    ChatUserId, Event, EventId, EventStatus, MessageHandle, Position, PositionId, Slot, TimeBlock,
};

/// Error enumeration for storage failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("event already registered")]
    EventExists,
    #[error("event not found")]
    EventNotFound,
    #[error("candidate not found")]
    CandidateNotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Counter adjustments applied to a candidate record after a commit.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterDelta {
    pub applications: u32,
    pub participations: u32,
    pub cancellations: u32,
    pub no_shows: u32,
}

/// The transactional working set for one event: its positions, blocks, and
/// every application ever submitted (terminal states are retained as the
/// audit trail).
#[derive(Debug, Clone)]
pub struct EventState {
    event: Event,
    positions: BTreeMap<PositionId, Position>,
    blocks: BTreeMap<BlockId, TimeBlock>,
    applications: BTreeMap<ApplicationId, Application>,
    announcement: Option<MessageHandle>,
    next_application: u64,
}

impl EventState {
    pub fn new(event: Event, positions: Vec<Position>, blocks: Vec<TimeBlock>) -> Self {
        Self {
            event,
            positions: positions.into_iter().map(|p| (p.id, p)).collect(),
            blocks: blocks.into_iter().map(|b| (b.id, b)).collect(),
            applications: BTreeMap::new(),
            announcement: None,
            next_application: 1,
        }
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub(crate) fn set_event_status(&mut self, status: EventStatus) {
        self.event.status = status;
    }

    pub fn position(&self, id: PositionId) -> Option<&Position> {
        self.positions.get(&id)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn block(&self, id: BlockId) -> Option<&TimeBlock> {
        self.blocks.get(&id)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &TimeBlock> {
        self.blocks.values()
    }

    pub fn application(&self, id: ApplicationId) -> Option<&Application> {
        self.applications.get(&id)
    }

    pub fn applications(&self) -> impl Iterator<Item = &Application> {
        self.applications.values()
    }

    pub(crate) fn application_mut(&mut self, id: ApplicationId) -> Option<&mut Application> {
        self.applications.get_mut(&id)
    }

    pub(crate) fn insert_application(
        &mut self,
        candidate: CandidateId,
        slot: Slot,
        status: ApplicationStatus,
        now: DateTime<Utc>,
    ) -> ApplicationId {
        let id = ApplicationId(self.next_application);
        self.next_application += 1;
        self.applications.insert(
            id,
            Application {
                id,
                candidate,
                slot,
                status,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    pub(crate) fn remove_application(&mut self, id: ApplicationId) -> Option<Application> {
        self.applications.remove(&id)
    }

    /// The holding application occupying a slot, if any. Slot exclusivity
    /// keeps this unique.
    pub fn holder_of(&self, slot: &Slot) -> Option<&Application> {
        self.applications
            .values()
            .find(|app| app.slot == *slot && app.status.is_holding())
    }

    pub fn pending_on(&self, slot: &Slot) -> usize {
        self.applications
            .values()
            .filter(|app| app.slot == *slot && app.status == ApplicationStatus::Pending)
            .count()
    }

    /// The candidate's holding application inside a block, if any. The
    /// no-double-booking rule keeps this unique.
    pub fn holding_in_block(
        &self,
        candidate: CandidateId,
        block: BlockId,
        except: Option<ApplicationId>,
    ) -> Option<&Application> {
        self.applications.values().find(|app| {
            app.candidate == candidate
                && app.slot.block == block
                && app.status.is_holding()
                && Some(app.id) != except
        })
    }

    pub fn existing_application(&self, candidate: CandidateId, slot: &Slot) -> Option<&Application> {
        self.applications
            .values()
            .find(|app| app.candidate == candidate && app.slot == *slot)
    }

    /// Every candidate that ever applied to this event, in any status.
    pub fn applicants(&self) -> BTreeSet<CandidateId> {
        self.applications.values().map(|app| app.candidate).collect()
    }

    pub fn announcement(&self) -> Option<&MessageHandle> {
        self.announcement.as_ref()
    }

    pub(crate) fn set_announcement(&mut self, handle: MessageHandle) {
        self.announcement = Some(handle);
    }
}

/// Storage seam for the booking engine. `transact` runs its closure under a
/// serializable transaction scoped to one event, so invariants can be
/// re-validated against committed state; unrelated events proceed in
/// parallel. Candidate and admin records live outside the event scope.
pub trait BookingStore: Send + Sync {
    fn register_event(&self, state: EventState) -> Result<(), StoreError>;

    fn transact<T, E>(
        &self,
        event: EventId,
        f: impl FnOnce(&mut EventState) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>;

    fn read<T, E>(&self, event: EventId, f: impl FnOnce(&EventState) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>;

    fn upsert_candidate(&self, candidate: Candidate) -> Result<(), StoreError>;
    fn candidate(&self, cid: CandidateId) -> Result<Candidate, StoreError>;
    fn candidate_by_chat(&self, user: &ChatUserId) -> Result<Option<Candidate>, StoreError>;
    fn bump_counters(&self, cid: CandidateId, delta: CounterDelta) -> Result<(), StoreError>;
    fn candidate_applications(
        &self,
        cid: CandidateId,
    ) -> Result<Vec<(EventId, Application)>, StoreError>;

    fn register_admin(&self, admin: AdminContact) -> Result<(), StoreError>;
    fn admins(&self) -> Result<Vec<AdminContact>, StoreError>;

    fn event_ids(&self) -> Result<Vec<EventId>, StoreError>;
}

/// In-memory store backing tests and the bundled service. Each event sits
/// behind its own mutex, which is what gives `transact` its serializable
/// per-event scope.
#[derive(Default)]
pub struct MemoryBookingStore {
    events: RwLock<HashMap<EventId, Arc<Mutex<EventState>>>>,
    candidates: Mutex<HashMap<CandidateId, Candidate>>,
    admins: Mutex<Vec<AdminContact>>,
}

impl MemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn event_cell(&self, event: EventId) -> Result<Arc<Mutex<EventState>>, StoreError> {
        let events = self.events.read().expect("event map lock poisoned");
        events.get(&event).cloned().ok_or(StoreError::EventNotFound)
    }
}

impl BookingStore for MemoryBookingStore {
    fn register_event(&self, state: EventState) -> Result<(), StoreError> {
        let mut events = self.events.write().expect("event map lock poisoned");
        let id = state.event().id;
        if events.contains_key(&id) {
            return Err(StoreError::EventExists);
        }
        events.insert(id, Arc::new(Mutex::new(state)));
        Ok(())
    }

    fn transact<T, E>(
        &self,
        event: EventId,
        f: impl FnOnce(&mut EventState) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let cell = self.event_cell(event).map_err(E::from)?;
        let mut state = cell.lock().expect("event lock poisoned");
        f(&mut state)
    }

    fn read<T, E>(&self, event: EventId, f: impl FnOnce(&EventState) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let cell = self.event_cell(event).map_err(E::from)?;
        let state = cell.lock().expect("event lock poisoned");
        f(&state)
    }

    fn upsert_candidate(&self, candidate: Candidate) -> Result<(), StoreError> {
        let mut candidates = self.candidates.lock().expect("candidate lock poisoned");
        candidates.insert(candidate.cid, candidate);
        Ok(())
    }

    fn candidate(&self, cid: CandidateId) -> Result<Candidate, StoreError> {
        let candidates = self.candidates.lock().expect("candidate lock poisoned");
        candidates.get(&cid).cloned().ok_or(StoreError::CandidateNotFound)
    }

    fn candidate_by_chat(&self, user: &ChatUserId) -> Result<Option<Candidate>, StoreError> {
        let candidates = self.candidates.lock().expect("candidate lock poisoned");
        Ok(candidates
            .values()
            .find(|candidate| candidate.chat_user == *user)
            .cloned())
    }

    fn bump_counters(&self, cid: CandidateId, delta: CounterDelta) -> Result<(), StoreError> {
        let mut candidates = self.candidates.lock().expect("candidate lock poisoned");
        let candidate = candidates.get_mut(&cid).ok_or(StoreError::CandidateNotFound)?;
        candidate.total_applications += delta.applications;
        candidate.total_participations += delta.participations;
        candidate.total_cancellations += delta.cancellations;
        candidate.total_no_shows += delta.no_shows;
        Ok(())
    }

    fn candidate_applications(
        &self,
        cid: CandidateId,
    ) -> Result<Vec<(EventId, Application)>, StoreError> {
        let events = self.events.read().expect("event map lock poisoned");
        let mut found = Vec::new();
        for (id, cell) in events.iter() {
            let state = cell.lock().expect("event lock poisoned");
            for app in state.applications().filter(|app| app.candidate == cid) {
                found.push((*id, app.clone()));
            }
        }
        found.sort_by_key(|(event, app)| (*event, app.id));
        Ok(found)
    }

    fn register_admin(&self, admin: AdminContact) -> Result<(), StoreError> {
        let mut admins = self.admins.lock().expect("admin lock poisoned");
        if !admins.iter().any(|known| known.chat_user == admin.chat_user) {
            admins.push(admin);
        }
        Ok(())
    }

    fn admins(&self) -> Result<Vec<AdminContact>, StoreError> {
        Ok(self.admins.lock().expect("admin lock poisoned").clone())
    }

    fn event_ids(&self) -> Result<Vec<EventId>, StoreError> {
        let events = self.events.read().expect("event map lock poisoned");
        let mut ids: Vec<EventId> = events.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}

impl crate::workflows::notify::AdminRoster for MemoryBookingStore {
    fn admins(&self) -> Vec<AdminContact> {
        BookingStore::admins(self).unwrap_or_default()
    }
}
