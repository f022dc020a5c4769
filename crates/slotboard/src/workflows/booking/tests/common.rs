use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};

use crate::workflows::booking::announcement::{
    AnnouncementError, AnnouncementSurface, AnnouncementView,
};
use crate::workflows::booking::domain::{
    AdminContact, ApplicationId, BlockId, Candidate, CandidateId, ChatUserId, ControllerRating,
    Event, EventId, EventStatus, MessageHandle, Position, PositionId, Slot,
};
use crate::workflows::booking::service::BookingService;
use crate::workflows::booking::store::MemoryBookingStore;
use crate::workflows::directory::generate_blocks;
use crate::workflows::notify::{JobId, JobKind, NotificationGateway, NotificationJob};

pub(super) const EVENT: EventId = EventId(18010);
pub(super) const TOWER: PositionId = PositionId(1);
pub(super) const GROUND: PositionId = PositionId(2);
pub(super) const BLOCK_1: BlockId = BlockId(1);
pub(super) const BLOCK_2: BlockId = BlockId(2);

pub(super) const ALICE: CandidateId = CandidateId(1000001);
pub(super) const BOB: CandidateId = CandidateId(1000002);
pub(super) const CAROL: CandidateId = CandidateId(1000003);

pub(super) type Service = BookingService<MemoryBookingStore, MemoryGateway, MemoryAnnouncements>;

pub(super) fn window() -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc
        .with_ymd_and_hms(2026, 3, 7, 18, 0, 0)
        .single()
        .expect("valid window start");
    (start, start + chrono::Duration::hours(2))
}

pub(super) fn event(status: EventStatus) -> Event {
    let (starts_at, ends_at) = window();
    Event {
        id: EVENT,
        name: "Carnival Crossfire".to_string(),
        banner_url: "https://example.org/banner.png".to_string(),
        starts_at,
        ends_at,
        status,
        block_minutes: 60,
    }
}

/// Same event stretched to three blocks, for scenarios that need a
/// candidate holding two blocks while still pending in a third.
pub(super) fn three_block_event(status: EventStatus) -> Event {
    let mut event = event(status);
    event.ends_at = event.starts_at + chrono::Duration::hours(3);
    event
}

pub(super) fn positions() -> Vec<Position> {
    vec![
        Position {
            id: TOWER,
            icao: "SBGR".to_string(),
            designator: "TWR".to_string(),
            min_rating: ControllerRating::Student2,
        },
        Position {
            id: GROUND,
            icao: "SBGR".to_string(),
            designator: "GND".to_string(),
            min_rating: ControllerRating::Student1,
        },
    ]
}

pub(super) fn slot(position: PositionId, block: BlockId) -> Slot {
    Slot { position, block }
}

pub(super) fn candidate(
    cid: CandidateId,
    name: &str,
    rating: ControllerRating,
) -> Candidate {
    Candidate::new(cid, ChatUserId(format!("chat-{name}")), name, rating)
}

#[derive(Default)]
pub(super) struct MemoryGateway {
    jobs: Mutex<Vec<NotificationJob>>,
    confirms: Mutex<Vec<ChatUserId>>,
}

impl MemoryGateway {
    pub(super) fn jobs(&self) -> Vec<NotificationJob> {
        self.jobs.lock().expect("gateway lock poisoned").clone()
    }

    pub(super) fn jobs_of(&self, kind: JobKind) -> Vec<NotificationJob> {
        self.jobs()
            .into_iter()
            .filter(|job| job.payload.kind() == kind)
            .collect()
    }

    pub(super) fn confirms(&self) -> Vec<ChatUserId> {
        self.confirms.lock().expect("gateway lock poisoned").clone()
    }
}

impl NotificationGateway for MemoryGateway {
    fn enqueue(&self, job: NotificationJob) -> JobId {
        let mut jobs = self.jobs.lock().expect("gateway lock poisoned");
        let id = JobId(jobs.len() as u64 + 1);
        jobs.push(job);
        id
    }

    fn confirm_received(&self, user: &ChatUserId) {
        self.confirms
            .lock()
            .expect("gateway lock poisoned")
            .push(user.clone());
    }
}

#[derive(Default)]
pub(super) struct MemoryAnnouncements {
    pub(super) fail_updates: bool,
    published: Mutex<Vec<String>>,
    updates: Mutex<Vec<String>>,
}

impl MemoryAnnouncements {
    pub(super) fn failing() -> Self {
        Self {
            fail_updates: true,
            ..Self::default()
        }
    }

    pub(super) fn updates(&self) -> Vec<String> {
        self.updates.lock().expect("announcement lock poisoned").clone()
    }
}

impl AnnouncementSurface for MemoryAnnouncements {
    fn publish(
        &self,
        event: EventId,
        view: &AnnouncementView,
    ) -> Result<MessageHandle, AnnouncementError> {
        self.published
            .lock()
            .expect("announcement lock poisoned")
            .push(view.render_text());
        Ok(MessageHandle {
            channel: "announcements".to_string(),
            message: format!("event-{}", event.0),
        })
    }

    fn update(
        &self,
        _handle: &MessageHandle,
        view: &AnnouncementView,
    ) -> Result<(), AnnouncementError> {
        if self.fail_updates {
            return Err(AnnouncementError::Surface("announcement offline".into()));
        }
        self.updates
            .lock()
            .expect("announcement lock poisoned")
            .push(view.render_text());
        Ok(())
    }
}

pub(super) fn build_service() -> (
    Arc<Service>,
    Arc<MemoryBookingStore>,
    Arc<MemoryGateway>,
    Arc<MemoryAnnouncements>,
) {
    build_service_with(event(EventStatus::Open), MemoryAnnouncements::default())
}

pub(super) fn build_service_with(
    event: Event,
    announcements: MemoryAnnouncements,
) -> (
    Arc<Service>,
    Arc<MemoryBookingStore>,
    Arc<MemoryGateway>,
    Arc<MemoryAnnouncements>,
) {
    let store = Arc::new(MemoryBookingStore::new());
    let gateway = Arc::new(MemoryGateway::default());
    let announcements = Arc::new(announcements);
    let service = Arc::new(BookingService::new(
        store.clone(),
        gateway.clone(),
        announcements.clone(),
    ));

    let blocks = generate_blocks(event.starts_at, event.ends_at, event.block_minutes);
    service
        .register_event(event, positions(), blocks)
        .expect("event registers");

    for (cid, name, rating) in [
        (ALICE, "alice", ControllerRating::Student3),
        (BOB, "bob", ControllerRating::Student2),
        (CAROL, "carol", ControllerRating::Student1),
    ] {
        service
            .register_candidate(candidate(cid, name, rating))
            .expect("candidate registers");
    }
    for name in ["staff-one", "staff-two"] {
        service
            .register_admin(AdminContact {
                chat_user: ChatUserId(format!("chat-{name}")),
                display_name: name.to_string(),
            })
            .expect("admin registers");
    }

    (service, store, gateway, announcements)
}

pub(super) fn apply(service: &Service, cid: CandidateId, slot: Slot) -> ApplicationId {
    service
        .create_application(cid, EVENT, slot)
        .expect("application accepted")
        .id
}
