//! Integration scenarios for the booking engine driven through the public
//! facade: allocation commits, asynchronous delivery with fallback, and the
//! self-cleaning side channel.

mod common {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    use chrono::{DateTime, TimeZone, Utc};

    use slotboard::workflows::booking::{
        AdminContact, AnnouncementError, AnnouncementSurface, AnnouncementView, BookingService,
        Candidate, CandidateId, ChatUserId, ControllerRating, Event, EventId, EventStatus,
        MemoryBookingStore, MessageHandle, Position, PositionId,
    };
    use slotboard::workflows::directory::generate_blocks;
    use slotboard::workflows::notify::{
        ChannelHandle, ChannelLifecycle, ChannelLifecycleError, DeliveryOutcome, DeliveryPolicy,
        DeliveryWorker, DirectMessenger, FallbackRegistry, JobQueue, NotificationPayload, Notifier,
        Recipient,
    };

    pub const EVENT: EventId = EventId(18010);
    pub const TOWER: PositionId = PositionId(1);
    pub const ALICE: CandidateId = CandidateId(1000001);
    pub const BOB: CandidateId = CandidateId(1000002);

    pub type Service = BookingService<MemoryBookingStore, Notifier, BoardSurface>;
    pub type Worker = DeliveryWorker<FlakyMessenger, RecordingChannels, MemoryBookingStore>;

    pub fn event_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 7, 18, 0, 0)
            .single()
            .expect("valid event start")
    }

    /// Direct messenger that refuses a configured set of recipients.
    #[derive(Default)]
    pub struct FlakyMessenger {
        unreachable: HashSet<String>,
        pub delivered: Mutex<Vec<String>>,
    }

    impl FlakyMessenger {
        pub fn unreachable(users: &[&str]) -> Self {
            Self {
                unreachable: users.iter().map(|user| user.to_string()).collect(),
                delivered: Mutex::default(),
            }
        }
    }

    impl DirectMessenger for FlakyMessenger {
        fn send_direct(&self, to: &Recipient, _payload: &NotificationPayload) -> DeliveryOutcome {
            if self.unreachable.contains(&to.user.0) {
                return DeliveryOutcome::Undeliverable;
            }
            self.delivered
                .lock()
                .expect("messenger lock poisoned")
                .push(to.user.0.clone());
            DeliveryOutcome::Delivered
        }
    }

    #[derive(Default)]
    pub struct RecordingChannels {
        pub created: Mutex<Vec<ChannelHandle>>,
        pub deleted: Mutex<Vec<ChannelHandle>>,
    }

    impl ChannelLifecycle for RecordingChannels {
        fn create_private_channel(
            &self,
            recipient: &Recipient,
            viewers: &[AdminContact],
        ) -> Result<ChannelHandle, ChannelLifecycleError> {
            assert!(
                !viewers.is_empty(),
                "fallback channels are scoped to the admin group"
            );
            let mut created = self.created.lock().expect("channel lock poisoned");
            let handle = ChannelHandle(format!("fallback-{}-{}", recipient.user.0, created.len()));
            created.push(handle.clone());
            Ok(handle)
        }

        fn post(
            &self,
            _channel: &ChannelHandle,
            _recipient: &Recipient,
            _payload: &NotificationPayload,
        ) -> Result<(), ChannelLifecycleError> {
            Ok(())
        }

        fn delete_channel(&self, channel: &ChannelHandle) -> Result<(), ChannelLifecycleError> {
            self.deleted
                .lock()
                .expect("channel lock poisoned")
                .push(channel.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct BoardSurface {
        pub updates: Mutex<Vec<String>>,
    }

    impl AnnouncementSurface for BoardSurface {
        fn publish(
            &self,
            event: EventId,
            _view: &AnnouncementView,
        ) -> Result<MessageHandle, AnnouncementError> {
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
            self.updates
                .lock()
                .expect("surface lock poisoned")
                .push(view.render_text());
            Ok(())
        }
    }

    pub struct Harness {
        pub service: Arc<Service>,
        pub store: Arc<MemoryBookingStore>,
        pub queue: Arc<JobQueue>,
        pub registry: Arc<FallbackRegistry>,
        pub worker: Worker,
        pub channels: Arc<RecordingChannels>,
        pub messenger: Arc<FlakyMessenger>,
    }

    pub fn harness(unreachable: &[&str]) -> Harness {
        let store = Arc::new(MemoryBookingStore::new());
        let queue = Arc::new(JobQueue::new());
        let registry = Arc::new(FallbackRegistry::new());
        let policy = DeliveryPolicy::default();
        let notifier = Arc::new(Notifier::new(queue.clone(), registry.clone(), policy.clone()));
        let surface = Arc::new(BoardSurface::default());
        let messenger = Arc::new(FlakyMessenger::unreachable(unreachable));
        let channels = Arc::new(RecordingChannels::default());

        let service = Arc::new(BookingService::new(store.clone(), notifier, surface));
        let worker = DeliveryWorker::new(
            queue.clone(),
            registry.clone(),
            messenger.clone(),
            channels.clone(),
            store.clone(),
            policy,
        );

        let starts_at = event_start();
        let ends_at = starts_at + chrono::Duration::hours(2);
        let event = Event {
            id: EVENT,
            name: "Carnival Crossfire".to_string(),
            banner_url: String::new(),
            starts_at,
            ends_at,
            status: EventStatus::Open,
            block_minutes: 60,
        };
        let positions = vec![Position {
            id: TOWER,
            icao: "SBGR".to_string(),
            designator: "TWR".to_string(),
            min_rating: ControllerRating::Student1,
        }];
        let blocks = generate_blocks(starts_at, ends_at, 60);
        service
            .register_event(event, positions, blocks)
            .expect("event registers");

        for (cid, name) in [(ALICE, "alice"), (BOB, "bob")] {
            service
                .register_candidate(Candidate::new(
                    cid,
                    ChatUserId(format!("chat-{name}")),
                    name,
                    ControllerRating::Student2,
                ))
                .expect("candidate registers");
        }
        service
            .register_admin(AdminContact {
                chat_user: ChatUserId("chat-staff".to_string()),
                display_name: "staff".to_string(),
            })
            .expect("admin registers");

        Harness {
            service,
            store,
            queue,
            registry,
            worker,
            channels,
            messenger,
        }
    }
}

mod delivery {
    use super::common::*;
    use chrono::{Duration, Utc};
    use slotboard::workflows::booking::{BlockId, Slot};
    use slotboard::workflows::notify::{DeliveryState, JobKind};

    fn tower_block_one() -> Slot {
        Slot {
            position: TOWER,
            block: BlockId(1),
        }
    }

    #[test]
    fn selection_notice_reaches_a_reachable_candidate_directly() {
        let h = harness(&[]);
        let app = h
            .service
            .create_application(ALICE, EVENT, tower_block_one())
            .expect("application accepted")
            .id;
        h.service
            .select_candidate(EVENT, app)
            .expect("selection commits");

        assert_eq!(h.queue.queued(), 1, "enqueue is decoupled from delivery");
        h.worker.drain_once(Utc::now());

        let history = h.queue.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].state, DeliveryState::DeliveredPrimary);
        assert_eq!(
            h.messenger.delivered.lock().expect("lock").as_slice(),
            ["chat-alice"]
        );
        assert!(h.channels.created.lock().expect("lock").is_empty());
    }

    #[test]
    fn unreachable_candidate_degrades_to_fallback_and_confirmation_cleans_up() {
        let h = harness(&["chat-alice"]);
        let app = h
            .service
            .create_application(ALICE, EVENT, tower_block_one())
            .expect("application accepted")
            .id;
        h.service
            .select_candidate(EVENT, app)
            .expect("selection commits");

        // Two failed primary attempts, the second after the backoff.
        let first = Utc::now();
        h.worker.drain_once(first);
        assert!(h.queue.history().is_empty());
        h.worker.drain_once(first + Duration::seconds(31));

        let history = h.queue.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].state, DeliveryState::DeliveredFallback);
        assert_eq!(history[0].payload.kind(), JobKind::Selection);
        assert_eq!(h.channels.created.lock().expect("lock").len(), 1);
        assert_eq!(h.registry.len(), 1);

        // The candidate confirms through the fallback channel; the service
        // reports the confirmation and the channel is torn down after the
        // grace period.
        h.service
            .confirm(ALICE, EVENT, app)
            .expect("confirm succeeds");
        let soon = Utc::now() + Duration::seconds(6);
        assert_eq!(h.worker.sweep_channels(soon), 1);
        assert_eq!(h.channels.deleted.lock().expect("lock").len(), 1);
        assert!(h.registry.is_empty());
    }

    #[test]
    fn no_show_alerts_drain_after_interactive_jobs() {
        let h = harness(&[]);
        let alice_app = h
            .service
            .create_application(ALICE, EVENT, tower_block_one())
            .expect("application accepted")
            .id;
        let bob_app = h
            .service
            .create_application(
                BOB,
                EVENT,
                Slot {
                    position: TOWER,
                    block: BlockId(2),
                },
            )
            .expect("application accepted")
            .id;

        h.service
            .select_candidate(EVENT, alice_app)
            .expect("selection commits");
        h.service
            .confirm(ALICE, EVENT, alice_app)
            .expect("confirm succeeds");
        // Alice abandons a confirmed slot (batch alert), then Bob is
        // selected (interactive notice).
        h.service
            .revoke(ALICE, EVENT, alice_app)
            .expect("revocation succeeds");
        h.service
            .select_candidate(EVENT, bob_app)
            .expect("selection commits");

        h.worker.drain_once(Utc::now());
        let history = h.queue.history();
        let kinds: Vec<JobKind> = history.iter().map(|job| job.payload.kind()).collect();
        let selection_index = kinds
            .iter()
            .rposition(|kind| *kind == JobKind::Selection)
            .expect("selection delivered");
        let alert_index = kinds
            .iter()
            .position(|kind| *kind == JobKind::NoShowAlert)
            .expect("alert delivered");
        assert!(
            selection_index < alert_index,
            "interactive jobs drain before batch alerts: {kinds:?}"
        );
    }

    #[test]
    fn event_state_survives_the_full_scenario() {
        let h = harness(&[]);
        let app = h
            .service
            .create_application(ALICE, EVENT, tower_block_one())
            .expect("application accepted")
            .id;
        h.service
            .select_candidate(EVENT, app)
            .expect("selection commits");
        h.service.confirm(ALICE, EVENT, app).expect("confirm");
        h.service
            .revoke(ALICE, EVENT, app)
            .expect("revocation succeeds");

        let pool = h
            .service
            .backfill_candidates(EVENT, tower_block_one())
            .expect("pool computed");
        assert_eq!(pool.len(), 1, "alice remains in the historical pool");

        let summary = h.service.event_summary(EVENT).expect("summary");
        assert_eq!(summary.counts.no_shows, 1);
        assert_eq!(summary.counts.locked, 0);

        use slotboard::workflows::booking::BookingStore;
        let alice = h.store.candidate(ALICE).expect("candidate present");
        assert_eq!(alice.total_no_shows, 1);
    }
}
