use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

use slotboard::workflows::booking::{
    AdminContact, AnnouncementError, AnnouncementSurface, AnnouncementView, BookingService,
    BookingStore, Candidate, ChatUserId, EventId, MemoryBookingStore, MessageHandle,
};
use slotboard::workflows::directory::{IdentityError, IdentityResolver, LinkedIdentity};
use slotboard::workflows::notify::{
    ChannelHandle, ChannelLifecycle, ChannelLifecycleError, DeliveryOutcome, DeliveryWorker,
    DirectMessenger, NotificationPayload, Notifier, Recipient,
};

pub(crate) type Service = BookingService<MemoryBookingStore, Notifier, BoardPublisher>;
pub(crate) type Worker =
    DeliveryWorker<LoggingMessenger, LoggingChannels, MemoryBookingStore>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Direct-message transport for deployments without a chat backend wired
/// in: every payload is logged and counted as delivered.
#[derive(Default)]
pub(crate) struct LoggingMessenger;

impl DirectMessenger for LoggingMessenger {
    fn send_direct(&self, to: &Recipient, payload: &NotificationPayload) -> DeliveryOutcome {
        info!(
            recipient = %to.user,
            kind = payload.kind().label(),
            "direct notification delivered"
        );
        DeliveryOutcome::Delivered
    }
}

/// Channel lifecycle that mints synthetic handles and logs the traffic.
#[derive(Default)]
pub(crate) struct LoggingChannels {
    counter: Mutex<u64>,
}

impl ChannelLifecycle for LoggingChannels {
    fn create_private_channel(
        &self,
        recipient: &Recipient,
        viewers: &[AdminContact],
    ) -> Result<ChannelHandle, ChannelLifecycleError> {
        let mut counter = self.counter.lock().expect("channel counter lock poisoned");
        *counter += 1;
        let handle = ChannelHandle(format!("fallback-{}", counter));
        info!(
            recipient = %recipient.user,
            channel = %handle.0,
            viewers = viewers.len(),
            "fallback channel created"
        );
        Ok(handle)
    }

    fn post(
        &self,
        channel: &ChannelHandle,
        recipient: &Recipient,
        payload: &NotificationPayload,
    ) -> Result<(), ChannelLifecycleError> {
        info!(
            channel = %channel.0,
            recipient = %recipient.user,
            kind = payload.kind().label(),
            "fallback notification posted"
        );
        Ok(())
    }

    fn delete_channel(&self, channel: &ChannelHandle) -> Result<(), ChannelLifecycleError> {
        info!(channel = %channel.0, "fallback channel deleted");
        Ok(())
    }
}

/// Announcement surface keeping the latest rendered board per event in
/// memory, so the admin UI can fetch what would be published.
#[derive(Default)]
pub(crate) struct BoardPublisher {
    boards: Mutex<HashMap<EventId, String>>,
}

impl BoardPublisher {
    pub(crate) fn board(&self, event: EventId) -> Option<String> {
        self.boards
            .lock()
            .expect("board lock poisoned")
            .get(&event)
            .cloned()
    }
}

impl AnnouncementSurface for BoardPublisher {
    fn publish(
        &self,
        event: EventId,
        view: &AnnouncementView,
    ) -> Result<MessageHandle, AnnouncementError> {
        self.boards
            .lock()
            .expect("board lock poisoned")
            .insert(event, view.render_text());
        Ok(MessageHandle {
            channel: "announcements".to_string(),
            message: format!("event-{}", event.0),
        })
    }

    fn update(
        &self,
        handle: &MessageHandle,
        view: &AnnouncementView,
    ) -> Result<(), AnnouncementError> {
        let id: u64 = handle
            .message
            .strip_prefix("event-")
            .and_then(|raw| raw.parse().ok())
            .ok_or(AnnouncementError::MessageGone)?;
        self.boards
            .lock()
            .expect("board lock poisoned")
            .insert(EventId(id), view.render_text());
        Ok(())
    }
}

/// Identity resolution backed by the candidate directory: chat identities
/// registered through the admin surface resolve, everything else is an
/// unlinked account.
pub(crate) struct StoreIdentityResolver {
    store: Arc<MemoryBookingStore>,
}

impl StoreIdentityResolver {
    pub(crate) fn new(store: Arc<MemoryBookingStore>) -> Self {
        Self { store }
    }
}

impl IdentityResolver for StoreIdentityResolver {
    fn resolve(&self, user: &ChatUserId) -> Result<LinkedIdentity, IdentityError> {
        match self.store.candidate_by_chat(user) {
            Ok(Some(Candidate {
                cid,
                display_name,
                rating,
                ..
            })) => Ok(LinkedIdentity {
                cid,
                display_name,
                rating,
            }),
            Ok(None) => Err(IdentityError::UnlinkedAccount(user.clone())),
            Err(error) => Err(IdentityError::Unavailable(error.to_string())),
        }
    }
}
