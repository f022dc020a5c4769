use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::config::DeliveryConfig;
use crate::workflows::booking::domain::{AdminContact, ChatUserId};

use super::job::{
    ChannelHandle, DeliveryState, NotificationJob, NotificationPayload, Recipient,
};
use super::queue::JobQueue;

/// Result of a primary delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Undeliverable,
}

/// Failure in the fallback-channel collaborator. Logged and surfaced as a
/// degraded-notification status; never rolls back booking state.
#[derive(Debug, thiserror::Error)]
pub enum ChannelLifecycleError {
    #[error("channel transport unavailable: {0}")]
    Transport(String),
    #[error("channel not found")]
    NotFound,
}

/// Direct-message seam to the chat platform.
pub trait DirectMessenger: Send + Sync {
    fn send_direct(&self, to: &Recipient, payload: &NotificationPayload) -> DeliveryOutcome;
}

/// Side-channel lifecycle seam: create a private channel visible to the
/// recipient and the admin group, post into it, delete it.
pub trait ChannelLifecycle: Send + Sync {
    fn create_private_channel(
        &self,
        recipient: &Recipient,
        viewers: &[AdminContact],
    ) -> Result<ChannelHandle, ChannelLifecycleError>;

    fn post(
        &self,
        channel: &ChannelHandle,
        recipient: &Recipient,
        payload: &NotificationPayload,
    ) -> Result<(), ChannelLifecycleError>;

    fn delete_channel(&self, channel: &ChannelHandle) -> Result<(), ChannelLifecycleError>;
}

/// Source of the admin group granted visibility into fallback channels.
pub trait AdminRoster: Send + Sync {
    fn admins(&self) -> Vec<AdminContact>;
}

/// Bounded-attempt delivery policy.
#[derive(Debug, Clone)]
pub struct DeliveryPolicy {
    /// Primary attempts before falling back to a side channel.
    pub max_primary_attempts: u32,
    /// Pause between failed primary attempts.
    pub retry_backoff: Duration,
    /// Grace period between a received confirmation and channel teardown,
    /// so the confirmation UI can render.
    pub confirm_grace: Duration,
    /// Bound on how long an unconfirmed fallback channel may live.
    pub unconfirmed_ttl: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_primary_attempts: 2,
            retry_backoff: Duration::seconds(30),
            confirm_grace: Duration::seconds(5),
            unconfirmed_ttl: Duration::minutes(30),
        }
    }
}

impl From<&DeliveryConfig> for DeliveryPolicy {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            max_primary_attempts: config.max_primary_attempts,
            retry_backoff: Duration::seconds(config.retry_backoff_secs as i64),
            confirm_grace: Duration::seconds(config.confirm_grace_secs as i64),
            unconfirmed_ttl: Duration::seconds(config.unconfirmed_ttl_secs as i64),
        }
    }
}

#[derive(Debug, Clone)]
struct FallbackChannel {
    handle: ChannelHandle,
    teardown_at: DateTime<Utc>,
    confirmed: bool,
}

/// Live fallback channels, one per recipient. Channels self-clean: a
/// received confirmation schedules teardown after the grace period, and
/// unconfirmed channels expire at their TTL regardless.
#[derive(Default)]
pub struct FallbackRegistry {
    inner: Mutex<HashMap<ChatUserId, FallbackChannel>>,
}

impl FallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The recipient's live channel, if one exists and is not already
    /// winding down after a confirmation.
    pub fn live(&self, user: &ChatUserId) -> Option<ChannelHandle> {
        let inner = self.inner.lock().expect("fallback registry lock poisoned");
        inner
            .get(user)
            .filter(|channel| !channel.confirmed)
            .map(|channel| channel.handle.clone())
    }

    pub fn register(&self, user: ChatUserId, handle: ChannelHandle, expires_at: DateTime<Utc>) {
        let mut inner = self.inner.lock().expect("fallback registry lock poisoned");
        inner.insert(
            user,
            FallbackChannel {
                handle,
                teardown_at: expires_at,
                confirmed: false,
            },
        );
    }

    /// Marks the recipient's channel as confirmed and schedules its
    /// teardown. Returns whether a channel was found.
    pub fn schedule_teardown(&self, user: &ChatUserId, at: DateTime<Utc>) -> bool {
        let mut inner = self.inner.lock().expect("fallback registry lock poisoned");
        match inner.get_mut(user) {
            Some(channel) => {
                channel.confirmed = true;
                channel.teardown_at = at;
                true
            }
            None => false,
        }
    }

    fn due(&self, now: DateTime<Utc>) -> Vec<(ChatUserId, ChannelHandle)> {
        let mut inner = self.inner.lock().expect("fallback registry lock poisoned");
        let expired: Vec<ChatUserId> = inner
            .iter()
            .filter(|(_, channel)| channel.teardown_at <= now)
            .map(|(user, _)| user.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|user| inner.remove(&user).map(|channel| (user, channel.handle)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("fallback registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Single-consumer loop draining the job queue, decoupled from the
/// transactions that enqueue. Delivery is at-least-once: a crash between
/// claim and record may replay a job, but never loses one.
pub struct DeliveryWorker<M, C, R> {
    queue: Arc<JobQueue>,
    registry: Arc<FallbackRegistry>,
    messenger: Arc<M>,
    channels: Arc<C>,
    roster: Arc<R>,
    policy: DeliveryPolicy,
}

impl<M, C, R> DeliveryWorker<M, C, R>
where
    M: DirectMessenger,
    C: ChannelLifecycle,
    R: AdminRoster,
{
    pub fn new(
        queue: Arc<JobQueue>,
        registry: Arc<FallbackRegistry>,
        messenger: Arc<M>,
        channels: Arc<C>,
        roster: Arc<R>,
        policy: DeliveryPolicy,
    ) -> Self {
        Self {
            queue,
            registry,
            messenger,
            channels,
            roster,
            policy,
        }
    }

    /// Processes every job ready at `now`. Returns how many reached a
    /// terminal or rescheduled outcome this pass.
    pub fn drain_once(&self, now: DateTime<Utc>) -> usize {
        let mut processed = 0;
        while let Some(job) = self.queue.claim(now) {
            self.deliver(job, now);
            processed += 1;
        }
        processed
    }

    fn deliver(&self, mut job: NotificationJob, now: DateTime<Utc>) {
        // A recipient with a live fallback channel gets everything there;
        // their direct messages are already known to fail.
        if let Some(handle) = self.registry.live(&job.recipient.user) {
            match self.channels.post(&handle, &job.recipient, &job.payload) {
                Ok(()) => {
                    debug!(job = job.id.0, channel = %handle.0, "delivered via existing fallback channel");
                    job.state = DeliveryState::DeliveredFallback;
                    job.fallback_channel = Some(handle);
                    self.queue.record(job);
                }
                Err(error) => {
                    warn!(job = job.id.0, %error, "existing fallback channel unusable, creating a new one");
                    self.fall_back(job, now);
                }
            }
            return;
        }

        match self.messenger.send_direct(&job.recipient, &job.payload) {
            DeliveryOutcome::Delivered => {
                debug!(job = job.id.0, kind = job.payload.kind().label(), "delivered direct");
                job.state = DeliveryState::DeliveredPrimary;
                self.queue.record(job);
            }
            DeliveryOutcome::Undeliverable => {
                job.attempts += 1;
                if job.attempts < self.policy.max_primary_attempts {
                    debug!(
                        job = job.id.0,
                        attempts = job.attempts,
                        "direct delivery failed, rescheduling"
                    );
                    job.not_before = Some(now + self.policy.retry_backoff);
                    self.queue.requeue(job);
                } else {
                    self.fall_back(job, now);
                }
            }
        }
    }

    fn fall_back(&self, mut job: NotificationJob, now: DateTime<Utc>) {
        let admins = self.roster.admins();
        let created = self
            .channels
            .create_private_channel(&job.recipient, &admins)
            .and_then(|handle| {
                self.channels
                    .post(&handle, &job.recipient, &job.payload)
                    .map(|()| handle)
            });

        match created {
            Ok(handle) => {
                info!(
                    job = job.id.0,
                    recipient = %job.recipient.user,
                    channel = %handle.0,
                    "delivered via new fallback channel"
                );
                self.registry.register(
                    job.recipient.user.clone(),
                    handle.clone(),
                    now + self.policy.unconfirmed_ttl,
                );
                job.state = DeliveryState::DeliveredFallback;
                job.fallback_channel = Some(handle);
                self.queue.record(job);
            }
            Err(error) => {
                warn!(
                    job = job.id.0,
                    recipient = %job.recipient.user,
                    %error,
                    "fallback channel unavailable, notification degraded"
                );
                job.state = DeliveryState::Failed;
                self.queue.record(job);
            }
        }
    }

    /// Deletes channels whose teardown time has passed, confirmed or not.
    pub fn sweep_channels(&self, now: DateTime<Utc>) -> usize {
        let due = self.registry.due(now);
        let mut removed = 0;
        for (user, handle) in due {
            match self.channels.delete_channel(&handle) {
                Ok(()) => {
                    debug!(recipient = %user, channel = %handle.0, "fallback channel deleted");
                }
                Err(error) => {
                    warn!(recipient = %user, channel = %handle.0, %error, "fallback channel delete failed");
                }
            }
            removed += 1;
        }
        removed
    }

    /// Long-running drain loop. `poll` is the pause between passes.
    pub async fn run(self, poll: std::time::Duration) {
        info!("notification delivery loop started");
        loop {
            let now = Utc::now();
            self.drain_once(now);
            self.sweep_channels(now);
            tokio::time::sleep(poll).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::notify::job::JobKind;
    use std::collections::HashSet;

    #[derive(Default)]
    struct ScriptedMessenger {
        unreachable: Mutex<HashSet<String>>,
        sent: Mutex<Vec<(String, JobKind)>>,
    }

    impl ScriptedMessenger {
        fn unreachable(users: &[&str]) -> Self {
            Self {
                unreachable: Mutex::new(users.iter().map(|u| u.to_string()).collect()),
                sent: Mutex::default(),
            }
        }

        fn sent(&self) -> Vec<(String, JobKind)> {
            self.sent.lock().expect("lock").clone()
        }
    }

    impl DirectMessenger for ScriptedMessenger {
        fn send_direct(&self, to: &Recipient, payload: &NotificationPayload) -> DeliveryOutcome {
            if self.unreachable.lock().expect("lock").contains(&to.user.0) {
                return DeliveryOutcome::Undeliverable;
            }
            self.sent
                .lock()
                .expect("lock")
                .push((to.user.0.clone(), payload.kind()));
            DeliveryOutcome::Delivered
        }
    }

    #[derive(Default)]
    struct RecordingChannels {
        refuse_create: bool,
        created: Mutex<Vec<ChannelHandle>>,
        posts: Mutex<Vec<(ChannelHandle, JobKind)>>,
        deleted: Mutex<Vec<ChannelHandle>>,
    }

    impl RecordingChannels {
        fn refusing() -> Self {
            Self {
                refuse_create: true,
                ..Self::default()
            }
        }

        fn created(&self) -> Vec<ChannelHandle> {
            self.created.lock().expect("lock").clone()
        }

        fn deleted(&self) -> Vec<ChannelHandle> {
            self.deleted.lock().expect("lock").clone()
        }

        fn posts(&self) -> Vec<(ChannelHandle, JobKind)> {
            self.posts.lock().expect("lock").clone()
        }
    }

    impl ChannelLifecycle for RecordingChannels {
        fn create_private_channel(
            &self,
            recipient: &Recipient,
            _viewers: &[AdminContact],
        ) -> Result<ChannelHandle, ChannelLifecycleError> {
            if self.refuse_create {
                return Err(ChannelLifecycleError::Transport("missing permission".into()));
            }
            let mut created = self.created.lock().expect("lock");
            let handle = ChannelHandle(format!("fallback-{}-{}", recipient.user.0, created.len()));
            created.push(handle.clone());
            Ok(handle)
        }

        fn post(
            &self,
            channel: &ChannelHandle,
            _recipient: &Recipient,
            payload: &NotificationPayload,
        ) -> Result<(), ChannelLifecycleError> {
            self.posts
                .lock()
                .expect("lock")
                .push((channel.clone(), payload.kind()));
            Ok(())
        }

        fn delete_channel(&self, channel: &ChannelHandle) -> Result<(), ChannelLifecycleError> {
            self.deleted.lock().expect("lock").push(channel.clone());
            Ok(())
        }
    }

    struct StaticRoster;

    impl AdminRoster for StaticRoster {
        fn admins(&self) -> Vec<AdminContact> {
            vec![AdminContact {
                chat_user: ChatUserId("admin-1".to_string()),
                display_name: "Event Staff".to_string(),
            }]
        }
    }

    fn recipient(tag: &str) -> Recipient {
        Recipient {
            user: ChatUserId(tag.to_string()),
            display_name: tag.to_string(),
        }
    }

    fn selection_job(tag: &str) -> NotificationJob {
        NotificationJob::new(
            recipient(tag),
            NotificationPayload::Selection {
                event_name: "Cross the Pond".to_string(),
                callsign: "SBGR_TWR".to_string(),
                block_label: "Block 1: 18:00-19:00z".to_string(),
            },
        )
    }

    fn worker(
        messenger: Arc<ScriptedMessenger>,
        channels: Arc<RecordingChannels>,
        policy: DeliveryPolicy,
    ) -> (
        DeliveryWorker<ScriptedMessenger, RecordingChannels, StaticRoster>,
        Arc<JobQueue>,
        Arc<FallbackRegistry>,
    ) {
        let queue = Arc::new(JobQueue::new());
        let registry = Arc::new(FallbackRegistry::new());
        let worker = DeliveryWorker::new(
            queue.clone(),
            registry.clone(),
            messenger,
            channels,
            Arc::new(StaticRoster),
            policy,
        );
        (worker, queue, registry)
    }

    #[test]
    fn reachable_recipient_is_delivered_primary() {
        let messenger = Arc::new(ScriptedMessenger::default());
        let channels = Arc::new(RecordingChannels::default());
        let (worker, queue, _) = worker(messenger.clone(), channels.clone(), DeliveryPolicy::default());

        queue.enqueue(selection_job("alice"));
        let now = Utc::now();
        assert_eq!(worker.drain_once(now), 1);

        let history = queue.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].state, DeliveryState::DeliveredPrimary);
        assert_eq!(messenger.sent().len(), 1);
        assert!(channels.created().is_empty());
    }

    #[test]
    fn two_failures_open_exactly_one_fallback_channel() {
        let messenger = Arc::new(ScriptedMessenger::unreachable(&["bob"]));
        let channels = Arc::new(RecordingChannels::default());
        let (worker, queue, registry) =
            worker(messenger, channels.clone(), DeliveryPolicy::default());

        queue.enqueue(selection_job("bob"));
        let now = Utc::now();

        // First attempt fails and reschedules with backoff.
        assert_eq!(worker.drain_once(now), 1);
        assert!(queue.history().is_empty());
        assert!(channels.created().is_empty());

        // Second attempt, after the backoff, degrades to a fallback channel.
        let retry_at = now + Duration::seconds(31);
        assert_eq!(worker.drain_once(retry_at), 1);

        let history = queue.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].state, DeliveryState::DeliveredFallback);
        assert_eq!(history[0].attempts, 2);
        assert_eq!(channels.created().len(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn existing_fallback_channel_is_reused_for_later_jobs() {
        let messenger = Arc::new(ScriptedMessenger::unreachable(&["bob"]));
        let channels = Arc::new(RecordingChannels::default());
        let (worker, queue, _) = worker(messenger, channels.clone(), DeliveryPolicy::default());

        queue.enqueue(selection_job("bob"));
        let now = Utc::now();
        worker.drain_once(now);
        worker.drain_once(now + Duration::seconds(31));
        assert_eq!(channels.created().len(), 1);

        // A later job for the same recipient goes straight to the channel.
        queue.enqueue(selection_job("bob"));
        worker.drain_once(now + Duration::seconds(32));
        assert_eq!(channels.created().len(), 1, "no second channel");
        assert_eq!(channels.posts().len(), 2);
        let history = queue.history();
        assert_eq!(history.len(), 2);
        assert!(history
            .iter()
            .all(|job| job.state == DeliveryState::DeliveredFallback));
    }

    #[test]
    fn confirmation_schedules_exactly_one_deletion_after_grace() {
        let messenger = Arc::new(ScriptedMessenger::unreachable(&["bob"]));
        let channels = Arc::new(RecordingChannels::default());
        let policy = DeliveryPolicy::default();
        let grace = policy.confirm_grace;
        let (worker, queue, registry) = worker(messenger, channels.clone(), policy);

        queue.enqueue(selection_job("bob"));
        let now = Utc::now();
        worker.drain_once(now);
        worker.drain_once(now + Duration::seconds(31));

        let confirmed_at = now + Duration::seconds(40);
        assert!(registry.schedule_teardown(&ChatUserId("bob".to_string()), confirmed_at + grace));

        // Before the grace elapses the channel survives.
        assert_eq!(worker.sweep_channels(confirmed_at), 0);
        // After the grace it is deleted exactly once.
        assert_eq!(worker.sweep_channels(confirmed_at + grace), 1);
        assert_eq!(channels.deleted().len(), 1);
        assert_eq!(worker.sweep_channels(confirmed_at + grace * 2), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn unconfirmed_channel_expires_at_ttl() {
        let messenger = Arc::new(ScriptedMessenger::unreachable(&["bob"]));
        let channels = Arc::new(RecordingChannels::default());
        let policy = DeliveryPolicy::default();
        let ttl = policy.unconfirmed_ttl;
        let (worker, queue, registry) = worker(messenger, channels.clone(), policy);

        queue.enqueue(selection_job("bob"));
        let now = Utc::now();
        worker.drain_once(now);
        let opened_at = now + Duration::seconds(31);
        worker.drain_once(opened_at);
        assert_eq!(registry.len(), 1);

        assert_eq!(worker.sweep_channels(opened_at + ttl - Duration::seconds(1)), 0);
        assert_eq!(worker.sweep_channels(opened_at + ttl + Duration::seconds(1)), 1);
        assert_eq!(channels.deleted().len(), 1);
    }

    #[test]
    fn channel_creation_failure_marks_job_failed() {
        let messenger = Arc::new(ScriptedMessenger::unreachable(&["bob"]));
        let channels = Arc::new(RecordingChannels::refusing());
        let (worker, queue, registry) = worker(messenger, channels, DeliveryPolicy::default());

        queue.enqueue(selection_job("bob"));
        let now = Utc::now();
        worker.drain_once(now);
        worker.drain_once(now + Duration::seconds(31));

        let failed = queue.failed();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].state, DeliveryState::Failed);
        assert!(registry.is_empty());
    }
}
