//! Asynchronous notification delivery: a durable job queue drained by a
//! single background worker, with bounded primary-channel retries and an
//! ephemeral fallback channel per unreachable recipient.

pub mod job;
pub mod queue;
pub mod worker;

pub use job::{
    ChannelHandle, ConfirmAction, DeliveryState, JobId, JobKind, JobPriority, NotificationJob,
    NotificationPayload, Recipient,
};
pub use queue::JobQueue;
pub use worker::{
    AdminRoster, ChannelLifecycle, ChannelLifecycleError, DeliveryOutcome, DeliveryPolicy,
    DeliveryWorker, DirectMessenger, FallbackRegistry,
};

use std::sync::Arc;

use chrono::Utc;

use crate::workflows::booking::domain::ChatUserId;

/// What the booking engine sees of the notification subsystem: enqueue a
/// job, report a received confirmation. Everything else (delivery, retries,
/// channel lifecycle) happens behind the worker.
pub trait NotificationGateway: Send + Sync {
    fn enqueue(&self, job: NotificationJob) -> JobId;

    /// Called when a recipient performs a payload's confirmation action;
    /// winds down their fallback channel after the grace period, if one
    /// exists.
    fn confirm_received(&self, user: &ChatUserId);
}

/// Shared handle pairing the queue and the fallback registry the delivery
/// worker operates on.
pub struct Notifier {
    queue: Arc<JobQueue>,
    registry: Arc<FallbackRegistry>,
    policy: DeliveryPolicy,
}

impl Notifier {
    pub fn new(queue: Arc<JobQueue>, registry: Arc<FallbackRegistry>, policy: DeliveryPolicy) -> Self {
        Self {
            queue,
            registry,
            policy,
        }
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn registry(&self) -> &Arc<FallbackRegistry> {
        &self.registry
    }
}

impl NotificationGateway for Notifier {
    fn enqueue(&self, job: NotificationJob) -> JobId {
        self.queue.enqueue(job)
    }

    fn confirm_received(&self, user: &ChatUserId) {
        let teardown_at = Utc::now() + self.policy.confirm_grace;
        self.registry.schedule_teardown(user, teardown_at);
    }
}
