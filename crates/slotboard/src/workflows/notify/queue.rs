use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::job::{DeliveryState, JobId, JobPriority, NotificationJob};

/// Durable-in-spirit FIFO of notification jobs with two priority classes.
/// Enqueueing is a non-blocking append; the single delivery worker claims
/// jobs whose `not_before` has passed, interactive kinds first, otherwise
/// in insertion order. Terminal jobs move to a retained history so admins
/// can inspect failed deliveries.
#[derive(Default)]
pub struct JobQueue {
    inner: Mutex<QueueInner>,
}

#[derive(Default)]
struct QueueInner {
    interactive: VecDeque<NotificationJob>,
    batch: VecDeque<NotificationJob>,
    history: Vec<NotificationJob>,
    next_id: u64,
}

impl QueueInner {
    fn lane(&mut self, priority: JobPriority) -> &mut VecDeque<NotificationJob> {
        match priority {
            JobPriority::Interactive => &mut self.interactive,
            JobPriority::Batch => &mut self.batch,
        }
    }
}

fn claim_ready(lane: &mut VecDeque<NotificationJob>, now: DateTime<Utc>) -> Option<NotificationJob> {
    let index = lane.iter().position(|job| job.ready_at(now))?;
    lane.remove(index)
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts a new job, assigning its id. Visible to the worker from the
    /// moment this returns.
    pub fn enqueue(&self, mut job: NotificationJob) -> JobId {
        let mut inner = self.inner.lock().expect("job queue lock poisoned");
        inner.next_id += 1;
        job.id = JobId(inner.next_id);
        let id = job.id;
        let priority = job.payload.kind().priority();
        inner.lane(priority).push_back(job);
        id
    }

    /// Puts a claimed job back, keeping its id; used for backoff reschedules.
    pub fn requeue(&self, job: NotificationJob) {
        let mut inner = self.inner.lock().expect("job queue lock poisoned");
        let priority = job.payload.kind().priority();
        inner.lane(priority).push_back(job);
    }

    /// Claims the next job ready for delivery at `now`, if any.
    pub fn claim(&self, now: DateTime<Utc>) -> Option<NotificationJob> {
        let mut inner = self.inner.lock().expect("job queue lock poisoned");
        claim_ready(&mut inner.interactive, now).or_else(|| claim_ready(&mut inner.batch, now))
    }

    /// Records a job that reached a terminal delivery state.
    pub fn record(&self, job: NotificationJob) {
        let mut inner = self.inner.lock().expect("job queue lock poisoned");
        inner.history.push(job);
    }

    pub fn queued(&self) -> usize {
        let inner = self.inner.lock().expect("job queue lock poisoned");
        inner.interactive.len() + inner.batch.len()
    }

    pub fn history(&self) -> Vec<NotificationJob> {
        let inner = self.inner.lock().expect("job queue lock poisoned");
        inner.history.clone()
    }

    /// Jobs that exhausted every delivery path, surfaced to admins.
    pub fn failed(&self) -> Vec<NotificationJob> {
        let inner = self.inner.lock().expect("job queue lock poisoned");
        inner
            .history
            .iter()
            .filter(|job| job.state == DeliveryState::Failed)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::booking::domain::ChatUserId;
    use crate::workflows::notify::job::{NotificationPayload, Recipient};
    use chrono::Duration;

    fn recipient(tag: &str) -> Recipient {
        Recipient {
            user: ChatUserId(format!("chat-{tag}")),
            display_name: tag.to_string(),
        }
    }

    fn selection(tag: &str) -> NotificationJob {
        NotificationJob::new(
            recipient(tag),
            NotificationPayload::Selection {
                event_name: "Event".to_string(),
                callsign: "SBGR_TWR".to_string(),
                block_label: "Block 1".to_string(),
            },
        )
    }

    fn rejection(tag: &str) -> NotificationJob {
        NotificationJob::new(
            recipient(tag),
            NotificationPayload::Rejection {
                event_name: "Event".to_string(),
            },
        )
    }

    #[test]
    fn drains_fifo_within_priority_and_interactive_first() {
        let queue = JobQueue::new();
        let now = Utc::now();
        queue.enqueue(rejection("r1"));
        queue.enqueue(selection("s1"));
        queue.enqueue(selection("s2"));

        let first = queue.claim(now).expect("job ready");
        let second = queue.claim(now).expect("job ready");
        let third = queue.claim(now).expect("job ready");
        assert_eq!(first.recipient.display_name, "s1");
        assert_eq!(second.recipient.display_name, "s2");
        assert_eq!(third.recipient.display_name, "r1");
        assert!(queue.claim(now).is_none());
    }

    #[test]
    fn respects_not_before_on_requeued_jobs() {
        let queue = JobQueue::new();
        let now = Utc::now();
        let id = queue.enqueue(selection("s1"));

        let mut job = queue.claim(now).expect("job ready");
        assert_eq!(job.id, id);
        job.not_before = Some(now + Duration::seconds(30));
        queue.requeue(job);

        assert!(queue.claim(now).is_none(), "backoff holds the job");
        let later = now + Duration::seconds(31);
        let retried = queue.claim(later).expect("job ready after backoff");
        assert_eq!(retried.id, id, "requeue keeps the job id");
    }

    #[test]
    fn failed_jobs_remain_visible_in_history() {
        let queue = JobQueue::new();
        let now = Utc::now();
        queue.enqueue(selection("s1"));
        let mut job = queue.claim(now).expect("job ready");
        job.state = DeliveryState::Failed;
        queue.record(job);

        assert_eq!(queue.queued(), 0);
        assert_eq!(queue.failed().len(), 1);
    }
}
