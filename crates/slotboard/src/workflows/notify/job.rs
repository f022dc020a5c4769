use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::booking::domain::{CandidateId, ChatUserId};

/// Identifier assigned by the queue when a job is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

/// Handle of an ephemeral fallback channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelHandle(pub String);

/// Delivery target of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub user: ChatUserId,
    pub display_name: String,
}

/// The interactive affordance a payload carries, if any. Selection asks for
/// the initial confirmation; reminders carry the distinct final one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmAction {
    Confirm,
    FinalConfirm,
}

/// Closed set of notification payloads. The delivery worker dispatches on
/// the tag; each variant carries its own immutable display fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum NotificationPayload {
    Selection {
        event_name: String,
        callsign: String,
        block_label: String,
    },
    Reminder {
        event_name: String,
        callsign: String,
        icao: String,
        block_label: String,
    },
    Rejection {
        event_name: String,
    },
    NoShowAlert {
        event_name: String,
        candidate_name: String,
        cid: CandidateId,
        positions: Vec<String>,
    },
}

impl NotificationPayload {
    pub const fn kind(&self) -> JobKind {
        match self {
            Self::Selection { .. } => JobKind::Selection,
            Self::Reminder { .. } => JobKind::Reminder,
            Self::Rejection { .. } => JobKind::Rejection,
            Self::NoShowAlert { .. } => JobKind::NoShowAlert,
        }
    }

    pub const fn action(&self) -> Option<ConfirmAction> {
        match self {
            Self::Selection { .. } => Some(ConfirmAction::Confirm),
            Self::Reminder { .. } => Some(ConfirmAction::FinalConfirm),
            Self::Rejection { .. } | Self::NoShowAlert { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Selection,
    Reminder,
    Rejection,
    NoShowAlert,
}

impl JobKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Selection => "selection",
            Self::Reminder => "reminder",
            Self::Rejection => "rejection",
            Self::NoShowAlert => "no_show_alert",
        }
    }

    /// Selection and reminder jobs gate a candidate's confirmation flow and
    /// drain ahead of the batch kinds.
    pub const fn priority(self) -> JobPriority {
        match self {
            Self::Selection | Self::Reminder => JobPriority::Interactive,
            Self::Rejection | Self::NoShowAlert => JobPriority::Batch,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Interactive,
    Batch,
}

/// Delivery lifecycle of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Queued,
    DeliveredPrimary,
    DeliveredFallback,
    Failed,
}

/// A queued notification. Created inside the transaction that triggered it
/// and consumed by the delivery worker; terminal jobs are retained for the
/// admin-visible status log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationJob {
    pub id: JobId,
    pub recipient: Recipient,
    pub payload: NotificationPayload,
    pub state: DeliveryState,
    pub attempts: u32,
    pub fallback_channel: Option<ChannelHandle>,
    /// Earliest instant the worker may pick the job up again; set when a
    /// failed primary attempt is rescheduled with backoff.
    pub not_before: Option<DateTime<Utc>>,
}

impl NotificationJob {
    pub fn new(recipient: Recipient, payload: NotificationPayload) -> Self {
        Self {
            id: JobId(0),
            recipient,
            payload,
            state: DeliveryState::Queued,
            attempts: 0,
            fallback_channel: None,
            not_before: None,
        }
    }

    pub fn ready_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before.map_or(true, |at| at <= now)
    }
}
