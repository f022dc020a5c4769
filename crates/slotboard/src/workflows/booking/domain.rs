use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an event as imported from the upstream events API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

/// Identifier of a position within an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionId(pub u64);

/// Identifier of a time block within an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u64);

/// Identifier of a booking application, unique within its event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub u64);

/// Network-wide certificate id of a candidate (CID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidateId(pub u32);

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chat-platform identity used for direct-message delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatUserId(pub String);

impl fmt::Display for ChatUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Controller rating ladder. Ordering follows the network standard, so
/// eligibility checks reduce to `rating >= position minimum`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ControllerRating {
    Observer,
    Student1,
    Student2,
    Student3,
    Controller1,
    Controller2,
    Controller3,
    Instructor1,
    Instructor2,
    Instructor3,
    Supervisor,
    Administrator,
}

impl ControllerRating {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Observer => "OBS",
            Self::Student1 => "S1",
            Self::Student2 => "S2",
            Self::Student3 => "S3",
            Self::Controller1 => "C1",
            Self::Controller2 => "C2",
            Self::Controller3 => "C3",
            Self::Instructor1 => "I1",
            Self::Instructor2 => "I2",
            Self::Instructor3 => "I3",
            Self::Supervisor => "SUP",
            Self::Administrator => "ADM",
        }
    }
}

impl ControllerRating {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "OBS" => Some(Self::Observer),
            "S1" => Some(Self::Student1),
            "S2" => Some(Self::Student2),
            "S3" => Some(Self::Student3),
            "C1" => Some(Self::Controller1),
            "C2" => Some(Self::Controller2),
            "C3" => Some(Self::Controller3),
            "I1" => Some(Self::Instructor1),
            "I2" => Some(Self::Instructor2),
            "I3" => Some(Self::Instructor3),
            "SUP" => Some(Self::Supervisor),
            "ADM" => Some(Self::Administrator),
            _ => None,
        }
    }
}

impl fmt::Display for ControllerRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle of an event. Applications may only be created while `Open`;
/// `Locked` freezes further candidate-initiated applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Draft,
    Open,
    Locked,
    Closed,
}

impl EventStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Open => "open",
            Self::Locked => "locked",
            Self::Closed => "closed",
        }
    }
}

/// Lifecycle of one candidate's request for one slot.
///
/// `Pending` applications may overlap freely on both the slot and the
/// (candidate, block) axes; exclusivity starts once a selection commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Locked,
    Confirmed,
    FullConfirmed,
    Rejected,
    Cancelled,
    NoShow,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Locked => "locked",
            Self::Confirmed => "confirmed",
            Self::FullConfirmed => "full_confirmed",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        }
    }

    /// States that occupy a slot and count against the exclusivity rules.
    pub const fn is_holding(self) -> bool {
        matches!(self, Self::Locked | Self::Confirmed | Self::FullConfirmed)
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Cancelled | Self::NoShow)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Event metadata as owned by the booking engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub banner_url: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: EventStatus,
    pub block_minutes: u32,
}

/// One bookable time segment of an event. Blocks partition the event
/// window and never overlap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBlock {
    pub id: BlockId,
    pub number: u32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl TimeBlock {
    /// "Block 2: 23:00-00:00z" style label used in payloads and views.
    pub fn label(&self) -> String {
        format!(
            "Block {}: {}-{}z",
            self.number,
            self.starts_at.format("%H:%M"),
            self.ends_at.format("%H:%M")
        )
    }
}

/// A staffable position at an event: ICAO location plus designator, with
/// the minimum rating required to control it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub icao: String,
    pub designator: String,
    pub min_rating: ControllerRating,
}

impl Position {
    pub fn callsign(&self) -> String {
        format!("{}_{}", self.icao, self.designator)
    }
}

/// The unit of exclusivity: one position during one time block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Slot {
    pub position: PositionId,
    pub block: BlockId,
}

/// A member resolved through the identity collaborator, together with the
/// participation counters retained as an audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub cid: CandidateId,
    pub chat_user: ChatUserId,
    pub display_name: String,
    pub rating: ControllerRating,
    pub total_applications: u32,
    pub total_participations: u32,
    pub total_no_shows: u32,
    pub total_cancellations: u32,
}

impl Candidate {
    pub fn new(
        cid: CandidateId,
        chat_user: ChatUserId,
        display_name: impl Into<String>,
        rating: ControllerRating,
    ) -> Self {
        Self {
            cid,
            chat_user,
            display_name: display_name.into(),
            rating,
            total_applications: 0,
            total_participations: 0,
            total_no_shows: 0,
            total_cancellations: 0,
        }
    }
}

/// An admin authorized to run selection commands; receives no-show alerts
/// and is granted visibility into fallback channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminContact {
    pub chat_user: ChatUserId,
    pub display_name: String,
}

/// A candidate's request to occupy a slot. Mutated only through the state
/// machine transitions owned by the booking service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub candidate: CandidateId,
    pub slot: Slot,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Reference to the published announcement message for an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHandle {
    pub channel: String,
    pub message: String,
}
