use std::fmt::Write as _;

use serde::Serialize;

use super::domain::{ApplicationStatus, CandidateId, EventId, MessageHandle};
use super::store::EventState;

/// Occupancy of one slot as shown on the public announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Occupancy {
    Vacant { pending: usize },
    Held {
        cid: CandidateId,
        status: ApplicationStatus,
    },
}

/// One (position, block) line of the announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotLine {
    pub callsign: String,
    pub block_number: u32,
    pub block_label: String,
    pub occupancy: Occupancy,
}

/// Read-side projection of an event's allocation state. Projection and
/// rendering are pure: the same state always produces byte-identical
/// output, so repeated refreshes are safe to push verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnouncementView {
    pub event_name: String,
    pub window_label: String,
    pub banner_url: String,
    pub slots: Vec<SlotLine>,
    pub open_for_bookings: bool,
}

impl AnnouncementView {
    pub fn project(state: &EventState) -> Self {
        let event = state.event();

        let mut slots = Vec::new();
        for position in state.positions() {
            for block in state.blocks() {
                let slot = super::domain::Slot {
                    position: position.id,
                    block: block.id,
                };
                let occupancy = match state.holder_of(&slot) {
                    Some(holder) => Occupancy::Held {
                        cid: holder.candidate,
                        status: holder.status,
                    },
                    None => Occupancy::Vacant {
                        pending: state.pending_on(&slot),
                    },
                };
                slots.push(SlotLine {
                    callsign: position.callsign(),
                    block_number: block.number,
                    block_label: block.label(),
                    occupancy,
                });
            }
        }
        slots.sort_by(|a, b| {
            a.callsign
                .cmp(&b.callsign)
                .then_with(|| a.block_number.cmp(&b.block_number))
        });

        Self {
            event_name: event.name.clone(),
            window_label: format!(
                "{} {}-{}z",
                event.starts_at.format("%d/%m/%Y"),
                event.starts_at.format("%H:%M"),
                event.ends_at.format("%H:%M")
            ),
            banner_url: event.banner_url.clone(),
            slots,
            open_for_bookings: event.status == super::domain::EventStatus::Open,
        }
    }

    /// Plain-text body for the announcement surface.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "ATC BOOKINGS - {}", self.event_name);
        let _ = writeln!(out, "{}", self.window_label);
        let _ = writeln!(
            out,
            "{}",
            if self.open_for_bookings {
                "Applications are open."
            } else {
                "Applications are closed."
            }
        );
        for line in &self.slots {
            match &line.occupancy {
                Occupancy::Held { cid, status } => {
                    let _ = writeln!(
                        out,
                        "{} | {} | {} ({})",
                        line.callsign,
                        line.block_label,
                        cid,
                        status.label()
                    );
                }
                Occupancy::Vacant { pending } => {
                    let _ = writeln!(
                        out,
                        "{} | {} | vacant ({} pending)",
                        line.callsign, line.block_label, pending
                    );
                }
            }
        }
        out
    }
}

/// Failure publishing or updating the public announcement. Never rolls back
/// the state transition that triggered the refresh.
#[derive(Debug, thiserror::Error)]
pub enum AnnouncementError {
    #[error("announcement surface unavailable: {0}")]
    Surface(String),
    #[error("announcement message no longer exists")]
    MessageGone,
}

/// Outbound seam to the public announcement surface.
pub trait AnnouncementSurface: Send + Sync {
    fn publish(
        &self,
        event: EventId,
        view: &AnnouncementView,
    ) -> Result<MessageHandle, AnnouncementError>;

    fn update(
        &self,
        handle: &MessageHandle,
        view: &AnnouncementView,
    ) -> Result<(), AnnouncementError>;
}
