//! Booking allocation and notification engine for ATC event position
//! slots: events are partitioned into time blocks, each (position, block)
//! slot holds exactly one controller, admins commit selections under
//! invariant re-checks, and candidates are notified through a direct
//! channel with a self-cleaning fallback path.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
