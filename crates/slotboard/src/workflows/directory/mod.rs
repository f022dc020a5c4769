//! Seams to the external collaborators: the upstream events API, the
//! identity-resolution lookup, and the position-template seed file. The
//! booking core only ever sees the typed results.

use std::io::Read;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::workflows::booking::domain::{
    BlockId, CandidateId, ChatUserId, ControllerRating, Event, EventId, EventStatus, TimeBlock,
};

/// Read-only event metadata as served by the upstream events API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedEvent {
    pub id: EventId,
    pub name: String,
    pub banner_url: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("event {0} not found upstream")]
    EventNotFound(u64),
    #[error("events api unavailable: {0}")]
    Unavailable(String),
}

/// Upstream events API.
pub trait EventDirectory: Send + Sync {
    fn fetch_event(&self, id: EventId) -> Result<ImportedEvent, DirectoryError>;
}

/// A chat identity resolved to its network member record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedIdentity {
    pub cid: CandidateId,
    pub display_name: String,
    pub rating: ControllerRating,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("no linked network account for chat user {0}")]
    UnlinkedAccount(ChatUserId),
    #[error("identity service unavailable: {0}")]
    Unavailable(String),
}

/// Identity-resolution lookup (chat identity -> CID + rating).
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, user: &ChatUserId) -> Result<LinkedIdentity, IdentityError>;
}

/// Partitions an event window into consecutive blocks of `block_minutes`.
/// A trailing remainder shorter than one block is dropped.
pub fn generate_blocks(
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    block_minutes: u32,
) -> Vec<TimeBlock> {
    if block_minutes == 0 || ends_at <= starts_at {
        return Vec::new();
    }
    let total_minutes = (ends_at - starts_at).num_minutes().max(0) as u32;
    let count = total_minutes / block_minutes;

    (0..count)
        .map(|index| {
            let block_start = starts_at + Duration::minutes((index * block_minutes) as i64);
            TimeBlock {
                id: BlockId((index + 1) as u64),
                number: index + 1,
                starts_at: block_start,
                ends_at: block_start + Duration::minutes(block_minutes as i64),
            }
        })
        .collect()
}

/// Fetches an event from the directory and prepares it for registration as
/// a draft, with its window partitioned into blocks.
pub fn import_event(
    directory: &impl EventDirectory,
    id: EventId,
    block_minutes: u32,
) -> Result<(Event, Vec<TimeBlock>), DirectoryError> {
    let imported = directory.fetch_event(id)?;
    let blocks = generate_blocks(imported.starts_at, imported.ends_at, block_minutes);
    let event = Event {
        id: imported.id,
        name: imported.name,
        banner_url: imported.banner_url,
        starts_at: imported.starts_at,
        ends_at: imported.ends_at,
        status: EventStatus::Draft,
        block_minutes,
    };
    Ok((event, blocks))
}

/// A reusable position template (`TWR`, `APP`, ...) seeded from file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionSeed {
    pub designator: String,
    pub min_rating: ControllerRating,
    pub description: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("seed file unreadable: {0}")]
    Csv(#[from] csv::Error),
    #[error("unknown rating '{0}' in seed file")]
    UnknownRating(String),
}

#[derive(Debug, Deserialize)]
struct SeedRow {
    name: String,
    min_rating: String,
    #[serde(default)]
    description: String,
}

/// Loads position templates from a `name,min_rating,description` CSV.
pub fn load_position_seeds<R: Read>(reader: R) -> Result<Vec<PositionSeed>, SeedError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut seeds = Vec::new();
    for record in csv_reader.deserialize::<SeedRow>() {
        let row = record?;
        let min_rating = ControllerRating::from_label(&row.min_rating)
            .ok_or_else(|| SeedError::UnknownRating(row.min_rating.clone()))?;
        seeds.push(PositionSeed {
            designator: row.name.to_ascii_uppercase(),
            min_rating,
            description: row.description,
        });
    }
    Ok(seeds)
}
