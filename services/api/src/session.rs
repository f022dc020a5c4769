//! Short-lived interactive selection sessions. The booking core exposes
//! session-free entry points; this keeps the multi-step pick-blocks then
//! pick-positions flow at the service boundary, keyed by (candidate,
//! event), discarding anything the user abandons.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use slotboard::workflows::booking::{BlockId, CandidateId, EventId, PositionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionError {
    NoSession,
    Expired,
    WrongStage,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::NoSession => write!(f, "no active selection session"),
            SessionError::Expired => write!(f, "selection session expired"),
            SessionError::WrongStage => write!(f, "selection step out of order"),
        }
    }
}

impl std::error::Error for SessionError {}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionStage {
    ChoosingBlocks,
    ChoosingPositions { blocks: Vec<BlockId> },
}

#[derive(Debug, Clone)]
struct SelectionSession {
    stage: SessionStage,
    expires_at: DateTime<Utc>,
}

/// Registry of in-flight selection sessions with a sliding expiry.
pub(crate) struct SessionRegistry {
    ttl: Duration,
    inner: Mutex<HashMap<(CandidateId, EventId), SelectionSession>>,
}

impl SessionRegistry {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Starts (or restarts) a session at the block-selection step.
    pub(crate) fn begin(&self, cid: CandidateId, event: EventId, now: DateTime<Utc>) {
        let mut inner = self.inner.lock().expect("session lock poisoned");
        inner.insert(
            (cid, event),
            SelectionSession {
                stage: SessionStage::ChoosingBlocks,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Records the chosen blocks and advances to position selection.
    pub(crate) fn choose_blocks(
        &self,
        cid: CandidateId,
        event: EventId,
        blocks: Vec<BlockId>,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().expect("session lock poisoned");
        let session = Self::live_entry(&mut inner, cid, event, now)?;
        if session.stage != SessionStage::ChoosingBlocks {
            return Err(SessionError::WrongStage);
        }
        session.stage = SessionStage::ChoosingPositions { blocks };
        session.expires_at = now + self.ttl;
        Ok(())
    }

    /// Finishes the session, returning the chosen blocks. The session is
    /// consumed whether or not the subsequent application writes succeed;
    /// the flow restarts from scratch on error.
    pub(crate) fn take_selection(
        &self,
        cid: CandidateId,
        event: EventId,
        now: DateTime<Utc>,
    ) -> Result<Vec<BlockId>, SessionError> {
        let mut inner = self.inner.lock().expect("session lock poisoned");
        Self::live_entry(&mut inner, cid, event, now)?;
        match inner.remove(&(cid, event)) {
            Some(SelectionSession {
                stage: SessionStage::ChoosingPositions { blocks },
                ..
            }) => Ok(blocks),
            Some(_) => Err(SessionError::WrongStage),
            None => Err(SessionError::NoSession),
        }
    }

    /// Drops every session past its expiry; returns how many were removed.
    pub(crate) fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut inner = self.inner.lock().expect("session lock poisoned");
        let before = inner.len();
        inner.retain(|_, session| session.expires_at > now);
        before - inner.len()
    }

    fn live_entry<'a>(
        inner: &'a mut HashMap<(CandidateId, EventId), SelectionSession>,
        cid: CandidateId,
        event: EventId,
        now: DateTime<Utc>,
    ) -> Result<&'a mut SelectionSession, SessionError> {
        match inner.get(&(cid, event)) {
            None => return Err(SessionError::NoSession),
            Some(session) if session.expires_at <= now => {
                inner.remove(&(cid, event));
                return Err(SessionError::Expired);
            }
            Some(_) => {}
        }
        inner
            .get_mut(&(cid, event))
            .ok_or(SessionError::NoSession)
    }
}

/// Cross product of the session's blocks and the submitted positions, the
/// shape `create_application` consumes.
pub(crate) fn expand_selection(
    blocks: &[BlockId],
    positions: &[PositionId],
) -> Vec<(PositionId, BlockId)> {
    positions
        .iter()
        .flat_map(|position| blocks.iter().map(move |block| (*position, *block)))
        .collect()
}
