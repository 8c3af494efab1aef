//! Per-participant session context
//!
//! Everything the page flow needs to know about a participant between
//! requests lives in [`RecipientSession`]. Sessions are held in memory
//! only; allocation rows are the durable record.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::{FlowError, Result};
use crate::flow::Page;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipientSession {
    /// Participant id entered at consent (trimmed)
    pub participant_id: String,

    /// Page the participant is currently on
    pub page: Page,

    /// Failed comprehension submissions so far
    pub quiz_attempts: u32,

    /// Set once the quiz attempts are used up
    pub excluded: bool,

    /// Participant id matched an automated-respondent sentinel
    pub automated: bool,

    /// Participant already held allocations when they consented
    pub returning: bool,

    /// Pool could not cover the full target count
    pub assignment_exhausted: bool,
}

impl RecipientSession {
    pub fn new(participant_id: impl Into<String>) -> Self {
        Self {
            participant_id: participant_id.into(),
            page: Page::Consent,
            quiz_attempts: 0,
            excluded: false,
            automated: false,
            returning: false,
            assignment_exhausted: false,
        }
    }
}

/// Open session and when it lapses
#[derive(Debug)]
struct OpenSession {
    session: RecipientSession,
    expires_at: Instant,
}

impl OpenSession {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Open sessions keyed by the id handed to the client
///
/// Sessions that never reach a terminal page lapse after the configured
/// TTL; lapsed ids answer like unknown ones and are swept on insert.
#[derive(Debug)]
pub struct SessionStore {
    sessions: HashMap<Uuid, OpenSession>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            ttl,
        }
    }

    pub fn insert(&mut self, session: RecipientSession) -> Uuid {
        self.sweep();

        let id = Uuid::new_v4();
        debug!(session_id = %id, participant = %session.participant_id, "Session opened");
        self.sessions.insert(
            id,
            OpenSession {
                session,
                expires_at: Instant::now() + self.ttl,
            },
        );
        id
    }

    pub fn get(&self, id: &Uuid) -> Result<&RecipientSession> {
        match self.sessions.get(id) {
            Some(open) if !open.is_expired(Instant::now()) => Ok(&open.session),
            _ => Err(FlowError::UnknownSession(id.to_string())),
        }
    }

    pub fn get_mut(&mut self, id: &Uuid) -> Result<&mut RecipientSession> {
        self.evict_if_expired(id);
        self.sessions
            .get_mut(id)
            .map(|open| &mut open.session)
            .ok_or_else(|| FlowError::UnknownSession(id.to_string()))
    }

    /// Store an updated copy of a session that is still open
    pub fn replace(&mut self, id: &Uuid, session: RecipientSession) -> Result<()> {
        let slot = self.get_mut(id)?;
        *slot = session;
        Ok(())
    }

    /// Drop a session once its flow has finished
    pub fn close(&mut self, id: &Uuid) -> Option<RecipientSession> {
        let closed = self.sessions.remove(id).map(|open| open.session);
        if closed.is_some() {
            debug!(session_id = %id, "Session closed");
        }
        closed
    }

    /// Remove every lapsed session, returning how many went
    pub fn sweep(&mut self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, open| !open.is_expired(now));
        let removed = before - self.sessions.len();
        if removed > 0 {
            debug!(removed, "Expired sessions swept");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn evict_if_expired(&mut self, id: &Uuid) {
        let expired = self
            .sessions
            .get(id)
            .map_or(false, |open| open.is_expired(Instant::now()));
        if expired {
            self.sessions.remove(id);
            debug!(session_id = %id, "Session expired");
        }
    }
}
