//! Events emitted by datastore changes.

use std::fmt;

use super::tree::Change;
use super::{ClientId, Target};

/// How a running-tree change came about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// A NETCONF commit of the candidate.
    Commit(ClientId),
    /// A single-step write (RESTCONF, SNMP SET, simulator, edit-config on running).
    Direct(ClientId),
}

impl ChangeOrigin {
    pub fn client(&self) -> &ClientId {
        match self {
            ChangeOrigin::Commit(c) | ChangeOrigin::Direct(c) => c,
        }
    }
}

impl fmt::Display for ChangeOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeOrigin::Commit(c) => write!(f, "commit by {}", c),
            ChangeOrigin::Direct(c) => write!(f, "direct write by {}", c),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReason {
    Unlock,
    /// Session closed, dropped or killed while holding the lock.
    SessionEnd,
}

/// Events emitted when datastore state changes.
///
/// Dispatched via a broadcast channel; the audit listener is the main consumer.
#[derive(Debug, Clone)]
pub enum Event {
    /// A client acquired a lock.
    LockAcquired { target: Target, client: ClientId },
    /// A lock was released.
    LockReleased {
        target: Target,
        client: ClientId,
        reason: ReleaseReason,
    },
    /// The candidate was modified.
    CandidateEdited { client: ClientId, changes: Vec<Change> },
    /// Uncommitted candidate edits were thrown away.
    CandidateDiscarded { client: ClientId },
    /// The running tree moved to a new version.
    RunningChanged {
        version: u64,
        origin: ChangeOrigin,
        changes: Vec<Change>,
    },
}

impl Event {
    /// Get the client responsible for this event.
    pub fn client(&self) -> &ClientId {
        match self {
            Event::LockAcquired { client, .. }
            | Event::LockReleased { client, .. }
            | Event::CandidateEdited { client, .. }
            | Event::CandidateDiscarded { client } => client,
            Event::RunningChanged { origin, .. } => origin.client(),
        }
    }

    /// Short event name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Event::LockAcquired { .. } => "lock_acquired",
            Event::LockReleased { .. } => "lock_released",
            Event::CandidateEdited { .. } => "candidate_edited",
            Event::CandidateDiscarded { .. } => "candidate_discarded",
            Event::RunningChanged { .. } => "running_changed",
        }
    }
}
