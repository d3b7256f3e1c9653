//! DataStore trait definitions.
//!
//! Front ends hold an `Arc<dyn DataStore>` and only ever receive copies of
//! tree content; they never reference the trees themselves.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::model::ConfigTree;

use super::error::Result;
use super::event::Event;
use super::path::DataPath;
use super::tree::{Change, EditOperation};
use super::{ClientId, Target};

/// Immutable view of one tree at one version.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeSnapshot {
    /// Running version; for the candidate, the running version it is based on.
    pub version: u64,
    /// RFC 3339 timestamp of the last change.
    pub updated_at: String,
    pub tree: ConfigTree,
}

/// Result of a successful edit batch.
#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome {
    /// Version of the edited tree after the batch.
    pub version: u64,
    pub changes: Vec<Change>,
}

// =============================================================================
// Domain Store Traits
// =============================================================================

/// Read access. Never blocks writers or other readers.
pub trait TreeReader: Send + Sync {
    /// Deep copy of the subtree at `path`, collection-wrapped.
    fn read(&self, target: Target, path: &DataPath) -> Result<Value>;

    /// Current snapshot of a whole tree.
    fn snapshot(&self, target: Target) -> Arc<TreeSnapshot>;
}

/// Logical (advisory) locks held by clients.
pub trait LockManager: Send + Sync {
    /// Grant `client` exclusive write access to `target`.
    fn lock(&self, target: Target, client: &ClientId) -> Result<()>;

    /// Release a lock held by `client`. Unlocking the candidate discards
    /// uncommitted changes.
    fn unlock(&self, target: Target, client: &ClientId) -> Result<()>;

    /// Current holder of the lock on `target`.
    fn lock_owner(&self, target: Target) -> Option<ClientId>;

    /// Release everything held by a departing client and discard its
    /// candidate edits. Idempotent.
    fn release_client(&self, client: &ClientId);
}

/// Transactional writes.
pub trait ConfigEditor: Send + Sync {
    /// Apply `ops` atomically to `target`. Against the candidate the caller
    /// must hold the candidate lock; against running this is `apply_direct`.
    fn edit_config(&self, target: Target, client: &ClientId, ops: Vec<EditOperation>) -> Result<EditOutcome>;

    /// Validate `ops` against `target` without applying them.
    fn test_edit(&self, target: Target, client: &ClientId, ops: &[EditOperation]) -> Result<EditOutcome>;

    /// Replace running with the candidate.
    fn commit(&self, client: &ClientId) -> Result<u64>;

    /// Reset the candidate to a copy of running.
    fn discard_changes(&self, client: &ClientId) -> Result<()>;

    /// Single-step write against running, serialized with commits.
    fn apply_direct(&self, client: &ClientId, ops: Vec<EditOperation>) -> Result<EditOutcome>;

    /// Direct write whose batch is computed from the running tree as it is
    /// inside the write section. Background writers use this so their edits
    /// never act on an entry removed since they last looked.
    fn apply_direct_with(
        &self,
        client: &ClientId,
        derive: &dyn Fn(&ConfigTree) -> Vec<EditOperation>,
    ) -> Result<EditOutcome>;

    /// Re-check all constraints of a whole tree.
    fn validate(&self, target: Target) -> Result<()>;
}

// =============================================================================
// Composite DataStore Trait
// =============================================================================

/// Composite data store trait combining reads, locks and edits.
///
/// This is the handle every front end receives at startup.
pub trait DataStore: TreeReader + LockManager + ConfigEditor + Send + Sync {
    /// Subscribe to state change events.
    fn subscribe(&self) -> broadcast::Receiver<Event>;
}
