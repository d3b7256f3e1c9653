//! In-memory datastore holding the running and candidate trees.
//!
//! Both trees are published as immutable snapshots through [`ArcSwap`]:
//! readers load the current `Arc` and never wait on writers. Every mutation
//! (edit, commit, direct write, lock change) runs under one short-held mutex,
//! builds a fresh tree off to the side and swaps it in only on success.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::model::ConfigTree;

use super::error::{Result, StoreError};
use super::event::{ChangeOrigin, Event, ReleaseReason};
use super::path::DataPath;
use super::traits::{ConfigEditor, DataStore, EditOutcome, LockManager, TreeReader, TreeSnapshot};
use super::tree::{EditOperation, apply_batch, diff, render, validate_tree};
use super::{ClientId, Target};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct WriteState {
    candidate_lock: Option<ClientId>,
    running_lock: Option<ClientId>,
    /// Candidate holds edits not yet committed or discarded.
    candidate_dirty: bool,
}

impl WriteState {
    fn lock_slot(&mut self, target: Target) -> &mut Option<ClientId> {
        match target {
            Target::Running => &mut self.running_lock,
            Target::Candidate => &mut self.candidate_lock,
        }
    }

    /// Writes to running are refused while someone else holds its lock.
    fn check_running(&self, client: &ClientId) -> Result<()> {
        match &self.running_lock {
            Some(holder) if holder != client => Err(StoreError::AlreadyLocked { holder: holder.clone() }),
            _ => Ok(()),
        }
    }

    fn check_candidate(&self, client: &ClientId) -> Result<()> {
        match &self.candidate_lock {
            Some(holder) if holder == client => Ok(()),
            _ => Err(StoreError::NoCandidateLock(client.clone())),
        }
    }
}

/// The single shared datastore instance.
pub struct Datastore {
    running: ArcSwap<TreeSnapshot>,
    candidate: ArcSwap<TreeSnapshot>,
    write: Mutex<WriteState>,
    events: broadcast::Sender<Event>,
    stopped: AtomicBool,
}

impl Datastore {
    /// Create a datastore whose running tree starts as `seed` at version 1.
    pub fn new(seed: ConfigTree) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let initial = Arc::new(TreeSnapshot {
            version: 1,
            updated_at: Utc::now().to_rfc3339(),
            tree: seed,
        });
        Self {
            running: ArcSwap::new(initial.clone()),
            candidate: ArcSwap::new(initial),
            write: Mutex::new(WriteState::default()),
            events,
            stopped: AtomicBool::new(false),
        }
    }

    /// Refuse all further writes. Reads keep working.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            info!("Datastore stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_stopped() {
            return Err(StoreError::Unavailable);
        }
        Ok(())
    }

    fn state(&self) -> MutexGuard<'_, WriteState> {
        self.write.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tree(&self, target: Target) -> &ArcSwap<TreeSnapshot> {
        match target {
            Target::Running => &self.running,
            Target::Candidate => &self.candidate,
        }
    }

    fn publish(&self, event: Event) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Apply a batch to running. `derive` sees the tree the batch will be
    /// applied to, under the write mutex.
    fn write_running<F>(&self, client: &ClientId, derive: F) -> Result<EditOutcome>
    where
        F: FnOnce(&ConfigTree) -> Vec<EditOperation>,
    {
        self.ensure_running()?;
        let mut state = self.state();
        let current = self.running.load_full();
        let ops = derive(&current.tree);
        if ops.is_empty() {
            return Ok(EditOutcome {
                version: current.version,
                changes: Vec::new(),
            });
        }
        state.check_running(client)?;

        let (tree, changes) = apply_batch(&current.tree, &ops)?;
        if changes.is_empty() {
            return Ok(EditOutcome {
                version: current.version,
                changes,
            });
        }

        let version = current.version + 1;
        self.running.store(Arc::new(TreeSnapshot {
            version,
            updated_at: Utc::now().to_rfc3339(),
            tree,
        }));
        // An untouched candidate follows running; a dirty one keeps its base
        // version so its commit is refused.
        if !state.candidate_dirty {
            self.reset_candidate(&mut state);
        }
        debug!(%client, version, changes = changes.len(), "Running changed");
        self.publish(Event::RunningChanged {
            version,
            origin: ChangeOrigin::Direct(client.clone()),
            changes: changes.clone(),
        });
        Ok(EditOutcome { version, changes })
    }

    /// Point the candidate back at running. Returns whether edits were dropped.
    fn reset_candidate(&self, state: &mut WriteState) -> bool {
        self.candidate.store(self.running.load_full());
        std::mem::take(&mut state.candidate_dirty)
    }

    fn release(&self, state: &mut WriteState, target: Target, client: &ClientId, reason: ReleaseReason) {
        *state.lock_slot(target) = None;
        if target == Target::Candidate && self.reset_candidate(state) {
            self.publish(Event::CandidateDiscarded { client: client.clone() });
        }
        debug!(%target, %client, ?reason, "Lock released");
        self.publish(Event::LockReleased {
            target,
            client: client.clone(),
            reason,
        });
    }
}

impl TreeReader for Datastore {
    fn read(&self, target: Target, path: &DataPath) -> Result<Value> {
        let snapshot = self.tree(target).load();
        render(&snapshot.tree, path)
    }

    fn snapshot(&self, target: Target) -> Arc<TreeSnapshot> {
        self.tree(target).load_full()
    }
}

impl LockManager for Datastore {
    fn lock(&self, target: Target, client: &ClientId) -> Result<()> {
        self.ensure_running()?;
        let mut state = self.state();
        if let Some(holder) = state.lock_slot(target) {
            return Err(StoreError::AlreadyLocked { holder: holder.clone() });
        }
        *state.lock_slot(target) = Some(client.clone());
        if target == Target::Candidate {
            self.reset_candidate(&mut state);
        }
        debug!(%target, %client, "Lock acquired");
        self.publish(Event::LockAcquired {
            target,
            client: client.clone(),
        });
        Ok(())
    }

    fn unlock(&self, target: Target, client: &ClientId) -> Result<()> {
        let mut state = self.state();
        if state.lock_slot(target).as_ref() != Some(client) {
            return Err(StoreError::NoCandidateLock(client.clone()));
        }
        self.release(&mut state, target, client, ReleaseReason::Unlock);
        Ok(())
    }

    fn lock_owner(&self, target: Target) -> Option<ClientId> {
        self.state().lock_slot(target).clone()
    }

    fn release_client(&self, client: &ClientId) {
        let mut state = self.state();
        for target in [Target::Candidate, Target::Running] {
            if state.lock_slot(target).as_ref() == Some(client) {
                self.release(&mut state, target, client, ReleaseReason::SessionEnd);
            }
        }
    }
}

impl ConfigEditor for Datastore {
    fn edit_config(&self, target: Target, client: &ClientId, ops: Vec<EditOperation>) -> Result<EditOutcome> {
        if target == Target::Running {
            return self.apply_direct(client, ops);
        }
        self.ensure_running()?;
        let mut state = self.state();
        state.check_candidate(client)?;

        let current = self.candidate.load_full();
        let (tree, changes) = apply_batch(&current.tree, &ops)?;
        if changes.is_empty() {
            return Ok(EditOutcome {
                version: current.version,
                changes,
            });
        }

        self.candidate.store(Arc::new(TreeSnapshot {
            version: current.version,
            updated_at: Utc::now().to_rfc3339(),
            tree,
        }));
        state.candidate_dirty = true;
        debug!(%client, changes = changes.len(), "Candidate edited");
        self.publish(Event::CandidateEdited {
            client: client.clone(),
            changes: changes.clone(),
        });
        Ok(EditOutcome {
            version: current.version,
            changes,
        })
    }

    fn test_edit(&self, target: Target, client: &ClientId, ops: &[EditOperation]) -> Result<EditOutcome> {
        self.ensure_running()?;
        let state = self.state();
        match target {
            Target::Running => state.check_running(client)?,
            Target::Candidate => state.check_candidate(client)?,
        }
        drop(state);

        let current = self.tree(target).load();
        let (_, changes) = apply_batch(&current.tree, ops)?;
        Ok(EditOutcome {
            version: current.version,
            changes,
        })
    }

    fn commit(&self, client: &ClientId) -> Result<u64> {
        self.ensure_running()?;
        let mut state = self.state();
        state.check_candidate(client)?;
        state.check_running(client)?;

        let running = self.running.load_full();
        let candidate = self.candidate.load_full();
        if candidate.version != running.version {
            return Err(StoreError::CommitConflict {
                base: candidate.version,
                running: running.version,
            });
        }
        validate_tree(&candidate.tree)?;

        let changes = diff(&running.tree, &candidate.tree);
        if changes.is_empty() {
            self.reset_candidate(&mut state);
            return Ok(running.version);
        }

        let version = running.version + 1;
        let published = Arc::new(TreeSnapshot {
            version,
            updated_at: Utc::now().to_rfc3339(),
            tree: candidate.tree.clone(),
        });
        self.running.store(published);
        self.reset_candidate(&mut state);
        info!(%client, version, changes = changes.len(), "Candidate committed");
        self.publish(Event::RunningChanged {
            version,
            origin: ChangeOrigin::Commit(client.clone()),
            changes,
        });
        Ok(version)
    }

    fn discard_changes(&self, client: &ClientId) -> Result<()> {
        let mut state = self.state();
        state.check_candidate(client)?;
        if self.reset_candidate(&mut state) {
            self.publish(Event::CandidateDiscarded { client: client.clone() });
        }
        Ok(())
    }

    fn apply_direct(&self, client: &ClientId, ops: Vec<EditOperation>) -> Result<EditOutcome> {
        self.write_running(client, |_| ops)
    }

    fn apply_direct_with(
        &self,
        client: &ClientId,
        derive: &dyn Fn(&ConfigTree) -> Vec<EditOperation>,
    ) -> Result<EditOutcome> {
        self.write_running(client, |tree| derive(tree))
    }

    fn validate(&self, target: Target) -> Result<()> {
        validate_tree(&self.tree(target).load().tree)
    }
}

impl DataStore for Datastore {
    fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }
}
