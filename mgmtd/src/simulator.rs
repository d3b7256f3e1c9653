//! Operational-state simulator.
//!
//! Stands in for the network functions themselves: on every tick it moves
//! NF oper-state towards admin-state and advances session lifecycles, all
//! through one `apply_direct` batch.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::model::{AdminState, ConfigTree, OperState, SessionState};
use crate::store::{ClientId, DataStore, EditOp, EditOperation, EntryKey, Result};

/// Edits that bring `tree` one step closer to its steady state.
pub fn pending_transitions(tree: &ConfigTree) -> Vec<EditOperation> {
    let mut ops = Vec::new();

    for nf in tree.list_network_functions() {
        let wanted = match nf.admin_state {
            AdminState::Unlocked => OperState::Enabled,
            AdminState::Locked => OperState::Disabled,
        };
        if nf.oper_state != wanted {
            ops.push(EditOperation::new(
                EntryKey::NetworkFunction(nf.nf_type, nf.id.clone()),
                EditOp::Merge,
                Some(json!({ "oper-state": wanted })),
            ));
        }
    }

    for session in tree.sessions.values() {
        let next = match session.state {
            SessionState::Establishing => SessionState::Active,
            SessionState::Releasing => SessionState::Released,
            SessionState::Active | SessionState::Released => continue,
        };
        ops.push(EditOperation::new(
            EntryKey::Session(session.session_id.clone()),
            EditOp::Merge,
            Some(json!({ "state": next })),
        ));
    }

    ops
}

/// Run one simulation step. Returns the number of entries changed.
///
/// Transitions are computed from running inside the datastore's write
/// section, so an entry deleted concurrently is never recreated.
pub fn tick(store: &dyn DataStore) -> Result<usize> {
    let outcome = store.apply_direct_with(&ClientId::simulator(), &pending_transitions)?;
    Ok(outcome.changes.len())
}

pub fn start_simulator(
    store: Arc<dyn DataStore>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Simulator running every {:?}", period);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => match tick(store.as_ref()) {
                    Ok(0) => {}
                    Ok(n) => debug!(changes = n, "Simulator tick applied"),
                    // Running is locked by someone else; retry next tick.
                    Err(e) => warn!("Simulator tick skipped: {}", e),
                },
                _ = shutdown.changed() => break,
            }
        }
        info!("Simulator stopped");
    })
}
