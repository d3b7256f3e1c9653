//! Audit trail of datastore changes.
//!
//! Every [`Event`] the datastore publishes becomes one `info!` record on the
//! `audit` tracing target.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::store::{Change, Event, ReleaseReason};

/// Render an event as a one-line audit message.
pub fn describe(event: &Event) -> String {
    match event {
        Event::LockAcquired { target, client } => format!("{} locked {}", client, target),
        Event::LockReleased { target, client, reason } => match reason {
            ReleaseReason::Unlock => format!("{} unlocked {}", client, target),
            ReleaseReason::SessionEnd => format!("{} lock on {} released at session end", client, target),
        },
        Event::CandidateEdited { client, changes } => {
            format!("{} edited candidate: {}", client, join_changes(changes))
        }
        Event::CandidateDiscarded { client } => format!("{} discarded candidate changes", client),
        Event::RunningChanged {
            version,
            origin,
            changes,
        } => format!("running v{} by {}: {}", version, origin, join_changes(changes)),
    }
}

fn join_changes(changes: &[Change]) -> String {
    changes.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(", ")
}

/// Spawn the listener that logs events until the channel closes.
pub fn start_audit_listener(mut events: broadcast::Receiver<Event>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Started audit listener");
        loop {
            match events.recv().await {
                Ok(event) => {
                    info!(target: "audit", event = event.name(), client = %event.client(), "{}", describe(&event));
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Audit listener lagged by {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        info!("Audit listener stopped");
    })
}
