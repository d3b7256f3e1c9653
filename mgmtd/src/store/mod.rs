//! The shared datastore: running and candidate trees, locks, and the edit
//! engine behind every protocol front end.

mod error;
mod event;
mod memory;
mod path;
mod traits;
mod tree;

use std::fmt;
use std::net::SocketAddr;

pub use error::{ErrorKind, Result, StoreError};
pub use event::{ChangeOrigin, Event, ReleaseReason};
pub use memory::Datastore;
pub use path::{Collection, DataPath, EntryKey};
pub use traits::{ConfigEditor, DataStore, EditOutcome, LockManager, TreeReader, TreeSnapshot};
pub use tree::{Change, ChangeKind, EditOp, EditOperation, Entity};

/// Which configuration tree an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Running,
    Candidate,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Target::Running => "running",
            Target::Candidate => "candidate",
        })
    }
}

/// Identity of a datastore client (one NETCONF session, one protocol agent).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(String);

const NETCONF_PREFIX: &str = "netconf-";

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn netconf(session_id: u32) -> Self {
        Self(format!("{}{}", NETCONF_PREFIX, session_id))
    }

    pub fn restconf() -> Self {
        Self("restconf".to_string())
    }

    pub fn snmp(peer: SocketAddr) -> Self {
        Self(format!("snmp-{}", peer))
    }

    pub fn simulator() -> Self {
        Self("simulator".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// NETCONF session id, if this client is a NETCONF session.
    pub fn netconf_session_id(&self) -> Option<u32> {
        self.0.strip_prefix(NETCONF_PREFIX)?.parse().ok()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_netconf_client_session_id() {
        assert_eq!(ClientId::netconf(7).netconf_session_id(), Some(7));
        assert_eq!(ClientId::restconf().netconf_session_id(), None);
        assert_eq!(ClientId::new("netconf-x").netconf_session_id(), None);
    }
}
