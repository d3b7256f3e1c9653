//! Derived operational statistics.
//!
//! Computed from a tree snapshot on demand, never stored. NETCONF `<get>`,
//! `GET /restconf/statistics` and the SNMP MIB all read the same values.

use serde::Serialize;
use utoipa::ToSchema;

use crate::model::{AdminState, ConfigTree, NfType, OperState, SessionState, SubscriberState};

/// Per NF-type aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub struct NfTypeStatistics {
    /// Upper-case NF type name.
    #[serde(rename = "type")]
    pub nf_type: String,
    pub instances: u64,
    pub enabled: u64,
    pub unlocked: u64,
    /// Sessions served by an NF of this type.
    pub served_sessions: u64,
}

impl NfTypeStatistics {
    /// Aggregate admin state; `None` when instances disagree or there are none.
    pub fn admin_state(&self) -> Option<AdminState> {
        if self.instances == 0 {
            None
        } else if self.unlocked == self.instances {
            Some(AdminState::Unlocked)
        } else if self.unlocked == 0 {
            Some(AdminState::Locked)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub struct CoreStatistics {
    pub running_version: u64,
    pub network_functions: u64,
    pub subscribers: u64,
    pub registered_subscribers: u64,
    pub sessions: u64,
    pub active_sessions: u64,
    pub qos_profiles: u64,
    /// One entry per NF type, in ordinal order.
    pub nf_types: Vec<NfTypeStatistics>,
}

impl CoreStatistics {
    pub fn derive(tree: &ConfigTree, running_version: u64) -> Self {
        let nf_types = NfType::ALL
            .iter()
            .map(|&nf_type| {
                let nfs: Vec<_> = tree.list_network_functions_by_type(nf_type).collect();
                let served_sessions = tree
                    .sessions
                    .values()
                    .filter(|s| nfs.iter().any(|nf| nf.id == s.serving_nf))
                    .count();
                NfTypeStatistics {
                    nf_type: nf_type.to_string(),
                    instances: nfs.len() as u64,
                    enabled: nfs.iter().filter(|nf| nf.oper_state == OperState::Enabled).count() as u64,
                    unlocked: nfs.iter().filter(|nf| nf.admin_state == AdminState::Unlocked).count() as u64,
                    served_sessions: served_sessions as u64,
                }
            })
            .collect();

        Self {
            running_version,
            network_functions: tree.list_network_functions().count() as u64,
            subscribers: tree.subscribers.len() as u64,
            registered_subscribers: tree
                .subscribers
                .values()
                .filter(|s| s.state == SubscriberState::Registered)
                .count() as u64,
            sessions: tree.sessions.len() as u64,
            active_sessions: tree
                .sessions
                .values()
                .filter(|s| s.state == SessionState::Active)
                .count() as u64,
            qos_profiles: tree.qos_profiles.len() as u64,
            nf_types,
        }
    }

    pub fn nf_type(&self, nf_type: NfType) -> Option<&NfTypeStatistics> {
        self.nf_types.get(nf_type.ordinal() as usize - 1)
    }
}
