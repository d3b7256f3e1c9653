//! Runtime configuration shared by the front ends.

use std::net::SocketAddr;
use std::time::Duration;

use crate::snmp::Oid;

#[derive(Debug, Clone)]
pub struct NetconfConfig {
    pub listen: SocketAddr,
    /// A session with no inbound traffic for this long is closed.
    pub idle_timeout: Duration,
    /// Deadline for the client `<hello>`.
    pub hello_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RestconfConfig {
    pub listen: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct SnmpConfig {
    pub listen: SocketAddr,
    pub ro_communities: Vec<String>,
    pub rw_communities: Vec<String>,
    /// Root of the management subtree.
    pub mib_base: Oid,
    pub sys_name: String,
    pub max_repetitions: u32,
    /// Largest response datagram in octets.
    pub max_message_size: usize,
}

#[derive(Debug, Clone)]
pub struct MgmtConfig {
    pub netconf: NetconfConfig,
    pub restconf: RestconfConfig,
    pub snmp: SnmpConfig,
    /// Period of the operational-state simulator; `None` disables it.
    pub simulate_interval: Option<Duration>,
    pub seed: bool,
}

pub const DEFAULT_MIB_BASE: [u32; 8] = [1, 3, 6, 1, 4, 1, 53864, 5];

impl Default for MgmtConfig {
    fn default() -> Self {
        Self {
            netconf: NetconfConfig {
                listen: SocketAddr::from(([0, 0, 0, 0], 2022)),
                idle_timeout: Duration::from_secs(600),
                hello_timeout: Duration::from_secs(30),
            },
            restconf: RestconfConfig {
                listen: SocketAddr::from(([0, 0, 0, 0], 830)),
            },
            snmp: SnmpConfig {
                listen: SocketAddr::from(([0, 0, 0, 0], 161)),
                ro_communities: vec!["public".to_string()],
                rw_communities: vec!["private".to_string()],
                mib_base: Oid::new(DEFAULT_MIB_BASE.to_vec()),
                sys_name: "mgmtd".to_string(),
                max_repetitions: 64,
                max_message_size: 1472,
            },
            simulate_interval: Some(Duration::from_secs(5)),
            seed: true,
        }
    }
}
