//! Managed entities of the simulated 5G core.
//!
//! All entities serialize with kebab-case keys; the same JSON form is used by
//! RESTCONF bodies, the NETCONF XML mapping and the datastore edit engine.

mod lenient;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Network functions
// =============================================================================

/// Network function type. Each type is its own collection inside
/// `network-functions`, so ids only need to be unique per type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NfType {
    Amf,
    Smf,
    Upf,
    Ausf,
    Udm,
    Pcf,
    Nrf,
    Nssf,
}

impl NfType {
    pub const ALL: [NfType; 8] = [
        NfType::Amf,
        NfType::Smf,
        NfType::Upf,
        NfType::Ausf,
        NfType::Udm,
        NfType::Pcf,
        NfType::Nrf,
        NfType::Nssf,
    ];

    /// Lowercase name used as path segment and collection key.
    pub fn segment(&self) -> &'static str {
        match self {
            NfType::Amf => "amf",
            NfType::Smf => "smf",
            NfType::Upf => "upf",
            NfType::Ausf => "ausf",
            NfType::Udm => "udm",
            NfType::Pcf => "pcf",
            NfType::Nrf => "nrf",
            NfType::Nssf => "nssf",
        }
    }

    /// Stable 1-based ordinal, used as SNMP table index.
    pub fn ordinal(&self) -> u32 {
        match self {
            NfType::Amf => 1,
            NfType::Smf => 2,
            NfType::Upf => 3,
            NfType::Ausf => 4,
            NfType::Udm => 5,
            NfType::Pcf => 6,
            NfType::Nrf => 7,
            NfType::Nssf => 8,
        }
    }

    pub fn from_ordinal(ordinal: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.ordinal() == ordinal)
    }
}

impl fmt::Display for NfType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segment().to_ascii_uppercase())
    }
}

impl FromStr for NfType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.segment().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown network function type '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminState {
    Locked,
    #[default]
    Unlocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperState {
    Enabled,
    #[default]
    Disabled,
}

/// A network function instance (AMF, SMF, UPF, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkFunction {
    pub id: String,
    #[serde(rename = "type")]
    pub nf_type: NfType,
    #[serde(default)]
    pub admin_state: AdminState,
    #[serde(default)]
    pub oper_state: OperState,
    /// Opaque, NF-specific configuration blob.
    #[serde(default = "empty_object")]
    pub configuration: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

// =============================================================================
// Subscribers
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberState {
    Registered,
    #[default]
    Deregistered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SubscriberProfile {
    /// QoS class, a reference to a QoS profile id.
    pub qos_profile_id: String,
    /// S-NSSAI identifiers the subscriber may use.
    #[serde(default, deserialize_with = "lenient::one_or_many")]
    pub allowed_slices: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Subscriber {
    pub imsi: String,
    pub profile: SubscriberProfile,
    #[serde(default)]
    pub state: SubscriberState,
}

// =============================================================================
// Sessions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Establishing,
    Active,
    Releasing,
    Released,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Session {
    pub session_id: String,
    pub subscriber_imsi: String,
    /// Id of the serving network function (any type).
    pub serving_nf: String,
    pub qos_profile_id: String,
    #[serde(default)]
    pub state: SessionState,
}

// =============================================================================
// QoS profiles
// =============================================================================

/// Bitrate bounds in kbit/s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BitrateBounds {
    #[serde(default, deserialize_with = "lenient::number")]
    pub guaranteed_uplink: u64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub guaranteed_downlink: u64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub max_uplink: u64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub max_downlink: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct QosProfile {
    pub id: String,
    #[serde(deserialize_with = "lenient::number")]
    pub five_qi: u8,
    #[serde(default)]
    pub bitrate: BitrateBounds,
    #[serde(deserialize_with = "lenient::number")]
    pub priority: u8,
}

// =============================================================================
// Configuration tree
// =============================================================================

/// One complete configuration tree (running or candidate).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConfigTree {
    pub network_functions: BTreeMap<NfType, BTreeMap<String, NetworkFunction>>,
    pub subscribers: BTreeMap<String, Subscriber>,
    pub sessions: BTreeMap<String, Session>,
    pub qos_profiles: BTreeMap<String, QosProfile>,
}

impl ConfigTree {
    pub fn get_network_function(&self, nf_type: NfType, id: &str) -> Option<&NetworkFunction> {
        self.network_functions.get(&nf_type).and_then(|m| m.get(id))
    }

    /// Find a network function by id across all type collections.
    pub fn find_network_function(&self, id: &str) -> Option<&NetworkFunction> {
        self.network_functions.values().find_map(|m| m.get(id))
    }

    pub fn list_network_functions(&self) -> impl Iterator<Item = &NetworkFunction> {
        self.network_functions.values().flat_map(|m| m.values())
    }

    pub fn list_network_functions_by_type(
        &self,
        nf_type: NfType,
    ) -> impl Iterator<Item = &NetworkFunction> {
        self.network_functions
            .get(&nf_type)
            .into_iter()
            .flat_map(|m| m.values())
    }

    /// Sessions referencing the given subscriber.
    pub fn sessions_for_subscriber<'a>(&'a self, imsi: &'a str) -> impl Iterator<Item = &'a Session> {
        self.sessions
            .values()
            .filter(move |s| s.subscriber_imsi == imsi)
    }
}
