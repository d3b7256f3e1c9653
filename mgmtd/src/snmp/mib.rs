//! The MIB view: a point-in-time map of every OID the agent answers for.
//!
//! Layout under the configured base:
//!
//! ```text
//! base.1.{1..7}.0          summary scalars
//! base.2.1.{col}.{type}    NF-type table, indexed by NF-type ordinal
//!     col 1 name, 2 instances, 3 enabled, 4 unlocked,
//!     5 admin-state (read-write: 1 locked, 2 unlocked, 3 mixed), 6 served sessions
//! ```

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::metrics::CoreStatistics;
use crate::model::{AdminState, NfType};

use super::oid::Oid;
use super::pdu::{ErrorStatus, Value};

const SYSTEM: [u32; 7] = [1, 3, 6, 1, 2, 1, 1];
const SYS_DESCR: u32 = 1;
const SYS_OBJECT_ID: u32 = 2;
const SYS_UPTIME: u32 = 3;
const SYS_NAME: u32 = 5;

const SUMMARY: u32 = 1;
const NF_TYPE_TABLE: [u32; 2] = [2, 1];
const COL_ADMIN_STATE: u32 = 5;

const ADMIN_LOCKED: i64 = 1;
const ADMIN_UNLOCKED: i64 = 2;
const ADMIN_MIXED: i64 = 3;

fn gauge(n: u64) -> Value {
    Value::Gauge32(u32::try_from(n).unwrap_or(u32::MAX))
}

/// Snapshot of all managed objects, in walk order.
#[derive(Debug, Clone)]
pub struct MibView {
    base: Oid,
    objects: BTreeMap<Oid, Value>,
}

impl MibView {
    pub fn build(base: &Oid, sys_name: &str, uptime_ticks: u32, stats: &CoreStatistics) -> Self {
        let mut objects = BTreeMap::new();

        let system = Oid::new(SYSTEM.to_vec());
        objects.insert(
            system.child(&[SYS_DESCR, 0]),
            Value::string(concat!("mgmtd ", env!("CARGO_PKG_VERSION"), " 5G core management agent")),
        );
        objects.insert(system.child(&[SYS_OBJECT_ID, 0]), Value::ObjectId(base.clone()));
        objects.insert(system.child(&[SYS_UPTIME, 0]), Value::TimeTicks(uptime_ticks));
        objects.insert(system.child(&[SYS_NAME, 0]), Value::string(sys_name));

        let summary = [
            gauge(stats.network_functions),
            gauge(stats.subscribers),
            gauge(stats.registered_subscribers),
            gauge(stats.sessions),
            gauge(stats.active_sessions),
            gauge(stats.qos_profiles),
            Value::Counter32(stats.running_version as u32),
        ];
        for (i, value) in summary.into_iter().enumerate() {
            objects.insert(base.child(&[SUMMARY, i as u32 + 1, 0]), value);
        }

        let table = base.child(&NF_TYPE_TABLE);
        for nf_type in NfType::ALL {
            let Some(row) = stats.nf_type(nf_type) else {
                continue;
            };
            let admin = match row.admin_state() {
                Some(AdminState::Locked) => ADMIN_LOCKED,
                Some(AdminState::Unlocked) => ADMIN_UNLOCKED,
                None if row.instances == 0 => ADMIN_UNLOCKED,
                None => ADMIN_MIXED,
            };
            let columns = [
                Value::string(&row.nf_type),
                gauge(row.instances),
                gauge(row.enabled),
                gauge(row.unlocked),
                Value::Integer(admin),
                gauge(row.served_sessions),
            ];
            for (i, value) in columns.into_iter().enumerate() {
                objects.insert(table.child(&[i as u32 + 1, nf_type.ordinal()]), value);
            }
        }

        Self {
            base: base.clone(),
            objects,
        }
    }

    /// Exact lookup; the exception distinguishes an unknown object from a
    /// known object with an unknown instance.
    pub fn get(&self, oid: &Oid) -> Value {
        if let Some(value) = self.objects.get(oid) {
            return value.clone();
        }
        let known_object = oid
            .parent()
            .is_some_and(|parent| self.next(&parent).is_some_and(|(next, _)| next.starts_with(&parent)));
        if known_object {
            Value::NoSuchInstance
        } else {
            Value::NoSuchObject
        }
    }

    /// First object strictly after `oid`.
    pub fn next(&self, oid: &Oid) -> Option<(Oid, Value)> {
        self.objects
            .range((Bound::Excluded(oid), Bound::Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    /// The NF type whose admin-state column `oid` addresses, if writable.
    pub fn admin_state_target(&self, oid: &Oid) -> Option<NfType> {
        match oid.suffix(&self.base)? {
            [2, 1, COL_ADMIN_STATE, ordinal] => NfType::from_ordinal(*ordinal),
            _ => None,
        }
    }

    /// Decode a value written to the admin-state column.
    pub fn admin_state_value(value: &Value) -> Result<AdminState, ErrorStatus> {
        match value {
            Value::Integer(ADMIN_LOCKED) => Ok(AdminState::Locked),
            Value::Integer(ADMIN_UNLOCKED) => Ok(AdminState::Unlocked),
            Value::Integer(_) => Err(ErrorStatus::WrongValue),
            _ => Err(ErrorStatus::WrongType),
        }
    }
}
