pub mod audit;
pub mod config;
pub mod errmap;
pub mod metrics;
pub mod model;
pub mod netconf;
pub mod rest;
pub mod seed;
pub mod simulator;
pub mod snmp;
pub mod store;

pub use config::MgmtConfig;
pub use netconf::{NetconfServer, SessionRegistry};
pub use rest::{AppState, create_router};
pub use snmp::SnmpAgent;
pub use store::{ClientId, DataStore, Datastore, Event, StoreError, Target};
