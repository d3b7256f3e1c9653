//! Per-connection NETCONF session state machine.
//!
//! The session is transport agnostic: it consumes complete decoded messages
//! and produces reply documents. Dropping a session releases every lock it
//! holds and discards its uncommitted candidate edits.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use quick_xml::escape::escape;
use serde_json::{Map, Value};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::metrics::CoreStatistics;
use crate::store::{ClientId, Collection, DataPath, DataStore, EntryKey, StoreError, Target};

use super::rpc::{BASE_NS, DATA_NS, Filter, Rpc, RpcError, RpcResult, TestOption, parse_operation};
use super::xml::{Element, parse, write_json};

pub const BASE_1_0: &str = "urn:ietf:params:netconf:base:1.0";
pub const BASE_1_1: &str = "urn:ietf:params:netconf:base:1.1";

const CAPABILITIES: &[&str] = &[
    BASE_1_0,
    BASE_1_1,
    "urn:ietf:params:netconf:capability:candidate:1.0",
    "urn:ietf:params:netconf:capability:writable-running:1.0",
    "urn:ietf:params:netconf:capability:rollback-on-error:1.0",
    "urn:ietf:params:netconf:capability:validate:1.1",
    "urn:5gc-mgmt:core?module=fivegc-core",
];

// =============================================================================
// Session registry
// =============================================================================

/// Live sessions, for id allocation and `kill-session`.
#[derive(Debug)]
pub struct SessionRegistry {
    next_id: AtomicU32,
    sessions: Mutex<HashMap<u32, Arc<Notify>>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<u32, Arc<Notify>>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn register(&self) -> (u32, Arc<Notify>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let kill = Arc::new(Notify::new());
        self.sessions().insert(id, Arc::clone(&kill));
        (id, kill)
    }

    fn unregister(&self, id: u32) {
        self.sessions().remove(&id);
    }

    /// Signal session `id` to terminate. Returns false if it does not exist.
    fn kill(&self, id: u32) -> bool {
        match self.sessions().remove(&id) {
            Some(kill) => {
                kill.notify_one();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Session
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the client `<hello>`.
    Unauthenticated,
    HelloExchanged,
    Idle,
    /// Holding at least one lock, candidate unchanged.
    Locked,
    /// Holding the candidate lock with uncommitted edits.
    EditingCandidate,
    Closed,
}

/// What the transport should do after a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Reply(String),
    ReplyAndClose(String),
    Close,
    None,
}

pub struct Session {
    id: u32,
    client: ClientId,
    store: Arc<dyn DataStore>,
    registry: Arc<SessionRegistry>,
    kill: Arc<Notify>,
    phase: Phase,
    candidate_locked: bool,
    running_locked: bool,
    dirty: bool,
    base11: bool,
}

impl Session {
    pub fn new(store: Arc<dyn DataStore>, registry: Arc<SessionRegistry>) -> Self {
        let (id, kill) = registry.register();
        Self {
            id,
            client: ClientId::netconf(id),
            store,
            registry,
            kill,
            phase: Phase::Unauthenticated,
            candidate_locked: false,
            running_locked: false,
            dirty: false,
            base11: false,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Notified when another session kills this one.
    pub fn kill_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.kill)
    }

    /// True once both peers advertised base:1.1.
    pub fn chunked(&self) -> bool {
        self.base11
    }

    /// The server `<hello>`, sent as soon as the connection opens.
    pub fn hello_message(&self) -> String {
        let mut out = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><hello xmlns=\"{}\"><capabilities>",
            BASE_NS
        );
        for cap in CAPABILITIES {
            let _ = write!(out, "<capability>{}</capability>", escape(*cap));
        }
        let _ = write!(out, "</capabilities><session-id>{}</session-id></hello>", self.id);
        out
    }

    pub fn handle_message(&mut self, msg: &[u8]) -> Outcome {
        match self.phase {
            Phase::Closed => Outcome::Close,
            Phase::Unauthenticated => self.handle_hello(msg),
            _ => self.handle_rpc(msg),
        }
    }

    fn handle_hello(&mut self, msg: &[u8]) -> Outcome {
        let hello = match parse(msg) {
            Ok(el) => el,
            Err(e) => {
                warn!(session_id = self.id, "Unparseable hello: {}", e);
                return self.close();
            }
        };
        if hello.name != "hello" {
            warn!(session_id = self.id, "Received <{}> before hello, closing", hello.name);
            return self.close();
        }
        if hello.child("session-id").is_some() {
            warn!(session_id = self.id, "Client hello carries a session-id, closing");
            return self.close();
        }

        let caps: Vec<&str> = hello
            .child("capabilities")
            .map(|c| c.children.iter().map(Element::text).collect())
            .unwrap_or_default();
        if !caps.iter().any(|c| *c == BASE_1_0 || *c == BASE_1_1) {
            warn!(session_id = self.id, "No common base capability, closing");
            return self.close();
        }
        self.base11 = caps.contains(&BASE_1_1);
        self.phase = Phase::HelloExchanged;
        info!(session_id = self.id, chunked = self.base11, "NETCONF hello exchanged");
        Outcome::None
    }

    fn handle_rpc(&mut self, msg: &[u8]) -> Outcome {
        let rpc = match parse(msg) {
            Ok(el) => el,
            Err(e) => {
                warn!(session_id = self.id, "Malformed message: {}", e);
                let reply = error_reply(None, &[RpcError::malformed_message(e.to_string())]);
                self.close();
                return Outcome::ReplyAndClose(reply);
            }
        };
        if rpc.name != "rpc" {
            return Outcome::Reply(error_reply(
                None,
                &[RpcError::malformed_message(format!("expected <rpc>, got <{}>", rpc.name))],
            ));
        }
        if rpc.attr("message-id").is_none() {
            return Outcome::Reply(error_reply(
                Some(&rpc),
                &[RpcError::missing_attribute("message-id", "rpc")],
            ));
        }

        let result = parse_operation(&rpc).and_then(|op| {
            debug!(session_id = self.id, rpc = ?op, "NETCONF rpc");
            self.execute(op)
        });
        self.refresh_phase();

        match result {
            Ok(Reply::Ok) => Outcome::Reply(ok_reply(&rpc)),
            Ok(Reply::Data(data)) => Outcome::Reply(data_reply(&rpc, &data)),
            Ok(Reply::Close) => {
                let reply = ok_reply(&rpc);
                self.close();
                Outcome::ReplyAndClose(reply)
            }
            Err(err) => Outcome::Reply(error_reply(Some(&rpc), &[err])),
        }
    }

    fn execute(&mut self, rpc: Rpc) -> RpcResult<Reply> {
        match rpc {
            Rpc::Get { filter } => Ok(Reply::Data(self.render_data(Target::Running, filter.as_ref(), true)?)),
            Rpc::GetConfig { source, filter } => Ok(Reply::Data(self.render_data(source, filter.as_ref(), false)?)),
            Rpc::EditConfig {
                target,
                test_option,
                ops,
            } => {
                if test_option == TestOption::TestOnly {
                    self.store.test_edit(target, &self.client, &ops)?;
                } else {
                    let outcome = self.store.edit_config(target, &self.client, ops)?;
                    if target == Target::Candidate && !outcome.changes.is_empty() {
                        self.dirty = true;
                    }
                }
                Ok(Reply::Ok)
            }
            Rpc::Lock { target } => {
                self.store.lock(target, &self.client)?;
                match target {
                    Target::Candidate => {
                        self.candidate_locked = true;
                        self.dirty = false;
                    }
                    Target::Running => self.running_locked = true,
                }
                Ok(Reply::Ok)
            }
            Rpc::Unlock { target } => {
                self.store.unlock(target, &self.client)?;
                match target {
                    Target::Candidate => {
                        self.candidate_locked = false;
                        self.dirty = false;
                    }
                    Target::Running => self.running_locked = false,
                }
                Ok(Reply::Ok)
            }
            Rpc::Commit => {
                let version = self.store.commit(&self.client)?;
                info!(session_id = self.id, version, "Candidate committed");
                self.dirty = false;
                Ok(Reply::Ok)
            }
            Rpc::DiscardChanges => {
                self.store.discard_changes(&self.client)?;
                self.dirty = false;
                Ok(Reply::Ok)
            }
            Rpc::Validate { source } => {
                self.store.validate(source)?;
                Ok(Reply::Ok)
            }
            Rpc::CloseSession => Ok(Reply::Close),
            Rpc::KillSession { session_id } => {
                if session_id == self.id {
                    return Err(RpcError::invalid_value("a session cannot kill itself"));
                }
                if !self.registry.kill(session_id) {
                    return Err(RpcError::invalid_value(format!("no session {}", session_id)));
                }
                // Locks must be free by the time the reply is sent.
                self.store.release_client(&ClientId::netconf(session_id));
                info!(session_id = self.id, killed = session_id, "Session killed");
                Ok(Reply::Ok)
            }
        }
    }

    fn refresh_phase(&mut self) {
        if self.phase == Phase::Closed {
            return;
        }
        self.phase = if self.candidate_locked && self.dirty {
            Phase::EditingCandidate
        } else if self.candidate_locked || self.running_locked {
            Phase::Locked
        } else {
            Phase::Idle
        };
    }

    /// Render `<data>` content for get / get-config.
    fn render_data(&self, target: Target, filter: Option<&Filter>, with_state: bool) -> RpcResult<String> {
        let paths = match filter {
            Some(f) => f.paths.clone(),
            None => vec![DataPath::Root],
        };

        let mut selected = Map::new();
        for path in &paths {
            match self.store.read(target, path) {
                Ok(value) => collect(&mut selected, path, value),
                // A filter naming an absent entry selects nothing.
                Err(StoreError::NotFound(_)) if filter.is_some() => {}
                Err(e) => return Err(e.into()),
            }
        }

        let attrs = format!(" xmlns=\"{}\"", DATA_NS);
        let mut out = String::new();
        for collection in Collection::ALL {
            let Some(value) = selected.get(collection.name()) else {
                continue;
            };
            if collection == Collection::NetworkFunctions {
                let Value::Object(types) = value else {
                    continue;
                };
                let _ = write!(out, "<network-functions{}>", attrs);
                for (nf_type, list) in types {
                    let _ = write!(out, "<{}>", nf_type);
                    write_json(&mut out, "network-function", list, "");
                    let _ = write!(out, "</{}>", nf_type);
                }
                out.push_str("</network-functions>");
            } else {
                write_json(&mut out, collection.name(), value, &attrs);
            }
        }

        if with_state && filter.is_none_or(|f| f.statistics) {
            let snapshot = self.store.snapshot(Target::Running);
            let stats = CoreStatistics::derive(&snapshot.tree, snapshot.version);
            let stats = serde_json::to_value(&stats).unwrap_or(Value::Null);
            write_json(&mut out, "core-statistics", &stats, &attrs);
        }
        Ok(out)
    }

    fn close(&mut self) -> Outcome {
        if self.phase != Phase::Closed {
            self.phase = Phase::Closed;
            self.release();
        }
        Outcome::Close
    }

    fn release(&mut self) {
        if self.candidate_locked || self.running_locked {
            info!(session_id = self.id, "Releasing locks held by closing session");
        }
        self.store.release_client(&self.client);
        self.candidate_locked = false;
        self.running_locked = false;
        self.dirty = false;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Runs on every exit path of the connection task, including
        // cancellation and panics.
        self.store.release_client(&self.client);
        self.registry.unregister(self.id);
    }
}

enum Reply {
    Ok,
    Data(String),
    Close,
}

/// Fold a read result into the root-shaped selection.
fn collect(selected: &mut Map<String, Value>, path: &DataPath, value: Value) {
    let Value::Object(obj) = value else {
        return;
    };
    let nf_scoped = matches!(
        path,
        DataPath::Collection(Collection::NetworkFunctions)
            | DataPath::NfType(_)
            | DataPath::Entry(EntryKey::NetworkFunction(..))
    );
    for (key, value) in obj {
        if nf_scoped {
            extend(selected, &["network-functions", &key], value);
        } else if key == "network-functions" {
            if let Value::Object(types) = value {
                for (nf_type, list) in types {
                    extend(selected, &["network-functions", &nf_type], list);
                }
            }
        } else {
            extend(selected, &[&key], value);
        }
    }
}

fn extend(selected: &mut Map<String, Value>, keys: &[&str], list: Value) {
    let Value::Array(items) = list else {
        return;
    };
    if items.is_empty() {
        return;
    }
    let mut node = selected;
    let (last, parents) = match keys.split_last() {
        Some(split) => split,
        None => return,
    };
    for key in parents {
        let entry = node
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(next) = entry else {
            return;
        };
        node = next;
    }
    if let Value::Array(existing) = node.entry(last.to_string()).or_insert_with(|| Value::Array(Vec::new())) {
        for item in items {
            if !existing.contains(&item) {
                existing.push(item);
            }
        }
    }
}

// =============================================================================
// Reply documents
// =============================================================================

fn reply_open(rpc: Option<&Element>) -> String {
    let mut out = format!("<rpc-reply xmlns=\"{}\"", BASE_NS);
    if let Some(rpc) = rpc {
        for (key, value) in &rpc.attrs {
            if key == "xmlns" {
                continue;
            }
            let _ = write!(out, " {}=\"{}\"", key, escape(value.as_str()));
        }
    }
    out.push('>');
    out
}

fn ok_reply(rpc: &Element) -> String {
    format!("{}<ok/></rpc-reply>", reply_open(Some(rpc)))
}

fn data_reply(rpc: &Element, data: &str) -> String {
    format!("{}<data>{}</data></rpc-reply>", reply_open(Some(rpc)), data)
}

fn error_reply(rpc: Option<&Element>, errors: &[RpcError]) -> String {
    let mut out = reply_open(rpc);
    for err in errors {
        out.push_str(&err.to_xml());
    }
    out.push_str("</rpc-reply>");
    out
}
