//! Edit engine: applies ordered edit batches to a configuration tree and
//! renders subtrees as collection-wrapped JSON.
//!
//! Batches are applied to a private copy; the caller publishes the copy only
//! when every operation succeeded, so a rejected batch never touches the
//! source tree.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::model::{ConfigTree, NetworkFunction, NfType, QosProfile, Session, Subscriber};

use super::error::{Result, StoreError};
use super::path::{Collection, DataPath, EntryKey};

// =============================================================================
// Edit operations
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditOp {
    /// Merge the value onto the entry, creating it when absent.
    Merge,
    /// Replace the entry wholesale, creating it when absent.
    Replace,
    /// Create the entry; fails with `DataExists` when present.
    Create,
    /// Delete the entry; fails with `NotFound` when absent.
    Delete,
    /// Delete the entry if present.
    Remove,
}

impl fmt::Display for EditOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EditOp::Merge => "merge",
            EditOp::Replace => "replace",
            EditOp::Create => "create",
            EditOp::Delete => "delete",
            EditOp::Remove => "remove",
        })
    }
}

impl FromStr for EditOp {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "merge" => Ok(EditOp::Merge),
            "replace" => Ok(EditOp::Replace),
            "create" => Ok(EditOp::Create),
            "delete" => Ok(EditOp::Delete),
            "remove" => Ok(EditOp::Remove),
            other => Err(StoreError::InvalidEdit(format!("unknown operation '{}'", other))),
        }
    }
}

/// One element of an edit batch.
#[derive(Debug, Clone, PartialEq)]
pub struct EditOperation {
    pub path: DataPath,
    pub op: EditOp,
    pub value: Option<Value>,
}

impl EditOperation {
    pub fn new(key: EntryKey, op: EditOp, value: Option<Value>) -> Self {
        Self {
            path: DataPath::Entry(key),
            op,
            value,
        }
    }

    pub fn delete(key: EntryKey) -> Self {
        Self::new(key, EditOp::Delete, None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// A single effective modification produced by an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub key: EntryKey,
    pub kind: ChangeKind,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ChangeKind::Created => "created",
            ChangeKind::Updated => "updated",
            ChangeKind::Deleted => "deleted",
        };
        write!(f, "{} {}", kind, self.key)
    }
}

// =============================================================================
// Entities
// =============================================================================

/// Any entry of the tree, typed.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    NetworkFunction(NetworkFunction),
    Subscriber(Subscriber),
    Session(Session),
    QosProfile(QosProfile),
}

impl Entity {
    pub fn key(&self) -> EntryKey {
        match self {
            Entity::NetworkFunction(nf) => EntryKey::NetworkFunction(nf.nf_type, nf.id.clone()),
            Entity::Subscriber(s) => EntryKey::Subscriber(s.imsi.clone()),
            Entity::Session(s) => EntryKey::Session(s.session_id.clone()),
            Entity::QosProfile(q) => EntryKey::QosProfile(q.id.clone()),
        }
    }

    pub fn to_value(&self) -> Value {
        let value = match self {
            Entity::NetworkFunction(nf) => serde_json::to_value(nf),
            Entity::Subscriber(s) => serde_json::to_value(s),
            Entity::Session(s) => serde_json::to_value(s),
            Entity::QosProfile(q) => serde_json::to_value(q),
        };
        // Plain derived structs with string keys always serialize.
        value.unwrap_or(Value::Null)
    }

    /// Decode a JSON object into the entity addressed by `key`.
    ///
    /// The key leaf (and NF `type`) are filled in from the key when absent and
    /// must match it when present.
    pub fn from_value(key: &EntryKey, value: Value) -> Result<Self> {
        let Value::Object(mut obj) = value else {
            return Err(StoreError::InvalidEdit(format!("{}: value must be an object", key)));
        };

        let key_leaf = key.collection().key_leaf();
        if let Some(v) = obj.get(key_leaf)
            && leaf_text(v).as_deref() != Some(key.id())
        {
            return Err(StoreError::InvalidEdit(format!(
                "{}: key leaf '{}' does not match path",
                key, key_leaf
            )));
        }
        obj.insert(key_leaf.to_string(), Value::String(key.id().to_string()));

        if let EntryKey::NetworkFunction(nf_type, _) = key {
            match obj.get("type").and_then(leaf_text) {
                Some(t) if t.parse::<NfType>().ok() != Some(*nf_type) => {
                    return Err(StoreError::InvalidEdit(format!(
                        "{}: type '{}' does not match path",
                        key, t
                    )));
                }
                _ => {
                    obj.insert("type".to_string(), Value::String(nf_type.to_string()));
                }
            }
        }

        let value = Value::Object(obj);
        let decode_err = |e: serde_json::Error| StoreError::InvalidEdit(format!("{}: {}", key, e));
        let entity = match key {
            EntryKey::NetworkFunction(..) => {
                Entity::NetworkFunction(serde_json::from_value(value).map_err(decode_err)?)
            }
            EntryKey::Subscriber(_) => Entity::Subscriber(serde_json::from_value(value).map_err(decode_err)?),
            EntryKey::Session(_) => Entity::Session(serde_json::from_value(value).map_err(decode_err)?),
            EntryKey::QosProfile(_) => Entity::QosProfile(serde_json::from_value(value).map_err(decode_err)?),
        };
        check_values(&entity)?;
        Ok(entity)
    }
}

fn leaf_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Type and range constraints beyond what deserialization enforces.
fn check_values(entity: &Entity) -> Result<()> {
    let invalid = |msg: String| Err(StoreError::InvalidEdit(msg));
    match entity {
        Entity::Subscriber(s) => {
            let digits = s.imsi.chars().all(|c| c.is_ascii_digit());
            if !digits || !(5..=15).contains(&s.imsi.len()) {
                return invalid(format!("imsi '{}' must be 5 to 15 digits", s.imsi));
            }
            if s.profile.qos_profile_id.is_empty() {
                return invalid(format!("subscriber {} has an empty qos-profile-id", s.imsi));
            }
        }
        Entity::QosProfile(q) => {
            if q.five_qi == 0 {
                return invalid(format!("qos profile {}: five-qi must be 1..255", q.id));
            }
            if !(1..=127).contains(&q.priority) {
                return invalid(format!("qos profile {}: priority must be 1..127", q.id));
            }
            let b = &q.bitrate;
            if b.guaranteed_uplink > b.max_uplink || b.guaranteed_downlink > b.max_downlink {
                return invalid(format!(
                    "qos profile {}: guaranteed bitrate exceeds maximum",
                    q.id
                ));
            }
        }
        Entity::Session(s) => {
            if s.subscriber_imsi.is_empty() || s.qos_profile_id.is_empty() || s.serving_nf.is_empty() {
                return invalid(format!("session {} has empty references", s.session_id));
            }
        }
        Entity::NetworkFunction(nf) => {
            if nf.id.is_empty() {
                return invalid("network function with empty id".to_string());
            }
        }
    }
    Ok(())
}

// =============================================================================
// Tree access
// =============================================================================

pub fn get_entry(tree: &ConfigTree, key: &EntryKey) -> Option<Entity> {
    match key {
        EntryKey::NetworkFunction(t, id) => tree
            .get_network_function(*t, id)
            .cloned()
            .map(Entity::NetworkFunction),
        EntryKey::Subscriber(id) => tree.subscribers.get(id).cloned().map(Entity::Subscriber),
        EntryKey::Session(id) => tree.sessions.get(id).cloned().map(Entity::Session),
        EntryKey::QosProfile(id) => tree.qos_profiles.get(id).cloned().map(Entity::QosProfile),
    }
}

fn insert_entry(tree: &mut ConfigTree, entity: Entity) {
    match entity {
        Entity::NetworkFunction(nf) => {
            tree.network_functions
                .entry(nf.nf_type)
                .or_default()
                .insert(nf.id.clone(), nf);
        }
        Entity::Subscriber(s) => {
            tree.subscribers.insert(s.imsi.clone(), s);
        }
        Entity::Session(s) => {
            tree.sessions.insert(s.session_id.clone(), s);
        }
        Entity::QosProfile(q) => {
            tree.qos_profiles.insert(q.id.clone(), q);
        }
    }
}

fn remove_entry(tree: &mut ConfigTree, key: &EntryKey) -> bool {
    match key {
        EntryKey::NetworkFunction(t, id) => {
            let removed = tree
                .network_functions
                .get_mut(t)
                .and_then(|m| m.remove(id))
                .is_some();
            if tree.network_functions.get(t).is_some_and(|m| m.is_empty()) {
                tree.network_functions.remove(t);
            }
            removed
        }
        EntryKey::Subscriber(id) => tree.subscribers.remove(id).is_some(),
        EntryKey::Session(id) => tree.sessions.remove(id).is_some(),
        EntryKey::QosProfile(id) => tree.qos_profiles.remove(id).is_some(),
    }
}

// =============================================================================
// Referential integrity
// =============================================================================

/// References held by `entity` must resolve in `tree`.
fn check_outgoing(tree: &ConfigTree, entity: &Entity) -> Result<()> {
    match entity {
        Entity::Session(s) => {
            if !tree.subscribers.contains_key(&s.subscriber_imsi) {
                return Err(StoreError::DanglingReference(format!(
                    "session {} references unknown subscriber {}",
                    s.session_id, s.subscriber_imsi
                )));
            }
            if !tree.qos_profiles.contains_key(&s.qos_profile_id) {
                return Err(StoreError::DanglingReference(format!(
                    "session {} references unknown qos profile {}",
                    s.session_id, s.qos_profile_id
                )));
            }
            if tree.find_network_function(&s.serving_nf).is_none() {
                return Err(StoreError::DanglingReference(format!(
                    "session {} references unknown network function {}",
                    s.session_id, s.serving_nf
                )));
            }
        }
        Entity::Subscriber(s) => {
            if !tree.qos_profiles.contains_key(&s.profile.qos_profile_id) {
                return Err(StoreError::DanglingReference(format!(
                    "subscriber {} references unknown qos profile {}",
                    s.imsi, s.profile.qos_profile_id
                )));
            }
        }
        Entity::NetworkFunction(_) | Entity::QosProfile(_) => {}
    }
    Ok(())
}

/// Nothing left in `tree` may reference the (already removed) entry `key`.
fn check_incoming(tree: &ConfigTree, key: &EntryKey) -> Result<()> {
    let conflict = |what: String| Err(StoreError::ReferenceConflict(what));
    match key {
        EntryKey::QosProfile(id) => {
            if let Some(s) = tree.sessions.values().find(|s| &s.qos_profile_id == id) {
                return conflict(format!("qos profile {} is used by session {}", id, s.session_id));
            }
            if let Some(s) = tree.subscribers.values().find(|s| &s.profile.qos_profile_id == id) {
                return conflict(format!("qos profile {} is used by subscriber {}", id, s.imsi));
            }
        }
        EntryKey::NetworkFunction(_, id) => {
            // Another type may still hold an NF with the same id.
            if tree.find_network_function(id).is_none()
                && let Some(s) = tree.sessions.values().find(|s| &s.serving_nf == id)
            {
                return conflict(format!(
                    "network function {} is serving session {}",
                    id, s.session_id
                ));
            }
        }
        EntryKey::Subscriber(imsi) => {
            if let Some(s) = tree.sessions_for_subscriber(imsi).next() {
                return conflict(format!("subscriber {} owns session {}", imsi, s.session_id));
            }
        }
        EntryKey::Session(_) => {}
    }
    Ok(())
}

/// Re-check every value constraint and reference of a whole tree.
pub fn validate_tree(tree: &ConfigTree) -> Result<()> {
    for entity in entries(tree).into_values() {
        check_values(&entity)?;
        check_outgoing(tree, &entity)?;
    }
    Ok(())
}

// =============================================================================
// Batch application
// =============================================================================

/// Apply `ops` in order to a copy of `tree`.
///
/// Returns the new tree and the effective changes, or the first failure.
pub fn apply_batch(tree: &ConfigTree, ops: &[EditOperation]) -> Result<(ConfigTree, Vec<Change>)> {
    let mut working = tree.clone();
    let mut changes = Vec::new();
    for op in ops {
        if let Some(change) = apply_one(&mut working, op)? {
            changes.push(change);
        }
    }
    Ok((working, changes))
}

fn apply_one(tree: &mut ConfigTree, edit: &EditOperation) -> Result<Option<Change>> {
    let DataPath::Entry(key) = &edit.path else {
        return Err(StoreError::InvalidEdit(format!(
            "edit target '{}' must name a single entry",
            edit.path
        )));
    };
    let existing = get_entry(tree, key);

    match edit.op {
        EditOp::Delete | EditOp::Remove => {
            if existing.is_none() {
                return match edit.op {
                    EditOp::Delete => Err(StoreError::NotFound(key.to_string())),
                    _ => Ok(None),
                };
            }
            remove_entry(tree, key);
            check_incoming(tree, key)?;
            Ok(Some(Change {
                key: key.clone(),
                kind: ChangeKind::Deleted,
            }))
        }
        EditOp::Create | EditOp::Replace | EditOp::Merge => {
            let value = edit
                .value
                .clone()
                .ok_or_else(|| StoreError::InvalidEdit(format!("{}: {} requires a value", key, edit.op)))?;

            if edit.op == EditOp::Create && existing.is_some() {
                return Err(StoreError::DataExists(key.to_string()));
            }

            let value = match (&existing, edit.op) {
                (Some(current), EditOp::Merge) => {
                    let mut base = current.to_value();
                    merge_json(&mut base, value);
                    base
                }
                _ => value,
            };

            let entity = Entity::from_value(key, value)?;
            check_outgoing(tree, &entity)?;

            let kind = match &existing {
                None => ChangeKind::Created,
                Some(current) if *current == entity => return Ok(None),
                Some(_) => ChangeKind::Updated,
            };
            insert_entry(tree, entity);
            Ok(Some(Change {
                key: key.clone(),
                kind,
            }))
        }
    }
}

fn entries(tree: &ConfigTree) -> BTreeMap<EntryKey, Entity> {
    tree.list_network_functions()
        .cloned()
        .map(Entity::NetworkFunction)
        .chain(tree.subscribers.values().cloned().map(Entity::Subscriber))
        .chain(tree.sessions.values().cloned().map(Entity::Session))
        .chain(tree.qos_profiles.values().cloned().map(Entity::QosProfile))
        .map(|e| (e.key(), e))
        .collect()
}

/// Entry-level differences between two trees.
pub fn diff(old: &ConfigTree, new: &ConfigTree) -> Vec<Change> {
    let old = entries(old);
    let new = entries(new);
    let mut changes = Vec::new();
    for (key, entity) in &new {
        match old.get(key) {
            None => changes.push(Change {
                key: key.clone(),
                kind: ChangeKind::Created,
            }),
            Some(prev) if prev != entity => changes.push(Change {
                key: key.clone(),
                kind: ChangeKind::Updated,
            }),
            Some(_) => {}
        }
    }
    for key in old.keys().filter(|k| !new.contains_key(*k)) {
        changes.push(Change {
            key: key.clone(),
            kind: ChangeKind::Deleted,
        });
    }
    changes
}

/// JSON merge: objects merge recursively, `null` removes a member, anything
/// else replaces.
fn merge_json(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (k, v) in patch {
                if v.is_null() {
                    base.remove(&k);
                } else if let Some(existing) = base.get_mut(&k) {
                    merge_json(existing, v);
                } else {
                    base.insert(k, v);
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

// =============================================================================
// Rendering
// =============================================================================

fn nf_type_map(tree: &ConfigTree) -> Value {
    let mut obj = Map::new();
    for (nf_type, entries) in &tree.network_functions {
        if entries.is_empty() {
            continue;
        }
        let list = entries
            .values()
            .map(|nf| Entity::NetworkFunction(nf.clone()).to_value())
            .collect();
        obj.insert(nf_type.segment().to_string(), Value::Array(list));
    }
    Value::Object(obj)
}

fn collection_list(tree: &ConfigTree, collection: Collection) -> Value {
    let list: Vec<Value> = match collection {
        Collection::NetworkFunctions => tree
            .list_network_functions()
            .map(|nf| Entity::NetworkFunction(nf.clone()).to_value())
            .collect(),
        Collection::Subscribers => tree
            .subscribers
            .values()
            .map(|s| Entity::Subscriber(s.clone()).to_value())
            .collect(),
        Collection::Sessions => tree
            .sessions
            .values()
            .map(|s| Entity::Session(s.clone()).to_value())
            .collect(),
        Collection::QosProfiles => tree
            .qos_profiles
            .values()
            .map(|q| Entity::QosProfile(q.clone()).to_value())
            .collect(),
    };
    Value::Array(list)
}

/// Render the subtree at `path` in the collection-wrapper shape.
///
/// The network-functions collection is keyed by NF type; every other
/// collection is keyed by its name. A single entry is rendered as a
/// one-element list under the same key.
pub fn render(tree: &ConfigTree, path: &DataPath) -> Result<Value> {
    match path {
        DataPath::Root => Ok(json!({
            "network-functions": nf_type_map(tree),
            "subscribers": collection_list(tree, Collection::Subscribers),
            "sessions": collection_list(tree, Collection::Sessions),
            "qos-profiles": collection_list(tree, Collection::QosProfiles),
        })),
        DataPath::Collection(Collection::NetworkFunctions) => Ok(nf_type_map(tree)),
        DataPath::Collection(c) => {
            let mut obj = Map::new();
            obj.insert(c.name().to_string(), collection_list(tree, *c));
            Ok(Value::Object(obj))
        }
        DataPath::NfType(t) => {
            let list: Vec<Value> = tree
                .list_network_functions_by_type(*t)
                .map(|nf| Entity::NetworkFunction(nf.clone()).to_value())
                .collect();
            let mut obj = Map::new();
            obj.insert(t.segment().to_string(), Value::Array(list));
            Ok(Value::Object(obj))
        }
        DataPath::Entry(key) => {
            let entity = get_entry(tree, key).ok_or_else(|| StoreError::NotFound(key.to_string()))?;
            let wrapper = match key {
                EntryKey::NetworkFunction(t, _) => t.segment(),
                other => other.collection().name(),
            };
            let mut obj = Map::new();
            obj.insert(wrapper.to_string(), Value::Array(vec![entity.to_value()]));
            Ok(Value::Object(obj))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AdminState;

    fn qos(id: &str) -> EditOperation {
        EditOperation::new(
            EntryKey::QosProfile(id.into()),
            EditOp::Create,
            Some(json!({"five-qi": 9, "priority": 20})),
        )
    }

    fn nf(t: NfType, id: &str) -> EditOperation {
        EditOperation::new(EntryKey::NetworkFunction(t, id.into()), EditOp::Create, Some(json!({})))
    }

    fn subscriber(imsi: &str, qos: &str) -> EditOperation {
        EditOperation::new(
            EntryKey::Subscriber(imsi.into()),
            EditOp::Create,
            Some(json!({"profile": {"qos-profile-id": qos}})),
        )
    }

    fn session(id: &str, imsi: &str, qos: &str, nf: &str) -> EditOperation {
        EditOperation::new(
            EntryKey::Session(id.into()),
            EditOp::Create,
            Some(json!({"subscriber-imsi": imsi, "qos-profile-id": qos, "serving-nf": nf})),
        )
    }

    fn populated() -> ConfigTree {
        let ops = vec![
            qos("qos-1"),
            nf(NfType::Smf, "smf-1"),
            subscriber("001010000000001", "qos-1"),
            session("s1", "001010000000001", "qos-1", "smf-1"),
        ];
        apply_batch(&ConfigTree::default(), &ops).unwrap().0
    }

    #[test]
    fn test_create_in_dependency_order() {
        let tree = populated();
        assert_eq!(tree.sessions.len(), 1);
        assert_eq!(tree.subscribers.len(), 1);
        assert!(tree.get_network_function(NfType::Smf, "smf-1").is_some());
    }

    #[test]
    fn test_out_of_order_batch_is_dangling() {
        let ops = vec![session("s1", "001010000000001", "qos-1", "smf-1"), qos("qos-1")];
        let err = apply_batch(&ConfigTree::default(), &ops).unwrap_err();
        assert!(matches!(err, StoreError::DanglingReference(_)));
    }

    #[test]
    fn test_subscriber_requires_qos_profile() {
        let err = apply_batch(&ConfigTree::default(), &[subscriber("001010000000001", "nope")]).unwrap_err();
        assert!(matches!(err, StoreError::DanglingReference(_)));
    }

    #[test]
    fn test_delete_referenced_qos_conflicts() {
        let tree = populated();
        let err = apply_batch(&tree, &[EditOperation::delete(EntryKey::QosProfile("qos-1".into()))])
            .unwrap_err();
        assert!(matches!(err, StoreError::ReferenceConflict(_)));
    }

    #[test]
    fn test_delete_serving_nf_conflicts() {
        let tree = populated();
        let err = apply_batch(
            &tree,
            &[EditOperation::delete(EntryKey::NetworkFunction(NfType::Smf, "smf-1".into()))],
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::ReferenceConflict(_)));
    }

    #[test]
    fn test_delete_session_then_dependents() {
        let tree = populated();
        let ops = vec![
            EditOperation::delete(EntryKey::Session("s1".into())),
            EditOperation::delete(EntryKey::Subscriber("001010000000001".into())),
            EditOperation::delete(EntryKey::QosProfile("qos-1".into())),
        ];
        let (tree, changes) = apply_batch(&tree, &ops).unwrap();
        assert_eq!(changes.len(), 3);
        assert!(tree.qos_profiles.is_empty());
    }

    #[test]
    fn test_create_existing_is_data_exists() {
        let tree = populated();
        let err = apply_batch(&tree, &[qos("qos-1")]).unwrap_err();
        assert!(matches!(err, StoreError::DataExists(_)));
    }

    #[test]
    fn test_delete_missing_is_not_found_remove_is_noop() {
        let tree = ConfigTree::default();
        let key = EntryKey::Session("ghost".into());
        assert!(matches!(
            apply_batch(&tree, &[EditOperation::delete(key.clone())]),
            Err(StoreError::NotFound(_))
        ));
        let (_, changes) = apply_batch(&tree, &[EditOperation::new(key, EditOp::Remove, None)]).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_merge_updates_single_leaf() {
        let tree = populated();
        let op = EditOperation::new(
            EntryKey::NetworkFunction(NfType::Smf, "smf-1".into()),
            EditOp::Merge,
            Some(json!({"admin-state": "locked"})),
        );
        let (tree, changes) = apply_batch(&tree, &[op]).unwrap();
        assert_eq!(changes[0].kind, ChangeKind::Updated);
        assert_eq!(
            tree.get_network_function(NfType::Smf, "smf-1").unwrap().admin_state,
            AdminState::Locked
        );
    }

    #[test]
    fn test_merge_identical_value_is_no_change() {
        let tree = populated();
        let op = EditOperation::new(
            EntryKey::QosProfile("qos-1".into()),
            EditOp::Merge,
            Some(json!({"five-qi": 9})),
        );
        let (_, changes) = apply_batch(&tree, &[op]).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_key_mismatch_is_invalid() {
        let op = EditOperation::new(
            EntryKey::QosProfile("qos-1".into()),
            EditOp::Create,
            Some(json!({"id": "qos-2", "five-qi": 9, "priority": 1})),
        );
        assert!(matches!(
            apply_batch(&ConfigTree::default(), &[op]),
            Err(StoreError::InvalidEdit(_))
        ));
    }

    #[test]
    fn test_value_constraints() {
        let bad_priority = EditOperation::new(
            EntryKey::QosProfile("q".into()),
            EditOp::Create,
            Some(json!({"five-qi": 9, "priority": 200})),
        );
        let bad_bitrate = EditOperation::new(
            EntryKey::QosProfile("q".into()),
            EditOp::Create,
            Some(json!({"five-qi": 1, "priority": 10, "bitrate": {"guaranteed-uplink": 10, "max-uplink": 5}})),
        );
        let bad_type = EditOperation::new(
            EntryKey::QosProfile("q".into()),
            EditOp::Create,
            Some(json!({"five-qi": "nine", "priority": 10})),
        );
        for op in [bad_priority, bad_bitrate, bad_type] {
            assert!(matches!(
                apply_batch(&ConfigTree::default(), &[op]),
                Err(StoreError::InvalidEdit(_))
            ));
        }
    }

    #[test]
    fn test_invalid_imsi_rejected() {
        let tree = apply_batch(&ConfigTree::default(), &[qos("qos-1")]).unwrap().0;
        let err = apply_batch(&tree, &[subscriber("12ab", "qos-1")]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidEdit(_)));
    }

    #[test]
    fn test_collection_path_edit_rejected() {
        let op = EditOperation {
            path: DataPath::Collection(Collection::Sessions),
            op: EditOp::Delete,
            value: None,
        };
        assert!(matches!(
            apply_batch(&ConfigTree::default(), &[op]),
            Err(StoreError::InvalidEdit(_))
        ));
    }

    #[test]
    fn test_failed_batch_leaves_source_untouched() {
        let tree = populated();
        let before = tree.clone();
        let ops = vec![qos("qos-2"), qos("qos-1")];
        assert!(apply_batch(&tree, &ops).is_err());
        assert_eq!(tree, before);
    }

    #[test]
    fn test_render_wrappers() {
        let tree = populated();
        let nfs = render(&tree, &DataPath::Collection(Collection::NetworkFunctions)).unwrap();
        assert_eq!(nfs["smf"][0]["id"], "smf-1");
        assert!(nfs.get("amf").is_none());

        let subs = render(&tree, &DataPath::Collection(Collection::Subscribers)).unwrap();
        assert_eq!(subs["subscribers"].as_array().unwrap().len(), 1);

        let amf = render(&tree, &DataPath::NfType(NfType::Amf)).unwrap();
        assert_eq!(amf["amf"], json!([]));

        let entry = render(&tree, &DataPath::Entry(EntryKey::Session("s1".into()))).unwrap();
        assert_eq!(entry["sessions"][0]["state"], "establishing");

        assert!(matches!(
            render(&tree, &DataPath::Entry(EntryKey::Session("s2".into()))),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_diff_reports_entry_changes() {
        let old = populated();
        let ops = vec![
            EditOperation::delete(EntryKey::Session("s1".into())),
            qos("qos-2"),
            EditOperation::new(
                EntryKey::QosProfile("qos-1".into()),
                EditOp::Merge,
                Some(json!({"priority": 5})),
            ),
        ];
        let (new, _) = apply_batch(&old, &ops).unwrap();
        let changes = diff(&old, &new);
        assert_eq!(changes.len(), 3);
        assert!(changes.contains(&Change {
            key: EntryKey::Session("s1".into()),
            kind: ChangeKind::Deleted
        }));
        assert!(changes.contains(&Change {
            key: EntryKey::QosProfile("qos-2".into()),
            kind: ChangeKind::Created
        }));
        assert!(diff(&old, &old).is_empty());
    }

    #[test]
    fn test_validate_tree_detects_dangling() {
        let mut tree = populated();
        tree.qos_profiles.clear();
        assert!(validate_tree(&tree).is_err());
        assert!(validate_tree(&populated()).is_ok());
    }
}
