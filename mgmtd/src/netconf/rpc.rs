//! RPC parsing and `<rpc-error>` construction.

use std::fmt::Write;

use quick_xml::escape::escape;
use uuid::Uuid;

use crate::errmap;
use crate::model::NfType;
use crate::store::{Collection, DataPath, EditOp, EditOperation, EntryKey, StoreError, Target};

use super::xml::{Element, element_to_json};

pub const BASE_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";
/// Namespace of the core data model.
pub const DATA_NS: &str = "urn:5gc-mgmt:core";

// =============================================================================
// rpc-error
// =============================================================================

/// One `<rpc-error>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub error_type: &'static str,
    pub tag: &'static str,
    pub app_tag: Option<&'static str>,
    pub message: String,
    /// Pre-rendered `<error-info>` content.
    pub info: Option<String>,
}

impl RpcError {
    fn new(error_type: &'static str, tag: &'static str, message: impl Into<String>) -> Self {
        Self {
            error_type,
            tag,
            app_tag: None,
            message: message.into(),
            info: None,
        }
    }

    pub fn operation_not_supported(what: &str) -> Self {
        Self::new("protocol", "operation-not-supported", format!("{} is not supported", what))
    }

    pub fn missing_attribute(attr: &str, element: &str) -> Self {
        let mut err = Self::new("rpc", "missing-attribute", format!("missing attribute '{}'", attr));
        err.info = Some(format!(
            "<bad-attribute>{}</bad-attribute><bad-element>{}</bad-element>",
            attr, element
        ));
        err
    }

    pub fn missing_element(element: &str) -> Self {
        let mut err = Self::new("protocol", "missing-element", format!("missing element '{}'", element));
        err.info = Some(format!("<bad-element>{}</bad-element>", element));
        err
    }

    pub fn unknown_element(element: &str) -> Self {
        let mut err = Self::new("protocol", "unknown-element", format!("unknown element '{}'", element));
        err.info = Some(format!("<bad-element>{}</bad-element>", escape(element)));
        err
    }

    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::new("protocol", "invalid-value", message)
    }

    pub fn malformed_message(message: impl Into<String>) -> Self {
        Self::new("rpc", "malformed-message", message)
    }

    /// Translate a datastore failure via the central table.
    pub fn from_store(err: &StoreError) -> Self {
        let wire = errmap::for_error(err);
        let mut out = Self::new(wire.error_type, wire.error_tag, err.to_string());
        out.app_tag = wire.error_app_tag;
        if let StoreError::AlreadyLocked { holder } = err {
            out.info = Some(format!(
                "<session-id>{}</session-id>",
                holder.netconf_session_id().unwrap_or(0)
            ));
        }
        out
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::from("<rpc-error>");
        let _ = write!(
            out,
            "<error-type>{}</error-type><error-tag>{}</error-tag><error-severity>error</error-severity>",
            self.error_type, self.tag
        );
        if let Some(app_tag) = self.app_tag {
            let _ = write!(out, "<error-app-tag>{}</error-app-tag>", app_tag);
        }
        let _ = write!(
            out,
            "<error-message xml:lang=\"en\">{}</error-message>",
            escape(self.message.as_str())
        );
        if let Some(info) = &self.info {
            let _ = write!(out, "<error-info>{}</error-info>", info);
        }
        out.push_str("</rpc-error>");
        out
    }
}

impl From<StoreError> for RpcError {
    fn from(err: StoreError) -> Self {
        RpcError::from_store(&err)
    }
}

pub type RpcResult<T> = Result<T, RpcError>;

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultOperation {
    Merge,
    Replace,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOption {
    TestThenSet,
    Set,
    TestOnly,
}

/// Selection made by a subtree filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub paths: Vec<DataPath>,
    pub statistics: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rpc {
    Get {
        filter: Option<Filter>,
    },
    GetConfig {
        source: Target,
        filter: Option<Filter>,
    },
    EditConfig {
        target: Target,
        test_option: TestOption,
        ops: Vec<EditOperation>,
    },
    Lock {
        target: Target,
    },
    Unlock {
        target: Target,
    },
    Commit,
    DiscardChanges,
    Validate {
        source: Target,
    },
    CloseSession,
    KillSession {
        session_id: u32,
    },
}

/// Parse the operation element inside `<rpc>`.
pub fn parse_operation(rpc: &Element) -> RpcResult<Rpc> {
    let op = match rpc.children.as_slice() {
        [op] => op,
        [] => return Err(RpcError::missing_element("operation")),
        _ => return Err(RpcError::malformed_message("rpc must contain exactly one operation")),
    };

    Ok(match op.name.as_str() {
        "get" => Rpc::Get {
            filter: parse_filter(op)?,
        },
        "get-config" => Rpc::GetConfig {
            source: datastore_ref(op, "source")?,
            filter: parse_filter(op)?,
        },
        "edit-config" => parse_edit_config(op)?,
        "lock" => Rpc::Lock {
            target: datastore_ref(op, "target")?,
        },
        "unlock" => Rpc::Unlock {
            target: datastore_ref(op, "target")?,
        },
        "commit" => {
            if op.child("confirmed").is_some() {
                return Err(RpcError::operation_not_supported("confirmed commit"));
            }
            Rpc::Commit
        }
        "discard-changes" => Rpc::DiscardChanges,
        "validate" => {
            let source = op.child("source").ok_or_else(|| RpcError::missing_element("source"))?;
            if source.child("config").is_some() {
                return Err(RpcError::operation_not_supported("inline config validation"));
            }
            Rpc::Validate {
                source: datastore_ref(op, "source")?,
            }
        }
        "close-session" => Rpc::CloseSession,
        "kill-session" => {
            let id = op
                .child("session-id")
                .ok_or_else(|| RpcError::missing_element("session-id"))?;
            let session_id = id
                .text()
                .parse()
                .map_err(|_| RpcError::invalid_value(format!("invalid session-id '{}'", id.text())))?;
            Rpc::KillSession { session_id }
        }
        other => return Err(RpcError::operation_not_supported(other)),
    })
}

fn datastore_ref(op: &Element, container: &str) -> RpcResult<Target> {
    let el = op
        .child(container)
        .ok_or_else(|| RpcError::missing_element(container))?;
    match el.only_child_name() {
        Some("running") => Ok(Target::Running),
        Some("candidate") => Ok(Target::Candidate),
        Some("startup") => Err(RpcError::operation_not_supported("startup datastore")),
        Some("url") => Err(RpcError::operation_not_supported("url datastore")),
        Some(other) => Err(RpcError::invalid_value(format!("unknown datastore '{}'", other))),
        None => Err(RpcError::missing_element(&format!("{} datastore", container))),
    }
}

fn parse_edit_config(op: &Element) -> RpcResult<Rpc> {
    let target = datastore_ref(op, "target")?;

    let default_operation = match op.child("default-operation").map(Element::text) {
        None | Some("merge") => DefaultOperation::Merge,
        Some("replace") => DefaultOperation::Replace,
        Some("none") => DefaultOperation::None,
        Some(other) => return Err(RpcError::invalid_value(format!("invalid default-operation '{}'", other))),
    };
    let test_option = match op.child("test-option").map(Element::text) {
        None | Some("test-then-set") => TestOption::TestThenSet,
        Some("set") => TestOption::Set,
        Some("test-only") => TestOption::TestOnly,
        Some(other) => return Err(RpcError::invalid_value(format!("invalid test-option '{}'", other))),
    };
    match op.child("error-option").map(Element::text) {
        None | Some("stop-on-error") | Some("rollback-on-error") => {}
        Some("continue-on-error") => return Err(RpcError::operation_not_supported("continue-on-error")),
        Some(other) => return Err(RpcError::invalid_value(format!("invalid error-option '{}'", other))),
    }

    if op.child("url").is_some() {
        return Err(RpcError::operation_not_supported("url config source"));
    }
    let config = op.child("config").ok_or_else(|| RpcError::missing_element("config"))?;
    let ops = config_to_ops(config, default_operation)?;
    Ok(Rpc::EditConfig {
        target,
        test_option,
        ops,
    })
}

fn operation_attr(el: &Element) -> RpcResult<Option<EditOp>> {
    el.attr("operation")
        .map(|op| op.parse::<EditOp>().map_err(|e| RpcError::from_store(&e)))
        .transpose()
}

/// Flatten a `<config>` element into an ordered edit batch.
///
/// Entries are list elements named after their collection (`<subscribers>`,
/// or the NF type inside `<network-functions>`). An entry's operation is its
/// own `operation` attribute, else the nearest ancestor's, else the default
/// operation; with default `none`, entries without one are left alone.
pub fn config_to_ops(config: &Element, default: DefaultOperation) -> RpcResult<Vec<EditOperation>> {
    let fallback = match default {
        DefaultOperation::Merge => Some(EditOp::Merge),
        DefaultOperation::Replace => Some(EditOp::Replace),
        DefaultOperation::None => None,
    };

    let mut ops = Vec::new();
    for top in &config.children {
        let inherited = operation_attr(top)?.or(fallback);
        let collection: Collection = top
            .name
            .parse()
            .map_err(|_| RpcError::unknown_element(&top.name))?;
        match collection {
            Collection::NetworkFunctions => {
                for group in &top.children {
                    let nf_type: NfType = group
                        .name
                        .parse()
                        .map_err(|_| RpcError::unknown_element(&group.name))?;
                    let inherited = operation_attr(group)?.or(inherited);
                    for entry in &group.children {
                        if entry.name != "network-function" {
                            return Err(RpcError::unknown_element(&entry.name));
                        }
                        if let Some(op) = entry_op(Collection::NetworkFunctions, Some(nf_type), entry, inherited)? {
                            ops.push(op);
                        }
                    }
                }
            }
            _ => {
                if let Some(op) = entry_op(collection, None, top, inherited)? {
                    ops.push(op);
                }
            }
        }
    }
    Ok(ops)
}

fn entry_op(
    collection: Collection,
    nf_type: Option<NfType>,
    entry: &Element,
    inherited: Option<EditOp>,
) -> RpcResult<Option<EditOperation>> {
    let Some(op) = operation_attr(entry)?.or(inherited) else {
        return Ok(None);
    };
    let key_leaf = collection.key_leaf();
    let id = match entry.child(key_leaf) {
        Some(leaf) if !leaf.text().is_empty() => leaf.text().to_string(),
        // A session created over NETCONF without an id gets a generated one.
        _ if collection == Collection::Sessions && matches!(op, EditOp::Create | EditOp::Merge | EditOp::Replace) => {
            Uuid::new_v4().to_string()
        }
        _ => return Err(RpcError::missing_element(key_leaf)),
    };
    let key = EntryKey::new(collection, nf_type, &id)?;
    let value = match op {
        EditOp::Delete | EditOp::Remove => None,
        _ => Some(element_to_json(entry)),
    };
    Ok(Some(EditOperation::new(key, op, value)))
}

/// Parse `<filter>`; `None` means no filter (select everything).
pub fn parse_filter(op: &Element) -> RpcResult<Option<Filter>> {
    let Some(filter) = op.child("filter") else {
        return Ok(None);
    };
    match filter.attr("type") {
        None | Some("subtree") => {}
        Some("xpath") => return Err(RpcError::operation_not_supported("xpath filter")),
        Some(other) => return Err(RpcError::invalid_value(format!("unknown filter type '{}'", other))),
    }

    let mut selected = Filter::default();
    for top in &filter.children {
        if top.name == "core-statistics" {
            selected.statistics = true;
            continue;
        }
        // Unknown nodes select nothing.
        let Ok(collection) = top.name.parse::<Collection>() else {
            continue;
        };
        match collection {
            Collection::NetworkFunctions if !top.children.is_empty() => {
                for group in &top.children {
                    let Ok(nf_type) = group.name.parse::<NfType>() else {
                        continue;
                    };
                    let keyed = group
                        .child("network-function")
                        .and_then(|e| e.child("id"))
                        .map(Element::text)
                        .filter(|id| !id.is_empty());
                    selected.paths.push(match keyed {
                        Some(id) => DataPath::Entry(EntryKey::NetworkFunction(nf_type, id.to_string())),
                        None => DataPath::NfType(nf_type),
                    });
                }
            }
            _ => {
                let keyed = top
                    .child(collection.key_leaf())
                    .map(Element::text)
                    .filter(|id| !id.is_empty());
                selected.paths.push(match keyed {
                    Some(id) => DataPath::Entry(EntryKey::new(collection, None, id)?),
                    None => DataPath::Collection(collection),
                });
            }
        }
    }
    Ok(Some(selected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netconf::xml::parse;
    use crate::store::ClientId;
    use serde_json::json;

    fn op(xml: &str) -> RpcResult<Rpc> {
        parse_operation(&parse(xml.as_bytes()).unwrap())
    }

    #[test]
    fn test_parse_simple_operations() {
        assert_eq!(
            op("<rpc><lock><target><candidate/></target></lock></rpc>").unwrap(),
            Rpc::Lock {
                target: Target::Candidate
            }
        );
        assert_eq!(op("<rpc><commit/></rpc>").unwrap(), Rpc::Commit);
        assert_eq!(
            op("<rpc><kill-session><session-id>4</session-id></kill-session></rpc>").unwrap(),
            Rpc::KillSession { session_id: 4 }
        );
        assert_eq!(
            op("<rpc><get-config><source><running/></source></get-config></rpc>").unwrap(),
            Rpc::GetConfig {
                source: Target::Running,
                filter: None
            }
        );
    }

    #[test]
    fn test_unknown_operation_and_missing_target() {
        assert_eq!(op("<rpc><reboot/></rpc>").unwrap_err().tag, "operation-not-supported");
        assert_eq!(op("<rpc><lock/></rpc>").unwrap_err().tag, "missing-element");
        assert_eq!(
            op("<rpc><lock><target><startup/></target></lock></rpc>").unwrap_err().tag,
            "operation-not-supported"
        );
    }

    #[test]
    fn test_edit_config_operation_inheritance() {
        let rpc = op(r#"<rpc><edit-config xmlns:nc="urn:ietf:params:xml:ns:netconf:base:1.0">
              <target><candidate/></target>
              <config>
                <network-functions>
                  <amf nc:operation="create">
                    <network-function><id>amf-2</id><admin-state>locked</admin-state></network-function>
                  </amf>
                </network-functions>
                <qos-profiles nc:operation="delete"><id>qos-9</id></qos-profiles>
                <subscribers><imsi>001010000000003</imsi><profile><qos-profile-id>qos-default</qos-profile-id></profile></subscribers>
              </config>
            </edit-config></rpc>"#)
        .unwrap();
        let Rpc::EditConfig { target, ops, .. } = rpc else {
            panic!("expected edit-config");
        };
        assert_eq!(target, Target::Candidate);
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].op, EditOp::Create);
        assert_eq!(
            ops[0].path,
            DataPath::Entry(EntryKey::NetworkFunction(NfType::Amf, "amf-2".into()))
        );
        assert_eq!(ops[0].value.as_ref().unwrap()["admin-state"], json!("locked"));
        assert_eq!(ops[1].op, EditOp::Delete);
        assert!(ops[1].value.is_none());
        assert_eq!(ops[2].op, EditOp::Merge);
    }

    #[test]
    fn test_default_operation_none_skips_unmarked_entries() {
        let rpc = op(r#"<rpc><edit-config>
              <target><running/></target>
              <default-operation>none</default-operation>
              <config>
                <qos-profiles><id>qos-1</id><priority>3</priority></qos-profiles>
                <qos-profiles operation="remove"><id>qos-2</id></qos-profiles>
              </config>
            </edit-config></rpc>"#)
        .unwrap();
        let Rpc::EditConfig { ops, .. } = rpc else {
            panic!("expected edit-config");
        };
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op, EditOp::Remove);
    }

    #[test]
    fn test_edit_config_rejections() {
        let base = |inner: &str| {
            op(&format!(
                "<rpc><edit-config><target><candidate/></target>{}</edit-config></rpc>",
                inner
            ))
            .unwrap_err()
        };
        assert_eq!(base("").tag, "missing-element");
        assert_eq!(
            base("<error-option>continue-on-error</error-option><config/>").tag,
            "operation-not-supported"
        );
        assert_eq!(base("<config><widgets><id>1</id></widgets></config>").tag, "unknown-element");
        assert_eq!(
            base("<config><subscribers><profile/></subscribers></config>").tag,
            "missing-element"
        );
        assert_eq!(
            base(r#"<config><subscribers operation="frobnicate"><imsi>1</imsi></subscribers></config>"#).tag,
            "invalid-value"
        );
    }

    #[test]
    fn test_subtree_filter() {
        let rpc = op("<rpc><get><filter type=\"subtree\">\
              <subscribers><imsi>001010000000001</imsi></subscribers>\
              <network-functions><smf/></network-functions>\
              <sessions/>\
              <core-statistics/>\
            </filter></get></rpc>")
        .unwrap();
        let Rpc::Get { filter: Some(filter) } = rpc else {
            panic!("expected filtered get");
        };
        assert!(filter.statistics);
        assert_eq!(
            filter.paths,
            vec![
                DataPath::Entry(EntryKey::Subscriber("001010000000001".into())),
                DataPath::NfType(NfType::Smf),
                DataPath::Collection(Collection::Sessions),
            ]
        );
        assert_eq!(
            op("<rpc><get><filter type=\"xpath\" select=\"/x\"/></get></rpc>").unwrap_err().tag,
            "operation-not-supported"
        );
    }

    #[test]
    fn test_lock_denied_carries_holder_session() {
        let err = RpcError::from_store(&StoreError::AlreadyLocked {
            holder: ClientId::netconf(12),
        });
        let xml = err.to_xml();
        assert!(xml.contains("<error-tag>lock-denied</error-tag>"));
        assert!(xml.contains("<error-info><session-id>12</session-id></error-info>"));

        let err = RpcError::from_store(&StoreError::AlreadyLocked {
            holder: ClientId::restconf(),
        });
        assert_eq!(err.info.as_deref(), Some("<session-id>0</session-id>"));
    }
}
