//! SNMP agent (v1/v2c over UDP).
//!
//! Every request is answered from a fresh MIB view derived from the running
//! tree. SET is accepted only on the NF-type admin-state column and becomes a
//! single `apply_direct` batch.

mod ber;
mod mib;
mod oid;
mod pdu;

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde_json::json;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::SnmpConfig;
use crate::errmap;
use crate::metrics::CoreStatistics;
use crate::model::{AdminState, ConfigTree, NfType};
use crate::store::{ClientId, DataStore, EditOp, EditOperation, EntryKey, Target};

pub use ber::{BerError, BerResult};
pub use mib::MibView;
pub use oid::Oid;
pub use pdu::{ErrorStatus, Message, Pdu, PduType, Value, VarBind, Version};

const MAX_DATAGRAM: usize = 65_535;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    ReadOnly,
    ReadWrite,
}

pub struct SnmpAgent {
    store: Arc<dyn DataStore>,
    config: SnmpConfig,
    started: Instant,
}

impl SnmpAgent {
    pub fn new(store: Arc<dyn DataStore>, config: SnmpConfig) -> Self {
        Self {
            store,
            config,
            started: Instant::now(),
        }
    }

    fn access(&self, community: &[u8]) -> Option<Access> {
        let matches = |list: &[String]| list.iter().any(|c| c.as_bytes() == community);
        if matches(&self.config.rw_communities) {
            Some(Access::ReadWrite)
        } else if matches(&self.config.ro_communities) {
            Some(Access::ReadOnly)
        } else {
            None
        }
    }

    fn view(&self) -> MibView {
        let snapshot = self.store.snapshot(Target::Running);
        let stats = CoreStatistics::derive(&snapshot.tree, snapshot.version);
        let ticks = (self.started.elapsed().as_millis() / 10) as u32;
        MibView::build(&self.config.mib_base, &self.config.sys_name, ticks, &stats)
    }

    /// Handle one request datagram. `None` means no reply is sent.
    pub fn handle_datagram(&self, data: &[u8], peer: SocketAddr) -> Option<Bytes> {
        let request = match Message::decode(data) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(%peer, "Dropping undecodable SNMP message: {}", e);
                return None;
            }
        };

        let Some(access) = self.access(&request.community) else {
            warn!(%peer, "SNMP request with unknown community dropped");
            return None;
        };

        let version = request.version;
        let pdu = &request.pdu;
        let response = match (pdu.pdu_type, version) {
            (PduType::Get, _) => self.get(pdu, version),
            (PduType::GetNext, _) => self.get_next(pdu, version),
            (PduType::GetBulk, Version::V2c) => self.get_bulk(pdu),
            (PduType::Set, _) => self.set(pdu, version, access, peer),
            (pdu_type, _) => {
                debug!(%peer, ?pdu_type, ?version, "Ignoring unsupported SNMP PDU");
                return None;
            }
        };

        let mut reply = Message {
            version,
            community: request.community.clone(),
            pdu: response,
        };
        let mut encoded = reply.encode();
        if encoded.len() > self.config.max_message_size {
            if pdu.pdu_type == PduType::GetBulk {
                while encoded.len() > self.config.max_message_size && reply.pdu.varbinds.pop().is_some() {
                    encoded = reply.encode();
                }
            } else {
                reply.pdu = Pdu::error(pdu.request_id, ErrorStatus::TooBig, 0, Vec::new());
                encoded = reply.encode();
            }
        }
        Some(encoded)
    }

    fn error(&self, pdu: &Pdu, version: Version, status: ErrorStatus, index: usize) -> Pdu {
        let status = match version {
            Version::V1 => status.to_v1(),
            Version::V2c => status,
        };
        Pdu::error(pdu.request_id, status, index, pdu.varbinds.clone())
    }

    fn get(&self, pdu: &Pdu, version: Version) -> Pdu {
        let view = self.view();
        let mut out = Vec::with_capacity(pdu.varbinds.len());
        for (i, vb) in pdu.varbinds.iter().enumerate() {
            let value = view.get(&vb.oid);
            if version == Version::V1 && value.is_exception() {
                return self.error(pdu, version, ErrorStatus::NoSuchName, i + 1);
            }
            out.push(VarBind::new(vb.oid.clone(), value));
        }
        Pdu::response(pdu.request_id, out)
    }

    fn get_next(&self, pdu: &Pdu, version: Version) -> Pdu {
        let view = self.view();
        let mut out = Vec::with_capacity(pdu.varbinds.len());
        for (i, vb) in pdu.varbinds.iter().enumerate() {
            match view.next(&vb.oid) {
                Some((oid, value)) => out.push(VarBind::new(oid, value)),
                None if version == Version::V1 => {
                    return self.error(pdu, version, ErrorStatus::NoSuchName, i + 1);
                }
                None => out.push(VarBind::new(vb.oid.clone(), Value::EndOfMibView)),
            }
        }
        Pdu::response(pdu.request_id, out)
    }

    fn get_bulk(&self, pdu: &Pdu) -> Pdu {
        let view = self.view();
        let n = pdu.non_repeaters().clamp(0, pdu.varbinds.len() as i64) as usize;
        let m = pdu.max_repetitions().clamp(0, self.config.max_repetitions as i64) as usize;
        let step = |oid: &Oid| match view.next(oid) {
            Some((next, value)) => VarBind::new(next, value),
            None => VarBind::new(oid.clone(), Value::EndOfMibView),
        };

        let (non_repeaters, repeaters) = pdu.varbinds.split_at(n);
        let mut out: Vec<VarBind> = non_repeaters.iter().map(|vb| step(&vb.oid)).collect();

        let mut cursors: Vec<Oid> = repeaters.iter().map(|vb| vb.oid.clone()).collect();
        for _ in 0..m {
            if cursors.is_empty() {
                break;
            }
            let row: Vec<VarBind> = cursors.iter().map(|oid| step(oid)).collect();
            let exhausted = row.iter().all(|vb| vb.value == Value::EndOfMibView);
            cursors = row.iter().map(|vb| vb.oid.clone()).collect();
            out.extend(row);
            if exhausted {
                break;
            }
        }
        Pdu::response(pdu.request_id, out)
    }

    fn set(&self, pdu: &Pdu, version: Version, access: Access, peer: SocketAddr) -> Pdu {
        if access != Access::ReadWrite {
            let status = match version {
                Version::V1 => ErrorStatus::ReadOnly,
                Version::V2c => ErrorStatus::NoAccess,
            };
            return Pdu::error(pdu.request_id, status, 1, pdu.varbinds.clone());
        }

        // Validate every binding before touching the store.
        let view = self.view();
        let mut wanted: BTreeMap<NfType, AdminState> = BTreeMap::new();
        for (i, vb) in pdu.varbinds.iter().enumerate() {
            let Some(nf_type) = view.admin_state_target(&vb.oid) else {
                return self.error(pdu, version, ErrorStatus::NotWritable, i + 1);
            };
            match MibView::admin_state_value(&vb.value) {
                Ok(state) => {
                    wanted.insert(nf_type, state);
                }
                Err(status) => return self.error(pdu, version, status, i + 1),
            }
        }

        // Expand to per-NF edits against the tree the write is applied to.
        let derive = |tree: &ConfigTree| -> Vec<EditOperation> {
            wanted
                .iter()
                .flat_map(|(&nf_type, &state)| {
                    tree.list_network_functions_by_type(nf_type).map(move |nf| {
                        EditOperation::new(
                            EntryKey::NetworkFunction(nf_type, nf.id.clone()),
                            EditOp::Merge,
                            Some(json!({ "admin-state": state })),
                        )
                    })
                })
                .collect()
        };

        if let Err(e) = self.store.apply_direct_with(&ClientId::snmp(peer), &derive) {
            debug!(%peer, "SNMP SET rejected: {}", e);
            return self.error(pdu, version, errmap::for_error(&e).snmp_status, 1);
        }
        Pdu::response(pdu.request_id, pdu.varbinds.clone())
    }

    /// Serve requests until shutdown; each datagram is handled on its own task.
    pub async fn serve(self: Arc<Self>, socket: UdpSocket, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
        let socket = Arc::new(socket);
        info!("SNMP agent listening on {}", socket.local_addr()?);
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                received = socket.recv_from(&mut buf) => {
                    let (len, peer) = match received {
                        Ok(r) => r,
                        Err(e) => {
                            warn!("SNMP receive failed: {}", e);
                            continue;
                        }
                    };
                    let data = buf[..len].to_vec();
                    let agent = Arc::clone(&self);
                    let socket = Arc::clone(&socket);
                    tokio::spawn(async move {
                        if let Some(reply) = agent.handle_datagram(&data, peer)
                            && let Err(e) = socket.send_to(&reply, peer).await
                        {
                            warn!(%peer, "SNMP send failed: {}", e);
                        }
                    });
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("SNMP agent stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MgmtConfig;
    use crate::model::OperState;
    use crate::seed::demo_tree;
    use crate::store::{ConfigEditor, Datastore, LockManager, TreeReader};

    fn agent() -> (Arc<Datastore>, SnmpAgent) {
        let store = Arc::new(Datastore::new(demo_tree()));
        let agent = SnmpAgent::new(store.clone(), MgmtConfig::default().snmp);
        (store, agent)
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn oid(s: &str) -> Oid {
        s.parse().unwrap()
    }

    fn request(version: Version, community: &str, pdu_type: PduType, varbinds: Vec<VarBind>) -> Vec<u8> {
        Message {
            version,
            community: community.as_bytes().to_vec(),
            pdu: Pdu {
                pdu_type,
                request_id: 42,
                error_status: 0,
                error_index: 0,
                varbinds,
            },
        }
        .encode()
        .to_vec()
    }

    fn null(s: &str) -> VarBind {
        VarBind::new(oid(s), Value::Null)
    }

    fn exchange(agent: &SnmpAgent, data: Vec<u8>) -> Pdu {
        let reply = agent.handle_datagram(&data, peer()).unwrap();
        Message::decode(&reply).unwrap().pdu
    }

    #[test]
    fn test_get_summary_scalar() {
        let (_, agent) = agent();
        let pdu = exchange(
            &agent,
            request(Version::V2c, "public", PduType::Get, vec![null("1.3.6.1.4.1.53864.5.1.4.0")]),
        );
        assert_eq!(pdu.pdu_type, PduType::Response);
        assert_eq!(pdu.request_id, 42);
        assert_eq!(pdu.varbinds[0].value, Value::Gauge32(1));
    }

    #[test]
    fn test_unknown_community_is_dropped() {
        let (_, agent) = agent();
        let data = request(Version::V2c, "guess", PduType::Get, vec![null("1.3.6.1.2.1.1.5.0")]);
        assert!(agent.handle_datagram(&data, peer()).is_none());
        assert!(agent.handle_datagram(&[0x30, 0x01], peer()).is_none());
    }

    #[test]
    fn test_v1_missing_object_is_no_such_name() {
        let (_, agent) = agent();
        let pdu = exchange(
            &agent,
            request(
                Version::V1,
                "public",
                PduType::Get,
                vec![null("1.3.6.1.2.1.1.5.0"), null("1.3.6.1.4.1.99.1.0")],
            ),
        );
        assert_eq!(pdu.error_status, ErrorStatus::NoSuchName.code());
        assert_eq!(pdu.error_index, 2);
    }

    #[test]
    fn test_get_next_past_end() {
        let (_, agent) = agent();
        let pdu = exchange(
            &agent,
            request(Version::V2c, "public", PduType::GetNext, vec![null("1.3.6.1.4.1.53864.6")]),
        );
        assert_eq!(pdu.varbinds[0].value, Value::EndOfMibView);
    }

    #[test]
    fn test_get_bulk_walks_table_column() {
        let (_, agent) = agent();
        let mut data = Message {
            version: Version::V2c,
            community: b"public".to_vec(),
            pdu: Pdu {
                pdu_type: PduType::GetBulk,
                request_id: 1,
                error_status: 0,
                error_index: 3,
                varbinds: vec![null("1.3.6.1.4.1.53864.5.2.1.1")],
            },
        };
        let pdu = exchange(&agent, data.encode().to_vec());
        let names: Vec<_> = pdu.varbinds.iter().map(|vb| vb.value.clone()).collect();
        assert_eq!(names, vec![Value::string("AMF"), Value::string("SMF"), Value::string("UPF")]);

        // Repetitions are clamped and stop at the end of the view.
        data.pdu.error_index = 10_000;
        let pdu = exchange(&agent, data.encode().to_vec());
        assert_eq!(pdu.varbinds.last().unwrap().value, Value::EndOfMibView);
        assert!(pdu.varbinds.len() <= 64);
    }

    #[test]
    fn test_get_bulk_truncated_to_message_size() {
        let store = Arc::new(Datastore::new(demo_tree()));
        let mut config = MgmtConfig::default().snmp;
        config.max_message_size = 200;
        let agent = SnmpAgent::new(store, config);
        let data = Message {
            version: Version::V2c,
            community: b"public".to_vec(),
            pdu: Pdu {
                pdu_type: PduType::GetBulk,
                request_id: 1,
                error_status: 0,
                error_index: 64,
                varbinds: vec![null("1.3")],
            },
        }
        .encode();
        let reply = agent.handle_datagram(&data, peer()).unwrap();
        assert!(reply.len() <= 200);
        assert!(!Message::decode(&reply).unwrap().pdu.varbinds.is_empty());
    }

    #[test]
    fn test_set_admin_state_locks_every_nf_of_type() {
        let (store, agent) = agent();
        let pdu = exchange(
            &agent,
            request(
                Version::V2c,
                "private",
                PduType::Set,
                vec![VarBind::new(oid("1.3.6.1.4.1.53864.5.2.1.5.3"), Value::Integer(1))],
            ),
        );
        assert_eq!(pdu.error_status, 0);
        let running = store.snapshot(Target::Running);
        let upf = running.tree.get_network_function(NfType::Upf, "upf-1").unwrap();
        assert_eq!(upf.admin_state, AdminState::Locked);
        assert_eq!(upf.oper_state, OperState::Enabled);
    }

    #[test]
    fn test_set_rejections() {
        let (store, agent) = agent();
        let set = |community: &str, version, vb| exchange(&agent, request(version, community, PduType::Set, vec![vb]));

        let pdu = set("public", Version::V2c, VarBind::new(oid("1.3.6.1.4.1.53864.5.2.1.5.3"), Value::Integer(1)));
        assert_eq!(pdu.error_status, ErrorStatus::NoAccess.code());
        let pdu = set("public", Version::V1, VarBind::new(oid("1.3.6.1.4.1.53864.5.2.1.5.3"), Value::Integer(1)));
        assert_eq!(pdu.error_status, ErrorStatus::ReadOnly.code());

        let pdu = set("private", Version::V2c, VarBind::new(oid("1.3.6.1.2.1.1.5.0"), Value::string("x")));
        assert_eq!(pdu.error_status, ErrorStatus::NotWritable.code());
        let pdu = set("private", Version::V2c, VarBind::new(oid("1.3.6.1.4.1.53864.5.2.1.5.3"), Value::Integer(7)));
        assert_eq!(pdu.error_status, ErrorStatus::WrongValue.code());
        let pdu = set("private", Version::V1, VarBind::new(oid("1.3.6.1.4.1.53864.5.2.1.5.3"), Value::Null));
        assert_eq!(pdu.error_status, ErrorStatus::BadValue.code());

        assert_eq!(store.snapshot(Target::Running).version, 1);
    }

    #[test]
    fn test_set_does_not_recreate_deleted_nf() {
        let (store, agent) = agent();
        store
            .apply_direct(
                &ClientId::restconf(),
                vec![EditOperation::delete(EntryKey::NetworkFunction(NfType::Upf, "upf-1".into()))],
            )
            .unwrap();
        let version = store.snapshot(Target::Running).version;

        let pdu = exchange(
            &agent,
            request(
                Version::V2c,
                "private",
                PduType::Set,
                vec![VarBind::new(oid("1.3.6.1.4.1.53864.5.2.1.5.3"), Value::Integer(1))],
            ),
        );
        assert_eq!(pdu.error_status, 0);
        let running = store.snapshot(Target::Running);
        assert!(running.tree.get_network_function(NfType::Upf, "upf-1").is_none());
        assert_eq!(running.version, version);
    }

    #[test]
    fn test_set_blocked_by_running_lock() {
        let (store, agent) = agent();
        store.lock(Target::Running, &ClientId::netconf(1)).unwrap();
        let pdu = exchange(
            &agent,
            request(
                Version::V2c,
                "private",
                PduType::Set,
                vec![VarBind::new(oid("1.3.6.1.4.1.53864.5.2.1.5.1"), Value::Integer(1))],
            ),
        );
        assert_eq!(pdu.error_status, ErrorStatus::ResourceUnavailable.code());
    }
}
