//! Shared test utilities for mgmtd integration tests.

#![allow(dead_code)]

use mgmtd::config::MgmtConfig;
use mgmtd::rest::{AppState, create_router};
use mgmtd::seed::demo_tree;
use mgmtd::snmp::{Message, Oid, Pdu, PduType, Value as SnmpValue, VarBind, Version};
use mgmtd::{DataStore, Datastore, NetconfServer, SnmpAgent};
use reqwest::{Client, Response as ReqwestResponse};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::watch;

const EOM: &str = "]]>]]>";

/// All three front ends over one seeded datastore, on ephemeral ports.
pub struct TestServer {
    pub rest_addr: SocketAddr,
    pub netconf_addr: SocketAddr,
    pub snmp_addr: SocketAddr,
    pub client: Client,
    pub store: Arc<Datastore>,
    shutdown_tx: watch::Sender<bool>,
    request_id: AtomicI64,
}

impl TestServer {
    /// Spawn a server seeded with the demo inventory and no simulator.
    pub async fn spawn() -> Self {
        let config = MgmtConfig::default();
        let datastore = Arc::new(Datastore::new(demo_tree()));
        let store: Arc<dyn DataStore> = datastore.clone();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Bind to port 0 to let the OS choose available ports
        let rest_listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
        let rest_addr = rest_listener.local_addr().unwrap();
        let router = create_router(Arc::new(AppState { store: store.clone() }));
        let mut rest_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            axum::serve(rest_listener, router)
                .with_graceful_shutdown(async move {
                    rest_shutdown.changed().await.ok();
                })
                .await
                .expect("Server error");
        });

        let netconf_listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
        let netconf_addr = netconf_listener.local_addr().unwrap();
        let netconf = Arc::new(NetconfServer::new(store.clone(), config.netconf.clone()));
        tokio::spawn(netconf.serve(netconf_listener, shutdown_rx.clone()));

        let snmp_socket = UdpSocket::bind("127.0.0.1:0").await.expect("Failed to bind");
        let snmp_addr = snmp_socket.local_addr().unwrap();
        let agent = Arc::new(SnmpAgent::new(store.clone(), config.snmp.clone()));
        tokio::spawn(agent.serve(snmp_socket, shutdown_rx.clone()));

        // Small delay to ensure servers are ready
        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            rest_addr,
            netconf_addr,
            snmp_addr,
            client: Client::new(),
            store: datastore,
            shutdown_tx,
            request_id: AtomicI64::new(1),
        }
    }

    // -------------------------------------------------------------------------
    // RESTCONF
    // -------------------------------------------------------------------------

    /// Get base URL for the RESTCONF data resources.
    pub fn base_url(&self) -> String {
        format!("http://{}/restconf/data", self.rest_addr)
    }

    /// Perform a GET request.
    pub async fn get(&self, path: &str) -> ReqwestResponse {
        self.client
            .get(format!("{}{}", self.base_url(), path))
            .send()
            .await
            .expect("Request failed")
    }

    /// Perform a GET request on a path outside `/restconf/data`.
    pub async fn get_raw(&self, path: &str) -> ReqwestResponse {
        self.client
            .get(format!("http://{}{}", self.rest_addr, path))
            .send()
            .await
            .expect("Request failed")
    }

    /// Perform a POST request with JSON body.
    pub async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> ReqwestResponse {
        self.client
            .post(format!("{}{}", self.base_url(), path))
            .json(body)
            .send()
            .await
            .expect("Request failed")
    }

    /// Perform a PUT request with JSON body.
    pub async fn put_json<T: Serialize>(&self, path: &str, body: &T) -> ReqwestResponse {
        self.client
            .put(format!("{}{}", self.base_url(), path))
            .json(body)
            .send()
            .await
            .expect("Request failed")
    }

    /// Perform a PATCH request with JSON body.
    pub async fn patch_json<T: Serialize>(&self, path: &str, body: &T) -> ReqwestResponse {
        self.client
            .patch(format!("{}{}", self.base_url(), path))
            .json(body)
            .send()
            .await
            .expect("Request failed")
    }

    /// Perform a DELETE request.
    pub async fn delete(&self, path: &str) -> ReqwestResponse {
        self.client
            .delete(format!("{}{}", self.base_url(), path))
            .send()
            .await
            .expect("Request failed")
    }

    // -------------------------------------------------------------------------
    // NETCONF
    // -------------------------------------------------------------------------

    /// Connect and read the server hello without answering it.
    pub async fn netconf_connect(&self) -> NetconfClient {
        let stream = TcpStream::connect(self.netconf_addr).await.expect("Failed to connect");
        let mut client = NetconfClient {
            stream,
            buf: Vec::new(),
            session_id: 0,
            next_message_id: 1,
        };
        let hello = client.recv().await.expect("No server hello");
        client.session_id = between(&hello, "<session-id>", "</session-id>")
            .and_then(|s| s.parse().ok())
            .expect("Server hello without session-id");
        client
    }

    /// Open a NETCONF session and complete the base:1.0 hello exchange.
    pub async fn netconf(&self) -> NetconfClient {
        let mut client = self.netconf_connect().await;
        client
            .send(
                "<hello xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\"><capabilities>\
                 <capability>urn:ietf:params:netconf:base:1.0</capability></capabilities></hello>",
            )
            .await;
        client
    }

    // -------------------------------------------------------------------------
    // SNMP
    // -------------------------------------------------------------------------

    /// Send one SNMP request and wait for the response.
    pub async fn snmp(
        &self,
        version: Version,
        community: &str,
        pdu_type: PduType,
        oids: &[&str],
        values: Vec<SnmpValue>,
    ) -> Option<Message> {
        let varbinds = oids
            .iter()
            .enumerate()
            .map(|(i, oid)| {
                let value = values.get(i).cloned().unwrap_or(SnmpValue::Null);
                VarBind::new(oid.parse::<Oid>().unwrap(), value)
            })
            .collect();
        self.snmp_pdu(version, community, Pdu {
            pdu_type,
            request_id: 0,
            error_status: 0,
            error_index: 0,
            varbinds,
        })
        .await
    }

    /// Send a prepared PDU (request-id is assigned here).
    pub async fn snmp_pdu(&self, version: Version, community: &str, mut pdu: Pdu) -> Option<Message> {
        pdu.request_id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let request = Message {
            version,
            community: community.as_bytes().to_vec(),
            pdu,
        };

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.send_to(&request.encode(), self.snmp_addr).await.unwrap();
        let mut buf = vec![0u8; 65_535];
        let len = tokio::time::timeout(Duration::from_millis(500), socket.recv(&mut buf))
            .await
            .ok()?
            .ok()?;
        let response = Message::decode(&buf[..len]).expect("Undecodable response");
        assert_eq!(response.pdu.request_id, request.pdu.request_id);
        Some(response)
    }

    /// SNMPv2c GET of a single OID with the read-only community.
    pub async fn snmp_get(&self, oid: &str) -> SnmpValue {
        let response = self
            .snmp(Version::V2c, "public", PduType::Get, &[oid], Vec::new())
            .await
            .expect("No SNMP response");
        response.pdu.varbinds[0].value.clone()
    }

    /// Shutdown all front ends.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Minimal NETCONF client speaking end-of-message framing.
pub struct NetconfClient {
    stream: TcpStream,
    buf: Vec<u8>,
    pub session_id: u32,
    next_message_id: u32,
}

impl NetconfClient {
    pub async fn send(&mut self, msg: &str) {
        self.stream.write_all(msg.as_bytes()).await.unwrap();
        self.stream.write_all(EOM.as_bytes()).await.unwrap();
    }

    /// Next framed message, or `None` once the server closed the connection.
    pub async fn recv(&mut self) -> Option<String> {
        loop {
            if let Some(end) = self.buf.windows(EOM.len()).position(|w| w == EOM.as_bytes()) {
                let msg = String::from_utf8(self.buf[..end].to_vec()).unwrap();
                self.buf.drain(..end + EOM.len());
                return Some(msg);
            }
            let mut chunk = [0u8; 4096];
            let n = tokio::time::timeout(Duration::from_secs(2), self.stream.read(&mut chunk))
                .await
                .expect("NETCONF read timed out")
                .ok()?;
            if n == 0 {
                return None;
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Send `<rpc>` wrapping `body` and return the reply.
    pub async fn rpc(&mut self, body: &str) -> String {
        let id = self.next_message_id;
        self.next_message_id += 1;
        self.send(&format!(
            "<rpc message-id=\"{}\" xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\">{}</rpc>",
            id, body
        ))
        .await;
        self.recv().await.expect("Connection closed before reply")
    }

    /// Drop the TCP connection without `close-session` and wait until the
    /// server has torn the session down.
    pub async fn disconnect(mut self) {
        let _ = self.stream.shutdown().await;
        while self.recv().await.is_some() {}
    }
}

/// Text between the first `open` and the following `close`.
pub fn between<'a>(haystack: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = haystack.find(open)? + open.len();
    let end = haystack[start..].find(close)? + start;
    Some(&haystack[start..end])
}
