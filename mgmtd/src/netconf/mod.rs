//! NETCONF server over TCP.
//!
//! One task per connection. Each task owns its transport and a [`Session`];
//! the only shared state is the datastore and the session registry.

mod framing;
mod rpc;
mod session;
mod xml;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::NetconfConfig;
use crate::store::DataStore;

pub use framing::{Decoder, Framing, FramingError, FramingResult, MAX_MESSAGE_SIZE, NetconfTransport};
pub use rpc::{BASE_NS, DATA_NS, RpcError};
pub use session::{BASE_1_0, BASE_1_1, Outcome, Phase, Session, SessionRegistry};
pub use xml::{Element, XmlError, XmlResult};

pub struct NetconfServer {
    store: Arc<dyn DataStore>,
    config: NetconfConfig,
    registry: Arc<SessionRegistry>,
}

impl NetconfServer {
    pub fn new(store: Arc<dyn DataStore>, config: NetconfConfig) -> Self {
        Self {
            store,
            config,
            registry: Arc::new(SessionRegistry::new()),
        }
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Accept connections until `shutdown` flips.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
        info!("NETCONF server listening on {}", listener.local_addr()?);
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(a) => a,
                        Err(e) => {
                            warn!("NETCONF accept failed: {}", e);
                            continue;
                        }
                    };
                    let server = Arc::clone(&self);
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        server.handle_connection(stream, peer, shutdown).await;
                    });
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("NETCONF server stopped");
        Ok(())
    }

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, mut shutdown: watch::Receiver<bool>) {
        let _ = stream.set_nodelay(true);
        let mut transport = NetconfTransport::new(stream);
        let mut session = Session::new(Arc::clone(&self.store), Arc::clone(&self.registry));
        let session_id = session.id();
        let kill = session.kill_signal();
        info!(session_id, %peer, "NETCONF session opened");

        if let Err(e) = transport.send(&session.hello_message()).await {
            warn!(session_id, %peer, "Failed to send hello: {}", e);
            return;
        }

        loop {
            let deadline = if session.phase() == Phase::Unauthenticated {
                self.config.hello_timeout
            } else {
                self.config.idle_timeout
            };

            let received = tokio::select! {
                r = read_with_timeout(&mut transport, deadline) => r,
                _ = kill.notified() => {
                    info!(session_id, "NETCONF session killed");
                    break;
                }
                _ = shutdown.changed() => break,
            };

            let msg = match received {
                Ok(Some(msg)) => msg,
                Ok(None) => {
                    debug!(session_id, "Peer closed connection");
                    break;
                }
                Err(ReadError::Timeout) => {
                    info!(session_id, ?deadline, "NETCONF session timed out");
                    break;
                }
                Err(ReadError::Framing(e)) => {
                    warn!(session_id, %peer, "NETCONF transport error: {}", e);
                    break;
                }
            };

            let was_unauthenticated = session.phase() == Phase::Unauthenticated;
            let outcome = session.handle_message(&msg);
            if was_unauthenticated && session.chunked() {
                transport.set_framing(Framing::Chunked);
            }

            match outcome {
                Outcome::None => {}
                Outcome::Reply(reply) => {
                    if let Err(e) = transport.send(&reply).await {
                        warn!(session_id, "Failed to send reply: {}", e);
                        break;
                    }
                }
                Outcome::ReplyAndClose(reply) => {
                    let _ = transport.send(&reply).await;
                    break;
                }
                Outcome::Close => break,
            }
        }

        // Dropping the session releases its locks; do it before the peer
        // can observe the close.
        drop(session);
        let _ = transport.shutdown().await;
        info!(session_id, %peer, "NETCONF session closed");
    }
}

enum ReadError {
    Timeout,
    Framing(FramingError),
}

async fn read_with_timeout(
    transport: &mut NetconfTransport<TcpStream>,
    deadline: Duration,
) -> Result<Option<bytes::Bytes>, ReadError> {
    match timeout(deadline, transport.recv()).await {
        Ok(r) => r.map_err(ReadError::Framing),
        Err(_) => Err(ReadError::Timeout),
    }
}
