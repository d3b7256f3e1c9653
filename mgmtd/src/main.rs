use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mgmtd::audit::start_audit_listener;
use mgmtd::config::{MgmtConfig, NetconfConfig, RestconfConfig, SnmpConfig};
use mgmtd::model::ConfigTree;
use mgmtd::rest::{AppState, create_router};
use mgmtd::seed::demo_tree;
use mgmtd::simulator::start_simulator;
use mgmtd::snmp::Oid;
use mgmtd::{DataStore, Datastore, NetconfServer, SnmpAgent};

#[derive(Parser)]
#[command(name = "mgmtd")]
#[command(about = "5G core management plane - NETCONF, RESTCONF and SNMP over one shared datastore")]
struct Args {
    /// Listen address for NETCONF (TCP)
    #[arg(long, default_value = "0.0.0.0:2022")]
    netconf_listen: SocketAddr,

    /// Listen address for RESTCONF (HTTP)
    #[arg(long, default_value = "0.0.0.0:830")]
    restconf_listen: SocketAddr,

    /// Listen address for the SNMP agent (UDP)
    #[arg(long, default_value = "0.0.0.0:161")]
    snmp_listen: SocketAddr,

    /// Read-only SNMP community (can be repeated)
    #[arg(long, default_values_t = vec!["public".to_string()])]
    ro_community: Vec<String>,

    /// Read-write SNMP community (can be repeated)
    #[arg(long, default_values_t = vec!["private".to_string()])]
    rw_community: Vec<String>,

    /// Root OID of the management subtree
    #[arg(long, default_value = "1.3.6.1.4.1.53864.5")]
    mib_base: Oid,

    /// sysName reported over SNMP
    #[arg(long, default_value = "mgmtd")]
    sys_name: String,

    /// Close NETCONF sessions idle for this many seconds
    #[arg(long, default_value_t = 600)]
    netconf_idle_timeout_secs: u64,

    /// Close NETCONF sessions that send no hello within this many seconds
    #[arg(long, default_value_t = 30)]
    hello_timeout_secs: u64,

    /// Operational-state simulation period in seconds (0 disables)
    #[arg(long, default_value_t = 5)]
    simulate_interval_secs: u64,

    /// Start with an empty datastore instead of the demo inventory
    #[arg(long)]
    no_seed: bool,
}

impl From<Args> for MgmtConfig {
    fn from(args: Args) -> Self {
        let defaults = MgmtConfig::default();
        MgmtConfig {
            netconf: NetconfConfig {
                listen: args.netconf_listen,
                idle_timeout: Duration::from_secs(args.netconf_idle_timeout_secs),
                hello_timeout: Duration::from_secs(args.hello_timeout_secs),
            },
            restconf: RestconfConfig {
                listen: args.restconf_listen,
            },
            snmp: SnmpConfig {
                listen: args.snmp_listen,
                ro_communities: args.ro_community,
                rw_communities: args.rw_community,
                mib_base: args.mib_base,
                sys_name: args.sys_name,
                ..defaults.snmp
            },
            simulate_interval: (args.simulate_interval_secs > 0)
                .then(|| Duration::from_secs(args.simulate_interval_secs)),
            seed: !args.no_seed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("mgmtd=info".parse()?))
        .init();

    let config: MgmtConfig = Args::parse().into();

    info!(
        "Starting mgmtd - NETCONF: {}, RESTCONF: {}, SNMP: {}",
        config.netconf.listen, config.restconf.listen, config.snmp.listen
    );

    let seed = if config.seed { demo_tree() } else { ConfigTree::default() };
    let datastore = Arc::new(Datastore::new(seed));
    let store: Arc<dyn DataStore> = datastore.clone();

    let audit_handle = start_audit_listener(store.subscribe());

    // Bind everything before spawning so a port clash fails startup
    let netconf_listener = TcpListener::bind(config.netconf.listen).await?;
    let restconf_listener = TcpListener::bind(config.restconf.listen).await?;
    let snmp_socket = UdpSocket::bind(config.snmp.listen).await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // Spawn NETCONF server
    let netconf = Arc::new(NetconfServer::new(store.clone(), config.netconf.clone()));
    let netconf_handle = tokio::spawn(netconf.serve(netconf_listener, shutdown_rx.clone()));

    // Spawn RESTCONF server
    let router = create_router(Arc::new(AppState { store: store.clone() }));
    let mut rest_shutdown = shutdown_rx.clone();
    let rest_handle = tokio::spawn(async move {
        info!("RESTCONF listening on {}", restconf_listener.local_addr()?);
        axum::serve(restconf_listener, router)
            .with_graceful_shutdown(async move {
                rest_shutdown.changed().await.ok();
            })
            .await
    });

    // Spawn SNMP agent
    let agent = Arc::new(SnmpAgent::new(store.clone(), config.snmp.clone()));
    let snmp_handle = tokio::spawn(agent.serve(snmp_socket, shutdown_rx.clone()));

    let simulator_handle = config
        .simulate_interval
        .map(|period| start_simulator(store.clone(), period, shutdown_rx.clone()));

    // Wait for shutdown signal
    let ctrl_c = signal::ctrl_c();
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = sigterm.recv() => info!("Received SIGTERM"),
    }

    // Refuse new writes, then stop the listeners
    datastore.stop();
    let _ = shutdown_tx.send(true);

    for (name, handle) in [("NETCONF", netconf_handle), ("RESTCONF", rest_handle), ("SNMP", snmp_handle)] {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("{} server exited with error: {}", name, e),
            Err(e) => warn!("{} server task failed: {}", name, e),
        }
    }
    if let Some(handle) = simulator_handle {
        let _ = handle.await;
    }
    audit_handle.abort();

    info!("Shutdown complete");
    Ok(())
}
