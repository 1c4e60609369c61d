//! In-process clustering runtime
//!
//! Binds the fixed cluster port, registers the local member and introduces
//! itself to every configured peer with a single JSON hello line. Peers that
//! answer are registered as members. There is no gossip, no failure detection
//! and no retry: membership grows only through these handshakes.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::bridge::JoinCallback;
use super::join::JoinConfiguration;
use super::runtime::{ClusterHandle, ClusterRuntime};
use crate::error::{BootstrapError, BootstrapResult};
use crate::types::MemberRecord;

/// Runtime that starts a [`LocalCluster`] on the ambient tokio runtime
#[derive(Debug, Clone, Default)]
pub struct LocalRuntime;

impl LocalRuntime {
    pub fn new() -> Self {
        Self
    }
}

impl ClusterRuntime for LocalRuntime {
    type Handle = LocalCluster;

    fn start_clustered_async(&self, config: JoinConfiguration, callback: JoinCallback<LocalCluster>) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                callback.fail(Some(format!("no async runtime to start on: {}", e)));
                return;
            }
        };
        runtime.spawn(async move {
            match LocalCluster::start(config).await {
                Ok(cluster) => callback.succeed(cluster),
                Err(e) => callback.fail(Some(e.to_string())),
            }
        });
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Hello {
    cluster: Option<String>,
    credential: Option<String>,
    unique_id: Uuid,
    hostname: String,
    port: u16,
}

/// Member registry shared by the accept loop, the dialers and readers
#[derive(Debug)]
struct Registry {
    members: RwLock<HashMap<Uuid, MemberRecord>>,
    quorum: usize,
    formed: AtomicBool,
}

impl Registry {
    fn new(local: MemberRecord, quorum: usize) -> Self {
        let mut members = HashMap::new();
        members.insert(local.unique_id, local);
        Self {
            members: RwLock::new(members),
            quorum,
            formed: AtomicBool::new(false),
        }
    }

    fn register(&self, member: MemberRecord) {
        let count = {
            let mut members = self.members.write();
            members.insert(member.unique_id, member.clone());
            members.len()
        };
        info!(
            member = %member.unique_id,
            host = %member.canonical_hostname,
            count,
            "member registered"
        );
        if count >= self.quorum && !self.formed.swap(true, Ordering::SeqCst) {
            info!(quorum = self.quorum, "cluster quorum reached");
        }
    }

    fn snapshot(&self) -> Vec<MemberRecord> {
        self.members.read().values().cloned().collect()
    }

    fn is_formed(&self) -> bool {
        self.members.read().len() >= self.quorum
    }
}

#[derive(Debug)]
struct Shared {
    hello: Hello,
    registry: Registry,
    running: AtomicBool,
    timeout: Duration,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl Shared {
    fn accepts(&self, hello: &Hello) -> bool {
        hello.credential == self.hello.credential && hello.unique_id != self.hello.unique_id
    }

    fn register_remote(&self, hello: Hello, ip_address: IpAddr) {
        self.registry.register(MemberRecord {
            canonical_hostname: hello.hostname,
            ip_address,
            port: hello.port,
            unique_id: hello.unique_id,
            is_local: false,
        });
    }

    /// Run `step` under the connection timeout
    async fn bounded<T>(&self, step: impl Future<Output = io::Result<T>>) -> io::Result<T> {
        tokio::time::timeout(self.timeout, step)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "handshake timed out"))?
    }
}

/// Handle to a running local cluster node
#[derive(Debug, Clone)]
pub struct LocalCluster {
    shared: Arc<Shared>,
}

impl LocalCluster {
    /// Bind the cluster port, then spawn the accept loop and one dialer per peer
    pub async fn start(config: JoinConfiguration) -> BootstrapResult<Self> {
        let listener = TcpListener::bind(("0.0.0.0", config.bind_port)).await?;
        let listen_port = listener.local_addr()?.port();

        let hostname = advertised_hostname(config.public_address.as_deref());
        let ip_address = resolve_ip(&hostname, listen_port).await;
        let unique_id = Uuid::new_v4();
        let local = MemberRecord {
            canonical_hostname: hostname.clone(),
            ip_address,
            port: listen_port,
            unique_id,
            is_local: true,
        };
        info!(%unique_id, host = %hostname, port = listen_port, "local member listening");

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let shared = Arc::new(Shared {
            hello: Hello {
                cluster: config.cluster_name.as_ref().map(|c| c.to_string()),
                credential: config.group_credential.clone(),
                unique_id,
                hostname,
                port: listen_port,
            },
            registry: Registry::new(local, config.quorum_size),
            running: AtomicBool::new(true),
            timeout: config.connection_timeout,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
        });

        tokio::spawn(accept_loop(listener, Arc::clone(&shared), shutdown_rx));

        for peer in &config.peer_addresses {
            if peer.trim().is_empty() {
                warn!("skipping peer without a public address");
                continue;
            }
            let (host, port) = split_host_port(peer, config.bind_port);
            if host == shared.hello.hostname && port == listen_port {
                continue;
            }
            let target = (host.to_string(), port);
            let dial_shared = Arc::clone(&shared);
            let peer = peer.clone();
            tokio::spawn(async move {
                match greet(&target.0, target.1, &dial_shared).await {
                    Ok(()) => debug!(peer = %peer, "handshake completed"),
                    Err(e) => warn!(peer = %peer, "peer unreachable: {}", e),
                }
            });
        }

        Ok(Self { shared })
    }

    /// Whether the member count has reached the configured quorum
    pub fn is_formed(&self) -> bool {
        self.shared.registry.is_formed()
    }
}

impl ClusterHandle for LocalCluster {
    fn members(&self) -> BootstrapResult<Vec<MemberRecord>> {
        if !self.shared.running.load(Ordering::SeqCst) {
            return Err(BootstrapError::RuntimeUnavailable(
                "local runtime has been shut down".to_string(),
            ));
        }
        Ok(self.shared.registry.snapshot())
    }

    fn local_id(&self) -> Uuid {
        self.shared.hello.unique_id
    }

    fn shutdown(&self) {
        if self.shared.running.swap(false, Ordering::SeqCst) {
            // Dropping the sender also ends the accept loop
            if let Some(shutdown_tx) = self.shared.shutdown_tx.lock().take() {
                let _ = shutdown_tx.try_send(());
            }
            info!("local runtime shut down");
        }
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>, mut shutdown_rx: mpsc::Receiver<()>) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            result = listener.accept() => match result {
                Ok((stream, addr)) => {
                    let shared = Arc::clone(&shared);
                    tokio::spawn(async move {
                        if let Err(e) = answer_hello(stream, addr, &shared).await {
                            debug!(peer = %addr, "inbound handshake failed: {}", e);
                        }
                    });
                }
                Err(e) => {
                    warn!("accept failed, listener stopped: {}", e);
                    break;
                }
            },
        }
    }
    debug!("accept loop stopped");
}

async fn answer_hello(stream: TcpStream, addr: SocketAddr, shared: &Shared) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let hello = shared.bounded(read_hello(&mut reader)).await?;
    if !shared.accepts(&hello) {
        warn!(peer = %addr, cluster = ?hello.cluster, "rejected hello with foreign credential");
        return Ok(());
    }
    shared.bounded(write_hello(&mut writer, &shared.hello)).await?;
    shared.register_remote(hello, addr.ip());
    Ok(())
}

async fn greet(host: &str, port: u16, shared: &Shared) -> io::Result<()> {
    let stream = shared.bounded(TcpStream::connect((host, port))).await?;
    let peer_ip = stream.peer_addr()?.ip();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    shared.bounded(write_hello(&mut writer, &shared.hello)).await?;
    let reply = shared.bounded(read_hello(&mut reader)).await?;
    if shared.accepts(&reply) {
        shared.register_remote(reply, peer_ip);
    }
    Ok(())
}

async fn read_hello<R: AsyncRead + Unpin>(reader: &mut BufReader<R>) -> io::Result<Hello> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed before hello"));
    }
    serde_json::from_str(line.trim()).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

async fn write_hello<W: AsyncWrite + Unpin>(writer: &mut W, hello: &Hello) -> io::Result<()> {
    let mut line = serde_json::to_vec(hello)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await
}

fn split_host_port(peer: &str, default_port: u16) -> (&str, u16) {
    let peer = peer.trim();
    if let Some((host, port)) = peer.rsplit_once(':') {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(port) = port.parse() {
            if !host.contains(':') || peer.starts_with('[') {
                return (host, port);
            }
        }
    }
    (peer, default_port)
}

fn advertised_hostname(public_address: Option<&str>) -> String {
    public_address
        .filter(|address| !address.trim().is_empty())
        .map(str::to_string)
        .or_else(|| std::env::var("HOSTNAME").ok().filter(|h| !h.is_empty()))
        .unwrap_or_else(|| "localhost".to_string())
}

async fn resolve_ip(hostname: &str, port: u16) -> IpAddr {
    lookup_host((hostname, port))
        .await
        .ok()
        .and_then(|mut addrs| addrs.next())
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MeshConfig;
    use crate::types::ClusterName;
    use tokio::time::Instant;

    fn free_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn loopback_config(cluster: &str, port: u16, peers: Vec<String>) -> JoinConfiguration {
        JoinConfiguration {
            cluster_name: Some(ClusterName::new(cluster)),
            group_credential: Some(cluster.to_string()),
            quorum_size: 2,
            bind_port: port,
            public_address: Some("127.0.0.1".to_string()),
            peer_addresses: peers,
            multicast_enabled: false,
            connection_timeout: Duration::from_secs(2),
        }
    }

    async fn wait_for_members(cluster: &LocalCluster, count: usize) -> Vec<MemberRecord> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let members = cluster.members().unwrap();
            if members.len() >= count || Instant::now() > deadline {
                return members;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("node-1.example.com", 5701), ("node-1.example.com", 5701));
        assert_eq!(split_host_port("10.0.0.1:6000", 5701), ("10.0.0.1", 6000));
        assert_eq!(split_host_port("[::1]:6000", 5701), ("::1", 6000));
        assert_eq!(split_host_port("::1", 5701), ("::1", 5701));
    }

    #[tokio::test]
    async fn test_standalone_node_lists_itself() {
        let config = JoinConfiguration::standalone(&MeshConfig {
            bind_port: free_port(),
            ..MeshConfig::default()
        });
        let cluster = LocalCluster::start(config).await.unwrap();

        let members = cluster.members().unwrap();
        assert_eq!(members.len(), 1);
        assert!(members[0].is_local);
        assert_eq!(members[0].unique_id, cluster.local_id());
        assert!(!cluster.is_formed());

        cluster.shutdown();
        assert!(cluster.members().is_err());
    }

    #[tokio::test]
    async fn test_two_nodes_handshake() {
        let (port_a, port_b) = (free_port(), free_port());
        let peers = vec![format!("127.0.0.1:{}", port_a), format!("127.0.0.1:{}", port_b)];

        let a = LocalCluster::start(loopback_config("alpha", port_a, peers.clone())).await.unwrap();
        let b = LocalCluster::start(loopback_config("alpha", port_b, peers)).await.unwrap();

        let seen_by_a = wait_for_members(&a, 2).await;
        let seen_by_b = wait_for_members(&b, 2).await;
        assert_eq!(seen_by_a.len(), 2);
        assert_eq!(seen_by_b.len(), 2);
        assert!(a.is_formed() && b.is_formed());
        assert_eq!(seen_by_a.iter().filter(|m| m.is_local).count(), 1);

        a.shutdown();
        b.shutdown();
    }

    #[tokio::test]
    async fn test_silent_client_does_not_stall_other_handshakes() {
        let (port_a, port_b) = (free_port(), free_port());
        let mut slow = loopback_config("alpha", port_a, vec![]);
        slow.connection_timeout = Duration::from_secs(20);
        let a = LocalCluster::start(slow).await.unwrap();

        // Connects and never says hello
        let _silent = TcpStream::connect(("127.0.0.1", port_a)).await.unwrap();

        let started = Instant::now();
        let b = LocalCluster::start(loopback_config(
            "alpha",
            port_b,
            vec![format!("127.0.0.1:{}", port_a)],
        ))
        .await
        .unwrap();

        assert_eq!(wait_for_members(&a, 2).await.len(), 2);
        assert_eq!(wait_for_members(&b, 2).await.len(), 2);
        assert!(started.elapsed() < Duration::from_secs(5));

        a.shutdown();
        b.shutdown();
    }

    #[tokio::test]
    async fn test_foreign_credential_is_rejected() {
        let (port_a, port_b) = (free_port(), free_port());

        let a = LocalCluster::start(loopback_config("alpha", port_a, vec![])).await.unwrap();
        let b = LocalCluster::start(loopback_config(
            "beta",
            port_b,
            vec![format!("127.0.0.1:{}", port_a)],
        ))
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(a.members().unwrap().len(), 1);
        assert_eq!(b.members().unwrap().len(), 1);

        a.shutdown();
        b.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_releases_port() {
        let port = free_port();
        let cluster = LocalCluster::start(loopback_config("alpha", port, vec![])).await.unwrap();
        cluster.shutdown();

        let deadline = Instant::now() + Duration::from_secs(5);
        let rebound = loop {
            match LocalCluster::start(loopback_config("alpha", port, vec![])).await {
                Ok(cluster) => break Some(cluster),
                Err(_) if Instant::now() < deadline => {
                    tokio::time::sleep(Duration::from_millis(20)).await
                }
                Err(_) => break None,
            }
        };
        let rebound = rebound.expect("port was not released after shutdown");
        rebound.shutdown();
    }

    #[tokio::test]
    async fn test_port_clash_fails_join() {
        let holder = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let port = holder.local_addr().unwrap().port();

        let result = LocalCluster::start(loopback_config("alpha", port, vec![])).await;
        assert!(matches!(result, Err(BootstrapError::Io(_))));
    }

    #[test]
    fn test_join_without_async_runtime_fails_with_cause() {
        let config = loopback_config("alpha", free_port(), vec![]);
        let err = crate::cluster::StartupBridge::join(&LocalRuntime::new(), config).unwrap_err();
        match err {
            BootstrapError::JoinFailed { cause } => {
                assert!(cause.unwrap().contains("no async runtime"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
