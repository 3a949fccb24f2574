/*
  Controller - directory node of the relay overlay

  Owns the topology graph and the set of connected routers. Computes every
  router's route table and pushes it whenever membership changes.

  Per connection:
    Connecting ──auth frame──► Authenticated ──ping──► Alive (refreshed)
         │                          │
         └── bad/late auth: closed  └── EOF, error or heartbeat timeout ──► Disconnected

  Tasks:
    - accept loop: one handshake task per accepted socket (auth within auth_timeout)
    - reader task per authenticated router: pings refresh the heartbeat
    - heartbeat monitor: every check interval, evicts routers silent for longer
      than heartbeat_timeout and rebroadcasts once per sweep

  Joins, leaves and evictions each trigger a full rebroadcast of route tables.
  Tables are queued before the registry lock is released, so every router
  receives them in the order the membership changes happened.
*/

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};
use tracing::{debug, info, trace, warn};

use super::registry::Registry;
use crate::config::{ControllerConfig, EdgeConfig};
use crate::core_model::NodeRoutes;
use crate::core_router::transport::spawn_writer;
use crate::core_router::{frame_stream, next_frame, ControlFrame, FrameStream, PeerLink};
use crate::core_store::RouteStore;
use crate::core_topology::TopologyGraph;
use crate::error::{RelayError, RelayResult};
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;

pub struct Controller {
    shared: Arc<Shared>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

struct Shared {
    config: ControllerConfig,
    registry: Mutex<Registry>,
    next_conn_id: AtomicU64,
    local_addr: OnceLock<SocketAddr>,
    broadcasts: AtomicU64,
    shutdown: ShutdownCoordinator,
}

impl Controller {
    pub fn new(config: ControllerConfig) -> RelayResult<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry::new(config.edges.clone())),
                config,
                next_conn_id: AtomicU64::new(1),
                local_addr: OnceLock::new(),
                broadcasts: AtomicU64::new(0),
                shutdown: ShutdownCoordinator::new("controller"),
            }),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.local_addr.get().copied()
    }

    pub fn is_running(&self) -> bool {
        !self.shared.shutdown.is_shutting_down()
    }

    /// Bind the listen socket and start the accept loop and heartbeat monitor
    pub async fn start_server(&self) -> RelayResult<SocketAddr> {
        let shared = &self.shared;
        if shared.shutdown.is_shutting_down() {
            return Err(RelayError::Stopped);
        }

        let bind = shared.config.bind_address;
        let listener = TcpListener::bind(bind)
            .await
            .map_err(|e| RelayError::connection(format!("bind {}", bind), e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| RelayError::connection("local address", e))?;
        if shared.local_addr.set(addr).is_err() {
            return Err(RelayError::Connection(
                "controller is already serving".to_string(),
            ));
        }

        info!(addr = %addr, "Controller started");
        let mut tasks = self.tasks.lock().await;
        tasks.push(tokio::spawn(shared.clone().accept_loop(listener)));
        tasks.push(tokio::spawn(shared.clone().heartbeat_monitor()));
        Ok(addr)
    }

    /// Add a weighted edge; it is re-applied whenever either endpoint rejoins
    ///
    /// Routers are not notified until the next rebroadcast.
    pub async fn add_edge(&self, a: &str, b: &str, weight: i64) -> RelayResult<()> {
        self.shared
            .registry
            .lock()
            .await
            .add_edge(EdgeConfig::new(a, b, weight))?;
        Ok(())
    }

    pub async fn add_edges(&self, edges: &[EdgeConfig]) -> RelayResult<()> {
        let mut registry = self.shared.registry.lock().await;
        for edge in edges {
            registry.add_edge(edge.clone())?;
        }
        Ok(())
    }

    /// Snapshot of the current topology
    pub async fn graph(&self) -> TopologyGraph {
        self.shared.registry.lock().await.graph().clone()
    }

    pub async fn connected_nodes(&self) -> Vec<String> {
        self.shared.registry.lock().await.connected()
    }

    /// Recompute and push every connected router's table
    ///
    /// Returns how many tables were queued.
    pub async fn update_routes(&self) -> usize {
        self.shared.update_routes().await
    }

    /// Number of rebroadcasts performed so far
    pub fn broadcast_count(&self) -> u64 {
        self.shared.broadcasts.load(Ordering::SeqCst)
    }

    /// Write every node's route table into one snapshot file
    pub async fn export_routes(&self, store: &RouteStore) -> RelayResult<PathBuf> {
        let tables: Vec<NodeRoutes> = self.shared.registry.lock().await.graph().all_routes();
        Ok(store.store_all(&tables)?)
    }

    /// Close the listener and every router connection; later calls are no-ops
    pub async fn stop(&self) {
        if !self.shared.shutdown.trigger() {
            return;
        }
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        let links = self.shared.registry.lock().await.drain();
        for link in links {
            link.close();
        }
        metrics::connected_nodes(0);
        info!("Controller stopped");
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shared.shutdown.trigger();
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
        if let Ok(mut registry) = self.shared.registry.try_lock() {
            for link in registry.drain() {
                link.close();
            }
        }
    }
}

impl Shared {
    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.wait() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "Accepted connection");
                    tokio::spawn(self.clone().handshake(stream, peer));
                }
                Err(e) => {
                    if self.shutdown.is_shutting_down() {
                        break;
                    }
                    warn!(error = %e, "Failed to accept connection");
                }
            }
        }
        debug!("Accept loop exited");
    }

    /// Read the auth frame and register the router
    async fn handshake(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        let (read_half, write_half) = stream.into_split();
        let mut reader = frame_stream::<_, ControlFrame>(read_half, self.config.max_frame_size);

        let auth = timeout(self.config.auth_timeout, next_frame(&mut reader)).await;
        let mut node = match auth {
            Ok(Ok(Some(ControlFrame::Auth(node)))) if !node.name.is_empty() => node,
            Ok(Ok(Some(other))) => {
                warn!(peer = %peer, frame = ?other, "Expected an auth frame");
                metrics::frame_dropped("unexpected");
                return;
            }
            Ok(Ok(None)) => {
                debug!(peer = %peer, "Connection closed before auth");
                return;
            }
            Ok(Err(e)) => {
                warn!(peer = %peer, error = %e, "Invalid auth frame");
                metrics::frame_dropped(e.reason());
                return;
            }
            Err(_) => {
                warn!(peer = %peer, "No auth frame within {:?}", self.config.auth_timeout);
                return;
            }
        };
        if node.ip.is_empty() {
            node.ip = peer.ip().to_string();
        }

        let name = node.name.clone();
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let sender = spawn_writer(write_half, peer);

        let mut registry = self.registry.lock().await;
        if self.shutdown.is_shutting_down() {
            return;
        }
        // Spawned under the lock so the reader cannot unregister first.
        let reader_task = tokio::spawn(self.clone().read_loop(name.clone(), conn_id, reader));
        let link = PeerLink::new(conn_id, sender, reader_task.abort_handle());
        if let Some(previous) = registry.register(node, link, Instant::now()) {
            warn!(node = %name, old_conn = previous.conn_id, "Replacing existing connection");
            previous.close();
        }
        metrics::connected_nodes(registry.len());
        info!(node = %name, peer = %peer, conn_id, "Router authenticated");
        self.push_routes(&registry);
    }

    async fn read_loop(
        self: Arc<Self>,
        name: String,
        conn_id: u64,
        mut reader: FrameStream<OwnedReadHalf, ControlFrame>,
    ) {
        loop {
            match next_frame(&mut reader).await {
                Ok(Some(ControlFrame::Ping { name: pinged })) => {
                    if pinged != name {
                        warn!(node = %name, pinged = %pinged, "Ping names a different node");
                    }
                    let refreshed = self
                        .registry
                        .lock()
                        .await
                        .refresh(&name, conn_id, Instant::now());
                    if !refreshed {
                        debug!(node = %name, conn_id, "Ping on a superseded connection");
                        return;
                    }
                    trace!(node = %name, "Heartbeat");
                }
                Ok(Some(other)) => {
                    info!(node = %name, frame = ?other, "Ignoring frame from router");
                }
                Ok(None) => {
                    info!(node = %name, "Router closed the connection");
                    break;
                }
                Err(e) if e.is_fatal() => {
                    if !self.shutdown.is_shutting_down() {
                        warn!(node = %name, error = %e, "Router connection failed");
                    }
                    break;
                }
                Err(e) => {
                    warn!(node = %name, error = %e, "Dropped frame");
                    metrics::frame_dropped(e.reason());
                }
            }
        }
        self.disconnect(&name, conn_id).await;
    }

    async fn disconnect(&self, name: &str, conn_id: u64) {
        let mut registry = self.registry.lock().await;
        // Dropping the link closes its writer; the reader is this task.
        if registry.unregister(name, conn_id).is_none() {
            return;
        }
        metrics::connected_nodes(registry.len());
        warn!(node = %name, "Router disconnected");
        self.push_routes(&registry);
    }

    async fn heartbeat_monitor(self: Arc<Self>) {
        let mut ticker = interval(self.config.heartbeat_check_interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.wait() => break,
                _ = ticker.tick() => {}
            }

            let mut registry = self.registry.lock().await;
            let evicted = registry.sweep(Instant::now(), self.config.heartbeat_timeout);
            if evicted.is_empty() {
                continue;
            }
            metrics::connected_nodes(registry.len());
            for (name, link) in evicted {
                warn!(node = %name, "Router missed heartbeats, disconnecting");
                metrics::node_evicted();
                link.close();
            }
            self.push_routes(&registry);
        }
        debug!("Heartbeat monitor exited");
    }

    async fn update_routes(&self) -> usize {
        let registry = self.registry.lock().await;
        self.push_routes(&registry)
    }

    /// Queue each connected router's table; failures are per router
    ///
    /// Takes the locked registry so two membership changes can never push
    /// their tables out of order. Queueing never waits.
    fn push_routes(&self, registry: &Registry) -> usize {
        self.broadcasts.fetch_add(1, Ordering::SeqCst);

        let mut pushed = 0;
        for (name, sender, table) in registry.route_tables() {
            match sender.send(&ControlFrame::Routes(table)) {
                Ok(()) => pushed += 1,
                Err(e) => warn!(node = %name, error = %e, "Failed to push route table"),
            }
        }
        metrics::routes_pushed(pushed as u64);
        debug!(pushed, "Route tables pushed");
        pushed
    }
}
