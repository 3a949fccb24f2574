/*
  Router - one node of the relay overlay

  Plays both sides of the network:
    - server: a single listen port accepts local applications and peer routers,
      told apart by the frame `kind` (send / envelope)
    - client: a long-lived link to the controller (auth, pings, route tables)
      and one-shot connections to the next hop for every forwarded envelope

  Workflow:
    1. start_server()          binds the listen port and spawns the accept loop
    2. connect_to_controller() sends the auth frame (own node + public key),
                               then spawns the heartbeat and route listener tasks
    3. route tables pushed by the controller are written to routes_<name>.json
    4. send()/`send` frames    look up the stored route, seal an envelope for the
                               destination and hand it to the first hop
    5. envelope frames         run the forwarding decision: refuse, forward to the
                               next hop, or decrypt and deliver locally

  ┌──────────────┐  auth/ping   ┌────────────┐
  │    Router    │ ───────────► │ Controller │
  │              │ ◄─────────── │            │
  │  accept loop │   routes     └────────────┘
  │  conn tasks  │
  └──┬───────▲───┘
     │       │ envelope (fresh connection per hop)
     ▼       │
   next hop router
*/

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::forwarding::{self, Decision};
use super::frames::{ControlFrame, Delivery, RelayFrame, SendRequest};
use super::framing::{frame_stream, next_frame};
use super::transport::{dial, send_once, spawn_writer, write_frame, FrameSender, PeerLink};
use crate::config::RouterConfig;
use crate::core_crypto::RelayKeyPair;
use crate::core_model::{Envelope, Node, NodeRoutes, Route};
use crate::core_store::{ReceivedFiles, RouteStore};
use crate::error::{RelayError, RelayResult};
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;

/// Capacity of the in-process delivery channel
const DELIVERY_CHANNEL_CAPACITY: usize = 64;

pub struct Router {
    shared: Arc<Shared>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

struct Shared {
    config: RouterConfig,
    keys: RelayKeyPair,
    routes: RouteStore,
    received: ReceivedFiles,
    /// Every accepted connection, applications and peers alike
    connections: Mutex<HashMap<u64, PeerLink>>,
    next_conn_id: AtomicU64,
    local_addr: OnceLock<SocketAddr>,
    deliveries: broadcast::Sender<Delivery>,
    shutdown: ShutdownCoordinator,
}

impl Router {
    /// Create a router with a freshly generated key pair
    pub fn new(config: RouterConfig) -> RelayResult<Self> {
        let keys = RelayKeyPair::generate()?;
        Self::with_keys(config, keys)
    }

    /// Create a router around an existing key pair
    pub fn with_keys(config: RouterConfig, keys: RelayKeyPair) -> RelayResult<Self> {
        config.validate()?;
        let (deliveries, _) = broadcast::channel(DELIVERY_CHANNEL_CAPACITY);

        Ok(Self {
            shared: Arc::new(Shared {
                routes: RouteStore::new(&config.routes_dir),
                received: ReceivedFiles::new(&config.received_dir),
                config,
                keys,
                connections: Mutex::new(HashMap::new()),
                next_conn_id: AtomicU64::new(1),
                local_addr: OnceLock::new(),
                deliveries,
                shutdown: ShutdownCoordinator::new("router"),
            }),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Address of the listen socket once `start_server` has run
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.local_addr.get().copied()
    }

    pub fn public_key_pem(&self) -> RelayResult<String> {
        Ok(self.shared.keys.public_key_pem()?)
    }

    /// This router's node record, as announced to the controller
    pub fn node(&self) -> RelayResult<Node> {
        self.shared.node()
    }

    /// The route table currently stored for this router
    pub fn routes(&self) -> RelayResult<Option<NodeRoutes>> {
        Ok(self.shared.routes.load(&self.shared.config.name)?)
    }

    /// Stored route to `destination`, if one is known and reachable
    pub fn route_to(&self, destination: &str) -> RelayResult<Option<Route>> {
        Ok(self
            .shared
            .routes
            .route_to(&self.shared.config.name, destination)?
            .filter(Route::is_reachable))
    }

    /// Messages decrypted at this router
    pub fn subscribe(&self) -> broadcast::Receiver<Delivery> {
        self.shared.deliveries.subscribe()
    }

    /// Number of currently attached inbound connections
    pub async fn connection_count(&self) -> usize {
        self.shared.connections.lock().await.len()
    }

    pub fn is_running(&self) -> bool {
        !self.shared.shutdown.is_shutting_down()
    }

    /// Bind the listen socket and start accepting connections
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
            return Err(RelayError::Connection(format!(
                "router {} is already serving",
                shared.config.name
            )));
        }

        info!(node = %shared.config.name, addr = %addr, "Router server started");
        let task = tokio::spawn(shared.clone().accept_loop(listener));
        self.tasks.lock().await.push(task);
        Ok(addr)
    }

    /// Authenticate with the controller and start the heartbeat and route
    /// listener tasks
    pub async fn connect_to_controller(&self) -> RelayResult<()> {
        let shared = &self.shared;
        if shared.shutdown.is_shutting_down() {
            return Err(RelayError::Stopped);
        }

        let node = shared.node()?;
        let controller = &shared.config.controller_address;
        let mut stream = dial(controller, shared.config.connect_timeout).await?;
        write_frame(&mut stream, &ControlFrame::Auth(node)).await?;
        let peer = stream
            .peer_addr()
            .map_err(|e| RelayError::connection(format!("peer address of {}", controller), e))?;
        info!(node = %shared.config.name, controller = %peer, "Connected to controller");

        let (read_half, write_half) = stream.into_split();
        let sender = spawn_writer(write_half, peer);

        let mut tasks = self.tasks.lock().await;
        tasks.push(tokio::spawn(shared.clone().heartbeat_loop(sender)));
        tasks.push(tokio::spawn(shared.clone().route_listener(read_half)));
        Ok(())
    }

    /// Originate a message to `destination`
    ///
    /// Fails with `NoRoute` when no stored route reaches the destination; the
    /// message is not queued.
    pub async fn send(
        &self,
        destination: &str,
        message: &str,
        payload: Option<&[u8]>,
    ) -> RelayResult<()> {
        self.shared.send(destination, message, payload).await
    }

    /// Stop every task and close all sockets; later calls are no-ops
    pub async fn stop(&self) {
        if !self.shared.shutdown.trigger() {
            return;
        }
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        let links: Vec<PeerLink> = self
            .shared
            .connections
            .lock()
            .await
            .drain()
            .map(|(_, link)| link)
            .collect();
        for link in links {
            link.close();
        }
        info!(node = %self.shared.config.name, "Router stopped");
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        self.shared.shutdown.trigger();
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
        if let Ok(mut connections) = self.shared.connections.try_lock() {
            for (_, link) in connections.drain() {
                link.close();
            }
        }
    }
}

impl Shared {
    fn node(&self) -> RelayResult<Node> {
        let bound = self
            .local_addr
            .get()
            .copied()
            .unwrap_or(self.config.bind_address);
        Ok(
            Node::new(&self.config.name, self.config.announced_host(bound), bound.port())
                .with_public_key(self.keys.public_key_pem()?),
        )
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.wait() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => self.clone().attach(stream, peer).await,
                Err(e) => {
                    if self.shutdown.is_shutting_down() {
                        break;
                    }
                    warn!(node = %self.config.name, error = %e, "Failed to accept connection");
                }
            }
        }
        debug!(node = %self.config.name, "Accept loop exited");
    }

    async fn attach(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (read_half, write_half) = stream.into_split();
        let sender = spawn_writer(write_half, peer);

        // Hold the map while spawning so the reader cannot detach first.
        let mut connections = self.connections.lock().await;
        let reader = tokio::spawn(self.clone().read_loop(conn_id, peer, read_half));
        connections.insert(conn_id, PeerLink::new(conn_id, sender, reader.abort_handle()));
        debug!(node = %self.config.name, peer = %peer, conn_id, "Accepted connection");
    }

    async fn read_loop(self: Arc<Self>, conn_id: u64, peer: SocketAddr, read_half: OwnedReadHalf) {
        let mut reader = frame_stream::<_, RelayFrame>(read_half, self.config.max_frame_size);
        loop {
            match next_frame(&mut reader).await {
                Ok(Some(frame)) => self.handle_frame(frame, peer).await,
                Ok(None) => {
                    debug!(node = %self.config.name, peer = %peer, "Connection closed by peer");
                    break;
                }
                Err(e) if e.is_fatal() => {
                    if !self.shutdown.is_shutting_down() {
                        debug!(node = %self.config.name, peer = %peer, error = %e, "Connection failed");
                    }
                    break;
                }
                Err(e) => {
                    warn!(node = %self.config.name, peer = %peer, error = %e, "Dropped frame");
                    metrics::frame_dropped(e.reason());
                }
            }
        }
        self.connections.lock().await.remove(&conn_id);
    }

    async fn handle_frame(&self, frame: RelayFrame, peer: SocketAddr) {
        match frame {
            RelayFrame::Send(request) => {
                let destination = request.destination.clone();
                if let Err(e) = self.originate(request).await {
                    warn!(
                        node = %self.config.name,
                        peer = %peer,
                        destination = %destination,
                        error = %e,
                        "Send request failed"
                    );
                }
            }
            RelayFrame::Envelope(envelope) => self.handle_envelope(envelope).await,
            RelayFrame::Deliver(_) => {
                warn!(node = %self.config.name, peer = %peer, "Ignoring deliver frame sent to a router");
                metrics::frame_dropped("unexpected");
            }
        }
    }

    async fn originate(&self, request: SendRequest) -> RelayResult<()> {
        let payload = if request.is_file {
            let encoded = request.binary.unwrap_or_default();
            let bytes = STANDARD
                .decode(encoded.as_bytes())
                .map_err(|e| RelayError::ProtocolDecode(format!("binary payload: {}", e)))?;
            Some(bytes)
        } else {
            None
        };
        self.send(&request.destination, &request.message, payload.as_deref())
            .await
    }

    async fn send(&self, destination: &str, message: &str, payload: Option<&[u8]>) -> RelayResult<()> {
        if self.shutdown.is_shutting_down() {
            return Err(RelayError::Stopped);
        }

        let route = self
            .routes
            .route_to(&self.config.name, destination)?
            .filter(Route::is_reachable);
        let (route, next_hop) = match route.and_then(|r| r.next_hop().cloned().map(|hop| (r, hop))) {
            Some(found) => found,
            None => {
                warn!(node = %self.config.name, destination = %destination, "No route found");
                return Err(RelayError::NoRoute(destination.to_string()));
            }
        };

        let envelope = forwarding::seal(&route, message, payload)?;
        send_once(
            &next_hop.address(),
            &RelayFrame::Envelope(envelope),
            self.config.connect_timeout,
        )
        .await?;

        metrics::message_originated();
        info!(
            node = %self.config.name,
            destination = %destination,
            next_hop = %next_hop.name,
            is_file = payload.is_some(),
            "Message sent"
        );
        Ok(())
    }

    async fn handle_envelope(&self, envelope: Envelope) {
        match forwarding::decide(&self.config.name, envelope) {
            Decision::Refuse(refusal) => {
                warn!(
                    node = %self.config.name,
                    security = true,
                    reason = refusal.reason(),
                    "Refused envelope: {}",
                    RelayError::from(refusal.clone())
                );
                metrics::message_refused(refusal.reason());
            }
            Decision::Forward { next_hop, envelope } => {
                let frame = RelayFrame::Envelope(envelope);
                match send_once(&next_hop.address(), &frame, self.config.connect_timeout).await {
                    Ok(()) => {
                        metrics::message_forwarded();
                        debug!(node = %self.config.name, next_hop = %next_hop.name, "Forwarded envelope");
                    }
                    Err(e) => warn!(
                        node = %self.config.name,
                        next_hop = %next_hop.name,
                        error = %e,
                        "Failed to forward envelope"
                    ),
                }
            }
            Decision::Deliver(envelope) => {
                if let Err(e) = self.deliver(&envelope).await {
                    error!(node = %self.config.name, error = %e, "Failed to open envelope");
                }
            }
        }
    }

    async fn deliver(&self, envelope: &Envelope) -> RelayResult<()> {
        let opened = forwarding::open(envelope, &self.keys)?;
        let file = match &opened.file {
            Some(bytes) => Some(self.received.save(&self.config.name, &opened.message, bytes)?),
            None => None,
        };
        metrics::message_delivered();
        info!(node = %self.config.name, file = ?file, "Message delivered");

        let delivery = Delivery {
            message: opened.message,
            file,
        };
        let frame = RelayFrame::Deliver(delivery.clone());
        for link in self.connections.lock().await.values() {
            if let Err(e) = link.sender.send(&frame) {
                debug!(node = %self.config.name, conn_id = link.conn_id, error = %e, "Delivery not queued");
            }
        }
        // Having no in-process subscriber is normal.
        let _ = self.deliveries.send(delivery);
        Ok(())
    }

    async fn heartbeat_loop(self: Arc<Self>, controller: FrameSender) {
        let mut ticker = tokio::time::interval(self.config.heartbeat_interval);
        let ping = ControlFrame::Ping {
            name: self.config.name.clone(),
        };
        loop {
            tokio::select! {
                _ = self.shutdown.wait() => break,
                _ = ticker.tick() => {
                    if let Err(e) = controller.send(&ping) {
                        if controller.is_closed() {
                            warn!(node = %self.config.name, "Controller link closed, heartbeat stopped");
                            break;
                        }
                        warn!(node = %self.config.name, error = %e, "Failed to queue heartbeat");
                    }
                }
            }
        }
    }

    async fn route_listener(self: Arc<Self>, read_half: OwnedReadHalf) {
        let mut reader = frame_stream::<_, ControlFrame>(read_half, self.config.max_frame_size);
        loop {
            let next = tokio::select! {
                _ = self.shutdown.wait() => break,
                next = next_frame(&mut reader) => next,
            };
            match next {
                Ok(Some(ControlFrame::Routes(table))) => self.apply_routes(table),
                Ok(Some(other)) => {
                    warn!(node = %self.config.name, frame = ?other, "Unexpected frame from controller");
                    metrics::frame_dropped("unexpected");
                }
                Ok(None) => {
                    warn!(node = %self.config.name, "Controller closed the connection");
                    break;
                }
                Err(e) if e.is_fatal() => {
                    if !self.shutdown.is_shutting_down() {
                        warn!(node = %self.config.name, error = %e, "Controller link failed");
                    }
                    break;
                }
                Err(e) => {
                    warn!(node = %self.config.name, error = %e, "Discarded controller frame");
                    metrics::frame_dropped(e.reason());
                }
            }
        }
    }

    /// Persist a pushed table, replacing the previous one wholesale
    fn apply_routes(&self, table: NodeRoutes) {
        if table.node.name != self.config.name {
            warn!(
                node = %self.config.name,
                table_for = %table.node.name,
                "Ignoring route table addressed to another node"
            );
            return;
        }
        match self.routes.store(&self.config.name, &table) {
            Ok(()) => {
                metrics::routes_stored();
                info!(node = %self.config.name, routes = table.routes.len(), "Route table updated");
            }
            Err(e) => error!(node = %self.config.name, error = %e, "Failed to persist route table"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_router::transport::send_once;
    use crate::test_utils::{recv_broadcast_timeout, router_config, shared_keypair, wait_until};
    use std::time::Duration;
    use tempfile::TempDir;

    fn router(name: &str, dir: &TempDir, key: usize) -> Router {
        let config = router_config(name, "127.0.0.1:1", dir.path());
        Router::with_keys(config, shared_keypair(key).clone()).unwrap()
    }

    /// Write a route table straight into a router's store
    fn install_route(router: &Router, hops: &[&Router]) {
        let path: Vec<Node> = hops.iter().map(|r| r.node().unwrap()).collect();
        let source = path[0].clone();
        let destination = path[path.len() - 1].clone();
        let table = NodeRoutes::new(
            source.clone(),
            vec![Route::new(source, destination, path)],
        );
        router.shared.apply_routes(table);
    }

    #[tokio::test]
    async fn test_relay_through_intermediate() {
        let dir = TempDir::new().unwrap();
        let a = router("A", &dir, 0);
        let b = router("B", &dir, 1);
        let c = router("C", &dir, 2);
        for r in [&a, &b, &c] {
            r.start_server().await.unwrap();
        }
        install_route(&a, &[&a, &b, &c]);

        let mut deliveries = c.subscribe();
        a.send("C", "hello", None).await.unwrap();

        let delivery = recv_broadcast_timeout(&mut deliveries, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(delivery.message, "hello");
        assert_eq!(delivery.file, None);

        for r in [&a, &b, &c] {
            r.stop().await;
        }
    }

    #[tokio::test]
    async fn test_send_without_route() {
        let dir = TempDir::new().unwrap();
        let a = router("A", &dir, 0);

        let err = a.send("C", "hello", None).await.unwrap_err();
        assert!(matches!(err, RelayError::NoRoute(dest) if dest == "C"));
    }

    #[tokio::test]
    async fn test_misaddressed_envelope_is_dropped() {
        let dir = TempDir::new().unwrap();
        let b = router("B", &dir, 1);
        let c = router("C", &dir, 2);
        let c_addr = c.start_server().await.unwrap();
        b.start_server().await.unwrap();

        // An envelope still addressed to B, injected directly at C.
        let route = Route::new(
            b.node().unwrap(),
            c.node().unwrap(),
            vec![b.node().unwrap(), b.node().unwrap(), c.node().unwrap()],
        );
        let envelope = forwarding::seal(&route, "spoofed", None).unwrap();
        assert_eq!(envelope.path[0].name, "B");

        let mut deliveries = c.subscribe();
        send_once(
            &c_addr.to_string(),
            &RelayFrame::Envelope(envelope),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        let result = recv_broadcast_timeout(&mut deliveries, Duration::from_millis(300)).await;
        assert!(result.is_err(), "misaddressed envelope must not be delivered");

        b.stop().await;
        c.stop().await;
    }

    #[tokio::test]
    async fn test_foreign_route_table_is_ignored() {
        let dir = TempDir::new().unwrap();
        let a = router("A", &dir, 0);
        let b = router("B", &dir, 1);

        let table = NodeRoutes::new(b.node().unwrap(), Vec::new());
        a.shared.apply_routes(table);
        assert!(a.routes().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_route_table_update_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let a = router("A", &dir, 0);
        let b = router("B", &dir, 1);

        install_route(&a, &[&a, &b]);
        let first = std::fs::read(a.shared.routes.path_for("A")).unwrap();
        install_route(&a, &[&a, &b]);
        let second = std::fs::read(a.shared.routes.path_for("A")).unwrap();

        assert_eq!(first, second);
        assert!(a.route_to("B").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_closes_listener() {
        let dir = TempDir::new().unwrap();
        let a = router("A", &dir, 0);
        let addr = a.start_server().await.unwrap();

        a.stop().await;
        a.stop().await;
        assert!(!a.is_running());

        let closed = wait_until(Duration::from_secs(2), move || async move {
            TcpStream::connect(addr).await.is_err()
        })
        .await;
        assert!(closed, "listener should be closed after stop");
        assert!(matches!(
            a.send("B", "late", None).await,
            Err(RelayError::Stopped)
        ));
    }

    #[tokio::test]
    async fn test_double_start_is_rejected() {
        let dir = TempDir::new().unwrap();
        let a = router("A", &dir, 0);
        a.start_server().await.unwrap();
        assert!(a.start_server().await.is_err());
        a.stop().await;
    }
}
