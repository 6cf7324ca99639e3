//! Router facade
//!
//! Ties every subsystem crate together behind `Connect`/`Disconnect`/`Send`
//! plus read accessors for this node's current place in the tree and the
//! ring. [`RouterInner`] is the single logical owner of all subsystem state
//! and implements [`ForwardingPolicy`], the seam each peer's reader/announcer
//! tasks call into; [`Router`] is the cheap `Arc`-backed handle callers hold.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use arbor_codec::{encode, DecodedFrame, FrameBody, FramePool};
use arbor_core::{system_clock, PrivateKey, PublicKey, SharedClock};
use arbor_peer::{handshake, spawn_peer, Connection, ForwardingPolicy, PeerHandle};
use arbor_snake::{ring, AckAccepted, BootstrapDecision, PathId, PathfindChain, RouteDecision, SnakeState};
use arbor_switch::{Coordinates, PeerType, PortId, PortTable, LOCAL_PORT};
use arbor_tree::{select_next_hop, AcceptOutcome, Announcement, Candidate, TreeState};

use crate::config::RouterConfig;
use crate::error::RouterError;

/// A user-traffic frame the routing layer delivered to the local
/// application because this node was the destination.
#[derive(Debug, Clone)]
pub struct DeliveredFrame {
    pub inbound_port: PortId,
    pub body: FrameBody,
}

/// Broadcast channel capacity for locally delivered frames.
const DELIVERY_CHANNEL_CAPACITY: usize = 256;

fn encode_path_id(id: PathId) -> Bytes {
    Bytes::copy_from_slice(&id.to_be_bytes())
}

fn decode_path_id(payload: &Bytes) -> Option<PathId> {
    let bytes: [u8; 8] = payload.get(..8)?.try_into().ok()?;
    Some(PathId::from_be_bytes(bytes))
}

struct RouterInner {
    private_key: PrivateKey,
    port_table: PortTable,
    tree: TreeState,
    snake: SnakeState,
    peers: Mutex<HashMap<PortId, PeerHandle>>,
    pool: FramePool,
    clock: SharedClock,
    config: RouterConfig,
    delivered: broadcast::Sender<DeliveredFrame>,
}

impl RouterInner {
    fn local_key(&self) -> PublicKey {
        self.private_key.public()
    }

    /// Best next hop toward `destination` coordinates among every started,
    /// alive peer plus the local node itself (greedy routing).
    fn select_next_hop_for(&self, destination: &Coordinates, exclude_port: Option<PortId>) -> Option<PortId> {
        let local_coords = self.tree.local_coordinates();
        let mut snapshot: Vec<(PortId, Coordinates)> = vec![(LOCAL_PORT, local_coords)];
        for peer in self.port_table.bound_peers() {
            if Some(peer.port()) == exclude_port || !peer.is_started() || !peer.is_alive() {
                continue;
            }
            snapshot.push((peer.port(), peer.coords()));
        }
        let candidates: Vec<Candidate> = snapshot
            .iter()
            .map(|(port, coords)| Candidate { port: *port, coords })
            .collect();
        select_next_hop(&candidates, destination)
    }

    /// Next hop toward `destination`'s key: an installed snake entry first,
    /// falling back to whichever of predecessor/successor/tree-parent is
    /// ring-closer.
    fn route_key(&self, destination: &PublicKey) -> Option<PortId> {
        match self.snake.route_to_key(destination) {
            Some(RouteDecision::Local) => return Some(LOCAL_PORT),
            Some(RouteDecision::NextHop(port)) => return Some(port),
            None => {}
        }

        let mut best: Option<(PublicKey, PortId)> = None;
        if let Some(successor) = self.snake.successor() {
            if let Some(record) = self.port_table.find_by_key(&successor) {
                best = Some((successor, record.port()));
            }
        }
        if let Some(predecessor) = self.snake.predecessor() {
            if let Some(record) = self.port_table.find_by_key(&predecessor) {
                let current_best = best.as_ref().map(|(key, _)| key);
                if ring::is_closer_to_destination(destination, &predecessor, current_best) {
                    best = Some((predecessor, record.port()));
                }
            }
        }
        if best.is_none() {
            if let Some(parent) = self.tree.parent_port() {
                best = Some((self.tree.root_public_key(), parent));
            }
        }
        best.map(|(_, port)| port)
    }

    fn enqueue(&self, port: PortId, body: FrameBody, proto: bool) {
        let sender = { self.peers.lock().get(&port).map(|handle| handle.queues.clone()) };
        let Some(sender) = sender else {
            warn!(port, "dropping frame addressed to an unbound port");
            return;
        };
        let encoded = encode(&DecodedFrame::new(body));
        let frame = self.pool.wrap(encoded);
        if proto {
            sender.send_proto(frame);
        } else {
            sender.send_traffic(frame);
        }
    }

    fn send_proto_to(&self, port: PortId, body: FrameBody) {
        self.enqueue(port, body, true);
    }

    fn send_traffic_to(&self, port: PortId, body: FrameBody) {
        self.enqueue(port, body, false);
    }

    fn deliver(&self, inbound_port: PortId, body: FrameBody) {
        let _ = self.delivered.send(DeliveredFrame { inbound_port, body });
    }

    fn fan_out_advertise_now(&self, except: Option<PortId>) {
        for (port, handle) in self.peers.lock().iter() {
            if Some(*port) != except {
                handle.dispatch.fire();
            }
        }
    }

    /// Originate a fresh bootstrap addressed to our own key, entering it at
    /// the local port exactly as [`Self::send`] would.
    fn emit_bootstrap(&self) {
        let body = FrameBody::VirtualSnakeBootstrap {
            coords: self.tree.local_coordinates(),
            key: self.local_key(),
            payload: Bytes::new(),
        };
        self.on_frame(LOCAL_PORT, DecodedFrame::new(body));
    }

    #[instrument(skip(self, payload), fields(inbound_port))]
    fn handle_stp(&self, inbound_port: PortId, payload: Bytes) {
        let Some(record) = self.port_table.get(inbound_port) else {
            return;
        };
        let announcement: Announcement = match postcard::from_bytes(&payload) {
            Ok(a) => a,
            Err(err) => {
                warn!(inbound_port, %err, "malformed STP payload");
                return;
            }
        };
        let from_key = record.public_key();
        let now = self.clock.now();

        // Every peer's advertised coordinates feed greedy routing, whether
        // or not this announcement wins the root-election comparison.
        record.accept_announcement(announcement.coordinates(), chrono::Utc::now());

        match self.tree.accept_announcement(inbound_port, from_key, announcement, now) {
            Ok(AcceptOutcome::AdoptedNewParent) => {
                debug!(inbound_port, "adopted new tree parent");
                self.fan_out_advertise_now(Some(inbound_port));
                self.emit_bootstrap();
            }
            Ok(_) => {}
            Err(err @ arbor_tree::TreeError::LastSignerMismatch) => {
                warn!(inbound_port, %err, "announcement's last signer does not match the connected peer's key");
                self.disconnect_peer(inbound_port, "key mismatch");
            }
            Err(err) => {
                warn!(inbound_port, %err, "rejected STP announcement");
            }
        }
    }

    fn next_announcement_for(&self, port: PortId) -> Option<DecodedFrame> {
        let signed = self.tree.sign_for_port(&self.private_key, port).ok()?;
        let payload = postcard::to_allocvec(&signed).ok()?;
        Some(DecodedFrame::new(FrameBody::Stp {
            dst: Vec::new(),
            payload: Bytes::from(payload),
        }))
    }

    fn handle_bootstrap(&self, inbound_port: PortId, originator_coords: Coordinates, originator_key: PublicKey) {
        match self.snake.evaluate_bootstrap(originator_key) {
            BootstrapDecision::ClaimSuccessor => match self.select_next_hop_for(&originator_coords, None) {
                Some(next_port) if next_port != inbound_port => {
                    let ack = FrameBody::VirtualSnakeBootstrapAck {
                        dst: originator_coords,
                        src: self.tree.local_coordinates(),
                        dst_key: originator_key,
                        src_key: self.local_key(),
                        payload: Bytes::new(),
                    };
                    self.send_proto_to(next_port, ack);
                }
                _ => warn!("cannot route bootstrap-ack back to originator"),
            },
            BootstrapDecision::Forward => {
                let body = FrameBody::VirtualSnakeBootstrap {
                    coords: originator_coords,
                    key: originator_key,
                    payload: Bytes::new(),
                };
                match self.tree.parent_port() {
                    Some(parent) if parent != inbound_port => self.send_proto_to(parent, body),
                    Some(_) => {}
                    None => {
                        // We are root: there is no single "up" direction, so
                        // every other started peer gets a chance to claim it.
                        for peer in self.port_table.bound_peers() {
                            if peer.port() != inbound_port && peer.is_started() {
                                self.send_proto_to(peer.port(), body.clone());
                            }
                        }
                    }
                }
            }
        }
    }

    fn handle_bootstrap_ack(
        &self,
        inbound_port: PortId,
        dst: Coordinates,
        src: Coordinates,
        dst_key: PublicKey,
        src_key: PublicKey,
    ) {
        match self.select_next_hop_for(&dst, None) {
            Some(LOCAL_PORT) => {
                let accepted: AckAccepted = self.snake.accept_bootstrap_ack(src_key, inbound_port);
                let payload = encode_path_id(accepted.path_id);
                self.handle_setup(LOCAL_PORT, src, src_key, self.local_key(), payload);
            }
            Some(next_port) if next_port != inbound_port => {
                let body = FrameBody::VirtualSnakeBootstrapAck {
                    dst,
                    src,
                    dst_key,
                    src_key,
                    payload: Bytes::new(),
                };
                self.send_proto_to(next_port, body);
            }
            _ => warn!("no route to forward bootstrap-ack"),
        }
    }

    fn handle_setup(&self, inbound_port: PortId, coords: Coordinates, dst_key: PublicKey, src_key: PublicKey, payload: Bytes) {
        let Some(path_id) = decode_path_id(&payload) else {
            warn!("malformed virtual-snake-setup payload");
            return;
        };
        let now = self.clock.now();
        match self.select_next_hop_for(&coords, None) {
            Some(LOCAL_PORT) => {
                self.snake
                    .handle_setup_hop(src_key, dst_key, inbound_port, LOCAL_PORT, path_id, true, now);
                debug!(path_id, "virtual-snake setup delivered: this node is the successor");
            }
            Some(next_port) if next_port != inbound_port => {
                self.snake
                    .handle_setup_hop(src_key, dst_key, inbound_port, next_port, path_id, false, now);
                let body = FrameBody::VirtualSnakeSetup {
                    coords,
                    dst_key,
                    src_key,
                    payload,
                };
                self.send_proto_to(next_port, body);
            }
            _ => warn!(path_id, "no route to forward virtual-snake setup"),
        }
    }

    fn route_virtual_snake(&self, inbound_port: PortId, dst_key: PublicKey, src_key: PublicKey, payload: Bytes) {
        match self.route_key(&dst_key) {
            Some(LOCAL_PORT) => self.deliver(
                inbound_port,
                FrameBody::VirtualSnake { dst_key, src_key, payload },
            ),
            Some(next_port) if next_port != inbound_port => self.send_traffic_to(
                next_port,
                FrameBody::VirtualSnake { dst_key, src_key, payload },
            ),
            _ => self.record_no_destination(inbound_port),
        }
    }

    fn route_snake_pathfind(&self, inbound_port: PortId, dst_key: PublicKey, src_key: PublicKey, payload: Bytes) {
        let Ok(chain) = postcard::from_bytes::<PathfindChain>(&payload) else {
            warn!("malformed virtual-snake-pathfind payload");
            return;
        };
        if chain.already_visited(&self.local_key()) {
            debug!("dropping virtual-snake-pathfind frame: loop detected");
            return;
        }
        match self.route_key(&dst_key) {
            Some(LOCAL_PORT) => {
                if let Ok(bytes) = postcard::to_allocvec(&chain.append_signed(&self.private_key, LOCAL_PORT)) {
                    self.deliver(
                        inbound_port,
                        FrameBody::VirtualSnakePathfind { dst_key, src_key, payload: Bytes::from(bytes) },
                    );
                }
            }
            Some(next_port) if next_port != inbound_port => {
                if let Ok(bytes) = postcard::to_allocvec(&chain.append_signed(&self.private_key, next_port)) {
                    self.send_traffic_to(
                        next_port,
                        FrameBody::VirtualSnakePathfind { dst_key, src_key, payload: Bytes::from(bytes) },
                    );
                }
            }
            _ => self.record_no_destination(inbound_port),
        }
    }

    fn route_tree_pathfind(&self, inbound_port: PortId, dst: Coordinates, src: Coordinates, payload: Bytes) {
        let Ok(chain) = postcard::from_bytes::<PathfindChain>(&payload) else {
            warn!("malformed pathfind payload");
            return;
        };
        if chain.already_visited(&self.local_key()) {
            debug!("dropping pathfind frame: loop detected");
            return;
        }
        match self.select_next_hop_for(&dst, None) {
            Some(LOCAL_PORT) => {
                if let Ok(bytes) = postcard::to_allocvec(&chain.append_signed(&self.private_key, LOCAL_PORT)) {
                    self.deliver(
                        inbound_port,
                        FrameBody::Pathfind { dst, src, payload: Bytes::from(bytes) },
                    );
                }
            }
            Some(next_port) if next_port != inbound_port => {
                if let Ok(bytes) = postcard::to_allocvec(&chain.append_signed(&self.private_key, next_port)) {
                    self.send_traffic_to(
                        next_port,
                        FrameBody::Pathfind { dst, src, payload: Bytes::from(bytes) },
                    );
                }
            }
            _ => self.record_no_destination(inbound_port),
        }
    }

    /// Shared next-hop-by-coordinate forwarding for the plain user-traffic
    /// frame types (Greedy, DHTRequest, DHTResponse): deliver locally when
    /// this node is already closest, otherwise forward unchanged.
    fn route_traffic_by_coords(&self, inbound_port: PortId, dst: Coordinates, body: FrameBody) {
        match self.select_next_hop_for(&dst, None) {
            Some(LOCAL_PORT) => self.deliver(inbound_port, body),
            Some(next_port) if next_port != inbound_port => self.send_traffic_to(next_port, body),
            _ => self.record_no_destination(inbound_port),
        }
    }

    /// Source routing: `dst` is an explicit port path, consumed one hop at
    /// a time rather than resolved by coordinate-prefix match.
    fn route_source(&self, inbound_port: PortId, mut dst: Vec<PortId>, src: Vec<PortId>, payload: Bytes) {
        if dst.is_empty() {
            self.deliver(inbound_port, FrameBody::Source { dst, src, payload });
            return;
        }
        let next_port = dst.remove(0);
        if next_port == inbound_port {
            warn!(next_port, "source-routed frame would loop back to its inbound port");
            return;
        }
        self.send_traffic_to(next_port, FrameBody::Source { dst, src, payload });
    }

    fn record_no_destination(&self, inbound_port: PortId) {
        if let Some(record) = self.port_table.get(inbound_port) {
            record.counters().record_no_destination();
        }
    }

    fn cleanup_port(&self, port: PortId) {
        let _ = self.port_table.detach(port);
        let now = self.clock.now();
        if self.tree.forget_peer(port, now) {
            self.fan_out_advertise_now(None);
            self.emit_bootstrap();
        }
        if !self.snake.teardown_port(port).is_empty() {
            self.emit_bootstrap();
        }
    }

    /// Cancel a peer's task group and tear down its port immediately,
    /// without waiting for the reader/writer to notice on their own. Used
    /// when this node itself detects a reason the peer can no longer be
    /// trusted (a signature chain whose last signer doesn't match the key
    /// it claimed at handshake) rather than an I/O failure the reader
    /// reports for itself.
    fn disconnect_peer(&self, port: PortId, reason: &'static str) {
        if let Some(handle) = self.peers.lock().remove(&port) {
            warn!(port, reason, "disconnecting peer");
            handle.cancel_now();
        }
        self.cleanup_port(port);
    }

    /// Drop `alive` back to false on any peer whose last announcement has
    /// aged out past the announcement-timeout window, without otherwise
    /// touching the peer's `started` state or its port binding.
    fn expire_stale_peers(&self) {
        let now = chrono::Utc::now();
        let timeout = self.config.announcement_timeout;
        for peer in self.port_table.bound_peers() {
            if let Some(last) = peer.last_announcement_at() {
                if peer.is_alive() {
                    if let Ok(age) = (now - last).to_std() {
                        if age >= timeout {
                            peer.mark_stale();
                        }
                    }
                }
            }
        }
    }

    fn tick(&self) {
        let now = self.clock.now();
        self.expire_stale_peers();
        if self.tree.check_timeout(now) {
            self.fan_out_advertise_now(None);
            self.emit_bootstrap();
        }
        if self.tree.should_reannounce(now) {
            self.tree.bump_self_sequence_if_root();
            self.tree.mark_advertised(now);
            self.fan_out_advertise_now(None);
        }
        if self.snake.should_bootstrap(now) {
            self.snake.mark_bootstrapped(now);
            self.emit_bootstrap();
        }
    }
}

impl ForwardingPolicy for RouterInner {
    fn on_frame(&self, inbound_port: PortId, frame: DecodedFrame) {
        match frame.body {
            FrameBody::Stp { payload, .. } => self.handle_stp(inbound_port, payload),
            FrameBody::Greedy { dst, src, payload } => {
                self.route_traffic_by_coords(inbound_port, dst.clone(), FrameBody::Greedy { dst, src, payload })
            }
            FrameBody::DhtRequest { dst, src, payload } => {
                self.route_traffic_by_coords(inbound_port, dst.clone(), FrameBody::DhtRequest { dst, src, payload })
            }
            FrameBody::DhtResponse { dst, src, payload } => {
                self.route_traffic_by_coords(inbound_port, dst.clone(), FrameBody::DhtResponse { dst, src, payload })
            }
            FrameBody::Source { dst, src, payload } => self.route_source(inbound_port, dst, src, payload),
            FrameBody::Pathfind { dst, src, payload } => self.route_tree_pathfind(inbound_port, dst, src, payload),
            FrameBody::VirtualSnake { dst_key, src_key, payload } => {
                self.route_virtual_snake(inbound_port, dst_key, src_key, payload)
            }
            FrameBody::VirtualSnakePathfind { dst_key, src_key, payload } => {
                self.route_snake_pathfind(inbound_port, dst_key, src_key, payload)
            }
            FrameBody::VirtualSnakeBootstrap { coords, key, .. } => self.handle_bootstrap(inbound_port, coords, key),
            FrameBody::VirtualSnakeBootstrapAck { dst, src, dst_key, src_key, .. } => {
                self.handle_bootstrap_ack(inbound_port, dst, src, dst_key, src_key)
            }
            FrameBody::VirtualSnakeSetup { coords, dst_key, src_key, payload } => {
                self.handle_setup(inbound_port, coords, dst_key, src_key, payload)
            }
        }
    }

    fn on_peer_stopped(&self, port: PortId) {
        if let Some(handle) = self.peers.lock().remove(&port) {
            handle.cancel_now();
        }
        self.cleanup_port(port);
    }

    fn next_announcement(&self, port: PortId) -> Option<DecodedFrame> {
        self.next_announcement_for(port)
    }
}

/// The router facade: a cheap, cloneable handle onto one node's identity,
/// switch-port table, tree/snake subsystems, and connected peers.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Router {
    pub fn new(private_key: PrivateKey) -> Self {
        Self::with_config(private_key, RouterConfig::default(), system_clock())
    }

    pub fn with_config(private_key: PrivateKey, config: RouterConfig, clock: SharedClock) -> Self {
        let local_key = private_key.public();
        let now = clock.now();
        let (delivered, _rx) = broadcast::channel(DELIVERY_CHANNEL_CAPACITY);
        let inner = Arc::new(RouterInner {
            tree: TreeState::with_intervals(local_key, now, config.announcement_interval, config.announcement_timeout),
            snake: SnakeState::with_interval(local_key, config.bootstrap_interval),
            port_table: PortTable::new(config.port_table_capacity),
            peers: Mutex::new(HashMap::new()),
            pool: FramePool::new(),
            private_key,
            clock,
            config,
            delivered,
        });
        Self { inner }
    }

    pub fn local_public_key(&self) -> PublicKey {
        self.inner.local_key()
    }

    pub fn local_coordinates(&self) -> Coordinates {
        self.inner.tree.local_coordinates()
    }

    pub fn root_public_key(&self) -> PublicKey {
        self.inner.tree.root_public_key()
    }

    pub fn predecessor_public_key(&self) -> Option<PublicKey> {
        self.inner.snake.predecessor()
    }

    pub fn successor_public_key(&self) -> Option<PublicKey> {
        self.inner.snake.successor()
    }

    pub fn ports(&self) -> Vec<PortId> {
        self.inner
            .port_table
            .bound_peers()
            .iter()
            .map(|peer| peer.port())
            .collect()
    }

    /// Subscribe to user-traffic frames the routing layer delivered locally.
    pub fn delivered(&self) -> broadcast::Receiver<DeliveredFrame> {
        self.inner.delivered.subscribe()
    }

    /// Attach a new peer connection: exchange public keys, bind a port, and
    /// spawn its reader/writer/announcer task group.
    #[instrument(skip(self, conn))]
    pub async fn connect<C: Connection + 'static>(
        &self,
        mut conn: C,
        zone: impl Into<String>,
        peer_type: PeerType,
    ) -> Result<PortId, RouterError> {
        let remote_key = handshake(&mut conn, &self.inner.local_key()).await?;
        let record = self.inner.port_table.attach(remote_key, peer_type, zone.into())?;
        let port = record.port();

        let handle = spawn_peer(
            conn,
            port,
            record.counters().clone(),
            self.inner.clone() as Arc<dyn ForwardingPolicy>,
            self.inner.pool.clone(),
            self.inner.config.queue_depth,
            self.inner.config.announce_deadline,
        );
        handle.dispatch.fire();
        record.set_started(true);
        self.inner.peers.lock().insert(port, handle);

        info!(port, remote = %remote_key, "peer connected");
        Ok(port)
    }

    /// Detach a peer: cancel its task group, then tear down any tree/snake
    /// state that depended on its port.
    #[instrument(skip(self))]
    pub async fn disconnect(&self, port: PortId, cause: &str) -> Result<(), RouterError> {
        let handle = self
            .inner
            .peers
            .lock()
            .remove(&port)
            .ok_or(RouterError::NotStarted(port))?;
        debug!(port, cause, "disconnecting peer");
        handle.shutdown().await;
        self.inner.cleanup_port(port);
        Ok(())
    }

    /// Inject a frame from the local application at port 0.
    pub fn send(&self, body: FrameBody) {
        self.inner.on_frame(LOCAL_PORT, DecodedFrame::new(body));
    }

    /// Force an immediate bootstrap, bypassing the interval timer.
    pub fn bootstrap_now(&self) {
        self.inner.emit_bootstrap();
    }

    /// Periodic maintenance: root re-advertise/timeout and ring bootstrap
    /// scheduling. The ambient stack is responsible for calling this on a
    /// tick from a single shared timer, rather than giving every subsystem
    /// its own timer task.
    pub fn tick(&self) {
        self.inner.tick();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expire_stale_peers_drops_alive_after_announcement_timeout() {
        let config = RouterConfig {
            announcement_timeout: std::time::Duration::from_millis(10),
            ..RouterConfig::default()
        };
        let router = Router::with_config(PrivateKey::generate(), config, system_clock());
        let record = router
            .inner
            .port_table
            .attach(PrivateKey::generate().public(), PeerType::Remote, "test".into())
            .unwrap();
        record.accept_announcement(vec![1], chrono::Utc::now() - chrono::Duration::milliseconds(50));

        assert!(record.is_alive());
        router.inner.expire_stale_peers();
        assert!(!record.is_alive());
    }

    #[test]
    fn expire_stale_peers_leaves_fresh_announcements_alive() {
        let router = Router::new(PrivateKey::generate());
        let record = router
            .inner
            .port_table
            .attach(PrivateKey::generate().public(), PeerType::Remote, "test".into())
            .unwrap();
        record.accept_announcement(vec![1], chrono::Utc::now());

        router.inner.expire_stale_peers();
        assert!(record.is_alive());
    }
}
