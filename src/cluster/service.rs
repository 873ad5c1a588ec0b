use anyhow::{anyhow, bail, Result};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, info, warn};

use super::link::{self, PeerLink, PendingMap, OUTBOUND_QUEUE};
use super::types::{now_ms, NodeId, NodeInfo, PeerMessage, PeerRequest, PeerResponse};
use crate::config::NodeConfig;
use crate::ring::HashRing;
use crate::store::types::Record;
use crate::store::LocalStore;

/// Peer coordination service: owns the peer-wire listener, the link
/// table, the heartbeat map, and the failure detector.
///
/// The ring doubles as the node table: every node on it is considered
/// alive. Peers declared failed move to the `failed` table and stay
/// there (sticky) until they reconnect with a fresh `identify`.
pub struct ClusterService {
    pub local_node: NodeInfo,
    config: NodeConfig,
    ring: Arc<HashRing>,
    store: Arc<LocalStore>,
    listener: TcpListener,
    peers: DashMap<NodeId, Arc<PeerLink>>,
    last_heartbeat: DashMap<NodeId, Instant>,
    failed: DashMap<NodeId, NodeInfo>,
}

impl ClusterService {
    /// Binds the peer-wire listener and registers the local node on the
    /// ring. A bind failure is fatal to the process.
    pub async fn new(
        node_id: NodeId,
        config: NodeConfig,
        ring: Arc<HashRing>,
        store: Arc<LocalStore>,
    ) -> Result<Arc<Self>> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_node = NodeInfo {
            id: node_id,
            address: listener.local_addr()?,
        };
        ring.add_node(local_node.clone());

        Ok(Arc::new(Self {
            local_node,
            config,
            ring,
            store,
            listener,
            peers: DashMap::new(),
            last_heartbeat: DashMap::new(),
            failed: DashMap::new(),
        }))
    }

    /// Spawns the background tasks: the accept loop and the combined
    /// heartbeat-send / failure-check loop.
    pub fn start(self: &Arc<Self>) {
        let service = self.clone();
        tokio::spawn(async move {
            service.accept_loop().await;
        });

        let service = self.clone();
        tokio::spawn(async move {
            service.heartbeat_loop().await;
        });
    }

    pub fn ring(&self) -> &Arc<HashRing> {
        &self.ring
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// The live link to `id`, if one is registered.
    pub fn link(&self, id: &NodeId) -> Option<Arc<PeerLink>> {
        self.peers.get(id).map(|entry| entry.value().clone())
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Nodes declared failed and not yet re-identified.
    pub fn failed_nodes(&self) -> Vec<NodeInfo> {
        let mut nodes: Vec<NodeInfo> =
            self.failed.iter().map(|entry| entry.value().clone()).collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    // ------------------------------------------------------------------
    // Outbound connections & bootstrap
    // ------------------------------------------------------------------

    /// Opens a link to `addr` and waits for the remote `identify`.
    pub async fn connect(self: &Arc<Self>, addr: SocketAddr) -> Result<NodeId> {
        let stream = TcpStream::connect(addr).await?;
        let identified = self.clone().spawn_link(stream, addr);

        let id = tokio::time::timeout(self.config.request_timeout, identified)
            .await
            .map_err(|_| anyhow!("peer at {} did not identify in time", addr))?
            .map_err(|_| anyhow!("connection to {} closed before identify", addr))?;
        Ok(id)
    }

    /// Bootstraps cluster membership from the seed list: the first seed
    /// that answers supplies its full ring snapshot, every node in it is
    /// merged into the local ring and linked. An empty seed list means
    /// this node starts a fresh cluster.
    pub async fn join(self: &Arc<Self>, seeds: &[SocketAddr]) -> Result<()> {
        if seeds.is_empty() {
            info!("No seeds configured; starting as founding node");
            return Ok(());
        }

        for (i, seed) in seeds.iter().enumerate() {
            match self.join_via(*seed).await {
                Ok(known) => {
                    info!("Joined cluster via {} ({} nodes known)", seed, known);
                    return Ok(());
                }
                Err(e) => warn!("Bootstrap via seed {} failed: {}", seed, e),
            }

            if i + 1 < seeds.len() {
                let jitter = rand::random::<u64>() % 250;
                tokio::time::sleep(Duration::from_millis(100 + jitter)).await;
            }
        }

        bail!("no seed accepted the bootstrap")
    }

    async fn join_via(self: &Arc<Self>, seed: SocketAddr) -> Result<usize> {
        let seed_id = self.connect(seed).await?;
        let seed_link = self
            .link(&seed_id)
            .ok_or_else(|| anyhow!("seed link closed during bootstrap"))?;

        let response = seed_link
            .request(PeerRequest::RingSnapshot)
            .await
            .map_err(|e| anyhow!("ring snapshot from {}: {}", seed, e))?;
        let nodes = match response {
            PeerResponse::Ring { nodes } => nodes,
            other => bail!("unexpected reply to ring snapshot: {:?}", other),
        };

        let known = nodes.len();
        for node in nodes {
            if node.id == self.local_node.id {
                continue;
            }
            self.ring.add_node(node.clone());
            self.touch(&node.id);

            if !self.peers.contains_key(&node.id) {
                let service = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = service.connect(node.address).await {
                        warn!("Could not link {} at {}: {}", node.id, node.address, e);
                    }
                });
            }
        }
        Ok(known)
    }

    /// Explicit membership addition (admin API): put the node on the
    /// ring and open a link. Stored keys are not moved; only future
    /// writes respect the new topology.
    pub async fn add_peer(self: &Arc<Self>, node: NodeInfo) -> Result<()> {
        self.failed.remove(&node.id);
        if self.ring.add_node(node.clone()) {
            info!(
                "Node {} added to ring; existing keys stay on their original replicas",
                node.id
            );
        }
        self.touch(&node.id);

        if node.id != self.local_node.id && !self.peers.contains_key(&node.id) {
            self.connect(node.address).await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Link lifecycle
    // ------------------------------------------------------------------

    /// Splits the stream into a writer task and a reader task and sends
    /// the local `identify` as the first frame. The returned channel
    /// resolves with the remote id once its `identify` arrives.
    fn spawn_link(
        self: Arc<Self>,
        stream: TcpStream,
        remote_addr: SocketAddr,
    ) -> oneshot::Receiver<NodeId> {
        let (identified_tx, identified_rx) = oneshot::channel();
        let (read_half, write_half) = stream.into_split();
        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_QUEUE);

        tokio::spawn(link::run_writer(out_rx, write_half));

        // Queue is empty at this point, so this cannot fail.
        let _ = out_tx.try_send(PeerMessage::Identify {
            node: self.local_node.clone(),
        });

        tokio::spawn(async move {
            self.run_link(read_half, out_tx, remote_addr, identified_tx)
                .await;
        });

        identified_rx
    }

    /// Per-link reader task. Ignores everything until the remote
    /// `identify`, then registers the link and dispatches frames until
    /// EOF or an explicit close.
    async fn run_link(
        self: Arc<Self>,
        mut read_half: OwnedReadHalf,
        out_tx: mpsc::Sender<PeerMessage>,
        remote_addr: SocketAddr,
        identified_tx: oneshot::Sender<NodeId>,
    ) {
        let pending: PendingMap = Arc::new(DashMap::new());
        let shutdown = Arc::new(Notify::new());
        let mut identified_tx = Some(identified_tx);
        let mut link: Option<Arc<PeerLink>> = None;

        loop {
            let message = tokio::select! {
                frame = link::read_frame(&mut read_half) => match frame {
                    Ok(message) => message,
                    Err(e) => {
                        debug!("Link to {} dropped: {}", remote_addr, e);
                        break;
                    }
                },
                _ = shutdown.notified() => break,
            };

            if let Some(active) = link.clone() {
                self.touch(&active.remote.id);
                self.dispatch(&active, message).await;
                continue;
            }

            match message {
                PeerMessage::Identify { node } => {
                    if node.id == self.local_node.id {
                        debug!("Ignoring connection identifying as ourselves");
                        break;
                    }
                    let fresh = Arc::new(PeerLink::new(
                        node.clone(),
                        out_tx.clone(),
                        pending.clone(),
                        self.config.request_timeout,
                        shutdown.clone(),
                    ));
                    self.register_peer(&node, fresh.clone());
                    if let Some(tx) = identified_tx.take() {
                        let _ = tx.send(node.id.clone());
                    }
                    link = Some(fresh);
                }
                other => {
                    debug!(
                        "Ignoring pre-identify message from {}: {:?}",
                        remote_addr, other
                    );
                }
            }
        }

        pending.clear();
        if let Some(active) = link {
            active.close();
            // Only the link that is still registered reports a
            // disconnect; a link replaced by a fresh identify is
            // already superseded.
            let was_registered = self
                .peers
                .remove_if(&active.remote.id, |_, current| Arc::ptr_eq(current, &active))
                .is_some();
            if was_registered {
                debug!("Peer {} disconnected", active.remote.id);
                self.declare_failed(&active.remote.id);
            }
        }
    }

    /// Puts an identified peer on the ring and into the link table.
    /// A fresh identify clears sticky failure state and supersedes any
    /// previous link to the same node.
    fn register_peer(&self, node: &NodeInfo, link: Arc<PeerLink>) {
        info!("Peer {} identified at {}", node.id, node.address);
        self.failed.remove(&node.id);
        self.ring.add_node(node.clone());
        self.touch(&node.id);

        if let Some(old) = self.peers.insert(node.id.clone(), link) {
            old.close();
        }
    }

    // ------------------------------------------------------------------
    // Inbound dispatch
    // ------------------------------------------------------------------

    async fn dispatch(&self, link: &Arc<PeerLink>, message: PeerMessage) {
        match message {
            PeerMessage::Identify { node } => {
                // Re-identify on a live link refreshes liveness only.
                self.failed.remove(&node.id);
            }
            PeerMessage::Heartbeat { from, .. } => {
                debug!("Heartbeat from {}", from);
            }
            PeerMessage::NodeFailure {
                failed, reporter, ..
            } => {
                self.handle_failure_report(&failed, &reporter);
            }
            PeerMessage::Request { id, body } => {
                let response = self.serve_request(body);
                if link.respond(id, response).await.is_err() {
                    debug!("Could not respond to {}: link closed", link.remote.id);
                }
            }
            PeerMessage::Response { id, body } => {
                link.complete(id, body);
            }
        }
    }

    fn serve_request(&self, request: PeerRequest) -> PeerResponse {
        match request {
            PeerRequest::Replicate {
                key,
                value_json,
                metadata,
            } => {
                let outcome = self.store.put(
                    &key,
                    Record {
                        value_json,
                        metadata,
                    },
                );
                debug!("Replicated key {} ({:?})", key, outcome);
                PeerResponse::Ack { ok: true }
            }
            PeerRequest::Read { key } => PeerResponse::Record {
                record: self.store.get(&key),
            },
            PeerRequest::Write {
                key,
                value_json,
                metadata,
            } => {
                self.store.put(
                    &key,
                    Record {
                        value_json,
                        metadata,
                    },
                );
                PeerResponse::Written {
                    ok: true,
                    node_id: self.local_node.id.clone(),
                }
            }
            PeerRequest::RingSnapshot => PeerResponse::Ring {
                nodes: self.ring.nodes(),
            },
        }
    }

    // ------------------------------------------------------------------
    // Failure detection
    // ------------------------------------------------------------------

    /// Refreshes the peer's liveness clock. Called for every inbound
    /// frame and on membership merges.
    pub fn touch(&self, id: &NodeId) {
        if *id != self.local_node.id {
            self.last_heartbeat.insert(id.clone(), Instant::now());
        }
    }

    async fn heartbeat_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.heartbeat_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let timestamp_ms = now_ms();
            for entry in self.peers.iter() {
                entry.value().notify(PeerMessage::Heartbeat {
                    from: self.local_node.id.clone(),
                    timestamp_ms,
                });
            }

            let threshold = self.config.failure_threshold;
            let expired: Vec<NodeId> = self
                .last_heartbeat
                .iter()
                .filter(|entry| entry.value().elapsed() > threshold)
                .map(|entry| entry.key().clone())
                .collect();

            for id in expired {
                warn!("No heartbeat from {} within {:?}", id, threshold);
                self.declare_failed(&id);
            }
        }
    }

    /// Ejects a peer: ring removal, link teardown, and best-effort
    /// gossip to the remaining peers. Idempotent; failure is sticky
    /// until the peer re-identifies.
    pub fn declare_failed(&self, id: &NodeId) {
        if *id == self.local_node.id {
            return;
        }

        self.last_heartbeat.remove(id);
        if let Some((_, old)) = self.peers.remove(id) {
            old.close();
        }

        let Some(info) = self.ring.node(id) else {
            return; // already off the ring
        };
        warn!("Declaring node {} at {} failed", id, info.address);
        self.ring.remove_node(id);
        self.failed.insert(id.clone(), info);

        let timestamp_ms = now_ms();
        for entry in self.peers.iter() {
            entry.value().notify(PeerMessage::NodeFailure {
                failed: id.clone(),
                reporter: self.local_node.id.clone(),
                timestamp_ms,
            });
        }
    }

    /// Applies a gossiped failure report. The report alone is never
    /// trusted: the peer is ejected only when the local detector has
    /// also not heard from it for at least half the failure threshold,
    /// so a partitioned reporter cannot evict nodes we still hear from.
    pub fn handle_failure_report(&self, failed: &NodeId, reporter: &NodeId) {
        if *failed == self.local_node.id {
            debug!("Peer {} reported us failed; ignoring", reporter);
            return;
        }
        if !self.ring.contains(failed) {
            return;
        }

        let recently_heard = self
            .last_heartbeat
            .get(failed)
            .map(|seen| seen.elapsed() < self.config.failure_threshold / 2)
            .unwrap_or(false);

        if recently_heard {
            debug!(
                "Ignoring failure report for {} from {}: recently heard from it",
                failed, reporter
            );
        } else {
            info!(
                "Confirming failure of {} reported by {}",
                failed, reporter
            );
            self.declare_failed(failed);
        }
    }

    // ------------------------------------------------------------------
    // Accept loop
    // ------------------------------------------------------------------

    async fn accept_loop(self: Arc<Self>) {
        info!(
            "Peer wire listening on {} as node {}",
            self.local_node.address, self.local_node.id
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, remote_addr)) => {
                    let _ = self.clone().spawn_link(stream, remote_addr);
                }
                Err(e) => {
                    warn!("Failed to accept peer connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}
