use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::cluster::types::{NodeId, NodeInfo};

/// Maps a byte string onto the ring: first four bytes of its SHA-256
/// digest, big-endian, as an unsigned 32-bit position.
pub fn ring_position(bytes: &[u8]) -> u32 {
    let digest = Sha256::digest(bytes);
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// One immutable view of the ring topology.
///
/// `positions` is the sorted ring (position -> owning node); `nodes` is
/// the descriptor table. Every node id appearing in `positions` has an
/// entry in `nodes`.
#[derive(Debug, Clone, Default)]
struct RingState {
    positions: BTreeMap<u32, NodeId>,
    nodes: HashMap<NodeId, NodeInfo>,
}

/// Consistent-hash ring with virtual nodes.
///
/// Mutations clone the current state, apply the change, and swap the new
/// state in under the write lock. Readers clone an `Arc` and walk a
/// topology that can no longer change underneath them, so a node is
/// always observed with all of its virtual entries or none of them.
pub struct HashRing {
    virtual_nodes: usize,
    replication_factor: usize,
    state: RwLock<Arc<RingState>>,
}

impl HashRing {
    pub fn new(virtual_nodes: usize, replication_factor: usize) -> Self {
        Self {
            virtual_nodes: virtual_nodes.max(1),
            replication_factor: replication_factor.max(1),
            state: RwLock::new(Arc::new(RingState::default())),
        }
    }

    fn snapshot(&self) -> Arc<RingState> {
        self.state.read().expect("ring lock poisoned").clone()
    }

    /// Inserts the node's V virtual entries. Idempotent: a node that is
    /// already present leaves the ring untouched. Returns whether the
    /// topology changed.
    pub fn add_node(&self, node: NodeInfo) -> bool {
        let mut guard = self.state.write().expect("ring lock poisoned");
        if guard.nodes.contains_key(&node.id) {
            return false;
        }

        let mut next = (**guard).clone();
        for i in 0..self.virtual_nodes {
            let position = ring_position(format!("{}:{}", node.id.0, i).as_bytes());
            // On the rare position collision the node already there wins.
            next.positions.entry(position).or_insert_with(|| node.id.clone());
        }
        next.nodes.insert(node.id.clone(), node);
        *guard = Arc::new(next);
        true
    }

    /// Deletes all entries owned by `id`. Idempotent on absent ids.
    /// Returns whether the topology changed.
    pub fn remove_node(&self, id: &NodeId) -> bool {
        let mut guard = self.state.write().expect("ring lock poisoned");
        if !guard.nodes.contains_key(id) {
            return false;
        }

        let mut next = (**guard).clone();
        next.positions.retain(|_, owner| owner != id);
        next.nodes.remove(id);
        *guard = Arc::new(next);
        true
    }

    /// The node owning the smallest ring position at or after the key's
    /// position, wrapping to the first entry past twelve o'clock.
    pub fn primary(&self, key: &str) -> Option<NodeId> {
        let state = self.snapshot();
        let position = ring_position(key.as_bytes());
        state
            .positions
            .range(position..)
            .next()
            .or_else(|| state.positions.iter().next())
            .map(|(_, id)| id.clone())
    }

    /// The replica set for a key: walk clockwise from the key's position
    /// and collect distinct node ids until min(R, N) have been gathered.
    /// The returned order is the clockwise visitation order.
    pub fn replicas(&self, key: &str) -> Vec<NodeId> {
        let state = self.snapshot();
        if state.positions.is_empty() {
            return vec![];
        }

        let want = self.replication_factor.min(state.nodes.len());
        let position = ring_position(key.as_bytes());
        let mut replicas: Vec<NodeId> = Vec::with_capacity(want);

        let clockwise = state
            .positions
            .range(position..)
            .chain(state.positions.range(..position));
        for (_, id) in clockwise {
            if !replicas.contains(id) {
                replicas.push(id.clone());
                if replicas.len() == want {
                    break;
                }
            }
        }

        replicas
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.snapshot().nodes.contains_key(id)
    }

    pub fn node(&self, id: &NodeId) -> Option<NodeInfo> {
        self.snapshot().nodes.get(id).cloned()
    }

    /// All node descriptors currently on the ring.
    pub fn nodes(&self) -> Vec<NodeInfo> {
        let mut nodes: Vec<NodeInfo> = self.snapshot().nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    pub fn node_count(&self) -> usize {
        self.snapshot().nodes.len()
    }

    /// Number of virtual entries currently on the ring.
    pub fn ring_size(&self) -> usize {
        self.snapshot().positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().nodes.is_empty()
    }

    pub fn virtual_nodes(&self) -> usize {
        self.virtual_nodes
    }

    pub fn replication_factor(&self) -> usize {
        self.replication_factor
    }

    /// Majority quorum for the configured replication factor.
    pub fn quorum(&self) -> usize {
        self.replication_factor / 2 + 1
    }

    /// The sorted (position, node) entries. Diagnostics only.
    pub fn entries(&self) -> Vec<(u32, NodeId)> {
        self.snapshot()
            .positions
            .iter()
            .map(|(position, id)| (*position, id.clone()))
            .collect()
    }
}
