use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::store::types::{Metadata, Record};

/// Unique identifier for a node in the cluster.
/// Wrapper around a short string; generated ids are UUID v4.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity and network address of a node, as exchanged on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeInfo {
    pub id: NodeId,
    /// Peer-wire address. The node's HTTP API is at port + 1000.
    pub address: SocketAddr,
}

/// Liveness of a peer from the local node's point of view.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeState {
    Alive,
    Failed,
}

impl NodeState {
    pub fn label(self) -> &'static str {
        match self {
            NodeState::Alive => "alive",
            NodeState::Failed => "failed",
        }
    }
}

/// The peer wire protocol. One tagged frame per message, encoded with
/// bincode behind a 4-byte big-endian length prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PeerMessage {
    /// First message each side sends after connect. Until it arrives the
    /// receiving side ignores everything else on the link.
    Identify { node: NodeInfo },

    /// Periodic liveness signal. No reply.
    Heartbeat { from: NodeId, timestamp_ms: u64 },

    /// Best-effort gossip that `failed` went silent, as observed by
    /// `reporter`. Advisory: receivers confirm against their own
    /// heartbeat history before acting. No reply.
    NodeFailure {
        failed: NodeId,
        reporter: NodeId,
        timestamp_ms: u64,
    },

    /// A request expecting a `Response` frame with the same id.
    Request { id: u64, body: PeerRequest },

    /// Reply to the `Request` frame carrying `id`.
    Response { id: u64, body: PeerResponse },
}

/// Request bodies carried over a peer link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PeerRequest {
    /// Write fan-out: store this record under last-writer-wins rules.
    Replicate {
        key: String,
        value_json: String,
        metadata: Metadata,
    },

    /// Read fan-out: return the local record for `key`, if any.
    Read { key: String },

    /// Remote write: store the record and acknowledge with identity.
    Write {
        key: String,
        value_json: String,
        metadata: Metadata,
    },

    /// Bootstrap: return every node descriptor the receiver has on its
    /// ring.
    RingSnapshot,
}

/// Response bodies, matched to requests by correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PeerResponse {
    /// Acknowledges a `Replicate`.
    Ack { ok: bool },

    /// Answers a `Read`.
    Record { record: Option<Record> },

    /// Acknowledges a `Write`.
    Written { ok: bool, node_id: NodeId },

    /// Answers a `RingSnapshot`.
    Ring { nodes: Vec<NodeInfo> },
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
