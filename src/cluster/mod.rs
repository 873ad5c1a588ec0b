//! Cluster Module
//!
//! Peer-to-peer plumbing for the data plane: one multiplexed TCP link per
//! remote node, heartbeat exchange, and the failure detector that ejects
//! silent peers from the ring.
//!
//! ## Core Mechanisms
//! - **Peer links**: length-prefixed bincode frames over TCP. Each link
//!   carries requests with correlation ids (replicate/read/write/ring
//!   snapshot) alongside fire-and-forget notices (identify, heartbeat,
//!   failure gossip).
//! - **Identify-first lifecycle**: `identify` must be the first message
//!   each side sends after connect; anything else is ignored until then.
//! - **Failure detection**: a background task sends heartbeats every H ms
//!   and declares peers failed after T ms of silence. Failure is sticky
//!   until the peer reconnects with a fresh `identify`.
//! - **Failure gossip**: declared failures are broadcast best-effort; a
//!   receiver confirms only if its own detector also finds the peer
//!   silent, so a partitioned reporter cannot evict healthy nodes.

pub mod link;
pub mod service;
pub mod types;

pub use link::{PeerLink, RequestError};
pub use service::ClusterService;
pub use types::{NodeId, NodeInfo, NodeState};

#[cfg(test)]
mod tests;
