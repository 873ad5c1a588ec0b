use serde::{Deserialize, Serialize};

use crate::cluster::types::NodeId;

/// Write metadata attached to every stored value.
///
/// `timestamp` carries the conflict-resolution ordering; `version` is a
/// per-key counter kept for diagnostics and `origin` identifies the
/// coordinator that accepted the write (also the tie-breaker on reads).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Metadata {
    /// Milliseconds since the Unix epoch, strictly monotonic per
    /// coordinator.
    pub timestamp: u64,
    /// Monotonic per-key write counter.
    pub version: u64,
    /// The coordinator that accepted the write.
    pub origin: NodeId,
}

/// A stored value and its metadata. The value is the client's blob,
/// carried as serialized JSON and never interpreted by the core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Record {
    pub value_json: String,
    pub metadata: Metadata,
}

/// The action a `put` took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The record was stored (fresh key or newer timestamp).
    Written,
    /// An equally old or newer record was already present; no-op.
    SkippedOlder,
}
