use std::sync::atomic::{AtomicU64, Ordering};

use crate::cluster::types::{now_ms, NodeId};
use crate::store::types::Record;

/// Outcome of one replica write during a PUT fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaOutcome {
    /// The replica acknowledged the write.
    Ok,
    /// No acknowledgment within the per-request deadline.
    Timeout,
    /// The target is on the ring but no live link exists.
    NotConnected,
}

impl ReplicaOutcome {
    pub fn is_ok(self) -> bool {
        matches!(self, ReplicaOutcome::Ok)
    }

    pub fn label(self) -> &'static str {
        match self {
            ReplicaOutcome::Ok => "ok",
            ReplicaOutcome::Timeout => "timeout",
            ReplicaOutcome::NotConnected => "not_connected",
        }
    }
}

/// Per-target result of a PUT fan-out.
#[derive(Debug, Clone)]
pub struct ReplicaWrite {
    pub node_id: NodeId,
    pub outcome: ReplicaOutcome,
}

/// What a coordinated PUT did.
#[derive(Debug, Clone)]
pub struct PutReport {
    pub key: String,
    /// Whether at least a quorum of replicas acknowledged.
    pub success: bool,
    /// The key's replica set, in ring order.
    pub replicas: Vec<NodeId>,
    pub successful_writes: usize,
    pub quorum: usize,
    pub results: Vec<ReplicaWrite>,
}

/// What a coordinated GET found.
#[derive(Debug, Clone)]
pub struct GetReport {
    /// The freshest record among the replica replies.
    pub record: Record,
    /// How many replicas returned a record.
    pub read_results: usize,
    pub quorum: usize,
    pub quorum_achieved: bool,
}

/// Issues write timestamps: wall-clock milliseconds forced strictly
/// monotonic, so two writes accepted by one coordinator can never carry
/// the same or reordered timestamps even across clock steps.
pub struct WriteClock {
    last: AtomicU64,
}

impl WriteClock {
    pub fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    pub fn next(&self) -> u64 {
        let now = now_ms();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self.last.compare_exchange_weak(
                prev,
                next,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(observed) => prev = observed,
            }
        }
    }
}

impl Default for WriteClock {
    fn default() -> Self {
        Self::new()
    }
}
