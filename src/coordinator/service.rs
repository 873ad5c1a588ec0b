use anyhow::{bail, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::types::{GetReport, PutReport, ReplicaOutcome, ReplicaWrite, WriteClock};
use crate::cluster::types::{NodeId, PeerRequest, PeerResponse};
use crate::cluster::{ClusterService, RequestError};
use crate::ring::HashRing;
use crate::store::types::{Metadata, Record};
use crate::store::LocalStore;

/// Orchestrates client PUT and GET against the key's replica set.
///
/// Any node coordinates any key: the ring names the targets, the local
/// store serves the local one, peer links serve the rest. Partial
/// writes are never rolled back; a quorum miss is reported to the
/// client and the divergence stands until a newer write supersedes it.
pub struct Coordinator {
    cluster: Arc<ClusterService>,
    ring: Arc<HashRing>,
    store: Arc<LocalStore>,
    clock: WriteClock,
    strict_quorum_reads: bool,
}

impl Coordinator {
    pub fn new(cluster: Arc<ClusterService>) -> Self {
        let ring = cluster.ring().clone();
        let store = cluster.store().clone();
        let strict_quorum_reads = cluster.config().strict_quorum_reads;
        Self {
            cluster,
            ring,
            store,
            clock: WriteClock::new(),
            strict_quorum_reads,
        }
    }

    pub fn local_id(&self) -> &NodeId {
        &self.cluster.local_node.id
    }

    /// Writes `value_json` under `key` across the key's replica set and
    /// reports the quorum tally. Fails only on invalid input or an
    /// empty ring; replica failures are data in the report.
    pub async fn put(&self, key: &str, value_json: String) -> Result<PutReport> {
        if key.is_empty() {
            bail!("key must not be empty");
        }

        let targets = self.ring.replicas(key);
        if targets.is_empty() {
            bail!("ring is empty: no nodes available to place key");
        }
        let quorum = self.ring.quorum();

        let metadata = Metadata {
            timestamp: self.clock.next(),
            version: self
                .store
                .get(key)
                .map(|record| record.metadata.version + 1)
                .unwrap_or(1),
            origin: self.local_id().clone(),
        };

        let mut branches: Vec<JoinHandle<ReplicaOutcome>> = Vec::with_capacity(targets.len());
        for target in &targets {
            branches.push(self.spawn_write(target, key, &value_json, &metadata));
        }

        let mut results = Vec::with_capacity(targets.len());
        for (target, branch) in targets.iter().zip(branches) {
            let outcome = branch.await.unwrap_or(ReplicaOutcome::NotConnected);
            if !outcome.is_ok() {
                warn!("Replica write to {} failed: {}", target, outcome.label());
            }
            results.push(ReplicaWrite {
                node_id: target.clone(),
                outcome,
            });
        }

        let successful_writes = results.iter().filter(|r| r.outcome.is_ok()).count();
        let success = successful_writes >= quorum;
        debug!(
            "PUT {}: {}/{} acks (quorum {})",
            key,
            successful_writes,
            targets.len(),
            quorum
        );

        Ok(PutReport {
            key: key.to_string(),
            success,
            replicas: targets,
            successful_writes,
            quorum,
            results,
        })
    }

    fn spawn_write(
        &self,
        target: &NodeId,
        key: &str,
        value_json: &str,
        metadata: &Metadata,
    ) -> JoinHandle<ReplicaOutcome> {
        let key = key.to_string();
        let value_json = value_json.to_string();
        let metadata = metadata.clone();

        if *target == self.cluster.local_node.id {
            let store = self.store.clone();
            return tokio::spawn(async move {
                store.put(
                    &key,
                    Record {
                        value_json,
                        metadata,
                    },
                );
                ReplicaOutcome::Ok
            });
        }

        match self.cluster.link(target) {
            None => tokio::spawn(async move { ReplicaOutcome::NotConnected }),
            Some(link) => tokio::spawn(async move {
                let request = PeerRequest::Replicate {
                    key,
                    value_json,
                    metadata,
                };
                match link.request(request).await {
                    Ok(PeerResponse::Ack { ok: true }) => ReplicaOutcome::Ok,
                    Ok(_) => ReplicaOutcome::NotConnected,
                    Err(RequestError::Timeout) => ReplicaOutcome::Timeout,
                    Err(RequestError::Closed) => ReplicaOutcome::NotConnected,
                }
            }),
        }
    }

    /// Reads `key` from every replica, waits for all replies or their
    /// timeouts, and returns the freshest record. `Ok(None)` means no
    /// replica holds the key.
    pub async fn get(&self, key: &str) -> Result<Option<GetReport>> {
        if key.is_empty() {
            bail!("key must not be empty");
        }

        let targets = self.ring.replicas(key);
        if targets.is_empty() {
            bail!("ring is empty: no nodes available to read key");
        }
        let quorum = self.ring.quorum();

        let mut branches: Vec<JoinHandle<Option<Record>>> = Vec::with_capacity(targets.len());
        for target in &targets {
            branches.push(self.spawn_read(target, key));
        }

        let mut records: Vec<Record> = Vec::with_capacity(targets.len());
        for branch in branches {
            if let Ok(Some(record)) = branch.await {
                records.push(record);
            }
        }

        let read_results = records.len();
        let quorum_achieved = read_results >= quorum;
        if self.strict_quorum_reads && !quorum_achieved && read_results > 0 {
            bail!(
                "strict quorum read failed: {} of {} required replies",
                read_results,
                quorum
            );
        }

        // Largest timestamp wins; equal timestamps fall back to the
        // origin id so every coordinator resolves the same winner.
        let freshest = records.into_iter().max_by(|a, b| {
            (a.metadata.timestamp, &a.metadata.origin)
                .cmp(&(b.metadata.timestamp, &b.metadata.origin))
        });

        Ok(freshest.map(|record| GetReport {
            record,
            read_results,
            quorum,
            quorum_achieved,
        }))
    }

    fn spawn_read(&self, target: &NodeId, key: &str) -> JoinHandle<Option<Record>> {
        let key = key.to_string();

        if *target == self.cluster.local_node.id {
            let store = self.store.clone();
            return tokio::spawn(async move { store.get(&key) });
        }

        match self.cluster.link(target) {
            None => tokio::spawn(async move { None }),
            Some(link) => {
                let target = target.clone();
                tokio::spawn(async move {
                    match link.request(PeerRequest::Read { key }).await {
                        Ok(PeerResponse::Record { record }) => record,
                        Ok(_) => None,
                        Err(e) => {
                            debug!("Replica read from {} failed: {}", target, e);
                            None
                        }
                    }
                })
            }
        }
    }
}
