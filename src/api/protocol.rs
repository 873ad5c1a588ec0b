//! HTTP Data Transfer Objects
//!
//! Request and response bodies of the client API. Response field names
//! are camelCase on the wire.

use serde::{Deserialize, Serialize};

use crate::coordinator::types::{PutReport, ReplicaWrite};
use crate::store::types::Metadata;

/// Body of `PUT /data/{key}`. The value is an arbitrary JSON blob the
/// core never interprets.
#[derive(Debug, Deserialize)]
pub struct PutBody {
    pub value: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PutDataResponse {
    pub success: bool,
    pub key: String,
    pub replica_nodes: Vec<String>,
    pub successful_writes: usize,
    pub quorum_size: usize,
    pub quorum_achieved: bool,
    pub write_results: Vec<WriteResult>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResult {
    pub node_id: String,
    pub status: &'static str,
}

impl From<PutReport> for PutDataResponse {
    fn from(report: PutReport) -> Self {
        Self {
            success: report.success,
            key: report.key,
            replica_nodes: report.replicas.into_iter().map(|id| id.0).collect(),
            successful_writes: report.successful_writes,
            quorum_size: report.quorum,
            quorum_achieved: report.success,
            write_results: report.results.into_iter().map(WriteResult::from).collect(),
        }
    }
}

impl From<ReplicaWrite> for WriteResult {
    fn from(result: ReplicaWrite) -> Self {
        Self {
            node_id: result.node_id.0,
            status: result.outcome.label(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataBody {
    pub version: u64,
    pub timestamp: u64,
    pub node_id: String,
}

impl From<Metadata> for MetadataBody {
    fn from(metadata: Metadata) -> Self {
        Self {
            version: metadata.version,
            timestamp: metadata.timestamp,
            node_id: metadata.origin.0,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetDataResponse {
    pub value: serde_json::Value,
    pub metadata: MetadataBody,
    pub read_results: usize,
    pub quorum_achieved: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeEntry {
    pub node_id: String,
    pub status: &'static str,
    pub address: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatusResponse {
    pub local_node: String,
    pub total_nodes: usize,
    pub alive_nodes: usize,
    pub replication_factor: usize,
    pub quorum_size: usize,
    pub nodes: Vec<NodeEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRingResponse {
    pub total_nodes: usize,
    pub virtual_nodes: usize,
    pub replication_factor: usize,
    pub ring_size: usize,
    pub nodes: Vec<NodeEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub node_id: String,
    pub address: String,
    pub is_alive: bool,
    pub data_count: usize,
    pub peers_count: usize,
    pub timestamp: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddNodeRequest {
    pub node_id: String,
    pub address: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddNodeResponse {
    pub success: bool,
    pub message: String,
}

/// Host-level process statistics, for dashboards.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatsResponse {
    pub node_id: String,
    pub address: String,
    pub data_count: usize,
    pub peers_count: usize,
    pub cpu_usage: f32,
    pub mem_used_mb: u64,
    pub mem_total_mb: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}
