//! HTTP Handlers
//!
//! Translate client requests into coordinator calls. These functions are
//! the only place where coordinator errors become HTTP statuses: 404 for
//! a key no replica holds, 500 for everything else. Partial replication
//! success is carried in the body, never in the status code.

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::collections::BTreeMap;
use std::sync::Arc;
use sysinfo::System;

use super::protocol::*;
use crate::cluster::types::{now_ms, NodeId, NodeInfo, NodeState};
use crate::cluster::ClusterService;
use crate::coordinator::Coordinator;

fn internal_error(error: impl std::fmt::Display) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: error.to_string(),
        }),
    )
        .into_response()
}

/// `PUT /data/{key}`: quorum write.
pub async fn handle_put_data(
    Extension(coordinator): Extension<Arc<Coordinator>>,
    Path(key): Path<String>,
    Json(body): Json<PutBody>,
) -> Response {
    let value_json = match serde_json::to_string(&body.value) {
        Ok(value_json) => value_json,
        Err(e) => return internal_error(e),
    };

    match coordinator.put(&key, value_json).await {
        Ok(report) => Json(PutDataResponse::from(report)).into_response(),
        Err(e) => {
            tracing::error!("PUT {} failed: {}", key, e);
            internal_error(e)
        }
    }
}

/// `GET /data/{key}`: quorum-annotated read.
pub async fn handle_get_data(
    Extension(coordinator): Extension<Arc<Coordinator>>,
    Path(key): Path<String>,
) -> Response {
    match coordinator.get(&key).await {
        Ok(Some(report)) => {
            let value = match serde_json::from_str(&report.record.value_json) {
                Ok(value) => value,
                Err(e) => return internal_error(e),
            };
            Json(GetDataResponse {
                value,
                metadata: MetadataBody::from(report.record.metadata),
                read_results: report.read_results,
                quorum_achieved: report.quorum_achieved,
            })
            .into_response()
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: format!("key {} not found on any replica", key),
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("GET {} failed: {}", key, e);
            internal_error(e)
        }
    }
}

fn node_entries(cluster: &ClusterService) -> Vec<NodeEntry> {
    let ring = cluster.ring();
    let mut entries: Vec<NodeEntry> = ring
        .nodes()
        .into_iter()
        .map(|node| NodeEntry {
            node_id: node.id.0,
            status: NodeState::Alive.label(),
            address: node.address.to_string(),
        })
        .collect();
    entries.extend(cluster.failed_nodes().into_iter().map(|node| NodeEntry {
        node_id: node.id.0,
        status: NodeState::Failed.label(),
        address: node.address.to_string(),
    }));
    entries
}

/// `GET /cluster/status`: membership summary.
pub async fn handle_cluster_status(
    Extension(cluster): Extension<Arc<ClusterService>>,
) -> Json<ClusterStatusResponse> {
    let ring = cluster.ring();
    let nodes = node_entries(&cluster);

    Json(ClusterStatusResponse {
        local_node: cluster.local_node.id.0.clone(),
        total_nodes: nodes.len(),
        alive_nodes: ring.node_count(),
        replication_factor: ring.replication_factor(),
        quorum_size: ring.quorum(),
        nodes,
    })
}

/// `GET /cluster/ring`: ring geometry.
pub async fn handle_cluster_ring(
    Extension(cluster): Extension<Arc<ClusterService>>,
) -> Json<ClusterRingResponse> {
    let ring = cluster.ring();

    Json(ClusterRingResponse {
        total_nodes: ring.node_count(),
        virtual_nodes: ring.virtual_nodes(),
        replication_factor: ring.replication_factor(),
        ring_size: ring.ring_size(),
        nodes: node_entries(&cluster),
    })
}

/// `GET /cluster/distribution`: replica placement of a sample of the
/// locally stored keys.
pub async fn handle_cluster_distribution(
    Extension(cluster): Extension<Arc<ClusterService>>,
) -> Json<BTreeMap<String, Vec<String>>> {
    const SAMPLE: usize = 32;
    let ring = cluster.ring();

    let mut keys = cluster.store().keys();
    keys.sort();
    keys.truncate(SAMPLE);

    let distribution = keys
        .into_iter()
        .map(|key| {
            let replicas = ring
                .replicas(&key)
                .into_iter()
                .map(|id| id.0)
                .collect::<Vec<_>>();
            (key, replicas)
        })
        .collect();

    Json(distribution)
}

/// `GET /health`: local node liveness and counters.
pub async fn handle_health(
    Extension(cluster): Extension<Arc<ClusterService>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        node_id: cluster.local_node.id.0.clone(),
        address: cluster.local_node.address.to_string(),
        is_alive: true,
        data_count: cluster.store().len(),
        peers_count: cluster.peer_count(),
        timestamp: now_ms(),
    })
}

/// `POST /cluster/nodes`: explicit membership addition.
pub async fn handle_add_node(
    Extension(cluster): Extension<Arc<ClusterService>>,
    Json(request): Json<AddNodeRequest>,
) -> Response {
    let address = match request.address.parse() {
        Ok(address) => address,
        Err(e) => return internal_error(format!("invalid address {}: {}", request.address, e)),
    };
    let node = NodeInfo {
        id: NodeId(request.node_id),
        address,
    };

    match cluster.add_peer(node.clone()).await {
        Ok(()) => Json(AddNodeResponse {
            success: true,
            message: format!("node {} added to ring", node.id),
        })
        .into_response(),
        Err(e) => {
            tracing::error!("Adding node {} failed: {}", node.id, e);
            internal_error(e)
        }
    }
}

/// `GET /cluster/stats`: process statistics for dashboards.
pub async fn handle_cluster_stats(
    Extension(cluster): Extension<Arc<ClusterService>>,
) -> Json<ClusterStatsResponse> {
    let mut sys = System::new_all();
    sys.refresh_cpu();
    sys.refresh_memory();
    let cpu_usage = sys.global_cpu_info().cpu_usage();
    // sysinfo reports memory in bytes.
    let mem_total_mb = sys.total_memory() / (1024 * 1024);
    let mem_used_mb = sys.used_memory() / (1024 * 1024);

    Json(ClusterStatsResponse {
        node_id: cluster.local_node.id.0.clone(),
        address: cluster.local_node.address.to_string(),
        data_count: cluster.store().len(),
        peers_count: cluster.peer_count(),
        cpu_usage,
        mem_used_mb,
        mem_total_mb,
    })
}
