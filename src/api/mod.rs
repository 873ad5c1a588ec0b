//! HTTP API Module
//!
//! The client-facing adapter: a thin Axum surface that translates HTTP
//! requests into coordinator calls and cluster introspection.
//!
//! Per-replica failures never surface as HTTP errors; they are part of
//! the response body. The only error statuses are 404 (no replica holds
//! the key) and 500 (coordinator failure, e.g. an empty ring).

pub mod handlers;
pub mod protocol;

use axum::extract::Extension;
use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;

use crate::cluster::ClusterService;
use crate::coordinator::Coordinator;

/// Builds the node's HTTP router.
pub fn router(coordinator: Arc<Coordinator>, cluster: Arc<ClusterService>) -> Router {
    Router::new()
        .route(
            "/data/:key",
            put(handlers::handle_put_data).get(handlers::handle_get_data),
        )
        .route("/cluster/status", get(handlers::handle_cluster_status))
        .route("/cluster/ring", get(handlers::handle_cluster_ring))
        .route(
            "/cluster/distribution",
            get(handlers::handle_cluster_distribution),
        )
        .route("/cluster/nodes", post(handlers::handle_add_node))
        .route("/cluster/stats", get(handlers::handle_cluster_stats))
        .route("/health", get(handlers::handle_health))
        .layer(Extension(coordinator))
        .layer(Extension(cluster))
}
