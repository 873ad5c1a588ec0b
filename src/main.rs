use std::sync::Arc;

use quorum_kv::api;
use quorum_kv::cluster::types::NodeId;
use quorum_kv::cluster::ClusterService;
use quorum_kv::config::NodeConfig;
use quorum_kv::coordinator::Coordinator;
use quorum_kv::ring::HashRing;
use quorum_kv::store::LocalStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!(
            "Usage: {} --bind <addr:port> [--node-id <id>] [--seed <addr:port>]...",
            args[0]
        );
        eprintln!("Example: {} --bind 127.0.0.1:7000", args[0]);
        eprintln!(
            "Example: {} --bind 127.0.0.1:7001 --seed 127.0.0.1:7000",
            args[0]
        );
        std::process::exit(1);
    }

    let config = NodeConfig::from_args(&args)?;
    let node_id = config
        .node_id
        .clone()
        .map(NodeId)
        .unwrap_or_else(NodeId::random);

    tracing::info!("Starting node {} on {}", node_id, config.bind_addr);
    if config.seeds.is_empty() {
        tracing::info!("No seeds given; starting a fresh cluster");
    } else {
        tracing::info!("Seeds: {:?}", config.seeds);
    }
    tracing::info!(
        "Replication factor {} (quorum {}), {} virtual nodes",
        config.replication_factor,
        config.replication_factor / 2 + 1,
        config.virtual_nodes
    );

    // 1. Data plane: store, ring, peer wire.
    let store = Arc::new(LocalStore::new());
    let ring = Arc::new(HashRing::new(
        config.virtual_nodes,
        config.replication_factor,
    ));
    let cluster = ClusterService::new(node_id, config.clone(), ring, store).await?;
    cluster.start();

    // 2. Bootstrap. A failed bootstrap is fatal: exit non-zero.
    cluster.join(&config.seeds).await?;

    // 3. Client surface.
    let coordinator = Arc::new(Coordinator::new(cluster.clone()));
    let app = api::router(coordinator, cluster.clone());

    let http_addr = config.http_addr();
    tracing::info!("HTTP API listening on {}", http_addr);

    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
