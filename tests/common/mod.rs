use quorum_kv::api;
use quorum_kv::cluster::types::NodeId;
use quorum_kv::cluster::ClusterService;
use quorum_kv::config::NodeConfig;
use quorum_kv::coordinator::Coordinator;
use quorum_kv::ring::HashRing;
use quorum_kv::store::LocalStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// One fully wired node: peer wire, coordinator, and HTTP surface on an
/// ephemeral port.
pub struct TestNode {
    pub cluster: Arc<ClusterService>,
    pub http_addr: SocketAddr,
}

impl TestNode {
    pub fn peer_addr(&self) -> SocketAddr {
        self.cluster.local_node.address
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.http_addr, path)
    }
}

pub async fn start_node(name: &str, replication_factor: usize, seeds: &[SocketAddr]) -> TestNode {
    let config = NodeConfig {
        replication_factor,
        virtual_nodes: 3,
        heartbeat_interval: Duration::from_millis(200),
        failure_threshold: Duration::from_secs(10),
        request_timeout: Duration::from_millis(1000),
        ..NodeConfig::default()
    };

    let ring = Arc::new(HashRing::new(
        config.virtual_nodes,
        config.replication_factor,
    ));
    let store = Arc::new(LocalStore::new());
    let cluster = ClusterService::new(NodeId(name.to_string()), config, ring, store)
        .await
        .expect("peer wire bind failed");
    cluster.start();
    cluster.join(seeds).await.expect("bootstrap failed");

    let coordinator = Arc::new(Coordinator::new(cluster.clone()));
    let app = api::router(coordinator, cluster.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("http bind failed");
    let http_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestNode { cluster, http_addr }
}

/// Waits until every node sees a ring of `size` nodes and a live link to
/// each of the others.
pub async fn wait_for_cluster(nodes: &[&TestNode], size: usize) {
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        let converged = nodes.iter().all(|node| {
            node.cluster.ring().node_count() == size && node.cluster.peer_count() == size - 1
        });
        if converged {
            return;
        }
        if std::time::Instant::now() > deadline {
            panic!("cluster did not converge to {} nodes", size);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
