#[cfg(test)]
mod tests {
    use crate::cluster::link::{read_frame, write_frame};
    use crate::cluster::service::ClusterService;
    use crate::cluster::types::{NodeId, NodeInfo, PeerMessage, PeerRequest, PeerResponse};
    use crate::config::NodeConfig;
    use crate::ring::HashRing;
    use crate::store::types::{Metadata, Record};
    use crate::store::LocalStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_config(heartbeat_ms: u64, threshold_ms: u64) -> NodeConfig {
        NodeConfig {
            virtual_nodes: 3,
            heartbeat_interval: Duration::from_millis(heartbeat_ms),
            failure_threshold: Duration::from_millis(threshold_ms),
            request_timeout: Duration::from_millis(1000),
            ..NodeConfig::default()
        }
    }

    async fn spawn_node(name: &str, config: NodeConfig) -> Arc<ClusterService> {
        let ring = Arc::new(HashRing::new(
            config.virtual_nodes,
            config.replication_factor,
        ));
        let store = Arc::new(LocalStore::new());
        let service = ClusterService::new(NodeId(name.to_string()), config, ring, store)
            .await
            .expect("bind failed");
        service.start();
        service
    }

    /// Polls `condition` until it holds or the deadline passes.
    async fn wait_until(what: &str, deadline: Duration, condition: impl Fn() -> bool) {
        let started = std::time::Instant::now();
        while !condition() {
            if started.elapsed() > deadline {
                panic!("timed out waiting for: {}", what);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    fn metadata(timestamp: u64, origin: &str) -> Metadata {
        Metadata {
            timestamp,
            version: 1,
            origin: NodeId(origin.to_string()),
        }
    }

    // ============================================================
    // WIRE FORMAT
    // ============================================================

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let message = PeerMessage::Identify {
            node: NodeInfo {
                id: NodeId("node-a".to_string()),
                address: "127.0.0.1:7000".parse().unwrap(),
            },
        };
        write_frame(&mut client, &message).await.unwrap();

        let decoded = read_frame(&mut server).await.unwrap();
        match decoded {
            PeerMessage::Identify { node } => {
                assert_eq!(node.id.0, "node-a");
                assert_eq!(node.address.port(), 7000);
            }
            other => panic!("wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_request_frame_serialization() {
        let message = PeerMessage::Request {
            id: 42,
            body: PeerRequest::Replicate {
                key: "user:1".to_string(),
                value_json: "{\"name\":\"John\"}".to_string(),
                metadata: metadata(1000, "node-a"),
            },
        };

        let encoded = bincode::serialize(&message).expect("serialize failed");
        let decoded: PeerMessage = bincode::deserialize(&encoded).expect("deserialize failed");

        match decoded {
            PeerMessage::Request {
                id,
                body: PeerRequest::Replicate { key, metadata, .. },
            } => {
                assert_eq!(id, 42);
                assert_eq!(key, "user:1");
                assert_eq!(metadata.timestamp, 1000);
            }
            other => panic!("wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_response_frame_serialization() {
        let message = PeerMessage::Response {
            id: 7,
            body: PeerResponse::Record {
                record: Some(Record {
                    value_json: "1".to_string(),
                    metadata: metadata(5, "node-b"),
                }),
            },
        };

        let encoded = bincode::serialize(&message).unwrap();
        let decoded: PeerMessage = bincode::deserialize(&encoded).unwrap();

        match decoded {
            PeerMessage::Response {
                id,
                body: PeerResponse::Record { record: Some(r) },
            } => {
                assert_eq!(id, 7);
                assert_eq!(r.metadata.origin.0, "node-b");
            }
            other => panic!("wrong message type: {:?}", other),
        }
    }

    // ============================================================
    // IDENTIFY & LINKS
    // ============================================================

    #[tokio::test]
    async fn test_connect_identifies_both_sides() {
        let a = spawn_node("node-a", test_config(200, 10_000)).await;
        let b = spawn_node("node-b", test_config(200, 10_000)).await;

        let b_id = a.connect(b.local_node.address).await.unwrap();
        assert_eq!(b_id, b.local_node.id);

        // The dialing side registers immediately; the accepting side
        // registers once the dialer's identify lands.
        assert!(a.link(&b.local_node.id).is_some());
        wait_until("b links a", Duration::from_secs(3), || {
            b.link(&a.local_node.id).is_some()
        })
        .await;

        assert!(a.ring().contains(&b.local_node.id));
        assert!(b.ring().contains(&a.local_node.id));
        assert_eq!(a.peer_count(), 1);
    }

    #[tokio::test]
    async fn test_replicate_request_over_link() {
        let a = spawn_node("node-a", test_config(200, 10_000)).await;
        let b = spawn_node("node-b", test_config(200, 10_000)).await;
        a.connect(b.local_node.address).await.unwrap();

        let link = a.link(&b.local_node.id).unwrap();
        let response = link
            .request(PeerRequest::Replicate {
                key: "user:1".to_string(),
                value_json: "\"John\"".to_string(),
                metadata: metadata(1000, "node-a"),
            })
            .await
            .unwrap();

        assert!(matches!(response, PeerResponse::Ack { ok: true }));
        let stored = b.store().get("user:1").expect("replica should store record");
        assert_eq!(stored.value_json, "\"John\"");
    }

    #[tokio::test]
    async fn test_read_request_over_link() {
        let a = spawn_node("node-a", test_config(200, 10_000)).await;
        let b = spawn_node("node-b", test_config(200, 10_000)).await;
        a.connect(b.local_node.address).await.unwrap();

        b.store().put(
            "user:1",
            Record {
                value_json: "\"Jane\"".to_string(),
                metadata: metadata(2000, "node-b"),
            },
        );

        let link = a.link(&b.local_node.id).unwrap();
        let response = link
            .request(PeerRequest::Read {
                key: "user:1".to_string(),
            })
            .await
            .unwrap();
        match response {
            PeerResponse::Record { record: Some(r) } => assert_eq!(r.value_json, "\"Jane\""),
            other => panic!("unexpected response: {:?}", other),
        }

        let missing = link
            .request(PeerRequest::Read {
                key: "ghost".to_string(),
            })
            .await
            .unwrap();
        assert!(matches!(missing, PeerResponse::Record { record: None }));
    }

    #[tokio::test]
    async fn test_write_request_acknowledges_with_identity() {
        let a = spawn_node("node-a", test_config(200, 10_000)).await;
        let b = spawn_node("node-b", test_config(200, 10_000)).await;
        a.connect(b.local_node.address).await.unwrap();

        let link = a.link(&b.local_node.id).unwrap();
        let response = link
            .request(PeerRequest::Write {
                key: "user:1".to_string(),
                value_json: "\"John\"".to_string(),
                metadata: metadata(1000, "node-a"),
            })
            .await
            .unwrap();

        match response {
            PeerResponse::Written { ok, node_id } => {
                assert!(ok);
                assert_eq!(node_id, b.local_node.id);
            }
            other => panic!("unexpected response: {:?}", other),
        }
        assert!(b.store().get("user:1").is_some());
    }

    #[tokio::test]
    async fn test_ring_snapshot_lists_known_nodes() {
        let a = spawn_node("node-a", test_config(200, 10_000)).await;
        let b = spawn_node("node-b", test_config(200, 10_000)).await;
        a.connect(b.local_node.address).await.unwrap();

        wait_until("b knows both nodes", Duration::from_secs(3), || {
            b.ring().node_count() == 2
        })
        .await;

        let link = a.link(&b.local_node.id).unwrap();
        let response = link.request(PeerRequest::RingSnapshot).await.unwrap();
        match response {
            PeerResponse::Ring { nodes } => {
                let mut ids: Vec<String> = nodes.into_iter().map(|n| n.id.0).collect();
                ids.sort();
                assert_eq!(ids, vec!["node-a".to_string(), "node-b".to_string()]);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    // ============================================================
    // BOOTSTRAP
    // ============================================================

    #[tokio::test]
    async fn test_join_merges_seed_ring() {
        let a = spawn_node("node-a", test_config(200, 10_000)).await;
        let b = spawn_node("node-b", test_config(200, 10_000)).await;
        b.join(&[a.local_node.address]).await.unwrap();

        // C bootstraps via A and must also discover and link B.
        let c = spawn_node("node-c", test_config(200, 10_000)).await;
        c.join(&[a.local_node.address]).await.unwrap();

        wait_until("c links a and b", Duration::from_secs(3), || {
            c.peer_count() == 2
        })
        .await;
        assert_eq!(c.ring().node_count(), 3);

        wait_until("a and b know all nodes", Duration::from_secs(3), || {
            a.ring().node_count() == 3 && b.ring().node_count() == 3
        })
        .await;
    }

    #[tokio::test]
    async fn test_join_fails_when_no_seed_answers() {
        let a = spawn_node("node-a", test_config(200, 10_000)).await;

        // A listener that is bound and immediately dropped leaves a dead
        // address behind.
        let dead = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = dead.local_addr().unwrap();
        drop(dead);

        let result = a.join(&[dead_addr]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_join_with_no_seeds_is_founding_node() {
        let a = spawn_node("node-a", test_config(200, 10_000)).await;
        a.join(&[]).await.unwrap();
        assert_eq!(a.ring().node_count(), 1);
    }

    // ============================================================
    // FAILURE DETECTION
    // ============================================================

    #[tokio::test]
    async fn test_silent_peer_is_declared_failed() {
        // A checks aggressively; B sends its first heartbeat and then
        // goes quiet (its heartbeat task ticks once a minute).
        let a = spawn_node("node-a", test_config(100, 700)).await;
        let b = spawn_node("node-b", test_config(60_000, 60_000)).await;
        a.connect(b.local_node.address).await.unwrap();

        wait_until("a ejects silent b", Duration::from_secs(5), || {
            !a.ring().contains(&b.local_node.id)
        })
        .await;

        assert!(a.link(&b.local_node.id).is_none());
        let failed = a.failed_nodes();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, b.local_node.id);
    }

    #[tokio::test]
    async fn test_disconnect_declares_peer_failed() {
        let a = spawn_node("node-a", test_config(100, 10_000)).await;
        let b = spawn_node("node-b", test_config(100, 10_000)).await;
        a.connect(b.local_node.address).await.unwrap();
        wait_until("b links a", Duration::from_secs(3), || {
            b.link(&a.local_node.id).is_some()
        })
        .await;

        // B tears its side down; A observes the disconnect.
        b.declare_failed(&a.local_node.id);

        wait_until("a ejects b after disconnect", Duration::from_secs(5), || {
            !a.ring().contains(&b.local_node.id)
        })
        .await;
        assert!(!b.ring().contains(&a.local_node.id));
    }

    #[tokio::test]
    async fn test_rejoin_after_failure() {
        let a = spawn_node("node-a", test_config(100, 10_000)).await;
        let b = spawn_node("node-b", test_config(100, 10_000)).await;
        a.connect(b.local_node.address).await.unwrap();
        wait_until("b links a", Duration::from_secs(3), || {
            b.link(&a.local_node.id).is_some()
        })
        .await;

        b.declare_failed(&a.local_node.id);
        wait_until("both sides ejected", Duration::from_secs(5), || {
            !a.ring().contains(&b.local_node.id) && !b.ring().contains(&a.local_node.id)
        })
        .await;

        // A fresh identify re-admits the peer on both sides.
        b.connect(a.local_node.address).await.unwrap();
        wait_until("both sides re-admitted", Duration::from_secs(5), || {
            a.ring().contains(&b.local_node.id) && b.ring().contains(&a.local_node.id)
        })
        .await;
        assert!(a.failed_nodes().is_empty());
        assert!(b.failed_nodes().is_empty());
    }

    // ============================================================
    // FAILURE GOSSIP
    // ============================================================

    #[tokio::test]
    async fn test_failure_report_vetoed_for_live_peer() {
        let a = spawn_node("node-a", test_config(100, 10_000)).await;
        let b = spawn_node("node-b", test_config(100, 10_000)).await;
        a.connect(b.local_node.address).await.unwrap();

        // B was heard from moments ago, so a remote report is ignored.
        a.handle_failure_report(&b.local_node.id, &NodeId("node-x".to_string()));
        assert!(a.ring().contains(&b.local_node.id));
    }

    #[tokio::test]
    async fn test_failure_report_confirmed_for_silent_peer() {
        // Threshold 3 s: A's own detector would need 3 s of silence, but
        // a corroborating report is accepted after half that.
        let a = spawn_node("node-a", test_config(100, 3000)).await;
        let c = spawn_node("node-c", test_config(60_000, 60_000)).await;
        a.connect(c.local_node.address).await.unwrap();

        tokio::time::sleep(Duration::from_millis(2000)).await;
        a.handle_failure_report(&c.local_node.id, &NodeId("node-b".to_string()));

        assert!(!a.ring().contains(&c.local_node.id));
        assert_eq!(a.failed_nodes().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_report_about_self_is_ignored() {
        let a = spawn_node("node-a", test_config(100, 10_000)).await;
        let self_id = a.local_node.id.clone();
        a.handle_failure_report(&self_id, &NodeId("node-x".to_string()));
        assert!(a.ring().contains(&self_id));
    }
}
