//! Node Configuration
//!
//! Resolves the runtime parameters of a node from command-line arguments
//! and environment variable overrides. Every tunable of the data plane
//! (replication factor, ring geometry, heartbeat cadence, timeouts) lives
//! here so that tests can shrink the timing windows.

use anyhow::{bail, Result};
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_REPLICATION_FACTOR: usize = 3;
pub const DEFAULT_VIRTUAL_NODES: usize = 150;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_FAILURE_THRESHOLD_MS: u64 = 10_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 3000;

/// Complete runtime configuration of one node process.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Cluster-unique identifier. Generated (UUID v4) when not supplied.
    pub node_id: Option<String>,
    /// Bind address of the peer wire. The HTTP API binds the same host at
    /// port + 1000.
    pub bind_addr: SocketAddr,
    /// Bootstrap addresses contacted in order on startup.
    pub seeds: Vec<SocketAddr>,
    /// Copies kept per key; quorum is `replication_factor / 2 + 1`.
    pub replication_factor: usize,
    /// Ring entries created per physical node.
    pub virtual_nodes: usize,
    /// Cadence of the heartbeat-send-and-check task.
    pub heartbeat_interval: Duration,
    /// Silence after which a peer is declared failed.
    pub failure_threshold: Duration,
    /// Per-request deadline on peer links.
    pub request_timeout: Duration,
    /// When set, a GET that gathers fewer than quorum records fails
    /// instead of returning the freshest one it saw.
    pub strict_quorum_reads: bool,
}

impl NodeConfig {
    /// Parses `--node-id`, `--bind` and repeatable `--seed` flags, then
    /// applies environment overrides for the remaining tunables.
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut node_id: Option<String> = None;
        let mut bind_addr: Option<SocketAddr> = None;
        let mut seeds: Vec<SocketAddr> = vec![];

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--node-id" => {
                    node_id = Some(require_value(args, i)?.to_string());
                    i += 2;
                }
                "--bind" => {
                    bind_addr = Some(require_value(args, i)?.parse()?);
                    i += 2;
                }
                "--seed" => {
                    seeds.push(require_value(args, i)?.parse()?);
                    i += 2;
                }
                _ => {
                    i += 1;
                }
            }
        }

        let Some(bind_addr) = bind_addr else {
            bail!("--bind <addr:port> is required");
        };

        Ok(Self {
            node_id,
            bind_addr,
            seeds,
            replication_factor: env_parse("REPLICATION_FACTOR", DEFAULT_REPLICATION_FACTOR).max(1),
            virtual_nodes: env_parse("VIRTUAL_NODES", DEFAULT_VIRTUAL_NODES).max(1),
            heartbeat_interval: Duration::from_millis(env_parse(
                "HEARTBEAT_INTERVAL_MS",
                DEFAULT_HEARTBEAT_INTERVAL_MS,
            )),
            failure_threshold: Duration::from_millis(env_parse(
                "FAILURE_THRESHOLD_MS",
                DEFAULT_FAILURE_THRESHOLD_MS,
            )),
            request_timeout: Duration::from_millis(env_parse(
                "PEER_REQUEST_TIMEOUT_MS",
                DEFAULT_REQUEST_TIMEOUT_MS,
            )),
            strict_quorum_reads: env_parse("STRICT_QUORUM_READS", false),
        })
    }

    /// Address of the client-facing HTTP listener: peer port + 1000.
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr.ip(), self.bind_addr.port() + 1000)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            bind_addr: "127.0.0.1:0".parse().expect("static address"),
            seeds: vec![],
            replication_factor: DEFAULT_REPLICATION_FACTOR,
            virtual_nodes: DEFAULT_VIRTUAL_NODES,
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS),
            failure_threshold: Duration::from_millis(DEFAULT_FAILURE_THRESHOLD_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            strict_quorum_reads: false,
        }
    }
}

fn require_value<'a>(args: &'a [String], i: usize) -> Result<&'a str> {
    match args.get(i + 1) {
        Some(value) => Ok(value),
        None => bail!("{} requires a value", args[i]),
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("quorum-kv")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_bind_is_required() {
        let parsed = NodeConfig::from_args(&args(&["--node-id", "a"]));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_parses_seeds_in_order() {
        let config = NodeConfig::from_args(&args(&[
            "--bind",
            "127.0.0.1:7000",
            "--seed",
            "127.0.0.1:7001",
            "--seed",
            "127.0.0.1:7002",
        ]))
        .unwrap();

        assert_eq!(config.bind_addr.port(), 7000);
        assert_eq!(config.seeds.len(), 2);
        assert_eq!(config.seeds[0].port(), 7001);
        assert_eq!(config.seeds[1].port(), 7002);
    }

    #[test]
    fn test_http_addr_offsets_peer_port() {
        let config = NodeConfig {
            bind_addr: "127.0.0.1:7000".parse().unwrap(),
            ..NodeConfig::default()
        };
        assert_eq!(config.http_addr().port(), 8000);
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = NodeConfig::default();
        assert_eq!(config.replication_factor, 3);
        assert_eq!(config.virtual_nodes, 150);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(2));
        assert_eq!(config.failure_threshold, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert!(!config.strict_quorum_reads);
    }
}
