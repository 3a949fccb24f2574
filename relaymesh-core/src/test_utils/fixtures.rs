//! Test fixtures for creating common test objects

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use crate::config::{ControllerConfig, RouterConfig};
use crate::core_crypto::RelayKeyPair;
use crate::core_model::Node;
use crate::core_topology::TopologyGraph;

/// Node on localhost with a recognisable fake key
pub fn node(name: &str) -> Node {
    Node::new(name, "127.0.0.1", 9000).with_public_key(format!("pem-{}", name))
}

/// The canonical three node graph: A-B:10, B-C:10, A-C:30
pub fn triangle_graph() -> TopologyGraph {
    let mut graph = TopologyGraph::new();
    for name in ["A", "B", "C"] {
        graph.add_node(node(name));
    }
    for (a, b, w) in [("A", "B", 10), ("B", "C", 10), ("A", "C", 30)] {
        graph
            .add_edge(a, b, w)
            .expect("fixture weights are positive");
    }
    graph
}

/// Fourteen-node US backbone used for larger route computations
pub const BACKBONE_EDGES: &[(&str, &str, i64)] = &[
    ("WA", "CA1", 2100),
    ("WA", "CA2", 3000),
    ("WA", "IL", 4800),
    ("CA1", "UT", 1500),
    ("CA1", "CA2", 1200),
    ("CA2", "TX", 3600),
    ("UT", "MI", 3900),
    ("UT", "CO", 1200),
    ("CO", "NE", 1200),
    ("CO", "TX", 2400),
    ("NE", "IL", 1500),
    ("NE", "GA", 2700),
    ("TX", "GA", 1200),
    ("TX", "DC", 3600),
    ("IL", "PA", 1500),
    ("GA", "PA", 1500),
    ("PA", "NY", 600),
    ("PA", "NJ", 600),
    ("MI", "NY", 1200),
    ("MI", "NJ", 1500),
    ("DC", "NY", 600),
    ("DC", "NJ", 300),
];

pub fn backbone_graph() -> TopologyGraph {
    let mut graph = TopologyGraph::new();
    for (a, b, w) in BACKBONE_EDGES {
        for name in [a, b] {
            if !graph.contains(name) {
                graph.add_node(node(name));
            }
        }
        graph
            .add_edge(a, b, *w)
            .expect("fixture weights are positive");
    }
    graph
}

/// Pre-generated key pairs shared across tests; RSA generation is slow
pub fn shared_keypair(index: usize) -> &'static RelayKeyPair {
    static KEYS: OnceLock<Vec<RelayKeyPair>> = OnceLock::new();
    let keys = KEYS.get_or_init(|| {
        (0..3)
            .map(|_| RelayKeyPair::generate().expect("RSA key generation"))
            .collect()
    });
    &keys[index % keys.len()]
}

/// Controller on an ephemeral port with fast liveness checks
pub fn controller_config() -> ControllerConfig {
    ControllerConfig {
        bind_address: "127.0.0.1:0".parse().expect("valid literal address"),
        heartbeat_check_interval: Duration::from_millis(100),
        heartbeat_timeout: Duration::from_millis(600),
        auth_timeout: Duration::from_secs(2),
        ..ControllerConfig::default()
    }
}

/// Router on an ephemeral port writing under `data_dir`
pub fn router_config(name: &str, controller_address: &str, data_dir: &Path) -> RouterConfig {
    RouterConfig {
        name: name.to_string(),
        bind_address: "127.0.0.1:0".parse().expect("valid literal address"),
        advertise_host: None,
        controller_address: controller_address.to_string(),
        heartbeat_interval: Duration::from_millis(100),
        connect_timeout: Duration::from_secs(2),
        routes_dir: data_dir.join("routes"),
        received_dir: data_dir.join("received"),
        ..RouterConfig::default()
    }
}
