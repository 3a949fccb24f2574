use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};

use tracing::{debug, trace, warn};

use super::errors::TopologyError;
use crate::core_model::{Node, NodeRoutes, Route};

/// Undirected weighted graph keyed by node name
#[derive(Debug, Clone, Default)]
pub struct TopologyGraph {
    nodes: BTreeMap<String, Node>,
    adjacency: BTreeMap<String, BTreeMap<String, u64>>,
}

impl TopologyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a node; existing edges are kept
    pub fn add_node(&mut self, node: Node) {
        self.adjacency.entry(node.name.clone()).or_default();
        self.nodes.insert(node.name.clone(), node);
    }

    /// Remove a node and every incident edge
    ///
    /// Absent nodes are a no-op (logged).
    pub fn remove_node(&mut self, name: &str) -> Option<Node> {
        let Some(node) = self.nodes.remove(name) else {
            warn!(node = %name, "Node not found in the graph");
            return None;
        };

        if let Some(neighbors) = self.adjacency.remove(name) {
            for neighbor in neighbors.keys() {
                if let Some(edges) = self.adjacency.get_mut(neighbor) {
                    edges.remove(name);
                }
            }
        }

        Some(node)
    }

    /// Insert or update the undirected edge `a`-`b`
    ///
    /// Non-positive weights are rejected and leave the graph untouched.
    /// Endpoints not yet in the graph are created as placeholders and get
    /// their address once the owning router authenticates.
    pub fn add_edge(&mut self, a: &str, b: &str, weight: i64) -> Result<(), TopologyError> {
        if weight <= 0 {
            warn!(a = %a, b = %b, weight, "Invalid weight; must be a positive integer");
            return Err(TopologyError::InvalidWeight {
                a: a.to_string(),
                b: b.to_string(),
                weight,
            });
        }

        for name in [a, b] {
            if !self.nodes.contains_key(name) {
                self.add_node(Node::placeholder(name));
            }
        }

        let weight = weight as u64;
        self.adjacency
            .entry(a.to_string())
            .or_default()
            .insert(b.to_string(), weight);
        self.adjacency
            .entry(b.to_string())
            .or_default()
            .insert(a.to_string(), weight);

        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn node_names(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(|e| e.len()).sum::<usize>() / 2
    }

    pub fn edge_weight(&self, a: &str, b: &str) -> Option<u64> {
        self.adjacency.get(a).and_then(|edges| edges.get(b)).copied()
    }

    /// Total weight of a path, `None` if any consecutive pair is not an edge
    pub fn path_weight<S: AsRef<str>>(&self, path: &[S]) -> Option<u64> {
        path.windows(2)
            .map(|pair| self.edge_weight(pair[0].as_ref(), pair[1].as_ref()))
            .sum()
    }

    /// Dijkstra from `start` to `end`
    ///
    /// Returns the node names along the cheapest path, source-first. An empty
    /// vector means no path (or an unknown endpoint); this never fails.
    /// Among equal-cost paths the choice is unspecified.
    pub fn shortest_path(&self, start: &str, end: &str) -> Vec<String> {
        if !self.contains(start) || !self.contains(end) {
            debug!(start = %start, end = %end, "Shortest path requested for unknown node");
            return Vec::new();
        }
        if start == end {
            return vec![start.to_string()];
        }

        let mut dist: HashMap<&str, u64> = HashMap::new();
        let mut prev: HashMap<&str, &str> = HashMap::new();
        let mut heap = BinaryHeap::new();

        dist.insert(start, 0);
        heap.push(Reverse((0u64, start)));

        while let Some(Reverse((cost, current))) = heap.pop() {
            if current == end {
                break;
            }
            if dist.get(current).is_some_and(|&best| cost > best) {
                continue;
            }

            let Some(edges) = self.adjacency.get(current) else {
                continue;
            };
            for (neighbor, weight) in edges {
                let candidate = cost.saturating_add(*weight);
                let better = dist
                    .get(neighbor.as_str())
                    .map_or(true, |&known| candidate < known);
                if better {
                    dist.insert(neighbor.as_str(), candidate);
                    prev.insert(neighbor.as_str(), current);
                    heap.push(Reverse((candidate, neighbor.as_str())));
                }
            }
        }

        if !prev.contains_key(end) {
            debug!(start = %start, end = %end, "No path found");
            return Vec::new();
        }

        let mut path = vec![end.to_string()];
        let mut cursor = end;
        while let Some(&step) = prev.get(cursor) {
            path.push(step.to_string());
            cursor = step;
        }
        path.reverse();

        trace!(start = %start, end = %end, ?path, "Computed shortest path");
        path
    }

    /// Route table for `name`: one route per other node in the graph
    ///
    /// Unreachable destinations contribute a route with an empty path.
    pub fn routes_for(&self, name: &str) -> Result<NodeRoutes, TopologyError> {
        let source = self
            .nodes
            .get(name)
            .cloned()
            .ok_or_else(|| TopologyError::UnknownNode(name.to_string()))?;

        let routes = self
            .nodes
            .values()
            .filter(|target| target.name != name)
            .map(|target| {
                let path = self
                    .shortest_path(name, &target.name)
                    .iter()
                    .filter_map(|hop| self.nodes.get(hop).cloned())
                    .collect();
                Route::new(source.clone(), target.clone(), path)
            })
            .collect();

        Ok(NodeRoutes::new(source, routes))
    }

    /// Route tables for every node in the graph
    pub fn all_routes(&self) -> Vec<NodeRoutes> {
        self.nodes
            .keys()
            .filter_map(|name| self.routes_for(name).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn node(name: &str) -> Node {
        Node::new(name, "127.0.0.1", 9000).with_public_key(format!("pem-{}", name))
    }

    fn triangle() -> TopologyGraph {
        let mut graph = TopologyGraph::new();
        for name in ["A", "B", "C"] {
            graph.add_node(node(name));
        }
        graph.add_edge("A", "B", 10).unwrap();
        graph.add_edge("B", "C", 10).unwrap();
        graph.add_edge("A", "C", 30).unwrap();
        graph
    }

    #[test]
    fn test_shortest_path_prefers_cheaper_detour() {
        let graph = triangle();
        assert_eq!(graph.shortest_path("A", "C"), vec!["A", "B", "C"]);
        assert_eq!(graph.path_weight(&graph.shortest_path("A", "C")), Some(20));
    }

    #[test]
    fn test_shortest_path_is_symmetric_for_undirected_edges() {
        let graph = triangle();
        assert_eq!(graph.shortest_path("C", "A"), vec!["C", "B", "A"]);
    }

    #[test]
    fn test_no_path_returns_empty() {
        let mut graph = triangle();
        graph.add_node(node("D"));
        assert!(graph.shortest_path("A", "D").is_empty());
        assert!(graph.shortest_path("A", "missing").is_empty());
    }

    #[test]
    fn test_path_to_self() {
        let graph = triangle();
        assert_eq!(graph.shortest_path("B", "B"), vec!["B"]);
    }

    #[test]
    fn test_invalid_weight_leaves_graph_unchanged() {
        let mut graph = triangle();
        let before = graph.edge_count();

        let err = graph.add_edge("A", "D", 0).unwrap_err();
        assert!(matches!(err, TopologyError::InvalidWeight { weight: 0, .. }));
        assert!(graph.add_edge("A", "B", -5).is_err());

        assert_eq!(graph.edge_count(), before);
        assert!(!graph.contains("D"));
        assert_eq!(graph.edge_weight("A", "B"), Some(10));
    }

    #[test]
    fn test_add_edge_updates_weight() {
        let mut graph = triangle();
        graph.add_edge("A", "C", 5).unwrap();
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.shortest_path("A", "C"), vec!["A", "C"]);
    }

    #[test]
    fn test_add_node_is_upsert() {
        let mut graph = triangle();
        graph.add_node(Node::new("B", "10.0.0.2", 7000));
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.node("B").map(|n| n.port), Some(7000));
        // edges survive the refresh
        assert_eq!(graph.edge_weight("A", "B"), Some(10));
    }

    #[test]
    fn test_remove_node_cascades_edges() {
        let mut graph = triangle();
        assert!(graph.remove_node("B").is_some());
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.shortest_path("A", "C"), vec!["A", "C"]);

        assert!(graph.remove_node("B").is_none());
    }

    #[test]
    fn test_routes_for_resolves_full_records() {
        let graph = triangle();
        let table = graph.routes_for("A").unwrap();

        assert_eq!(table.node.name, "A");
        assert_eq!(table.routes.len(), 2);

        let to_c = table.route_to("C").unwrap();
        assert_eq!(to_c.hop_names(), vec!["A", "B", "C"]);
        assert_eq!(to_c.path[2].public_key_pem(), Some("pem-C"));
        assert_eq!(to_c.destination.public_key_pem(), Some("pem-C"));
    }

    #[test]
    fn test_routes_for_unreachable_has_empty_path() {
        let mut graph = triangle();
        graph.add_node(node("D"));
        let table = graph.routes_for("A").unwrap();
        let to_d = table.route_to("D").unwrap();
        assert!(to_d.path.is_empty());
    }

    #[test]
    fn test_routes_for_unknown_node() {
        let graph = triangle();
        assert_eq!(
            graph.routes_for("Z").unwrap_err(),
            TopologyError::UnknownNode("Z".to_string())
        );
    }

    #[test]
    fn test_removed_node_never_appears_in_routes() {
        let mut graph = triangle();
        graph.add_node(node("D"));
        graph.add_edge("C", "D", 1).unwrap();
        graph.remove_node("B");

        for table in graph.all_routes() {
            for route in &table.routes {
                assert!(route.path.iter().all(|hop| hop.name != "B"));
                assert_ne!(route.destination.name, "B");
            }
        }
    }

    #[test]
    fn test_all_routes_one_table_per_node() {
        let graph = triangle();
        let tables = graph.all_routes();
        assert_eq!(tables.len(), 3);
        assert!(tables.iter().all(|t| t.routes.len() == 2));
    }

    /// Floyd-Warshall reference distances
    fn reference_distances(n: usize, edges: &[(usize, usize, i64)]) -> Vec<Vec<Option<u64>>> {
        let mut dist = vec![vec![None; n]; n];
        for (i, row) in dist.iter_mut().enumerate() {
            row[i] = Some(0);
        }
        for &(a, b, w) in edges {
            if a == b {
                continue;
            }
            // last write wins, matching add_edge's update semantics
            dist[a][b] = Some(w as u64);
            dist[b][a] = Some(w as u64);
        }
        for k in 0..n {
            for i in 0..n {
                for j in 0..n {
                    if let (Some(ik), Some(kj)) = (dist[i][k], dist[k][j]) {
                        let via = ik + kj;
                        if dist[i][j].map_or(true, |d| via < d) {
                            dist[i][j] = Some(via);
                        }
                    }
                }
            }
        }
        dist
    }

    proptest! {
        #[test]
        fn prop_shortest_path_is_minimal(
            n in 2usize..8,
            raw_edges in prop::collection::vec((0usize..8, 0usize..8, 1i64..50), 0..20),
        ) {
            let edges: Vec<_> = raw_edges
                .into_iter()
                .map(|(a, b, w)| (a % n, b % n, w))
                .collect();

            let mut graph = TopologyGraph::new();
            for i in 0..n {
                graph.add_node(node(&format!("n{}", i)));
            }
            let mut applied = Vec::new();
            for &(a, b, w) in &edges {
                if a != b {
                    graph.add_edge(&format!("n{}", a), &format!("n{}", b), w).unwrap();
                    applied.push((a, b, w));
                }
            }

            let expected = reference_distances(n, &applied);
            for i in 0..n {
                for j in 0..n {
                    if i == j {
                        continue;
                    }
                    let path = graph.shortest_path(&format!("n{}", i), &format!("n{}", j));
                    match expected[i][j] {
                        Some(best) => {
                            prop_assert_eq!(path.first().cloned(), Some(format!("n{}", i)));
                            prop_assert_eq!(path.last().cloned(), Some(format!("n{}", j)));
                            prop_assert_eq!(graph.path_weight(&path), Some(best));
                        }
                        None => prop_assert!(path.is_empty()),
                    }
                }
            }
        }
    }
}
