use serde::{Deserialize, Serialize};

use super::node::Node;

/// A concrete path from `source` to `destination`
///
/// `path` is source-first and inclusive of both ends. An unreachable
/// destination is represented by an empty path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub source: Node,
    pub destination: Node,
    pub path: Vec<Node>,
}

impl Route {
    pub fn new(source: Node, destination: Node, path: Vec<Node>) -> Self {
        Self {
            source,
            destination,
            path,
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.path.len() >= 2
    }

    /// First node after the source
    pub fn next_hop(&self) -> Option<&Node> {
        self.path.get(1)
    }

    /// Node names along the path, in order
    pub fn hop_names(&self) -> Vec<&str> {
        self.path.iter().map(|n| n.name.as_str()).collect()
    }
}

/// The full route table computed for one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRoutes {
    pub node: Node,
    pub routes: Vec<Route>,
}

impl NodeRoutes {
    pub fn new(node: Node, routes: Vec<Route>) -> Self {
        Self { node, routes }
    }

    /// Look up the route towards `destination` by name
    pub fn route_to(&self, destination: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.destination.name == destination)
    }
}
