//! Membership state owned by the controller
//!
//! Connections, heartbeat timestamps and the topology graph change together,
//! so they live in one structure behind one lock. Every connection carries an
//! id; unregister and heartbeat refresh only act on the registration they
//! belong to, so a stale reader can never evict a newer connection.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::EdgeConfig;
use crate::core_model::{Node, NodeRoutes};
use crate::core_router::{FrameSender, PeerLink};
use crate::core_topology::{TopologyError, TopologyGraph};
use crate::metrics::Timer;

#[derive(Debug, Default)]
pub struct Registry {
    links: HashMap<String, PeerLink>,
    heartbeats: HashMap<String, Instant>,
    graph: TopologyGraph,
    /// Static topology, re-applied whenever a node joins
    edges: Vec<EdgeConfig>,
}

impl Registry {
    pub fn new(edges: Vec<EdgeConfig>) -> Self {
        Self {
            edges,
            ..Self::default()
        }
    }

    pub fn graph(&self) -> &TopologyGraph {
        &self.graph
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Names of connected routers, sorted
    pub fn connected(&self) -> Vec<String> {
        let mut names: Vec<String> = self.links.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn last_heartbeat(&self, name: &str) -> Option<Instant> {
        self.heartbeats.get(name).copied()
    }

    /// Register an authenticated router and add it to the graph
    ///
    /// Returns the connection previously registered under the same name.
    pub fn register(&mut self, node: Node, link: PeerLink, now: Instant) -> Option<PeerLink> {
        let name = node.name.clone();
        let previous = self.links.insert(name.clone(), link);
        self.heartbeats.insert(name, now);
        self.graph.add_node(node);
        self.apply_edges();
        previous
    }

    /// Add an edge now and remember it for nodes that join later
    pub fn add_edge(&mut self, edge: EdgeConfig) -> Result<(), TopologyError> {
        self.graph.add_edge(&edge.a, &edge.b, edge.weight)?;
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
        Ok(())
    }

    fn apply_edges(&mut self) {
        for edge in &self.edges {
            if !(self.graph.contains(&edge.a) && self.graph.contains(&edge.b)) {
                continue;
            }
            if let Err(e) = self.graph.add_edge(&edge.a, &edge.b, edge.weight) {
                warn!(a = %edge.a, b = %edge.b, error = %e, "Skipping configured edge");
            }
        }
    }

    /// Record a heartbeat; false if `conn_id` is not the live registration
    pub fn refresh(&mut self, name: &str, conn_id: u64, now: Instant) -> bool {
        match self.links.get(name) {
            Some(link) if link.conn_id == conn_id => {
                self.heartbeats.insert(name.to_string(), now);
                true
            }
            _ => false,
        }
    }

    /// Remove a router whose connection ended
    pub fn unregister(&mut self, name: &str, conn_id: u64) -> Option<PeerLink> {
        match self.links.get(name) {
            Some(link) if link.conn_id == conn_id => {}
            _ => return None,
        }
        self.heartbeats.remove(name);
        self.graph.remove_node(name);
        self.links.remove(name)
    }

    /// Remove every router silent for longer than `timeout`
    pub fn sweep(&mut self, now: Instant, timeout: Duration) -> Vec<(String, PeerLink)> {
        let stale: Vec<String> = self
            .heartbeats
            .iter()
            .filter(|(_, seen)| now.saturating_duration_since(**seen) > timeout)
            .map(|(name, _)| name.clone())
            .collect();

        let mut evicted = Vec::with_capacity(stale.len());
        for name in stale {
            self.heartbeats.remove(&name);
            self.graph.remove_node(&name);
            if let Some(link) = self.links.remove(&name) {
                evicted.push((name, link));
            }
        }
        evicted
    }

    /// Fresh route table for every connected router
    pub fn route_tables(&self) -> Vec<(String, FrameSender, NodeRoutes)> {
        let timer = Timer::new("relay.routes.compute_ms");
        let mut tables = Vec::with_capacity(self.links.len());
        for (name, link) in &self.links {
            match self.graph.routes_for(name) {
                Ok(routes) => tables.push((name.clone(), link.sender.clone(), routes)),
                Err(e) => warn!(node = %name, error = %e, "Cannot compute routes"),
            }
        }
        timer.stop();
        debug!(tables = tables.len(), "Computed route tables");
        tables
    }

    /// Forget every connection; the graph is left as is
    pub fn drain(&mut self) -> Vec<PeerLink> {
        self.heartbeats.clear();
        self.links.drain().map(|(_, link)| link).collect()
    }
}
