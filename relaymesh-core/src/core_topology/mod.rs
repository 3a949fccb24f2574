/*
    Topology - the controller's view of the overlay

    Undirected weighted graph of named nodes. The controller mutates it on
    authentication, disconnect and edge configuration, then asks it for the
    per-node route tables that get pushed to every router.

    Workflow:
    1. add_node(node) on authentication (upsert of ip/port/public_key)
    2. add_edge(a, b, w) from configuration or the operator
    3. remove_node(node) on disconnect / heartbeat expiry, incident edges go with it
    4. routes_for(name) / all_routes() run Dijkstra from each source and resolve
       every hop back to the current node record

    Not thread-safe by itself; the controller serialises mutation and route
    computation behind one lock.
*/

mod errors;
pub mod graph;

pub use errors::TopologyError;
pub use graph::TopologyGraph;
