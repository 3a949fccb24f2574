/*
  Controller

  Central coordination process: authenticates routers into the topology
  graph, tracks their liveness and pushes route tables on every membership
  change. It never relays application traffic.
*/

pub mod controller;
pub mod registry;

pub use controller::Controller;
pub use registry::Registry;
