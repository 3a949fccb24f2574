//! Route data model
//!
//! Plain records exchanged between the controller, routers and local
//! applications: nodes, routes, per-node route tables and the in-flight
//! forwarding envelope.

pub mod envelope;
pub mod node;
pub mod route;

pub use envelope::Envelope;
pub use node::Node;
pub use route::{NodeRoutes, Route};
