pub mod config;
pub mod core_controller;
pub mod core_crypto;
pub mod core_model;
pub mod core_router;
pub mod core_store;
pub mod core_topology;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod shutdown;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::Config;
pub use core_controller::Controller;
pub use core_model::{Envelope, Node, NodeRoutes, Route};
pub use core_router::{RelayClient, Router};
pub use core_topology::TopologyGraph;
pub use error::{RelayError, RelayResult};
pub use logging::{init_logging, LogLevel};
