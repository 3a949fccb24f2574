use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("Invalid weight {weight} for edge {a}-{b}: must be a positive integer")]
    InvalidWeight { a: String, b: String, weight: i64 },

    #[error("Node not found: {0}")]
    UnknownNode(String),
}
