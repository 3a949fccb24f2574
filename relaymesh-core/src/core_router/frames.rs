//! Wire frames
//!
//! Two frame families share the JSON framing: router-port frames, tagged by
//! `"kind"`, and controller-link frames, tagged by `"type"`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::core_model::{Envelope, Node, NodeRoutes};

/// Frames accepted on a router's listen port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelayFrame {
    /// Local application asks the router to originate a message
    Send(SendRequest),
    /// Router-to-router forwarding envelope
    Envelope(Envelope),
    /// Router hands a decrypted message to an attached application
    Deliver(Delivery),
}

/// Application origination request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    pub destination: String,
    pub message: String,
    #[serde(default)]
    pub is_file: bool,
    /// Base64 file contents, present only when `is_file`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,
}

impl SendRequest {
    pub fn text(destination: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            message: message.into(),
            is_file: false,
            binary: None,
        }
    }

    pub fn file(
        destination: impl Into<String>,
        message: impl Into<String>,
        encoded: impl Into<String>,
    ) -> Self {
        Self {
            destination: destination.into(),
            message: message.into(),
            is_file: true,
            binary: Some(encoded.into()),
        }
    }
}

/// A message decrypted at its destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub message: String,
    /// Where an attached file payload was saved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// Frames on the router <-> controller link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    /// First frame on every link: the router's own node record
    Auth(Node),
    /// Liveness signal
    Ping { name: String },
    /// Full route table for the receiving router
    Routes(NodeRoutes),
}
