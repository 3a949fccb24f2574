use serde::{Deserialize, Serialize};

use super::node::Node;

/// The in-flight forwarding envelope
///
/// `path` holds the hops still to visit: the head is the node the envelope
/// is currently addressed to, the tail is the final destination. Hops only
/// ever shrink the path; `message`, `key` and `binary` travel unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64 AEAD ciphertext of the text payload
    pub message: String,
    pub path: Vec<Node>,
    /// Symmetric key wrapped under the destination's public key
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub is_file: bool,
    /// Base64 AEAD ciphertext of the (base64) file payload
    #[serde(default)]
    pub binary: String,
}

impl Envelope {
    pub fn current_hop(&self) -> Option<&Node> {
        self.path.first()
    }

    pub fn destination(&self) -> Option<&Node> {
        self.path.last()
    }

    /// True when the head of the path names `node`
    pub fn is_current_hop(&self, node: &str) -> bool {
        self.current_hop().is_some_and(|n| n.name == node)
    }

    /// True when the tail of the path names `node`
    pub fn is_destination(&self, node: &str) -> bool {
        self.destination().is_some_and(|n| n.name == node)
    }

    /// Drop the current hop and return the new head, if any
    pub fn advance(&mut self) -> Option<&Node> {
        if self.path.is_empty() {
            return None;
        }
        self.path.remove(0);
        self.path.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(path: &[&str]) -> Envelope {
        Envelope {
            message: "ciphertext".to_string(),
            path: path.iter().map(|n| Node::new(*n, "127.0.0.1", 1)).collect(),
            key: "wrapped".to_string(),
            is_file: false,
            binary: String::new(),
        }
    }

    #[test]
    fn test_hop_checks() {
        let env = envelope(&["B", "C"]);
        assert!(env.is_current_hop("B"));
        assert!(!env.is_current_hop("C"));
        assert!(env.is_destination("C"));
        assert!(!env.is_destination("B"));
    }

    #[test]
    fn test_empty_path_matches_nothing() {
        let env = envelope(&[]);
        assert!(!env.is_current_hop("A"));
        assert!(!env.is_destination("A"));
    }

    #[test]
    fn test_advance_shrinks_path_only() {
        let mut env = envelope(&["B", "C"]);
        let next = env.advance().map(|n| n.name.clone());
        assert_eq!(next.as_deref(), Some("C"));
        assert_eq!(env.path.len(), 1);
        assert_eq!(env.message, "ciphertext");
        assert_eq!(env.key, "wrapped");

        assert!(env.advance().is_none());
        assert!(env.advance().is_none());
    }
}
