use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A named, addressable participant in the overlay
///
/// Identity is the `name`; two records with the same name compare equal even
/// if their address or key differ (e.g. a stale copy inside a route).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub ip: String,
    pub port: u16,
    /// PEM encoded public key, present once the owning router announced it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

impl Node {
    pub fn new(name: impl Into<String>, ip: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            ip: ip.into(),
            port,
            public_key: None,
        }
    }

    /// Builder: attach a PEM public key
    pub fn with_public_key(mut self, pem: impl Into<String>) -> Self {
        self.public_key = Some(pem.into());
        self
    }

    /// Node known only by name (created implicitly by an edge)
    pub fn placeholder(name: impl Into<String>) -> Self {
        Self::new(name, "", 0)
    }

    /// `ip:port` suitable for `TcpStream::connect`
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn public_key_pem(&self) -> Option<&str> {
        self.public_key.as_deref().filter(|pem| !pem.trim().is_empty())
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.name, self.ip, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_equality_is_by_name() {
        let a = Node::new("A", "127.0.0.1", 9000);
        let a_moved = Node::new("A", "10.0.0.1", 9100).with_public_key("pem");
        assert_eq!(a, a_moved);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(!set.insert(a_moved));
    }

    #[test]
    fn test_missing_public_key_defaults_to_none() {
        let node: Node =
            serde_json::from_str(r#"{"name":"B","ip":"localhost","port":8081}"#).unwrap();
        assert_eq!(node.public_key, None);
        assert_eq!(node.address(), "localhost:8081");
    }

    #[test]
    fn test_blank_public_key_is_treated_as_absent() {
        let node = Node::new("C", "localhost", 1).with_public_key("  ");
        assert!(node.public_key_pem().is_none());
    }
}
