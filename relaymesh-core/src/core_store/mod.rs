//! On-disk persistence for routers
//!
//! Route tables are stored one file per router name and replaced wholesale on
//! every update. Received file payloads land in a per-node directory.

mod errors;
pub mod received_files;
pub mod route_store;

pub use errors::{StoreError, StoreResult};
pub use received_files::ReceivedFiles;
pub use route_store::RouteStore;

/// True if `name` is used verbatim as a file name component
///
/// Names outside `[A-Za-z0-9._-]`, or made only of dots, would be rewritten
/// by [`sanitize_component`] and could collide with another node's files.
pub fn is_file_safe(name: &str) -> bool {
    sanitize_component(name) == name
}

/// Make a node name safe to embed in a file name
pub(crate) fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    match cleaned.trim_matches('.') {
        "" => "_".to_string(),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("CA1"), "CA1");
        assert_eq!(sanitize_component("../etc"), ".._etc");
        assert_eq!(sanitize_component(".."), "_");
        assert_eq!(sanitize_component("a b/c"), "a_b_c");
    }

    #[test]
    fn test_file_safe_names_are_unchanged() {
        for name in ["NY", "CA-2", "node_7", "v1.2"] {
            assert!(is_file_safe(name), "{}", name);
        }
        // "A B" and "A_B" would share one file.
        assert_eq!(sanitize_component("A B"), sanitize_component("A_B"));
        assert!(!is_file_safe("A B"));
        for name in ["", ".", "...", "../etc", "caf\u{e9}"] {
            assert!(!is_file_safe(name), "{:?}", name);
        }
    }
}
