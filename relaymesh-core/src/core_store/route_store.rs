use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use super::errors::StoreResult;
use super::sanitize_component;
use crate::core_model::{NodeRoutes, Route};

/// File name of the combined table snapshot written by `store_all`
const ALL_ROUTES_FILE: &str = "routes.json";

/// Route-table files, one per router name
#[derive(Debug, Clone)]
pub struct RouteStore {
    dir: PathBuf,
}

impl RouteStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the table file for `name`
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir
            .join(format!("routes_{}.json", sanitize_component(name)))
    }

    /// Replace the stored table for `name`
    ///
    /// Written to a temporary file and renamed into place, so readers never
    /// observe a half-written table.
    pub fn store(&self, name: &str, routes: &NodeRoutes) -> StoreResult<()> {
        let path = self.path_for(name);
        write_atomically(&self.dir, &path, &serde_json::to_vec_pretty(routes)?)?;
        debug!(node = %name, path = %path.display(), routes = routes.routes.len(), "Stored route table");
        Ok(())
    }

    /// Load the stored table for `name`; a missing file means "no routes yet"
    pub fn load(&self, name: &str) -> StoreResult<Option<NodeRoutes>> {
        let bytes = match fs::read(self.path_for(name)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!(node = %name, "No route file yet");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Resolve the stored route from `name` to `destination`
    pub fn route_to(&self, name: &str, destination: &str) -> StoreResult<Option<Route>> {
        Ok(self
            .load(name)?
            .and_then(|table| table.route_to(destination).cloned()))
    }

    /// Write every node's table into one snapshot file
    pub fn store_all(&self, tables: &[NodeRoutes]) -> StoreResult<PathBuf> {
        let path = self.dir.join(ALL_ROUTES_FILE);
        write_atomically(&self.dir, &path, &serde_json::to_vec_pretty(tables)?)?;
        Ok(path)
    }
}

fn write_atomically(dir: &Path, path: &Path, contents: &[u8]) -> StoreResult<()> {
    fs::create_dir_all(dir)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{node, triangle_graph};
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_not_an_error() {
        let dir = tempdir().unwrap();
        let store = RouteStore::new(dir.path().join("routes"));
        assert!(store.load("A").unwrap().is_none());
        assert!(store.route_to("A", "C").unwrap().is_none());
    }

    #[test]
    fn test_store_and_resolve_route() {
        let dir = tempdir().unwrap();
        let store = RouteStore::new(dir.path());
        let table = triangle_graph().routes_for("A").unwrap();

        store.store("A", &table).unwrap();

        let route = store.route_to("A", "C").unwrap().unwrap();
        assert_eq!(route.hop_names(), vec!["A", "B", "C"]);
        assert!(store.path_for("A").ends_with("routes_A.json"));
    }

    #[test]
    fn test_store_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = RouteStore::new(dir.path());
        let table = triangle_graph().routes_for("B").unwrap();

        store.store("B", &table).unwrap();
        let once = fs::read(store.path_for("B")).unwrap();
        store.store("B", &table).unwrap();
        let twice = fs::read(store.path_for("B")).unwrap();

        assert_eq!(once, twice);
        assert_eq!(store.load("B").unwrap(), Some(table));
    }

    #[test]
    fn test_store_replaces_wholesale() {
        let dir = tempdir().unwrap();
        let store = RouteStore::new(dir.path());
        store
            .store("A", &triangle_graph().routes_for("A").unwrap())
            .unwrap();

        let shrunk = NodeRoutes::new(node("A"), vec![]);
        store.store("A", &shrunk).unwrap();

        assert_eq!(store.load("A").unwrap(), Some(shrunk));
        assert!(store.route_to("A", "C").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = tempdir().unwrap();
        let store = RouteStore::new(dir.path());
        fs::write(store.path_for("A"), b"{not json").unwrap();
        assert!(store.load("A").is_err());
    }

    #[test]
    fn test_store_all_snapshot() {
        let dir = tempdir().unwrap();
        let store = RouteStore::new(dir.path());
        let tables = triangle_graph().all_routes();

        let path = store.store_all(&tables).unwrap();
        let restored: Vec<NodeRoutes> = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        assert_eq!(restored, tables);
    }
}
