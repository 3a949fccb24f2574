use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use super::errors::StoreResult;
use super::sanitize_component;

/// Destination directory tree for file payloads
///
/// Layout: `<root>/<node>/received_file_<name>`
#[derive(Debug, Clone)]
pub struct ReceivedFiles {
    root: PathBuf,
}

impl ReceivedFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where a payload named `message` for `node` would be written
    pub fn path_for(&self, node: &str, message: &str) -> PathBuf {
        let base = Path::new(message)
            .file_name()
            .and_then(|n| n.to_str())
            .map(sanitize_component)
            .unwrap_or_else(|| "unnamed".to_string());

        self.root
            .join(sanitize_component(node))
            .join(format!("received_file_{}", base))
    }

    pub fn save(&self, node: &str, message: &str, contents: &[u8]) -> StoreResult<PathBuf> {
        let path = self.path_for(node, message);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        info!(node = %node, path = %path.display(), bytes = contents.len(), "File saved");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_under_node_directory() {
        let dir = tempdir().unwrap();
        let files = ReceivedFiles::new(dir.path());

        let path = files.save("NY", "audio.wav", b"RIFF").unwrap();
        assert_eq!(path, dir.path().join("NY").join("received_file_audio.wav"));
        assert_eq!(fs::read(path).unwrap(), b"RIFF");
    }

    #[test]
    fn test_message_path_components_are_stripped() {
        let files = ReceivedFiles::new("/srv/received");
        let path = files.path_for("NY", "../../etc/passwd");
        assert_eq!(path, PathBuf::from("/srv/received/NY/received_file_passwd"));

        let path = files.path_for("NY", "..");
        assert_eq!(path, PathBuf::from("/srv/received/NY/received_file_unnamed"));
    }
}
