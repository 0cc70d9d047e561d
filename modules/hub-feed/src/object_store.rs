//! Object store abstraction (C9) backing feed snapshot storage. Grounded on
//! `original_source/app/services/storage.py`'s `LocalObjectStore` — a
//! trait seam is added so a future S3/GCS-backed store can slot in without
//! touching the snapshot builder, per spec.md's non-goal framing that only
//! excludes *building* that backend now, not designing around it.

use std::path::{Path, PathBuf};

use hub_common::{HubError, Result};

pub trait ObjectStore: Send + Sync {
    fn put_bytes(&self, key: &str, data: &[u8]) -> Result<String>;
    fn resolve_path(&self, uri: &str) -> Result<PathBuf>;
}

#[derive(Clone)]
pub struct LocalObjectStore {
    base: PathBuf,
}

impl LocalObjectStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base = base_dir.into();
        std::fs::create_dir_all(&base)
            .map_err(|e| HubError::Other(anyhow::anyhow!("cannot create {}: {e}", base.display())))?;
        Ok(Self { base })
    }
}

impl ObjectStore for LocalObjectStore {
    fn put_bytes(&self, key: &str, data: &[u8]) -> Result<String> {
        let path = self.base.join(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| HubError::Other(anyhow::anyhow!("cannot create {}: {e}", parent.display())))?;
        }
        std::fs::write(&path, data)
            .map_err(|e| HubError::Other(anyhow::anyhow!("cannot write {}: {e}", path.display())))?;
        Ok(format!("file://{}", path.to_string_lossy()))
    }

    fn resolve_path(&self, uri: &str) -> Result<PathBuf> {
        if let Some(rest) = uri.strip_prefix("file://") {
            return Ok(PathBuf::from(rest));
        }
        let p = Path::new(uri);
        if p.is_absolute() {
            Ok(p.to_path_buf())
        } else {
            Ok(self.base.join(p))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_file_uri() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path()).unwrap();
        let uri = store.put_bytes("a/b/feed.xml", b"<rss/>").unwrap();
        assert!(uri.starts_with("file://"));
        let path = store.resolve_path(&uri).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"<rss/>");
    }
}
