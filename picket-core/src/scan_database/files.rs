use std::path::{Path, PathBuf};

use async_trait::async_trait;
use picket_model::{ScanId, ScanSummary};
use tracing::debug;

use super::{Result, ScanDatabase, ScanDatabaseError};

/// One pretty-printed JSON document per scan under a directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// reader never observes a half-written record.
#[derive(Debug, Clone)]
pub struct FileScanDatabase {
    root: PathBuf,
}

impl FileScanDatabase {
    /// Open (creating if needed) the directory at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, id: ScanId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        tokio::task::spawn_blocking(work)
            .await
            .map_err(|err| ScanDatabaseError::Worker(err.to_string()))?
    }
}

#[async_trait]
impl ScanDatabase for FileScanDatabase {
    async fn load(&self, id: ScanId) -> Result<Option<ScanSummary>> {
        let path = self.record_path(id);
        self.blocking(move || match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        })
        .await
    }

    async fn store(&self, summary: &ScanSummary) -> Result<()> {
        let path = self.record_path(summary.id);
        let staging = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(summary)?;
        debug!(scan_id = %summary.id, path = %path.display(), "storing scan");
        self.blocking(move || {
            std::fs::write(&staging, body)?;
            std::fs::rename(&staging, &path)?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: ScanId) -> Result<bool> {
        let path = self.record_path(id);
        self.blocking(move || match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        })
        .await
    }
}
