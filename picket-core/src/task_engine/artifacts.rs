use std::path::{Path, PathBuf};

use picket_model::{FileRecord, SessionId};

/// Local directory tree receiving plugin artifacts: one subdirectory per
/// plugin session, and within it one per reported file.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, session: SessionId) -> PathBuf {
        self.root.join(session.to_string())
    }

    /// Write `bytes` to `<session>/<file id>/<file name>` and return the path
    /// written. Files sharing a name never collide.
    pub async fn save(
        &self,
        session: SessionId,
        file: &FileRecord,
        bytes: Vec<u8>,
    ) -> std::io::Result<PathBuf> {
        let dir = self.session_dir(session).join(file.id.to_string());
        let path = dir.join(file.file_name());
        let target = path.clone();
        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&dir)?;
            std::fs::write(&target, bytes)
        })
        .await
        .map_err(std::io::Error::other)??;
        Ok(path)
    }
}
