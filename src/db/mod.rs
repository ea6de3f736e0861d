use async_trait::async_trait;
use chrono::Utc;
use log::{info, warn};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::PersistenceError;
use crate::models::{SNAPSHOT_VERSION, Snapshot, Tally};

/// Where the tally is persisted between runs.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn load(&self) -> Result<Tally, PersistenceError>;

    async fn store(&self, snapshot: &Snapshot) -> Result<(), PersistenceError>;
}

/// A single JSON snapshot file replaced atomically on every flush.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn read_failed(&self, reason: impl ToString) -> PersistenceError {
        PersistenceError::ReadFailed {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    // Write the temp file fully and fsync it before it replaces the canonical
    // file, so readers only ever see a whole snapshot.
    async fn write_atomically(&self, bytes: &[u8]) -> Result<(), PersistenceError> {
        let temp = self.temp_path();

        let mut file = fs::File::create(&temp).await.map_err(write_failed(&temp))?;
        file.write_all(bytes).await.map_err(write_failed(&temp))?;
        file.sync_all().await.map_err(write_failed(&temp))?;
        drop(file);

        fs::rename(&temp, &self.path)
            .await
            .map_err(write_failed(&self.path))?;
        Ok(())
    }

    async fn create_empty(&self) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(write_failed(parent))?;
        }
        let bytes = serde_json::to_vec_pretty(&Snapshot::new(Tally::new()))?;
        self.write_atomically(&bytes).await
    }

    // Keep an unreadable snapshot around for manual recovery; the next flush
    // would otherwise overwrite it.
    async fn quarantine(&self) {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%SZ")));
        let target = PathBuf::from(name);

        match fs::rename(&self.path, &target).await {
            Ok(()) => warn!("Moved unreadable snapshot to {}", target.display()),
            Err(e) => warn!("Could not move unreadable snapshot {}: {}", self.path.display(), e),
        }
    }
}

fn write_failed(path: &Path) -> impl FnOnce(std::io::Error) -> PersistenceError {
    let path = path.to_path_buf();
    move |source| PersistenceError::WriteFailed { path, source }
}

#[async_trait]
impl SnapshotSink for FileStore {
    async fn load(&self) -> Result<Tally, PersistenceError> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No snapshot at {}, creating an empty one", self.path.display());
                self.create_empty().await?;
                return Ok(Tally::new());
            }
            Err(e) => return Err(self.read_failed(e)),
        };

        match serde_json::from_slice::<Snapshot>(&raw) {
            Ok(snapshot) => {
                if snapshot.version != SNAPSHOT_VERSION {
                    warn!(
                        "Snapshot {} has version {}, expected {}",
                        self.path.display(),
                        snapshot.version,
                        SNAPSHOT_VERSION
                    );
                }
                Ok(snapshot.votes)
            }
            Err(e) => {
                self.quarantine().await;
                Err(self.read_failed(e))
            }
        }
    }

    async fn store(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        self.write_atomically(&bytes).await
    }
}
