use crate::domain::handle::{CorrelationId, LocalDurableHandle};
use crate::domain::ports::HandleStore;
use crate::error::Result;
use async_trait::async_trait;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::warn;

/// A handle store backed by a single JSON file, so a handle survives restarts.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so a crash mid-write never leaves a torn handle behind.
/// `Clone` shares the same file and the same in-process write lock.
#[derive(Clone)]
pub struct FileHandleStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FileHandleStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Option<LocalDurableHandle>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(handle) => Ok(Some(handle)),
            Err(e) => {
                // An unreadable handle cannot be resumed; drop it like a stale one.
                warn!(path = %self.path.display(), error = %e, "discarding corrupt handle file");
                self.remove()?;
                Ok(None)
            }
        }
    }

    fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl HandleStore for FileHandleStore {
    async fn load(&self) -> Result<Option<LocalDurableHandle>> {
        let _guard = self.lock.lock().await;
        self.read()
    }

    async fn save(&self, handle: &LocalDurableHandle) -> Result<()> {
        let _guard = self.lock.lock().await;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut file = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut file, handle)?;
        file.flush()?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    async fn clear(&self, correlation_id: &CorrelationId) -> Result<()> {
        let _guard = self.lock.lock().await;
        match self.read()? {
            Some(handle) if &handle.correlation_id == correlation_id => self.remove(),
            _ => Ok(()),
        }
    }
}
