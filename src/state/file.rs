//! JSON file backend.
//!
//! Each key is stored as `<dir>/<key>.json`. Writes go to a temporary file in
//! the same directory which is flushed and then renamed over the target, so
//! readers see either the old or the new document, never a partial one.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::StateStore;
use crate::error::{ModwatchError, Result};

/// File-per-key JSON store.
pub struct JsonFileStore {
    dir: PathBuf,
    // Serializes writers within this process; rename handles readers.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(ModwatchError::Storage(format!("Invalid state key: '{}'", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn read_raw(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_raw(&self, key: &str, value: String) -> Result<()> {
        let path = self.path_for(key)?;
        let temp = self.dir.join(format!(".{}.json.tmp", key));

        let _guard = self.write_lock.lock().await;

        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(value.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        tracing::debug!("Wrote {} ({} bytes)", path.display(), value.len());
        Ok(())
    }
}
