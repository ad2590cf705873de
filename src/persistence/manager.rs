//! Snapshot files on disk.
//!
//! Saves always go through a temporary sibling file that is fsynced and then
//! renamed over the target, so a reader or a crash never sees a truncated
//! file. Each save uses its own temporary name, which keeps concurrent
//! unguarded saves from interleaving; the `threadsafe` flag additionally
//! serializes saves to the same path.

use crate::error::{NemoriaError, Result};
use crate::persistence::format::Codec;
use crate::store::value::Value;
use std::collections::HashMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

/// Outcome of a successful save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub path: PathBuf,
    pub codec: Codec,
    pub bytes: usize,
}

/// Coordinates snapshot writes and reads.
#[derive(Debug, Default)]
pub struct PersistenceManager {
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
    sequence: AtomicU64,
}

fn persistence_error(action: &str, path: &Path, err: impl std::fmt::Display) -> NemoriaError {
    NemoriaError::PersistenceError(format!("failed to {action} {}: {err}", path.display()))
}

impl PersistenceManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn path_lock(&self, path: &Path) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self.locks.lock().map_err(|_| {
            NemoriaError::Internal(crate::error::constants::ERR_LOCK_POISONED.into())
        })?;
        Ok(locks.entry(path.to_path_buf()).or_default().clone())
    }

    /// Forget the lock for `path` once no other save holds or awaits it.
    fn release_lock(&self, path: &Path, lock: Arc<tokio::sync::Mutex<()>>) {
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        let idle = locks
            .get(path)
            .is_some_and(|held| Arc::ptr_eq(held, &lock) && Arc::strong_count(&lock) == 2);
        if idle {
            locks.remove(path);
        }
    }

    fn temp_path(&self, path: &Path) -> PathBuf {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snapshot".to_string());
        path.with_file_name(format!(".{name}.{}.{seq}.tmp", std::process::id()))
    }

    /// Encode `snapshot` with `codec` and atomically replace `path` with it.
    #[instrument(skip(self, snapshot, path), fields(path = %path.as_ref().display(), codec = %codec))]
    pub async fn save<P: AsRef<Path>>(
        &self,
        snapshot: &Value,
        codec: Codec,
        path: P,
        threadsafe: bool,
    ) -> Result<SaveReport> {
        let path = path.as_ref();
        let bytes = codec.encode(snapshot)?;
        if !threadsafe {
            return self.write_atomic(path, codec, bytes).await;
        }

        let lock = self.path_lock(path)?;
        let result = {
            let _guard = lock.lock().await;
            self.write_atomic(path, codec, bytes).await
        };
        self.release_lock(path, lock);
        result
    }

    async fn write_atomic(&self, path: &Path, codec: Codec, bytes: Vec<u8>) -> Result<SaveReport> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| persistence_error("create directory for", path, e))?;
            }
        }

        let temp_path = self.temp_path(path);
        debug!(temp_path = %temp_path.display(), bytes = bytes.len(), "Writing snapshot");

        if let Err(e) = write_synced(&temp_path, &bytes).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(persistence_error("write", &temp_path, e));
        }

        if let Err(e) = fs::rename(&temp_path, path).await {
            warn!(temp_path = %temp_path.display(), error = %e, "Rename failed, cleaning up temp file");
            let _ = fs::remove_file(&temp_path).await;
            return Err(persistence_error("replace", path, e));
        }

        info!(bytes = bytes.len(), "Snapshot saved");
        Ok(SaveReport {
            path: path.to_path_buf(),
            codec,
            bytes: bytes.len(),
        })
    }

    /// Read and decode the snapshot at `path`.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display(), codec = %codec))]
    pub async fn load<P: AsRef<Path>>(&self, codec: Codec, path: P) -> Result<Value> {
        let path = path.as_ref();
        let data = fs::read(path)
            .await
            .map_err(|e| persistence_error("read", path, e))?;
        let snapshot = codec
            .decode(&data)
            .map_err(|e| persistence_error("decode", path, e))?;
        debug!(bytes = data.len(), "Snapshot loaded");
        Ok(snapshot)
    }

    /// Like [`PersistenceManager::load`], but a missing file yields `None`.
    pub async fn load_or_empty<P: AsRef<Path>>(&self, codec: Codec, path: P) -> Result<Option<Value>> {
        let path = path.as_ref();
        match fs::metadata(path).await {
            Ok(_) => self.load(codec, path).await.map(Some),
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                info!(path = %path.display(), "No snapshot file, starting empty");
                Ok(None)
            }
            Err(e) => Err(persistence_error("inspect", path, e)),
        }
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}
