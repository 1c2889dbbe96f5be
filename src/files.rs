//! Temporary storage for uploaded database files.
//!
//! An upload is written to a uniquely named file (`upload_XXXXXX.<ext>`) in
//! the configured directory. The returned [`TempUpload`] owns that file: it is
//! deleted on [`TempFileManager::release`] or, failing an explicit release, when
//! the handle is dropped. Deletion failures are logged and remembered so
//! [`TempFileManager::purge_leftovers`] can retry at shutdown. Cleanup never
//! returns an error.

use crate::error::{EngineError, EngineResult};
use crate::models::Upload;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempPath;
use tracing::{debug, warn};

const FILE_PREFIX: &str = "upload_";
const DEFAULT_EXTENSION: &str = "tmp";
const MAX_EXTENSION_LEN: usize = 16;

/// A persisted upload. Deleting the file is tied to this value.
#[derive(Debug)]
pub struct TempUpload {
    path: TempPath,
    original_name: String,
    size: u64,
}

impl TempUpload {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name the client gave the file.
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Name of the temp file on disk.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Default)]
pub struct TempFileManager {
    dir: Option<PathBuf>,
    /// Paths whose deletion failed.
    leftovers: Mutex<Vec<PathBuf>>,
}

impl TempFileManager {
    /// `dir` of `None` uses the system temp directory.
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            leftovers: Mutex::new(Vec::new()),
        }
    }

    /// Write `upload` to a fresh temp file.
    pub async fn persist(&self, upload: &Upload) -> EngineResult<TempUpload> {
        if upload.is_empty() {
            warn!(file_name = %upload.file_name, "Rejected empty upload");
            return Err(EngineError::EmptyFile);
        }

        let dir = self.dir.clone().unwrap_or_else(std::env::temp_dir);
        let suffix = format!(".{}", sanitize_extension(&upload.file_name));
        let bytes = upload.bytes.clone();

        let path = tokio::task::spawn_blocking(move || -> std::io::Result<TempPath> {
            let mut file = tempfile::Builder::new()
                .prefix(FILE_PREFIX)
                .suffix(&suffix)
                .tempfile_in(&dir)?;
            file.write_all(&bytes)?;
            file.as_file().sync_all()?;
            Ok(file.into_temp_path())
        })
        .await
        .map_err(|e| EngineError::file_upload(format!("write task failed: {}", e)))?
        .map_err(|e| EngineError::file_upload(e.to_string()))?;

        debug!(
            file_name = %upload.file_name,
            path = %path.display(),
            size = upload.len(),
            "Saved upload to temp file"
        );

        Ok(TempUpload {
            path,
            original_name: upload.file_name.clone(),
            size: upload.len() as u64,
        })
    }

    /// Delete the file behind `upload`. Failures are logged and queued for
    /// [`purge_leftovers`](Self::purge_leftovers).
    pub fn release(&self, upload: TempUpload) {
        let path = upload.path.to_path_buf();
        match upload.path.close() {
            Ok(()) => debug!(path = %path.display(), "Deleted temp file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to delete temp file");
                self.remember(path);
            }
        }
    }

    /// Retry every failed deletion. Returns the number of files still left.
    pub fn purge_leftovers(&self) -> usize {
        let pending = match self.leftovers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => return 0,
        };

        let mut remaining = 0;
        for path in pending {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "Deleted leftover temp file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Leftover temp file remains");
                    remaining += 1;
                }
            }
        }
        remaining
    }

    pub fn leftover_count(&self) -> usize {
        self.leftovers.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    fn remember(&self, path: PathBuf) {
        if let Ok(mut guard) = self.leftovers.lock() {
            guard.push(path);
        }
    }
}

/// Extension of the client file name, reduced to ASCII alphanumerics. The
/// client name never reaches the file system otherwise.
fn sanitize_extension(file_name: &str) -> String {
    let ext: String = Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy())
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(MAX_EXTENSION_LEN)
        .collect();

    if ext.is_empty() {
        DEFAULT_EXTENSION.to_string()
    } else {
        ext.to_ascii_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_extension() {
        assert_eq!(sanitize_extension("shop.db"), "db");
        assert_eq!(sanitize_extension("Shop.SQLite3"), "sqlite3");
        assert_eq!(sanitize_extension("noext"), "tmp");
        assert_eq!(sanitize_extension("../../etc/passwd"), "tmp");
        assert_eq!(sanitize_extension("evil.d/b"), "tmp");
        assert_eq!(sanitize_extension("x.d$b"), "db");
    }

    #[tokio::test]
    async fn test_persist_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TempFileManager::new(Some(dir.path().to_path_buf()));

        let upload = Upload::new("../shop.db", b"SQLite format 3\0".to_vec());
        let temp = manager.persist(&upload).await.unwrap();

        let path = temp.path().to_path_buf();
        assert!(path.starts_with(dir.path()));
        assert!(temp.file_name().starts_with(FILE_PREFIX));
        assert!(temp.file_name().ends_with(".db"));
        assert_eq!(temp.original_name(), "../shop.db");
        assert_eq!(temp.size(), 16);
        assert_eq!(std::fs::read(&path).unwrap(), upload.bytes);

        manager.release(temp);
        assert!(!path.exists());
        assert_eq!(manager.leftover_count(), 0);
    }

    #[tokio::test]
    async fn test_uploads_get_distinct_paths() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TempFileManager::new(Some(dir.path().to_path_buf()));
        let upload = Upload::new("a.db", vec![1]);

        let first = manager.persist(&upload).await.unwrap();
        let second = manager.persist(&upload).await.unwrap();
        assert_ne!(first.path(), second.path());
    }

    #[tokio::test]
    async fn test_empty_upload_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TempFileManager::new(Some(dir.path().to_path_buf()));

        let result = manager.persist(&Upload::new("empty.db", Vec::new())).await;
        assert!(matches!(result, Err(EngineError::EmptyFile)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_drop_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TempFileManager::new(Some(dir.path().to_path_buf()));

        let temp = manager.persist(&Upload::new("a.db", vec![1, 2])).await.unwrap();
        let path = temp.path().to_path_buf();
        drop(temp);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_missing_directory_is_upload_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TempFileManager::new(Some(dir.path().join("gone")));

        let result = manager.persist(&Upload::new("a.db", vec![1])).await;
        assert!(matches!(result, Err(EngineError::FileUpload { .. })));
    }

    #[test]
    fn test_purge_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TempFileManager::new(None);
        let stale = dir.path().join("stale.db");
        std::fs::write(&stale, b"x").unwrap();

        manager.remember(stale.clone());
        manager.remember(dir.path().join("already-gone.db"));
        assert_eq!(manager.leftover_count(), 2);

        assert_eq!(manager.purge_leftovers(), 0);
        assert!(!stale.exists());
        assert_eq!(manager.leftover_count(), 0);
    }
}
