//! File-backed KV store: one document per key under a root directory.
//!
//! Writes are atomic at the file-system level: the value is written to a
//! sibling temp file, flushed to disk, then renamed over `<key>.json`.

use super::KvStore;
use crate::{Error, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const EXTENSION: &str = "json";

/// Durable key-value store keeping each key in its own JSON file.
///
/// Keys are restricted to ASCII alphanumerics, `-`, `_` and `.` so they map
/// onto file names without escaping.
#[derive(Debug, Clone)]
pub struct FileKvStore {
    root: PathBuf,
}

impl FileKvStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// Temp files left behind by an interrupted write are removed; the
    /// document they were replacing is still intact.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the directory cannot be created or scanned.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        let removed = sweep_partial_writes(&root).await?;
        if removed > 0 {
            warn!(root = %root.display(), removed, "removed partial writes");
        }
        Ok(Self { root })
    }

    /// Root directory of this store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the document backing `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for keys that are not file-name safe.
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(Error::Validation(format!("invalid store key: {key:?}")));
        }
        Ok(self.root.join(format!("{key}.{EXTENSION}")))
    }
}

impl KvStore for FileKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&value).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        debug!(path = %path.display(), bytes = value.len(), "document written");
        Ok(())
    }
}

async fn sweep_partial_writes(root: &Path) -> Result<usize> {
    let suffix = format!(".{EXTENSION}.tmp");
    let mut removed = 0;
    let mut entries = tokio::fs::read_dir(root).await?;
    while let Some(entry) = entries.next_entry().await? {
        let partial = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.ends_with(&suffix));
        if partial && entry.file_type().await?.is_file() {
            tokio::fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_kv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKvStore::open(dir.path()).await.unwrap();

        assert_eq!(store.get("requests").await.unwrap(), None);

        store.set("requests", b"{\"a\":1}".to_vec()).await.unwrap();
        assert_eq!(
            store.get("requests").await.unwrap(),
            Some(b"{\"a\":1}".to_vec())
        );
        assert!(dir.path().join("requests.json").exists());
        assert!(!dir.path().join("requests.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_kv_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileKvStore::open(dir.path()).await.unwrap();
            store.set("resources", b"[1,2,3]".to_vec()).await.unwrap();
        }

        let reopened = FileKvStore::open(dir.path()).await.unwrap();
        assert_eq!(
            reopened.get("resources").await.unwrap(),
            Some(b"[1,2,3]".to_vec())
        );
    }

    #[tokio::test]
    async fn test_open_removes_partial_writes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("requests.json"), b"{\"ok\":true}").unwrap();
        std::fs::write(dir.path().join("requests.json.tmp"), b"{\"ok\":").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"keep").unwrap();

        let store = FileKvStore::open(dir.path()).await.unwrap();

        assert!(!dir.path().join("requests.json.tmp").exists());
        assert!(dir.path().join("notes.txt").exists());
        assert_eq!(
            store.get("requests").await.unwrap(),
            Some(b"{\"ok\":true}".to_vec())
        );
    }

    #[tokio::test]
    async fn test_file_kv_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKvStore::open(dir.path()).await.unwrap();

        for key in ["", "../escape", "a/b", ".hidden"] {
            let err = store.set(key, vec![]).await.unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "key {key:?}");
        }
    }
}
