//! Key-value persistence boundary.
//!
//! [`SnapshotStore`](crate::store::SnapshotStore) reads and replaces whole
//! documents by key; nothing else in labmesh touches storage. Two backends:
//! - [`MemoryKvStore`]: `DashMap`, lost on exit (tests, ephemeral runs)
//! - [`FileKvStore`]: one JSON file per key, replaced atomically
//!
//! # Example
//!
//! ```rust
//! use labmesh::kv::{KvStore, MemoryKvStore};
//!
//! # async fn example() -> labmesh::Result<()> {
//! let store = MemoryKvStore::new();
//! assert_eq!(store.get("resources").await?, None);
//!
//! store.set("resources", b"{}".to_vec()).await?;
//! assert_eq!(store.get("resources").await?, Some(b"{}".to_vec()));
//! # Ok(())
//! # }
//! ```

mod file;
mod memory;

pub use file::FileKvStore;
pub use memory::MemoryKvStore;

use crate::Result;
use std::future::Future;

/// Whole-document storage keyed by collection name.
///
/// `set` must be atomic: a later `get` observes either the previous document
/// or the new one, never a torn write.
pub trait KvStore: Send + Sync {
    /// Read the document stored under `key`; `None` if there is none yet.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Replace the document stored under `key`.
    fn set(&self, key: &str, value: Vec<u8>) -> impl Future<Output = Result<()>> + Send;
}
