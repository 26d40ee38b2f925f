//! Process-local document store.

use super::KvStore;
use crate::Result;
use dashmap::DashMap;

/// Documents held in a `DashMap`; everything is gone when the process exits.
///
/// Used by tests, benchmarks and coordinators that do not need durability.
/// Swap in [`super::FileKvStore`] to persist across restarts.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    documents: DashMap<String, Vec<u8>>,
}

impl MemoryKvStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.documents.get(key).map(|doc| doc.value().clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.documents.insert(key.to_owned(), value);
        Ok(())
    }
}
