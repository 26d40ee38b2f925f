//! Snapshot persistence for the two core collections.
//!
//! Each collection is written in full, as a human-readable JSON document, on
//! every mutation:
//!
//! ```text
//! {
//!   "schema_version": "1.0.0",
//!   "last_updated": "2025-11-20T09:00:00Z",
//!   "resources": [ { "resource_id": "...", "type": "microscope", ... } ]
//! }
//! ```
//!
//! Reads that fail (backend error or corrupt document) are retried once
//! against the last document this process read or wrote successfully.

use crate::kv::KvStore;
use crate::{Error, Result};
use chrono::Utc;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

/// Version stamped into every persisted document.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// The independently persisted collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// The resource registry
    Resources,
    /// The experiment-request set
    Requests,
}

impl Collection {
    /// Store key, also the name of the item array inside the document.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::Resources => "resources",
            Self::Requests => "requests",
        }
    }
}

/// Whole-document persistence over any [`KvStore`].
#[derive(Debug)]
pub struct SnapshotStore<S> {
    backend: S,
    last_good: DashMap<Collection, Vec<u8>>,
}

impl<S: KvStore> SnapshotStore<S> {
    /// Wrap a key-value backend.
    #[must_use]
    pub fn new(backend: S) -> Self {
        Self {
            backend,
            last_good: DashMap::new(),
        }
    }

    /// Get reference to the backend (for inspection/testing)
    #[must_use]
    pub const fn backend(&self) -> &S {
        &self.backend
    }

    /// Load every item of a collection. A missing document is an empty collection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] if neither the stored document nor the
    /// cached last-good document can be decoded.
    pub async fn load<T: DeserializeOwned>(&self, collection: Collection) -> Result<Vec<T>> {
        let first_attempt = match self.backend.get(collection.key()).await {
            Ok(None) => return Ok(Vec::new()),
            Ok(Some(bytes)) => decode::<T>(collection, &bytes).map(|items| (items, bytes)),
            Err(e) => Err(e),
        };

        match first_attempt {
            Ok((items, bytes)) => {
                self.last_good.insert(collection, bytes);
                Ok(items)
            }
            Err(e) => {
                let cached = self.last_good.get(&collection).map(|b| b.value().clone());
                let Some(bytes) = cached else {
                    return Err(Error::Persistence(format!(
                        "failed to load {}: {e}",
                        collection.key()
                    )));
                };
                warn!(collection = collection.key(), error = %e, "read failed, retrying from cached snapshot");
                decode(collection, &bytes).map_err(|retry| {
                    Error::Persistence(format!(
                        "failed to load {} (cached snapshot also unreadable: {retry}): {e}",
                        collection.key()
                    ))
                })
            }
        }
    }

    /// Replace the stored document of a collection with `items`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] if encoding or the backend write fails.
    pub async fn save<T: Serialize + Sync>(&self, collection: Collection, items: &[T]) -> Result<()> {
        let bytes = encode(collection, items)?;
        self.backend
            .set(collection.key(), bytes.clone())
            .await
            .map_err(|e| Error::Persistence(format!("failed to write {}: {e}", collection.key())))?;
        debug!(collection = collection.key(), items = items.len(), "snapshot persisted");
        self.last_good.insert(collection, bytes);
        Ok(())
    }
}

fn encode<T: Serialize>(collection: Collection, items: &[T]) -> Result<Vec<u8>> {
    let mut document = serde_json::Map::new();
    document.insert("schema_version".into(), SCHEMA_VERSION.into());
    document.insert("last_updated".into(), Utc::now().to_rfc3339().into());
    document.insert(
        collection.key().into(),
        serde_json::to_value(items)
            .map_err(|e| Error::Persistence(format!("failed to encode {}: {e}", collection.key())))?,
    );
    serde_json::to_vec_pretty(&document)
        .map_err(|e| Error::Persistence(format!("failed to encode {}: {e}", collection.key())))
}

fn decode<T: DeserializeOwned>(collection: Collection, bytes: &[u8]) -> Result<Vec<T>> {
    let mut document: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(bytes)
        .map_err(|e| Error::Persistence(format!("corrupt {} document: {e}", collection.key())))?;

    let version = document
        .get("schema_version")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    if version.split('.').next() != SCHEMA_VERSION.split('.').next() {
        return Err(Error::Persistence(format!(
            "unsupported {} schema version {version:?}",
            collection.key()
        )));
    }

    let items = document
        .remove(collection.key())
        .unwrap_or_else(|| serde_json::Value::Array(Vec::new()));
    serde_json::from_value(items)
        .map_err(|e| Error::Persistence(format!("corrupt {} document: {e}", collection.key())))
}
