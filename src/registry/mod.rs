//! Resource Registry
//!
//! Holds every registered resource (microscopes, compute, VLM services,
//! storage, analysis, genomics, robotics), their capabilities and live
//! status, and answers discovery queries.
//!
//! ## Consistency
//!
//! The registry is one aggregate behind one `RwLock`. A mutation prepares the
//! changed record, persists the full resource set, and only then commits the
//! change in memory. A failed write leaves the registry exactly as it was.
//!
//! Resources are never hard-deleted: [`ResourceRegistry::deregister`] marks
//! them `offline` and tombstoned, keeping them for audit.
//!
//! A resource is held by at most one request at a time. The holder's id is
//! recorded on the resource when the queue claims it, and only that request
//! can release it, even across deregistration and reactivation.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use labmesh::kv::MemoryKvStore;
//! use labmesh::registry::{Resource, ResourceFilter, ResourceRegistry, ResourceStatus, ResourceType};
//! use labmesh::store::SnapshotStore;
//!
//! # async fn example() -> labmesh::Result<()> {
//! let store = Arc::new(SnapshotStore::new(MemoryKvStore::new()));
//! let registry = ResourceRegistry::load(store).await?;
//!
//! registry
//!     .register(
//!         Resource::builder("dispim-001", ResourceType::Microscope)
//!             .capabilities(["3d_imaging", "live_cell"])
//!             .status(ResourceStatus::Online)
//!             .build(),
//!     )
//!     .await?;
//!
//! let online = registry
//!     .find(&ResourceFilter::new().with_status(ResourceStatus::Online))
//!     .await;
//! assert_eq!(online.len(), 1);
//! # Ok(())
//! # }
//! ```

mod filter;
mod metadata;
mod resource;

pub use filter::ResourceFilter;
pub use metadata::{EnvironmentalChamber, Objective, ResourceMetadata, Reviewer};
pub use resource::{Resource, ResourceBuilder, ResourceStatus, ResourceType};

use crate::kv::KvStore;
use crate::predicate::text_eq;
use crate::store::{Collection, SnapshotStore};
use crate::{Error, Result};
use chrono::Utc;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Registry-wide counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Every resource ever registered, tombstones included
    pub total: usize,
    /// Resources not deregistered
    pub active: usize,
    /// Active resources per type
    pub by_type: BTreeMap<ResourceType, usize>,
    /// Active resources per status
    pub by_status: BTreeMap<ResourceStatus, usize>,
}

#[derive(Debug, Default)]
struct RegistryState {
    /// Insertion order
    resources: Vec<Resource>,
    index: FxHashMap<String, usize>,
}

impl RegistryState {
    fn position(&self, resource_id: &str) -> Result<usize> {
        self.index
            .get(resource_id)
            .copied()
            .ok_or_else(|| Error::resource_not_found(resource_id))
    }

    /// The persisted view of the registry with `slot` replaced (or appended).
    fn view_with<'a>(&'a self, slot: Option<usize>, record: &'a Resource) -> Vec<&'a Resource> {
        let mut view: Vec<&Resource> = self
            .resources
            .iter()
            .enumerate()
            .map(|(i, r)| if Some(i) == slot { record } else { r })
            .collect();
        if slot.is_none() {
            view.push(record);
        }
        view
    }
}

/// Registry of resources, persisted through a [`SnapshotStore`].
#[derive(Debug)]
pub struct ResourceRegistry<S> {
    state: RwLock<RegistryState>,
    store: Arc<SnapshotStore<S>>,
}

impl<S: KvStore> ResourceRegistry<S> {
    /// Load the registry from `store`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] if the stored document cannot be read or
    /// contains duplicate ids.
    pub async fn load(store: Arc<SnapshotStore<S>>) -> Result<Self> {
        let resources: Vec<Resource> = store.load(Collection::Resources).await?;
        let mut index = FxHashMap::default();
        for (i, resource) in resources.iter().enumerate() {
            if index.insert(resource.resource_id().to_string(), i).is_some() {
                return Err(Error::Persistence(format!(
                    "duplicate resource id in stored registry: {}",
                    resource.resource_id()
                )));
            }
        }
        debug!(resources = resources.len(), "registry loaded");
        Ok(Self {
            state: RwLock::new(RegistryState { resources, index }),
            store,
        })
    }

    /// Register a new resource, or reactivate a tombstoned one.
    ///
    /// Reactivation keeps the original registration time, takes the new
    /// capabilities and metadata, and sets the status to `online`.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for an empty id, metadata keys foreign to the
    ///   type, or a type change on reactivation
    /// - [`Error::DuplicateResource`] if the id is registered and active
    /// - [`Error::Persistence`] if the write fails
    #[tracing::instrument(skip(self, resource), fields(resource_id = %resource.resource_id()))]
    pub async fn register(&self, mut resource: Resource) -> Result<Resource> {
        if resource.resource_id().trim().is_empty() {
            return Err(Error::Validation("resource_id must not be empty".into()));
        }
        resource.metadata().validate_for(resource.resource_type())?;

        let mut state = self.state.write().await;
        let now = Utc::now();

        let (slot, record) = match state.index.get(resource.resource_id()).copied() {
            Some(i) => {
                let existing = &state.resources[i];
                if !existing.is_deregistered() {
                    return Err(Error::DuplicateResource(resource.resource_id().to_string()));
                }
                if existing.resource_type() != resource.resource_type() {
                    return Err(Error::Validation(format!(
                        "resource {} was registered as {}, cannot re-register as {}",
                        resource.resource_id(),
                        existing.resource_type(),
                        resource.resource_type()
                    )));
                }
                let mut record = existing.clone();
                record.reactivate_from(resource, now);
                (Some(i), record)
            }
            None => {
                resource.stamp_registered(now);
                (None, resource)
            }
        };

        self.store
            .save(Collection::Resources, &state.view_with(slot, &record))
            .await?;

        match slot {
            Some(i) => {
                info!(resource_type = %record.resource_type(), "resource reactivated");
                state.resources[i] = record.clone();
            }
            None => {
                info!(resource_type = %record.resource_type(), status = %record.status(), "resource registered");
                let i = state.resources.len();
                state.index.insert(record.resource_id().to_string(), i);
                state.resources.push(record.clone());
            }
        }
        Ok(record)
    }

    /// Set the status of a resource. Setting the current status is a no-op.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] for an unknown id
    /// - [`Error::Validation`] if the resource is deregistered
    /// - [`Error::Persistence`] if the write fails
    #[tracing::instrument(skip(self))]
    pub async fn update_status(&self, resource_id: &str, status: ResourceStatus) -> Result<Resource> {
        let mut state = self.state.write().await;
        let i = state.position(resource_id)?;
        let current = &state.resources[i];

        if current.is_deregistered() {
            return Err(Error::Validation(format!(
                "resource {resource_id} is deregistered; register it again to reactivate"
            )));
        }
        if current.status() == status {
            return Ok(current.clone());
        }

        let mut record = current.clone();
        record.set_status(status, Utc::now());
        self.commit(&mut state, i, record).await
    }

    /// Record a liveness heartbeat.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown id, [`Error::Persistence`] if the
    /// write fails.
    #[tracing::instrument(skip(self))]
    pub async fn heartbeat(&self, resource_id: &str) -> Result<Resource> {
        let mut state = self.state.write().await;
        let i = state.position(resource_id)?;
        let mut record = state.resources[i].clone();
        record.touch_heartbeat(Utc::now());
        self.commit(&mut state, i, record).await
    }

    /// Tombstone a resource: status `offline`, history preserved.
    ///
    /// Deregistering an already tombstoned resource is a no-op.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown id, [`Error::Persistence`] if the
    /// write fails.
    #[tracing::instrument(skip(self))]
    pub async fn deregister(&self, resource_id: &str) -> Result<Resource> {
        let mut state = self.state.write().await;
        let i = state.position(resource_id)?;
        if state.resources[i].is_deregistered() {
            return Ok(state.resources[i].clone());
        }
        let mut record = state.resources[i].clone();
        record.tombstone(Utc::now());
        info!("resource deregistered");
        self.commit(&mut state, i, record).await
    }

    /// Look up one resource (tombstones included).
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown id.
    pub async fn get(&self, resource_id: &str) -> Result<Resource> {
        let state = self.state.read().await;
        let i = state.position(resource_id)?;
        Ok(state.resources[i].clone())
    }

    /// All resources matching `filter`, in registration order.
    pub async fn find(&self, filter: &ResourceFilter) -> Vec<Resource> {
        let state = self.state.read().await;
        state
            .resources
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect()
    }

    /// Point-in-time copy of every resource, in registration order.
    pub async fn snapshot(&self) -> Vec<Resource> {
        self.state.read().await.resources.clone()
    }

    /// Number of registered resources, tombstones included.
    pub async fn len(&self) -> usize {
        self.state.read().await.resources.len()
    }

    /// True if nothing was ever registered.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.resources.is_empty()
    }

    /// Reviewer emails of active microscopes of `microscope_kind`.
    ///
    /// The kind compares case-insensitively. Each address appears once, in
    /// registration order.
    pub async fn reviewer_emails(&self, microscope_kind: &str) -> Vec<String> {
        let state = self.state.read().await;
        let mut emails: Vec<String> = Vec::new();
        let microscopes = state.resources.iter().filter(|r| {
            !r.is_deregistered()
                && r.resource_type() == ResourceType::Microscope
                && r
                    .metadata()
                    .microscope_kind
                    .as_deref()
                    .is_some_and(|kind| text_eq(kind, microscope_kind))
        });
        for resource in microscopes {
            for reviewer in &resource.metadata().reviewers {
                if !emails.contains(&reviewer.email) {
                    emails.push(reviewer.email.clone());
                }
            }
        }
        emails
    }

    /// Counts per type and status over active resources.
    pub async fn stats(&self) -> RegistryStats {
        let state = self.state.read().await;
        let mut stats = RegistryStats {
            total: state.resources.len(),
            ..RegistryStats::default()
        };
        for resource in state.resources.iter().filter(|r| !r.is_deregistered()) {
            stats.active += 1;
            *stats.by_type.entry(resource.resource_type()).or_default() += 1;
            *stats.by_status.entry(resource.status()).or_default() += 1;
        }
        stats
    }

    /// Atomically move an unclaimed `online` resource to `busy`, held by
    /// `request_id`.
    ///
    /// Returns `false` (and changes nothing) if the resource is not online, is
    /// deregistered, or is still held by another request.
    pub(crate) async fn claim(&self, resource_id: &str, request_id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let i = state.position(resource_id)?;
        let current = &state.resources[i];
        if current.is_deregistered()
            || current.is_claimed()
            || current.status() != ResourceStatus::Online
        {
            return Ok(false);
        }
        let now = Utc::now();
        let mut record = current.clone();
        record.set_status(ResourceStatus::Busy, now);
        record.set_claim(Some(request_id), now);
        self.commit(&mut state, i, record).await?;
        debug!(resource_id, request_id, "resource claimed");
        Ok(true)
    }

    /// Drop the claim `request_id` holds; a `busy` resource goes back to
    /// `online`.
    ///
    /// Returns `false` (and changes nothing) unless `request_id` is the holder.
    pub(crate) async fn release(&self, resource_id: &str, request_id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let i = state.position(resource_id)?;
        let current = &state.resources[i];
        if current.claimed_by() != Some(request_id) {
            return Ok(false);
        }
        let now = Utc::now();
        let mut record = current.clone();
        record.set_claim(None, now);
        if !record.is_deregistered() && record.status() == ResourceStatus::Busy {
            record.set_status(ResourceStatus::Online, now);
        }
        self.commit(&mut state, i, record).await?;
        debug!(resource_id, request_id, "resource released");
        Ok(true)
    }

    /// Give a just-released claim back to `request_id`.
    ///
    /// Returns `false` if another request holds the resource meanwhile.
    pub(crate) async fn restore_claim(&self, resource_id: &str, request_id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let i = state.position(resource_id)?;
        let current = &state.resources[i];
        if current.is_claimed() {
            return Ok(current.claimed_by() == Some(request_id));
        }
        let now = Utc::now();
        let mut record = current.clone();
        record.set_claim(Some(request_id), now);
        if !record.is_deregistered() && record.status() == ResourceStatus::Online {
            record.set_status(ResourceStatus::Busy, now);
        }
        self.commit(&mut state, i, record).await?;
        Ok(true)
    }

    async fn commit(&self, state: &mut RegistryState, slot: usize, record: Resource) -> Result<Resource> {
        self.store
            .save(Collection::Resources, &state.view_with(Some(slot), &record))
            .await?;
        state.resources[slot] = record.clone();
        Ok(record)
    }
}
