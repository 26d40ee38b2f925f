//! Coordinator: the explicit lifecycle object of a labmesh process.
//!
//! Built once at startup from a [`KvStore`] backend, it loads both
//! collections, wires the registry, queue and notifier together, and owns the
//! optional re-scan timer. Call [`Coordinator::shutdown`] to stop the timer.
//!
//! ```rust
//! use labmesh::coordinator::Coordinator;
//! use labmesh::kv::MemoryKvStore;
//! use labmesh::registry::{Resource, ResourceStatus, ResourceType};
//!
//! # async fn example() -> labmesh::Result<()> {
//! let coordinator = Coordinator::builder().build(MemoryKvStore::new()).await?;
//!
//! coordinator
//!     .register_resource(
//!         Resource::builder("dispim-001", ResourceType::Microscope)
//!             .capabilities(["3d_imaging", "live_cell"])
//!             .status(ResourceStatus::Online)
//!             .build(),
//!     )
//!     .await?;
//!
//! coordinator.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::config::CoordinatorConfig;
use crate::experiment::{ExperimentQueue, ExperimentRequest};
use crate::kv::{FileKvStore, KvStore};
use crate::notify::{NoopNotifier, Notifier};
use crate::registry::{Resource, ResourceRegistry, ResourceStatus};
use crate::store::SnapshotStore;
use crate::Result;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct RescanTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Registry, queue and background work of one process.
pub struct Coordinator<S> {
    config: CoordinatorConfig,
    store: Arc<SnapshotStore<S>>,
    registry: Arc<ResourceRegistry<S>>,
    queue: Arc<ExperimentQueue<S>>,
    rescan: Mutex<Option<RescanTask>>,
}

impl<S> std::fmt::Debug for Coordinator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Coordinator<FileKvStore> {
    /// Build a file-backed coordinator under `config.data_dir`.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Io`] if the directory cannot be created, or any load error.
    pub async fn open(config: CoordinatorConfig) -> Result<Self> {
        let backend = FileKvStore::open(&config.data_dir).await?;
        CoordinatorBuilder::default().config(config).build(backend).await
    }
}

impl Coordinator<()> {
    /// Create a new coordinator builder
    #[must_use]
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::default()
    }
}

impl<S: KvStore> Coordinator<S> {
    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// The resource registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ResourceRegistry<S>> {
        &self.registry
    }

    /// The experiment queue.
    #[must_use]
    pub const fn queue(&self) -> &Arc<ExperimentQueue<S>> {
        &self.queue
    }

    /// The snapshot store both components persist through.
    #[must_use]
    pub const fn store(&self) -> &Arc<SnapshotStore<S>> {
        &self.store
    }

    /// Register a resource, then re-scan approved requests if it is online.
    ///
    /// # Errors
    ///
    /// Registration errors, or [`crate::Error::Persistence`] from the re-scan
    /// (the resource stays registered in that case).
    pub async fn register_resource(&self, resource: Resource) -> Result<Resource> {
        let registered = self.registry.register(resource).await?;
        if registered.status() == ResourceStatus::Online {
            self.rescan_after("registration").await?;
        }
        Ok(registered)
    }

    /// Update a resource's status, then re-scan if it came online.
    ///
    /// # Errors
    ///
    /// Status-update errors, or [`crate::Error::Persistence`] from the re-scan.
    pub async fn update_resource_status(
        &self,
        resource_id: &str,
        status: ResourceStatus,
    ) -> Result<Resource> {
        let updated = self.registry.update_status(resource_id, status).await?;
        if status == ResourceStatus::Online {
            self.rescan_after("status change").await?;
        }
        Ok(updated)
    }

    /// Complete a request, then offer the released resource to waiting work.
    ///
    /// # Errors
    ///
    /// Completion errors, or [`crate::Error::Persistence`] from the re-scan.
    pub async fn complete(
        &self,
        request_id: &str,
        operator: &str,
        results_location: Option<String>,
    ) -> Result<ExperimentRequest> {
        let completed = self
            .queue
            .complete(request_id, operator, results_location)
            .await?;
        self.rescan_after("completion").await?;
        Ok(completed)
    }

    async fn rescan_after(&self, trigger: &str) -> Result<()> {
        if !self.config.rescan_on_registration {
            return Ok(());
        }
        let scheduled = self.queue.schedule_pending().await?;
        if !scheduled.is_empty() {
            info!(trigger, scheduled = scheduled.len(), "re-scan scheduled approved requests");
        }
        Ok(())
    }

    /// Stop the re-scan timer, if running, and wait for it to finish.
    pub async fn shutdown(&self) {
        let Some(task) = self.rescan.lock().await.take() else {
            return;
        };
        // A closed receiver means the task already exited.
        let _ = task.stop.send(true);
        if let Err(e) = task.handle.await {
            warn!(error = %e, "re-scan task ended abnormally");
        }
        debug!("coordinator shut down");
    }
}

impl<S: KvStore + 'static> Coordinator<S> {
    /// Spawn the periodic re-scan task when `rescan_interval_secs` is set.
    ///
    /// Returns `false` if no interval is configured or the task already runs.
    pub async fn start_rescan_timer(&self) -> bool {
        let Some(period) = self.config.rescan_interval() else {
            return false;
        };
        let mut slot = self.rescan.lock().await;
        if slot.is_some() {
            return false;
        }

        let (stop, mut stopped) = watch::channel(false);
        let queue = Arc::clone(&self.queue);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = queue.schedule_pending().await {
                            warn!(error = %e, "periodic re-scan failed");
                        }
                    }
                    _ = stopped.changed() => break,
                }
            }
        });

        info!(interval_secs = period.as_secs(), "re-scan timer started");
        *slot = Some(RescanTask { stop, handle });
        true
    }
}

/// Coordinator builder
pub struct CoordinatorBuilder {
    config: CoordinatorConfig,
    notifier: Arc<dyn Notifier>,
}

impl Default for CoordinatorBuilder {
    fn default() -> Self {
        Self {
            config: CoordinatorConfig::default(),
            notifier: Arc::new(NoopNotifier),
        }
    }
}

impl std::fmt::Debug for CoordinatorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CoordinatorBuilder {
    /// Set the configuration
    #[must_use]
    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the transition notifier
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Load both collections from `backend` and assemble the coordinator
    ///
    /// # Errors
    ///
    /// [`crate::Error::Validation`] for an invalid configuration,
    /// [`crate::Error::Persistence`] if a stored collection cannot be loaded.
    pub async fn build<S: KvStore>(self, backend: S) -> Result<Coordinator<S>> {
        self.config.validate()?;
        let store = Arc::new(SnapshotStore::new(backend));
        let registry = Arc::new(ResourceRegistry::load(Arc::clone(&store)).await?);
        let queue = Arc::new(
            ExperimentQueue::load(Arc::clone(&store), Arc::clone(&registry), self.notifier).await?,
        );
        info!(
            resources = registry.len().await,
            requests = queue.len().await,
            "coordinator ready"
        );
        Ok(Coordinator {
            config: self.config,
            store,
            registry,
            queue,
            rescan: Mutex::new(None),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::{Priority, RequestStatus, Requester, ReviewAction, SampleSpec, Submission};
    use crate::kv::MemoryKvStore;
    use crate::registry::ResourceType;
    use std::time::Duration;

    fn submission() -> Submission {
        Submission::new(
            SampleSpec::new("s1"),
            Requester::new("Ada", "ada@lab.org", "Lab"),
            "DiSPIM",
            Priority::Normal,
        )
    }

    fn scope(id: &str) -> Resource {
        Resource::builder(id, ResourceType::Microscope)
            .status(ResourceStatus::Online)
            .build()
    }

    async fn approved(coordinator: &Coordinator<MemoryKvStore>) -> String {
        let queue = coordinator.queue();
        let id = queue.submit(submission()).await.unwrap().request_id().to_string();
        queue.begin_review(&id, "rev").await.unwrap();
        queue.approve(&id, ReviewAction::new("rev")).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_registration_triggers_rescan() {
        let coordinator = Coordinator::builder().build(MemoryKvStore::new()).await.unwrap();
        let id = approved(&coordinator).await;

        coordinator.register_resource(scope("scope-1")).await.unwrap();
        let request = coordinator.queue().get(&id).await.unwrap();
        assert_eq!(request.status(), RequestStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_rescan_can_be_disabled() {
        let config = CoordinatorConfig {
            rescan_on_registration: false,
            ..CoordinatorConfig::default()
        };
        let coordinator = Coordinator::builder()
            .config(config)
            .build(MemoryKvStore::new())
            .await
            .unwrap();
        let id = approved(&coordinator).await;

        coordinator.register_resource(scope("scope-1")).await.unwrap();
        assert_eq!(
            coordinator.queue().get(&id).await.unwrap().status(),
            RequestStatus::Approved
        );
    }

    #[tokio::test]
    async fn test_timer_schedules_and_shuts_down() {
        let config = CoordinatorConfig {
            rescan_on_registration: false,
            rescan_interval_secs: Some(1),
            ..CoordinatorConfig::default()
        };
        let coordinator = Coordinator::builder()
            .config(config)
            .build(MemoryKvStore::new())
            .await
            .unwrap();
        let id = approved(&coordinator).await;
        coordinator.register_resource(scope("scope-1")).await.unwrap();

        assert!(coordinator.start_rescan_timer().await);
        assert!(!coordinator.start_rescan_timer().await);

        let mut status = RequestStatus::Approved;
        for _ in 0..50 {
            status = coordinator.queue().get(&id).await.unwrap().status();
            if status == RequestStatus::Scheduled {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(status, RequestStatus::Scheduled);

        coordinator.shutdown().await;
    }

    #[tokio::test]
    async fn test_no_timer_without_interval() {
        let coordinator = Coordinator::builder().build(MemoryKvStore::new()).await.unwrap();
        assert!(!coordinator.start_rescan_timer().await);
        coordinator.shutdown().await;
    }
}
