//! Experiment Queue
//!
//! Owns experiment requests from submission to completion: review, approval
//! or rejection, matching to a resource, execution.
//!
//! ## Schema Overview
//!
//! ```text
//! ExperimentRequest
//!   ├── SampleSpec (current version)  ──< sample_history (superseded versions)
//!   ├── Requester, ExperimentDetails (priority, microscope system)
//!   ├── ReviewInfo, ExecutionInfo
//!   └──< HistoryEntry (audit trail)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use labmesh::experiment::{
//!     ExperimentQueue, Priority, RequestStatus, Requester, ReviewAction, SampleSpec, Submission,
//! };
//! use labmesh::kv::MemoryKvStore;
//! use labmesh::notify::NoopNotifier;
//! use labmesh::registry::ResourceRegistry;
//! use labmesh::store::SnapshotStore;
//!
//! # async fn example() -> labmesh::Result<()> {
//! let store = Arc::new(SnapshotStore::new(MemoryKvStore::new()));
//! let registry = Arc::new(ResourceRegistry::load(Arc::clone(&store)).await?);
//! let queue = ExperimentQueue::load(store, registry, Arc::new(NoopNotifier)).await?;
//!
//! let request = queue
//!     .submit(Submission::new(
//!         SampleSpec::new("hela-001"),
//!         Requester::new("Ada", "ada@lab.org", "Lab"),
//!         "DiSPIM",
//!         Priority::High,
//!     ))
//!     .await?;
//!
//! queue.begin_review(request.request_id(), "reviewer@lab.org").await?;
//! let approved = queue
//!     .approve(request.request_id(), ReviewAction::new("reviewer@lab.org"))
//!     .await?;
//!
//! // No microscope registered yet: the request waits in APPROVED.
//! assert_eq!(approved.status(), RequestStatus::Approved);
//! # Ok(())
//! # }
//! ```

mod lifecycle;
mod queue;
mod request;
mod sample;
mod submission;

pub use lifecycle::{Action, RequestStatus};
pub use queue::{ExperimentQueue, ListFilter, QueueStats, ReviewAction, MATCHER_ACTOR};
pub use request::{
    ExecutionInfo, ExperimentDetails, ExperimentRequest, HistoryEntry, Priority, Requester,
    ReviewInfo,
};
pub use sample::{
    AcquisitionMode, Antibody, BiologicalContext, Channel, Compound, FluorescentProtein,
    ImagingParameters, SamplePreparation, SampleSpec, StainingProtocol, Treatments,
};
pub use submission::{ExperimentInput, Submission};
