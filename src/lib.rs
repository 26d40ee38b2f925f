//! # labmesh: Resource Registry and Experiment Queue for Lab Instrument Agents
//!
//! **Version**: 0.1.0
//!
//! labmesh coordinates autonomous scientific-instrument agents (microscopes,
//! compute clusters, vision-language-model services, storage, analysis,
//! genomics, robotics). Instruments register their capabilities; researchers
//! submit experiment requests; reviewers approve or reject them; approved
//! requests are matched to a capable, available resource; and every sample
//! ever submitted stays searchable by its biological context.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Poka-Yoke safety**: Lifecycle transitions come from a static table;
//!   illegal calls are rejected before any mutation
//! - **Jidoka**: Every mutation is persisted before it is committed in memory
//! - **Heijunka**: Pending work is levelled by priority, then FIFO
//! - **Genchi Genbutsu**: Persisted state is a human-readable JSON document
//!
//! ## Example Usage
//!
//! ```rust
//! use labmesh::coordinator::Coordinator;
//! use labmesh::experiment::{Priority, RequestStatus, Requester, ReviewAction, SampleSpec, Submission};
//! use labmesh::kv::MemoryKvStore;
//! use labmesh::registry::{Resource, ResourceStatus, ResourceType};
//!
//! # async fn example() -> labmesh::Result<()> {
//! let coordinator = Coordinator::builder().build(MemoryKvStore::new()).await?;
//!
//! coordinator
//!     .register_resource(
//!         Resource::builder("dispim-001", ResourceType::Microscope)
//!             .capability("3d_imaging")
//!             .status(ResourceStatus::Online)
//!             .build(),
//!     )
//!     .await?;
//!
//! let queue = coordinator.queue();
//! let mut spec = SampleSpec::new("hela-h2b-001");
//! spec.biological_context.cell_line = Some("HeLa".into());
//!
//! let request = queue
//!     .submit(Submission::new(
//!         spec,
//!         Requester::new("Ada", "ada@lab.org", "Lab"),
//!         "DiSPIM",
//!         Priority::High,
//!     ))
//!     .await?;
//! queue.begin_review(request.request_id(), "reviewer@lab.org").await?;
//! let scheduled = queue
//!     .approve(request.request_id(), ReviewAction::new("reviewer@lab.org"))
//!     .await?;
//!
//! assert_eq!(scheduled.status(), RequestStatus::Scheduled);
//! assert_eq!(scheduled.assigned_resource_id(), Some("dispim-001"));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod experiment;
pub mod kv;
pub mod logging;
pub mod matching;
pub mod notify;
pub mod predicate;
pub mod registry;
pub mod search;
pub mod store;

pub use config::{CoordinatorConfig, LogFormat};
pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use error::{Error, ErrorKind, Result};
