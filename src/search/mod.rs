//! Biological / sample search
//!
//! Retrospective search over the sample specs embedded in experiment requests
//! ("which HeLa live-cell experiments used EGFP?"). The queue keeps one
//! [`BiologicalProfile`] per request; a [`BiologicalQuery`] is evaluated
//! against those profiles with the shared [`crate::predicate`] primitives.
//!
//! ```rust
//! use labmesh::search::BiologicalQuery;
//!
//! let query = BiologicalQuery::new()
//!     .cell_line("hela")
//!     .fluorescent_proteins(["EGFP", "mCherry"])
//!     .live_cell(true);
//! assert_eq!(query.cell_line.as_deref(), Some("hela"));
//! ```

mod profile;
mod query;

pub use profile::{BiologicalProfile, SampleSummary};
pub use query::BiologicalQuery;
