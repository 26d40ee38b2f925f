//! Request lifecycle: states, actions and the transition table.
//!
//! ```text
//! SUBMITTED -> UNDER_REVIEW -> APPROVED -> SCHEDULED -> IN_PROGRESS -> COMPLETED
//!                   |  \
//!                   |   +-> REJECTED
//!                   +-> REVISION_REQUESTED -> SUBMITTED
//! ```
//!
//! Every edge belongs to exactly one [`Action`]. [`Action::edge`] is an
//! exhaustive `match`, so adding an action without an edge does not compile.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of an experiment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Awaiting review
    Submitted,
    /// A reviewer is looking at it
    UnderReview,
    /// Accepted, waiting for a resource
    Approved,
    /// Declined (terminal)
    Rejected,
    /// Sent back to the requester
    RevisionRequested,
    /// A resource has been assigned
    Scheduled,
    /// Running on the assigned resource
    InProgress,
    /// Finished (terminal)
    Completed,
}

impl RequestStatus {
    /// All states, in lifecycle order.
    pub const ALL: [Self; 8] = [
        Self::Submitted,
        Self::UnderReview,
        Self::Approved,
        Self::Rejected,
        Self::RevisionRequested,
        Self::Scheduled,
        Self::InProgress,
        Self::Completed,
    ];

    /// Wire name of this state.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::UnderReview => "under_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::RevisionRequested => "revision_requested",
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    /// No action leaves this state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Completed)
    }

    /// Pending work, served in priority order.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Submitted | Self::UnderReview | Self::Approved)
    }

    /// States in which a request holds a resource.
    #[must_use]
    pub const fn holds_resource(&self) -> bool {
        matches!(self, Self::Scheduled | Self::InProgress | Self::Completed)
    }

    /// State reached by applying `action`, or `None` if there is no such edge.
    #[must_use]
    pub fn apply(self, action: Action) -> Option<Self> {
        let (from, to) = action.edge();
        (from == self).then_some(to)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Validation(format!("unknown request status: {s:?}")))
    }
}

/// A lifecycle operation. Each action is exactly one edge of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// `SUBMITTED -> UNDER_REVIEW`
    BeginReview,
    /// `UNDER_REVIEW -> APPROVED`
    Approve,
    /// `UNDER_REVIEW -> REJECTED`
    Reject,
    /// `UNDER_REVIEW -> REVISION_REQUESTED`
    RequestRevision,
    /// `REVISION_REQUESTED -> SUBMITTED`
    Resubmit,
    /// `APPROVED -> SCHEDULED`
    Schedule,
    /// `SCHEDULED -> IN_PROGRESS`
    Start,
    /// `IN_PROGRESS -> COMPLETED`
    Complete,
}

impl Action {
    /// Every action.
    pub const ALL: [Self; 8] = [
        Self::BeginReview,
        Self::Approve,
        Self::Reject,
        Self::RequestRevision,
        Self::Resubmit,
        Self::Schedule,
        Self::Start,
        Self::Complete,
    ];

    /// `(from, to)` of this action's edge.
    #[must_use]
    pub const fn edge(self) -> (RequestStatus, RequestStatus) {
        use RequestStatus::{
            Approved, Completed, InProgress, Rejected, RevisionRequested, Scheduled, Submitted,
            UnderReview,
        };
        match self {
            Self::BeginReview => (Submitted, UnderReview),
            Self::Approve => (UnderReview, Approved),
            Self::Reject => (UnderReview, Rejected),
            Self::RequestRevision => (UnderReview, RevisionRequested),
            Self::Resubmit => (RevisionRequested, Submitted),
            Self::Schedule => (Approved, Scheduled),
            Self::Start => (Scheduled, InProgress),
            Self::Complete => (InProgress, Completed),
        }
    }

    /// Name used in history entries and error messages.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BeginReview => "begin_review",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::RequestRevision => "request_revision",
            Self::Resubmit => "resubmit",
            Self::Schedule => "schedule",
            Self::Start => "start",
            Self::Complete => "complete",
        }
    }

    /// The action whose edge is `from -> to`, if any.
    #[must_use]
    pub fn between(from: RequestStatus, to: RequestStatus) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.edge() == (from, to))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_edges() {
        let mut status = RequestStatus::Submitted;
        for action in [
            Action::BeginReview,
            Action::Approve,
            Action::Schedule,
            Action::Start,
            Action::Complete,
        ] {
            status = status.apply(action).unwrap();
        }
        assert_eq!(status, RequestStatus::Completed);
        assert!(status.is_terminal());
    }

    #[test]
    fn test_revision_loop() {
        let status = RequestStatus::UnderReview
            .apply(Action::RequestRevision)
            .and_then(|s| s.apply(Action::Resubmit))
            .unwrap();
        assert_eq!(status, RequestStatus::Submitted);
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for action in Action::ALL {
            assert_eq!(RequestStatus::Rejected.apply(action), None);
            assert_eq!(RequestStatus::Completed.apply(action), None);
        }
    }

    #[test]
    fn test_no_self_edges_and_unique_edges() {
        for action in Action::ALL {
            let (from, to) = action.edge();
            assert_ne!(from, to);
            assert_eq!(Action::between(from, to), Some(action));
        }
        assert_eq!(
            Action::between(RequestStatus::Submitted, RequestStatus::Approved),
            None
        );
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_value(RequestStatus::RevisionRequested).unwrap(),
            "revision_requested"
        );
        assert_eq!(
            "UNDER_REVIEW".parse::<RequestStatus>().unwrap(),
            RequestStatus::UnderReview
        );
        assert!("cancelled".parse::<RequestStatus>().is_err());
    }
}
