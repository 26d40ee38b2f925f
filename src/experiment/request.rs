//! Experiment Request - one researcher's request for instrument time

use super::{Action, RequestStatus, SampleSpec};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scheduling priority. Pending work is served `urgent` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Served last
    Low,
    /// Default tier (`"medium"` is accepted on input)
    #[serde(alias = "medium")]
    Normal,
    /// Served before normal
    High,
    /// Served first
    Urgent,
}

impl Priority {
    /// All priorities, lowest first.
    pub const ALL: [Self; 4] = [Self::Low, Self::Normal, Self::High, Self::Urgent];

    /// Sort rank: 0 is served first.
    #[must_use]
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Urgent => 0,
            Self::High => 1,
            Self::Normal => 2,
            Self::Low => 3,
        }
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("medium") {
            return Ok(Self::Normal);
        }
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                Error::Validation(format!(
                    "invalid priority {s:?}: expected one of low, normal, high, urgent"
                ))
            })
    }
}

/// Who asked for the experiment. Opaque to the lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    /// Full name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Institution
    #[serde(default)]
    pub institution: String,
    /// Department
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    /// Country
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// ORCID iD
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orcid: Option<String>,
}

impl Requester {
    /// Requester with the three core fields.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        institution: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            institution: institution.into(),
            ..Self::default()
        }
    }
}

/// What is being asked for, and how urgently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentDetails {
    /// Target microscope system (e.g. `"DiSPIM"`)
    pub microscope_system: String,
    /// Why the experiment matters
    #[serde(default)]
    pub scientific_rationale: String,
    /// Scheduling priority
    pub priority: Priority,
    /// Capability tags the resource must advertise
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_capabilities: Vec<String>,
    /// Objective magnification the resource must have installed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_magnification: Option<u32>,
}

/// Reviewer decision details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewInfo {
    /// Reviewer who acted last
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<String>,
    /// When the last review decision was made
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    /// Reviewer comments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    /// Changes the requester must make before resubmitting
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requested_modifications: Vec<String>,
}

/// Execution tracking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionInfo {
    /// When imaging started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When imaging finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Operator who ran the experiment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    /// Where the data landed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results_location: Option<String>,
}

/// One audit-trail entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When it happened
    pub timestamp: DateTime<Utc>,
    /// What happened (`"submitted"` or an action name)
    pub event: String,
    /// Who did it
    pub actor: String,
    /// Free-text details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// A request for an imaging experiment.
///
/// Status only changes through [`Action`]s; see [`RequestStatus::apply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRequest {
    request_id: String,
    sample_spec: SampleSpec,
    requester: Requester,
    experiment: ExperimentDetails,
    status: RequestStatus,
    submitted_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    assigned_resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    review_notes: Option<String>,
    #[serde(default)]
    revision: u32,
    #[serde(default)]
    sequence: u64,
    #[serde(default)]
    review: ReviewInfo,
    #[serde(default)]
    execution: ExecutionInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    sample_history: Vec<SampleSpec>,
    #[serde(default)]
    history: Vec<HistoryEntry>,
}

impl ExperimentRequest {
    pub(crate) fn new(
        request_id: String,
        sequence: u64,
        sample_spec: SampleSpec,
        requester: Requester,
        experiment: ExperimentDetails,
        now: DateTime<Utc>,
    ) -> Self {
        let actor = requester.email.clone();
        Self {
            request_id,
            sample_spec,
            requester,
            experiment,
            status: RequestStatus::Submitted,
            submitted_at: now,
            updated_at: now,
            assigned_resource_id: None,
            review_notes: None,
            revision: 0,
            sequence,
            review: ReviewInfo::default(),
            execution: ExecutionInfo::default(),
            sample_history: Vec::new(),
            history: vec![HistoryEntry {
                timestamp: now,
                event: "submitted".into(),
                actor,
                details: None,
            }],
        }
    }

    /// Get the request ID.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Get the current sample spec.
    #[must_use]
    pub const fn sample_spec(&self) -> &SampleSpec {
        &self.sample_spec
    }

    /// Get the requester.
    #[must_use]
    pub const fn requester(&self) -> &Requester {
        &self.requester
    }

    /// Get the experiment details.
    #[must_use]
    pub const fn experiment(&self) -> &ExperimentDetails {
        &self.experiment
    }

    /// Get the priority.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.experiment.priority
    }

    /// Get the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> RequestStatus {
        self.status
    }

    /// Get the submission timestamp.
    #[must_use]
    pub const fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    /// Get the last-modified timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Get the assigned resource, if matched.
    #[must_use]
    pub fn assigned_resource_id(&self) -> Option<&str> {
        self.assigned_resource_id.as_deref()
    }

    /// Get the last reviewer note.
    #[must_use]
    pub fn review_notes(&self) -> Option<&str> {
        self.review_notes.as_deref()
    }

    /// Number of times the request was resubmitted.
    #[must_use]
    pub const fn revision(&self) -> u32 {
        self.revision
    }

    /// Submission order, unique per queue.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Get the review block.
    #[must_use]
    pub const fn review(&self) -> &ReviewInfo {
        &self.review
    }

    /// Get the execution block.
    #[must_use]
    pub const fn execution(&self) -> &ExecutionInfo {
        &self.execution
    }

    /// Superseded sample specs, oldest first.
    #[must_use]
    pub fn sample_history(&self) -> &[SampleSpec] {
        &self.sample_history
    }

    /// Audit trail, oldest first.
    #[must_use]
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Key for pending order: priority rank, then FIFO.
    #[must_use]
    pub fn pending_key(&self) -> (u8, DateTime<Utc>, u64) {
        (self.priority().rank(), self.submitted_at, self.sequence)
    }

    /// Status `action` would lead to from the current one.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidTransition`] if the current status has no such edge.
    pub fn check(&self, action: Action) -> Result<RequestStatus> {
        self.status
            .apply(action)
            .ok_or_else(|| Error::InvalidTransition {
                request_id: self.request_id.clone(),
                from: self.status.to_string(),
                action: action.to_string(),
            })
    }

    /// Apply a lifecycle action, recording it in the audit trail.
    ///
    /// Returns the previous status. On error nothing is changed.
    pub(crate) fn apply(
        &mut self,
        action: Action,
        actor: &str,
        details: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<RequestStatus> {
        let from = self.status;
        let to = self.check(action)?;
        self.status = to;
        self.updated_at = now;
        self.history.push(HistoryEntry {
            timestamp: now,
            event: action.to_string(),
            actor: actor.to_string(),
            details,
        });
        Ok(from)
    }

    pub(crate) fn record_review(
        &mut self,
        reviewer: &str,
        notes: Option<String>,
        requested_modifications: Vec<String>,
        now: DateTime<Utc>,
    ) {
        self.review = ReviewInfo {
            reviewer: Some(reviewer.to_string()),
            reviewed_at: Some(now),
            comments: notes,
            requested_modifications,
        };
    }

    pub(crate) fn set_reviewer(&mut self, reviewer: &str) {
        self.review.reviewer = Some(reviewer.to_string());
    }

    pub(crate) fn set_review_notes(&mut self, notes: Option<String>) {
        self.review_notes = notes;
    }

    pub(crate) fn assign(&mut self, resource_id: &str) {
        self.assigned_resource_id = Some(resource_id.to_string());
    }

    pub(crate) fn record_start(&mut self, operator: &str, now: DateTime<Utc>) {
        self.execution.started_at = Some(now);
        self.execution.operator = Some(operator.to_string());
    }

    pub(crate) fn record_completion(&mut self, results_location: Option<String>, now: DateTime<Utc>) {
        self.execution.completed_at = Some(now);
        self.execution.results_location = results_location;
    }

    /// Count a resubmission and, if given, supersede the sample spec.
    pub(crate) fn revise(&mut self, corrected: Option<SampleSpec>) {
        self.revision += 1;
        if let Some(corrected) = corrected {
            let next = corrected.revision_of(&self.sample_spec);
            let previous = std::mem::replace(&mut self.sample_spec, next);
            self.sample_history.push(previous);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ExperimentRequest {
        ExperimentRequest::new(
            "req-1".into(),
            0,
            SampleSpec::new("s1"),
            Requester::new("Ada", "ada@lab.org", "Lab"),
            ExperimentDetails {
                microscope_system: "DiSPIM".into(),
                scientific_rationale: String::new(),
                priority: Priority::High,
                required_capabilities: Vec::new(),
                required_magnification: None,
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_priority_parse_and_rank() {
        assert_eq!("medium".parse::<Priority>().unwrap(), Priority::Normal);
        assert_eq!("URGENT".parse::<Priority>().unwrap(), Priority::Urgent);
        assert!("asap".parse::<Priority>().is_err());
        assert!(Priority::Urgent.rank() < Priority::High.rank());
        assert!(Priority::Normal.rank() < Priority::Low.rank());

        let p: Priority = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(p, Priority::Normal);
    }

    #[test]
    fn test_invalid_action_changes_nothing() {
        let mut req = request();
        let before = req.clone();
        let err = req.apply(Action::Start, "ops", None, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(req, before);
    }

    #[test]
    fn test_apply_appends_history() {
        let mut req = request();
        let from = req
            .apply(Action::BeginReview, "rev@lab.org", None, Utc::now())
            .unwrap();
        assert_eq!(from, RequestStatus::Submitted);
        assert_eq!(req.status(), RequestStatus::UnderReview);
        assert_eq!(req.history().len(), 2);
        assert_eq!(req.history()[1].event, "begin_review");
    }

    #[test]
    fn test_revise_supersedes_spec() {
        let mut req = request();
        req.revise(Some(SampleSpec::new("s1")));
        assert_eq!(req.revision(), 1);
        assert_eq!(req.sample_spec().version, 2);
        assert_eq!(req.sample_spec().supersedes.as_deref(), Some("s1@v1"));
        assert_eq!(req.sample_history().len(), 1);

        req.revise(None);
        assert_eq!(req.revision(), 2);
        assert_eq!(req.sample_spec().version, 2);
    }
}
