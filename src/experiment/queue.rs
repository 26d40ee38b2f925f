//! Experiment Queue - lifecycle, ordering and matching

use super::{Action, ExperimentRequest, Priority, RequestStatus, SampleSpec, Submission};
use crate::kv::KvStore;
use crate::matching::{self, Requirement};
use crate::notify::{Notifier, TransitionEvent};
use crate::registry::ResourceRegistry;
use crate::search::{BiologicalProfile, BiologicalQuery, SampleSummary};
use crate::store::{Collection, SnapshotStore};
use crate::{predicate, Error, Result};
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Actor recorded for transitions made by the matcher.
pub const MATCHER_ACTOR: &str = "matcher";

/// Who is acting on a review step, and what they said.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewAction {
    /// Reviewer identity (usually an email)
    pub reviewer: String,
    /// Comment; required for reject
    #[serde(default)]
    pub notes: Option<String>,
    /// Changes the requester must make
    #[serde(default)]
    pub requested_modifications: Vec<String>,
}

impl ReviewAction {
    /// Review step without notes.
    #[must_use]
    pub fn new(reviewer: impl Into<String>) -> Self {
        Self {
            reviewer: reviewer.into(),
            ..Self::default()
        }
    }

    /// Attach a note.
    #[must_use]
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Ask for one modification.
    #[must_use]
    pub fn modification(mut self, modification: impl Into<String>) -> Self {
        self.requested_modifications.push(modification.into());
        self
    }

    fn has_notes(&self) -> bool {
        self.notes.as_deref().is_some_and(|n| !n.trim().is_empty())
    }
}

/// Listing filter. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListFilter {
    /// Exact status
    pub status: Option<RequestStatus>,
    /// Exact priority
    pub priority: Option<Priority>,
    /// Requester email or name (case-insensitive)
    pub requester: Option<String>,
    /// Target microscope system (case-insensitive)
    pub microscope_system: Option<String>,
}

impl ListFilter {
    /// Evaluate against one request.
    #[must_use]
    pub fn matches(&self, request: &ExperimentRequest) -> bool {
        self.status.map_or(true, |s| s == request.status())
            && self.priority.map_or(true, |p| p == request.priority())
            && self.requester.as_deref().map_or(true, |who| {
                predicate::text_eq(who, &request.requester().email)
                    || predicate::text_eq(who, &request.requester().name)
            })
            && self
                .microscope_system
                .as_deref()
                .map_or(true, |m| targets(request, Some(m)))
    }
}

fn targets(request: &ExperimentRequest, microscope: Option<&str>) -> bool {
    microscope.map_or(true, |m| {
        predicate::text_eq(m, &request.experiment().microscope_system)
    })
}

/// Queue-wide counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Number of requests
    pub total: usize,
    /// Requests per status (every status present)
    pub by_status: BTreeMap<RequestStatus, usize>,
    /// Requests per priority (every priority present)
    pub by_priority: BTreeMap<Priority, usize>,
    /// Requests per target microscope system
    pub by_microscope: BTreeMap<String, usize>,
}

#[derive(Debug, Default)]
struct QueueState {
    /// Submission order
    requests: Vec<ExperimentRequest>,
    /// Parallel to `requests`
    profiles: Vec<BiologicalProfile>,
    index: FxHashMap<String, usize>,
    next_sequence: u64,
}

impl QueueState {
    fn position(&self, request_id: &str) -> Result<usize> {
        self.index
            .get(request_id)
            .copied()
            .ok_or_else(|| Error::request_not_found(request_id))
    }

    fn view_with<'a>(
        &'a self,
        slot: Option<usize>,
        record: &'a ExperimentRequest,
    ) -> Vec<&'a ExperimentRequest> {
        let mut view: Vec<&ExperimentRequest> = self
            .requests
            .iter()
            .enumerate()
            .map(|(i, r)| if Some(i) == slot { record } else { r })
            .collect();
        if slot.is_none() {
            view.push(record);
        }
        view
    }

    fn sorted_where(&self, keep: impl Fn(&ExperimentRequest) -> bool) -> Vec<ExperimentRequest> {
        let mut selected: Vec<ExperimentRequest> =
            self.requests.iter().filter(|&r| keep(r)).cloned().collect();
        selected.sort_by_key(ExperimentRequest::pending_key);
        selected
    }
}

/// The experiment-request queue.
///
/// Owns every request's lifecycle. Reads the [`ResourceRegistry`] to match
/// approved requests, and only ever claims or releases resources through it.
pub struct ExperimentQueue<S> {
    state: RwLock<QueueState>,
    store: Arc<SnapshotStore<S>>,
    registry: Arc<ResourceRegistry<S>>,
    matching: Mutex<()>,
    notifier: Arc<dyn Notifier>,
}

impl<S> fmt::Debug for ExperimentQueue<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExperimentQueue").finish_non_exhaustive()
    }
}

impl<S: KvStore> ExperimentQueue<S> {
    /// Load the queue from `store` and rebuild the biological index.
    ///
    /// # Errors
    ///
    /// [`Error::Persistence`] if the stored document cannot be read or contains
    /// duplicate ids.
    pub async fn load(
        store: Arc<SnapshotStore<S>>,
        registry: Arc<ResourceRegistry<S>>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let requests: Vec<ExperimentRequest> = store.load(Collection::Requests).await?;
        let mut index = FxHashMap::default();
        let mut profiles = Vec::with_capacity(requests.len());
        let mut next_sequence = 0;
        for (i, request) in requests.iter().enumerate() {
            if index.insert(request.request_id().to_string(), i).is_some() {
                return Err(Error::Persistence(format!(
                    "duplicate request id in stored queue: {}",
                    request.request_id()
                )));
            }
            profiles.push(BiologicalProfile::from_spec(request.sample_spec()));
            next_sequence = next_sequence.max(request.sequence() + 1);
        }
        debug!(requests = requests.len(), "queue loaded");
        Ok(Self {
            state: RwLock::new(QueueState {
                requests,
                profiles,
                index,
                next_sequence,
            }),
            store,
            registry,
            matching: Mutex::new(()),
            notifier,
        })
    }

    /// The registry this queue matches against.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ResourceRegistry<S>> {
        &self.registry
    }

    /// Validate and enqueue a new request in `SUBMITTED`.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for a missing sample spec, a missing or unknown
    /// priority, or missing requester / microscope fields;
    /// [`Error::Persistence`] if the write fails.
    #[tracing::instrument(skip(self, submission))]
    pub async fn submit(&self, submission: Submission) -> Result<ExperimentRequest> {
        let (sample_spec, requester, experiment) = submission.validate()?;

        let record = {
            let mut state = self.state.write().await;
            // Stamped under the lock so submission time and sequence agree.
            let now = Utc::now();
            let record = ExperimentRequest::new(
                Uuid::new_v4().to_string(),
                state.next_sequence,
                sample_spec,
                requester,
                experiment,
                now,
            );
            self.store
                .save(Collection::Requests, &state.view_with(None, &record))
                .await?;

            let i = state.requests.len();
            state.next_sequence += 1;
            state.index.insert(record.request_id().to_string(), i);
            state
                .profiles
                .push(BiologicalProfile::from_spec(record.sample_spec()));
            state.requests.push(record.clone());
            record
        };

        info!(
            request_id = record.request_id(),
            priority = %record.priority(),
            microscope = %record.experiment().microscope_system,
            "request submitted"
        );
        self.emit(&TransitionEvent {
            request_id: record.request_id().to_string(),
            old_status: None,
            new_status: record.status(),
            review_notes: None,
            actor: record.requester().email.clone(),
            at: record.submitted_at(),
            reviewers: self.reviewers_for(&record).await,
        });
        Ok(record)
    }

    /// `SUBMITTED -> UNDER_REVIEW`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`], [`Error::InvalidTransition`] from any other state,
    /// [`Error::Persistence`].
    pub async fn begin_review(&self, request_id: &str, reviewer: &str) -> Result<ExperimentRequest> {
        self.transition(request_id, Action::BeginReview, reviewer, None, |request, _| {
            request.set_reviewer(reviewer);
        })
        .await
    }

    /// `UNDER_REVIEW -> APPROVED`, then try to match a resource.
    ///
    /// On a match the request moves on to `SCHEDULED` with the resource
    /// assigned (and marked `busy`). Without a candidate it stays `APPROVED`
    /// until a later [`schedule_pending`](Self::schedule_pending).
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`], [`Error::InvalidTransition`],
    /// [`Error::Persistence`].
    pub async fn approve(&self, request_id: &str, review: ReviewAction) -> Result<ExperimentRequest> {
        let _matching = self.matching.lock().await;
        let ReviewAction {
            reviewer,
            notes,
            requested_modifications,
        } = review;
        let approved = self
            .transition(request_id, Action::Approve, &reviewer, notes.clone(), |request, now| {
                request.record_review(&reviewer, notes, requested_modifications, now);
            })
            .await?;

        match self.try_schedule(&approved).await? {
            Some(scheduled) => Ok(scheduled),
            None => Ok(approved),
        }
    }

    /// `UNDER_REVIEW -> REJECTED` (terminal). Notes are required.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] without notes, [`Error::NotFound`],
    /// [`Error::InvalidTransition`], [`Error::Persistence`].
    pub async fn reject(&self, request_id: &str, review: ReviewAction) -> Result<ExperimentRequest> {
        if !review.has_notes() {
            return Err(Error::Validation("rejecting a request requires notes".into()));
        }
        self.review_step(request_id, Action::Reject, review).await
    }

    /// `UNDER_REVIEW -> REVISION_REQUESTED`.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] without notes or requested modifications,
    /// [`Error::NotFound`], [`Error::InvalidTransition`],
    /// [`Error::Persistence`].
    pub async fn request_revision(
        &self,
        request_id: &str,
        review: ReviewAction,
    ) -> Result<ExperimentRequest> {
        if !review.has_notes() && review.requested_modifications.is_empty() {
            return Err(Error::Validation(
                "requesting a revision requires notes or requested modifications".into(),
            ));
        }
        self.review_step(request_id, Action::RequestRevision, review)
            .await
    }

    /// `REVISION_REQUESTED -> SUBMITTED`, bumping the revision counter.
    ///
    /// A corrected sample spec becomes the next version of the current one; the
    /// replaced spec is kept in `sample_history`.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for a corrected spec without `sample_id`,
    /// [`Error::NotFound`], [`Error::InvalidTransition`],
    /// [`Error::Persistence`].
    pub async fn resubmit(
        &self,
        request_id: &str,
        actor: &str,
        corrected: Option<SampleSpec>,
    ) -> Result<ExperimentRequest> {
        if corrected
            .as_ref()
            .is_some_and(|spec| spec.sample_id.trim().is_empty())
        {
            return Err(Error::Validation("sample_spec.sample_id must not be empty".into()));
        }
        self.transition(request_id, Action::Resubmit, actor, None, |request, _| {
            request.revise(corrected);
        })
        .await
    }

    /// `SCHEDULED -> IN_PROGRESS`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`], [`Error::InvalidTransition`],
    /// [`Error::Persistence`].
    pub async fn start(&self, request_id: &str, operator: &str) -> Result<ExperimentRequest> {
        self.transition(request_id, Action::Start, operator, None, |request, now| {
            request.record_start(operator, now);
        })
        .await
    }

    /// `IN_PROGRESS -> COMPLETED` (terminal); the assigned resource goes back
    /// to `online`.
    ///
    /// If the request cannot be persisted after the resource was released, the
    /// resource is claimed again before the error is returned.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`], [`Error::InvalidTransition`],
    /// [`Error::Persistence`].
    pub async fn complete(
        &self,
        request_id: &str,
        operator: &str,
        results_location: Option<String>,
    ) -> Result<ExperimentRequest> {
        let _matching = self.matching.lock().await;
        let current = self.get(request_id).await?;
        current.check(Action::Complete)?;

        let resource_id = current.assigned_resource_id().map(str::to_string);
        let released = match resource_id.as_deref() {
            Some(id) => self.registry.release(id, request_id).await?,
            None => false,
        };

        let result = self
            .transition(request_id, Action::Complete, operator, None, |request, now| {
                request.record_completion(results_location, now);
            })
            .await;

        if result.is_err() && released {
            if let Some(id) = resource_id.as_deref() {
                self.reclaim(id, request_id).await;
            }
        }
        result
    }

    /// Administrative override: move a request to `target`.
    ///
    /// Runs the operation owning the edge from the current status, so the
    /// lifecycle graph and its side effects (matching, releasing) still apply.
    /// Moving an approved request to `SCHEDULED` with no candidate available
    /// leaves it `APPROVED`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidTransition`] if no edge leads to `target`, plus the
    /// errors of the operation that runs.
    #[tracing::instrument(skip(self, notes))]
    pub async fn update_status(
        &self,
        request_id: &str,
        target: RequestStatus,
        actor: &str,
        notes: Option<String>,
    ) -> Result<ExperimentRequest> {
        let current = self.get(request_id).await?;
        let Some(action) = Action::between(current.status(), target) else {
            return Err(Error::InvalidTransition {
                request_id: request_id.to_string(),
                from: current.status().to_string(),
                action: format!("move to {target}"),
            });
        };

        let review = ReviewAction {
            reviewer: actor.to_string(),
            notes,
            requested_modifications: Vec::new(),
        };
        match action {
            Action::BeginReview => self.begin_review(request_id, actor).await,
            Action::Approve => self.approve(request_id, review).await,
            Action::Reject => self.reject(request_id, review).await,
            Action::RequestRevision => self.request_revision(request_id, review).await,
            Action::Resubmit => self.resubmit(request_id, actor, None).await,
            Action::Schedule => self.schedule(request_id).await,
            Action::Start => self.start(request_id, actor).await,
            Action::Complete => self.complete(request_id, actor, None).await,
        }
    }

    /// Try to match every `APPROVED` request, in priority order.
    ///
    /// Returns the ids of the requests that were scheduled.
    ///
    /// # Errors
    ///
    /// [`Error::Persistence`] if a write fails; requests scheduled before the
    /// failure stay scheduled.
    pub async fn schedule_pending(&self) -> Result<Vec<String>> {
        let _matching = self.matching.lock().await;
        let approved = self
            .state
            .read()
            .await
            .sorted_where(|r| r.status() == RequestStatus::Approved);

        let mut scheduled = Vec::new();
        for request in &approved {
            if let Some(done) = self.try_schedule(request).await? {
                scheduled.push(done.request_id().to_string());
            }
        }
        debug!(
            approved = approved.len(),
            scheduled = scheduled.len(),
            "re-scan finished"
        );
        Ok(scheduled)
    }

    /// Look up one request.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown id.
    pub async fn get(&self, request_id: &str) -> Result<ExperimentRequest> {
        let state = self.state.read().await;
        let i = state.position(request_id)?;
        Ok(state.requests[i].clone())
    }

    /// Requests matching `filter`, in priority order.
    pub async fn list(&self, filter: &ListFilter) -> Vec<ExperimentRequest> {
        self.state.read().await.sorted_where(|r| filter.matches(r))
    }

    /// Pending work (`SUBMITTED`, `UNDER_REVIEW`, `APPROVED`): priority rank,
    /// then submission time.
    pub async fn pending(&self) -> Vec<ExperimentRequest> {
        self.state
            .read()
            .await
            .sorted_where(|r| r.status().is_pending())
    }

    /// Head of [`pending`](Self::pending).
    pub async fn next_pending(&self) -> Option<ExperimentRequest> {
        let state = self.state.read().await;
        state
            .requests
            .iter()
            .filter(|r| r.status().is_pending())
            .min_by_key(|r| r.pending_key())
            .cloned()
    }

    /// Requests waiting for a reviewer, optionally for one microscope system.
    pub async fn pending_review(&self, microscope: Option<&str>) -> Vec<ExperimentRequest> {
        self.state.read().await.sorted_where(|r| {
            matches!(
                r.status(),
                RequestStatus::Submitted | RequestStatus::UnderReview
            ) && targets(r, microscope)
        })
    }

    /// Approved and scheduled requests (approved first), optionally for one
    /// microscope system.
    pub async fn approved_queue(&self, microscope: Option<&str>) -> Vec<ExperimentRequest> {
        let state = self.state.read().await;
        let mut queue = state
            .sorted_where(|r| r.status() == RequestStatus::Approved && targets(r, microscope));
        queue.extend(
            state.sorted_where(|r| r.status() == RequestStatus::Scheduled && targets(r, microscope)),
        );
        queue
    }

    /// Counts per status, priority and microscope system.
    pub async fn stats(&self) -> QueueStats {
        let state = self.state.read().await;
        let mut stats = QueueStats {
            total: state.requests.len(),
            by_status: RequestStatus::ALL.into_iter().map(|s| (s, 0)).collect(),
            by_priority: Priority::ALL.into_iter().map(|p| (p, 0)).collect(),
            by_microscope: BTreeMap::new(),
        };
        for request in &state.requests {
            *stats.by_status.entry(request.status()).or_default() += 1;
            *stats.by_priority.entry(request.priority()).or_default() += 1;
            *stats
                .by_microscope
                .entry(request.experiment().microscope_system.clone())
                .or_default() += 1;
        }
        stats
    }

    /// Number of requests.
    pub async fn len(&self) -> usize {
        self.state.read().await.requests.len()
    }

    /// True if nothing was ever submitted.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.requests.is_empty()
    }

    /// Requests whose sample matches `query`, oldest submission first.
    pub async fn find_by_biology(&self, query: &BiologicalQuery) -> Vec<ExperimentRequest> {
        let state = self.state.read().await;
        let mut found: Vec<ExperimentRequest> = state
            .requests
            .iter()
            .zip(&state.profiles)
            .filter(|(request, profile)| query.matches(profile, request.status()))
            .map(|(request, _)| request.clone())
            .collect();
        found.sort_by_key(|r| (r.submitted_at(), r.sequence()));
        found
    }

    /// Denormalized sample view of one request.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown id.
    pub async fn get_sample_summary(&self, request_id: &str) -> Result<SampleSummary> {
        let state = self.state.read().await;
        let i = state.position(request_id)?;
        Ok(SampleSummary::of(&state.requests[i]))
    }

    async fn review_step(
        &self,
        request_id: &str,
        action: Action,
        review: ReviewAction,
    ) -> Result<ExperimentRequest> {
        let ReviewAction {
            reviewer,
            notes,
            requested_modifications,
        } = review;
        self.transition(request_id, action, &reviewer, notes.clone(), |request, now| {
            request.set_review_notes(notes.clone());
            request.record_review(&reviewer, notes, requested_modifications, now);
        })
        .await
    }

    /// `APPROVED -> SCHEDULED` on explicit request.
    async fn schedule(&self, request_id: &str) -> Result<ExperimentRequest> {
        let _matching = self.matching.lock().await;
        let current = self.get(request_id).await?;
        current.check(Action::Schedule)?;
        match self.try_schedule(&current).await? {
            Some(scheduled) => Ok(scheduled),
            None => Ok(current),
        }
    }

    /// Match one approved request. Caller holds the matching lock.
    async fn try_schedule(&self, request: &ExperimentRequest) -> Result<Option<ExperimentRequest>> {
        let requirement = Requirement::for_request(request);
        let resources = self.registry.snapshot().await;
        let candidates: Vec<String> = matching::rank(&requirement, &resources)
            .into_iter()
            .map(|r| r.resource_id().to_string())
            .collect();

        if candidates.is_empty() {
            debug!(
                request_id = request.request_id(),
                required = ?requirement.required,
                "no online resource satisfies request, leaving approved"
            );
            return Ok(None);
        }

        for resource_id in &candidates {
            if !self.registry.claim(resource_id, request.request_id()).await? {
                continue;
            }
            let scheduled = self
                .transition(
                    request.request_id(),
                    Action::Schedule,
                    MATCHER_ACTOR,
                    Some(format!("assigned to {resource_id}")),
                    |r, _| r.assign(resource_id),
                )
                .await;
            return match scheduled {
                Ok(scheduled) => {
                    info!(
                        request_id = request.request_id(),
                        resource_id = resource_id.as_str(),
                        "request matched"
                    );
                    Ok(Some(scheduled))
                }
                Err(e) => {
                    if let Err(rollback) =
                        self.registry.release(resource_id, request.request_id()).await
                    {
                        warn!(resource_id = resource_id.as_str(), error = %rollback, "failed to release claimed resource");
                    }
                    Err(e)
                }
            };
        }
        Ok(None)
    }

    async fn reclaim(&self, resource_id: &str, request_id: &str) {
        match self.registry.restore_claim(resource_id, request_id).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(resource_id, request_id, "released resource claimed by another request");
            }
            Err(e) => warn!(resource_id, error = %e, "failed to re-claim released resource"),
        }
    }

    /// Apply `action` to a copy, persist the whole set, then commit and notify.
    async fn transition<F>(
        &self,
        request_id: &str,
        action: Action,
        actor: &str,
        details: Option<String>,
        edit: F,
    ) -> Result<ExperimentRequest>
    where
        F: FnOnce(&mut ExperimentRequest, DateTime<Utc>) + Send,
    {
        let (record, mut event) = {
            let mut state = self.state.write().await;
            let i = state.position(request_id)?;
            let now = Utc::now();

            let mut record = state.requests[i].clone();
            let from = record.apply(action, actor, details, now)?;
            edit(&mut record, now);

            self.store
                .save(Collection::Requests, &state.view_with(Some(i), &record))
                .await?;

            if action == Action::Resubmit {
                state.profiles[i] = BiologicalProfile::from_spec(record.sample_spec());
            }
            state.requests[i] = record.clone();

            let event = TransitionEvent {
                request_id: request_id.to_string(),
                old_status: Some(from),
                new_status: record.status(),
                review_notes: matches!(action, Action::Reject | Action::RequestRevision)
                    .then(|| record.review_notes().map(str::to_string))
                    .flatten(),
                actor: actor.to_string(),
                at: now,
                reviewers: Vec::new(),
            };
            (record, event)
        };
        if event.new_status == RequestStatus::Submitted {
            event.reviewers = self.reviewers_for(&record).await;
        }

        info!(
            request_id,
            action = %action,
            status = %record.status(),
            actor,
            "request transition"
        );
        self.emit(&event);
        Ok(record)
    }

    /// Reviewer emails for the request's microscope system. Takes the
    /// registry lock, so call it with the queue lock released.
    async fn reviewers_for(&self, record: &ExperimentRequest) -> Vec<String> {
        self.registry
            .reviewer_emails(&record.experiment().microscope_system)
            .await
    }

    fn emit(&self, event: &TransitionEvent) {
        if let Err(e) = self.notifier.notify(event) {
            warn!(request_id = %event.request_id, error = %e, "notification not delivered");
        }
    }
}
