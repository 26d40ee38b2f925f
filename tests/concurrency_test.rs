//! Concurrency Tests
//!
//! Concurrent callers on a multi-threaded runtime: transitions on one request
//! serialize, and matching never assigns one resource twice.

use labmesh::coordinator::Coordinator;
use labmesh::experiment::{
    ExperimentQueue, Priority, RequestStatus, Requester, ReviewAction, SampleSpec, Submission,
};
use labmesh::kv::MemoryKvStore;
use labmesh::registry::{Resource, ResourceFilter, ResourceStatus, ResourceType};
use labmesh::Error;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinSet;

const CALLERS: usize = 16;

fn submission(n: usize) -> Submission {
    Submission::new(
        SampleSpec::new(format!("sample-{n}")),
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

async fn coordinator() -> Coordinator<MemoryKvStore> {
    Coordinator::builder().build(MemoryKvStore::new()).await.unwrap()
}

async fn under_review(queue: &ExperimentQueue<MemoryKvStore>, n: usize) -> Vec<String> {
    let mut ids = Vec::with_capacity(n);
    for i in 0..n {
        let id = queue.submit(submission(i)).await.unwrap().request_id().to_string();
        queue.begin_review(&id, "rev").await.unwrap();
        ids.push(id);
    }
    ids
}

// =============================================================================
// Matching
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_approvals_share_one_resource() {
    let coordinator = coordinator().await;
    coordinator.register_resource(scope("only")).await.unwrap();
    let queue = Arc::clone(coordinator.queue());
    let ids = under_review(&queue, CALLERS).await;

    let mut tasks = JoinSet::new();
    for id in ids.clone() {
        let queue = Arc::clone(&queue);
        tasks.spawn(async move { queue.approve(&id, ReviewAction::new("rev")).await });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap().unwrap();
    }

    let mut scheduled = 0;
    for id in &ids {
        let request = queue.get(id).await.unwrap();
        match request.status() {
            RequestStatus::Scheduled => {
                scheduled += 1;
                assert_eq!(request.assigned_resource_id(), Some("only"));
            }
            RequestStatus::Approved => assert!(request.assigned_resource_id().is_none()),
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(scheduled, 1);
    assert_eq!(
        queue.registry().get("only").await.unwrap().status(),
        ResourceStatus::Busy
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_resource_assigned_at_most_once() {
    let coordinator = coordinator().await;
    for i in 0..4 {
        coordinator.register_resource(scope(&format!("scope-{i}"))).await.unwrap();
    }
    let queue = Arc::clone(coordinator.queue());
    let ids = under_review(&queue, CALLERS).await;

    let mut tasks = JoinSet::new();
    for id in ids.clone() {
        let queue = Arc::clone(&queue);
        tasks.spawn(async move { queue.approve(&id, ReviewAction::new("rev")).await });
    }
    let rescan = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.schedule_pending().await })
    };
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap().unwrap();
    }
    rescan.await.unwrap().unwrap();

    let mut assigned = HashSet::new();
    for id in &ids {
        if let Some(resource) = queue.get(id).await.unwrap().assigned_resource_id() {
            assert!(assigned.insert(resource.to_string()), "{resource} assigned twice");
        }
    }
    assert_eq!(assigned.len(), 4);
    let busy = queue
        .registry()
        .find(&ResourceFilter::new().with_status(ResourceStatus::Busy))
        .await;
    assert_eq!(busy.len(), 4);
}

// =============================================================================
// Transitions on one request
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transitions_on_one_request_serialize() {
    let coordinator = coordinator().await;
    let queue = Arc::clone(coordinator.queue());
    let id = queue.submit(submission(0)).await.unwrap().request_id().to_string();

    let mut tasks = JoinSet::new();
    for n in 0..CALLERS {
        let queue = Arc::clone(&queue);
        let id = id.clone();
        tasks.spawn(async move { queue.begin_review(&id, &format!("rev-{n}")).await });
    }

    let mut won = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(request) => {
                won += 1;
                assert_eq!(request.status(), RequestStatus::UnderReview);
            }
            Err(e) => assert!(matches!(e, Error::InvalidTransition { .. }), "{e}"),
        }
    }
    assert_eq!(won, 1);

    let request = queue.get(&id).await.unwrap();
    assert_eq!(request.history().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_approve_and_reject_pick_one_outcome() {
    let coordinator = coordinator().await;
    let queue = Arc::clone(coordinator.queue());
    let id = under_review(&queue, 1).await.remove(0);

    let approve = {
        let queue = Arc::clone(&queue);
        let id = id.clone();
        tokio::spawn(async move { queue.approve(&id, ReviewAction::new("a")).await })
    };
    let reject = {
        let queue = Arc::clone(&queue);
        let id = id.clone();
        tokio::spawn(async move {
            queue
                .reject(&id, ReviewAction::new("b").notes("duplicate"))
                .await
        })
    };
    let approved = approve.await.unwrap();
    let rejected = reject.await.unwrap();

    assert!(approved.is_ok() != rejected.is_ok());
    let status = queue.get(&id).await.unwrap().status();
    if approved.is_ok() {
        assert_eq!(status, RequestStatus::Approved);
    } else {
        assert_eq!(status, RequestStatus::Rejected);
    }
}

// =============================================================================
// Submissions and registrations
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_get_unique_ids_and_sequences() {
    let coordinator = coordinator().await;
    let queue = Arc::clone(coordinator.queue());

    let mut tasks = JoinSet::new();
    for n in 0..CALLERS {
        let queue = Arc::clone(&queue);
        tasks.spawn(async move { queue.submit(submission(n)).await });
    }
    let mut ids = HashSet::new();
    let mut sequences = HashSet::new();
    while let Some(joined) = tasks.join_next().await {
        let request = joined.unwrap().unwrap();
        ids.insert(request.request_id().to_string());
        sequences.insert(request.sequence());
    }

    assert_eq!(ids.len(), CALLERS);
    assert_eq!(sequences.len(), CALLERS);
    assert_eq!(queue.len().await, CALLERS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registration_of_one_id() {
    let coordinator = coordinator().await;
    let registry = Arc::clone(coordinator.registry());

    let mut tasks = JoinSet::new();
    for _ in 0..CALLERS {
        let registry = Arc::clone(&registry);
        tasks.spawn(async move { registry.register(scope("contested")).await });
    }
    let mut registered = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(_) => registered += 1,
            Err(e) => assert!(matches!(e, Error::DuplicateResource(_))),
        }
    }
    assert_eq!(registered, 1);
    assert_eq!(registry.len().await, 1);
}
