//! Biological Search Tests
//!
//! `find_by_biology` over the sample index and `get_sample_summary`.

use labmesh::experiment::{
    AcquisitionMode, Antibody, Compound, ExperimentQueue, FluorescentProtein, Priority,
    RequestStatus, Requester, ReviewAction, SampleSpec, Submission,
};
use labmesh::kv::MemoryKvStore;
use labmesh::notify::NoopNotifier;
use labmesh::registry::ResourceRegistry;
use labmesh::search::BiologicalQuery;
use labmesh::store::SnapshotStore;
use labmesh::Error;
use std::sync::Arc;

async fn queue() -> ExperimentQueue<MemoryKvStore> {
    let store = Arc::new(SnapshotStore::new(MemoryKvStore::new()));
    let registry = Arc::new(ResourceRegistry::load(Arc::clone(&store)).await.unwrap());
    ExperimentQueue::load(store, registry, Arc::new(NoopNotifier))
        .await
        .unwrap()
}

fn hela_h2b(live: bool) -> SampleSpec {
    let mut spec = SampleSpec::new(if live { "hela-live" } else { "hela-fixed" });
    spec.biological_context.cell_line = Some("HeLa".into());
    spec.biological_context.organism = Some("Homo sapiens".into());
    spec.staining_protocol.fluorescent_proteins.push(FluorescentProtein {
        name: "EGFP".into(),
        fused_to: Some("H2B".into()),
    });
    spec.imaging_parameters.live_cell = Some(live);
    spec.imaging_parameters.microscope_type = Some("Light-sheet".into());
    spec
}

fn u2os_tubulin() -> SampleSpec {
    let mut spec = SampleSpec::new("u2os-tub");
    spec.biological_context.cell_line = Some("U2OS".into());
    spec.biological_context.organism = Some("Homo sapiens".into());
    spec.staining_protocol.primary_antibodies.push(Antibody {
        target: Some("alpha-Tubulin".into()),
        host: Some("mouse".into()),
        ..Antibody::default()
    });
    spec.staining_protocol.secondary_antibodies.push(Antibody {
        fluorophore: Some("Alexa Fluor 568".into()),
        ..Antibody::default()
    });
    spec.staining_protocol.nuclear_stain = Some("DAPI".into());
    spec.treatments.compounds.push(Compound {
        name: "Nocodazole".into(),
        concentration: Some("100 nM".into()),
    });
    spec.imaging_parameters.z_stack = AcquisitionMode::enabled();
    spec
}

async fn submit(queue: &ExperimentQueue<MemoryKvStore>, spec: SampleSpec) -> String {
    queue
        .submit(Submission::new(
            spec,
            Requester::new("Ada", "ada@lab.org", "Janelia"),
            "DiSPIM",
            Priority::Normal,
        ))
        .await
        .unwrap()
        .request_id()
        .to_string()
}

fn ids(found: &[labmesh::experiment::ExperimentRequest]) -> Vec<&str> {
    found.iter().map(|r| r.request_id()).collect()
}

// =============================================================================
// Text fields
// =============================================================================

#[tokio::test]
async fn test_cell_line_is_case_insensitive_substring() {
    let queue = queue().await;
    let hela = submit(&queue, hela_h2b(true)).await;
    submit(&queue, u2os_tubulin()).await;

    let found = queue.find_by_biology(&BiologicalQuery::new().cell_line("hela")).await;
    assert_eq!(ids(&found), vec![hela.as_str()]);

    let partial = queue.find_by_biology(&BiologicalQuery::new().cell_line("eL")).await;
    assert_eq!(partial.len(), 1);
}

#[tokio::test]
async fn test_live_cell_flag_is_exact() {
    let queue = queue().await;
    let live = submit(&queue, hela_h2b(true)).await;
    let fixed = submit(&queue, hela_h2b(false)).await;

    let query = BiologicalQuery::new().cell_line("HeLa").live_cell(true);
    assert_eq!(ids(&queue.find_by_biology(&query).await), vec![live.as_str()]);

    let query = BiologicalQuery::new().cell_line("HeLa").live_cell(false);
    assert_eq!(ids(&queue.find_by_biology(&query).await), vec![fixed.as_str()]);
}

#[tokio::test]
async fn test_empty_query_returns_all_in_submission_order() {
    let queue = queue().await;
    let first = submit(&queue, hela_h2b(true)).await;
    let second = submit(&queue, u2os_tubulin()).await;

    let all = queue.find_by_biology(&BiologicalQuery::new()).await;
    assert_eq!(ids(&all), vec![first.as_str(), second.as_str()]);
}

#[tokio::test]
async fn test_absent_field_never_matches_present_term() {
    let queue = queue().await;
    submit(&queue, SampleSpec::new("bare")).await;

    let found = queue
        .find_by_biology(&BiologicalQuery::new().organism("sapiens"))
        .await;
    assert!(found.is_empty());
}

// =============================================================================
// List fields and flags
// =============================================================================

#[tokio::test]
async fn test_list_fields_overlap_case_insensitively() {
    let queue = queue().await;
    let hela = submit(&queue, hela_h2b(true)).await;
    let u2os = submit(&queue, u2os_tubulin()).await;

    let by_fp = queue
        .find_by_biology(&BiologicalQuery::new().fluorescent_proteins(["egfp", "tdTomato"]))
        .await;
    assert_eq!(ids(&by_fp), vec![hela.as_str()]);

    let by_compound = queue
        .find_by_biology(&BiologicalQuery::new().compound_names(["NOCODAZOLE"]))
        .await;
    assert_eq!(ids(&by_compound), vec![u2os.as_str()]);

    let by_target = BiologicalQuery {
        antibody_targets: Some(vec!["ALPHA-tubulin".into()]),
        ..BiologicalQuery::default()
    };
    assert_eq!(ids(&queue.find_by_biology(&by_target).await), vec![u2os.as_str()]);
}

#[tokio::test]
async fn test_fluorophores_cover_secondaries_and_proteins() {
    let queue = queue().await;
    let hela = submit(&queue, hela_h2b(true)).await;
    let u2os = submit(&queue, u2os_tubulin()).await;

    let query = BiologicalQuery {
        fluorophores: Some(vec!["alexa fluor 568".into(), "EGFP".into()]),
        ..BiologicalQuery::default()
    };
    assert_eq!(
        ids(&queue.find_by_biology(&query).await),
        vec![hela.as_str(), u2os.as_str()]
    );
}

#[tokio::test]
async fn test_acquisition_flags_and_stain() {
    let queue = queue().await;
    submit(&queue, hela_h2b(true)).await;
    let u2os = submit(&queue, u2os_tubulin()).await;

    let query = BiologicalQuery {
        has_z_stack: Some(true),
        nuclear_stain: Some("dapi".into()),
        ..BiologicalQuery::default()
    };
    assert_eq!(ids(&queue.find_by_biology(&query).await), vec![u2os.as_str()]);

    let query = BiologicalQuery {
        has_time_lapse: Some(true),
        ..BiologicalQuery::default()
    };
    assert!(queue.find_by_biology(&query).await.is_empty());
}

#[tokio::test]
async fn test_status_filter() {
    let queue = queue().await;
    let reviewed = submit(&queue, hela_h2b(true)).await;
    submit(&queue, hela_h2b(false)).await;
    queue.begin_review(&reviewed, "rev").await.unwrap();

    let query = BiologicalQuery::new()
        .cell_line("hela")
        .status(RequestStatus::UnderReview);
    assert_eq!(ids(&queue.find_by_biology(&query).await), vec![reviewed.as_str()]);
}

// =============================================================================
// Index maintenance and summaries
// =============================================================================

#[tokio::test]
async fn test_resubmitted_spec_is_reindexed() {
    let queue = queue().await;
    let id = submit(&queue, hela_h2b(true)).await;
    queue.begin_review(&id, "rev").await.unwrap();
    queue
        .request_revision(&id, ReviewAction::new("rev").notes("wrong cell line"))
        .await
        .unwrap();
    queue
        .resubmit(&id, "ada@lab.org", Some(u2os_tubulin()))
        .await
        .unwrap();

    assert!(queue
        .find_by_biology(&BiologicalQuery::new().cell_line("hela"))
        .await
        .is_empty());
    assert_eq!(
        ids(&queue.find_by_biology(&BiologicalQuery::new().cell_line("u2os")).await),
        vec![id.as_str()]
    );
}

#[tokio::test]
async fn test_sample_summary_denormalizes_request() {
    let queue = queue().await;
    let id = submit(&queue, hela_h2b(true)).await;

    let summary = queue.get_sample_summary(&id).await.unwrap();
    assert_eq!(summary.request_id, id);
    assert_eq!(summary.sample_id, "hela-live");
    assert_eq!(summary.sample_version, 1);
    assert_eq!(summary.status, RequestStatus::Submitted);
    assert_eq!(summary.cell_line.as_deref(), Some("HeLa"));
    assert_eq!(summary.fluorescent_proteins, vec!["EGFP".to_string()]);
    assert_eq!(summary.institution, "Janelia");
    assert_eq!(summary.microscope_system, "DiSPIM");
    assert!(summary.live_cell);
    assert!(!summary.has_z_stack);
    assert!(summary.assigned_resource_id.is_none());
}

#[tokio::test]
async fn test_sample_summary_unknown_id() {
    let queue = queue().await;
    let err = queue.get_sample_summary("nope").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}
