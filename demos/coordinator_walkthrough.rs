//! Coordinator Walkthrough: from instrument registration to sample search
//!
//! Registers a light-sheet microscope and a compute node, submits two
//! experiment requests, reviews them, lets the matcher assign the microscope,
//! runs one experiment to completion and finally searches past samples by
//! biology. Transition notifications are printed by a background task.
//!
//! Configuration comes from `LABMESH_*` environment variables; the data
//! directory defaults to a fresh temporary directory.
//!
//! Run with: cargo run --example coordinator_walkthrough

use anyhow::Context;
use labmesh::experiment::{
    AcquisitionMode, Channel, FluorescentProtein, Priority, Requester, ReviewAction, SampleSpec,
    Submission,
};
use labmesh::notify::ChannelNotifier;
use labmesh::registry::{Resource, ResourceMetadata, ResourceStatus, ResourceType};
use labmesh::search::BiologicalQuery;
use labmesh::{logging, Coordinator, CoordinatorConfig};
use std::sync::Arc;
use tracing::info;

fn hela_h2b() -> SampleSpec {
    let mut spec = SampleSpec::new("hela-h2b-001");
    spec.biological_context.cell_line = Some("HeLa".into());
    spec.biological_context.organism = Some("Homo sapiens".into());
    spec.staining_protocol.fluorescent_proteins.push(FluorescentProtein {
        name: "EGFP".into(),
        fused_to: Some("H2B".into()),
    });
    spec.imaging_parameters.channels.push(Channel {
        name: "GFP".into(),
        excitation_nm: Some(488),
        emission_nm: Some(510),
    });
    spec.imaging_parameters.z_stack = AcquisitionMode::enabled();
    spec.imaging_parameters.live_cell = Some(true);
    spec
}

fn u2os_fixed() -> SampleSpec {
    let mut spec = SampleSpec::new("u2os-tubulin-007");
    spec.biological_context.cell_line = Some("U2OS".into());
    spec.staining_protocol.nuclear_stain = Some("DAPI".into());
    spec.sample_preparation.fixation_method = Some("PFA".into());
    spec
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config = CoordinatorConfig::from_env()?;
    let scratch = tempfile::tempdir().context("creating data directory")?;
    if std::env::var_os("LABMESH_DATA_DIR").is_none() {
        config.data_dir = scratch.path().to_path_buf();
    }
    logging::init(&config.log_filter, config.log_format)?;

    let (notifier, mut events) = ChannelNotifier::new(config.notification_buffer);
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let from = event
                .old_status
                .map_or_else(|| "-".to_string(), |s| s.to_string());
            println!(
                "  [notify] {} {from} -> {} by {}",
                &event.request_id[..8],
                event.new_status,
                event.actor
            );
        }
    });

    let coordinator = Coordinator::builder()
        .config(config.clone())
        .notifier(Arc::new(notifier))
        .build(labmesh::kv::FileKvStore::open(&config.data_dir).await?)
        .await?;
    info!(data_dir = %config.data_dir.display(), "coordinator started");

    println!("=== Registering resources ===");
    coordinator
        .register_resource(
            Resource::builder("dispim-001", ResourceType::Microscope)
                .capabilities(["3d_imaging", "live_cell", "environmental_control"])
                .status(ResourceStatus::Online)
                .metadata(ResourceMetadata {
                    name: Some("Dual-view light sheet".into()),
                    microscope_kind: Some("DiSPIM".into()),
                    laser_wavelengths_nm: vec![405, 488, 561, 640],
                    ..ResourceMetadata::default()
                })
                .build(),
        )
        .await?;
    coordinator
        .register_resource(
            Resource::builder("gpu-node-01", ResourceType::Compute)
                .capabilities(["deconvolution", "segmentation"])
                .status(ResourceStatus::Online)
                .metadata(ResourceMetadata {
                    gpu_count: Some(4),
                    ..ResourceMetadata::default()
                })
                .build(),
        )
        .await?;
    let stats = coordinator.registry().stats().await;
    println!("  {} resources active\n", stats.active);

    println!("=== Submitting requests ===");
    let queue = coordinator.queue();
    let requester = Requester::new("Ada Lovelace", "ada@lab.org", "Janelia");
    let live = queue
        .submit(
            Submission::new(hela_h2b(), requester.clone(), "DiSPIM", Priority::High)
                .rationale("chromatin condensation in live HeLa cells"),
        )
        .await?;
    let fixed = queue
        .submit(Submission::new(u2os_fixed(), requester, "DiSPIM", Priority::Low))
        .await?;
    for request in queue.pending().await {
        println!(
            "  pending: {} ({}, {})",
            request.sample_spec().sample_id,
            request.priority(),
            request.status()
        );
    }
    println!();

    println!("=== Review and matching ===");
    queue.begin_review(live.request_id(), "reviewer@lab.org").await?;
    let scheduled = queue
        .approve(live.request_id(), ReviewAction::new("reviewer@lab.org"))
        .await?;
    println!(
        "  {} -> {} on {}",
        scheduled.sample_spec().sample_id,
        scheduled.status(),
        scheduled.assigned_resource_id().unwrap_or("-")
    );

    queue.begin_review(fixed.request_id(), "reviewer@lab.org").await?;
    let waiting = queue
        .approve(fixed.request_id(), ReviewAction::new("reviewer@lab.org"))
        .await?;
    println!(
        "  {} -> {} (microscope busy)\n",
        waiting.sample_spec().sample_id,
        waiting.status()
    );

    println!("=== Execution ===");
    queue.start(live.request_id(), "operator@lab.org").await?;
    coordinator
        .complete(
            live.request_id(),
            "operator@lab.org",
            Some("/data/hela-h2b-001".into()),
        )
        .await?;
    let rescheduled = queue.get(fixed.request_id()).await?;
    println!(
        "  after completion, {} is {}\n",
        rescheduled.sample_spec().sample_id,
        rescheduled.status()
    );

    println!("=== Biological search ===");
    let query = BiologicalQuery::new().cell_line("hela").live_cell(true);
    for request in queue.find_by_biology(&query).await {
        let summary = queue.get_sample_summary(request.request_id()).await?;
        println!(
            "  {} v{}: {:?} / {:?} ({})",
            summary.sample_id,
            summary.sample_version,
            summary.cell_line,
            summary.fluorescent_proteins,
            summary.status
        );
    }

    let queue_stats = queue.stats().await;
    println!("\n=== Queue stats ===\n  {queue_stats:#?}");

    coordinator.shutdown().await;
    // Dropping the coordinator closes the channel; the printer drains and exits.
    drop(coordinator);
    printer.await?;
    Ok(())
}
