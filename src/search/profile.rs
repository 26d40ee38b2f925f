//! Derived index rows over sample specs.

use crate::experiment::{ExperimentRequest, RequestStatus, SampleSpec};
use chrono::{DateTime, Utc};
use serde::Serialize;

fn lower(value: Option<&String>) -> Option<String> {
    value.map(|v| v.to_lowercase())
}

fn lower_all(values: Vec<String>) -> Vec<String> {
    values.into_iter().map(|v| v.to_lowercase()).collect()
}

/// Flattened, lower-cased search fields of one sample spec.
///
/// Built when a request enters the queue or is resubmitted, and rebuilt on
/// load. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BiologicalProfile {
    pub(crate) cell_line: Option<String>,
    pub(crate) organism: Option<String>,
    pub(crate) tissue_type: Option<String>,
    pub(crate) nuclear_stain: Option<String>,
    pub(crate) microscope_type: Option<String>,
    pub(crate) genetic_modifications: Vec<String>,
    pub(crate) fluorescent_proteins: Vec<String>,
    pub(crate) antibody_targets: Vec<String>,
    pub(crate) fluorophores: Vec<String>,
    pub(crate) compound_names: Vec<String>,
    pub(crate) live_cell: bool,
    pub(crate) has_z_stack: bool,
    pub(crate) has_time_lapse: bool,
}

impl BiologicalProfile {
    /// Derive the profile of a sample spec.
    #[must_use]
    pub fn from_spec(spec: &SampleSpec) -> Self {
        let bio = &spec.biological_context;
        Self {
            cell_line: lower(bio.cell_line.as_ref()),
            organism: lower(bio.organism.as_ref()),
            tissue_type: lower(bio.tissue_type.as_ref()),
            nuclear_stain: lower(spec.staining_protocol.nuclear_stain.as_ref()),
            microscope_type: lower(spec.imaging_parameters.microscope_type.as_ref()),
            genetic_modifications: lower_all(bio.genetic_modifications.clone()),
            fluorescent_proteins: lower_all(spec.fluorescent_protein_names()),
            antibody_targets: lower_all(spec.antibody_targets()),
            fluorophores: lower_all(spec.fluorophores()),
            compound_names: lower_all(spec.compound_names()),
            live_cell: spec.is_live_cell(),
            has_z_stack: spec.has_z_stack(),
            has_time_lapse: spec.has_time_lapse(),
        }
    }

    /// Whether the sample is imaged live.
    #[must_use]
    pub const fn live_cell(&self) -> bool {
        self.live_cell
    }
}

/// Denormalized view of one request's sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleSummary {
    /// Request id
    pub request_id: String,
    /// Sample id
    pub sample_id: String,
    /// Current sample spec version
    pub sample_version: u32,
    /// Request status
    pub status: RequestStatus,
    /// Assigned resource, if matched
    pub assigned_resource_id: Option<String>,
    /// Requester name
    pub requester: String,
    /// Requester institution
    pub institution: String,
    /// Target microscope system
    pub microscope_system: String,
    /// Times the request was resubmitted
    pub revision: u32,
    /// When the request was submitted
    pub submitted_at: DateTime<Utc>,
    /// Cell line
    pub cell_line: Option<String>,
    /// Organism
    pub organism: Option<String>,
    /// Fluorescent protein names
    pub fluorescent_proteins: Vec<String>,
    /// Primary antibody targets
    pub antibody_targets: Vec<String>,
    /// Treatment compounds
    pub compounds: Vec<String>,
    /// Requested microscope type
    pub microscope_type: Option<String>,
    /// Live-cell imaging
    pub live_cell: bool,
    /// Z-stack requested
    pub has_z_stack: bool,
    /// Time-lapse requested
    pub has_time_lapse: bool,
    /// Full current sample spec
    pub sample_spec: SampleSpec,
}

impl SampleSummary {
    /// Summarise a request. Display fields keep their original spelling.
    #[must_use]
    pub fn of(request: &ExperimentRequest) -> Self {
        let spec = request.sample_spec();
        Self {
            request_id: request.request_id().to_string(),
            sample_id: spec.sample_id.clone(),
            sample_version: spec.version,
            status: request.status(),
            assigned_resource_id: request.assigned_resource_id().map(str::to_string),
            requester: request.requester().name.clone(),
            institution: request.requester().institution.clone(),
            microscope_system: request.experiment().microscope_system.clone(),
            revision: request.revision(),
            submitted_at: request.submitted_at(),
            cell_line: spec.biological_context.cell_line.clone(),
            organism: spec.biological_context.organism.clone(),
            fluorescent_proteins: spec.fluorescent_protein_names(),
            antibody_targets: spec.antibody_targets(),
            compounds: spec.compound_names(),
            microscope_type: spec.imaging_parameters.microscope_type.clone(),
            live_cell: spec.is_live_cell(),
            has_z_stack: spec.has_z_stack(),
            has_time_lapse: spec.has_time_lapse(),
            sample_spec: spec.clone(),
        }
    }
}
