//! Resource matching for approved requests
//!
//! A [`Requirement`] is derived from the request's experiment block and
//! imaging parameters. Candidates are online, unclaimed, non-tombstoned
//! resources of the right type that satisfy every hard constraint; they are
//! ranked by capability overlap, then registration time, then registry order.
//!
//! Hard constraints only apply to what a resource declares. A microscope
//! without `microscope_kind` is not excluded by the system name, and one
//! without laser lines is not excluded by channel wavelengths. A required
//! magnification is the exception: only resources listing an objective of
//! exactly that magnification qualify.

use crate::experiment::ExperimentRequest;
use crate::predicate::{contains_all, overlap_count, text_eq};
use crate::registry::{Resource, ResourceStatus, ResourceType};
use serde::Serialize;
use std::cmp::Reverse;

/// Laser line tolerance for channel excitation, in nm.
pub const WAVELENGTH_TOLERANCE_NM: u32 = 10;

/// Capability tag implied by a z-stack.
pub const CAP_3D_IMAGING: &str = "3d_imaging";
/// Capability tag implied by a time-lapse.
pub const CAP_TIME_LAPSE: &str = "time_lapse";
/// Capability tag implied by live-cell imaging.
pub const CAP_LIVE_CELL: &str = "live_cell";
/// Preferred when more than one channel is imaged.
pub const CAP_MULTI_CHANNEL: &str = "multi_channel";
/// Preferred for live-cell imaging.
pub const CAP_ENVIRONMENTAL_CONTROL: &str = "environmental_control";

/// What a resource must (and should) offer to run a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Requirement {
    /// Resource type
    pub resource_type: ResourceType,
    /// Microscope system, checked against `metadata.microscope_kind`
    pub system: Option<String>,
    /// Capabilities the resource must advertise
    pub required: Vec<String>,
    /// Capabilities that only improve the ranking
    pub preferred: Vec<String>,
    /// Channel excitation wavelengths
    pub excitation_nm: Vec<u32>,
    /// Objective magnification that must be installed
    pub magnification: Option<u32>,
}

fn push_unique(tags: &mut Vec<String>, tag: &str) {
    if !tags.iter().any(|t| text_eq(t, tag)) {
        tags.push(tag.to_string());
    }
}

impl Requirement {
    /// Derive the requirement of a request.
    #[must_use]
    pub fn for_request(request: &ExperimentRequest) -> Self {
        let spec = request.sample_spec();
        let experiment = request.experiment();

        let mut required = Vec::new();
        for tag in &experiment.required_capabilities {
            push_unique(&mut required, tag);
        }
        if spec.has_z_stack() {
            push_unique(&mut required, CAP_3D_IMAGING);
        }
        if spec.has_time_lapse() {
            push_unique(&mut required, CAP_TIME_LAPSE);
        }
        if spec.is_live_cell() {
            push_unique(&mut required, CAP_LIVE_CELL);
        }

        let mut preferred = Vec::new();
        if spec.imaging_parameters.channels.len() > 1 {
            push_unique(&mut preferred, CAP_MULTI_CHANNEL);
        }
        if spec.is_live_cell() {
            push_unique(&mut preferred, CAP_ENVIRONMENTAL_CONTROL);
        }
        if let Some(kind) = spec.imaging_parameters.microscope_type.as_deref() {
            push_unique(&mut preferred, &kind.to_lowercase());
        }

        let system = experiment.microscope_system.trim();
        Self {
            resource_type: ResourceType::Microscope,
            system: (!system.is_empty()).then(|| system.to_string()),
            required,
            preferred,
            excitation_nm: spec.excitation_wavelengths(),
            magnification: experiment.required_magnification,
        }
    }

    /// Hard constraints, ignoring status.
    #[must_use]
    pub fn admits(&self, resource: &Resource) -> bool {
        let metadata = resource.metadata();
        resource.resource_type() == self.resource_type
            && match (&self.system, metadata.microscope_kind.as_deref()) {
                (Some(wanted), Some(kind)) => text_eq(wanted, kind),
                _ => true,
            }
            && contains_all(&self.required, resource.capabilities())
            && (metadata.laser_wavelengths_nm.is_empty()
                || self
                    .excitation_nm
                    .iter()
                    .all(|nm| metadata.has_wavelength(*nm, WAVELENGTH_TOLERANCE_NM)))
            && self.magnification.map_or(true, |m| metadata.has_objective(m))
    }

    /// Number of required and preferred tags the resource advertises.
    #[must_use]
    pub fn overlap(&self, resource: &Resource) -> usize {
        let wanted: Vec<&String> = self.required.iter().chain(&self.preferred).collect();
        overlap_count(&wanted, resource.capabilities())
    }
}

/// Online, admitted candidates, best first.
#[must_use]
pub fn rank<'a>(requirement: &Requirement, resources: &'a [Resource]) -> Vec<&'a Resource> {
    let mut candidates: Vec<(usize, &Resource)> = resources
        .iter()
        .enumerate()
        .filter(|(_, r)| {
            !r.is_deregistered()
                && !r.is_claimed()
                && r.status() == ResourceStatus::Online
                && requirement.admits(r)
        })
        .collect();
    candidates.sort_by_key(|(i, r)| (Reverse(requirement.overlap(r)), r.registered_at(), *i));
    candidates.into_iter().map(|(_, r)| r).collect()
}
