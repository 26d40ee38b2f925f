//! Sample Spec - biological and imaging context of an experiment
//!
//! A sample spec is immutable once attached to a request. Corrections are new
//! versions that reference the one they replace (`supersedes`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

const fn first_version() -> u32 {
    1
}

/// Structured description of the sample and how it should be imaged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSpec {
    /// Sample identifier chosen by the requester
    pub sample_id: String,
    /// Version of this spec, starting at 1
    #[serde(default = "first_version")]
    pub version: u32,
    /// `<sample_id>@v<n>` of the spec this version replaces
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<String>,
    /// Cell line, organism, tissue and genetics
    #[serde(default)]
    pub biological_context: BiologicalContext,
    /// Fluorescent proteins, antibodies and stains
    #[serde(default)]
    pub staining_protocol: StainingProtocol,
    /// Compound treatments
    #[serde(default)]
    pub treatments: Treatments,
    /// Fixation and mounting
    #[serde(default)]
    pub sample_preparation: SamplePreparation,
    /// Microscope type, channels and acquisition modes
    #[serde(default)]
    pub imaging_parameters: ImagingParameters,
    /// Additional sections, kept verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Biological context of a sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BiologicalContext {
    /// Cell line (e.g. `"HeLa"`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_line: Option<String>,
    /// Organism (e.g. `"human"`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organism: Option<String>,
    /// Tissue type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tissue_type: Option<String>,
    /// Genetic modifications (knock-outs, knock-ins, ...)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub genetic_modifications: Vec<String>,
    /// Passage number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passage_number: Option<u32>,
    /// Additional attributes
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A fluorescent protein expressed in the sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FluorescentProtein {
    /// Protein name (e.g. `"EGFP"`)
    pub name: String,
    /// Tagged target, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fused_to: Option<String>,
}

/// Primary or secondary antibody.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Antibody {
    /// Antigen target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Conjugated fluorophore
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fluorophore: Option<String>,
    /// Host species
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// Staining and labelling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StainingProtocol {
    /// Expressed fluorescent proteins
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fluorescent_proteins: Vec<FluorescentProtein>,
    /// Primary antibodies
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_antibodies: Vec<Antibody>,
    /// Secondary antibodies
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondary_antibodies: Vec<Antibody>,
    /// Nuclear counterstain (e.g. `"DAPI"`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nuclear_stain: Option<String>,
}

/// A treatment compound.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Compound {
    /// Compound name
    pub name: String,
    /// Concentration, free text (e.g. `"100 nM"`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concentration: Option<String>,
}

/// Compound treatments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Treatments {
    /// Applied compounds
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compounds: Vec<Compound>,
}

/// Sample preparation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplePreparation {
    /// Fixation method; `"live"` for unfixed samples
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixation_method: Option<String>,
    /// Mounting medium
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mounting_medium: Option<String>,
}

/// An imaging channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel name (e.g. `"GFP"`)
    pub name: String,
    /// Excitation wavelength in nm
    #[serde(default, alias = "excitation", skip_serializing_if = "Option::is_none")]
    pub excitation_nm: Option<u32>,
    /// Emission wavelength in nm
    #[serde(default, alias = "emission", skip_serializing_if = "Option::is_none")]
    pub emission_nm: Option<u32>,
}

/// An acquisition mode that is either on or off.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionMode {
    /// Whether the mode is used
    #[serde(default)]
    pub enabled: bool,
    /// Mode parameters (step size, interval, ...)
    #[serde(flatten)]
    pub parameters: BTreeMap<String, Value>,
}

impl AcquisitionMode {
    /// An enabled mode without parameters.
    #[must_use]
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            parameters: BTreeMap::new(),
        }
    }
}

/// Imaging requirements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImagingParameters {
    /// Requested microscope type (e.g. `"light_sheet"`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub microscope_type: Option<String>,
    /// Channels to acquire
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<Channel>,
    /// Z-stack acquisition
    #[serde(default)]
    pub z_stack: AcquisitionMode,
    /// Time-lapse acquisition
    #[serde(default)]
    pub time_lapse: AcquisitionMode,
    /// Explicit live-cell flag; falls back to the fixation method when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_cell: Option<bool>,
    /// Additional parameters
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl SampleSpec {
    /// Create a version-1 spec with empty sections.
    #[must_use]
    pub fn new(sample_id: impl Into<String>) -> Self {
        Self {
            sample_id: sample_id.into(),
            version: first_version(),
            supersedes: None,
            biological_context: BiologicalContext::default(),
            staining_protocol: StainingProtocol::default(),
            treatments: Treatments::default(),
            sample_preparation: SamplePreparation::default(),
            imaging_parameters: ImagingParameters::default(),
            extra: BTreeMap::new(),
        }
    }

    /// Stable reference to this exact version: `<sample_id>@v<version>`.
    #[must_use]
    pub fn version_ref(&self) -> String {
        format!("{}@v{}", self.sample_id, self.version)
    }

    /// Turn `self` into the correction of `previous`.
    #[must_use]
    pub fn revision_of(mut self, previous: &Self) -> Self {
        self.version = previous.version + 1;
        self.supersedes = Some(previous.version_ref());
        self
    }

    /// Live-cell imaging: explicit flag, else `fixation_method == "live"`.
    #[must_use]
    pub fn is_live_cell(&self) -> bool {
        self.imaging_parameters.live_cell.unwrap_or_else(|| {
            self.sample_preparation
                .fixation_method
                .as_deref()
                .is_some_and(|m| m.eq_ignore_ascii_case("live"))
        })
    }

    /// Whether a z-stack is requested.
    #[must_use]
    pub const fn has_z_stack(&self) -> bool {
        self.imaging_parameters.z_stack.enabled
    }

    /// Whether a time-lapse is requested.
    #[must_use]
    pub const fn has_time_lapse(&self) -> bool {
        self.imaging_parameters.time_lapse.enabled
    }

    /// Names of expressed fluorescent proteins.
    #[must_use]
    pub fn fluorescent_protein_names(&self) -> Vec<String> {
        self.staining_protocol
            .fluorescent_proteins
            .iter()
            .map(|fp| fp.name.clone())
            .collect()
    }

    /// Targets of the primary antibodies.
    #[must_use]
    pub fn antibody_targets(&self) -> Vec<String> {
        self.staining_protocol
            .primary_antibodies
            .iter()
            .filter_map(|ab| ab.target.clone())
            .collect()
    }

    /// Secondary-antibody fluorophores followed by fluorescent-protein names.
    #[must_use]
    pub fn fluorophores(&self) -> Vec<String> {
        self.staining_protocol
            .secondary_antibodies
            .iter()
            .filter_map(|ab| ab.fluorophore.clone())
            .chain(self.fluorescent_protein_names())
            .collect()
    }

    /// Names of the treatment compounds.
    #[must_use]
    pub fn compound_names(&self) -> Vec<String> {
        self.treatments
            .compounds
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    /// Excitation wavelengths of the requested channels.
    #[must_use]
    pub fn excitation_wavelengths(&self) -> Vec<u32> {
        self.imaging_parameters
            .channels
            .iter()
            .filter_map(|c| c.excitation_nm)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loose_document_parses() {
        let spec: SampleSpec = serde_json::from_value(serde_json::json!({
            "sample_id": "test_sample_001",
            "biological_context": {"cell_line": "HeLa", "passage_number": 12},
            "imaging_parameters": {
                "microscope_type": "light_sheet",
                "channels": [{"name": "GFP", "excitation": 488}],
                "time_lapse": {"enabled": true, "interval": 300}
            }
        }))
        .unwrap();

        assert_eq!(spec.version, 1);
        assert_eq!(spec.biological_context.cell_line.as_deref(), Some("HeLa"));
        assert_eq!(spec.excitation_wavelengths(), vec![488]);
        assert!(spec.has_time_lapse());
        assert!(!spec.has_z_stack());
        assert_eq!(spec.imaging_parameters.time_lapse.parameters["interval"], 300);
    }

    #[test]
    fn test_live_cell_falls_back_to_fixation() {
        let mut spec = SampleSpec::new("s1");
        assert!(!spec.is_live_cell());

        spec.sample_preparation.fixation_method = Some("Live".into());
        assert!(spec.is_live_cell());

        spec.imaging_parameters.live_cell = Some(false);
        assert!(!spec.is_live_cell());
    }

    #[test]
    fn test_revision_chain() {
        let v1 = SampleSpec::new("s1");
        let v2 = SampleSpec::new("s1").revision_of(&v1);
        let v3 = SampleSpec::new("s1").revision_of(&v2);

        assert_eq!(v2.version, 2);
        assert_eq!(v2.supersedes.as_deref(), Some("s1@v1"));
        assert_eq!(v3.supersedes.as_deref(), Some("s1@v2"));
    }

    #[test]
    fn test_fluorophores_include_fp_names() {
        let mut spec = SampleSpec::new("s1");
        spec.staining_protocol.fluorescent_proteins.push(FluorescentProtein {
            name: "mCherry".into(),
            fused_to: None,
        });
        spec.staining_protocol.secondary_antibodies.push(Antibody {
            fluorophore: Some("Alexa 647".into()),
            ..Antibody::default()
        });

        assert_eq!(spec.fluorophores(), vec!["Alexa 647", "mCherry"]);
    }
}
