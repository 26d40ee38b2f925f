//! Typed resource metadata with an explicit escape hatch.
//!
//! Recognised keys are typed fields. Each [`ResourceType`] accepts the common
//! keys plus its own set; anything else goes into `extra` untouched.

use super::ResourceType;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Keys accepted for every resource type.
const COMMON_KEYS: &[&str] = &["name", "institution", "location", "contact_email"];

/// Objective lens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    /// Magnification (e.g. 40 for 40x)
    pub magnification: u32,
    /// Numerical aperture
    pub numerical_aperture: f64,
    /// Immersion medium
    #[serde(default = "default_immersion")]
    pub immersion: String,
}

fn default_immersion() -> String {
    "air".to_string()
}

/// Person who reviews requests for a microscope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reviewer {
    /// Display name
    pub name: String,
    /// Where review requests are sent
    pub email: String,
}

impl Reviewer {
    /// Reviewer with a name and an email.
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Environmental control chamber.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentalChamber {
    /// Temperature control available
    #[serde(default)]
    pub temperature_control: bool,
    /// CO2 control available
    #[serde(default)]
    pub co2_control: bool,
    /// Humidity control available
    #[serde(default)]
    pub humidity_control: bool,
}

/// Type-specific attributes of a resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Owning institution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,
    /// Building / room
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Operator contact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,

    /// Microscope system (e.g. `"DiSPIM"`, `"confocal"`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub microscope_kind: Option<String>,
    /// Installed objectives
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objectives: Vec<Objective>,
    /// Laser lines in nanometres
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub laser_wavelengths_nm: Vec<u32>,
    /// Named detection channels
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<String>,
    /// Special acquisition or operating modes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub special_modes: Vec<String>,
    /// Environmental chamber, if fitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environmental_chamber: Option<EnvironmentalChamber>,
    /// Reviewers notified of submissions for this microscope
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reviewers: Vec<Reviewer>,

    /// Accelerator count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_count: Option<u32>,
    /// Memory in GiB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_gb: Option<f64>,
    /// Served model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    /// Capacity in TiB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_tb: Option<f64>,
    /// Supported assays
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assays: Vec<String>,
    /// Maximum payload in kg
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_kg: Option<f64>,

    /// Unrecognised attributes, kept verbatim for forward compatibility
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ResourceMetadata {
    /// Typed keys a resource type accepts in addition to the common ones.
    #[must_use]
    pub const fn recognized_keys(resource_type: ResourceType) -> &'static [&'static str] {
        match resource_type {
            ResourceType::Microscope => &[
                "microscope_kind",
                "objectives",
                "laser_wavelengths_nm",
                "channels",
                "special_modes",
                "environmental_chamber",
                "reviewers",
            ],
            ResourceType::Compute => &["gpu_count", "memory_gb", "special_modes"],
            ResourceType::Vlm => &["model_name", "gpu_count", "memory_gb"],
            ResourceType::Storage => &["capacity_tb"],
            ResourceType::Analysis => &["special_modes", "memory_gb"],
            ResourceType::Genomics => &["assays", "channels"],
            ResourceType::Robotics => &["payload_kg", "special_modes"],
        }
    }

    /// Names of the typed keys that carry a value.
    #[must_use]
    pub fn populated_keys(&self) -> Vec<&'static str> {
        let flags = [
            ("name", self.name.is_some()),
            ("institution", self.institution.is_some()),
            ("location", self.location.is_some()),
            ("contact_email", self.contact_email.is_some()),
            ("microscope_kind", self.microscope_kind.is_some()),
            ("objectives", !self.objectives.is_empty()),
            ("laser_wavelengths_nm", !self.laser_wavelengths_nm.is_empty()),
            ("channels", !self.channels.is_empty()),
            ("special_modes", !self.special_modes.is_empty()),
            ("environmental_chamber", self.environmental_chamber.is_some()),
            ("reviewers", !self.reviewers.is_empty()),
            ("gpu_count", self.gpu_count.is_some()),
            ("memory_gb", self.memory_gb.is_some()),
            ("model_name", self.model_name.is_some()),
            ("capacity_tb", self.capacity_tb.is_some()),
            ("assays", !self.assays.is_empty()),
            ("payload_kg", self.payload_kg.is_some()),
        ];
        flags
            .into_iter()
            .filter_map(|(key, set)| set.then_some(key))
            .collect()
    }

    /// Reject typed keys that do not belong to `resource_type`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the foreign keys.
    pub fn validate_for(&self, resource_type: ResourceType) -> Result<()> {
        let allowed = Self::recognized_keys(resource_type);
        let foreign: Vec<&str> = self
            .populated_keys()
            .into_iter()
            .filter(|key| !COMMON_KEYS.contains(key) && !allowed.contains(key))
            .collect();
        if foreign.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "metadata keys {foreign:?} are not valid for {resource_type} resources"
            )))
        }
    }

    /// True if a laser line lies within `tolerance_nm` of `wavelength_nm`.
    #[must_use]
    pub fn has_wavelength(&self, wavelength_nm: u32, tolerance_nm: u32) -> bool {
        self.laser_wavelengths_nm
            .iter()
            .any(|line| line.abs_diff(wavelength_nm) <= tolerance_nm)
    }

    /// True if an objective with exactly this magnification is installed.
    #[must_use]
    pub fn has_objective(&self, magnification: u32) -> bool {
        self.objectives
            .iter()
            .any(|o| o.magnification == magnification)
    }
}
