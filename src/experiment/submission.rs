//! Wire-shaped submission payload and its validation.

use super::{ExperimentDetails, Priority, Requester, SampleSpec};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// The `experiment` block as submitted. Priority is a string until validated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentInput {
    /// Target microscope system
    #[serde(default)]
    pub microscope_system: String,
    /// Why the experiment matters
    #[serde(default)]
    pub scientific_rationale: String,
    /// `low`, `normal` (or `medium`), `high` or `urgent`
    #[serde(default)]
    pub priority: Option<String>,
    /// Capability tags the resource must advertise
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    /// Objective magnification the experiment needs (e.g. 60)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_magnification: Option<u32>,
}

/// A new experiment request as received from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// Sample to image
    #[serde(default)]
    pub sample_spec: Option<SampleSpec>,
    /// Who is asking
    pub requester: Requester,
    /// What is being asked for
    #[serde(default)]
    pub experiment: ExperimentInput,
}

impl Submission {
    /// Submission with every required field set.
    #[must_use]
    pub fn new(
        sample_spec: SampleSpec,
        requester: Requester,
        microscope_system: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            sample_spec: Some(sample_spec),
            requester,
            experiment: ExperimentInput {
                microscope_system: microscope_system.into(),
                scientific_rationale: String::new(),
                priority: Some(priority.as_str().to_string()),
                required_capabilities: Vec::new(),
                required_magnification: None,
            },
        }
    }

    /// Set the scientific rationale.
    #[must_use]
    pub fn rationale(mut self, rationale: impl Into<String>) -> Self {
        self.experiment.scientific_rationale = rationale.into();
        self
    }

    /// Add required capability tags.
    #[must_use]
    pub fn require<I, T>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.experiment
            .required_capabilities
            .extend(capabilities.into_iter().map(Into::into));
        self
    }

    /// Require an objective of this magnification.
    #[must_use]
    pub fn magnification(mut self, magnification: u32) -> Self {
        self.experiment.required_magnification = Some(magnification);
        self
    }

    /// Check required fields and parse the priority.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] naming the first missing or invalid field.
    pub fn validate(self) -> Result<(SampleSpec, Requester, ExperimentDetails)> {
        let sample_spec = self
            .sample_spec
            .ok_or_else(|| Error::Validation("sample_spec is required".into()))?;
        if sample_spec.sample_id.trim().is_empty() {
            return Err(Error::Validation("sample_spec.sample_id must not be empty".into()));
        }
        if self.requester.name.trim().is_empty() {
            return Err(Error::Validation("requester.name must not be empty".into()));
        }
        if self.requester.email.trim().is_empty() {
            return Err(Error::Validation("requester.email must not be empty".into()));
        }
        if self.experiment.microscope_system.trim().is_empty() {
            return Err(Error::Validation(
                "experiment.microscope_system must not be empty".into(),
            ));
        }
        if self.experiment.required_magnification == Some(0) {
            return Err(Error::Validation(
                "experiment.required_magnification must be positive".into(),
            ));
        }
        let priority: Priority = self
            .experiment
            .priority
            .as_deref()
            .ok_or_else(|| Error::Validation("experiment.priority is required".into()))?
            .parse()?;

        Ok((
            sample_spec,
            self.requester,
            ExperimentDetails {
                microscope_system: self.experiment.microscope_system,
                scientific_rationale: self.experiment.scientific_rationale,
                priority,
                required_capabilities: self.experiment.required_capabilities,
                required_magnification: self.experiment.required_magnification,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Submission {
        Submission::new(
            SampleSpec::new("s1"),
            Requester::new("Ada", "ada@lab.org", "Lab"),
            "DiSPIM",
            Priority::High,
        )
    }

    #[test]
    fn test_valid_submission() {
        let (spec, _, details) = valid().validate().unwrap();
        assert_eq!(spec.sample_id, "s1");
        assert_eq!(details.priority, Priority::High);
    }

    #[test]
    fn test_missing_fields_rejected() {
        let mut no_spec = valid();
        no_spec.sample_spec = None;
        assert!(matches!(no_spec.validate(), Err(Error::Validation(m)) if m.contains("sample_spec")));

        let mut no_priority = valid();
        no_priority.experiment.priority = None;
        assert!(matches!(no_priority.validate(), Err(Error::Validation(m)) if m.contains("priority")));

        let mut bad_priority = valid();
        bad_priority.experiment.priority = Some("whenever".into());
        assert!(matches!(bad_priority.validate(), Err(Error::Validation(_))));

        let zero_zoom = valid().magnification(0);
        assert!(matches!(zero_zoom.validate(), Err(Error::Validation(m)) if m.contains("magnification")));
    }

    #[test]
    fn test_wire_payload() {
        let submission: Submission = serde_json::from_value(serde_json::json!({
            "sample_spec": {"sample_id": "s9"},
            "requester": {"name": "Bo", "email": "bo@lab.org", "institution": "Lab"},
            "experiment": {
                "microscope_system": "confocal",
                "priority": "medium",
                "required_magnification": 63
            }
        }))
        .unwrap();
        let (_, _, details) = submission.validate().unwrap();
        assert_eq!(details.priority, Priority::Normal);
        assert_eq!(details.required_magnification, Some(63));
    }
}
