//! Discovery filter for the resource registry

use super::{Resource, ResourceStatus, ResourceType};
use crate::predicate;
use serde::{Deserialize, Serialize};

/// Conjunction of optional constraints over resources.
///
/// An empty filter matches every active resource. Capability tags are
/// compared case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFilter {
    /// Required resource type
    #[serde(default, rename = "type")]
    pub resource_type: Option<ResourceType>,
    /// Required status
    #[serde(default)]
    pub status: Option<ResourceStatus>,
    /// Resource must advertise every one of these capabilities
    #[serde(default)]
    pub has_all: Vec<String>,
    /// Resource must advertise at least one of these (ignored when empty)
    #[serde(default)]
    pub has_any: Vec<String>,
    /// Also return tombstoned resources
    #[serde(default)]
    pub include_deregistered: bool,
}

impl ResourceFilter {
    /// Filter matching every active resource.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a resource type.
    #[must_use]
    pub const fn of_type(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = Some(resource_type);
        self
    }

    /// Restrict to a status.
    #[must_use]
    pub const fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Require every listed capability.
    #[must_use]
    pub fn has_all<I, T>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.has_all.extend(capabilities.into_iter().map(Into::into));
        self
    }

    /// Require at least one of the listed capabilities.
    #[must_use]
    pub fn has_any<I, T>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.has_any.extend(capabilities.into_iter().map(Into::into));
        self
    }

    /// Include tombstoned resources in the results.
    #[must_use]
    pub const fn include_deregistered(mut self) -> Self {
        self.include_deregistered = true;
        self
    }

    /// Evaluate the filter against one resource.
    #[must_use]
    pub fn matches(&self, resource: &Resource) -> bool {
        (self.include_deregistered || !resource.is_deregistered())
            && self
                .resource_type
                .map_or(true, |t| t == resource.resource_type())
            && self.status.map_or(true, |s| s == resource.status())
            && predicate::contains_all(&self.has_all, resource.capabilities())
            && predicate::overlaps_any(Some(self.has_any.as_slice()), resource.capabilities())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> Resource {
        Resource::builder("scope-1", ResourceType::Microscope)
            .capabilities(["3d_imaging", "live_cell"])
            .status(ResourceStatus::Online)
            .build()
    }

    #[test]
    fn test_empty_filter_matches() {
        assert!(ResourceFilter::new().matches(&scope()));
    }

    #[test]
    fn test_conjunction() {
        let filter = ResourceFilter::new()
            .of_type(ResourceType::Microscope)
            .with_status(ResourceStatus::Online)
            .has_all(["live_cell"])
            .has_any(["deconvolution", "3D_IMAGING"]);
        assert!(filter.matches(&scope()));

        let wrong_type = filter.clone().of_type(ResourceType::Compute);
        assert!(!wrong_type.matches(&scope()));

        let missing = ResourceFilter::new().has_all(["live_cell", "super_resolution"]);
        assert!(!missing.matches(&scope()));

        let none_of = ResourceFilter::new().has_any(["super_resolution"]);
        assert!(!none_of.matches(&scope()));
    }
}
