//! Resource Record - a registered instrument or service

use super::ResourceMetadata;
use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of registered resource. Immutable after registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Imaging instrument
    Microscope,
    /// Compute cluster
    Compute,
    /// Vision-language-model service
    Vlm,
    /// Data storage
    Storage,
    /// Analysis pipeline
    Analysis,
    /// Sequencing / genomics service
    Genomics,
    /// Lab automation robot
    Robotics,
}

impl ResourceType {
    /// All resource types, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Microscope,
        Self::Compute,
        Self::Vlm,
        Self::Storage,
        Self::Analysis,
        Self::Genomics,
        Self::Robotics,
    ];

    /// Wire name of this type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Microscope => "microscope",
            Self::Compute => "compute",
            Self::Vlm => "vlm",
            Self::Storage => "storage",
            Self::Analysis => "analysis",
            Self::Genomics => "genomics",
            Self::Robotics => "robotics",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Validation(format!("unknown resource type: {s:?}")))
    }
}

/// Live operational status of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Available for work
    Online,
    /// Not reachable or deregistered
    Offline,
    /// Assigned to an experiment
    Busy,
    /// Under maintenance
    Maintenance,
}

impl ResourceStatus {
    /// All statuses, in declaration order.
    pub const ALL: [Self; 4] = [Self::Online, Self::Offline, Self::Busy, Self::Maintenance];

    /// Wire name of this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Busy => "busy",
            Self::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Validation(format!("unknown resource status: {s:?}")))
    }
}

/// A registered resource.
///
/// `resource_id`, `type`, `capabilities`, `status` and `metadata` are supplied
/// by the registering agent. The timestamps, the tombstone marker and the
/// claim are managed by the registry and ignored on registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resource {
    resource_id: String,
    #[serde(rename = "type")]
    resource_type: ResourceType,
    #[serde(default)]
    capabilities: Vec<String>,
    status: ResourceStatus,
    #[serde(default)]
    metadata: ResourceMetadata,
    #[serde(default = "Utc::now")]
    registered_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_heartbeat: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deregistered_at: Option<DateTime<Utc>>,
    /// Request currently holding this resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    claimed_by: Option<String>,
}

impl Resource {
    /// Create a new resource descriptor in `offline` status with no capabilities.
    #[must_use]
    pub fn new(resource_id: impl Into<String>, resource_type: ResourceType) -> Self {
        let now = Utc::now();
        Self {
            resource_id: resource_id.into(),
            resource_type,
            capabilities: Vec::new(),
            status: ResourceStatus::Offline,
            metadata: ResourceMetadata::default(),
            registered_at: now,
            updated_at: now,
            last_heartbeat: None,
            deregistered_at: None,
            claimed_by: None,
        }
    }

    /// Create a builder for constructing a resource with optional fields.
    #[must_use]
    pub fn builder(resource_id: impl Into<String>, resource_type: ResourceType) -> ResourceBuilder {
        ResourceBuilder::new(resource_id, resource_type)
    }

    /// Get the resource ID.
    #[must_use]
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// Get the resource type.
    #[must_use]
    pub const fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    /// Get the capability tags.
    #[must_use]
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Get the current status.
    #[must_use]
    pub const fn status(&self) -> ResourceStatus {
        self.status
    }

    /// Get the type-specific metadata.
    #[must_use]
    pub const fn metadata(&self) -> &ResourceMetadata {
        &self.metadata
    }

    /// Get the registration timestamp.
    #[must_use]
    pub const fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    /// Get the last-modified timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Get the last heartbeat timestamp, if any.
    #[must_use]
    pub const fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        self.last_heartbeat
    }

    /// Get the deregistration timestamp, if this resource is tombstoned.
    #[must_use]
    pub const fn deregistered_at(&self) -> Option<DateTime<Utc>> {
        self.deregistered_at
    }

    /// Whether the resource has been deregistered.
    #[must_use]
    pub const fn is_deregistered(&self) -> bool {
        self.deregistered_at.is_some()
    }

    /// Request holding this resource, if any.
    ///
    /// A claim outlives deregistration and reactivation; only the holder
    /// can release it.
    #[must_use]
    pub fn claimed_by(&self) -> Option<&str> {
        self.claimed_by.as_deref()
    }

    /// Whether a request holds this resource.
    #[must_use]
    pub const fn is_claimed(&self) -> bool {
        self.claimed_by.is_some()
    }

    /// True if the resource advertises `capability` (case-insensitive).
    #[must_use]
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities
            .iter()
            .any(|c| crate::predicate::text_eq(c, capability))
    }

    /// Compare the agent-supplied fields, ignoring registry-managed ones.
    #[must_use]
    pub fn same_descriptor(&self, other: &Self) -> bool {
        self.resource_id == other.resource_id
            && self.resource_type == other.resource_type
            && self.capabilities == other.capabilities
            && self.status == other.status
            && self.metadata == other.metadata
    }

    pub(crate) fn stamp_registered(&mut self, now: DateTime<Utc>) {
        self.registered_at = now;
        self.updated_at = now;
        self.last_heartbeat = Some(now);
        self.deregistered_at = None;
        self.claimed_by = None;
    }

    pub(crate) fn reactivate_from(&mut self, replacement: Self, now: DateTime<Utc>) {
        self.capabilities = replacement.capabilities;
        self.metadata = replacement.metadata;
        self.status = ResourceStatus::Online;
        self.updated_at = now;
        self.last_heartbeat = Some(now);
        self.deregistered_at = None;
    }

    pub(crate) fn set_status(&mut self, status: ResourceStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
        self.last_heartbeat = Some(now);
    }

    pub(crate) fn set_claim(&mut self, request_id: Option<&str>, now: DateTime<Utc>) {
        self.claimed_by = request_id.map(str::to_string);
        self.updated_at = now;
    }

    pub(crate) fn touch_heartbeat(&mut self, now: DateTime<Utc>) {
        self.last_heartbeat = Some(now);
    }

    pub(crate) fn tombstone(&mut self, now: DateTime<Utc>) {
        self.status = ResourceStatus::Offline;
        self.updated_at = now;
        self.deregistered_at = Some(now);
    }
}

/// Builder for `Resource`.
#[derive(Debug)]
pub struct ResourceBuilder {
    resource: Resource,
}

impl ResourceBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(resource_id: impl Into<String>, resource_type: ResourceType) -> Self {
        Self {
            resource: Resource::new(resource_id, resource_type),
        }
    }

    /// Add one capability tag.
    #[must_use]
    pub fn capability(mut self, capability: impl Into<String>) -> Self {
        self.resource.capabilities.push(capability.into());
        self
    }

    /// Add several capability tags.
    #[must_use]
    pub fn capabilities<I, T>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.resource
            .capabilities
            .extend(capabilities.into_iter().map(Into::into));
        self
    }

    /// Set the initial status.
    #[must_use]
    pub const fn status(mut self, status: ResourceStatus) -> Self {
        self.resource.status = status;
        self
    }

    /// Set the metadata.
    #[must_use]
    pub fn metadata(mut self, metadata: ResourceMetadata) -> Self {
        self.resource.metadata = metadata;
        self
    }

    /// Build the `Resource`.
    #[must_use]
    pub fn build(self) -> Resource {
        self.resource
    }
}
