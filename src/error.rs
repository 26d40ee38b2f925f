//! Error types for labmesh
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)
//!
//! Every core operation surfaces one of five kinds (see [`ErrorKind`]) so the
//! transport layer can tell "not found" from "not allowed" from "bad input".

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// labmesh error types
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing required fields
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown resource or request id
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity that was looked up ("resource", "request")
        entity: &'static str,
        /// The id that was not found
        id: String,
    },

    /// Re-registering an id that is still active
    #[error("Resource already registered: {0}\nDeregister it first or use update_status()")]
    DuplicateResource(String),

    /// Lifecycle rule violated; the request is left unchanged
    #[error("Invalid transition for request {request_id}: cannot {action} from {from}")]
    InvalidTransition {
        /// Request the transition was attempted on
        request_id: String,
        /// Status the request was in
        from: String,
        /// Operation that was attempted
        action: String,
    },

    /// Underlying store unavailable or corrupt
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Notifier could not accept an event (logged, never returned by core operations)
    #[error("Notification error: {0}")]
    Notification(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for an unknown resource id.
    pub fn resource_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "resource",
            id: id.into(),
        }
    }

    /// Shorthand for an unknown request id.
    pub fn request_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "request",
            id: id.into(),
        }
    }

    /// Classify this error into one of the five core kinds.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::DuplicateResource(_) => ErrorKind::DuplicateResource,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::Persistence(_) | Self::Notification(_) | Self::Io(_) | Self::Json(_) => {
                ErrorKind::Persistence
            }
        }
    }
}

/// Stable error classification for transport adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input
    Validation,
    /// Unknown id
    NotFound,
    /// Id already active
    DuplicateResource,
    /// Not allowed in the current state
    InvalidTransition,
    /// Store unavailable or corrupt
    Persistence,
}

impl ErrorKind {
    /// Machine-readable code, distinct per kind.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation => "validation_error",
            Self::NotFound => "not_found",
            Self::DuplicateResource => "duplicate_resource",
            Self::InvalidTransition => "invalid_transition",
            Self::Persistence => "persistence_error",
        }
    }

    /// Suggested HTTP status for this kind.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::NotFound => 404,
            Self::DuplicateResource | Self::InvalidTransition => 409,
            Self::Persistence => 503,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_and_json_classify_as_persistence() {
        let io = Error::from(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"));
        assert_eq!(io.kind(), ErrorKind::Persistence);

        let json = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert_eq!(Error::from(json).kind(), ErrorKind::Persistence);
    }

    #[test]
    fn test_codes_are_distinct() {
        let kinds = [
            ErrorKind::Validation,
            ErrorKind::NotFound,
            ErrorKind::DuplicateResource,
            ErrorKind::InvalidTransition,
            ErrorKind::Persistence,
        ];
        let codes: std::collections::HashSet<_> = kinds.iter().map(ErrorKind::code).collect();
        assert_eq!(codes.len(), kinds.len());
    }
}
