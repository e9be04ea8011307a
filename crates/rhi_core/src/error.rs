//! Error types shared by every managed object
//!
//! Every fallible operation in the crate returns [`RhiResult`]. The variants mirror the result
//! codes callers are expected to branch on: allocation failures, invalid arguments, ownership
//! violations, lookups that miss, and opaque backend failures.

use thiserror::Error;

use crate::config::ConfigError;
use crate::object::ObjectKind;
use crate::ownership::Ownership;

/// Errors reported by the resource layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RhiError {
    /// The backend factory could not allocate an object of this kind
    #[error("Allocation failed for {kind}")]
    AllocationFailed {
        /// Kind of object that failed to allocate
        kind: ObjectKind,
    },

    /// A create-info was malformed
    #[error("Invalid create argument: {reason}")]
    InvalidCreateArgument {
        /// What was wrong with the create-info
        reason: String,
    },

    /// A required object reference was null or no longer live
    #[error("Unexpected null argument: {what}")]
    UnexpectedNullArgument {
        /// Which argument was missing
        what: String,
    },

    /// An object did not have the ownership an operation requires
    #[error("Invalid ownership for {kind}: expected {expected:?}, found {found:?}")]
    InvalidOwnership {
        /// Kind of the offending object
        kind: ObjectKind,
        /// Ownership the operation requires
        expected: Ownership,
        /// Ownership the object actually had
        found: Ownership,
    },

    /// A lookup did not find the requested element
    #[error("Element not found: {what}")]
    ElementNotFound {
        /// Description of the missing element
        what: String,
    },

    /// An index was outside the valid range
    #[error("Index {index} out of range (count {count})")]
    OutOfRange {
        /// Requested index
        index: usize,
        /// Number of valid elements
        count: usize,
    },

    /// The operation is not allowed for this object
    #[error("Operation not permitted: {reason}")]
    OperationNotPermitted {
        /// Why the operation was refused
        reason: String,
    },

    /// A state-machine contract was violated by the caller
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of the violated contract
        reason: String,
    },

    /// Mesh geometry description is inconsistent
    #[error("Invalid geometry configuration: {reason}")]
    InvalidGeometry {
        /// What was inconsistent
        reason: String,
    },

    /// An instance is already live in this process
    #[error("An instance already exists in this process")]
    SingleInstance,

    /// The native API reported a failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// Configuration could not be loaded or validated
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RhiError {
    /// Shorthand for [`RhiError::InvalidCreateArgument`]
    pub fn invalid_create_argument(reason: impl Into<String>) -> Self {
        Self::InvalidCreateArgument { reason: reason.into() }
    }

    /// Shorthand for [`RhiError::UnexpectedNullArgument`]
    pub fn null_argument(what: impl Into<String>) -> Self {
        Self::UnexpectedNullArgument { what: what.into() }
    }

    /// Shorthand for [`RhiError::ElementNotFound`]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::ElementNotFound { what: what.into() }
    }

    /// Shorthand for [`RhiError::InvalidOperation`]
    pub fn invalid_operation(reason: impl Into<String>) -> Self {
        Self::InvalidOperation { reason: reason.into() }
    }

    /// Shorthand for [`RhiError::InvalidGeometry`]
    pub fn invalid_geometry(reason: impl Into<String>) -> Self {
        Self::InvalidGeometry { reason: reason.into() }
    }
}

impl From<ConfigError> for RhiError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for resource layer operations
pub type RhiResult<T> = Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RhiError::OutOfRange { index: 3, count: 1 };
        assert_eq!(err.to_string(), "Index 3 out of range (count 1)");

        let err = RhiError::AllocationFailed { kind: ObjectKind::Image };
        assert_eq!(err.to_string(), "Allocation failed for image");
    }

    #[test]
    fn test_config_error_conversion() {
        let err: RhiError = ConfigError::UnsupportedFormat("device.json".to_string()).into();
        assert!(matches!(err, RhiError::Config(ref msg) if msg.contains("device.json")));
    }
}
