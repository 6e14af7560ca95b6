//! Error taxonomy shared by every layer of the mapper.

use std::fmt;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MapperError>;

/// Errors raised while mapping, generating scripts, dispatching or decoding.
///
/// None of these are retried internally; they propagate to the caller with
/// the offending statement or domain type attached.
#[derive(Debug, Error)]
pub enum MapperError {
    /// A generated-id entity arrived with an id already set, or an element's
    /// id/endpoint state does not allow the requested script.
    #[error("invalid id configuration for '{type_name}': {reason}")]
    InvalidIdConfiguration {
        /// Domain type (or label) the element belongs to.
        type_name: String,
        /// Human readable description of the violation.
        reason: String,
    },
    /// Id value kind outside of the supported set {string, integer, long}.
    #[error("id of type {found} is not supported for '{type_name}' (expected string, integer or long)")]
    InvalidIdType {
        /// Domain type (or label) the element belongs to.
        type_name: String,
        /// Runtime kind of the rejected id value.
        found: String,
    },
    /// Operation invoked against the wrong element variant.
    #[error("{operation} is not supported for {variant} entity '{type_name}'")]
    UnexpectedEntityVariant {
        /// Operation that was attempted.
        operation: &'static str,
        /// Variant the element actually is.
        variant: &'static str,
        /// Domain type (or label) the element belongs to.
        type_name: String,
    },
    /// Wire result is neither recognised shape or failed validation.
    #[error("unexpected result shape ({found}): {reason}")]
    UnexpectedResultShape {
        /// Runtime type of the encountered result.
        found: String,
        /// Which validation failed.
        reason: String,
    },
    /// Update requested for an id that does not resolve on the server.
    #[error("cannot update '{type_name}' with id {id}: entity does not exist")]
    UpdateOfNonexistentEntity {
        /// Domain type of the entity.
        type_name: String,
        /// Rendered id (or `<none>`).
        id: String,
    },
    /// Statement execution failed on the transport or the server.
    #[error("query execution failed for `{statement}`: {message}")]
    QueryExecutionFailure {
        /// Statement that failed.
        statement: String,
        /// Transport or server supplied description.
        message: String,
    },
    /// Connection configuration is malformed.
    #[error("configuration error: {0}")]
    ConfigurationError(String),
    /// Domain record could not be converted to or from its element form.
    #[error("conversion of '{type_name}' failed: {message}")]
    Conversion {
        /// Domain type being converted.
        type_name: String,
        /// Underlying serde or coercion failure.
        message: String,
    },
    /// Criteria builder was given an unusable predicate.
    #[error("invalid criteria: {0}")]
    InvalidCriteria(&'static str),
    /// Property value cannot be rendered or parsed.
    #[error("invalid value for property '{property}': {reason}")]
    InvalidPropertyValue {
        /// Property name.
        property: String,
        /// Why the value was rejected.
        reason: String,
    },
}

impl MapperError {
    /// Builds an [`MapperError::InvalidIdConfiguration`].
    pub fn invalid_id_config(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        MapperError::InvalidIdConfiguration {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    /// Builds an [`MapperError::UnexpectedResultShape`].
    pub fn shape(found: impl Into<String>, reason: impl Into<String>) -> Self {
        MapperError::UnexpectedResultShape {
            found: found.into(),
            reason: reason.into(),
        }
    }

    /// Builds an [`MapperError::QueryExecutionFailure`] for a statement.
    pub fn execution(statement: impl Into<String>, message: impl fmt::Display) -> Self {
        MapperError::QueryExecutionFailure {
            statement: statement.into(),
            message: message.to_string(),
        }
    }

    /// Builds an [`MapperError::Conversion`].
    pub fn conversion(type_name: impl Into<String>, message: impl fmt::Display) -> Self {
        MapperError::Conversion {
            type_name: type_name.into(),
            message: message.to_string(),
        }
    }

    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            MapperError::InvalidIdConfiguration { .. } => "InvalidIdConfiguration",
            MapperError::InvalidIdType { .. } => "InvalidIdType",
            MapperError::UnexpectedEntityVariant { .. } => "UnexpectedEntityVariant",
            MapperError::UnexpectedResultShape { .. } => "UnexpectedResultShape",
            MapperError::UpdateOfNonexistentEntity { .. } => "UpdateOfNonexistentEntity",
            MapperError::QueryExecutionFailure { .. } => "QueryExecutionFailure",
            MapperError::ConfigurationError(_) => "ConfigurationError",
            MapperError::Conversion { .. } => "Conversion",
            MapperError::InvalidCriteria(_) => "InvalidCriteria",
            MapperError::InvalidPropertyValue { .. } => "InvalidPropertyValue",
        }
    }
}

/// Convenience wrapper that formats errors with their codes.
pub struct MapperErrorWithCode<'a>(pub &'a MapperError);

impl fmt::Display for MapperErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}
