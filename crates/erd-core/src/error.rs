//! Error types for the diagram pipeline
//!
//! Parse failures abort the parse step. Generation errors are scoped to the
//! object that caused them and are returned alongside the plan as data.

use serde::Serialize;
use thiserror::Error;

/// Malformed diagram syntax, reported with location context
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[error("line {line}, column {column}: {message} (near '{token}')")]
pub struct ParseError {
    pub line: u32,
    pub column: u32,
    pub token: String,
    pub message: String,
}

/// Non-retryable failure while building metadata for a single object
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
pub enum GenerationError {
    #[error("{scope}: '{first}' and '{second}' both normalize to technical name '{technical}'")]
    NamingCollision {
        scope: String,
        first: String,
        second: String,
        technical: String,
    },

    #[error("choice set '{name}' uses reserved platform name '{technical}'")]
    ReservedName { name: String, technical: String },

    #[error("'{display}' does not produce a technical name (no alphanumeric characters)")]
    EmptyTechnicalName { display: String },

    #[error("'{display}' gives unique name '{technical}', which must start with a letter")]
    LeadingDigit { display: String, technical: String },

    #[error("publisher prefix '{prefix}' is invalid: {reason}")]
    InvalidPrefix { prefix: String, reason: String },

    #[error("option value prefix {0} must be between 10000 and 99999")]
    InvalidOptionValuePrefix(u32),

    #[error("choice set '{choice_set}' declares option value {value} more than once")]
    DuplicateOptionValue { choice_set: String, value: i32 },

    #[error("relationship '{label}' references entity '{entity}' which was not generated")]
    MissingEndpoint { label: String, entity: String },
}

impl GenerationError {
    /// Whether this error invalidates the whole plan rather than one object
    pub fn is_plan_wide(&self) -> bool {
        matches!(
            self,
            GenerationError::InvalidPrefix { .. } | GenerationError::InvalidOptionValuePrefix(_)
        )
    }
}

/// Malformed choice-set side document
#[derive(Debug, Error)]
pub enum ChoiceSetError {
    #[error("choice set document is not valid YAML/JSON: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("choice set document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("choice set '{name}' is invalid: {reason}")]
    Invalid { name: String, reason: String },
}
