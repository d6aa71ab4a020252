//! Error taxonomy for configuration, credentials, and remote calls
//!
//! Object-level remote failures never abort a run. They are recorded in the
//! [`DeploymentResult`](crate::deploy::DeploymentResult). Only [`DeployError`]
//! stops `deploy` before any object is attempted.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("environment override {name}='{value}' is invalid: {reason}")]
    Env {
        name: String,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Credential acquisition or refresh failed; nothing can be called without a token
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
pub enum AuthError {
    #[error("no credential available: {0}")]
    Missing(String),

    #[error("credential provider failed: {0}")]
    Provider(String),
}

/// Failure of a single remote call after retry handling
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
pub enum RemoteError {
    /// Rate limit, 5xx, timeout, or connection failure that outlived the retry budget
    #[error("transient failure after {attempts} attempts ({}): {message}", status_text(.status))]
    Transient {
        status: Option<u16>,
        message: String,
        attempts: u32,
    },

    /// Rejected payload, authorization denied, conflicting object
    #[error("platform rejected the request ({}): {message}", status_text(.status))]
    Permanent { status: Option<u16>, message: String },

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Successful status but a body or header the client cannot use
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn is_auth(&self) -> bool {
        matches!(self, RemoteError::Auth(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Transient { status, .. } | RemoteError::Permanent { status, .. } => {
                *status
            }
            _ => None,
        }
    }
}

fn status_text(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("HTTP {}", code),
        None => "no response".to_string(),
    }
}

/// Run-level failure; the plan was not attempted
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("initial authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("deployment plan is invalid: {0}")]
    InvalidPlan(String),
}
