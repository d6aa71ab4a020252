//! erd-deploy: Mermaid ER diagrams to Dataverse metadata
//!
//! The diagram pipeline (parse, validate, generate) lives in `erd-core`.
//! This crate adds the remote side:
//! - Configuration (YAML + environment overrides)
//! - Cached bearer credentials with single-writer refresh
//! - Retrying Web API caller behind a transport seam
//! - Per-object metadata services (check existence, create)
//! - Staged, idempotent deployment orchestrator and its result artifact

pub mod auth;
pub mod config;
pub mod dataverse;
pub mod deploy;
pub mod error;
pub mod pipeline;

pub use erd_core;

// Re-export commonly used types
pub use auth::{AccessToken, CredentialProvider, StaticTokenProvider, TokenCache};
pub use config::DeployConfig;
pub use dataverse::caller::RetryPolicy;
pub use dataverse::transport::{ApiRequest, ApiResponse, Method, Transport, TransportError};
pub use dataverse::DataverseClient;
pub use deploy::{
    CancellationFlag, DeploymentResult, KindSummary, ObjectOutcome, ObjectState, Orchestrator,
};
pub use error::{AuthError, ConfigError, DeployError, RemoteError};
pub use pipeline::{
    build_plan, deploy, deploy_with_transport, generate, parse, validate, PipelineError,
    PlanOutput,
};
