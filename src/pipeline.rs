//! Command surface
//!
//! Each step is callable on its own; a dry run stops after [`generate`].

use std::sync::Arc;

use erd_core::{
    ChoiceSetDef, DeploymentPlan, Diagnostics, ErdGraph, GenerationError, GenerationOutput,
    GeneratorOptions, NamingConfig, ParseError, ParseOutput, ValidationPolicy, ValidationReport,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::auth::CredentialProvider;
use crate::config::DeployConfig;
use crate::dataverse::transport::Transport;
use crate::dataverse::DataverseClient;
use crate::deploy::{DeploymentResult, Orchestrator};
use crate::error::DeployError;

pub fn parse(text: &str) -> Result<ParseOutput, ParseError> {
    erd_core::parse_erd(text)
}

pub fn validate(graph: &ErdGraph, policy: &ValidationPolicy) -> ValidationReport {
    erd_core::validate(graph, policy)
}

pub fn generate(
    graph: &ErdGraph,
    choice_sets: &[ChoiceSetDef],
    naming: &NamingConfig,
    options: &GeneratorOptions,
) -> Result<GenerationOutput, GenerationError> {
    erd_core::generate(graph, choice_sets, naming, options)
}

/// Deploy against the environment named in `config`
pub async fn deploy(
    plan: &DeploymentPlan,
    provider: Arc<dyn CredentialProvider>,
    config: &DeployConfig,
) -> Result<DeploymentResult, DeployError> {
    config.validate()?;
    let client = DataverseClient::connect(config, provider)?;
    Orchestrator::new(client)
        .with_max_concurrency(config.max_concurrency)
        .deploy(plan)
        .await
}

/// Deploy through a caller-supplied transport
pub async fn deploy_with_transport(
    plan: &DeploymentPlan,
    provider: Arc<dyn CredentialProvider>,
    transport: Arc<dyn Transport>,
    config: &DeployConfig,
) -> Result<DeploymentResult, DeployError> {
    let client = DataverseClient::with_transport(
        transport,
        provider,
        config.retry_policy(),
        config.token_refresh_margin(),
    );
    Orchestrator::new(client)
        .with_max_concurrency(config.max_concurrency)
        .deploy(plan)
        .await
}

// =============================================================================
// PARSE → VALIDATE → GENERATE
// =============================================================================

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("validation failed with {} error(s)", .0.errors().count())]
    Validation(ValidationReport),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Everything a dry run produces
#[derive(Debug, Clone, Serialize)]
pub struct PlanOutput {
    pub plan: DeploymentPlan,
    /// Objects dropped from the plan
    pub errors: Vec<GenerationError>,
    /// Parser, validator, and generator findings, in that order
    pub diagnostics: Diagnostics,
}

/// Parse, validate, and generate; stops at the first blocking stage
pub fn build_plan(
    text: &str,
    choice_sets: &[ChoiceSetDef],
    config: &DeployConfig,
) -> Result<PlanOutput, PipelineError> {
    let parsed = parse(text)?;
    let report = validate(&parsed.graph, &config.validation_policy());
    if !report.passed() {
        warn!(errors = report.errors().count(), "diagram failed validation");
        return Err(PipelineError::Validation(report));
    }

    let output = generate(
        &parsed.graph,
        choice_sets,
        &config.naming(),
        &config.generator_options(),
    )?;

    let mut diagnostics = parsed.diagnostics;
    diagnostics.extend(report.findings.into_vec());
    diagnostics.extend(output.diagnostics.into_vec());

    info!(
        entities = output.plan.entities.len(),
        relationships = output.plan.relationships.len(),
        choice_sets = output.plan.choice_sets.len(),
        dropped = output.errors.len(),
        "plan generated"
    );
    Ok(PlanOutput {
        plan: output.plan,
        errors: output.errors,
        diagnostics,
    })
}
