//! ER diagram deployment CLI
//!
//! # Usage
//!
//! ```bash
//! # Parse a diagram and print the graph
//! erd_deploy parse --diagram shop.mmd
//!
//! # Structural checks only
//! erd_deploy validate --diagram shop.mmd
//!
//! # Dry run: print the deployment plan
//! erd_deploy plan --diagram shop.mmd --choices choices.yaml --config deploy.yaml
//!
//! # Deploy (token from DATAVERSE_ACCESS_TOKEN)
//! erd_deploy deploy --diagram shop.mmd --config deploy.yaml
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use erd_deploy::erd_core::{parse_choice_sets, parse_choice_sets_json, ChoiceSetDef};
use erd_deploy::{build_plan, parse, validate, DeployConfig, StaticTokenProvider};

#[derive(Parser)]
#[command(name = "erd_deploy")]
#[command(version)]
#[command(about = "Turn Mermaid ER diagrams into Dataverse tables, columns, and relationships")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Inputs {
    /// Mermaid erDiagram source
    #[arg(short, long)]
    diagram: PathBuf,

    /// Choice-set side document (YAML or JSON)
    #[arg(long)]
    choices: Option<PathBuf>,

    /// Deployment config (YAML); environment overrides still apply
    #[arg(short, long, env = "ERD_DEPLOY_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse the diagram and print the graph with diagnostics
    Parse {
        #[arg(short, long)]
        diagram: PathBuf,
    },

    /// Parse and run the structural checks
    Validate {
        #[arg(short, long)]
        diagram: PathBuf,

        /// Treat a missing primary key as an error
        #[arg(long)]
        strict: bool,
    },

    /// Generate the deployment plan without touching the platform
    Plan(Inputs),

    /// Generate and deploy the plan
    Deploy(Inputs),
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::WARN.into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Parse { diagram } => cmd_parse(&diagram),
        Commands::Validate { diagram, strict } => cmd_validate(&diagram, strict),
        Commands::Plan(inputs) => cmd_plan(&inputs),
        Commands::Deploy(inputs) => cmd_deploy(&inputs).await,
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// COMMANDS
// =============================================================================

fn cmd_parse(diagram: &Path) -> Result<bool> {
    let parsed = parse(&read(diagram)?)?;
    print_json(&serde_json::json!({
        "graph": parsed.graph,
        "diagnostics": parsed.diagnostics,
    }))?;
    Ok(true)
}

fn cmd_validate(diagram: &Path, strict: bool) -> Result<bool> {
    let parsed = parse(&read(diagram)?)?;
    let policy = if strict {
        erd_deploy::erd_core::ValidationPolicy::strict()
    } else {
        Default::default()
    };
    let report = validate(&parsed.graph, &policy);
    print_json(&report)?;
    Ok(report.passed())
}

fn cmd_plan(inputs: &Inputs) -> Result<bool> {
    let config = load_config(inputs.config.as_deref())?;
    let choice_sets = load_choice_sets(inputs.choices.as_deref())?;
    let output = build_plan(&read(&inputs.diagram)?, &choice_sets, &config)?;
    print_json(&output)?;
    Ok(output.errors.is_empty())
}

async fn cmd_deploy(inputs: &Inputs) -> Result<bool> {
    let config = load_config(inputs.config.as_deref())?;
    config.validate()?;
    let choice_sets = load_choice_sets(inputs.choices.as_deref())?;
    let output = build_plan(&read(&inputs.diagram)?, &choice_sets, &config)?;
    if !output.errors.is_empty() {
        for error in &output.errors {
            eprintln!("plan error: {}", error);
        }
        bail!("{} object(s) could not be planned", output.errors.len());
    }

    let provider = Arc::new(StaticTokenProvider::from_env()?);
    let result = erd_deploy::deploy(&output.plan, provider, &config).await?;
    print_json(&result)?;
    Ok(result.is_success())
}

// =============================================================================
// HELPERS
// =============================================================================

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn load_config(path: Option<&Path>) -> Result<DeployConfig> {
    let config = match path {
        Some(path) => DeployConfig::from_file(path)?,
        None => DeployConfig::default(),
    };
    Ok(config.apply_env()?)
}

fn load_choice_sets(path: Option<&Path>) -> Result<Vec<ChoiceSetDef>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let text = read(path)?;
    let is_json = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
    let sets = if is_json {
        parse_choice_sets_json(&text)
    } else {
        parse_choice_sets(&text)
    };
    sets.with_context(|| format!("invalid choice sets in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
