//! erd-core: ER diagram parser, validator, and schema generator
//!
//! This crate contains the pure diagram pipeline with NO network dependencies:
//! - Graph types (ErdGraph, EntityDef, FieldDef, RelationshipDef, ChoiceSetDef)
//! - Nom-based Mermaid `erDiagram` parser
//! - Structural validator producing a report of findings
//! - Deterministic technical naming
//! - Choice-set side document loader
//! - Schema generator producing a DeploymentPlan
//!
//! Deployment against the remote platform lives in the `erd-deploy` crate.

pub mod ast;
pub mod choice_sets;
pub mod diagnostics;
pub mod error;
pub mod generator;
pub mod naming;
pub mod parser;
pub mod plan;
pub mod validator;

// Re-export commonly used types
pub use ast::{
    Cardinality, ChoiceOption, ChoiceSetDef, Constraint, EntityDef, ErdGraph, FieldDef,
    FieldType, Ownership, RelationshipDef,
};
pub use choice_sets::{parse_choice_sets, parse_choice_sets_json};
pub use diagnostics::{Diagnostic, DiagnosticCode, DiagnosticIter, Diagnostics, Severity, SourceSpan};
pub use error::{ChoiceSetError, GenerationError, ParseError};
pub use generator::{generate, GenerationOutput, GeneratorOptions, JunctionHeuristic};
pub use naming::NamingConfig;
pub use parser::{parse_erd, ParseOutput};
pub use plan::{
    AlternateKeySpec, AttributeKind, CascadeBehavior, ChoiceSetSpec, ColumnSpec, DeploymentPlan,
    EntitySpec, ExternalKey, LookupSpec, ObjectKind, OptionSpec, PublisherSpec, RelationshipSpec,
    SolutionSpec, StringFormat,
};
pub use validator::{validate, ValidationPolicy, ValidationReport};
