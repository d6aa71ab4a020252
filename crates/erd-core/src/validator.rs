//! Structural validation of a parsed graph
//!
//! Each check is an independent pure read over the graph. The report is data;
//! the caller decides whether an `Error` finding stops the pipeline.
//!
//! # Usage
//!
//! ```
//! use erd_core::{parse_erd, validate, ValidationPolicy};
//!
//! let parsed = parse_erd("erDiagram\n  Customer { string id PK }\n").unwrap();
//! let report = validate(&parsed.graph, &ValidationPolicy::default());
//! assert!(report.passed());
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ast::{ErdGraph, Ownership};
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticIter, Diagnostics};
use crate::naming::normalize_key;

// =============================================================================
// POLICY AND REPORT
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    /// The generator will add a surrogate key, so a missing PK is only a warning
    pub synthesize_primary_keys: bool,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            synthesize_primary_keys: true,
        }
    }
}

impl ValidationPolicy {
    pub fn strict() -> Self {
        Self {
            synthesize_primary_keys: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub findings: Diagnostics,
}

impl ValidationReport {
    /// No `Error` findings
    pub fn passed(&self) -> bool {
        !self.findings.has_errors()
    }

    pub fn errors(&self) -> DiagnosticIter<'_> {
        self.findings.errors()
    }

    pub fn warnings(&self) -> DiagnosticIter<'_> {
        self.findings.warnings()
    }
}

// =============================================================================
// VALIDATOR
// =============================================================================

/// Run every structural check against the graph
pub fn validate(graph: &ErdGraph, policy: &ValidationPolicy) -> ValidationReport {
    let mut findings = Diagnostics::new();

    findings.extend(check_primary_keys(graph, policy));
    findings.extend(check_self_references(graph));
    findings.extend(check_parental_relationships(graph));
    findings.extend(check_orphans(graph));
    findings.extend(check_naming_collisions(graph));
    findings.extend(check_foreign_keys(graph));

    tracing::debug!(
        findings = findings.len(),
        errors = findings.errors().count(),
        "validated ER graph"
    );

    ValidationReport { findings }
}

/// One finding per entity without a PK; composite keys are flagged separately
pub fn check_primary_keys(graph: &ErdGraph, policy: &ValidationPolicy) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    for entity in &graph.entities {
        let pk_count = entity.primary_keys().count();
        if pk_count == 0 {
            let diag = if policy.synthesize_primary_keys {
                Diagnostic::warning(
                    DiagnosticCode::MissingPrimaryKey,
                    format!(
                        "entity '{}' has no primary key; a surrogate key will be generated",
                        entity.name
                    ),
                )
            } else {
                Diagnostic::error(
                    DiagnosticCode::MissingPrimaryKey,
                    format!("entity '{}' has no primary key", entity.name),
                )
            };
            out.push(diag.at_line(entity.line).about(entity.name.clone()));
        } else if pk_count > 1 {
            out.push(
                Diagnostic::warning(
                    DiagnosticCode::MultiplePrimaryKeys,
                    format!(
                        "entity '{}' declares a composite key over {} fields; it becomes a surrogate key plus a unique key",
                        entity.name, pk_count
                    ),
                )
                .at_line(entity.line)
                .about(entity.name.clone()),
            );
        }
    }
    out
}

pub fn check_self_references(graph: &ErdGraph) -> Vec<Diagnostic> {
    graph
        .relationships
        .iter()
        .filter(|r| r.is_self_reference())
        .map(|r| {
            Diagnostic::warning(
                DiagnosticCode::SelfReference,
                format!("'{}' references itself ({})", r.source, r.label),
            )
            .at_line(r.line)
            .about(r.source.clone())
        })
        .collect()
}

/// An entity may have at most one owning (parental) parent
pub fn check_parental_relationships(graph: &ErdGraph) -> Vec<Diagnostic> {
    let mut parents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for rel in graph
        .relationships
        .iter()
        .filter(|r| r.ownership == Ownership::Parental)
    {
        parents
            .entry(rel.target.as_str())
            .or_default()
            .push(rel.source.as_str());
    }

    parents
        .into_iter()
        .filter(|(_, sources)| sources.len() > 1)
        .map(|(child, sources)| {
            Diagnostic::error(
                DiagnosticCode::MultipleParentalRelationships,
                format!(
                    "'{}' has more than one parental relationship ({})",
                    child,
                    sources.join(", ")
                ),
            )
            .about(child)
        })
        .collect()
}

pub fn check_orphans(graph: &ErdGraph) -> Vec<Diagnostic> {
    graph
        .entities
        .iter()
        .filter(|e| graph.relationships_for(&e.name).next().is_none())
        .map(|e| {
            Diagnostic::warning(
                DiagnosticCode::OrphanedEntity,
                format!("entity '{}' takes part in no relationship", e.name),
            )
            .at_line(e.line)
            .about(e.name.clone())
        })
        .collect()
}

/// Names that normalize to the same technical identifier cannot coexist
pub fn check_naming_collisions(graph: &ErdGraph) -> Vec<Diagnostic> {
    let mut out = Vec::new();

    let mut seen: BTreeMap<String, &str> = BTreeMap::new();
    for entity in &graph.entities {
        let key = normalize_key(&entity.name);
        if key.is_empty() {
            out.push(
                Diagnostic::error(
                    DiagnosticCode::NamingCollision,
                    format!(
                        "entity '{}' has no letters or digits to build a technical name from",
                        entity.name
                    ),
                )
                .at_line(entity.line)
                .about(entity.name.clone()),
            );
            continue;
        }
        match seen.get(&key) {
            Some(first) => out.push(
                Diagnostic::error(
                    DiagnosticCode::NamingCollision,
                    format!(
                        "entities '{}' and '{}' both normalize to '{}'",
                        first, entity.name, key
                    ),
                )
                .at_line(entity.line)
                .about(entity.name.clone()),
            ),
            None => {
                seen.insert(key, entity.name.as_str());
            }
        }

        let mut fields: BTreeMap<String, &str> = BTreeMap::new();
        for field in &entity.fields {
            let key = normalize_key(&field.name);
            if let Some(first) = fields.get(&key) {
                out.push(
                    Diagnostic::error(
                        DiagnosticCode::NamingCollision,
                        format!(
                            "fields '{}' and '{}' in '{}' both normalize to '{}'",
                            first, field.name, entity.name, key
                        ),
                    )
                    .at_line(field.line)
                    .about(entity.name.clone()),
                );
            } else {
                fields.insert(key, field.name.as_str());
            }
        }
    }
    out
}

pub fn check_foreign_keys(graph: &ErdGraph) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    for entity in &graph.entities {
        for field in entity.foreign_keys() {
            if graph.foreign_key_target(&entity.name, field).is_none() {
                out.push(
                    Diagnostic::warning(
                        DiagnosticCode::UnresolvedForeignKey,
                        format!(
                            "foreign key '{}.{}' does not name a known entity",
                            entity.name, field.name
                        ),
                    )
                    .at_line(field.line)
                    .about(entity.name.clone()),
                );
            }
        }
    }
    out
}

// =============================================================================
// Tests
// =============================================================================
