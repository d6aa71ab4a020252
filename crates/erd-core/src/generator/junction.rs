//! Junction detection and many-to-many lowering
//!
//! A many-to-many line between A and B never reaches the plan. It becomes two
//! one-to-many relationships A→J and B→J, where J is either an entity the
//! diagram already models as a junction or one synthesized here.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ast::{Cardinality, EntityDef, ErdGraph, RelationshipDef};
use crate::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::naming::{normalize_key, pascal_case};

/// Tunable threshold for junction detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JunctionHeuristic {
    /// Non-key fields a junction may carry (e.g. `enrolled_on`)
    pub max_descriptive_fields: usize,
}

impl Default for JunctionHeuristic {
    fn default() -> Self {
        Self {
            max_descriptive_fields: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JunctionClass {
    Regular,
    Junction {
        targets: Vec<String>,
    },
    /// References two or more entities but carries too many business fields
    Ambiguous {
        targets: Vec<String>,
        business_fields: usize,
    },
}

pub fn classify(graph: &ErdGraph, entity: &EntityDef, heuristic: &JunctionHeuristic) -> JunctionClass {
    let targets: Vec<String> = graph
        .foreign_key_targets(entity)
        .into_iter()
        .map(str::to_string)
        .collect();
    if targets.len() < 2 {
        return JunctionClass::Regular;
    }

    let business_fields = entity.business_fields().count();
    if business_fields <= heuristic.max_descriptive_fields {
        JunctionClass::Junction { targets }
    } else {
        JunctionClass::Ambiguous {
            targets,
            business_fields,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoweredEntity {
    pub def: EntityDef,
    pub is_junction: bool,
    pub synthesized: bool,
}

/// Graph with every relationship one-to-many
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoweredGraph {
    pub entities: Vec<LoweredEntity>,
    pub relationships: Vec<RelationshipDef>,
}

pub fn lower_many_to_many(
    graph: &ErdGraph,
    heuristic: &JunctionHeuristic,
    diagnostics: &mut Diagnostics,
) -> LoweredGraph {
    let classes: Vec<JunctionClass> = graph
        .entities
        .iter()
        .map(|e| classify(graph, e, heuristic))
        .collect();

    let mut lowered = LoweredGraph::default();
    for (entity, class) in graph.entities.iter().zip(&classes) {
        if let JunctionClass::Ambiguous {
            targets,
            business_fields,
        } = class
        {
            diagnostics.push(
                Diagnostic::warning(
                    DiagnosticCode::AmbiguousJunction,
                    format!(
                        "'{}' references {} but has {} business fields; kept as a regular entity",
                        entity.name,
                        targets.join(" and "),
                        business_fields
                    ),
                )
                .at_line(entity.line)
                .about(entity.name.clone()),
            );
        }
        lowered.entities.push(LoweredEntity {
            def: entity.clone(),
            is_junction: matches!(class, JunctionClass::Junction { .. }),
            synthesized: false,
        });
    }

    // Pairs the diagram already links directly; lowering never duplicates them
    let mut linked: BTreeSet<(String, String)> = graph
        .relationships
        .iter()
        .filter(|r| r.cardinality == Cardinality::OneToMany)
        .map(|r| (r.source.clone(), r.target.clone()))
        .collect();
    let mut taken: BTreeSet<String> = graph.entities.iter().map(|e| normalize_key(&e.name)).collect();

    for rel in &graph.relationships {
        if rel.cardinality == Cardinality::OneToMany {
            lowered.relationships.push(rel.clone());
            continue;
        }

        let explicit = graph
            .entities
            .iter()
            .zip(&classes)
            .find_map(|(entity, class)| match class {
                JunctionClass::Junction { targets }
                    if rel.source != rel.target
                        && targets.contains(&rel.source)
                        && targets.contains(&rel.target) =>
                {
                    Some(entity.name.clone())
                }
                _ => None,
            });

        match explicit {
            Some(junction) => {
                tracing::debug!(
                    source = %rel.source,
                    target = %rel.target,
                    junction = %junction,
                    "many-to-many routed through modelled junction"
                );
                for end in [&rel.source, &rel.target] {
                    if linked.insert((end.clone(), junction.clone())) {
                        lowered
                            .relationships
                            .push(lowered_link(end, &junction, &rel.label, rel.line));
                    }
                }
            }
            None => {
                let junction = junction_name(&rel.source, &rel.target, &mut taken);
                diagnostics.push(
                    Diagnostic::info(
                        DiagnosticCode::SynthesizedJunction,
                        format!(
                            "many-to-many '{}' between '{}' and '{}' is modelled through new entity '{}'",
                            rel.label, rel.source, rel.target, junction
                        ),
                    )
                    .at_line(rel.line)
                    .about(junction.clone()),
                );

                let mut def = EntityDef::new(junction.clone());
                def.line = rel.line;
                lowered.entities.push(LoweredEntity {
                    def,
                    is_junction: true,
                    synthesized: true,
                });

                let second_label = if rel.is_self_reference() {
                    format!("{} related", rel.label)
                } else {
                    rel.label.clone()
                };
                lowered
                    .relationships
                    .push(lowered_link(&rel.source, &junction, &rel.label, rel.line));
                lowered
                    .relationships
                    .push(lowered_link(&rel.target, &junction, &second_label, rel.line));
                linked.insert((rel.source.clone(), junction.clone()));
                linked.insert((rel.target.clone(), junction));
            }
        }
    }

    // A modelled junction is linked to every entity its foreign keys reference
    for (entity, class) in graph.entities.iter().zip(&classes) {
        if let JunctionClass::Junction { targets } = class {
            for target in targets {
                if linked.insert((target.clone(), entity.name.clone())) {
                    lowered
                        .relationships
                        .push(lowered_link(target, &entity.name, "has", entity.line));
                }
            }
        }
    }

    lowered
}

fn lowered_link(parent: &str, junction: &str, label: &str, line: u32) -> RelationshipDef {
    let mut rel = RelationshipDef::one_to_many(parent, junction, label);
    rel.line = line;
    rel
}

fn junction_name(a: &str, b: &str, taken: &mut BTreeSet<String>) -> String {
    let base = format!("{}{}", pascal_case(a), pascal_case(b));
    let mut candidate = base.clone();
    let mut n = 2;
    while taken.contains(&normalize_key(&candidate)) {
        candidate = format!("{}{}", base, n);
        n += 1;
    }
    taken.insert(normalize_key(&candidate));
    candidate
}
