//! Schema generator
//!
//! Turns a validated graph, the merged choice sets, and the naming
//! configuration into a [`DeploymentPlan`]. Generation is a pure function of
//! its inputs: the same graph and configuration always produce an identical
//! plan, down to every technical name.
//!
//! Errors are scoped. A bad publisher prefix invalidates the whole plan and is
//! returned as `Err`; a naming collision or reserved choice-set name drops only
//! the affected object and is reported in [`GenerationOutput::errors`].

pub mod junction;
pub mod type_map;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ast::{ChoiceSetDef, EntityDef, ErdGraph, FieldDef, FieldType, RelationshipDef};
use crate::choice_sets::assign_option_values;
use crate::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::error::GenerationError;
use crate::naming::{
    display_label, is_reserved, logical_name, normalize_key, pascal_case, pluralize,
    primary_id_name, schema_name, NamingConfig,
};
use crate::plan::{
    AlternateKeySpec, AttributeKind, CascadeBehavior, ChoiceSetSpec, ColumnSpec, DeploymentPlan,
    EntitySpec, LookupSpec, OptionSpec, PublisherSpec, RelationshipSpec, SolutionSpec,
    StringFormat,
};

pub use junction::{classify, lower_many_to_many, JunctionClass, JunctionHeuristic};
pub use type_map::{fallback_kind, map_field_type};

use junction::LoweredEntity;
use type_map::DEFAULT_STRING_LENGTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GeneratorOptions {
    pub junction: JunctionHeuristic,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationOutput {
    pub plan: DeploymentPlan,
    /// Objects left out of the plan, one error each
    pub errors: Vec<GenerationError>,
    pub diagnostics: Diagnostics,
}

impl GenerationOutput {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Build a deployment plan
pub fn generate(
    graph: &ErdGraph,
    choice_sets: &[ChoiceSetDef],
    naming: &NamingConfig,
    options: &GeneratorOptions,
) -> Result<GenerationOutput, GenerationError> {
    naming.validate()?;
    let publisher = publisher_spec(naming)?;
    let solution = solution_spec(naming, &publisher)?;

    let mut merged = graph.clone();
    let mut generator = Generator {
        prefix: &naming.publisher_prefix,
        errors: Vec::new(),
        diagnostics: Diagnostics::new(),
    };
    generator
        .diagnostics
        .extend(merged.merge_choice_sets(choice_sets.iter().cloned()));

    let (choice_set_specs, choice_index) = generator.choice_sets(&merged, naming);
    let lowered =
        junction::lower_many_to_many(&merged, &options.junction, &mut generator.diagnostics);
    let mut builds = generator.entities(&lowered.entities, &choice_index);
    let relationships = generator.relationships(&merged, &lowered.relationships, &mut builds);
    generator.unbound_foreign_keys(&builds);
    let alternate_keys = generator.alternate_keys(&builds);

    let plan = DeploymentPlan {
        publisher,
        solution,
        choice_sets: choice_set_specs,
        entities: builds.into_iter().map(|b| b.spec).collect(),
        relationships,
        alternate_keys,
    };

    tracing::info!(
        entities = plan.entities.len(),
        relationships = plan.relationships.len(),
        choice_sets = plan.choice_sets.len(),
        alternate_keys = plan.alternate_keys.len(),
        errors = generator.errors.len(),
        "generated deployment plan"
    );

    Ok(GenerationOutput {
        plan,
        errors: generator.errors,
        diagnostics: generator.diagnostics,
    })
}

fn publisher_spec(naming: &NamingConfig) -> Result<PublisherSpec, GenerationError> {
    Ok(PublisherSpec {
        unique_name: unique_name(&naming.publisher_display_name)?,
        display_name: naming.publisher_display_name.clone(),
        description: naming.publisher_description.clone(),
        customization_prefix: naming.publisher_prefix.clone(),
        option_value_prefix: naming.option_value_prefix,
    })
}

fn solution_spec(
    naming: &NamingConfig,
    publisher: &PublisherSpec,
) -> Result<SolutionSpec, GenerationError> {
    Ok(SolutionSpec {
        unique_name: unique_name(&naming.solution_display_name)?,
        display_name: naming.solution_display_name.clone(),
        version: naming.solution_version.clone(),
        description: naming.solution_description.clone(),
        publisher_unique_name: publisher.unique_name.clone(),
    })
}

/// Publisher and solution unique names carry no prefix
fn unique_name(display: &str) -> Result<String, GenerationError> {
    let pascal = pascal_case(display);
    if pascal.is_empty() {
        return Err(GenerationError::EmptyTechnicalName {
            display: display.to_string(),
        });
    }
    // Prefixed names always start with the prefix letter; these do not
    if pascal.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(GenerationError::LeadingDigit {
            display: display.to_string(),
            technical: pascal,
        });
    }
    Ok(pascal)
}

// =============================================================================
// GENERATOR STATE
// =============================================================================

/// How an entity's declared primary key is carried onto the platform
#[derive(Debug, Clone, PartialEq, Eq)]
enum PrimaryKeyPlan {
    /// No declared key
    Surrogate,
    /// Single GUID key becomes the platform id itself
    PlatformId(String),
    /// Declared key fields, enforced with an alternate key
    Members(Vec<String>),
}

struct EntityBuild {
    spec: EntitySpec,
    def: EntityDef,
    pk: PrimaryKeyPlan,
    /// Logical name → what claimed it
    taken: BTreeMap<String, String>,
    /// FK field name → lookup logical name
    fk_lookups: BTreeMap<String, String>,
    lookups: Vec<String>,
}

struct Generator<'a> {
    prefix: &'a str,
    errors: Vec<GenerationError>,
    diagnostics: Diagnostics,
}

impl<'a> Generator<'a> {
    // =========================================================================
    // CHOICE SETS
    // =========================================================================

    fn choice_sets(
        &mut self,
        graph: &ErdGraph,
        naming: &NamingConfig,
    ) -> (Vec<ChoiceSetSpec>, BTreeMap<String, String>) {
        let base = naming.option_value_prefix as i32 * 10_000;
        let mut specs = Vec::new();
        let mut index = BTreeMap::new();

        for choice_set in &graph.choice_sets {
            let key = normalize_key(&choice_set.name);
            if is_reserved(&key) {
                self.errors.push(GenerationError::ReservedName {
                    name: choice_set.name.clone(),
                    technical: key,
                });
                continue;
            }
            let name = match logical_name(self.prefix, &choice_set.name) {
                Ok(name) => name,
                Err(e) => {
                    self.errors.push(e);
                    continue;
                }
            };
            let options = match assign_option_values(choice_set, base) {
                Ok(options) => options,
                Err(e) => {
                    self.errors.push(e);
                    continue;
                }
            };

            index.insert(key, name.clone());
            specs.push(ChoiceSetSpec {
                name,
                display_name: choice_set.display_name.clone(),
                description: choice_set.description.clone(),
                options: options
                    .into_iter()
                    .map(|(value, option)| OptionSpec {
                        value,
                        label: option.label,
                        description: option.description,
                    })
                    .collect(),
            });
        }
        (specs, index)
    }

    // =========================================================================
    // ENTITIES AND COLUMNS
    // =========================================================================

    fn entities(
        &mut self,
        entities: &[LoweredEntity],
        choice_index: &BTreeMap<String, String>,
    ) -> Vec<EntityBuild> {
        let mut seen: BTreeMap<String, String> = BTreeMap::new();
        let mut builds = Vec::new();

        for lowered in entities {
            let def = &lowered.def;
            let schema = match schema_name(self.prefix, &def.name) {
                Ok(s) => s,
                Err(e) => {
                    self.errors.push(e);
                    continue;
                }
            };
            let logical = schema.to_ascii_lowercase();
            if let Some(first) = seen.get(&logical) {
                self.errors.push(GenerationError::NamingCollision {
                    scope: "entities".to_string(),
                    first: first.clone(),
                    second: def.name.clone(),
                    technical: logical,
                });
                continue;
            }
            seen.insert(logical.clone(), def.name.clone());

            builds.push(self.entity(lowered, schema, logical, choice_index));
        }
        builds
    }

    fn entity(
        &mut self,
        lowered: &LoweredEntity,
        schema: String,
        logical: String,
        choice_index: &BTreeMap<String, String>,
    ) -> EntityBuild {
        let def = &lowered.def;
        let primary_id = primary_id_name(&logical);
        let mut taken = BTreeMap::new();
        taken.insert(primary_id.clone(), "primary id".to_string());

        let pks: Vec<&FieldDef> = def.primary_keys().collect();
        let pk = match pks.as_slice() {
            [] => PrimaryKeyPlan::Surrogate,
            [only] if only.field_type == FieldType::Guid && !only.is_foreign_key() => {
                PrimaryKeyPlan::PlatformId(only.name.clone())
            }
            many => PrimaryKeyPlan::Members(many.iter().map(|f| f.name.clone()).collect()),
        };

        let primary_name = self.primary_name_column(def, &pk, &primary_id, &mut taken);

        let mut columns = Vec::new();
        for field in &def.fields {
            let is_name_source = primary_name.source_field.as_deref() == Some(field.name.as_str());
            let is_platform_id = matches!(&pk, PrimaryKeyPlan::PlatformId(f) if *f == field.name);
            if is_name_source || is_platform_id || field.is_foreign_key() {
                continue;
            }

            let kind = self.column_kind(def, field, choice_index);
            let schema = match self.column_schema(field, &primary_id) {
                Ok(s) => s,
                Err(e) => {
                    self.errors.push(e);
                    continue;
                }
            };
            let column_logical = schema.to_ascii_lowercase();
            if let Some(first) = taken.get(&column_logical) {
                self.errors.push(GenerationError::NamingCollision {
                    scope: format!("columns of '{}'", def.name),
                    first: first.clone(),
                    second: field.name.clone(),
                    technical: column_logical,
                });
                continue;
            }
            taken.insert(column_logical.clone(), field.name.clone());

            columns.push(ColumnSpec {
                schema_name: schema,
                logical_name: column_logical,
                display_name: display_label(&field.name),
                description: field.description.clone(),
                kind,
                required: field.is_required(),
                source_field: Some(field.name.clone()),
            });
        }

        let display_name = display_label(&def.name);
        let spec = EntitySpec {
            source_name: def.name.clone(),
            collection_name: pluralize(&display_name),
            display_name,
            description: lowered
                .synthesized
                .then(|| "Links the two sides of a many-to-many relationship".to_string()),
            schema_name: schema,
            logical_name: logical,
            primary_id,
            primary_name,
            columns,
            is_junction: lowered.is_junction,
            synthesized: lowered.synthesized,
            surrogate_key: pk == PrimaryKeyPlan::Surrogate,
        };

        EntityBuild {
            spec,
            def: def.clone(),
            pk,
            taken,
            fk_lookups: BTreeMap::new(),
            lookups: Vec::new(),
        }
    }

    /// First text PK, else first plain text field, else a synthesized `name`.
    /// A candidate with an unusable or taken name is passed over; the column
    /// loop reports it.
    fn primary_name_column(
        &self,
        def: &EntityDef,
        pk: &PrimaryKeyPlan,
        primary_id: &str,
        taken: &mut BTreeMap<String, String>,
    ) -> ColumnSpec {
        let key_fields = def
            .primary_keys()
            .filter(|_| !matches!(pk, PrimaryKeyPlan::PlatformId(_)))
            .filter(|f| !f.is_foreign_key() && can_name_records(f));
        let plain_fields = def.business_fields().filter(|f| can_name_records(f));

        for field in key_fields.chain(plain_fields) {
            let Ok(schema) = self.column_schema(field, primary_id) else {
                continue;
            };
            let logical = schema.to_ascii_lowercase();
            if taken.contains_key(&logical) {
                continue;
            }
            let max_length = match map_field_type(&field.field_type) {
                AttributeKind::String { max_length, .. } => max_length,
                _ => DEFAULT_STRING_LENGTH,
            };
            taken.insert(logical.clone(), field.name.clone());
            return ColumnSpec {
                schema_name: schema,
                logical_name: logical,
                display_name: display_label(&field.name),
                description: field.description.clone(),
                kind: AttributeKind::String {
                    max_length,
                    format: StringFormat::Text,
                },
                required: field.is_required(),
                source_field: Some(field.name.clone()),
            };
        }

        let schema = format!("{}_Name", self.prefix);
        let logical = schema.to_ascii_lowercase();
        taken.insert(logical.clone(), "primary name".to_string());
        ColumnSpec {
            schema_name: schema,
            logical_name: logical,
            display_name: "Name".to_string(),
            description: None,
            kind: AttributeKind::String {
                max_length: DEFAULT_STRING_LENGTH,
                format: StringFormat::Text,
            },
            required: false,
            source_field: None,
        }
    }

    /// Column schema name for a field. A field that lands on the entity's own
    /// id attribute (`customer_id` in `Customer`) takes a `Key` suffix.
    fn column_schema(&self, field: &FieldDef, primary_id: &str) -> Result<String, GenerationError> {
        let schema = schema_name(self.prefix, &field.name)?;
        if schema.eq_ignore_ascii_case(primary_id) {
            return Ok(format!("{}Key", schema));
        }
        Ok(schema)
    }

    fn column_kind(
        &mut self,
        def: &EntityDef,
        field: &FieldDef,
        choice_index: &BTreeMap<String, String>,
    ) -> AttributeKind {
        match &field.field_type {
            FieldType::Other(raw) => match choice_index.get(&normalize_key(raw)) {
                Some(choice_set) => AttributeKind::Choice {
                    choice_set: choice_set.clone(),
                },
                None => {
                    self.diagnostics.push(
                        Diagnostic::warning(
                            DiagnosticCode::UnknownFieldType,
                            format!(
                                "'{}.{}' has unknown type '{}'; created as text",
                                def.name, field.name, raw
                            ),
                        )
                        .at_line(field.line)
                        .about(def.name.clone()),
                    );
                    fallback_kind()
                }
            },
            other => map_field_type(other),
        }
    }

    // =========================================================================
    // RELATIONSHIPS
    // =========================================================================

    fn relationships(
        &mut self,
        graph: &ErdGraph,
        relationships: &[RelationshipDef],
        builds: &mut [EntityBuild],
    ) -> Vec<RelationshipSpec> {
        let mut schemas: BTreeSet<String> = BTreeSet::new();
        let mut specs = Vec::new();

        for rel in relationships {
            let parent = builds.iter().position(|b| b.def.name == rel.source);
            let child = builds.iter().position(|b| b.def.name == rel.target);
            let (parent, child) = match (parent, child) {
                (Some(p), Some(c)) => (p, c),
                (None, _) => {
                    self.missing_endpoint(rel, &rel.source);
                    continue;
                }
                (_, None) => {
                    self.missing_endpoint(rel, &rel.target);
                    continue;
                }
            };

            let parent_pascal = pascal_case(&rel.source);
            let label_pascal = pascal_case(&rel.label);
            let referenced_entity = builds[parent].spec.logical_name.clone();
            let referenced_attribute = builds[parent].spec.primary_id.clone();

            let schema = relationship_schema_candidates(
                self.prefix,
                &parent_pascal,
                &pascal_case(&rel.target),
                &label_pascal,
            )
            .find(|candidate| !schemas.contains(&candidate.to_ascii_lowercase()))
            .unwrap_or_default();
            schemas.insert(schema.to_ascii_lowercase());

            let child_build = &mut builds[child];
            let (lookup_schema, labelled) =
                lookup_candidates(self.prefix, &parent_pascal, &label_pascal, rel.is_self_reference())
                    .find(|(candidate, _)| {
                        !child_build.taken.contains_key(&candidate.to_ascii_lowercase())
                    })
                    .unwrap_or_default();
            let lookup_logical = lookup_schema.to_ascii_lowercase();
            child_build
                .taken
                .insert(lookup_logical.clone(), format!("lookup to '{}'", rel.source));
            child_build.lookups.push(lookup_logical.clone());

            let bound_field = child_build
                .def
                .foreign_keys()
                .find(|f| {
                    !child_build.fk_lookups.contains_key(&f.name)
                        && graph
                            .foreign_key_target(&child_build.def.name, f)
                            .map_or(false, |target| target.name == rel.source)
                })
                .cloned();
            let required = bound_field.as_ref().map_or(false, FieldDef::is_required);
            if let Some(field) = bound_field {
                child_build
                    .fk_lookups
                    .insert(field.name, lookup_logical.clone());
            }

            let mut lookup_display = if rel.is_self_reference() {
                format!("Parent {}", display_label(&rel.source))
            } else {
                display_label(&rel.source)
            };
            if labelled {
                lookup_display = format!("{} ({})", lookup_display, rel.label);
            }

            tracing::debug!(
                relationship = %schema,
                parent = %referenced_entity,
                child = %child_build.spec.logical_name,
                lookup = %lookup_logical,
                "planned relationship"
            );

            specs.push(RelationshipSpec {
                schema_name: schema,
                referenced_entity,
                referenced_attribute,
                referencing_entity: child_build.spec.logical_name.clone(),
                lookup: LookupSpec {
                    schema_name: lookup_schema,
                    logical_name: lookup_logical,
                    display_name: lookup_display,
                    required,
                },
                cascade: CascadeBehavior::Referential,
                label: rel.label.clone(),
            });
        }
        specs
    }

    fn missing_endpoint(&mut self, rel: &RelationshipDef, entity: &str) {
        self.errors.push(GenerationError::MissingEndpoint {
            label: rel.label.clone(),
            entity: entity.to_string(),
        });
    }

    fn unbound_foreign_keys(&mut self, builds: &[EntityBuild]) {
        for build in builds {
            for field in build.def.foreign_keys() {
                if !build.fk_lookups.contains_key(&field.name) {
                    self.diagnostics.push(
                        Diagnostic::warning(
                            DiagnosticCode::UnboundForeignKey,
                            format!(
                                "foreign key '{}.{}' has no relationship line; no lookup is created for it",
                                build.def.name, field.name
                            ),
                        )
                        .at_line(field.line)
                        .about(build.def.name.clone()),
                    );
                }
            }
        }
    }

    // =========================================================================
    // ALTERNATE KEYS
    // =========================================================================

    fn alternate_keys(&mut self, builds: &[EntityBuild]) -> Vec<AlternateKeySpec> {
        let mut keys = Vec::new();

        for build in builds {
            let mut planned: Vec<(String, String, Vec<String>)> = Vec::new();

            if let PrimaryKeyPlan::Members(fields) = &build.pk {
                if let Some(members) = self.key_members(build, fields) {
                    planned.push(("Primary".to_string(), "Primary Key".to_string(), members));
                }
            }

            if build.spec.is_junction && build.lookups.len() >= 2 {
                planned.push((
                    "Link".to_string(),
                    "Link Key".to_string(),
                    build.lookups.clone(),
                ));
            }

            for field in build
                .def
                .fields
                .iter()
                .filter(|f| f.is_unique() && !f.is_primary_key())
            {
                if let Some(members) = self.key_members(build, std::slice::from_ref(&field.name)) {
                    planned.push((
                        pascal_case(&field.name),
                        format!("{} Key", display_label(&field.name)),
                        members,
                    ));
                }
            }

            let mut member_sets: BTreeSet<BTreeSet<String>> = BTreeSet::new();
            let mut names: BTreeSet<String> = BTreeSet::new();
            for (suffix, display, members) in planned {
                if !member_sets.insert(members.iter().cloned().collect()) {
                    continue;
                }
                let schema = format!("{}_{}Key", build.spec.schema_name, suffix);
                let logical = schema.to_ascii_lowercase();
                if !names.insert(logical.clone()) {
                    self.errors.push(GenerationError::NamingCollision {
                        scope: format!("keys of '{}'", build.def.name),
                        first: logical.clone(),
                        second: suffix,
                        technical: logical,
                    });
                    continue;
                }
                keys.push(AlternateKeySpec {
                    schema_name: schema,
                    logical_name: logical,
                    display_name: display,
                    entity_logical_name: build.spec.logical_name.clone(),
                    key_attributes: members,
                });
            }
        }
        keys
    }

    /// Resolve fields to key-capable attributes; `None` if any cannot back a key
    fn key_members(&mut self, build: &EntityBuild, fields: &[String]) -> Option<Vec<String>> {
        let mut members = Vec::with_capacity(fields.len());
        for field in fields {
            if let Some(lookup) = build.fk_lookups.get(field) {
                members.push(lookup.clone());
                continue;
            }
            let column = std::iter::once(&build.spec.primary_name)
                .chain(build.spec.columns.iter())
                .find(|c| c.source_field.as_deref() == Some(field.as_str()));
            match column {
                Some(column) if column.kind.can_back_key() => {
                    members.push(column.logical_name.clone())
                }
                _ => {
                    self.diagnostics.push(
                        Diagnostic::warning(
                            DiagnosticCode::UnsupportedKeyAttribute,
                            format!(
                                "'{}.{}' cannot be part of an alternate key; uniqueness is not enforced",
                                build.def.name, field
                            ),
                        )
                        .about(build.def.name.clone()),
                    );
                    return None;
                }
            }
        }
        Some(members)
    }
}

/// Plain string types that can hold a record's display name
fn can_name_records(field: &FieldDef) -> bool {
    field.field_type.is_text_like() && field.field_type != FieldType::Text
}

fn relationship_schema_candidates(
    prefix: &str,
    parent: &str,
    child: &str,
    label: &str,
) -> impl Iterator<Item = String> {
    let base = format!("{}_{}_{}", prefix, parent, child);
    let labelled = if label.is_empty() {
        base.clone()
    } else {
        format!("{}_{}", base, label)
    };
    std::iter::once(base)
        .chain(std::iter::once(labelled.clone()))
        .chain((2..).map(move |n| format!("{}{}", labelled, n)))
}

fn lookup_candidates(
    prefix: &str,
    parent: &str,
    label: &str,
    self_reference: bool,
) -> impl Iterator<Item = (String, bool)> {
    let base = if self_reference {
        format!("{}_Parent{}Id", prefix, parent)
    } else {
        format!("{}_{}Id", prefix, parent)
    };
    let labelled = format!("{}_{}{}Id", prefix, label, parent);
    let counted = labelled.clone();
    std::iter::once((base, false))
        .chain(std::iter::once((labelled, !label.is_empty())))
        .chain((2..).map(move |n| (format!("{}{}", counted, n), false)))
}

// =============================================================================
// Tests
// =============================================================================
