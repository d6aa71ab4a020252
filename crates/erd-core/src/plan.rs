//! Deployment plan
//!
//! The generator's output and the orchestrator's input. Every object carries a
//! deterministic [`ExternalKey`] built from its technical name, so two plans
//! generated from the same diagram and naming configuration compare equal and
//! existence checks against the platform find objects created by earlier runs.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// OBJECT IDENTITY
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Publisher,
    Solution,
    ChoiceSet,
    Entity,
    Column,
    Relationship,
    AlternateKey,
    SolutionComponent,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Publisher => "publisher",
            ObjectKind::Solution => "solution",
            ObjectKind::ChoiceSet => "choice_set",
            ObjectKind::Entity => "entity",
            ObjectKind::Column => "column",
            ObjectKind::Relationship => "relationship",
            ObjectKind::AlternateKey => "alternate_key",
            ObjectKind::SolutionComponent => "solution_component",
        }
    }

    /// Platform solution component type code, for kinds that are added to a solution
    pub fn component_type(&self) -> Option<u32> {
        match self {
            ObjectKind::Entity => Some(1),
            ObjectKind::ChoiceSet => Some(9),
            ObjectKind::Relationship => Some(10),
            ObjectKind::AlternateKey => Some(14),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identity of a planned object: its kind plus technical name
///
/// Columns and keys are qualified by their entity (`cr1_order.cr1_total`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExternalKey {
    pub kind: ObjectKind,
    pub name: String,
}

impl ExternalKey {
    pub fn new(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ExternalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

// =============================================================================
// PACKAGING
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherSpec {
    pub unique_name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub customization_prefix: String,
    pub option_value_prefix: u32,
}

impl PublisherSpec {
    pub fn external_key(&self) -> ExternalKey {
        ExternalKey::new(ObjectKind::Publisher, &self.unique_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionSpec {
    pub unique_name: String,
    pub display_name: String,
    pub version: String,
    pub description: Option<String>,
    pub publisher_unique_name: String,
}

impl SolutionSpec {
    pub fn external_key(&self) -> ExternalKey {
        ExternalKey::new(ObjectKind::Solution, &self.unique_name)
    }
}

// =============================================================================
// ATTRIBUTES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StringFormat {
    Text,
    Email,
    Phone,
    Url,
}

/// Platform attribute metadata kind
///
/// Every diagram field type maps to exactly one variant; `Choice` is only
/// produced when a field's type names a merged choice set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeKind {
    String { max_length: u32, format: StringFormat },
    Memo { max_length: u32 },
    Integer,
    Decimal { precision: u32 },
    Double { precision: u32 },
    Boolean,
    DateTime { date_only: bool },
    Money { precision: u32 },
    AutoNumber { format: String },
    File,
    Image,
    Choice { choice_set: String },
}

impl AttributeKind {
    /// Platform attribute type name
    pub fn metadata_kind(&self) -> &'static str {
        match self {
            AttributeKind::String { .. } | AttributeKind::AutoNumber { .. } => "String",
            AttributeKind::Memo { .. } => "Memo",
            AttributeKind::Integer => "Integer",
            AttributeKind::Decimal { .. } => "Decimal",
            AttributeKind::Double { .. } => "Double",
            AttributeKind::Boolean => "Boolean",
            AttributeKind::DateTime { .. } => "DateTime",
            AttributeKind::Money { .. } => "Money",
            AttributeKind::File => "File",
            AttributeKind::Image => "Image",
            AttributeKind::Choice { .. } => "Picklist",
        }
    }

    /// Kinds the platform accepts as alternate key members
    pub fn can_back_key(&self) -> bool {
        matches!(
            self,
            AttributeKind::String { .. }
                | AttributeKind::Integer
                | AttributeKind::Decimal { .. }
                | AttributeKind::DateTime { .. }
                | AttributeKind::Choice { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub schema_name: String,
    pub logical_name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub kind: AttributeKind,
    pub required: bool,
    /// Diagram field this column came from; `None` when synthesized
    pub source_field: Option<String>,
}

impl ColumnSpec {
    pub fn external_key(&self, entity_logical_name: &str) -> ExternalKey {
        ExternalKey::new(
            ObjectKind::Column,
            format!("{}.{}", entity_logical_name, self.logical_name),
        )
    }
}

// =============================================================================
// ENTITIES AND CHOICE SETS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySpec {
    /// Entity name as written in the diagram (or synthesized junction name)
    pub source_name: String,
    pub schema_name: String,
    pub logical_name: String,
    pub display_name: String,
    pub collection_name: String,
    pub description: Option<String>,
    /// Platform-managed unique identifier attribute
    pub primary_id: String,
    /// Created together with the entity
    pub primary_name: ColumnSpec,
    /// Created after the entity, in order
    pub columns: Vec<ColumnSpec>,
    pub is_junction: bool,
    /// Not declared in the diagram; introduced by many-to-many lowering
    pub synthesized: bool,
    /// No declared primary key; the platform id is the only identity
    pub surrogate_key: bool,
}

impl EntitySpec {
    pub fn external_key(&self) -> ExternalKey {
        ExternalKey::new(ObjectKind::Entity, &self.logical_name)
    }

    pub fn column(&self, logical_name: &str) -> Option<&ColumnSpec> {
        std::iter::once(&self.primary_name)
            .chain(self.columns.iter())
            .find(|c| c.logical_name == logical_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSpec {
    pub value: i32,
    pub label: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceSetSpec {
    /// Global option set name (`prefix_name`, lower-cased)
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub options: Vec<OptionSpec>,
}

impl ChoiceSetSpec {
    pub fn external_key(&self) -> ExternalKey {
        ExternalKey::new(ObjectKind::ChoiceSet, &self.name)
    }
}

// =============================================================================
// RELATIONSHIPS AND KEYS
// =============================================================================

/// Delete behavior of a one-to-many relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CascadeBehavior {
    /// Deleting the parent clears the lookup on children
    Referential,
    /// Deleting the parent deletes children
    Parental,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupSpec {
    pub schema_name: String,
    pub logical_name: String,
    pub display_name: String,
    pub required: bool,
}

/// One-to-many relationship; many-to-many never reaches a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipSpec {
    pub schema_name: String,
    /// Parent entity logical name
    pub referenced_entity: String,
    /// Parent primary id attribute
    pub referenced_attribute: String,
    /// Child entity logical name
    pub referencing_entity: String,
    pub lookup: LookupSpec,
    pub cascade: CascadeBehavior,
    pub label: String,
}

impl RelationshipSpec {
    pub fn external_key(&self) -> ExternalKey {
        ExternalKey::new(ObjectKind::Relationship, &self.schema_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternateKeySpec {
    pub schema_name: String,
    pub logical_name: String,
    pub display_name: String,
    pub entity_logical_name: String,
    /// Column or lookup logical names
    pub key_attributes: Vec<String>,
}

impl AlternateKeySpec {
    pub fn external_key(&self) -> ExternalKey {
        ExternalKey::new(
            ObjectKind::AlternateKey,
            format!("{}.{}", self.entity_logical_name, self.logical_name),
        )
    }
}

// =============================================================================
// PLAN
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    pub publisher: PublisherSpec,
    pub solution: SolutionSpec,
    pub choice_sets: Vec<ChoiceSetSpec>,
    pub entities: Vec<EntitySpec>,
    pub relationships: Vec<RelationshipSpec>,
    pub alternate_keys: Vec<AlternateKeySpec>,
}

impl DeploymentPlan {
    pub fn entity(&self, logical_name: &str) -> Option<&EntitySpec> {
        self.entities.iter().find(|e| e.logical_name == logical_name)
    }

    pub fn junctions(&self) -> impl Iterator<Item = &EntitySpec> {
        self.entities.iter().filter(|e| e.is_junction)
    }

    /// Number of remote objects the plan creates, excluding solution components
    pub fn object_count(&self) -> usize {
        2 + self.choice_sets.len()
            + self.entities.len()
            + self.entities.iter().map(|e| e.columns.len()).sum::<usize>()
            + self.relationships.len()
            + self.alternate_keys.len()
    }

    /// Every object identity in deployment stage order
    pub fn external_keys(&self) -> Vec<ExternalKey> {
        let mut keys = vec![self.publisher.external_key(), self.solution.external_key()];
        keys.extend(self.choice_sets.iter().map(ChoiceSetSpec::external_key));
        for entity in &self.entities {
            keys.push(entity.external_key());
            keys.extend(
                entity
                    .columns
                    .iter()
                    .map(|c| c.external_key(&entity.logical_name)),
            );
        }
        keys.extend(self.relationships.iter().map(RelationshipSpec::external_key));
        keys.extend(self.alternate_keys.iter().map(AlternateKeySpec::external_key));
        keys
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
