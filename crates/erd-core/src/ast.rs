//! Entity/relationship graph
//!
//! The parser produces an [`ErdGraph`] once per run. Validation and
//! generation only read it; nothing in the pipeline mutates a graph after
//! parsing except [`ErdGraph::merge_choice_sets`], which runs before
//! generation.
//!
//! ```text
//! Source → Parser → ErdGraph ─→ Validator → ValidationReport
//!                      │
//!                      └─→ Generator (+ ChoiceSetDefs, NamingConfig) → DeploymentPlan
//! ```

use serde::{Deserialize, Serialize};

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::naming::normalize_key;

// =============================================================================
// FIELD TYPES
// =============================================================================

/// Semantic type of a diagram field
///
/// Unknown type tokens are kept verbatim in [`FieldType::Other`]; whether they
/// name a choice set or fall back to text is decided at generation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FieldType {
    String { max_length: Option<u32> },
    Text,
    Email,
    Phone,
    Url,
    Integer,
    Decimal,
    Float,
    Boolean,
    Date,
    DateTime,
    Money,
    Guid,
    AutoNumber,
    File,
    Image,
    Other(String),
}

impl FieldType {
    /// Classify a raw diagram type token such as `varchar(255)` or `datetime`
    pub fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim();
        let (base, param) = match trimmed.find('(') {
            Some(open) => {
                let inner = trimmed[open + 1..].trim_end_matches(')');
                (&trimmed[..open], inner.split(',').next().map(str::trim))
            }
            None => (trimmed, None),
        };
        let length = param.and_then(|p| p.parse::<u32>().ok());

        match base.to_ascii_lowercase().as_str() {
            "string" | "str" | "varchar" | "nvarchar" | "char" | "nchar" => {
                FieldType::String { max_length: length }
            }
            "text" | "longtext" | "mediumtext" | "memo" | "multiline" | "clob" => FieldType::Text,
            "email" => FieldType::Email,
            "phone" | "tel" | "telephone" => FieldType::Phone,
            "url" | "uri" | "link" => FieldType::Url,
            "int" | "integer" | "smallint" | "tinyint" | "bigint" | "long" | "number" => {
                FieldType::Integer
            }
            "decimal" | "numeric" => FieldType::Decimal,
            "float" | "double" | "real" => FieldType::Float,
            "bool" | "boolean" | "bit" => FieldType::Boolean,
            "date" => FieldType::Date,
            "datetime" | "datetime2" | "timestamp" | "time" => FieldType::DateTime,
            "money" | "currency" => FieldType::Money,
            "guid" | "uuid" | "uniqueidentifier" => FieldType::Guid,
            "autonumber" | "serial" => FieldType::AutoNumber,
            "file" | "blob" | "attachment" => FieldType::File,
            "image" | "picture" | "photo" => FieldType::Image,
            _ => FieldType::Other(trimmed.to_string()),
        }
    }

    /// Types that can back a primary name column
    pub fn is_text_like(&self) -> bool {
        matches!(
            self,
            FieldType::String { .. }
                | FieldType::Text
                | FieldType::Email
                | FieldType::Phone
                | FieldType::Url
        )
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, FieldType::Other(_))
    }
}

/// Key and nullability markers on a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Constraint {
    PrimaryKey,
    ForeignKey,
    Unique,
    NotNull,
}

impl Constraint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Constraint::PrimaryKey => "PK",
            Constraint::ForeignKey => "FK",
            Constraint::Unique => "UK",
            Constraint::NotNull => "NOT NULL",
        }
    }
}

// =============================================================================
// ENTITIES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    /// Type token exactly as written in the diagram
    pub raw_type: String,
    pub field_type: FieldType,
    pub constraints: Vec<Constraint>,
    pub description: Option<String>,
    pub line: u32,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, raw_type: impl Into<String>) -> Self {
        let raw_type = raw_type.into();
        Self {
            name: name.into(),
            field_type: FieldType::from_raw(&raw_type),
            raw_type,
            constraints: Vec::new(),
            description: None,
            line: 0,
        }
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        if !self.constraints.contains(&constraint) {
            self.constraints.push(constraint);
        }
        self
    }

    pub fn has(&self, constraint: Constraint) -> bool {
        self.constraints.contains(&constraint)
    }

    pub fn is_primary_key(&self) -> bool {
        self.has(Constraint::PrimaryKey)
    }

    pub fn is_foreign_key(&self) -> bool {
        self.has(Constraint::ForeignKey)
    }

    pub fn is_unique(&self) -> bool {
        self.has(Constraint::Unique)
    }

    /// PK and NOT NULL fields are required on the platform
    pub fn is_required(&self) -> bool {
        self.has(Constraint::NotNull) || self.is_primary_key()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
    /// Foreign keys reference two or more distinct other entities
    pub is_junction_candidate: bool,
    /// Declared only by appearing in a relationship line
    pub implicit: bool,
    pub line: u32,
}

impl EntityDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            is_junction_candidate: false,
            implicit: false,
            line: 0,
        }
    }

    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn primary_keys(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.is_primary_key())
    }

    pub fn has_primary_key(&self) -> bool {
        self.fields.iter().any(FieldDef::is_primary_key)
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.is_foreign_key())
    }

    /// Fields that are neither primary nor foreign keys
    pub fn business_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields
            .iter()
            .filter(|f| !f.is_primary_key() && !f.is_foreign_key())
    }
}

// =============================================================================
// RELATIONSHIPS
// =============================================================================

/// Every diagram cardinality collapses to one of these two classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    OneToMany,
    ManyToMany,
}

/// Ownership class of a relationship
///
/// The diagram grammar only yields referential links; `Parental` exists so the
/// validator's parental-relationship check has something to count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Ownership {
    #[default]
    Referential,
    Parental,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDef {
    /// The "one" side (parent) for one-to-many
    pub source: String,
    /// The "many" side (child) for one-to-many
    pub target: String,
    pub cardinality: Cardinality,
    pub label: String,
    pub ownership: Ownership,
    /// Solid (`--`) rather than dashed (`..`) line
    pub identifying: bool,
    pub line: u32,
}

impl RelationshipDef {
    pub fn one_to_many(
        source: impl Into<String>,
        target: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            cardinality: Cardinality::OneToMany,
            label: label.into(),
            ownership: Ownership::Referential,
            identifying: true,
            line: 0,
        }
    }

    pub fn many_to_many(
        source: impl Into<String>,
        target: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            cardinality: Cardinality::ManyToMany,
            ..Self::one_to_many(source, target, label)
        }
    }

    pub fn is_self_reference(&self) -> bool {
        self.source == self.target
    }

    pub fn touches(&self, entity: &str) -> bool {
        self.source == entity || self.target == entity
    }
}

// =============================================================================
// CHOICE SETS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    /// Auto-assigned sequentially at generation time when absent
    pub value: Option<i32>,
    pub label: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceSetDef {
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub options: Vec<ChoiceOption>,
}

// =============================================================================
// GRAPH
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ErdGraph {
    pub entities: Vec<EntityDef>,
    pub relationships: Vec<RelationshipDef>,
    pub choice_sets: Vec<ChoiceSetDef>,
}

impl ErdGraph {
    pub fn entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.iter().find(|e| e.name == name)
    }

    pub fn relationships_for<'a>(
        &'a self,
        entity: &'a str,
    ) -> impl Iterator<Item = &'a RelationshipDef> + 'a {
        self.relationships.iter().filter(move |r| r.touches(entity))
    }

    pub fn choice_set(&self, name: &str) -> Option<&ChoiceSetDef> {
        let key = normalize_key(name);
        self.choice_sets
            .iter()
            .find(|c| normalize_key(&c.name) == key)
    }

    /// Entity a foreign-key field points at, matched by name
    ///
    /// `customer_id`, `customerId` and `CustomerID` all resolve to an entity
    /// named `Customer`. A field named exactly like an entity also matches.
    pub fn foreign_key_target(&self, owner: &str, field: &FieldDef) -> Option<&EntityDef> {
        let key = normalize_key(&field.name);
        let stem = key.strip_suffix("id").unwrap_or(&key);
        if stem.is_empty() {
            return None;
        }
        self.entities
            .iter()
            .find(|e| e.name != owner && normalize_key(&e.name) == stem)
            .or_else(|| {
                self.entities
                    .iter()
                    .find(|e| e.name == owner && normalize_key(&e.name) == stem)
            })
    }

    /// Distinct entities referenced by an entity's foreign keys, in field order
    pub fn foreign_key_targets(&self, entity: &EntityDef) -> Vec<&str> {
        let mut targets: Vec<&str> = Vec::new();
        for field in entity.foreign_keys() {
            if let Some(target) = self.foreign_key_target(&entity.name, field) {
                if target.name != entity.name && !targets.contains(&target.name.as_str()) {
                    targets.push(target.name.as_str());
                }
            }
        }
        targets
    }

    /// Recompute `is_junction_candidate` for every entity
    pub fn mark_junction_candidates(&mut self) {
        let flags: Vec<bool> = self
            .entities
            .iter()
            .map(|e| self.foreign_key_targets(e).len() >= 2)
            .collect();
        for (entity, flag) in self.entities.iter_mut().zip(flags) {
            entity.is_junction_candidate = flag;
        }
    }

    /// Merge side-document choice sets by name; later definitions replace earlier ones
    pub fn merge_choice_sets(
        &mut self,
        choice_sets: impl IntoIterator<Item = ChoiceSetDef>,
    ) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for incoming in choice_sets {
            let key = normalize_key(&incoming.name);
            match self
                .choice_sets
                .iter_mut()
                .find(|c| normalize_key(&c.name) == key)
            {
                Some(existing) => {
                    diagnostics.push(
                        Diagnostic::warning(
                            DiagnosticCode::ChoiceSetOverridden,
                            format!(
                                "choice set '{}' replaces an earlier definition",
                                incoming.name
                            ),
                        )
                        .about(incoming.name.clone()),
                    );
                    *existing = incoming;
                }
                None => self.choice_sets.push(incoming),
            }
        }
        diagnostics
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_from_raw() {
        assert_eq!(
            FieldType::from_raw("varchar(255)"),
            FieldType::String {
                max_length: Some(255)
            }
        );
        assert_eq!(
            FieldType::from_raw("string"),
            FieldType::String { max_length: None }
        );
        assert_eq!(FieldType::from_raw("DateTime"), FieldType::DateTime);
        assert_eq!(FieldType::from_raw("decimal(10,2)"), FieldType::Decimal);
        assert_eq!(
            FieldType::from_raw("OrderStatus"),
            FieldType::Other("OrderStatus".to_string())
        );
    }

    #[test]
    fn test_foreign_key_target_resolution() {
        let graph = ErdGraph {
            entities: vec![
                EntityDef::new("Customer"),
                EntityDef::new("Order").with_field(
                    FieldDef::new("customer_id", "string").with_constraint(Constraint::ForeignKey),
                ),
            ],
            ..Default::default()
        };
        let order = graph.entity("Order").unwrap();
        let fk = order.field("customer_id").unwrap();
        assert_eq!(
            graph.foreign_key_target("Order", fk).map(|e| e.name.as_str()),
            Some("Customer")
        );
    }

    #[test]
    fn test_junction_candidate_marking() {
        let mut graph = ErdGraph {
            entities: vec![
                EntityDef::new("Student"),
                EntityDef::new("Course"),
                EntityDef::new("Enrollment")
                    .with_field(
                        FieldDef::new("studentId", "string").with_constraint(Constraint::ForeignKey),
                    )
                    .with_field(
                        FieldDef::new("courseId", "string").with_constraint(Constraint::ForeignKey),
                    ),
            ],
            ..Default::default()
        };
        graph.mark_junction_candidates();
        assert!(graph.entity("Enrollment").unwrap().is_junction_candidate);
        assert!(!graph.entity("Student").unwrap().is_junction_candidate);
    }

    #[test]
    fn test_merge_choice_sets_last_wins() {
        let mut graph = ErdGraph::default();
        let first = ChoiceSetDef {
            name: "Order Status".into(),
            display_name: "Order Status".into(),
            description: None,
            options: vec![],
        };
        let second = ChoiceSetDef {
            name: "order_status".into(),
            display_name: "Status".into(),
            description: None,
            options: vec![],
        };
        assert!(graph.merge_choice_sets(vec![first]).is_empty());
        let diags = graph.merge_choice_sets(vec![second]);
        assert_eq!(diags.len(), 1);
        assert_eq!(graph.choice_sets.len(), 1);
        assert_eq!(graph.choice_sets[0].display_name, "Status");
        assert!(graph.choice_set("OrderStatus").is_some());
    }
}
