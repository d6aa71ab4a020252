//! Choice-set side document
//!
//! Choice sets cannot be expressed in diagram text. They arrive as a separate
//! YAML or JSON document and are merged into the graph by name before
//! generation:
//!
//! ```yaml
//! - name: order_status
//!   displayName: Order Status
//!   options:
//!     - label: Draft
//!     - label: Submitted
//!     - { value: 100000010, label: Cancelled }
//! ```

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::ast::{ChoiceOption, ChoiceSetDef};
use crate::error::{ChoiceSetError, GenerationError};
use crate::naming::display_label;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChoiceSetDocument {
    List(Vec<ChoiceSetRecord>),
    Wrapped {
        #[serde(alias = "choice_sets", rename = "choiceSets")]
        choice_sets: Vec<ChoiceSetRecord>,
    },
}

#[derive(Debug, Deserialize)]
struct ChoiceSetRecord {
    name: String,
    #[serde(default, rename = "displayName", alias = "display_name")]
    display_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    options: Vec<OptionRecord>,
}

#[derive(Debug, Deserialize)]
struct OptionRecord {
    #[serde(default)]
    value: Option<i32>,
    label: String,
    #[serde(default)]
    description: Option<String>,
}

/// Parse a YAML (or JSON) choice-set document
pub fn parse_choice_sets(text: &str) -> Result<Vec<ChoiceSetDef>, ChoiceSetError> {
    let doc: ChoiceSetDocument = serde_yaml::from_str(text)?;
    convert(doc)
}

/// Parse a strictly-JSON choice-set document
pub fn parse_choice_sets_json(text: &str) -> Result<Vec<ChoiceSetDef>, ChoiceSetError> {
    let doc: ChoiceSetDocument = serde_json::from_str(text)?;
    convert(doc)
}

fn convert(doc: ChoiceSetDocument) -> Result<Vec<ChoiceSetDef>, ChoiceSetError> {
    let records = match doc {
        ChoiceSetDocument::List(records) => records,
        ChoiceSetDocument::Wrapped { choice_sets } => choice_sets,
    };

    records.into_iter().map(convert_record).collect()
}

fn convert_record(record: ChoiceSetRecord) -> Result<ChoiceSetDef, ChoiceSetError> {
    let invalid = |reason: &str| ChoiceSetError::Invalid {
        name: record.name.clone(),
        reason: reason.to_string(),
    };

    if record.name.trim().is_empty() {
        return Err(invalid("name is empty"));
    }
    if record.options.is_empty() {
        return Err(invalid("at least one option is required"));
    }
    if record.options.iter().any(|o| o.label.trim().is_empty()) {
        return Err(invalid("option labels may not be empty"));
    }

    let mut explicit = BTreeSet::new();
    for value in record.options.iter().filter_map(|o| o.value) {
        if !explicit.insert(value) {
            return Err(invalid(&format!("option value {} is used twice", value)));
        }
    }

    Ok(ChoiceSetDef {
        display_name: record
            .display_name
            .clone()
            .unwrap_or_else(|| display_label(&record.name)),
        description: record.description.clone(),
        options: record
            .options
            .iter()
            .map(|o| ChoiceOption {
                value: o.value,
                label: o.label.clone(),
                description: o.description.clone(),
            })
            .collect(),
        name: record.name,
    })
}

/// Fill in missing option values sequentially from `base`, skipping explicit ones
pub fn assign_option_values(
    choice_set: &ChoiceSetDef,
    base: i32,
) -> Result<Vec<(i32, ChoiceOption)>, GenerationError> {
    let mut used = BTreeSet::new();
    for value in choice_set.options.iter().filter_map(|o| o.value) {
        if !used.insert(value) {
            return Err(GenerationError::DuplicateOptionValue {
                choice_set: choice_set.name.clone(),
                value,
            });
        }
    }

    let mut next = base;
    let mut assigned = Vec::with_capacity(choice_set.options.len());
    for option in &choice_set.options {
        let value = match option.value {
            Some(v) => v,
            None => {
                while used.contains(&next) {
                    next += 1;
                }
                let v = next;
                used.insert(v);
                next += 1;
                v
            }
        };
        assigned.push((value, option.clone()));
    }
    Ok(assigned)
}

// =============================================================================
// Tests
// =============================================================================
