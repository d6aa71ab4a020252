//! Technical naming rules
//!
//! Every technical name is derived from a display name by a pure function:
//! strip everything that is not an ASCII letter, digit, or whitespace, split
//! on whitespace, and PascalCase-join. Entity and column identifiers are then
//! lower-cased and prefixed with the publisher prefix. Regenerating from the
//! same input always yields the same names, which is what lets deployment
//! check for existing objects before creating them.

use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// Platform names a choice set may not take
pub const RESERVED_NAMES: &[&str] = &[
    "statecode",
    "statuscode",
    "ownerid",
    "owninguser",
    "owningteam",
    "owningbusinessunit",
    "createdby",
    "createdon",
    "modifiedby",
    "modifiedon",
    "versionnumber",
    "importsequencenumber",
    "overriddencreatedon",
    "timezoneruleversionnumber",
    "utcconversiontimezonecode",
    "processid",
    "stageid",
    "traversedpath",
];

/// Naming inputs for one generation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingConfig {
    /// Customization prefix shared by every entity, column, and choice set
    pub publisher_prefix: String,
    pub publisher_display_name: String,
    #[serde(default)]
    pub publisher_description: Option<String>,
    /// Five-digit prefix for auto-assigned option values
    #[serde(default = "default_option_value_prefix")]
    pub option_value_prefix: u32,
    pub solution_display_name: String,
    #[serde(default = "default_solution_version")]
    pub solution_version: String,
    #[serde(default)]
    pub solution_description: Option<String>,
}

fn default_option_value_prefix() -> u32 {
    10000
}

fn default_solution_version() -> String {
    "1.0.0.0".to_string()
}

impl NamingConfig {
    pub fn new(
        publisher_prefix: impl Into<String>,
        publisher_display_name: impl Into<String>,
        solution_display_name: impl Into<String>,
    ) -> Self {
        Self {
            publisher_prefix: publisher_prefix.into(),
            publisher_display_name: publisher_display_name.into(),
            publisher_description: None,
            option_value_prefix: default_option_value_prefix(),
            solution_display_name: solution_display_name.into(),
            solution_version: default_solution_version(),
            solution_description: None,
        }
    }

    /// Check the plan-wide naming inputs
    pub fn validate(&self) -> Result<(), GenerationError> {
        validate_prefix(&self.publisher_prefix)?;
        if !(10000..=99999).contains(&self.option_value_prefix) {
            return Err(GenerationError::InvalidOptionValuePrefix(
                self.option_value_prefix,
            ));
        }
        Ok(())
    }
}

/// Strip non-alphanumeric characters and PascalCase-join the words
pub fn pascal_case(display: &str) -> String {
    let cleaned: String = display
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();

    cleaned
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Case-insensitive comparison key; two names with the same key collide
pub fn normalize_key(name: &str) -> String {
    pascal_case(name).to_ascii_lowercase()
}

/// `prefix_PascalName`
pub fn schema_name(prefix: &str, display: &str) -> Result<String, GenerationError> {
    let pascal = pascal_case(display);
    if pascal.is_empty() {
        return Err(GenerationError::EmptyTechnicalName {
            display: display.to_string(),
        });
    }
    Ok(format!("{}_{}", prefix, pascal))
}

/// `prefix_pascalname` (lower-cased schema name)
pub fn logical_name(prefix: &str, display: &str) -> Result<String, GenerationError> {
    schema_name(prefix, display).map(|s| s.to_ascii_lowercase())
}

/// Primary id attribute of an entity
pub fn primary_id_name(entity_logical_name: &str) -> String {
    format!("{}id", entity_logical_name)
}

/// Check a publisher customization prefix
pub fn validate_prefix(prefix: &str) -> Result<(), GenerationError> {
    let invalid = |reason: &str| GenerationError::InvalidPrefix {
        prefix: prefix.to_string(),
        reason: reason.to_string(),
    };

    if !(2..=8).contains(&prefix.len()) {
        return Err(invalid("must be 2 to 8 characters"));
    }
    if !prefix.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err(invalid("must start with a lowercase letter"));
    }
    if !prefix
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(invalid("only lowercase letters and digits are allowed"));
    }
    if prefix.starts_with("mscrm") {
        return Err(invalid("'mscrm' is reserved by the platform"));
    }
    Ok(())
}

pub fn is_reserved(normalized: &str) -> bool {
    RESERVED_NAMES.contains(&normalized)
}

/// Human-readable label: `first_name` → `First Name`, `OrderItem` → `Order Item`
pub fn display_label(name: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev: Option<char> = None;

    for c in name.chars() {
        if c == '_' || c == '-' || c.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev = None;
            continue;
        }
        if let Some(p) = prev {
            if c.is_ascii_uppercase() && (p.is_ascii_lowercase() || p.is_ascii_digit()) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
        prev = Some(c);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Naive English plural for collection display names
pub fn pluralize(label: &str) -> String {
    let lower = label.to_ascii_lowercase();
    if lower.ends_with('s')
        || lower.ends_with('x')
        || lower.ends_with('z')
        || lower.ends_with("ch")
        || lower.ends_with("sh")
    {
        format!("{}es", label)
    } else if lower.ends_with('y')
        && !lower.ends_with("ay")
        && !lower.ends_with("ey")
        && !lower.ends_with("oy")
        && !lower.ends_with("uy")
    {
        format!("{}ies", &label[..label.len() - 1])
    } else {
        format!("{}s", label)
    }
}

// =============================================================================
// Tests
// =============================================================================
