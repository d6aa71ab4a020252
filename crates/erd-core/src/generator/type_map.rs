//! Diagram field type → platform attribute kind

use crate::ast::FieldType;
use crate::plan::{AttributeKind, StringFormat};

pub const DEFAULT_STRING_LENGTH: u32 = 100;
pub const MAX_STRING_LENGTH: u32 = 4000;
pub const MEMO_LENGTH: u32 = 4000;
/// Length of a GUID rendered as text
pub const GUID_TEXT_LENGTH: u32 = 36;
pub const AUTONUMBER_FORMAT: &str = "{SEQNUM:6}";

/// Map a field type to its attribute kind
///
/// Total: unrecognized types become default-length text.
pub fn map_field_type(field_type: &FieldType) -> AttributeKind {
    match field_type {
        FieldType::String { max_length } => match max_length {
            Some(len) if *len > MAX_STRING_LENGTH => AttributeKind::Memo {
                max_length: (*len).min(1_048_576),
            },
            Some(len) => text((*len).max(1), StringFormat::Text),
            None => text(DEFAULT_STRING_LENGTH, StringFormat::Text),
        },
        FieldType::Text => AttributeKind::Memo {
            max_length: MEMO_LENGTH,
        },
        FieldType::Email => text(DEFAULT_STRING_LENGTH, StringFormat::Email),
        FieldType::Phone => text(50, StringFormat::Phone),
        FieldType::Url => text(200, StringFormat::Url),
        FieldType::Integer => AttributeKind::Integer,
        FieldType::Decimal => AttributeKind::Decimal { precision: 2 },
        FieldType::Float => AttributeKind::Double { precision: 2 },
        FieldType::Boolean => AttributeKind::Boolean,
        FieldType::Date => AttributeKind::DateTime { date_only: true },
        FieldType::DateTime => AttributeKind::DateTime { date_only: false },
        FieldType::Money => AttributeKind::Money { precision: 2 },
        FieldType::Guid => text(GUID_TEXT_LENGTH, StringFormat::Text),
        FieldType::AutoNumber => AttributeKind::AutoNumber {
            format: AUTONUMBER_FORMAT.to_string(),
        },
        FieldType::File => AttributeKind::File,
        FieldType::Image => AttributeKind::Image,
        FieldType::Other(_) => fallback_kind(),
    }
}

/// Kind used for any type the map does not recognize
pub fn fallback_kind() -> AttributeKind {
    text(DEFAULT_STRING_LENGTH, StringFormat::Text)
}

fn text(max_length: u32, format: StringFormat) -> AttributeKind {
    AttributeKind::String { max_length, format }
}
