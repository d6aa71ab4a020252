//! Metadata request bodies
//!
//! One builder per object kind, each a straight mapping from a plan spec to
//! the Web API's JSON shape. Attribute kinds map exhaustively onto
//! `*AttributeMetadata` types.

use erd_core::{
    AlternateKeySpec, AttributeKind, CascadeBehavior, ChoiceSetSpec, ColumnSpec, EntitySpec,
    PublisherSpec, RelationshipSpec, SolutionSpec, StringFormat,
};
use serde_json::{json, Value};

pub const LANGUAGE_CODE: u32 = 1033;
const ODATA_NS: &str = "Microsoft.Dynamics.CRM";

pub fn label(text: &str) -> Value {
    json!({
        "LocalizedLabels": [{ "Label": text, "LanguageCode": LANGUAGE_CODE }]
    })
}

fn odata_type(name: &str) -> String {
    format!("{}.{}", ODATA_NS, name)
}

fn required_level(required: bool) -> Value {
    let level = if required { "ApplicationRequired" } else { "None" };
    json!({
        "Value": level,
        "CanBeChanged": true,
        "ManagedPropertyLogicalName": "canmodifyrequirementlevelsettings"
    })
}

pub fn publisher(spec: &PublisherSpec) -> Value {
    json!({
        "uniquename": spec.unique_name,
        "friendlyname": spec.display_name,
        "description": spec.description.clone().unwrap_or_default(),
        "customizationprefix": spec.customization_prefix,
        "customizationoptionvalueprefix": spec.option_value_prefix,
    })
}

pub fn solution(spec: &SolutionSpec, publisher_id: &str) -> Value {
    json!({
        "uniquename": spec.unique_name,
        "friendlyname": spec.display_name,
        "version": spec.version,
        "description": spec.description.clone().unwrap_or_default(),
        "publisherid@odata.bind": format!("/publishers({})", publisher_id),
    })
}

pub fn entity(spec: &EntitySpec) -> Value {
    let mut primary_name = attribute(&spec.primary_name);
    primary_name["IsPrimaryName"] = json!(true);

    json!({
        "@odata.type": odata_type("EntityMetadata"),
        "SchemaName": spec.schema_name,
        "DisplayName": label(&spec.display_name),
        "DisplayCollectionName": label(&spec.collection_name),
        "Description": label(spec.description.as_deref().unwrap_or_default()),
        "OwnershipType": "UserOwned",
        "IsActivity": false,
        "HasNotes": false,
        "HasActivities": false,
        "PrimaryNameAttribute": spec.primary_name.logical_name,
        "Attributes": [primary_name],
    })
}

pub fn attribute(column: &ColumnSpec) -> Value {
    let mut body = json!({
        "SchemaName": column.schema_name,
        "DisplayName": label(&column.display_name),
        "Description": label(column.description.as_deref().unwrap_or_default()),
        "RequiredLevel": required_level(column.required),
    });

    let (metadata_type, extra) = match &column.kind {
        AttributeKind::String { max_length, format } => (
            "StringAttributeMetadata",
            json!({ "MaxLength": max_length, "FormatName": { "Value": string_format(*format) } }),
        ),
        AttributeKind::Memo { max_length } => (
            "MemoAttributeMetadata",
            json!({ "MaxLength": max_length, "Format": "TextArea" }),
        ),
        AttributeKind::Integer => (
            "IntegerAttributeMetadata",
            json!({ "Format": "None", "MinValue": i32::MIN, "MaxValue": i32::MAX }),
        ),
        AttributeKind::Decimal { precision } => (
            "DecimalAttributeMetadata",
            json!({ "Precision": precision, "MinValue": -100_000_000_000i64, "MaxValue": 100_000_000_000i64 }),
        ),
        AttributeKind::Double { precision } => (
            "DoubleAttributeMetadata",
            json!({ "Precision": precision, "MinValue": -100_000_000_000i64, "MaxValue": 100_000_000_000i64 }),
        ),
        AttributeKind::Boolean => (
            "BooleanAttributeMetadata",
            json!({
                "OptionSet": {
                    "TrueOption": { "Value": 1, "Label": label("Yes") },
                    "FalseOption": { "Value": 0, "Label": label("No") },
                    "OptionSetType": "Boolean"
                }
            }),
        ),
        AttributeKind::DateTime { date_only } => (
            "DateTimeAttributeMetadata",
            if *date_only {
                json!({ "Format": "DateOnly", "DateTimeBehavior": { "Value": "DateOnly" } })
            } else {
                json!({ "Format": "DateAndTime", "DateTimeBehavior": { "Value": "UserLocal" } })
            },
        ),
        AttributeKind::Money { precision } => (
            "MoneyAttributeMetadata",
            json!({ "Precision": precision, "PrecisionSource": 2 }),
        ),
        AttributeKind::AutoNumber { format } => (
            "StringAttributeMetadata",
            json!({ "MaxLength": 100, "FormatName": { "Value": "Text" }, "AutoNumberFormat": format }),
        ),
        AttributeKind::File => ("FileAttributeMetadata", json!({ "MaxSizeInKB": 32768 })),
        AttributeKind::Image => ("ImageAttributeMetadata", json!({ "CanStoreFullImage": true })),
        AttributeKind::Choice { choice_set } => (
            "PicklistAttributeMetadata",
            json!({
                "GlobalOptionSet@odata.bind":
                    format!("/GlobalOptionSetDefinitions(Name='{}')", choice_set)
            }),
        ),
    };

    body["@odata.type"] = json!(odata_type(metadata_type));
    merge(&mut body, extra);
    body
}

fn string_format(format: StringFormat) -> &'static str {
    match format {
        StringFormat::Text => "Text",
        StringFormat::Email => "Email",
        StringFormat::Phone => "Phone",
        StringFormat::Url => "Url",
    }
}

fn merge(target: &mut Value, extra: Value) {
    if let (Some(target), Value::Object(extra)) = (target.as_object_mut(), extra) {
        target.extend(extra);
    }
}

pub fn choice_set(spec: &ChoiceSetSpec) -> Value {
    let options: Vec<Value> = spec
        .options
        .iter()
        .map(|o| {
            json!({
                "Value": o.value,
                "Label": label(&o.label),
                "Description": label(o.description.as_deref().unwrap_or_default()),
            })
        })
        .collect();

    json!({
        "@odata.type": odata_type("OptionSetMetadata"),
        "Name": spec.name,
        "DisplayName": label(&spec.display_name),
        "Description": label(spec.description.as_deref().unwrap_or_default()),
        "IsGlobal": true,
        "OptionSetType": "Picklist",
        "Options": options,
    })
}

pub fn relationship(spec: &RelationshipSpec) -> Value {
    let (delete, others) = match spec.cascade {
        CascadeBehavior::Referential => ("RemoveLink", "NoCascade"),
        CascadeBehavior::Parental => ("Cascade", "Cascade"),
    };

    json!({
        "@odata.type": odata_type("OneToManyRelationshipMetadata"),
        "SchemaName": spec.schema_name,
        "ReferencedEntity": spec.referenced_entity,
        "ReferencedAttribute": spec.referenced_attribute,
        "ReferencingEntity": spec.referencing_entity,
        "CascadeConfiguration": {
            "Assign": others,
            "Delete": delete,
            "Merge": "NoCascade",
            "Reparent": others,
            "Share": others,
            "Unshare": others,
        },
        "Lookup": {
            "@odata.type": odata_type("LookupAttributeMetadata"),
            "SchemaName": spec.lookup.schema_name,
            "DisplayName": label(&spec.lookup.display_name),
            "Description": label(&spec.label),
            "RequiredLevel": required_level(spec.lookup.required),
        },
    })
}

pub fn alternate_key(spec: &AlternateKeySpec) -> Value {
    json!({
        "SchemaName": spec.schema_name,
        "DisplayName": label(&spec.display_name),
        "KeyAttributes": spec.key_attributes,
    })
}

pub fn add_solution_component(component_id: &str, component_type: u32, solution: &str) -> Value {
    json!({
        "ComponentId": component_id,
        "ComponentType": component_type,
        "SolutionUniqueName": solution,
        "AddRequiredComponents": false,
        "DoNotIncludeSubcomponents": false,
    })
}
