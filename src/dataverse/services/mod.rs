//! Per-object metadata services
//!
//! Each service answers two questions for one object kind: does the object
//! already exist (keyed by its technical name), and how to create it. The
//! orchestrator drives every kind through the same check-then-create state
//! machine via [`RemoteObjectService`].

mod choice_set;
mod component;
mod entity;
mod key;
mod publisher;
mod relationship;
mod solution;

pub use choice_set::ChoiceSetService;
pub use component::{ComponentService, ComponentTarget};
pub use entity::{ColumnService, ColumnTarget, EntityService};
pub use key::KeyService;
pub use publisher::PublisherService;
pub use relationship::RelationshipService;
pub use solution::{SolutionService, SolutionTarget};

use async_trait::async_trait;
use erd_core::{ExternalKey, ObjectKind};
use serde::Deserialize;

use super::caller::{ApiCaller, AttemptMeter};
use super::transport::{ApiRequest, ApiResponse};
use crate::error::RemoteError;

/// Platform id (GUID text) of a metadata object or record
pub type RemoteId = String;

#[async_trait]
pub trait RemoteObjectService: Send + Sync {
    type Spec: Send + Sync;

    fn kind(&self) -> ObjectKind;

    fn key(&self, spec: &Self::Spec) -> ExternalKey;

    async fn find(
        &self,
        spec: &Self::Spec,
        meter: &AttemptMeter,
    ) -> Result<Option<RemoteId>, RemoteError>;

    async fn create(&self, spec: &Self::Spec, meter: &AttemptMeter)
        -> Result<RemoteId, RemoteError>;
}

// =============================================================================
// SHARED REQUEST HELPERS
// =============================================================================

/// Quote a value for an OData key or filter literal
pub(crate) fn odata_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MetadataIdOnly {
    metadata_id: String,
}

/// GET a metadata definition by key path; 404 means absent
pub(crate) async fn find_metadata(
    caller: &ApiCaller,
    path: String,
    meter: &AttemptMeter,
) -> Result<Option<RemoteId>, RemoteError> {
    let request = ApiRequest::get(path).with_query("$select", "MetadataId");
    match caller.call(&request, meter).await {
        Ok(response) => Ok(Some(response.json::<MetadataIdOnly>()?.metadata_id)),
        Err(RemoteError::Permanent {
            status: Some(404), ..
        }) => Ok(None),
        Err(e) => Err(e),
    }
}

#[derive(Deserialize)]
struct Collection {
    value: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// First `id_field` of an entity-set query, if any row matches
pub(crate) async fn query_first_id(
    caller: &ApiCaller,
    entity_set: &str,
    id_field: &str,
    filter: String,
    meter: &AttemptMeter,
) -> Result<Option<RemoteId>, RemoteError> {
    let request = ApiRequest::get(entity_set)
        .with_query("$select", id_field)
        .with_query("$filter", filter);
    let response = caller.call(&request, meter).await?;
    let rows = response.json::<Collection>()?;
    Ok(rows
        .value
        .first()
        .and_then(|row| row.get(id_field))
        .and_then(|v| v.as_str())
        .map(str::to_string))
}

/// Id of a newly created object from `OData-EntityId`, falling back to the body
pub(crate) fn created_id(response: &ApiResponse) -> Result<RemoteId, RemoteError> {
    if let Some(id) = response.header("OData-EntityId").and_then(id_from_entity_url) {
        return Ok(id);
    }
    if let Ok(body) = serde_json::from_str::<serde_json::Value>(&response.body) {
        for field in ["MetadataId", "id"] {
            if let Some(id) = body.get(field).and_then(|v| v.as_str()) {
                return Ok(id.to_string());
            }
        }
    }
    Err(RemoteError::Decode(
        "create succeeded but no id was returned".to_string(),
    ))
}

/// `https://org/api/data/v9.2/EntityDefinitions(70816501-…)` → `70816501-…`
fn id_from_entity_url(url: &str) -> Option<String> {
    let open = url.rfind('(')?;
    let close = url[open..].find(')')? + open;
    let id = &url[open + 1..close];
    (!id.is_empty()).then(|| id.to_string())
}
