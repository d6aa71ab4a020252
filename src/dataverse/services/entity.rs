use std::sync::Arc;

use async_trait::async_trait;
use erd_core::{ColumnSpec, EntitySpec, ExternalKey, ObjectKind};

use super::{created_id, find_metadata, odata_literal, RemoteId, RemoteObjectService};
use crate::dataverse::caller::{ApiCaller, AttemptMeter};
use crate::dataverse::payloads;
use crate::dataverse::transport::ApiRequest;
use crate::error::RemoteError;

pub(crate) fn entity_path(logical_name: &str) -> String {
    format!("EntityDefinitions(LogicalName={})", odata_literal(logical_name))
}

/// Tables, created together with their primary name column
pub struct EntityService {
    caller: Arc<ApiCaller>,
}

impl EntityService {
    pub fn new(caller: Arc<ApiCaller>) -> Self {
        Self { caller }
    }
}

#[async_trait]
impl RemoteObjectService for EntityService {
    type Spec = EntitySpec;

    fn kind(&self) -> ObjectKind {
        ObjectKind::Entity
    }

    fn key(&self, spec: &EntitySpec) -> ExternalKey {
        spec.external_key()
    }

    async fn find(
        &self,
        spec: &EntitySpec,
        meter: &AttemptMeter,
    ) -> Result<Option<RemoteId>, RemoteError> {
        find_metadata(&self.caller, entity_path(&spec.logical_name), meter).await
    }

    async fn create(&self, spec: &EntitySpec, meter: &AttemptMeter) -> Result<RemoteId, RemoteError> {
        let request = ApiRequest::post("EntityDefinitions", payloads::entity(spec));
        let response = self.caller.call(&request, meter).await?;
        created_id(&response)
    }
}

// =============================================================================
// COLUMNS
// =============================================================================

#[derive(Debug, Clone)]
pub struct ColumnTarget {
    pub entity_logical_name: String,
    pub column: ColumnSpec,
}

pub struct ColumnService {
    caller: Arc<ApiCaller>,
}

impl ColumnService {
    pub fn new(caller: Arc<ApiCaller>) -> Self {
        Self { caller }
    }
}

#[async_trait]
impl RemoteObjectService for ColumnService {
    type Spec = ColumnTarget;

    fn kind(&self) -> ObjectKind {
        ObjectKind::Column
    }

    fn key(&self, target: &ColumnTarget) -> ExternalKey {
        target.column.external_key(&target.entity_logical_name)
    }

    async fn find(
        &self,
        target: &ColumnTarget,
        meter: &AttemptMeter,
    ) -> Result<Option<RemoteId>, RemoteError> {
        let path = format!(
            "{}/Attributes(LogicalName={})",
            entity_path(&target.entity_logical_name),
            odata_literal(&target.column.logical_name)
        );
        find_metadata(&self.caller, path, meter).await
    }

    async fn create(
        &self,
        target: &ColumnTarget,
        meter: &AttemptMeter,
    ) -> Result<RemoteId, RemoteError> {
        let path = format!("{}/Attributes", entity_path(&target.entity_logical_name));
        let request = ApiRequest::post(path, payloads::attribute(&target.column));
        let response = self.caller.call(&request, meter).await?;
        created_id(&response)
    }
}
