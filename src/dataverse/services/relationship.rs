use std::sync::Arc;

use async_trait::async_trait;
use erd_core::{ExternalKey, ObjectKind, RelationshipSpec};

use super::{created_id, find_metadata, odata_literal, RemoteId, RemoteObjectService};
use crate::dataverse::caller::{ApiCaller, AttemptMeter};
use crate::dataverse::payloads;
use crate::dataverse::transport::ApiRequest;
use crate::error::RemoteError;

/// One-to-many relationships; the lookup column is created with them
pub struct RelationshipService {
    caller: Arc<ApiCaller>,
}

impl RelationshipService {
    pub fn new(caller: Arc<ApiCaller>) -> Self {
        Self { caller }
    }
}

#[async_trait]
impl RemoteObjectService for RelationshipService {
    type Spec = RelationshipSpec;

    fn kind(&self) -> ObjectKind {
        ObjectKind::Relationship
    }

    fn key(&self, spec: &RelationshipSpec) -> ExternalKey {
        spec.external_key()
    }

    async fn find(
        &self,
        spec: &RelationshipSpec,
        meter: &AttemptMeter,
    ) -> Result<Option<RemoteId>, RemoteError> {
        let path = format!(
            "RelationshipDefinitions(SchemaName={})",
            odata_literal(&spec.schema_name)
        );
        find_metadata(&self.caller, path, meter).await
    }

    async fn create(
        &self,
        spec: &RelationshipSpec,
        meter: &AttemptMeter,
    ) -> Result<RemoteId, RemoteError> {
        let request = ApiRequest::post("RelationshipDefinitions", payloads::relationship(spec));
        let response = self.caller.call(&request, meter).await?;
        created_id(&response)
    }
}
