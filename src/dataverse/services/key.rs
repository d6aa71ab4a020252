use std::sync::Arc;

use async_trait::async_trait;
use erd_core::{AlternateKeySpec, ExternalKey, ObjectKind};

use super::entity::entity_path;
use super::{created_id, find_metadata, odata_literal, RemoteId, RemoteObjectService};
use crate::dataverse::caller::{ApiCaller, AttemptMeter};
use crate::dataverse::payloads;
use crate::dataverse::transport::ApiRequest;
use crate::error::RemoteError;

/// Alternate (unique) keys
pub struct KeyService {
    caller: Arc<ApiCaller>,
}

impl KeyService {
    pub fn new(caller: Arc<ApiCaller>) -> Self {
        Self { caller }
    }
}

#[async_trait]
impl RemoteObjectService for KeyService {
    type Spec = AlternateKeySpec;

    fn kind(&self) -> ObjectKind {
        ObjectKind::AlternateKey
    }

    fn key(&self, spec: &AlternateKeySpec) -> ExternalKey {
        spec.external_key()
    }

    async fn find(
        &self,
        spec: &AlternateKeySpec,
        meter: &AttemptMeter,
    ) -> Result<Option<RemoteId>, RemoteError> {
        let path = format!(
            "{}/Keys(LogicalName={})",
            entity_path(&spec.entity_logical_name),
            odata_literal(&spec.logical_name)
        );
        find_metadata(&self.caller, path, meter).await
    }

    async fn create(
        &self,
        spec: &AlternateKeySpec,
        meter: &AttemptMeter,
    ) -> Result<RemoteId, RemoteError> {
        let path = format!("{}/Keys", entity_path(&spec.entity_logical_name));
        let request = ApiRequest::post(path, payloads::alternate_key(spec));
        let response = self.caller.call(&request, meter).await?;
        created_id(&response)
    }
}
