use std::sync::Arc;

use async_trait::async_trait;
use erd_core::{ChoiceSetSpec, ExternalKey, ObjectKind};

use super::{created_id, find_metadata, odata_literal, RemoteId, RemoteObjectService};
use crate::dataverse::caller::{ApiCaller, AttemptMeter};
use crate::dataverse::payloads;
use crate::dataverse::transport::ApiRequest;
use crate::error::RemoteError;

/// Global option sets
pub struct ChoiceSetService {
    caller: Arc<ApiCaller>,
}

impl ChoiceSetService {
    pub fn new(caller: Arc<ApiCaller>) -> Self {
        Self { caller }
    }
}

#[async_trait]
impl RemoteObjectService for ChoiceSetService {
    type Spec = ChoiceSetSpec;

    fn kind(&self) -> ObjectKind {
        ObjectKind::ChoiceSet
    }

    fn key(&self, spec: &ChoiceSetSpec) -> ExternalKey {
        spec.external_key()
    }

    async fn find(
        &self,
        spec: &ChoiceSetSpec,
        meter: &AttemptMeter,
    ) -> Result<Option<RemoteId>, RemoteError> {
        let path = format!("GlobalOptionSetDefinitions(Name={})", odata_literal(&spec.name));
        find_metadata(&self.caller, path, meter).await
    }

    async fn create(
        &self,
        spec: &ChoiceSetSpec,
        meter: &AttemptMeter,
    ) -> Result<RemoteId, RemoteError> {
        let request = ApiRequest::post("GlobalOptionSetDefinitions", payloads::choice_set(spec));
        let response = self.caller.call(&request, meter).await?;
        created_id(&response)
    }
}
