use std::sync::Arc;

use async_trait::async_trait;
use erd_core::{ExternalKey, ObjectKind, PublisherSpec};

use super::{created_id, odata_literal, query_first_id, RemoteId, RemoteObjectService};
use crate::dataverse::caller::{ApiCaller, AttemptMeter};
use crate::dataverse::payloads;
use crate::dataverse::transport::ApiRequest;
use crate::error::RemoteError;

pub struct PublisherService {
    caller: Arc<ApiCaller>,
}

impl PublisherService {
    pub fn new(caller: Arc<ApiCaller>) -> Self {
        Self { caller }
    }
}

#[async_trait]
impl RemoteObjectService for PublisherService {
    type Spec = PublisherSpec;

    fn kind(&self) -> ObjectKind {
        ObjectKind::Publisher
    }

    fn key(&self, spec: &PublisherSpec) -> ExternalKey {
        spec.external_key()
    }

    async fn find(
        &self,
        spec: &PublisherSpec,
        meter: &AttemptMeter,
    ) -> Result<Option<RemoteId>, RemoteError> {
        query_first_id(
            &self.caller,
            "publishers",
            "publisherid",
            format!("uniquename eq {}", odata_literal(&spec.unique_name)),
            meter,
        )
        .await
    }

    async fn create(
        &self,
        spec: &PublisherSpec,
        meter: &AttemptMeter,
    ) -> Result<RemoteId, RemoteError> {
        let request = ApiRequest::post("publishers", payloads::publisher(spec));
        let response = self.caller.call(&request, meter).await?;
        created_id(&response)
    }
}
