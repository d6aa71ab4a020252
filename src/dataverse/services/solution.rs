use std::sync::Arc;

use async_trait::async_trait;
use erd_core::{ExternalKey, ObjectKind, SolutionSpec};

use super::{created_id, odata_literal, query_first_id, RemoteId, RemoteObjectService};
use crate::dataverse::caller::{ApiCaller, AttemptMeter};
use crate::dataverse::payloads;
use crate::dataverse::transport::ApiRequest;
use crate::error::RemoteError;

/// A solution bound to the publisher that owns it
#[derive(Debug, Clone)]
pub struct SolutionTarget {
    pub spec: SolutionSpec,
    pub publisher_id: RemoteId,
}

pub struct SolutionService {
    caller: Arc<ApiCaller>,
}

impl SolutionService {
    pub fn new(caller: Arc<ApiCaller>) -> Self {
        Self { caller }
    }
}

#[async_trait]
impl RemoteObjectService for SolutionService {
    type Spec = SolutionTarget;

    fn kind(&self) -> ObjectKind {
        ObjectKind::Solution
    }

    fn key(&self, target: &SolutionTarget) -> ExternalKey {
        target.spec.external_key()
    }

    async fn find(
        &self,
        target: &SolutionTarget,
        meter: &AttemptMeter,
    ) -> Result<Option<RemoteId>, RemoteError> {
        query_first_id(
            &self.caller,
            "solutions",
            "solutionid",
            format!("uniquename eq {}", odata_literal(&target.spec.unique_name)),
            meter,
        )
        .await
    }

    async fn create(
        &self,
        target: &SolutionTarget,
        meter: &AttemptMeter,
    ) -> Result<RemoteId, RemoteError> {
        let body = payloads::solution(&target.spec, &target.publisher_id);
        let response = self
            .caller
            .call(&ApiRequest::post("solutions", body), meter)
            .await?;
        created_id(&response)
    }
}
