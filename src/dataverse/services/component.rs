use std::sync::Arc;

use async_trait::async_trait;
use erd_core::{ExternalKey, ObjectKind};

use super::{created_id, query_first_id, RemoteId, RemoteObjectService};
use crate::dataverse::caller::{ApiCaller, AttemptMeter};
use crate::dataverse::payloads;
use crate::dataverse::transport::ApiRequest;
use crate::error::RemoteError;

/// Membership of one deployed object in the solution
#[derive(Debug, Clone)]
pub struct ComponentTarget {
    pub solution_id: RemoteId,
    pub solution_unique_name: String,
    pub component_id: RemoteId,
    pub component_type: u32,
    /// The object being added
    pub member: ExternalKey,
}

pub struct ComponentService {
    caller: Arc<ApiCaller>,
}

impl ComponentService {
    pub fn new(caller: Arc<ApiCaller>) -> Self {
        Self { caller }
    }
}

#[async_trait]
impl RemoteObjectService for ComponentService {
    type Spec = ComponentTarget;

    fn kind(&self) -> ObjectKind {
        ObjectKind::SolutionComponent
    }

    fn key(&self, target: &ComponentTarget) -> ExternalKey {
        ExternalKey::new(ObjectKind::SolutionComponent, target.member.to_string())
    }

    async fn find(
        &self,
        target: &ComponentTarget,
        meter: &AttemptMeter,
    ) -> Result<Option<RemoteId>, RemoteError> {
        query_first_id(
            &self.caller,
            "solutioncomponents",
            "solutioncomponentid",
            format!(
                "objectid eq {} and _solutionid_value eq {}",
                target.component_id, target.solution_id
            ),
            meter,
        )
        .await
    }

    async fn create(
        &self,
        target: &ComponentTarget,
        meter: &AttemptMeter,
    ) -> Result<RemoteId, RemoteError> {
        let body = payloads::add_solution_component(
            &target.component_id,
            target.component_type,
            &target.solution_unique_name,
        );
        let response = self
            .caller
            .call(&ApiRequest::post("AddSolutionComponent", body), meter)
            .await?;
        created_id(&response)
    }
}
