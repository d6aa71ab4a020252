//! Deployment orchestrator
//!
//! Drives a [`DeploymentPlan`] against the platform in strict stage order:
//!
//! 1. publisher
//! 2. solution (bound to the publisher)
//! 3. global choice sets
//! 4. entities, each followed by its columns
//! 5. relationships (both endpoint entities deployed)
//! 6. alternate keys (every member attribute deployed)
//! 7. solution components for every deployed object
//!
//! Every object goes through the same check-then-create cycle: an existence
//! query keyed by technical name, then a create only when nothing was found.
//! Re-running a plan therefore reports every object as already existing.
//!
//! A failed object never aborts its siblings. Objects depending on it are
//! reported as not attempted. A credential failure mid-run stops all further
//! remote calls; cancellation is honoured at stage boundaries.

mod result;

pub use result::{DeploymentResult, KindSummary, ObjectOutcome, ObjectState};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use erd_core::{
    AlternateKeySpec, AttributeKind, DeploymentPlan, EntitySpec, ExternalKey, ObjectKind,
};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dataverse::caller::AttemptMeter;
use crate::dataverse::services::{
    ColumnTarget, ComponentTarget, RemoteObjectService, SolutionTarget,
};
use crate::dataverse::DataverseClient;
use crate::error::{DeployError, RemoteError};

pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Cooperative stop signal, checked between stages
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Orchestrator {
    client: DataverseClient,
    max_concurrency: usize,
    cancel: CancellationFlag,
}

impl Orchestrator {
    pub fn new(client: DataverseClient) -> Self {
        Self {
            client,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            cancel: CancellationFlag::new(),
        }
    }

    /// Upper bound on sibling objects in flight within one stage
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn client(&self) -> &DataverseClient {
        &self.client
    }

    /// Deploy every object in the plan
    ///
    /// Returns `Err` only when nothing was attempted: the plan is internally
    /// inconsistent or the first token could not be acquired. Every other
    /// failure is reported per object in the result.
    pub async fn deploy(&self, plan: &DeploymentPlan) -> Result<DeploymentResult, DeployError> {
        check_plan(plan)?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, objects = plan.object_count(), "starting deployment");

        self.client.tokens().bearer().await?;

        let halted = AtomicBool::new(false);
        let mut run = Run::default();

        // -- packaging --------------------------------------------------------

        let stop = self.gate(&mut run, "publisher");
        let outcomes = self
            .stage(&self.client.publishers, vec![Ok(plan.publisher.clone())], stop, &halted)
            .await;
        run.record(outcomes);

        let solution_key = plan.solution.external_key();
        let solution_item = match run.id(&plan.publisher.external_key()) {
            Some(publisher_id) => Ok(SolutionTarget {
                spec: plan.solution.clone(),
                publisher_id: publisher_id.to_string(),
            }),
            None => Err(ObjectOutcome::not_attempted(
                solution_key.clone(),
                format!("publisher {} was not deployed", plan.publisher.unique_name),
            )),
        };
        let stop = self.gate(&mut run, "solution");
        let outcomes = self
            .stage(&self.client.solutions, vec![solution_item], stop, &halted)
            .await;
        run.record(outcomes);

        let packaging_blocked = match run.id(&solution_key) {
            Some(_) => None,
            None => Some(format!(
                "solution {} was not deployed",
                plan.solution.unique_name
            )),
        };

        // -- choice sets ------------------------------------------------------

        let items = plan
            .choice_sets
            .iter()
            .map(|cs| ready(cs.clone(), cs.external_key(), packaging_blocked.as_ref()))
            .collect();
        let stop = self.gate(&mut run, "choice sets");
        let outcomes = self.stage(&self.client.choice_sets, items, stop, &halted).await;
        run.record(outcomes);

        // -- entities and columns ---------------------------------------------

        let deployed_choice_sets: HashSet<&str> = plan
            .choice_sets
            .iter()
            .filter(|cs| run.is_deployed(&cs.external_key()))
            .map(|cs| cs.name.as_str())
            .collect();
        let blocked = self
            .gate(&mut run, "entities")
            .or_else(|| packaging_blocked.clone());
        info!(stage = "entities", objects = plan.entities.len(), "deployment stage");
        let per_entity: Vec<Vec<ObjectOutcome>> = stream::iter(plan.entities.iter().map(|entity| {
            self.deploy_entity(entity, blocked.clone(), &deployed_choice_sets, &halted)
        }))
        .buffered(self.max_concurrency)
        .collect()
        .await;
        run.record(per_entity.into_iter().flatten().collect());

        // -- relationships ----------------------------------------------------

        let items = plan
            .relationships
            .iter()
            .map(|rel| {
                let blocker = [&rel.referenced_entity, &rel.referencing_entity]
                    .into_iter()
                    .find(|e| !run.is_deployed(&ExternalKey::new(ObjectKind::Entity, e.as_str())))
                    .map(|e| format!("entity {} was not deployed", e));
                ready(rel.clone(), rel.external_key(), blocker.as_ref())
            })
            .collect();
        let stop = self.gate(&mut run, "relationships");
        let outcomes = self
            .stage(&self.client.relationships, items, stop, &halted)
            .await;
        run.record(outcomes);

        // -- alternate keys ---------------------------------------------------

        let items = plan
            .alternate_keys
            .iter()
            .map(|key| {
                let blocker = key_blocker(plan, &run, key);
                ready(key.clone(), key.external_key(), blocker.as_ref())
            })
            .collect();
        let stop = self.gate(&mut run, "alternate keys");
        let outcomes = self.stage(&self.client.keys, items, stop, &halted).await;
        run.record(outcomes);

        // -- solution components ----------------------------------------------

        let items = match run.id(&solution_key) {
            Some(solution_id) => component_targets(&run, solution_id, &plan.solution.unique_name)
                .into_iter()
                .map(Ok)
                .collect(),
            None => Vec::new(),
        };
        let stop = self.gate(&mut run, "solution components");
        let outcomes = self.stage(&self.client.components, items, stop, &halted).await;
        run.record(outcomes);

        let result = DeploymentResult {
            run_id,
            started_at,
            finished_at: Utc::now(),
            outcomes: run.outcomes,
            abort_reason: run.abort_reason,
        };

        for (kind, counts) in result.summary() {
            info!(
                %run_id,
                kind = %kind,
                created = counts.created,
                already_existed = counts.already_existed,
                failed = counts.failed,
                not_attempted = counts.not_attempted,
                "deployment summary"
            );
        }
        if let Some(reason) = &result.abort_reason {
            warn!(%run_id, reason = %reason, "deployment stopped early");
        }
        Ok(result)
    }

    /// Reason to skip the next stage entirely, if the run is stopping
    fn gate(&self, run: &mut Run, stage: &str) -> Option<String> {
        if let Some(reason) = &run.abort_reason {
            return Some(reason.clone());
        }
        if self.cancel.is_cancelled() {
            let reason = format!("run cancelled before the {} stage", stage);
            warn!(stage, "deployment cancelled");
            run.abort_reason = Some(reason.clone());
            return Some(reason);
        }
        None
    }

    /// Run one stage's siblings through a bounded, order-preserving buffer
    async fn stage<S: RemoteObjectService>(
        &self,
        service: &S,
        items: Vec<Result<S::Spec, ObjectOutcome>>,
        stop: Option<String>,
        halted: &AtomicBool,
    ) -> Vec<ObjectOutcome> {
        info!(stage = %service.kind(), objects = items.len(), "deployment stage");
        stream::iter(items.into_iter().map(|item| {
            let stop = stop.clone();
            async move {
                match (item, stop) {
                    (Err(blocked), _) => blocked,
                    (Ok(spec), Some(reason)) => ObjectOutcome::not_attempted(service.key(&spec), reason),
                    (Ok(spec), None) => ensure(service, &spec, halted).await,
                }
            }
        }))
        .buffered(self.max_concurrency)
        .collect()
        .await
    }

    async fn deploy_entity(
        &self,
        entity: &EntitySpec,
        blocked: Option<String>,
        deployed_choice_sets: &HashSet<&str>,
        halted: &AtomicBool,
    ) -> Vec<ObjectOutcome> {
        let columns = &self.client.columns;
        let targets = entity.columns.iter().map(|column| ColumnTarget {
            entity_logical_name: entity.logical_name.clone(),
            column: column.clone(),
        });

        let head = match &blocked {
            Some(reason) => ObjectOutcome::not_attempted(entity.external_key(), reason.clone()),
            None => ensure(&self.client.entities, entity, halted).await,
        };
        let entity_blocker = match (&blocked, head.state.is_deployed()) {
            (Some(reason), _) => Some(reason.clone()),
            (None, false) => Some(format!("entity {} was not deployed", entity.logical_name)),
            (None, true) => None,
        };

        let mut outcomes = vec![head];
        for target in targets {
            let blocker = entity_blocker.clone().or_else(|| match &target.column.kind {
                AttributeKind::Choice { choice_set }
                    if !deployed_choice_sets.contains(choice_set.as_str()) =>
                {
                    Some(format!("choice set {} was not deployed", choice_set))
                }
                _ => None,
            });
            let outcome = match blocker {
                Some(reason) => ObjectOutcome::not_attempted(columns.key(&target), reason),
                None => ensure(columns, &target, halted).await,
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}

// =============================================================================
// PER-OBJECT STATE MACHINE
// =============================================================================

/// Check existence, create if absent
async fn ensure<S: RemoteObjectService>(
    service: &S,
    spec: &S::Spec,
    halted: &AtomicBool,
) -> ObjectOutcome {
    let key = service.key(spec);
    if halted.load(Ordering::SeqCst) {
        return ObjectOutcome::not_attempted(key, "run halted after a credential failure");
    }

    let meter = AttemptMeter::new();
    debug!(object = %key, "checking existence");
    let (state, remote_id) = match service.find(spec, &meter).await {
        Ok(Some(id)) => {
            info!(object = %key, id = %id, "already exists, skipping");
            (ObjectState::AlreadyExisted, Some(id))
        }
        Ok(None) => {
            debug!(object = %key, "not found, creating");
            match service.create(spec, &meter).await {
                Ok(id) => {
                    info!(object = %key, id = %id, attempts = meter.count(), "created");
                    (ObjectState::Created, Some(id))
                }
                Err(error) => failed(&key, error, halted),
            }
        }
        Err(error) => failed(&key, error, halted),
    };

    ObjectOutcome {
        key,
        state,
        attempts: meter.count(),
        remote_id,
    }
}

fn failed(key: &ExternalKey, error: RemoteError, halted: &AtomicBool) -> (ObjectState, Option<String>) {
    if error.is_auth() {
        halted.store(true, Ordering::SeqCst);
    }
    warn!(object = %key, status = ?error.status(), error = %error, "object failed");
    (ObjectState::Failed { error }, None)
}

fn ready<T>(spec: T, key: ExternalKey, blocker: Option<&String>) -> Result<T, ObjectOutcome> {
    match blocker {
        Some(reason) => Err(ObjectOutcome::not_attempted(key, reason.clone())),
        None => Ok(spec),
    }
}

// =============================================================================
// RUN BOOKKEEPING
// =============================================================================

#[derive(Default)]
struct Run {
    outcomes: Vec<ObjectOutcome>,
    /// Remote ids of deployed objects
    ids: HashMap<ExternalKey, String>,
    abort_reason: Option<String>,
}

impl Run {
    fn record(&mut self, outcomes: Vec<ObjectOutcome>) {
        for outcome in outcomes {
            match (&outcome.state, &outcome.remote_id) {
                (state, Some(id)) if state.is_deployed() => {
                    self.ids.insert(outcome.key.clone(), id.clone());
                }
                (ObjectState::Failed { error: RemoteError::Auth(e) }, _) => {
                    if self.abort_reason.is_none() {
                        self.abort_reason = Some(format!("credential failure: {}", e));
                    }
                }
                _ => {}
            }
            self.outcomes.push(outcome);
        }
    }

    fn id(&self, key: &ExternalKey) -> Option<&str> {
        self.ids.get(key).map(String::as_str)
    }

    fn is_deployed(&self, key: &ExternalKey) -> bool {
        self.ids.contains_key(key)
    }
}

/// Why an alternate key cannot be created yet, if it cannot
fn key_blocker(plan: &DeploymentPlan, run: &Run, key: &AlternateKeySpec) -> Option<String> {
    let Some(entity) = plan.entity(&key.entity_logical_name) else {
        return Some(format!("entity {} is not in the plan", key.entity_logical_name));
    };
    if !run.is_deployed(&entity.external_key()) {
        return Some(format!("entity {} was not deployed", entity.logical_name));
    }
    for attribute in &key.key_attributes {
        let deployed = if *attribute == entity.primary_name.logical_name
            || *attribute == entity.primary_id
        {
            true
        } else if let Some(column) = entity.columns.iter().find(|c| c.logical_name == *attribute) {
            run.is_deployed(&column.external_key(&entity.logical_name))
        } else {
            plan.relationships
                .iter()
                .find(|r| {
                    r.referencing_entity == entity.logical_name && r.lookup.logical_name == *attribute
                })
                .map_or(false, |r| run.is_deployed(&r.external_key()))
        };
        if !deployed {
            return Some(format!("key attribute {} was not deployed", attribute));
        }
    }
    None
}

/// One component per deployed solution-aware object, in deployment order
fn component_targets(run: &Run, solution_id: &str, solution_unique_name: &str) -> Vec<ComponentTarget> {
    run.outcomes
        .iter()
        .filter_map(|outcome| {
            let component_type = outcome.key.kind.component_type()?;
            let component_id = run.id(&outcome.key)?;
            Some(ComponentTarget {
                solution_id: solution_id.to_string(),
                solution_unique_name: solution_unique_name.to_string(),
                component_id: component_id.to_string(),
                component_type,
                member: outcome.key.clone(),
            })
        })
        .collect()
}

/// Reject plans whose cross references do not resolve
fn check_plan(plan: &DeploymentPlan) -> Result<(), DeployError> {
    if plan.publisher.unique_name.is_empty() || plan.publisher.customization_prefix.is_empty() {
        return Err(DeployError::InvalidPlan(
            "publisher unique name and prefix are required".to_string(),
        ));
    }
    if plan.solution.unique_name.is_empty() {
        return Err(DeployError::InvalidPlan(
            "solution unique name is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    if let Some(duplicate) = plan.external_keys().into_iter().find(|k| !seen.insert(k.clone())) {
        return Err(DeployError::InvalidPlan(format!(
            "object {} appears more than once",
            duplicate
        )));
    }

    let choice_sets: HashSet<&str> = plan.choice_sets.iter().map(|cs| cs.name.as_str()).collect();
    for entity in &plan.entities {
        for column in &entity.columns {
            if let AttributeKind::Choice { choice_set } = &column.kind {
                if !choice_sets.contains(choice_set.as_str()) {
                    return Err(DeployError::InvalidPlan(format!(
                        "column {}.{} uses unknown choice set {}",
                        entity.logical_name, column.logical_name, choice_set
                    )));
                }
            }
        }
    }
    for rel in &plan.relationships {
        for endpoint in [&rel.referenced_entity, &rel.referencing_entity] {
            if plan.entity(endpoint).is_none() {
                return Err(DeployError::InvalidPlan(format!(
                    "relationship {} references unknown entity {}",
                    rel.schema_name, endpoint
                )));
            }
        }
    }
    for key in &plan.alternate_keys {
        if plan.entity(&key.entity_logical_name).is_none() {
            return Err(DeployError::InvalidPlan(format!(
                "alternate key {} references unknown entity {}",
                key.logical_name, key.entity_logical_name
            )));
        }
    }
    Ok(())
}
