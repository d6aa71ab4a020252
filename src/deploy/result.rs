//! Deployment result artifact
//!
//! One [`ObjectOutcome`] per planned object (and per solution component),
//! in deployment order. Nothing is dropped: objects the run never reached are
//! reported as [`ObjectState::NotAttempted`] with the reason.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use erd_core::{ExternalKey, ObjectKind};
use serde::Serialize;
use uuid::Uuid;

use crate::error::RemoteError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ObjectState {
    Created,
    /// Existence check found the object; no create was issued
    AlreadyExisted,
    Failed { error: RemoteError },
    NotAttempted { reason: String },
}

impl ObjectState {
    pub fn is_deployed(&self) -> bool {
        matches!(self, ObjectState::Created | ObjectState::AlreadyExisted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectOutcome {
    pub key: ExternalKey,
    #[serde(flatten)]
    pub state: ObjectState,
    /// Transport attempts made for this object (existence check included)
    pub attempts: u32,
    pub remote_id: Option<String>,
}

impl ObjectOutcome {
    pub fn not_attempted(key: ExternalKey, reason: impl Into<String>) -> Self {
        Self {
            key,
            state: ObjectState::NotAttempted {
                reason: reason.into(),
            },
            attempts: 0,
            remote_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindSummary {
    pub created: usize,
    pub already_existed: usize,
    pub failed: usize,
    pub not_attempted: usize,
}

impl KindSummary {
    pub fn total(&self) -> usize {
        self.created + self.already_existed + self.failed + self.not_attempted
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploymentResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<ObjectOutcome>,
    /// Set when the run stopped early (credential failure or cancellation)
    pub abort_reason: Option<String>,
}

impl DeploymentResult {
    pub fn summary(&self) -> BTreeMap<ObjectKind, KindSummary> {
        let mut summary: BTreeMap<ObjectKind, KindSummary> = BTreeMap::new();
        for outcome in &self.outcomes {
            let counts = summary.entry(outcome.key.kind).or_default();
            match outcome.state {
                ObjectState::Created => counts.created += 1,
                ObjectState::AlreadyExisted => counts.already_existed += 1,
                ObjectState::Failed { .. } => counts.failed += 1,
                ObjectState::NotAttempted { .. } => counts.not_attempted += 1,
            }
        }
        summary
    }

    /// Every object deployed and the run was not cut short
    pub fn is_success(&self) -> bool {
        self.abort_reason.is_none() && self.outcomes.iter().all(|o| o.state.is_deployed())
    }

    pub fn outcome(&self, key: &ExternalKey) -> Option<&ObjectOutcome> {
        self.outcomes.iter().find(|o| &o.key == key)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ObjectOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.state, ObjectState::Failed { .. }))
    }

    pub fn count(&self, kind: ObjectKind, state: fn(&ObjectState) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.key.kind == kind && state(&o.state))
            .count()
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(kind: ObjectKind, name: &str, state: ObjectState) -> ObjectOutcome {
        ObjectOutcome {
            key: ExternalKey::new(kind, name),
            state,
            attempts: 1,
            remote_id: None,
        }
    }

    fn result(outcomes: Vec<ObjectOutcome>) -> DeploymentResult {
        let now = Utc::now();
        DeploymentResult {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            outcomes,
            abort_reason: None,
        }
    }

    #[test]
    fn test_summary_counts_per_kind() {
        let result = result(vec![
            outcome(ObjectKind::Entity, "cr1_a", ObjectState::Created),
            outcome(ObjectKind::Entity, "cr1_b", ObjectState::AlreadyExisted),
            outcome(
                ObjectKind::Relationship,
                "cr1_A_B",
                ObjectState::Failed {
                    error: RemoteError::Permanent {
                        status: Some(400),
                        message: "bad".into(),
                    },
                },
            ),
            ObjectOutcome::not_attempted(
                ExternalKey::new(ObjectKind::AlternateKey, "cr1_b.k"),
                "dependency failed",
            ),
        ]);

        let summary = result.summary();
        assert_eq!(summary[&ObjectKind::Entity].created, 1);
        assert_eq!(summary[&ObjectKind::Entity].already_existed, 1);
        assert_eq!(summary[&ObjectKind::Relationship].failed, 1);
        assert_eq!(summary[&ObjectKind::AlternateKey].not_attempted, 1);
        assert_eq!(summary[&ObjectKind::Entity].total(), 2);
        assert!(!result.is_success());
        assert_eq!(result.failures().count(), 1);
        assert_eq!(result.count(ObjectKind::Entity, ObjectState::is_deployed), 2);
    }

    #[test]
    fn test_outcome_serializes_flat_state() {
        let value = serde_json::to_value(outcome(
            ObjectKind::Entity,
            "cr1_a",
            ObjectState::NotAttempted {
                reason: "cancelled".into(),
            },
        ))
        .unwrap();
        assert_eq!(value["state"], "not_attempted");
        assert_eq!(value["reason"], "cancelled");
        assert_eq!(value["key"]["kind"], "entity");
    }
}
