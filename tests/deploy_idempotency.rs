//! Re-running a deployment must not duplicate anything on the platform

mod helpers;

use erd_deploy::erd_core::ObjectKind;
use erd_deploy::{CancellationFlag, Method, ObjectState};
use pretty_assertions::assert_eq;

use helpers::{orchestrator, plan_for, sequence_provider, FakePlatform, CUSTOMER_ORDER};

#[tokio::test(start_paused = true)]
async fn test_second_run_skips_everything() {
    let platform = FakePlatform::new();
    let plan = plan_for(CUSTOMER_ORDER);
    let orchestrator = orchestrator(&platform, sequence_provider(), 2);

    let first = orchestrator.deploy(&plan).await.unwrap();
    assert!(first.is_success(), "{:#?}", first.failures().collect::<Vec<_>>());
    assert!(first
        .outcomes
        .iter()
        .all(|o| o.state == ObjectState::Created));
    let posts_after_first = platform.post_count();

    let second = orchestrator.deploy(&plan).await.unwrap();
    assert!(second.is_success());
    assert!(second
        .outcomes
        .iter()
        .all(|o| o.state == ObjectState::AlreadyExisted));
    assert_eq!(first.outcomes.len(), second.outcomes.len());

    // Never 4 entities and 2 relationships
    assert_eq!(platform.count("entity"), 2);
    assert_eq!(platform.count("relationship"), 1);
    assert_eq!(platform.count("publisher"), 1);
    assert_eq!(platform.count("solution"), 1);
    assert_eq!(platform.post_count(), posts_after_first);
}

#[tokio::test(start_paused = true)]
async fn test_outcomes_follow_stage_order() {
    let platform = FakePlatform::new();
    let plan = plan_for(CUSTOMER_ORDER);
    let result = orchestrator(&platform, sequence_provider(), 4)
        .deploy(&plan)
        .await
        .unwrap();

    let kinds: Vec<ObjectKind> = result.outcomes.iter().map(|o| o.key.kind).collect();
    let mut sorted = kinds.clone();
    sorted.sort_by_key(|kind| match kind {
        ObjectKind::Publisher => 0,
        ObjectKind::Solution => 1,
        ObjectKind::ChoiceSet => 2,
        ObjectKind::Entity | ObjectKind::Column => 3,
        ObjectKind::Relationship => 4,
        ObjectKind::AlternateKey => 5,
        ObjectKind::SolutionComponent => 6,
    });
    assert_eq!(kinds, sorted);

    // Planned keys appear first, in plan order, followed by solution components
    let planned: Vec<_> = result
        .outcomes
        .iter()
        .filter(|o| o.key.kind != ObjectKind::SolutionComponent)
        .map(|o| o.key.clone())
        .collect();
    assert_eq!(planned, plan.external_keys());

    // The relationship was created after both of its entities
    let requests = platform.requests();
    let last_entity_post = requests
        .iter()
        .rposition(|r| r.method == Method::Post && r.path == "EntityDefinitions")
        .unwrap();
    let relationship_post = requests
        .iter()
        .position(|r| r.method == Method::Post && r.path == "RelationshipDefinitions")
        .unwrap();
    assert!(last_entity_post < relationship_post);
}

#[tokio::test(start_paused = true)]
async fn test_every_deployed_object_joins_the_solution() {
    let platform = FakePlatform::new();
    let plan = plan_for(CUSTOMER_ORDER);
    let result = orchestrator(&platform, sequence_provider(), 2)
        .deploy(&plan)
        .await
        .unwrap();

    let summary = result.summary();
    let expected = plan.entities.len() + plan.relationships.len() + plan.alternate_keys.len();
    assert_eq!(summary[&ObjectKind::SolutionComponent].created, expected);
    assert_eq!(platform.count("component"), expected);
}

#[tokio::test(start_paused = true)]
async fn test_objects_left_by_an_earlier_run_are_reused() {
    let platform = FakePlatform::new();
    let customer_id = platform.seed("entity", "cr1_customer");
    let plan = plan_for(CUSTOMER_ORDER);

    let result = orchestrator(&platform, sequence_provider(), 2)
        .deploy(&plan)
        .await
        .unwrap();

    let customer = result
        .outcome(&plan.entity("cr1_customer").unwrap().external_key())
        .unwrap();
    assert_eq!(customer.state, ObjectState::AlreadyExisted);
    assert_eq!(customer.remote_id.as_deref(), Some(customer_id.as_str()));

    let order = result
        .outcome(&plan.entity("cr1_order").unwrap().external_key())
        .unwrap();
    assert_eq!(order.state, ObjectState::Created);
    assert_eq!(platform.count("entity"), 2);
    assert_eq!(
        platform
            .requests_to(Method::Post, "EntityDefinitions")
            .iter()
            .filter(|r| r.path == "EntityDefinitions")
            .count(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_run_makes_no_calls() {
    let platform = FakePlatform::new();
    let plan = plan_for(CUSTOMER_ORDER);
    let cancel = CancellationFlag::new();
    let orchestrator =
        orchestrator(&platform, sequence_provider(), 2).with_cancellation(cancel.clone());

    cancel.cancel();
    let result = orchestrator.deploy(&plan).await.unwrap();

    assert!(platform.requests().is_empty());
    assert!(result
        .abort_reason
        .as_deref()
        .unwrap()
        .contains("cancelled"));
    assert!(result
        .outcomes
        .iter()
        .all(|o| matches!(o.state, ObjectState::NotAttempted { .. })));
    assert_eq!(result.outcomes.len(), plan.external_keys().len());
}
