//! Transient failures, Retry-After, permanent rejections, and credential refresh

mod helpers;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

use erd_deploy::erd_core::ObjectKind;
use erd_deploy::{ApiResponse, DeployError, Method, ObjectState, RemoteError, TransportError};
use pretty_assertions::assert_eq;

use helpers::{
    odata_error, orchestrator, plan_for, sequence_provider, FailingAfterProvider, FakePlatform,
    CUSTOMER_ORDER,
};

const INVOICE: &str = "erDiagram\n  Invoice { string number PK }\n";

fn entity_posts(platform: &FakePlatform) -> Vec<tokio::time::Instant> {
    platform
        .requests_to(Method::Post, "EntityDefinitions")
        .into_iter()
        .filter(|r| r.path == "EntityDefinitions")
        .map(|r| r.at)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_three_transient_failures_then_success() {
    let platform = FakePlatform::new();
    platform.script(
        Method::Post,
        "EntityDefinitions",
        vec![
            odata_error(503, "0x80040216", "Service unavailable"),
            odata_error(503, "0x80040216", "Service unavailable"),
            odata_error(503, "0x80040216", "Service unavailable"),
        ],
    );
    let plan = plan_for(INVOICE);

    let result = orchestrator(&platform, sequence_provider(), 1)
        .deploy(&plan)
        .await
        .unwrap();

    let invoice = result.outcome(&plan.entities[0].external_key()).unwrap();
    assert_eq!(invoice.state, ObjectState::Created);
    // One existence check plus four create attempts
    assert_eq!(invoice.attempts, 5);

    let posts = entity_posts(&platform);
    assert_eq!(posts.len(), 4);
    let gaps: Vec<Duration> = posts.windows(2).map(|w| w[1] - w[0]).collect();
    assert!(gaps.windows(2).all(|g| g[0] < g[1]), "gaps not increasing: {:?}", gaps);
    assert!(gaps[0] >= Duration::from_millis(100));
    assert!(gaps[1] >= Duration::from_millis(200));
    assert!(gaps[2] >= Duration::from_millis(400));
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_overrides_backoff() {
    let platform = FakePlatform::new();
    platform.script(
        Method::Post,
        "EntityDefinitions",
        vec![odata_error(429, "0x80072322", "Too many requests").with_header("Retry-After", "7")],
    );
    let plan = plan_for(INVOICE);

    let result = orchestrator(&platform, sequence_provider(), 1)
        .deploy(&plan)
        .await
        .unwrap();

    assert!(result.is_success());
    let posts = entity_posts(&platform);
    assert_eq!(posts.len(), 2);
    assert!(posts[1] - posts[0] >= Duration::from_secs(7));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_fail_only_that_object() {
    let platform = FakePlatform::new();
    platform.script_results(
        Method::Post,
        "EntityDefinitions",
        vec![
            Err(TransportError::Timeout("deadline elapsed".into())),
            Ok(ApiResponse::new(502)),
            Ok(ApiResponse::new(504)),
            Ok(ApiResponse::new(500)),
        ],
    );
    let plan = plan_for(CUSTOMER_ORDER);

    let result = orchestrator(&platform, sequence_provider(), 1)
        .deploy(&plan)
        .await
        .unwrap();

    let customer = result
        .outcome(&plan.entity("cr1_customer").unwrap().external_key())
        .unwrap();
    match &customer.state {
        ObjectState::Failed {
            error: RemoteError::Transient { attempts, status, .. },
        } => {
            assert_eq!(*attempts, 4);
            assert_eq!(*status, Some(500));
        }
        other => panic!("expected transient failure, got {:?}", other),
    }

    let order = result
        .outcome(&plan.entity("cr1_order").unwrap().external_key())
        .unwrap();
    assert_eq!(order.state, ObjectState::Created);

    // The relationship needs both ends; it is skipped, not failed
    let relationship = result.outcome(&plan.relationships[0].external_key()).unwrap();
    assert!(matches!(
        &relationship.state,
        ObjectState::NotAttempted { reason } if reason.contains("cr1_customer")
    ));
    assert!(result.abort_reason.is_none());
    assert!(!result.is_success());
}

#[tokio::test(start_paused = true)]
async fn test_permanent_rejection_is_not_retried() {
    let platform = FakePlatform::new();
    platform.script(
        Method::Post,
        "RelationshipDefinitions",
        vec![odata_error(400, "0x80040203", "Invalid cascade configuration")],
    );
    let plan = plan_for(CUSTOMER_ORDER);

    let result = orchestrator(&platform, sequence_provider(), 2)
        .deploy(&plan)
        .await
        .unwrap();

    let relationship = result.outcome(&plan.relationships[0].external_key()).unwrap();
    match &relationship.state {
        ObjectState::Failed {
            error: RemoteError::Permanent { status, message },
        } => {
            assert_eq!(*status, Some(400));
            assert!(message.contains("Invalid cascade configuration"));
        }
        other => panic!("expected permanent failure, got {:?}", other),
    }
    assert_eq!(
        platform
            .requests_to(Method::Post, "RelationshipDefinitions")
            .len(),
        1
    );

    // Entities and their keys are unaffected
    let summary = result.summary();
    assert_eq!(summary[&ObjectKind::Entity].created, 2);
    assert_eq!(summary[&ObjectKind::AlternateKey].created, plan.alternate_keys.len());
    assert_eq!(summary[&ObjectKind::Relationship].failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_token_is_refreshed_once() {
    let platform = FakePlatform::new();
    platform.reject_token("token-1");
    let plan = plan_for(CUSTOMER_ORDER);
    let orchestrator = orchestrator(&platform, sequence_provider(), 2);

    let result = orchestrator.deploy(&plan).await.unwrap();

    assert!(result.is_success());
    assert_eq!(orchestrator.client().tokens().refresh_count(), 2);
    let requests = platform.requests();
    assert_eq!(requests[0].bearer, "token-1");
    assert!(requests[1..].iter().all(|r| r.bearer == "token-2"));
}

#[tokio::test(start_paused = true)]
async fn test_credential_failure_mid_run_stops_all_calls() {
    let platform = FakePlatform::new();
    platform.reject_token("token-1");
    let provider = Arc::new(FailingAfterProvider {
        remaining: AtomicUsize::new(1),
    });
    let plan = plan_for(CUSTOMER_ORDER);

    let result = orchestrator(&platform, provider, 2)
        .deploy(&plan)
        .await
        .unwrap();

    assert_eq!(platform.requests().len(), 1);
    let publisher = result.outcome(&plan.publisher.external_key()).unwrap();
    assert!(matches!(
        publisher.state,
        ObjectState::Failed {
            error: RemoteError::Auth(_)
        }
    ));
    assert!(result
        .abort_reason
        .as_deref()
        .unwrap()
        .contains("credential"));
    assert!(result.outcomes[1..]
        .iter()
        .all(|o| matches!(o.state, ObjectState::NotAttempted { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_initial_credential_failure_is_a_run_error() {
    let platform = FakePlatform::new();
    let provider = Arc::new(FailingAfterProvider {
        remaining: AtomicUsize::new(0),
    });

    let err = orchestrator(&platform, provider, 2)
        .deploy(&plan_for(CUSTOMER_ORDER))
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::Auth(_)));
    assert!(platform.requests().is_empty());
}
