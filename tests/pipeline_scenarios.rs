//! Diagram text through plan to a deployed (fake) environment

mod helpers;

use erd_deploy::erd_core::{parse_choice_sets, AttributeKind, ExternalKey, ObjectKind};
use erd_deploy::{
    build_plan, deploy_with_transport, DeployError, Method, ObjectState, PipelineError,
};
use pretty_assertions::assert_eq;

use helpers::{odata_error, sequence_provider, test_config, FakePlatform, CUSTOMER_ORDER};

const ORDER_WITH_STATUS: &str =
    "erDiagram\n  Order {\n    string id PK\n    OrderStatus status NOT NULL\n    money total\n  }\n";

const ORDER_STATUS_YAML: &str = r#"
- name: OrderStatus
  displayName: Order Status
  options:
    - label: Draft
    - label: Submitted
    - label: Shipped
"#;

#[tokio::test(start_paused = true)]
async fn test_customer_order_end_to_end_twice() {
    let config = test_config();
    let output = build_plan(CUSTOMER_ORDER, &[], &config).unwrap();
    assert_eq!(output.plan.entities.len(), 2);
    assert_eq!(output.plan.relationships.len(), 1);
    assert!(output.plan.choice_sets.is_empty());

    let platform = FakePlatform::new();
    for _ in 0..2 {
        let result = deploy_with_transport(&output.plan, sequence_provider(), platform.clone(), &config)
            .await
            .unwrap();
        assert!(result.is_success());
    }

    assert_eq!(platform.count("entity"), 2);
    assert_eq!(platform.count("relationship"), 1);
    assert!(platform.contains("relationship", "cr1_Customer_Order"));
}

#[tokio::test(start_paused = true)]
async fn test_many_to_many_deploys_through_a_junction() {
    let config = test_config();
    let output = build_plan(
        "erDiagram\n  A { string id PK }\n  B { string id PK }\n  A }o--o{ B : links\n",
        &[],
        &config,
    )
    .unwrap();
    let plan = &output.plan;
    assert_eq!(plan.entities.len(), 3);
    assert_eq!(plan.junctions().count(), 1);
    assert_eq!(plan.relationships.len(), 2);

    let platform = FakePlatform::new();
    let result = deploy_with_transport(plan, sequence_provider(), platform.clone(), &config)
        .await
        .unwrap();
    assert!(result.is_success(), "{:#?}", result.failures().collect::<Vec<_>>());

    let summary = result.summary();
    assert_eq!(summary[&ObjectKind::Entity].created, 3);
    assert_eq!(summary[&ObjectKind::Relationship].created, 2);

    // The link key spans both lookups, so it waits for the relationships
    let link_key = plan
        .alternate_keys
        .iter()
        .find(|k| k.key_attributes.len() == 2)
        .unwrap();
    assert_eq!(
        result.outcome(&link_key.external_key()).unwrap().state,
        ObjectState::Created
    );
    let requests = platform.requests();
    let last_relationship = requests
        .iter()
        .rposition(|r| r.method == Method::Post && r.path == "RelationshipDefinitions")
        .unwrap();
    let link_key_post = requests
        .iter()
        .position(|r| {
            r.method == Method::Post
                && r.path.ends_with("/Keys")
                && r.path.contains(&link_key.entity_logical_name)
        })
        .unwrap();
    assert!(last_relationship < link_key_post);
}

#[tokio::test(start_paused = true)]
async fn test_choice_set_is_created_before_its_column() {
    let config = test_config();
    let choice_sets = parse_choice_sets(ORDER_STATUS_YAML).unwrap();
    let output = build_plan(ORDER_WITH_STATUS, &choice_sets, &config).unwrap();
    let order = output.plan.entity("cr1_order").unwrap();
    assert!(matches!(
        &order.column("cr1_status").unwrap().kind,
        AttributeKind::Choice { choice_set } if choice_set == "cr1_orderstatus"
    ));

    let platform = FakePlatform::new();
    let result = deploy_with_transport(&output.plan, sequence_provider(), platform.clone(), &config)
        .await
        .unwrap();
    assert!(result.is_success());

    let requests = platform.requests();
    let choice_set_post = requests
        .iter()
        .position(|r| r.method == Method::Post && r.path == "GlobalOptionSetDefinitions")
        .unwrap();
    let first_column_post = requests
        .iter()
        .position(|r| r.method == Method::Post && r.path.ends_with("/Attributes"))
        .unwrap();
    assert!(choice_set_post < first_column_post);
    assert_eq!(platform.count("column"), order.columns.len());
}

#[tokio::test(start_paused = true)]
async fn test_failed_choice_set_skips_only_its_column() {
    let config = test_config();
    let choice_sets = parse_choice_sets(ORDER_STATUS_YAML).unwrap();
    let output = build_plan(ORDER_WITH_STATUS, &choice_sets, &config).unwrap();
    let plan = &output.plan;

    let platform = FakePlatform::new();
    platform.script(
        Method::Post,
        "GlobalOptionSetDefinitions",
        vec![odata_error(400, "0x80044363", "A global option set with this name exists in another publisher.")],
    );
    let result = deploy_with_transport(plan, sequence_provider(), platform.clone(), &config)
        .await
        .unwrap();

    let status = result
        .outcome(&ExternalKey::new(ObjectKind::Column, "cr1_order.cr1_status"))
        .unwrap();
    assert!(matches!(
        &status.state,
        ObjectState::NotAttempted { reason } if reason.contains("cr1_orderstatus")
    ));
    assert_eq!(status.attempts, 0);

    let total = result
        .outcome(&ExternalKey::new(ObjectKind::Column, "cr1_order.cr1_total"))
        .unwrap();
    assert_eq!(total.state, ObjectState::Created);
    assert_eq!(
        result.outcome(&plan.entities[0].external_key()).unwrap().state,
        ObjectState::Created
    );
}

#[tokio::test(start_paused = true)]
async fn test_inconsistent_plan_is_rejected_before_any_call() {
    let config = test_config();
    let mut plan = build_plan(CUSTOMER_ORDER, &[], &config).unwrap().plan;
    plan.relationships[0].referencing_entity = "cr1_invoice".to_string();

    let platform = FakePlatform::new();
    let err = deploy_with_transport(&plan, sequence_provider(), platform.clone(), &config)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::InvalidPlan(_)));
    assert!(platform.requests().is_empty());
}

#[test]
fn test_dry_run_serializes_the_plan() {
    let output = build_plan(CUSTOMER_ORDER, &[], &test_config()).unwrap();
    let json = output.plan.to_json_pretty().unwrap();
    assert!(json.contains("\"cr1_Customer_Order\""));
    assert!(json.contains("\"referencing_entity\": \"cr1_order\""));
}

#[test]
fn test_choice_set_without_options_is_rejected() {
    assert!(parse_choice_sets("- name: Empty\n  options: []\n").is_err());
}

#[test]
fn test_strict_validation_blocks_generation() {
    let mut config = test_config();
    config.validation.synthesize_primary_keys = false;
    let err = build_plan("erDiagram\n  Note { string body }\n", &[], &config).unwrap_err();
    match err {
        PipelineError::Validation(report) => assert_eq!(report.errors().count(), 1),
        other => panic!("expected validation failure, got {}", other),
    }
}
