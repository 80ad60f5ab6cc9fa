//! Plan construction, order creation and cancellation

mod fixtures;

use fixtures::{product, project, selections, Harness, OWNER};
use lab_work_orders::model::{ModuleSelection, OrderStatus, PlanStatus};
use lab_work_orders::WorkOrderError;

#[tokio::test]
async fn test_new_plan_is_under_construction() {
    let h = Harness::new();
    let plan = h.service.create_plan("  Jeff@Sanger.ac.uk ").await.unwrap();

    assert_eq!(plan.owner_email, "jeff@sanger.ac.uk");
    assert_eq!(h.service.plan_status(plan.id).await.unwrap(), PlanStatus::Construction);

    let err = h.service.create_plan("   ").await.unwrap_err();
    assert!(matches!(err, WorkOrderError::Validation(_)));
}

#[tokio::test]
async fn test_create_orders_follows_product_processes() {
    let h = Harness::new();
    let set_id = h.standard_set();
    let (plan, orders) = h.plan_with_orders(Some(set_id)).await;

    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].order_index, 0);
    assert_eq!(orders[1].order_index, 1);
    assert!(orders.iter().all(|o| o.status == OrderStatus::Queued));
    assert_eq!(orders[0].original_set_id, Some(set_id));
    assert_eq!(orders[1].original_set_id, None);

    let modules: Vec<_> = orders[1].module_choices.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(modules, vec!["HiSeq X", "Read Length"]);
    assert_eq!(orders[1].module_choices[1].selected_value, Some(150));

    // Every order is still queued, so the plan has not started
    assert_eq!(h.service.plan_status(plan.id).await.unwrap(), PlanStatus::Construction);
    assert_eq!(
        h.events.event_types(),
        vec![
            "aker.events.work_order.queued".to_string(),
            "aker.events.work_order.queued".to_string()
        ]
    );
}

#[tokio::test]
async fn test_create_orders_is_idempotent() {
    let h = Harness::new();
    let set_id = h.standard_set();
    let (plan, orders) = h.plan_with_orders(Some(set_id)).await;

    let again = h
        .service
        .create_orders(plan.id, &selections(), None)
        .await
        .unwrap();

    assert_eq!(again, orders);
    assert_eq!(h.service.load_orders(plan.id).await.unwrap().len(), 2);
    assert_eq!(h.events.events().len(), 2);
}

#[tokio::test]
async fn test_create_orders_needs_a_product() {
    let h = Harness::new();
    let plan = h.service.create_plan(OWNER).await.unwrap();
    h.service.select_project(plan.id, project()).await.unwrap();

    let err = h
        .service
        .create_orders(plan.id, &selections(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkOrderError::Configuration(_)));
}

#[tokio::test]
async fn test_create_orders_rejects_bad_selections() {
    let h = Harness::new();
    let plan = h.service.create_plan(OWNER).await.unwrap();
    h.service.select_product(plan.id, product()).await.unwrap();

    let one_process = vec![vec![ModuleSelection::new(10)]];
    let err = h
        .service
        .create_orders(plan.id, &one_process, None)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkOrderError::Validation(_)));

    // Module 20 belongs to the second process
    let misplaced = vec![vec![ModuleSelection::new(20)], vec![ModuleSelection::new(21)]];
    let err = h
        .service
        .create_orders(plan.id, &misplaced, None)
        .await
        .unwrap_err();
    match err {
        WorkOrderError::Validation(message) => assert!(message.contains("module 20"), "{message}"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(h.service.load_orders(plan.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_plan_inputs_are_frozen_once_orders_exist() {
    let h = Harness::new();
    let set_id = h.standard_set();
    let (plan, _) = h.plan_with_orders(Some(set_id)).await;

    let err = h.service.select_product(plan.id, product()).await.unwrap_err();
    assert!(matches!(err, WorkOrderError::Precondition(_)));

    let other = h.registry.add_set("other", vec![], false);
    let err = h.service.select_original_set(plan.id, other).await.unwrap_err();
    assert!(matches!(err, WorkOrderError::Precondition(_)));
}

#[tokio::test]
async fn test_unknown_original_set_is_rejected() {
    let h = Harness::new();
    let plan = h.service.create_plan(OWNER).await.unwrap();

    let err = h
        .service
        .select_original_set(plan.id, lab_work_orders::model::SetId::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkOrderError::Validation(_)));
}

#[tokio::test]
async fn test_cancelled_plan_blocks_dispatch_and_edits() {
    let h = Harness::new();
    let set_id = h.standard_set();
    let (plan, orders) = h.plan_with_orders(Some(set_id)).await;

    h.service.cancel_plan(plan.id).await.unwrap();
    assert_eq!(h.service.plan_status(plan.id).await.unwrap(), PlanStatus::Cancelled);

    let err = h.service.dispatch(orders[0].id).await.unwrap_err();
    assert!(matches!(err, WorkOrderError::NotDispatchable { .. }));
    assert_eq!(h.registry.mutation_count(), 0);

    let err = h.service.select_project(plan.id, project()).await.unwrap_err();
    assert!(matches!(err, WorkOrderError::Precondition(_)));
    let err = h.service.cancel_plan(plan.id).await.unwrap_err();
    assert!(matches!(err, WorkOrderError::Precondition(_)));
}

#[tokio::test]
async fn test_closed_plan_cannot_be_cancelled() {
    let h = Harness::new();
    let set_id = h.standard_set();
    let (plan, orders) = h.plan_with_orders(Some(set_id)).await;

    for order in &orders {
        h.service.dispatch(order.id).await.unwrap();
        h.complete_all_jobs(order).await;
        if order.order_index == 0 {
            let output = h.registry.add_set("output", vec!["m9".into()], false);
            h.service.assign_finished_set(order.id, output).await.unwrap();
        }
    }

    assert_eq!(h.service.plan_status(plan.id).await.unwrap(), PlanStatus::Closed);
    let err = h.service.cancel_plan(plan.id).await.unwrap_err();
    assert!(matches!(err, WorkOrderError::Precondition(_)));
}

#[tokio::test]
async fn test_editable_set_is_an_unlocked_copy() {
    let h = Harness::new();
    let set_id = h.standard_set();
    let (_, orders) = h.plan_with_orders(Some(set_id)).await;

    let editable = h.service.create_editable_set(orders[0].id).await.unwrap();
    assert!(!editable.locked);
    assert_eq!(editable.size, 10);
    assert_eq!(
        h.service.load_order(orders[0].id).await.unwrap().set_id,
        Some(editable.id)
    );
    assert_eq!(h.service.num_samples(orders[0].id).await.unwrap(), Some(10));

    let err = h.service.create_editable_set(orders[0].id).await.unwrap_err();
    assert!(matches!(err, WorkOrderError::Configuration(_)));

    // Dispatch locks the editable copy in place
    let report = h.service.dispatch(orders[0].id).await.unwrap();
    assert!(report.newly_locked);
    assert!(h.registry.set(&editable.id).unwrap().locked);
}
