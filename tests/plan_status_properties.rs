//! Property-based tests for status derivation, dispatch eligibility and
//! container grouping

use proptest::prelude::*;
use std::collections::HashSet;

use lab_work_orders::external::{Container, Slot};
use lab_work_orders::model::{
    can_be_dispatched, derive_order_status, derive_plan_status, ContainerId, JobStatus, MaterialId,
    OrderStatus, PlanStatus,
};
use lab_work_orders::orchestration::group_by_container;

fn order_status() -> impl Strategy<Value = OrderStatus> {
    prop_oneof![
        Just(OrderStatus::Queued),
        Just(OrderStatus::Active),
        Just(OrderStatus::Broken),
        Just(OrderStatus::Completed),
        Just(OrderStatus::Cancelled),
        Just(OrderStatus::Concluded),
    ]
}

fn job_status() -> impl Strategy<Value = JobStatus> {
    prop_oneof![
        Just(JobStatus::Queued),
        Just(JobStatus::Active),
        Just(JobStatus::Completed),
        Just(JobStatus::Cancelled),
        Just(JobStatus::Broken),
    ]
}

/// Containers with up to 6 slots each; material ids are unique across containers
fn containers() -> impl Strategy<Value = Vec<Container>> {
    prop::collection::vec(1usize..=6, 1..8).prop_map(|sizes| {
        let mut next = 0;
        sizes
            .into_iter()
            .enumerate()
            .map(|(c, size)| {
                let slots = (0..size)
                    .map(|s| {
                        next += 1;
                        Slot {
                            address: format!("A{}", s + 1),
                            material_id: Some(MaterialId(format!("m{next}"))),
                        }
                    })
                    .collect();
                Container {
                    id: ContainerId(format!("c{c}")),
                    barcode: format!("BC{c}"),
                    num_of_rows: 1,
                    num_of_cols: 6,
                    slots,
                }
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn test_cancellation_dominates(configured in any::<bool>(), orders in prop::collection::vec(order_status(), 0..6)) {
        prop_assert_eq!(derive_plan_status(true, configured, &orders), PlanStatus::Cancelled);
    }

    #[test]
    fn test_broken_order_breaks_plan(
        mut orders in prop::collection::vec(order_status(), 0..6),
        at in any::<prop::sample::Index>(),
    ) {
        orders.push(OrderStatus::Broken);
        let i = at.index(orders.len());
        let last = orders.len() - 1;
        orders.swap(i, last);
        prop_assert_eq!(derive_plan_status(false, true, &orders), PlanStatus::Broken);
    }

    #[test]
    fn test_unconfigured_plan_is_under_construction(orders in prop::collection::vec(order_status(), 0..6)) {
        prop_assert_eq!(derive_plan_status(false, false, &orders), PlanStatus::Construction);
    }

    #[test]
    fn test_plan_status_matches_order_mix(orders in prop::collection::vec(order_status(), 1..6)) {
        let status = derive_plan_status(false, true, &orders);
        let expected = if orders.contains(&OrderStatus::Broken) {
            PlanStatus::Broken
        } else if orders.iter().all(|s| s.is_closed()) {
            PlanStatus::Closed
        } else if orders.iter().all(|s| *s == OrderStatus::Queued) {
            PlanStatus::Construction
        } else {
            PlanStatus::Active
        };
        prop_assert_eq!(status, expected);
    }

    #[test]
    fn test_dispatch_eligibility(
        cancelled in any::<bool>(),
        orders in prop::collection::vec(order_status(), 1..6),
        index in 0usize..7,
    ) {
        let expected = !cancelled
            && index < orders.len()
            && orders[index] == OrderStatus::Queued
            && orders[..index].iter().all(|s| s.is_closed());
        prop_assert_eq!(can_be_dispatched(cancelled, &orders, index), expected);
    }

    #[test]
    fn test_at_most_one_order_is_dispatchable(orders in prop::collection::vec(order_status(), 1..6)) {
        let eligible = (0..orders.len()).filter(|i| can_be_dispatched(false, &orders, *i)).count();
        prop_assert!(eligible <= 1);
    }

    #[test]
    fn test_queued_orders_ignore_jobs(jobs in prop::collection::vec(job_status(), 0..6), resolving in any::<bool>()) {
        prop_assert_eq!(derive_order_status(OrderStatus::Queued, &jobs, resolving), OrderStatus::Queued);
    }

    #[test]
    fn test_active_order_follows_jobs(jobs in prop::collection::vec(job_status(), 1..6), resolving in any::<bool>()) {
        let status = derive_order_status(OrderStatus::Active, &jobs, resolving);
        if jobs.contains(&JobStatus::Broken) {
            prop_assert_eq!(status, OrderStatus::Broken);
        } else if jobs.iter().all(|j| j.is_closed()) {
            prop_assert_eq!(status, OrderStatus::Concluded);
        } else {
            prop_assert_eq!(status, OrderStatus::Active);
        }
    }

    #[test]
    fn test_broken_order_stays_broken_without_resolution(jobs in prop::collection::vec(job_status(), 0..6)) {
        prop_assert_eq!(derive_order_status(OrderStatus::Broken, &jobs, false), OrderStatus::Broken);
    }

    #[test]
    fn test_one_group_per_distinct_container(
        all in containers(),
        picks in prop::collection::vec(any::<prop::sample::Index>(), 1..20),
    ) {
        let materials: Vec<(MaterialId, ContainerId)> = all
            .iter()
            .flat_map(|c| c.slots.iter().filter_map(|s| s.material_id.clone()).map(|m| (m, c.id.clone())))
            .collect();
        let members: Vec<MaterialId> = picks.iter().map(|i| materials[i.index(materials.len())].0.clone()).collect();
        let expected: HashSet<ContainerId> = picks
            .iter()
            .map(|i| materials[i.index(materials.len())].1.clone())
            .collect();

        // Catalogs may return the same container more than once
        let mut returned = all.clone();
        returned.extend(all.iter().cloned());

        let grouped = group_by_container(&members, returned).unwrap();
        let ids: HashSet<ContainerId> = grouped.iter().map(|c| c.id.clone()).collect();
        prop_assert_eq!(grouped.len(), expected.len());
        prop_assert_eq!(ids, expected);
    }

    #[test]
    fn test_member_outside_every_container_is_reported(all in containers()) {
        let mut members: Vec<MaterialId> = all
            .iter()
            .flat_map(|c| c.slots.iter().filter_map(|s| s.material_id.clone()))
            .collect();
        members.push(MaterialId::from("stray"));

        let missing = group_by_container(&members, all).unwrap_err();
        prop_assert_eq!(missing, vec![MaterialId::from("stray")]);
    }
}
