//! Property tests for the dependency resolver and cascade closure.

mod common;

use std::collections::{HashMap, HashSet};

use abathur::domain::models::TaskStatus;
use common::setup_queue;
use proptest::prelude::*;
use uuid::Uuid;

/// Raw DAG material: up to three prerequisite picks per node. Node `i` may
/// depend only on nodes with smaller indices, so graphs are acyclic by
/// construction.
fn arb_dag(size: usize) -> impl Strategy<Value = Vec<Vec<prop::sample::Index>>> {
    prop::collection::vec(
        prop::collection::vec(any::<prop::sample::Index>(), 0..=3),
        size,
    )
}

/// Resolve index picks into concrete, deduplicated edge lists.
fn materialize(raw: &[Vec<prop::sample::Index>]) -> Vec<Vec<usize>> {
    raw.iter()
        .enumerate()
        .map(|(i, picks)| {
            if i == 0 {
                return Vec::new();
            }
            let mut deps: Vec<usize> = picks.iter().map(|pick| pick.index(i)).collect();
            deps.sort_unstable();
            deps.dedup();
            deps
        })
        .collect()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

async fn enqueue_dag(
    queue: &common::TestQueue,
    edges: &[Vec<usize>],
) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = Vec::with_capacity(edges.len());
    for deps in edges {
        let prereqs: Vec<Uuid> = deps.iter().map(|&i| ids[i]).collect();
        ids.push(queue.enqueue("property task", &prereqs).await);
    }
    ids
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Execution order respects every unresolved edge: prerequisites come
    /// before dependents, and no task is lost or duplicated.
    #[test]
    fn prop_execution_order_is_topological(raw in arb_dag(12)) {
        let edges = materialize(&raw);
        runtime().block_on(async {
            let queue = setup_queue().await;
            let ids = enqueue_dag(&queue, &edges).await;

            let order = queue
                .resolver
                .get_execution_order(&ids)
                .await
                .expect("acyclic graph must order");

            prop_assert_eq!(order.len(), ids.len());
            let position: HashMap<Uuid, usize> =
                order.iter().enumerate().map(|(i, &id)| (id, i)).collect();

            for (node, deps) in edges.iter().enumerate() {
                for &dep in deps {
                    prop_assert!(
                        position[&ids[dep]] < position[&ids[node]],
                        "prerequisite must precede dependent"
                    );
                }
            }
            Ok(())
        })?;
    }

    /// Depth is 0 for roots and 1 + max(prerequisite depths) otherwise.
    #[test]
    fn prop_depth_matches_recurrence(raw in arb_dag(10)) {
        let edges = materialize(&raw);
        runtime().block_on(async {
            let queue = setup_queue().await;
            let ids = enqueue_dag(&queue, &edges).await;

            let mut expected: Vec<u32> = vec![0; ids.len()];
            for (node, deps) in edges.iter().enumerate() {
                expected[node] = deps.iter().map(|&d| expected[d] + 1).max().unwrap_or(0);
            }

            for (node, id) in ids.iter().enumerate() {
                let depth = queue
                    .resolver
                    .calculate_dependency_depth(*id)
                    .await
                    .unwrap();
                prop_assert_eq!(depth, expected[node]);
            }
            Ok(())
        })?;
    }

    /// Failing a task cancels exactly its unresolved-edge descendants.
    #[test]
    fn prop_cascade_cancels_exact_closure(raw in arb_dag(10), root in 0usize..10) {
        let edges = materialize(&raw);
        runtime().block_on(async {
            let queue = setup_queue().await;
            let ids = enqueue_dag(&queue, &edges).await;

            // Expected closure: nodes that depend on `root` transitively.
            let mut expected: HashSet<usize> = HashSet::new();
            let mut changed = true;
            while changed {
                changed = false;
                for (node, deps) in edges.iter().enumerate() {
                    if expected.contains(&node) {
                        continue;
                    }
                    if deps.iter().any(|&d| d == root || expected.contains(&d)) {
                        expected.insert(node);
                        changed = true;
                    }
                }
            }

            let cancelled = queue
                .service
                .fail_task(ids[root], "prop failure")
                .await
                .unwrap();
            let cancelled_set: HashSet<Uuid> = cancelled.into_iter().collect();
            let expected_set: HashSet<Uuid> = expected.iter().map(|&i| ids[i]).collect();
            prop_assert_eq!(cancelled_set, expected_set);

            // Statuses reflect exactly the closure.
            for (node, id) in ids.iter().enumerate() {
                let status = queue.service.get_task(*id).await.unwrap().unwrap().status;
                if node == root {
                    prop_assert_eq!(status, TaskStatus::Failed);
                } else if expected.contains(&node) {
                    prop_assert_eq!(status, TaskStatus::Cancelled);
                } else {
                    prop_assert!(matches!(status, TaskStatus::Ready | TaskStatus::Blocked));
                }
            }
            Ok(())
        })?;
    }

    /// Completing tasks in topological order keeps the readiness
    /// invariants: READY iff all prerequisites completed, BLOCKED otherwise.
    #[test]
    fn prop_readiness_invariants_hold(raw in arb_dag(8)) {
        let edges = materialize(&raw);
        runtime().block_on(async {
            let queue = setup_queue().await;
            let ids = enqueue_dag(&queue, &edges).await;

            let order = queue.resolver.get_execution_order(&ids).await.unwrap();
            let mut completed: HashSet<Uuid> = HashSet::new();

            for next in order {
                // Check invariants over the whole set before each step.
                for (node, id) in ids.iter().enumerate() {
                    if completed.contains(id) {
                        continue;
                    }
                    let status = queue.service.get_task(*id).await.unwrap().unwrap().status;
                    let all_met = edges[node].iter().all(|&d| completed.contains(&ids[d]));
                    if all_met {
                        prop_assert_eq!(status, TaskStatus::Ready);
                    } else {
                        prop_assert_eq!(status, TaskStatus::Blocked);
                    }
                }

                queue.service.complete_task(next).await.unwrap();
                completed.insert(next);
            }
            Ok(())
        })?;
    }
}
