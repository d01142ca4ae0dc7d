//! Dependency graph computations over the unresolved edge set.
//!
//! The resolver holds a short-lived adjacency cache rebuilt from the store
//! on demand. The queue service invalidates it after every mutation that
//! changes the edge set or readiness; the TTL is only a backstop against
//! out-of-band writers.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::TaskStatus;
use crate::domain::ports::TaskRepository;

/// Default cache lifetime when no explicit invalidation arrives.
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct GraphSnapshot {
    /// dependent -> unresolved prerequisites
    prereqs_of: HashMap<Uuid, Vec<Uuid>>,
    /// prerequisite -> unresolved dependents
    dependents_of: HashMap<Uuid, Vec<Uuid>>,
}

struct CacheState {
    built_at: Instant,
    graph: Arc<GraphSnapshot>,
    depths: HashMap<Uuid, u32>,
}

pub struct DependencyResolver {
    repo: Arc<dyn TaskRepository>,
    cache: RwLock<Option<CacheState>>,
    cache_ttl: Duration,
}

impl DependencyResolver {
    pub fn new(repo: Arc<dyn TaskRepository>) -> Self {
        Self {
            repo,
            cache: RwLock::new(None),
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }

    pub fn with_cache_ttl(repo: Arc<dyn TaskRepository>, cache_ttl: Duration) -> Self {
        Self {
            repo,
            cache: RwLock::new(None),
            cache_ttl,
        }
    }

    /// Drop the cached graph and depth memo. Called by the queue service
    /// after any edge insert, edge resolution, or readiness change.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    async fn graph(&self) -> DomainResult<Arc<GraphSnapshot>> {
        {
            let cache = self.cache.read().await;
            if let Some(state) = cache.as_ref() {
                if state.built_at.elapsed() < self.cache_ttl {
                    return Ok(Arc::clone(&state.graph));
                }
            }
        }

        let edges = self.repo.unresolved_edges().await?;
        let mut prereqs_of: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        let mut dependents_of: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for edge in edges {
            prereqs_of
                .entry(edge.dependent_task_id)
                .or_default()
                .push(edge.prerequisite_task_id);
            dependents_of
                .entry(edge.prerequisite_task_id)
                .or_default()
                .push(edge.dependent_task_id);
        }

        let graph = Arc::new(GraphSnapshot {
            prereqs_of,
            dependents_of,
        });
        *self.cache.write().await = Some(CacheState {
            built_at: Instant::now(),
            graph: Arc::clone(&graph),
            depths: HashMap::new(),
        });
        Ok(graph)
    }

    /// Check whether adding edges `candidate -> p` for each new prerequisite
    /// would create a cycle. A cycle exists when some `p` already reaches
    /// `candidate` through unresolved prerequisite edges.
    pub async fn detect_circular_dependencies(
        &self,
        new_prerequisites: &[Uuid],
        candidate_task_id: Uuid,
    ) -> DomainResult<()> {
        if new_prerequisites.contains(&candidate_task_id) {
            return Err(DomainError::SelfDependency(candidate_task_id));
        }

        let graph = self.graph().await?;
        for &prereq in new_prerequisites {
            if let Some(mut path) = reach(&graph.prereqs_of, prereq, candidate_task_id) {
                path.insert(0, candidate_task_id);
                path.push(candidate_task_id);
                let rendered: Vec<String> = path.iter().map(Uuid::to_string).collect();
                return Err(DomainError::DependencyCycle {
                    path: rendered.join(" -> "),
                });
            }
        }
        Ok(())
    }

    /// Depth in the unresolved-prerequisite graph: 0 for roots, otherwise
    /// `1 + max(depth of prerequisites)`. Memoized until invalidation.
    pub async fn calculate_dependency_depth(&self, task_id: Uuid) -> DomainResult<u32> {
        {
            let cache = self.cache.read().await;
            if let Some(state) = cache.as_ref() {
                if state.built_at.elapsed() < self.cache_ttl {
                    if let Some(depth) = state.depths.get(&task_id) {
                        return Ok(*depth);
                    }
                }
            }
        }

        let graph = self.graph().await?;
        let mut memo = HashMap::new();
        let mut visiting = HashSet::new();
        let depth = depth_of(&graph.prereqs_of, task_id, &mut memo, &mut visiting)?;

        let mut cache = self.cache.write().await;
        if let Some(state) = cache.as_mut() {
            state.depths.extend(memo);
        }
        Ok(depth)
    }

    /// Kahn's algorithm restricted to the supplied set and their mutual
    /// unresolved edges. Deterministic: zero-indegree candidates are taken
    /// in `(depth asc, submitted_at asc, id asc)` order.
    pub async fn get_execution_order(&self, task_ids: &[Uuid]) -> DomainResult<Vec<Uuid>> {
        if task_ids.is_empty() {
            return Ok(Vec::new());
        }
        if task_ids.len() == 1 {
            return Ok(vec![task_ids[0]]);
        }

        let set: HashSet<Uuid> = task_ids.iter().copied().collect();
        let graph = self.graph().await?;

        let tasks = self.repo.get_tasks(task_ids).await?;
        let submitted: HashMap<Uuid, chrono::DateTime<chrono::Utc>> =
            tasks.iter().map(|t| (t.id, t.submitted_at)).collect();

        let mut depths = HashMap::new();
        for &id in &set {
            let mut visiting = HashSet::new();
            depth_of(&graph.prereqs_of, id, &mut depths, &mut visiting)?;
        }

        let mut indegree: HashMap<Uuid, usize> = set.iter().map(|&id| (id, 0)).collect();
        let mut edges_out: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for &id in &set {
            for prereq in graph.prereqs_of.get(&id).into_iter().flatten() {
                if set.contains(prereq) {
                    *indegree.get_mut(&id).unwrap() += 1;
                    edges_out.entry(*prereq).or_default().push(id);
                }
            }
        }

        let sort_key = |id: &Uuid| {
            (
                depths.get(id).copied().unwrap_or(0),
                submitted.get(id).copied(),
                *id,
            )
        };

        let mut frontier: Vec<Uuid> = indegree
            .iter()
            .filter(|&(_, &d)| d == 0)
            .map(|(&id, _)| id)
            .collect();
        frontier.sort_by_key(sort_key);

        let mut order = Vec::with_capacity(set.len());
        while let Some(&next) = frontier.first() {
            frontier.remove(0);
            order.push(next);

            for dependent in edges_out.get(&next).into_iter().flatten() {
                let degree = indegree.get_mut(dependent).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    frontier.push(*dependent);
                }
            }
            frontier.sort_by_key(sort_key);
        }

        if order.len() != set.len() {
            let remaining: Vec<String> = set
                .iter()
                .filter(|id| !order.contains(id))
                .map(Uuid::to_string)
                .collect();
            return Err(DomainError::DependencyCycle {
                path: remaining.join(" -> "),
            });
        }

        Ok(order)
    }

    /// Subset of the given prerequisite ids that are not COMPLETED.
    pub async fn get_unmet_dependencies(&self, task_ids: &[Uuid]) -> DomainResult<Vec<Uuid>> {
        if task_ids.is_empty() {
            return Ok(Vec::new());
        }
        let tasks = self.repo.get_tasks(task_ids).await?;
        let completed: HashSet<Uuid> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.id)
            .collect();
        Ok(task_ids
            .iter()
            .copied()
            .filter(|id| !completed.contains(id))
            .collect())
    }

    /// True iff every prerequisite edge for the task is resolved.
    pub async fn are_all_dependencies_met(&self, task_id: Uuid) -> DomainResult<bool> {
        let edges = self.repo.get_dependencies_for(task_id).await?;
        Ok(edges.iter().all(|e| !e.is_unresolved()))
    }

    /// Subset of the given tasks with no unresolved prerequisites.
    pub async fn get_ready_tasks(&self, task_ids: &[Uuid]) -> DomainResult<Vec<Uuid>> {
        let graph = self.graph().await?;
        Ok(task_ids
            .iter()
            .copied()
            .filter(|id| graph.prereqs_of.get(id).is_none_or(Vec::is_empty))
            .collect())
    }

    /// Direct dependents still gated by the given prerequisite.
    pub async fn get_blocked_tasks(&self, prerequisite_id: Uuid) -> DomainResult<Vec<Uuid>> {
        let graph = self.graph().await?;
        Ok(graph
            .dependents_of
            .get(&prerequisite_id)
            .cloned()
            .unwrap_or_default())
    }

    /// Level-by-level predecessors: element 0 holds direct prerequisites,
    /// element 1 their prerequisites, and so on. Each task appears once, at
    /// its first (shallowest) level.
    pub async fn get_dependency_chain(&self, task_id: Uuid) -> DomainResult<Vec<Vec<Uuid>>> {
        let graph = self.graph().await?;
        let mut levels: Vec<Vec<Uuid>> = Vec::new();
        let mut seen: HashSet<Uuid> = HashSet::from([task_id]);
        let mut current = vec![task_id];

        while !current.is_empty() {
            let mut next = Vec::new();
            for id in &current {
                for prereq in graph.prereqs_of.get(id).into_iter().flatten() {
                    if seen.insert(*prereq) {
                        next.push(*prereq);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            levels.push(next.clone());
            current = next;
        }

        Ok(levels)
    }
}

/// Path from `from` to `target` following prerequisite edges, if one exists.
fn reach(
    prereqs_of: &HashMap<Uuid, Vec<Uuid>>,
    from: Uuid,
    target: Uuid,
) -> Option<Vec<Uuid>> {
    let mut parents: HashMap<Uuid, Uuid> = HashMap::new();
    let mut queue = VecDeque::from([from]);
    let mut visited = HashSet::from([from]);

    while let Some(node) = queue.pop_front() {
        if node == target {
            let mut path = vec![target];
            let mut cursor = target;
            while let Some(&parent) = parents.get(&cursor) {
                path.push(parent);
                cursor = parent;
            }
            path.reverse();
            return Some(path);
        }
        for next in prereqs_of.get(&node).into_iter().flatten() {
            if visited.insert(*next) {
                parents.insert(*next, node);
                queue.push_back(*next);
            }
        }
    }
    None
}

fn depth_of(
    prereqs_of: &HashMap<Uuid, Vec<Uuid>>,
    task_id: Uuid,
    memo: &mut HashMap<Uuid, u32>,
    visiting: &mut HashSet<Uuid>,
) -> DomainResult<u32> {
    if let Some(&depth) = memo.get(&task_id) {
        return Ok(depth);
    }
    if !visiting.insert(task_id) {
        return Err(DomainError::DependencyCycle {
            path: task_id.to_string(),
        });
    }

    let depth = match prereqs_of.get(&task_id) {
        None => 0,
        Some(prereqs) if prereqs.is_empty() => 0,
        Some(prereqs) => {
            let mut max_depth = 0;
            for prereq in prereqs {
                max_depth = max_depth.max(depth_of(prereqs_of, *prereq, memo, visiting)?);
            }
            max_depth + 1
        }
    };

    visiting.remove(&task_id);
    memo.insert(task_id, depth);
    Ok(depth)
}
