//! Dependency graph over registered providers.
//!
//! Nodes are providers, edges point from a service to each of its
//! dependencies. The graph detects cycles both incrementally on insert
//! (with rollback) and in batch at build time, and produces the
//! dependency-first topological order used to eagerly instantiate
//! singletons. Built single-threaded during [`ServiceCollection::build`]
//! and frozen afterwards, so reads need no locking.
//!
//! [`ServiceCollection::build`]: crate::ServiceCollection::build

use std::collections::HashMap;

use crate::error::{DiError, DiResult};
use crate::key::Key;
use crate::registry::ProviderId;

type NodeMap = HashMap<ProviderId, Node, ahash::RandomState>;

struct Node {
    /// Service identity, for diagnostics and cycle paths.
    label: Key,
    /// Placeholder nodes are referenced before their provider is added.
    has_provider: bool,
    deps: Vec<ProviderId>,
    dependents: Vec<ProviderId>,
}

/// Directed acyclic graph of providers.
pub(crate) struct DependencyGraph {
    nodes: NodeMap,
    /// Insertion order, for deterministic traversal.
    order: Vec<ProviderId>,
    topo_cache: Option<Vec<ProviderId>>,
    verified_acyclic: bool,
}

impl DependencyGraph {
    pub(crate) fn new() -> Self {
        Self {
            nodes: HashMap::with_hasher(ahash::RandomState::new()),
            order: Vec::new(),
            topo_cache: None,
            verified_acyclic: false,
        }
    }

    fn touch(&mut self) {
        self.topo_cache = None;
        self.verified_acyclic = false;
    }

    fn ensure_node(&mut self, id: ProviderId, label: Key) -> &mut Node {
        if !self.nodes.contains_key(&id) {
            self.order.push(id);
            self.nodes.insert(
                id,
                Node {
                    label,
                    has_provider: false,
                    deps: Vec::new(),
                    dependents: Vec::new(),
                },
            );
        }
        self.nodes.get_mut(&id).expect("node just ensured")
    }

    /// Inserts a provider node and its dependency edges.
    ///
    /// Dependencies that have no node yet get a placeholder. If the new
    /// edges close a cycle the insertion is rolled back and
    /// [`DiError::Circular`] carries the cycle path.
    pub(crate) fn add_provider(
        &mut self,
        id: ProviderId,
        label: Key,
        deps: &[(ProviderId, Key)],
    ) -> DiResult<()> {
        let existed = self.nodes.contains_key(&id);
        {
            let node = self.ensure_node(id, label);
            node.has_provider = true;
            node.label = label;
        }
        let mut added = Vec::new();
        for (dep_id, dep_label) in deps {
            self.ensure_node(*dep_id, *dep_label);
            let node = self.nodes.get_mut(&id).expect("provider node exists");
            if !node.deps.contains(dep_id) {
                node.deps.push(*dep_id);
                added.push(*dep_id);
                self.nodes
                    .get_mut(dep_id)
                    .expect("dependency node exists")
                    .dependents
                    .push(id);
            }
        }
        self.touch();

        if let Some(path) = self.find_cycle_from(id) {
            // Roll back: drop the edges added by this insertion, and the
            // node itself when it did not exist before.
            for dep_id in &added {
                let node = self.nodes.get_mut(&id).expect("provider node exists");
                node.deps.retain(|d| d != dep_id);
                let dep = self.nodes.get_mut(dep_id).expect("dependency node exists");
                dep.dependents.retain(|d| *d != id);
            }
            if !existed {
                let node = self.nodes.get_mut(&id).expect("provider node exists");
                node.has_provider = false;
                if node.dependents.is_empty() && node.deps.is_empty() {
                    self.nodes.remove(&id);
                    self.order.retain(|n| *n != id);
                }
            }
            return Err(DiError::Circular { path });
        }
        Ok(())
    }

    /// Removes a provider and its incident edges. Keeps a placeholder if
    /// other providers still point at it.
    #[allow(dead_code)]
    pub(crate) fn remove_provider(&mut self, id: ProviderId) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        let deps = node.deps.clone();
        let dependents = node.dependents.clone();
        for dep_id in &deps {
            if let Some(dep) = self.nodes.get_mut(dep_id) {
                dep.dependents.retain(|d| *d != id);
            }
        }
        if dependents.is_empty() {
            self.nodes.remove(&id);
            self.order.retain(|n| *n != id);
        } else {
            let node = self.nodes.get_mut(&id).expect("node exists");
            node.has_provider = false;
            node.deps.clear();
        }
        self.touch();
    }

    /// DFS from `start` along dependency edges, looking for a path back
    /// to `start`. Returns the cycle path in service identities.
    fn find_cycle_from(&self, start: ProviderId) -> Option<Vec<Key>> {
        let mut stack = vec![(start, 0usize)];
        let mut path = vec![start];
        let mut visited: Vec<ProviderId> = Vec::new();

        while let Some((node_id, child_idx)) = stack.last().copied() {
            let node = &self.nodes[&node_id];
            if child_idx < node.deps.len() {
                stack.last_mut().expect("stack non-empty").1 += 1;
                let next = node.deps[child_idx];
                if next == start {
                    path.push(start);
                    return Some(path.iter().map(|id| self.nodes[id].label).collect());
                }
                if !visited.contains(&next) && !path.contains(&next) {
                    stack.push((next, 0));
                    path.push(next);
                }
            } else {
                stack.pop();
                visited.push(path.pop().expect("path tracks stack"));
            }
        }
        None
    }

    /// Batch cycle detection across all nodes. The verdict is cached
    /// until the next mutation.
    pub(crate) fn detect_cycles(&mut self) -> DiResult<()> {
        if self.verified_acyclic {
            return Ok(());
        }
        // Colors: white (unvisited), grey (on stack), black (done).
        let mut grey: Vec<ProviderId> = Vec::new();
        let mut black: Vec<ProviderId> = Vec::new();

        for &root in &self.order {
            if black.contains(&root) {
                continue;
            }
            let mut stack = vec![(root, 0usize)];
            grey.push(root);
            while let Some((node_id, child_idx)) = stack.last().copied() {
                let node = &self.nodes[&node_id];
                if child_idx < node.deps.len() {
                    stack.last_mut().expect("stack non-empty").1 += 1;
                    let next = node.deps[child_idx];
                    if black.contains(&next) {
                        continue;
                    }
                    if let Some(pos) = grey.iter().position(|g| *g == next) {
                        let mut path: Vec<Key> =
                            grey[pos..].iter().map(|id| self.nodes[id].label).collect();
                        path.push(self.nodes[&next].label);
                        return Err(DiError::Circular { path });
                    }
                    grey.push(next);
                    stack.push((next, 0));
                } else {
                    stack.pop();
                    grey.pop();
                    black.push(node_id);
                }
            }
        }
        self.verified_acyclic = true;
        Ok(())
    }

    /// Kahn's algorithm. Emits providers dependency-first; the result is
    /// cached until the next mutation.
    pub(crate) fn topological_sort(&mut self) -> Vec<ProviderId> {
        if let Some(cached) = &self.topo_cache {
            return cached.clone();
        }
        let mut remaining: HashMap<ProviderId, usize, ahash::RandomState> =
            HashMap::with_hasher(ahash::RandomState::new());
        for (&id, node) in &self.nodes {
            remaining.insert(id, node.deps.len());
        }

        let mut queue: std::collections::VecDeque<ProviderId> = self
            .order
            .iter()
            .filter(|id| remaining[*id] == 0)
            .copied()
            .collect();
        let mut sorted = Vec::with_capacity(self.nodes.len());

        while let Some(id) = queue.pop_front() {
            sorted.push(id);
            for &dependent in &self.nodes[&id].dependents {
                let count = remaining.get_mut(&dependent).expect("known node");
                *count -= 1;
                if *count == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        self.topo_cache = Some(sorted.clone());
        sorted
    }

    /// Direct dependencies of a provider.
    pub(crate) fn dependencies_of(&self, id: ProviderId) -> Vec<ProviderId> {
        self.nodes.get(&id).map(|n| n.deps.clone()).unwrap_or_default()
    }

    /// Providers that directly depend on `id`.
    pub(crate) fn dependents_of(&self, id: ProviderId) -> Vec<ProviderId> {
        self.nodes
            .get(&id)
            .map(|n| n.dependents.clone())
            .unwrap_or_default()
    }

    /// Every provider reachable through dependency edges from `id`.
    pub(crate) fn transitive_dependencies_of(&self, id: ProviderId) -> Vec<ProviderId> {
        let mut seen = Vec::new();
        let mut queue: std::collections::VecDeque<ProviderId> =
            self.dependencies_of(id).into();
        while let Some(next) = queue.pop_front() {
            if seen.contains(&next) {
                continue;
            }
            seen.push(next);
            if let Some(node) = self.nodes.get(&next) {
                queue.extend(node.deps.iter().copied());
            }
        }
        seen
    }

    /// Longest-path depth of every node, measured from the roots.
    /// Diagnostics only.
    pub(crate) fn calculate_depths(&mut self) -> HashMap<ProviderId, usize> {
        let order = self.topological_sort();
        let mut depths: HashMap<ProviderId, usize> = HashMap::new();
        // Dependency-first order means every dependent is visited after
        // the nodes it depends on; walk it backwards so each node sees
        // its dependents' depths.
        for id in order.iter().rev() {
            let node = &self.nodes[id];
            let depth = node
                .dependents
                .iter()
                .filter_map(|d| depths.get(d).map(|v| v + 1))
                .max()
                .unwrap_or(0);
            depths.insert(*id, depth);
        }
        depths
    }

    /// Nodes no provider depends on.
    pub(crate) fn roots(&self) -> Vec<ProviderId> {
        self.order
            .iter()
            .filter(|id| self.nodes[*id].dependents.is_empty())
            .copied()
            .collect()
    }

    /// Nodes with no dependencies of their own.
    pub(crate) fn leaves(&self) -> Vec<ProviderId> {
        self.order
            .iter()
            .filter(|id| self.nodes[*id].deps.is_empty())
            .copied()
            .collect()
    }

    pub(crate) fn size(&self) -> usize {
        self.nodes.len()
    }

    #[allow(dead_code)]
    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.order.clear();
        self.touch();
    }
}
