// SPDX-License-Identifier: MIT

//! The dependency DAG: explicit edges derived from each resource's
//! `uids()` overlap plus auto-edge candidates from `Edgeable`, flattened
//! into an adjacency list and checked for cycles before the
//! reconciliation loop ever starts a task.

use crate::error::EngineError;
use mgmt_core::{Resource, Uid};
use std::collections::{HashMap, HashSet};

/// One entry in the built graph: a resource's position plus the
/// positions of the resources it depends on (must converge first).
pub struct DependencyGraph {
    /// Index of each resource by its position in the slice passed to `build_graph`.
    pub depends_on: Vec<HashSet<usize>>,
}

impl DependencyGraph {
    /// Resources with no unresolved dependencies, in index order.
    pub fn roots(&self) -> Vec<usize> {
        self.depends_on
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(i, _)| i)
            .collect()
    }

    /// A topological order, or `Err` with the set of indices
    /// participating in a cycle.
    pub fn topo_order(&self) -> Result<Vec<usize>, Vec<usize>> {
        let n = self.depends_on.len();
        let mut remaining: Vec<HashSet<usize>> = self.depends_on.clone();
        let mut order = Vec::with_capacity(n);
        let mut done = vec![false; n];

        loop {
            let ready: Vec<usize> = (0..n)
                .filter(|&i| !done[i] && remaining[i].is_empty())
                .collect();
            if ready.is_empty() {
                break;
            }
            for i in ready {
                done[i] = true;
                order.push(i);
                for deps in remaining.iter_mut() {
                    deps.remove(&i);
                }
            }
        }

        if order.len() == n {
            Ok(order)
        } else {
            Err((0..n).filter(|&i| !done[i]).collect())
        }
    }
}

/// Resolve auto-edge candidates against every resource's own `uids()`,
/// returning, for each resource index, the set of indices it depends on
/// purely from auto-edge inference (explicit edges are layered on by
/// the caller via `build_graph`).
pub fn resolve_auto_edges(resources: &[Box<dyn Resource>]) -> Vec<HashSet<usize>> {
    let mut index: HashMap<Uid, usize> = HashMap::new();
    for (i, resource) in resources.iter().enumerate() {
        for uid in resource.uids() {
            index.insert(uid, i);
        }
    }

    let mut deps: Vec<HashSet<usize>> = vec![HashSet::new(); resources.len()];
    for (i, resource) in resources.iter().enumerate() {
        let Some(edgeable) = resource.as_edgeable() else { continue };
        let mut iter = edgeable.auto_edges();
        while let Some(candidate) = iter.next() {
            let matched: Vec<Uid> = index
                .keys()
                .filter(|uid| candidate.uid.iff(uid))
                .cloned()
                .collect();
            let matched_indices: Vec<usize> = matched.iter().filter_map(|uid| index.get(uid).copied()).collect();
            for &target in &matched_indices {
                if target == i {
                    continue;
                }
                if candidate.reversed {
                    deps[target].insert(i);
                } else {
                    deps[i].insert(target);
                }
            }
            if !iter.test(&matched) {
                break;
            }
        }
    }
    deps
}

/// Fold `Groupable` children into compatible parents, in resource-list
/// order: for each resource that advertises `Groupable`, scan the
/// remaining not-yet-claimed resources and absorb every one whose
/// `group_cmp` against it succeeds. A resource claimed by an earlier
/// parent is never itself considered as a later parent's candidate, and
/// never gets its own slot in the returned list or the dependency graph
/// built from it — from the scheduler's perspective it no longer
/// exists; its own parent now drives its lifecycle internally.
pub fn auto_group(resources: Vec<Box<dyn Resource>>) -> Result<Vec<Box<dyn Resource>>, EngineError> {
    let n = resources.len();
    let mut slots: Vec<Option<Box<dyn Resource>>> = resources.into_iter().map(Some).collect();

    for i in 0..n {
        let claims: Vec<usize> = {
            let Some(parent) = slots[i].as_ref() else { continue };
            let Some(groupable) = parent.as_groupable() else { continue };
            (0..n)
                .filter(|&j| j != i)
                .filter(|&j| slots[j].as_ref().is_some_and(|child| groupable.group_cmp(child.as_ref()).is_ok()))
                .collect()
        };
        for j in claims {
            let Some(child) = slots[j].take() else { continue };
            let parent = slots[i].as_mut().expect("parent slot checked non-empty above");
            let groupable_mut = parent.as_groupable_mut().expect("parent advertised Groupable above");
            groupable_mut.absorb(child)?;
        }
    }

    Ok(slots.into_iter().flatten().collect())
}

/// Build the full dependency graph from auto-edge inference, rejecting
/// duplicate uids up front and verifying the result is acyclic.
pub fn build_graph(resources: &[Box<dyn Resource>]) -> Result<DependencyGraph, EngineError> {
    let mut seen = HashSet::new();
    for resource in resources {
        for uid in resource.uids() {
            if !seen.insert(uid.clone()) {
                return Err(EngineError::DuplicateUid(uid));
            }
        }
    }

    let depends_on = resolve_auto_edges(resources);
    let graph = DependencyGraph { depends_on };
    if let Err(cyclic) = graph.topo_order() {
        let names: Vec<String> = cyclic
            .into_iter()
            .map(|i| resources[i].meta().to_string())
            .collect();
        return Err(EngineError::Cycle(names));
    }
    Ok(graph)
}
