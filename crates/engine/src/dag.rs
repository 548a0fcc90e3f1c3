//! Graph validation — run this before persisting an automation.
//!
//! Rules enforced:
//! 1. Node IDs must be unique within the automation.
//! 2. Every successor id (`next`, `trueNext`, `falseNext`) must exist.
//! 3. There must be at least one trigger node.
//! 4. The directed graph must be acyclic (topological sort must succeed).
//!
//! Returns a topologically-sorted list of node IDs on success.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::{models::Automation, EngineError};

/// Validate the automation's graph and return its node ids in topological order.
///
/// # Errors
/// - [`EngineError::DuplicateNodeId`] if two nodes share an ID.
/// - [`EngineError::UnknownSuccessor`] if a successor list references a missing node.
/// - [`EngineError::NoTriggerNodes`] if nothing can start a run.
/// - [`EngineError::CycleDetected`] if the graph is not acyclic.
pub fn validate_graph(automation: &Automation) -> Result<Vec<String>, EngineError> {
    let nodes = &automation.nodes;

    // 1. Unique ids
    let mut seen_ids: HashSet<&str> = HashSet::new();
    for node in nodes {
        if !seen_ids.insert(node.id.as_str()) {
            return Err(EngineError::DuplicateNodeId(node.id.clone()));
        }
    }

    // 2. Successor ids resolve
    for node in nodes {
        if let Some(missing) = node.successors().find(|id| !seen_ids.contains(id.as_str())) {
            return Err(EngineError::UnknownSuccessor {
                from: node.id.clone(),
                to: missing.clone(),
            });
        }
    }

    // 3. Something must start the run
    if !nodes.iter().any(|n| n.is_trigger()) {
        return Err(EngineError::NoTriggerNodes);
    }

    // 4. Kahn's algorithm, seeded in declaration order so the result is stable.
    let mut in_degree: HashMap<&str, usize> = nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
    for node in nodes {
        for successor in node.successors() {
            *in_degree.entry(successor.as_str()).or_insert(0) += 1;
        }
    }

    let adjacency: HashMap<&str, Vec<&str>> = nodes
        .iter()
        .map(|n| (n.id.as_str(), n.successors().map(String::as_str).collect()))
        .collect();

    let mut queue: VecDeque<&str> = nodes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| in_degree[id] == 0)
        .collect();

    let mut sorted: Vec<String> = Vec::with_capacity(nodes.len());

    while let Some(node_id) = queue.pop_front() {
        sorted.push(node_id.to_owned());

        for &neighbour in &adjacency[node_id] {
            let degree = in_degree.entry(neighbour).or_insert(0);
            *degree -= 1;
            if *degree == 0 {
                queue.push_back(neighbour);
            }
        }
    }

    if sorted.len() != nodes.len() {
        return Err(EngineError::CycleDetected);
    }

    Ok(sorted)
}
