// src/core/metrics.rs
//! Complexity and health heuristics
//!
//! Complexity is a proxy, not a cyclomatic measure: file size, nesting depth
//! and fan-in each contribute a weighted share of a 0-100 score.

use super::model::{GraphEdge, GraphNode};

/// Nodes above this complexity count as hotspots for the health score
const HIGH_COMPLEXITY: u8 = 70;

/// Line estimate used when no real count is available
pub fn estimate_lines(size: u64) -> u64 {
    ((size as f64 / 40.0).round() as u64).max(1)
}

/// Fill in `deps`, `dependents` and `complexity` for every node
pub fn compute_node_metrics(nodes: &[GraphNode], edges: &[GraphEdge]) -> Vec<GraphNode> {
    if nodes.is_empty() {
        return Vec::new();
    }

    let mut deps = vec![0u32; nodes.len()];
    let mut dependents = vec![0u32; nodes.len()];

    for edge in edges {
        if let Some(count) = deps.get_mut(edge.source) {
            *count += 1;
        }
        if let Some(count) = dependents.get_mut(edge.target) {
            *count += 1;
        }
    }

    nodes
        .iter()
        .enumerate()
        .map(|(i, node)| GraphNode {
            deps: deps[i],
            dependents: dependents[i],
            complexity: node_complexity(node, dependents[i]),
            ..node.clone()
        })
        .collect()
}

fn node_complexity(node: &GraphNode, dependents: u32) -> u8 {
    let lines = if node.lines > 0 { node.lines } else { estimate_lines(node.size) };
    let depth = node.path.matches('/').count();

    let line_factor = (lines as f64 / 300.0) * 40.0;
    let depth_factor = (depth as f64 / 5.0) * 30.0;
    let dependents_factor = (dependents as f64 / 8.0) * 30.0;

    (line_factor + depth_factor + dependents_factor).min(100.0).round() as u8
}

/// Single 0-100 summary of aggregate complexity and coupling
///
/// An empty graph scores 100.
pub fn compute_health_score(nodes: &[GraphNode], edges: &[GraphEdge]) -> u8 {
    if nodes.is_empty() {
        return 100;
    }

    let count = nodes.len() as f64;
    let total_complexity: f64 = nodes.iter().map(|n| n.complexity as f64).sum();
    let high_complexity = nodes.iter().filter(|n| n.complexity > HIGH_COMPLEXITY).count();
    let max_deps = nodes.iter().map(|n| n.deps).max().unwrap_or(0);

    let avg_complexity = total_complexity / count;
    let high_ratio = high_complexity as f64 / count;
    let coupling_ratio = edges.len() as f64 / count;

    let score = 100.0
        - avg_complexity * 0.3
        - high_ratio * 30.0
        - coupling_ratio * 20.0
        - (max_deps as f64 / 50.0) * 20.0;

    score.clamp(0.0, 100.0).round() as u8
}
