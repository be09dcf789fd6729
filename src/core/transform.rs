// src/core/transform.rs
//! File list to graph conversion

use tracing::debug;
use uuid::Uuid;

use crate::config::{InferenceConfig, LayoutConfig};
use super::classifier::{get_extension, get_file_name, ClusterTable};
use super::inference::DependencyInferencer;
use super::layout::compute_layout;
use super::metrics::{compute_health_score, compute_node_metrics, estimate_lines};
use super::model::{FileEntry, GraphEdge, GraphNode, Stage};

/// Tunables for one transform run
#[derive(Debug, Clone, Default)]
pub struct TransformSettings {
    pub inference: InferenceConfig,
    pub layout: LayoutConfig,
}

#[derive(Debug, Clone)]
pub struct TransformResult {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub file_count: usize,
    pub edge_count: usize,
    pub health_score: u8,
}

impl TransformResult {
    fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            file_count: 0,
            edge_count: 0,
            health_score: 100,
        }
    }
}

/// Build nodes, infer edges, score and lay out
///
/// `on_progress` receives percentages local to this step (10 to 100).
pub fn transform_entries<F>(
    entries: &[FileEntry],
    settings: &TransformSettings,
    mut on_progress: F,
) -> TransformResult
where
    F: FnMut(Stage, u8),
{
    if entries.is_empty() {
        return TransformResult::empty();
    }

    on_progress(Stage::Parsing, 10);
    let mut clusters = ClusterTable::new();
    on_progress(Stage::Parsing, 30);

    let nodes: Vec<GraphNode> = entries
        .iter()
        .map(|entry| build_node(entry, &mut clusters))
        .collect();
    debug!(
        "Built {} nodes across {} clusters: {}",
        nodes.len(),
        clusters.len(),
        clusters.keys().collect::<Vec<_>>().join(", ")
    );

    on_progress(Stage::Computing, 50);
    let edges = DependencyInferencer::new(settings.inference.clone()).infer(&nodes);

    on_progress(Stage::Computing, 70);
    let nodes = compute_node_metrics(&nodes, &edges);

    on_progress(Stage::Layouting, 85);
    let nodes = compute_layout(&nodes, settings.layout.max_extent);

    on_progress(Stage::Layouting, 95);
    let health_score = compute_health_score(&nodes, &edges);

    on_progress(Stage::Done, 100);

    TransformResult {
        file_count: nodes.len(),
        edge_count: edges.len(),
        nodes,
        edges,
        health_score,
    }
}

fn build_node(entry: &FileEntry, clusters: &mut ClusterTable) -> GraphNode {
    let size = entry.size.unwrap_or(0);
    GraphNode {
        id: Uuid::new_v4().to_string(),
        path: entry.path.clone(),
        name: get_file_name(&entry.path).to_string(),
        extension: get_extension(&entry.path),
        size,
        lines: estimate_lines(size),
        complexity: 0,
        cluster: clusters.assign(&entry.path),
        position: [0.0; 3],
        deps: 0,
        dependents: 0,
    }
}
